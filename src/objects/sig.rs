/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Signal Endpoint (spec §4.7).
//!
//! Grounded on `nucleus/src/objects/notification.rs`/`endpoint.rs`'s
//! counting-semaphore sketch, generalized to the spec's four-option receive
//! table (`RME_RCV_BS/BM/NS/NM`, `Include/rme.h` 327-330) and the
//! scheduler-notification auxiliary flag.

use crate::{
    config::{MAX_SIGNALS, MAX_SIG_NUM},
    error::SivError,
};

/// `RME_RCV_BS/BM/NS/NM` (spec §4.7 "Receive options").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOption {
    /// Blocking, single: block until exactly one signal, consume it and clear.
    BlockingSingle,
    /// Blocking, multi: block until any signal, consume and clear the whole count.
    BlockingMulti,
    /// Non-blocking, single: fail with `ACT` if nothing pending.
    NonBlockingSingle,
    /// Non-blocking, multi: return 0 atomically if nothing pending.
    NonBlockingMulti,
}

impl RecvOption {
    const fn is_blocking(self) -> bool {
        matches!(self, RecvOption::BlockingSingle | RecvOption::BlockingMulti)
    }

    const fn is_multi(self) -> bool {
        matches!(self, RecvOption::BlockingMulti | RecvOption::NonBlockingMulti)
    }
}

/// A signal endpoint: saturating pending-count plus at most one waiter
/// (spec §3 "Signal endpoint"). `scheduler_notif` marks endpoints used for
/// scheduler notifications, whose send path does not require `SND`
/// permission (spec §4.7).
pub struct Signal {
    pub count: u64,
    /// Arena index (`Tid`) of the thread blocked on this endpoint, if any.
    pub waiter: Option<usize>,
    pub scheduler_notif: bool,
}

impl Signal {
    pub const fn new(scheduler_notif: bool) -> Signal {
        Signal {
            count: 0,
            waiter: None,
            scheduler_notif,
        }
    }
}

/// `Sig_Snd`: increment the counter, saturating at `MAX_SIG_NUM`. If a
/// thread is waiting, returns `Some(tid)` the caller must unblock and the
/// value to set in its return register, per the consumed receive option.
pub fn sig_snd(sig: &mut Signal) -> Option<(usize, u64)> {
    sig.count = (sig.count + 1).min(MAX_SIG_NUM);
    if let Some(tid) = sig.waiter.take() {
        let delivered = sig.count;
        sig.count = 0;
        Some((tid, delivered))
    } else {
        None
    }
}

/// `Sig_Rcv`: consume pending signals per `option`. Returns `Ok(Some(count))`
/// on an immediate non-blocking success, `Ok(None)` if the caller must now
/// block (the dispatcher records `sig.waiter` and suspends the thread), or
/// an error for `NS` with nothing pending.
pub fn sig_rcv(sig: &mut Signal, tid: usize, option: RecvOption) -> Result<Option<u64>, SivError> {
    if sig.waiter.is_some() {
        return Err(SivError::Conflict);
    }
    if sig.count > 0 {
        let delivered = if option.is_multi() { sig.count } else { 1 };
        sig.count -= delivered;
        return Ok(Some(delivered));
    }
    match option {
        RecvOption::NonBlockingSingle => Err(SivError::Act),
        RecvOption::NonBlockingMulti => Ok(Some(0)),
        _ if option.is_blocking() => {
            sig.waiter = Some(tid);
            Ok(None)
        }
        _ => unreachable!(),
    }
}

/// `Thd_Sched_Free`'s effect on a signal wait slot: unconditionally clear the
/// waiter and report whether it removed `tid` (spec §5 "Cancellation").
pub fn sig_cancel_wait(sig: &mut Signal, tid: usize) -> bool {
    if sig.waiter == Some(tid) {
        sig.waiter = None;
        true
    } else {
        false
    }
}

/// Arena of live signal endpoints, addressed by integer handle.
pub struct SigArena {
    sigs: [Option<Signal>; MAX_SIGNALS],
}

impl SigArena {
    pub fn new() -> SigArena {
        SigArena {
            sigs: core::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&Signal> {
        self.sigs.get(idx)?.as_ref()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Signal> {
        self.sigs.get_mut(idx)?.as_mut()
    }

    pub fn alloc(&mut self, sig: Signal) -> Result<usize, SivError> {
        for (idx, slot) in self.sigs.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(sig);
                return Ok(idx);
            }
        }
        Err(SivError::Full)
    }

    pub fn free(&mut self, idx: usize) {
        if let Some(slot) = self.sigs.get_mut(idx) {
            *slot = None;
        }
    }
}

impl Default for SigArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_non_blocking_multi_receive_clears_endpoint() {
        let mut sig = Signal::new(false);
        assert!(sig_snd(&mut sig).is_none());
        assert!(sig_snd(&mut sig).is_none());
        assert_eq!(sig_rcv(&mut sig, 1, RecvOption::NonBlockingMulti), Ok(Some(2)));
        assert_eq!(sig.count, 0);
    }

    #[test]
    fn non_blocking_single_fails_when_empty() {
        let mut sig = Signal::new(false);
        assert_eq!(sig_rcv(&mut sig, 1, RecvOption::NonBlockingSingle), Err(SivError::Act));
    }

    #[test]
    fn blocking_receive_then_send_unblocks_waiter() {
        let mut sig = Signal::new(false);
        assert_eq!(sig_rcv(&mut sig, 7, RecvOption::BlockingSingle), Ok(None));
        let (tid, delivered) = sig_snd(&mut sig).unwrap();
        assert_eq!(tid, 7);
        assert_eq!(delivered, 1);
        assert!(sig.waiter.is_none());
    }

    #[test]
    fn count_saturates_at_max() {
        let mut sig = Signal::new(false);
        sig.count = MAX_SIG_NUM;
        assert!(sig_snd(&mut sig).is_none());
        assert_eq!(sig.count, MAX_SIG_NUM);
    }

    #[test]
    fn sched_free_cancels_wait() {
        let mut sig = Signal::new(false);
        sig_rcv(&mut sig, 3, RecvOption::BlockingMulti).unwrap();
        assert!(sig_cancel_wait(&mut sig, 3));
        assert!(sig.waiter.is_none());
    }
}
