/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Thread and Scheduler (spec §4.5).
//!
//! Grounded on `nucleus/src/objects/thread.rs`'s sketch (state enum, process
//! pointer) generalized from a raw-pointer/PCB model to the arena-of-handles
//! shape the spec's redesign note (§9) asks for, and on
//! `nucleus/src/caps/capnode_cap.rs`'s comment about indexing vs. pointers.
//! The run-queue bitmap-plus-buckets layout is the teacher's closest analogue
//! to `nucleus/src/arch/aarch64`'s intended scheduler (never implemented
//! there); here it is built out in full against `config::PRIO_LEVELS`.

use crate::{
    config::{INF_TIME, MAX_THREADS, PRIO_LEVELS, PRIO_WORD_NUM},
    error::PthError,
};

/// Saved register bank, opaque payload the nucleus passes untouched to
/// [`crate::arch::PlatformOps::regs_save`]/`regs_restore`.
#[derive(Debug, Clone)]
pub struct RegisterFrame {
    pub gpr: [usize; 16],
    pub pc: usize,
    pub sp: usize,
    pub psr: usize,
}

impl RegisterFrame {
    pub const fn empty() -> RegisterFrame {
        RegisterFrame {
            gpr: [0; 16],
            pc: 0,
            sp: 0,
            psr: 0,
        }
    }
}

/// Thread id: an arena index into [`ThdArena`], with the top two bits
/// reserved to carry `Thd_Sched_Rcv`'s event-kind flags on return (spec
/// §4.5 supplement; original's `RME_THD_TIMEOUT_FLAG`/`RME_THD_EXCPEND_FLAG`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tid(pub usize);

impl Tid {
    pub const TIMEOUT_FLAG: usize = 1 << (usize::BITS - 1);
    pub const EXCPEND_FLAG: usize = 1 << (usize::BITS - 2);

    pub const fn with_timeout(self) -> usize {
        self.0 | Self::TIMEOUT_FLAG
    }

    pub const fn with_excpend(self) -> usize {
        self.0 | Self::EXCPEND_FLAG
    }
}

/// Thread run state (spec §4.5 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
    Timeout,
    Excpend,
}

/// One thread's scheduling and context regions (spec §3 "Thread").
pub struct Thread {
    pub state: ThreadState,
    pub cpu: Option<usize>,
    pub slice: u64,
    pub prio: usize,
    pub prio_ceiling: usize,
    /// Arena index of the signal this thread is blocked on, if `Blocked`.
    pub blocked_on: Option<usize>,
    /// Arena index of the owning process.
    pub process: usize,
    pub sched_ref: usize,
    /// Arena index of this thread's parent scheduler thread.
    pub sched_thd: Option<usize>,
    /// Arena index of the optional scheduler-notification signal.
    pub sched_sig: Option<usize>,
    /// Event list of child threads awaiting `Thd_Sched_Rcv`, each entry a
    /// `(child_tid, is_excpend)` pair.
    pub events: [Option<(usize, bool)>; MAX_THREADS],
    pub hyp: bool,
    pub frame: RegisterFrame,
    /// Arena index of the top invocation frame, if any.
    pub inv_top: Option<usize>,
    pub inv_depth: usize,
    /// `run` link: priority-level bucket position, set while queued.
    pub on_runqueue: bool,
}

impl Thread {
    pub fn new(process: usize) -> Thread {
        Thread {
            state: ThreadState::Ready,
            cpu: None,
            slice: INF_TIME,
            prio: 0,
            prio_ceiling: PRIO_LEVELS - 1,
            blocked_on: None,
            process,
            sched_ref: 0,
            sched_thd: None,
            sched_sig: None,
            events: [None; MAX_THREADS],
            hyp: false,
            frame: RegisterFrame::empty(),
            inv_top: None,
            inv_depth: 0,
            on_runqueue: false,
        }
    }

    fn push_event(&mut self, child: usize, is_excpend: bool) -> Result<(), PthError> {
        for slot in self.events.iter_mut() {
            if let Some((existing, _)) = slot {
                if *existing == child {
                    return Ok(()); // already pending, not duplicated
                }
            }
        }
        for slot in self.events.iter_mut() {
            if slot.is_none() {
                *slot = Some((child, is_excpend));
                return Ok(());
            }
        }
        Err(PthError::Overflow)
    }

    fn pop_event(&mut self) -> Option<(usize, bool)> {
        for slot in self.events.iter_mut() {
            if slot.is_some() {
                return slot.take();
            }
        }
        None
    }
}

/// Arena of live threads, addressed by [`Tid`].
pub struct ThdArena {
    threads: [Option<Thread>; MAX_THREADS],
}

impl ThdArena {
    pub fn new() -> ThdArena {
        ThdArena {
            threads: core::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, tid: Tid) -> Option<&Thread> {
        self.threads.get(tid.0)?.as_ref()
    }

    pub fn get_mut(&mut self, tid: Tid) -> Option<&mut Thread> {
        self.threads.get_mut(tid.0)?.as_mut()
    }

    pub fn alloc(&mut self, thread: Thread) -> Result<Tid, PthError> {
        for (idx, slot) in self.threads.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(thread);
                return Ok(Tid(idx));
            }
        }
        Err(PthError::Overflow)
    }

    pub fn free(&mut self, tid: Tid) {
        if let Some(slot) = self.threads.get_mut(tid.0) {
            *slot = None;
        }
    }
}

impl Default for ThdArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-CPU run-queue: one bitmap word set plus bucket lists, indexed by
/// priority level (spec §3 "Per-CPU local").
pub struct RunQueue {
    bitmap: [usize; PRIO_WORD_NUM],
    /// Each bucket holds tids at that priority, oldest first (FIFO within level).
    buckets: [[Option<Tid>; MAX_THREADS]; PRIO_LEVELS],
    bucket_len: [usize; PRIO_LEVELS],
}

impl RunQueue {
    pub fn new() -> RunQueue {
        RunQueue {
            bitmap: [0; PRIO_WORD_NUM],
            buckets: core::array::from_fn(|_| [None; MAX_THREADS]),
            bucket_len: [0; PRIO_LEVELS],
        }
    }

    fn set_bit(&mut self, prio: usize) {
        self.bitmap[prio / usize::BITS as usize] |= 1 << (prio % usize::BITS as usize);
    }

    fn clear_bit(&mut self, prio: usize) {
        self.bitmap[prio / usize::BITS as usize] &= !(1 << (prio % usize::BITS as usize));
    }

    /// Enqueue `tid` at the tail of `prio`'s bucket.
    pub fn enqueue(&mut self, prio: usize, tid: Tid) -> Result<(), PthError> {
        let len = self.bucket_len[prio];
        if len >= MAX_THREADS {
            return Err(PthError::Overflow);
        }
        self.buckets[prio][len] = Some(tid);
        self.bucket_len[prio] += 1;
        self.set_bit(prio);
        Ok(())
    }

    /// Remove `tid` from `prio`'s bucket, preserving FIFO order of the rest.
    pub fn remove(&mut self, prio: usize, tid: Tid) {
        let len = self.bucket_len[prio];
        if let Some(pos) = self.buckets[prio][..len].iter().position(|t| *t == Some(tid)) {
            for i in pos..len - 1 {
                self.buckets[prio][i] = self.buckets[prio][i + 1];
            }
            self.buckets[prio][len - 1] = None;
            self.bucket_len[prio] -= 1;
            if self.bucket_len[prio] == 0 {
                self.clear_bit(prio);
            }
        }
    }

    /// Highest occupied priority level, if any (lower index = higher priority).
    pub fn highest(&self) -> Option<usize> {
        for (word_idx, word) in self.bitmap.iter().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                return Some(word_idx * usize::BITS as usize + bit);
            }
        }
        None
    }

    /// Pop the head of the highest-priority non-empty bucket.
    pub fn pop_highest(&mut self) -> Option<Tid> {
        let prio = self.highest()?;
        let head = self.buckets[prio][0]?;
        self.remove(prio, head);
        Some(head)
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// `Thd_Sched_Bind`: attach a `FREE` thread to `cpu`, assigning its parent
/// scheduler and priority.
pub fn thd_sched_bind(
    arena: &mut ThdArena,
    rq: &mut RunQueue,
    tid: Tid,
    cpu: usize,
    sched_thd: Option<Tid>,
    sched_sig: Option<usize>,
    prio: usize,
) -> Result<(), PthError> {
    if prio >= PRIO_LEVELS {
        return Err(PthError::Prio);
    }
    let thread = arena.get_mut(tid).ok_or(PthError::Conflict)?;
    if thread.cpu.is_some() {
        return Err(PthError::Conflict);
    }
    thread.cpu = Some(cpu);
    thread.sched_thd = sched_thd.map(|t| t.0);
    thread.sched_sig = sched_sig;
    thread.prio = prio;
    thread.state = ThreadState::Ready;
    if let Some(parent) = sched_thd {
        arena.get_mut(parent).ok_or(PthError::Conflict)?.sched_ref += 1;
    }
    rq.enqueue(prio, tid)?;
    arena.get_mut(tid).ok_or(PthError::Conflict)?.on_runqueue = true;
    Ok(())
}

/// `Thd_Sched_Free`: detach a bound thread, unconditionally removing it from
/// any wait slot (spec §5 "Cancellation").
pub fn thd_sched_free(arena: &mut ThdArena, rq: &mut RunQueue, tid: Tid) -> Result<(), PthError> {
    let (prio, on_rq, parent) = {
        let thread = arena.get(tid).ok_or(PthError::Conflict)?;
        (thread.prio, thread.on_runqueue, thread.sched_thd)
    };
    if on_rq {
        rq.remove(prio, tid);
    }
    if let Some(parent_idx) = parent {
        if let Some(parent_thread) = arena.get_mut(Tid(parent_idx)) {
            parent_thread.sched_ref = parent_thread.sched_ref.saturating_sub(1);
        }
    }
    let thread = arena.get_mut(tid).ok_or(PthError::Conflict)?;
    thread.cpu = None;
    thread.sched_thd = None;
    thread.sched_sig = None;
    thread.on_runqueue = false;
    thread.blocked_on = None;
    // EXCPEND is absorbing (spec §4.5 state machine): only Thd_Del exits it,
    // so freeing a faulted thread must not resurrect it to READY.
    if thread.state != ThreadState::Excpend {
        thread.state = ThreadState::Ready;
    }
    Ok(())
}

/// `Thd_Sched_Prio`: move `tid` to `new_prio`, re-inserting at the tail.
pub fn thd_sched_prio(arena: &mut ThdArena, rq: &mut RunQueue, tid: Tid, new_prio: usize) -> Result<(), PthError> {
    if new_prio >= PRIO_LEVELS {
        return Err(PthError::Prio);
    }
    let thread = arena.get(tid).ok_or(PthError::Conflict)?;
    let old_prio = thread.prio;
    let was_queued = thread.on_runqueue;
    if was_queued {
        rq.remove(old_prio, tid);
        rq.enqueue(new_prio, tid)?;
    }
    arena.get_mut(tid).ok_or(PthError::Conflict)?.prio = new_prio;
    Ok(())
}

/// `Thd_Time_Xfer`: donate `amount` slice ticks from `from` to `to`.
pub fn thd_time_xfer(arena: &mut ThdArena, from: Tid, to: Tid, amount: u64) -> Result<(), PthError> {
    {
        let donor = arena.get(from).ok_or(PthError::Conflict)?;
        if donor.state == ThreadState::Excpend {
            return Err(PthError::Invstate);
        }
        if donor.slice != INF_TIME && donor.slice < amount {
            return Err(PthError::Overflow);
        }
    }
    {
        let recipient = arena.get(to).ok_or(PthError::Conflict)?;
        if recipient.state == ThreadState::Excpend {
            return Err(PthError::Invstate);
        }
        if recipient.slice != INF_TIME && recipient.slice.checked_add(amount).is_none() {
            return Err(PthError::Overflow);
        }
    }
    let donor = arena.get_mut(from).ok_or(PthError::Conflict)?;
    if donor.slice != INF_TIME {
        donor.slice -= amount;
    }
    let recipient = arena.get_mut(to).ok_or(PthError::Conflict)?;
    if recipient.slice != INF_TIME {
        recipient.slice += amount;
    }
    Ok(())
}

/// Tick handler: decrement the running thread's slice, transitioning it to
/// `Timeout` and posting a scheduler notification on exhaustion.
pub fn thd_tick(arena: &mut ThdArena, rq: &mut RunQueue, running: Tid) -> Result<(), PthError> {
    let exhausted = {
        let thread = arena.get_mut(running).ok_or(PthError::Conflict)?;
        if thread.slice == INF_TIME {
            return Ok(());
        }
        thread.slice = thread.slice.saturating_sub(1);
        thread.slice == 0
    };
    if exhausted {
        notify_state_change(arena, rq, running, ThreadState::Timeout)?;
    }
    Ok(())
}

/// Move `tid` to `new_state`; if it becomes `Timeout`/`Excpend`, post a
/// scheduler-notification event to its parent scheduler thread (spec §4.5
/// "Scheduler hierarchy").
pub fn notify_state_change(
    arena: &mut ThdArena,
    rq: &mut RunQueue,
    tid: Tid,
    new_state: ThreadState,
) -> Result<(), PthError> {
    let (prio, on_rq, parent) = {
        let thread = arena.get(tid).ok_or(PthError::Conflict)?;
        (thread.prio, thread.on_runqueue, thread.sched_thd)
    };
    if on_rq && matches!(new_state, ThreadState::Timeout | ThreadState::Excpend) {
        rq.remove(prio, tid);
        arena.get_mut(tid).ok_or(PthError::Conflict)?.on_runqueue = false;
    }
    arena.get_mut(tid).ok_or(PthError::Conflict)?.state = new_state;
    if let (Some(parent_idx), true) = (parent, matches!(new_state, ThreadState::Timeout | ThreadState::Excpend)) {
        let is_excpend = new_state == ThreadState::Excpend;
        arena
            .get_mut(Tid(parent_idx))
            .ok_or(PthError::Conflict)?
            .push_event(tid.0, is_excpend)?;
    }
    Ok(())
}

/// `Thd_Sched_Rcv`: pop one event from `sched`'s list, returning the child's
/// tid OR'd with the matching flag. Fails with `NOTIF` if the list is empty.
pub fn thd_sched_rcv(arena: &mut ThdArena, sched: Tid) -> Result<usize, PthError> {
    let thread = arena.get_mut(sched).ok_or(PthError::Conflict)?;
    let (child, is_excpend) = thread.pop_event().ok_or(PthError::Notif)?;
    Ok(if is_excpend {
        Tid(child).with_excpend()
    } else {
        Tid(child).with_timeout()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ThdArena, RunQueue) {
        (ThdArena::new(), RunQueue::new())
    }

    #[test]
    fn bind_enqueues_at_priority() {
        let (mut arena, mut rq) = setup();
        let tid = arena.alloc(Thread::new(0)).unwrap();
        thd_sched_bind(&mut arena, &mut rq, tid, 0, None, None, 5).unwrap();
        assert_eq!(rq.highest(), Some(5));
        assert_eq!(rq.pop_highest(), Some(tid));
    }

    #[test]
    fn time_xfer_conserves_total_slice() {
        let (mut arena, mut rq) = setup();
        let a = arena.alloc(Thread::new(0)).unwrap();
        let b = arena.alloc(Thread::new(0)).unwrap();
        thd_sched_bind(&mut arena, &mut rq, a, 0, None, None, 2).unwrap();
        thd_sched_bind(&mut arena, &mut rq, b, 0, Some(a), None, 5).unwrap();
        arena.get_mut(a).unwrap().slice = 10;
        arena.get_mut(b).unwrap().slice = 0;
        thd_time_xfer(&mut arena, a, b, 10).unwrap();
        assert_eq!(arena.get(a).unwrap().slice, 0);
        assert_eq!(arena.get(b).unwrap().slice, 10);
    }

    #[test]
    fn exhaustion_notifies_parent_scheduler() {
        let (mut arena, mut rq) = setup();
        let a = arena.alloc(Thread::new(0)).unwrap();
        let b = arena.alloc(Thread::new(0)).unwrap();
        thd_sched_bind(&mut arena, &mut rq, a, 0, None, None, 2).unwrap();
        thd_sched_bind(&mut arena, &mut rq, b, 0, Some(a), None, 5).unwrap();
        arena.get_mut(b).unwrap().slice = 1;
        thd_tick(&mut arena, &mut rq, b).unwrap();
        assert_eq!(arena.get(b).unwrap().state, ThreadState::Timeout);
        assert_eq!(thd_sched_rcv(&mut arena, a).unwrap(), b.with_timeout());
    }

    #[test]
    fn sched_free_clears_binding_and_wait_state() {
        let (mut arena, mut rq) = setup();
        let tid = arena.alloc(Thread::new(0)).unwrap();
        thd_sched_bind(&mut arena, &mut rq, tid, 0, None, None, 3).unwrap();
        thd_sched_free(&mut arena, &mut rq, tid).unwrap();
        assert!(arena.get(tid).unwrap().cpu.is_none());
        assert_eq!(rq.highest(), None);
    }

    #[test]
    fn sched_free_leaves_excpend_threads_excpend() {
        let (mut arena, mut rq) = setup();
        let tid = arena.alloc(Thread::new(0)).unwrap();
        thd_sched_bind(&mut arena, &mut rq, tid, 0, None, None, 3).unwrap();
        arena.get_mut(tid).unwrap().state = ThreadState::Excpend;
        thd_sched_free(&mut arena, &mut rq, tid).unwrap();
        assert_eq!(arena.get(tid).unwrap().state, ThreadState::Excpend);
        assert!(arena.get(tid).unwrap().cpu.is_none());
    }
}
