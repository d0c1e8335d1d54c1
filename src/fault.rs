/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Fault and Vector Handler (spec §4.10).
//!
//! Grounded on the original's `RME_Int_Flag` double-buffer (two groups of
//! `{lock, group_pending, content[]}` words) for the vector-dispatch half,
//! and on `nucleus/src/panic.rs`'s fault-classification intent (never
//! completed there) for the taxonomy half. The reader-writer protocol
//! decision for the lock word is recorded in `DESIGN.md` (spec §9 Open
//! Question).

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::VECTOR_WORDS;

/// Fault classification per dispatch (spec §4.10 "Fault taxonomy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Illegal/privileged instruction, divide-by-zero, precise misalignment,
    /// call/context overflow, unrecoverable (un)stacking, invalid PC/state.
    FatalAttributable,
    /// Data fault whose target resolves to a mapped-but-unpinned page.
    RecoverableDataFault { addr: usize },
    /// Imprecise async bus/FPU-lazy-stack fault that cannot be attributed.
    Dropped,
}

/// Raw fault syndrome the platform collaborator reports; this nucleus
/// classifies it without knowing the underlying architecture's encoding.
#[derive(Debug, Clone, Copy)]
pub struct FaultSyndrome {
    pub illegal_instruction: bool,
    pub privileged_instruction: bool,
    pub divide_by_zero: bool,
    pub misaligned_precise: bool,
    pub call_overflow: bool,
    pub unstacking_failed: bool,
    pub invalid_pc_or_state: bool,
    pub data_fault_addr: Option<usize>,
    pub data_fault_is_mapped_dynamic: bool,
    pub imprecise_async: bool,
}

/// Classify a raw syndrome into the spec's three-way taxonomy.
pub fn classify(syndrome: FaultSyndrome) -> FaultKind {
    if syndrome.imprecise_async {
        return FaultKind::Dropped;
    }
    if syndrome.illegal_instruction
        || syndrome.privileged_instruction
        || syndrome.divide_by_zero
        || syndrome.misaligned_precise
        || syndrome.call_overflow
        || syndrome.unstacking_failed
        || syndrome.invalid_pc_or_state
    {
        return FaultKind::FatalAttributable;
    }
    if let Some(addr) = syndrome.data_fault_addr {
        if syndrome.data_fault_is_mapped_dynamic {
            return FaultKind::RecoverableDataFault { addr };
        }
    }
    FaultKind::FatalAttributable
}

/// One vector-flag buffer: a lock word, a pending-group summary, and per-
/// source content bits (spec §4.10 "Vector dispatch").
pub struct VectorBuffer {
    locked: AtomicBool,
    group_pending: AtomicU32,
    content: [AtomicU32; VECTOR_WORDS],
}

impl VectorBuffer {
    pub const fn new() -> VectorBuffer {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: AtomicU32 = AtomicU32::new(0);
        VectorBuffer {
            locked: AtomicBool::new(false),
            group_pending: AtomicU32::new(0),
            content: [ZERO; VECTOR_WORDS],
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl Default for VectorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Double-buffered interrupt vector flag area: the ISR raises into whichever
/// buffer it can lock; a drain call reads and clears the other.
pub struct VectorFlag {
    buffers: [VectorBuffer; 2],
}

impl VectorFlag {
    pub const fn new() -> VectorFlag {
        VectorFlag {
            buffers: [VectorBuffer::new(), VectorBuffer::new()],
        }
    }

    /// ISR side: set bit `source` in whichever buffer is currently unlocked.
    /// Returns `false` if both buffers are locked (should not happen under
    /// the spec's single-writer-at-a-time protocol; the caller drops the
    /// event in that case, matching "Dropped" fault handling in spirit).
    pub fn raise(&self, source: usize) -> bool {
        let word = source / u32::BITS as usize;
        let bit = source % u32::BITS as usize;
        if word >= VECTOR_WORDS {
            return false;
        }
        for buf in &self.buffers {
            if buf.try_lock() {
                buf.content[word].fetch_or(1 << bit, Ordering::AcqRel);
                buf.group_pending.fetch_or(1 << word, Ordering::AcqRel);
                buf.unlock();
                return true;
            }
        }
        false
    }

    /// Drain side: lock a buffer with pending content, read and clear it,
    /// then unlock. Returns `None` if nothing is pending in either buffer.
    pub fn drain(&self) -> Option<[u32; VECTOR_WORDS]> {
        for buf in &self.buffers {
            if buf.group_pending.load(Ordering::Acquire) == 0 {
                continue;
            }
            if !buf.try_lock() {
                continue;
            }
            let mut out = [0u32; VECTOR_WORDS];
            for (i, word) in buf.content.iter().enumerate() {
                out[i] = word.swap(0, Ordering::AcqRel);
            }
            buf.group_pending.store(0, Ordering::Release);
            buf.unlock();
            return Some(out);
        }
        None
    }
}

impl Default for VectorFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_instruction_fault_is_attributable() {
        let mut s = empty_syndrome();
        s.illegal_instruction = true;
        assert_eq!(classify(s), FaultKind::FatalAttributable);
    }

    #[test]
    fn dynamic_data_fault_is_recoverable() {
        let mut s = empty_syndrome();
        s.data_fault_addr = Some(0x2000_0000);
        s.data_fault_is_mapped_dynamic = true;
        assert_eq!(classify(s), FaultKind::RecoverableDataFault { addr: 0x2000_0000 });
    }

    #[test]
    fn imprecise_async_fault_is_dropped() {
        let mut s = empty_syndrome();
        s.imprecise_async = true;
        s.illegal_instruction = true; // dropped takes priority regardless
        assert_eq!(classify(s), FaultKind::Dropped);
    }

    #[test]
    fn raise_then_drain_roundtrips_bit() {
        let vf = VectorFlag::new();
        assert!(vf.raise(3));
        let snapshot = vf.drain().unwrap();
        assert_eq!(snapshot[0] & (1 << 3), 1 << 3);
        assert!(vf.drain().is_none());
    }

    fn empty_syndrome() -> FaultSyndrome {
        FaultSyndrome {
            illegal_instruction: false,
            privileged_instruction: false,
            divide_by_zero: false,
            misaligned_precise: false,
            call_overflow: false,
            unstacking_failed: false,
            invalid_pc_or_state: false,
            data_fault_addr: None,
            data_fault_is_mapped_dynamic: false,
            imprecise_async: false,
        }
    }
}
