/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Synchronous Invocation (spec §4.6).
//!
//! Grounded on `nucleus/src/caps/resume_cap.rs`'s commentary about
//! call/reply capabilities, generalized from a single resume token into the
//! spec's full cross-process call stack with fault-return semantics.

use crate::{
    config::{MAX_INVOCATIONS, MAX_INV_DEPTH},
    error::SivError,
    objects::thd::RegisterFrame,
};

/// An invocation capability: `{process, entry, stack, exc_ret_flag}` (spec
/// §3 "Invocation frame" / §4.6).
#[derive(Debug, Clone, Copy)]
pub struct InvTarget {
    pub process: usize,
    pub entry: usize,
    pub stack: usize,
    pub is_exc_ret: bool,
}

/// One node on a thread's invocation stack (spec §3 "Invocation frame").
pub struct InvFrame {
    pub target_process: usize,
    pub active_thread: usize,
    pub is_exc_ret: bool,
    /// Caller's register snapshot, restored verbatim by `Inv_Ret` (L3).
    pub saved_regs: RegisterFrame,
    /// Arena index of the frame below this one, if any.
    pub prev: Option<usize>,
}

/// Arena of live invocation-stack frames.
pub struct InvArena {
    frames: [Option<InvFrame>; MAX_INVOCATIONS],
}

impl InvArena {
    pub fn new() -> InvArena {
        InvArena {
            frames: core::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&InvFrame> {
        self.frames.get(idx)?.as_ref()
    }

    fn alloc(&mut self, frame: InvFrame) -> Result<usize, SivError> {
        for (idx, slot) in self.frames.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(frame);
                return Ok(idx);
            }
        }
        Err(SivError::Full)
    }

    fn free(&mut self, idx: usize) -> Option<InvFrame> {
        self.frames.get_mut(idx)?.take()
    }
}

impl Default for InvArena {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread's invocation-stack head plus depth counter (spec §3 "context"
/// region, I7: "depth equals the number of nodes reachable from the head").
#[derive(Debug, Clone, Copy, Default)]
pub struct InvStack {
    pub top: Option<usize>,
    pub depth: usize,
}

/// `Inv_Act`: push a frame for `target`, returning the frame's arena index.
/// The caller swaps `active_thread` to the target process's address space
/// out-of-band via [`crate::arch::PlatformOps::pgtbl_set`]; this function
/// only maintains the stack-and-depth bookkeeping (I7).
pub fn inv_act(
    arena: &mut InvArena,
    stack: &mut InvStack,
    target: InvTarget,
    active_thread: usize,
    saved_regs: RegisterFrame,
) -> Result<usize, SivError> {
    if stack.depth >= MAX_INV_DEPTH {
        return Err(SivError::Full);
    }
    let idx = arena.alloc(InvFrame {
        target_process: target.process,
        active_thread,
        is_exc_ret: target.is_exc_ret,
        saved_regs,
        prev: stack.top,
    })?;
    stack.top = Some(idx);
    stack.depth += 1;
    Ok(idx)
}

/// `Inv_Ret`: pop the top frame, returning its saved registers to restore
/// (L3) plus whether this was a fault-synthesized exceptional return.
pub fn inv_ret(arena: &mut InvArena, stack: &mut InvStack) -> Result<(RegisterFrame, bool), SivError> {
    let idx = stack.top.ok_or(SivError::Empty)?;
    let frame = arena.free(idx).ok_or(SivError::Empty)?;
    stack.top = frame.prev;
    stack.depth -= 1;
    Ok((frame.saved_regs, frame.is_exc_ret))
}

/// On an unrecoverable fault inside an invocation: synthesize an `Inv_Ret`
/// with `SIV_FAULT` if the top frame's `is_exc_ret` is set (spec §4.6);
/// returns `None` if the thread must instead enter `EXCPEND`.
pub fn inv_fault(arena: &mut InvArena, stack: &mut InvStack) -> Option<(RegisterFrame, SivError)> {
    let idx = stack.top?;
    if !arena.get(idx)?.is_exc_ret {
        return None;
    }
    let (regs, _) = inv_ret(arena, stack).ok()?;
    Some((regs, SivError::Fault))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> InvTarget {
        InvTarget {
            process: 1,
            entry: 0x1000,
            stack: 0x2000,
            is_exc_ret: true,
        }
    }

    #[test]
    fn act_then_ret_restores_registers_and_depth() {
        let mut arena = InvArena::new();
        let mut stack = InvStack::default();
        let mut regs = RegisterFrame::empty();
        regs.pc = 0xdead;
        inv_act(&mut arena, &mut stack, target(), 0, regs.clone()).unwrap();
        assert_eq!(stack.depth, 1);
        let (restored, is_exc) = inv_ret(&mut arena, &mut stack).unwrap();
        assert_eq!(restored.pc, 0xdead);
        assert!(!is_exc);
        assert_eq!(stack.depth, 0);
        assert!(stack.top.is_none());
    }

    #[test]
    fn depth_overflow_is_rejected() {
        let mut arena = InvArena::new();
        let mut stack = InvStack::default();
        for _ in 0..MAX_INV_DEPTH {
            inv_act(&mut arena, &mut stack, target(), 0, RegisterFrame::empty()).unwrap();
        }
        assert_eq!(
            inv_act(&mut arena, &mut stack, target(), 0, RegisterFrame::empty()),
            Err(SivError::Full)
        );
    }

    #[test]
    fn fault_with_exc_ret_synthesizes_fault_return() {
        let mut arena = InvArena::new();
        let mut stack = InvStack::default();
        inv_act(&mut arena, &mut stack, target(), 0, RegisterFrame::empty()).unwrap();
        let (_, err) = inv_fault(&mut arena, &mut stack).unwrap();
        assert_eq!(err, SivError::Fault);
        assert_eq!(stack.depth, 0);
    }

    #[test]
    fn fault_without_exc_ret_leaves_thread_to_excpend() {
        let mut arena = InvArena::new();
        let mut stack = InvStack::default();
        let mut t = target();
        t.is_exc_ret = false;
        inv_act(&mut arena, &mut stack, t, 0, RegisterFrame::empty()).unwrap();
        assert!(inv_fault(&mut arena, &mut stack).is_none());
    }
}
