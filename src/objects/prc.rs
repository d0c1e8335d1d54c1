/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Process Object (spec §4.4).
//!
//! Grounded on `nucleus/src/objects/nucleus_object.rs`'s "root task" sketch,
//! generalized from a single privileged root object into the spec's plain
//! `{cpt, pgt}` bundle with no scheduling state of its own.

use crate::{config::MAX_PROCESSES, error::PthError};

/// How a process's address space is bound (spec §9 Open Question: raw-mode
/// ownership decided as process-owned, kernel-trusted, never refcounted —
/// see `DESIGN.md`).
pub enum AddressSpace {
    /// Arena index of a root `PGT` capability; the process holds a structural
    /// reference counted in that capability's `root_ref`.
    Capability(usize),
    /// A trusted raw page-table root address, supplied at creation and never
    /// freed by the kernel (`raw_pgt` feature, `RME_PGT_RAW_ENABLE`).
    #[cfg(feature = "raw_pgt")]
    Raw(usize),
}

/// A process bundles one capability-table reference and one address-space
/// reference (spec §3 "Process"). It carries no runtime/scheduling state.
pub struct Process {
    /// Arena index of the root `CPT` capability this process's threads resolve names against.
    pub cpt: usize,
    pub pgt: AddressSpace,
    /// Count of threads currently bound to this process; `Prc_Cpt`/`Prc_Pgt`
    /// refuse to swap while this is non-zero.
    pub live_threads: usize,
}

pub struct PrcArena {
    procs: [Option<Process>; MAX_PROCESSES],
}

impl PrcArena {
    pub fn new() -> PrcArena {
        PrcArena {
            procs: core::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&Process> {
        self.procs.get(idx)?.as_ref()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Process> {
        self.procs.get_mut(idx)?.as_mut()
    }

    pub fn alloc(&mut self, proc: Process) -> Result<usize, PthError> {
        for (idx, slot) in self.procs.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(proc);
                return Ok(idx);
            }
        }
        Err(PthError::Refcnt)
    }

    pub fn free(&mut self, idx: usize) {
        if let Some(slot) = self.procs.get_mut(idx) {
            *slot = None;
        }
    }
}

impl Default for PrcArena {
    fn default() -> Self {
        Self::new()
    }
}

/// `Prc_Crt`: bind a fresh process to `cpt`/`pgt`.
pub fn prc_crt(arena: &mut PrcArena, cpt: usize, pgt: AddressSpace) -> Result<usize, PthError> {
    arena.alloc(Process {
        cpt,
        pgt,
        live_threads: 0,
    })
}

/// `Prc_Del`: free a process with no threads currently bound.
pub fn prc_del(arena: &mut PrcArena, idx: usize) -> Result<(), PthError> {
    {
        let proc = arena.get(idx).ok_or(PthError::Conflict)?;
        if proc.live_threads != 0 {
            return Err(PthError::Conflict);
        }
    }
    arena.free(idx);
    Ok(())
}

/// `Prc_Cpt`: atomically swap the process's capability-table reference,
/// failing if threads are currently running in the process.
pub fn prc_cpt(arena: &mut PrcArena, idx: usize, new_cpt: usize) -> Result<usize, PthError> {
    let proc = arena.get_mut(idx).ok_or(PthError::Conflict)?;
    if proc.live_threads != 0 {
        return Err(PthError::Conflict);
    }
    Ok(core::mem::replace(&mut proc.cpt, new_cpt))
}

/// `Prc_Pgt`: atomically swap the process's address-space reference,
/// failing if threads are currently running in the process.
pub fn prc_pgt(arena: &mut PrcArena, idx: usize, new_pgt: AddressSpace) -> Result<AddressSpace, PthError> {
    let proc = arena.get_mut(idx).ok_or(PthError::Conflict)?;
    if proc.live_threads != 0 {
        return Err(PthError::Conflict);
    }
    Ok(core::mem::replace(&mut proc.pgt, new_pgt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_delete_empty_process() {
        let mut arena = PrcArena::new();
        let idx = prc_crt(&mut arena, 4, AddressSpace::Capability(5)).unwrap();
        prc_del(&mut arena, idx).unwrap();
        assert!(arena.get(idx).is_none());
    }

    #[test]
    fn swap_fails_while_threads_are_bound() {
        let mut arena = PrcArena::new();
        let idx = prc_crt(&mut arena, 4, AddressSpace::Capability(5)).unwrap();
        arena.get_mut(idx).unwrap().live_threads = 1;
        assert_eq!(prc_cpt(&mut arena, idx, 9), Err(PthError::Conflict));
    }

    #[test]
    fn swap_replaces_and_returns_old_reference() {
        let mut arena = PrcArena::new();
        let idx = prc_crt(&mut arena, 4, AddressSpace::Capability(5)).unwrap();
        let old = prc_cpt(&mut arena, idx, 9).unwrap();
        assert_eq!(old, 4);
        assert_eq!(arena.get(idx).unwrap().cpt, 9);
    }
}
