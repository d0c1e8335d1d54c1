/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Capability Table component (spec §4.2).
//!
//! Grounded on `nucleus/src/caps/captable.rs` (the `CapTableEntry`/
//! `resolve_address_bits` shape) and `nucleus/src/caps/derivation_tree.rs`
//! (root/leaf bookkeeping), generalized per the spec's single `CapSlot`
//! record (§3) instead of seL4-style separate cap word + MDB node, and per
//! the §9 "arena with integer handles" redesign note instead of raw
//! pointers into a CapTableEntry.

use crate::{
    caps::{
        name::CapName,
        slot::{CapSlot, CapType, SlotAttr, SlotStatus},
    },
    config::{MAX_CAPTABLES, MAX_CAPTABLE_ENTRIES, QUIE_TIME},
    error::CptError,
    kot::Kot,
    objects::kom::KomRange,
};

/// Backing-store bytes per capability-table slot, mirroring the original's
/// 32-byte `cte_t` (cap word + derivation-tree node).
pub const CAPTABLE_ENTRY_BYTES: usize = 32;

/// Bytes a capability table with `entries` slots occupies in kernel memory.
pub const fn captbl_size(entries: usize) -> usize {
    entries * CAPTABLE_ENTRY_BYTES
}

/// A capability table: `entries` live slots backed by kernel memory at `base`.
pub struct CapTable {
    slots: [CapSlot; MAX_CAPTABLE_ENTRIES],
    /// Number of slots actually usable (`entries`, as given to `Cpt_Crt`).
    pub entries: usize,
    /// Kernel-memory address this table's backing storage was marked at.
    pub base: usize,
}

impl CapTable {
    fn new(entries: usize, base: usize) -> CapTable {
        CapTable {
            slots: core::array::from_fn(|_| CapSlot::empty()),
            entries,
            base,
        }
    }

    pub fn slot(&self, index: usize) -> Option<&CapSlot> {
        if index < self.entries {
            Some(&self.slots[index])
        } else {
            None
        }
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut CapSlot> {
        if index < self.entries {
            Some(&mut self.slots[index])
        } else {
            None
        }
    }
}

/// Arena of live capability tables, indexed by a stable `usize` handle
/// (spec §9: "arena with integer handles per object kind").
pub struct CapTableArena {
    tables: [Option<CapTable>; MAX_CAPTABLES],
}

impl CapTableArena {
    pub fn new() -> CapTableArena {
        CapTableArena {
            tables: core::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&CapTable> {
        self.tables.get(idx)?.as_ref()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut CapTable> {
        self.tables.get_mut(idx)?.as_mut()
    }

    fn alloc(&mut self, entries: usize, base: usize) -> Result<usize, CptError> {
        for (idx, slot) in self.tables.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(CapTable::new(entries, base));
                return Ok(idx);
            }
        }
        Err(CptError::Kot)
    }

    /// Bootstrap a root table with no parent slot pointing at it (spec §6
    /// "Boot state": the very first capability table has no `Cpt_Crt` caller).
    pub fn alloc_root(&mut self, entries: usize, base: usize) -> Result<usize, CptError> {
        self.alloc(entries, base)
    }

    fn free(&mut self, idx: usize) {
        if let Some(slot) = self.tables.get_mut(idx) {
            *slot = None;
        }
    }
}

impl Default for CapTableArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `name` against `root_table` following the one-/two-level
/// encoding (spec §3, §4.2 "Two-level lookup"). Returns `(table_idx,
/// slot_idx)` of the final slot. Enforces "frozen/type checks with an
/// acquire-read barrier before any subsequent read" by reading the
/// intermediate `CPT` slot's status before following `object` into the
/// nested table.
pub fn resolve(
    arena: &CapTableArena,
    root_table: usize,
    name: CapName,
) -> Result<(usize, usize), CptError> {
    if name.is_null() {
        return Err(CptError::Null);
    }
    let (first, rest) = name.decompose();
    match rest {
        None => Ok((root_table, first)),
        Some(second) => {
            let master = arena.get(root_table).ok_or(CptError::Range)?;
            let cpt_slot = master.slot(first).ok_or(CptError::Range)?;
            if cpt_slot.is_empty() {
                return Err(CptError::Null);
            }
            if cpt_slot.cap_type() != Some(CapType::Cpt) {
                return Err(CptError::Type);
            }
            if cpt_slot.status() == Some(SlotStatus::Frozen) {
                return Err(CptError::Frozen);
            }
            let nested_idx = cpt_slot.object;
            Ok((nested_idx, second))
        }
    }
}

/// Look up and type-check the slot named by `name`, returning a shared
/// reference.
pub fn lookup<'a>(
    arena: &'a CapTableArena,
    root_table: usize,
    name: CapName,
) -> Result<&'a CapSlot, CptError> {
    let (table, slot) = resolve(arena, root_table, name)?;
    arena
        .get(table)
        .ok_or(CptError::Range)?
        .slot(slot)
        .ok_or(CptError::Range)
}

/// `Cpt_Crt`: create a new capability table rooted at `dst_slot` in
/// `master`, backed by `entries` slots of kernel memory taken from
/// `kmem_cap` at relative offset `raddr`.
pub fn cpt_crt(
    arena: &mut CapTableArena,
    kot: &Kot,
    master: usize,
    dst_slot: usize,
    kmem_cap: KomRange,
    raddr: usize,
    entries: usize,
) -> Result<(), CptError> {
    use crate::caps::flags::KomFlags;

    if entries == 0 || entries > MAX_CAPTABLE_ENTRIES {
        return Err(CptError::Range);
    }
    if !kmem_cap.flags.contains(KomFlags::CPT) {
        return Err(CptError::Flag);
    }
    let size = captbl_size(entries);
    let range = kmem_cap.sub_range(raddr, size).ok_or(CptError::Range)?;

    {
        let table = arena.get(master).ok_or(CptError::Range)?;
        let dst = table.slot(dst_slot).ok_or(CptError::Range)?;
        if !dst.is_empty() {
            return Err(CptError::Exist);
        }
    }

    kot.mark(range.begin, size).map_err(|_| CptError::Kot)?;

    let new_idx = match arena.alloc(entries, range.begin) {
        Ok(idx) => idx,
        Err(e) => {
            let _ = kot.erase(range.begin, size);
            return Err(e);
        }
    };

    let table = arena.get_mut(master).ok_or(CptError::Range)?;
    let dst = table.slot_mut(dst_slot).ok_or(CptError::Range)?;
    dst.install(
        CapType::Cpt,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        crate::caps::flags::CptFlags::ALL.bits(),
        new_idx,
        0,
        0,
        [0; 3],
    );
    Ok(())
}

/// `Cpt_Frz`: `VALID -> FROZEN`, stamping `timestamp`.
pub fn cpt_frz(arena: &mut CapTableArena, table: usize, slot: usize, now: u64) -> Result<(), CptError> {
    let t = arena.get_mut(table).ok_or(CptError::Range)?;
    let s = t.slot_mut(slot).ok_or(CptError::Range)?;
    if s.is_empty() {
        return Err(CptError::Null);
    }
    if s.try_freeze(now) {
        Ok(())
    } else {
        Err(CptError::Frozen)
    }
}

/// `Cpt_Del`: delete an unreferenced, frozen, quiescent root `CPT` capability.
pub fn cpt_del(
    arena: &mut CapTableArena,
    kot: &Kot,
    table: usize,
    slot: usize,
    tick_now: u64,
) -> Result<(), CptError> {
    let (base, entries, root_ref);
    {
        let t = arena.get(table).ok_or(CptError::Range)?;
        let s = t.slot(slot).ok_or(CptError::Range)?;
        if s.is_empty() {
            return Err(CptError::Null);
        }
        if s.cap_type() != Some(CapType::Cpt) {
            return Err(CptError::Type);
        }
        if !s.is_root() {
            return Err(CptError::Root);
        }
        if s.status() != Some(SlotStatus::Frozen) {
            return Err(CptError::Frozen);
        }
        if tick_now.saturating_sub(s.timestamp) <= QUIE_TIME {
            return Err(CptError::Quie);
        }
        if s.root_ref != 0 {
            return Err(CptError::Refcnt);
        }
        let child = arena.get(s.object).ok_or(CptError::Range)?;
        base = child.base;
        entries = child.entries;
        root_ref = s.object;
    }
    let t = arena.get_mut(table).ok_or(CptError::Range)?;
    let s = t.slot_mut(slot).ok_or(CptError::Range)?;
    s.clear();
    arena.free(root_ref);
    kot.erase(base, captbl_size(entries)).map_err(|_| CptError::Kot)?;
    Ok(())
}

/// `Cpt_Add`: delegate `src` into the empty `dst` slot, masking its flags
/// with `flag_mask` and bumping the source root's `root_ref`.
#[allow(clippy::too_many_arguments)]
pub fn cpt_add(
    arena: &mut CapTableArena,
    dst_table: usize,
    dst_slot: usize,
    src_table: usize,
    src_slot: usize,
    flag_mask: u32,
) -> Result<(), CptError> {
    let (ty, object, flag, src_root_table, src_root_slot);
    {
        let src_t = arena.get(src_table).ok_or(CptError::Range)?;
        let src = src_t.slot(src_slot).ok_or(CptError::Range)?;
        if src.is_empty() {
            return Err(CptError::Null);
        }
        if src.status() == Some(SlotStatus::Frozen) {
            return Err(CptError::Frozen);
        }
        if src.flag & flag_mask != flag_mask {
            return Err(CptError::Flag);
        }
        ty = src.cap_type().ok_or(CptError::Type)?;
        object = src.object;
        flag = src.flag & flag_mask;
        if src.is_root() {
            (src_root_table, src_root_slot) = (src_table, src_slot);
        } else {
            // Leaf source: delegating from a leaf chains to the leaf's own
            // recorded root, which may live in a table other than `src_table`.
            (src_root_table, src_root_slot) = (src.root_table, src.root_ref);
        }
    }

    {
        let dst_t = arena.get(dst_table).ok_or(CptError::Range)?;
        let dst = dst_t.slot(dst_slot).ok_or(CptError::Range)?;
        if !dst.is_empty() {
            return Err(CptError::Exist);
        }
        let root_t = arena.get(src_root_table).ok_or(CptError::Range)?;
        let root = root_t.slot(src_root_slot).ok_or(CptError::Range)?;
        if root.root_ref == usize::MAX {
            return Err(CptError::Refcnt);
        }
    }

    let dst_t = arena.get_mut(dst_table).ok_or(CptError::Range)?;
    let dst = dst_t.slot_mut(dst_slot).ok_or(CptError::Range)?;
    dst.install(
        ty,
        SlotStatus::Valid,
        SlotAttr::LEAF,
        flag,
        object,
        src_root_table,
        src_root_slot,
        [0; 3],
    );

    let root_t = arena.get_mut(src_root_table).ok_or(CptError::Range)?;
    let root = root_t.slot_mut(src_root_slot).ok_or(CptError::Range)?;
    root.root_ref += 1;
    Ok(())
}

/// `Cpt_Rem`: inverse of `Cpt_Add` for a leaf slot. The leaf's root may live
/// in a different table than the leaf itself (cross-table delegation), so
/// the root's table/slot is read from the leaf record rather than assumed
/// to be `table`.
pub fn cpt_rem(arena: &mut CapTableArena, table: usize, slot: usize) -> Result<(), CptError> {
    let (root_table, root_slot);
    {
        let t = arena.get(table).ok_or(CptError::Range)?;
        let s = t.slot(slot).ok_or(CptError::Range)?;
        if s.is_empty() {
            return Err(CptError::Null);
        }
        if !s.is_leaf() {
            return Err(CptError::Root);
        }
        if s.status() == Some(SlotStatus::Frozen) {
            return Err(CptError::Frozen);
        }
        root_table = s.root_table;
        root_slot = s.root_ref;
    }
    let t = arena.get_mut(table).ok_or(CptError::Range)?;
    let s = t.slot_mut(slot).ok_or(CptError::Range)?;
    s.clear();
    let root_t = arena.get_mut(root_table).ok_or(CptError::Range)?;
    let root = root_t.slot_mut(root_slot).ok_or(CptError::Range)?;
    root.root_ref = root.root_ref.saturating_sub(1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::flags::KomFlags;

    fn setup() -> (CapTableArena, Kot, usize) {
        let kot = Kot::new(0);
        let mut arena = CapTableArena::new();
        let root_idx = arena.alloc(16, 0).unwrap();
        (arena, kot, root_idx)
    }

    #[test]
    fn create_child_table_then_delete_after_quiescence() {
        let (mut arena, kot, root) = setup();
        let kmem = KomRange { begin: 0x1000, end: 0x2000, flags: KomFlags::ALL };
        cpt_crt(&mut arena, &kot, root, 0, kmem, 0, 4).unwrap();
        let child_idx = arena.get(root).unwrap().slot(0).unwrap().object;
        assert!(arena.get(child_idx).is_some());

        // Freeze then attempt delete too early.
        cpt_frz(&mut arena, root, 0, 100).unwrap();
        assert_eq!(cpt_del(&mut arena, &kot, root, 0, 100 + QUIE_TIME - 1), Err(CptError::Quie));
        // Past quiescence, delete succeeds and erases KOT range.
        cpt_del(&mut arena, &kot, root, 0, 100 + QUIE_TIME + 1).unwrap();
        assert!(arena.get(child_idx).is_none());
        assert!(!kot.is_marked(0x1000, captbl_size(4)).unwrap());
    }

    #[test]
    fn delete_fails_while_referenced() {
        let (mut arena, kot, root) = setup();
        let kmem = KomRange { begin: 0x1000, end: 0x2000, flags: KomFlags::ALL };
        cpt_crt(&mut arena, &kot, root, 0, kmem, 0, 4).unwrap();
        // Fabricate a leaf pointing at the root to bump its refcount.
        {
            let t = arena.get_mut(root).unwrap();
            let r = t.slot_mut(0).unwrap();
            r.root_ref = 1;
        }
        cpt_frz(&mut arena, root, 0, 0).unwrap();
        assert_eq!(
            cpt_del(&mut arena, &kot, root, 0, QUIE_TIME + 10),
            Err(CptError::Refcnt)
        );
    }

    #[test]
    fn add_then_remove_restores_refcount() {
        let (mut arena, kot, root) = setup();
        // Install a SIG root cap directly at slot 0 to delegate from.
        {
            let t = arena.get_mut(root).unwrap();
            t.slot_mut(0)
                .unwrap()
                .install(CapType::Sig, SlotStatus::Valid, SlotAttr::ROOT, 0b11, 99, 0, 0, [0; 3]);
        }
        cpt_add(&mut arena, root, 1, root, 0, 0b1).unwrap();
        assert_eq!(arena.get(root).unwrap().slot(0).unwrap().root_ref, 1);
        assert_eq!(arena.get(root).unwrap().slot(1).unwrap().flag, 0b1);
        cpt_rem(&mut arena, root, 1).unwrap();
        assert_eq!(arena.get(root).unwrap().slot(0).unwrap().root_ref, 0);
        let _ = kot; // kot unused directly in this test beyond setup
    }

    #[test]
    fn cross_table_add_then_remove_restores_the_true_roots_refcount() {
        let (mut arena, kot, root) = setup();
        // Install a SIG root cap at (root, 0), then create a second, distinct
        // table and delegate a leaf of it into that table instead of `root`.
        {
            let t = arena.get_mut(root).unwrap();
            t.slot_mut(0)
                .unwrap()
                .install(CapType::Sig, SlotStatus::Valid, SlotAttr::ROOT, 0b11, 99, 0, 0, [0; 3]);
        }
        let kmem = KomRange { begin: 0x1000, end: 0x2000, flags: KomFlags::ALL };
        cpt_crt(&mut arena, &kot, root, 1, kmem, 0, 4).unwrap();
        let other = arena.get(root).unwrap().slot(1).unwrap().object;
        assert_ne!(other, root);

        cpt_add(&mut arena, other, 2, root, 0, 0b1).unwrap();
        assert_eq!(arena.get(root).unwrap().slot(0).unwrap().root_ref, 1);
        let leaf = arena.get(other).unwrap().slot(2).unwrap();
        assert_eq!(leaf.root_table, root);
        assert_eq!(leaf.root_ref, 0);

        cpt_rem(&mut arena, other, 2).unwrap();
        assert_eq!(arena.get(root).unwrap().slot(0).unwrap().root_ref, 0);
        assert!(arena.get(other).unwrap().slot(2).unwrap().is_empty());
    }

    #[test]
    fn add_rejects_flag_escalation() {
        let (mut arena, _kot, root) = setup();
        {
            let t = arena.get_mut(root).unwrap();
            t.slot_mut(0)
                .unwrap()
                .install(CapType::Sig, SlotStatus::Valid, SlotAttr::ROOT, 0b01, 99, 0, 0, [0; 3]);
        }
        assert_eq!(cpt_add(&mut arena, root, 1, root, 0, 0b10), Err(CptError::Flag));
    }
}
