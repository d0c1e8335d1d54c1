/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Capability slot record (spec §3 "Capability slot").
//!
//! `type_stat` packs `{type:8, status:8, attr:16}` into one word using
//! `tock_registers::register_bitfields!`, generalizing the teacher's
//! per-capability-type `register_bitfields!` blocks
//! (`nucleus/src/caps/untyped_cap.rs` et al.) into the single `Packed<T>`
//! abstraction the spec's redesign notes (§9) ask for, instead of one
//! bitfield type per capability kind. The packed word itself lives in an
//! `AtomicU32` so freeze/unfreeze can be expressed as the compare-and-swap
//! invariant I4 demands, rather than a plain store.

use core::sync::atomic::{AtomicU32, Ordering};
use tock_registers::{register_bitfields, LocalRegisterCopy};

register_bitfields! {
    u32,
    TypeStat [
        Type OFFSET(0) NUMBITS(8) [],
        Status OFFSET(8) NUMBITS(8) [],
        Attr OFFSET(16) NUMBITS(16) [],
    ]
}

/// Capability type tag (spec §3 "Capability types").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CapType {
    Nop = 0,
    Kfn = 1,
    Kom = 2,
    Cpt = 3,
    Pgt = 4,
    Prc = 5,
    Thd = 6,
    Inv = 7,
    Sig = 8,
}

impl CapType {
    const fn from_u8(v: u8) -> Option<CapType> {
        Some(match v {
            0 => CapType::Nop,
            1 => CapType::Kfn,
            2 => CapType::Kom,
            3 => CapType::Cpt,
            4 => CapType::Pgt,
            5 => CapType::Prc,
            6 => CapType::Thd,
            7 => CapType::Inv,
            8 => CapType::Sig,
            _ => return None,
        })
    }
}

/// Capability status (spec §3 "Statuses", I1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotStatus {
    Valid = 0,
    Creating = 1,
    Frozen = 2,
}

impl SlotStatus {
    const fn from_u8(v: u8) -> Option<SlotStatus> {
        Some(match v {
            0 => SlotStatus::Valid,
            1 => SlotStatus::Creating,
            2 => SlotStatus::Frozen,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    /// Capability attributes (spec §3 "Attributes").
    pub struct SlotAttr: u16 {
        const ROOT = 1 << 0;
        const LEAF = 1 << 1;
    }
}

fn pack(ty: CapType, status: SlotStatus, attr: SlotAttr) -> u32 {
    let mut reg: LocalRegisterCopy<u32, TypeStat::Register> = LocalRegisterCopy::new(0);
    reg.modify(
        TypeStat::Type.val(ty as u32)
            + TypeStat::Status.val(status as u32)
            + TypeStat::Attr.val(attr.bits() as u32),
    );
    reg.get()
}

fn decode(raw: u32) -> LocalRegisterCopy<u32, TypeStat::Register> {
    LocalRegisterCopy::new(raw)
}

/// One capability-table entry (spec §3 "Capability slot").
///
/// `object` and the three info words are deliberately untyped here; the
/// per-type interpretation lives with the owning object module
/// (`objects::kom`, `objects::pgt`, ...), matching the spec's description
/// of "descriptive immediate for ranged caps" vs. a true object pointer.
#[derive(Debug)]
pub struct CapSlot {
    type_stat: AtomicU32,
    /// Root: refcount of leaves + structural refs. Leaf: slot index of its
    /// root within `root_table`.
    pub root_ref: usize,
    /// Leaf only: arena index of the `CapTable` holding this leaf's true
    /// root slot (paired with `root_ref`; a root may delegate leaves into
    /// any other table, so the leaf must carry both halves of the pointer
    /// rather than assume it shares its own table). Unused (left `0`) on
    /// root slots.
    pub root_table: usize,
    /// Sub-operation permission mask, ANDed on delegation.
    pub flag: u32,
    /// Arena index (or encoded immediate) of the backing kernel object.
    pub object: usize,
    /// Wall-tick at which this slot was frozen.
    pub timestamp: u64,
    /// Type-specific info words.
    pub info: [u32; 3],
}

impl Default for CapSlot {
    fn default() -> Self {
        Self::empty()
    }
}

impl CapSlot {
    /// An empty slot: `type_stat` all-zero (I: "a slot is empty iff its
    /// `type_stat` word is zero").
    pub const fn empty() -> CapSlot {
        CapSlot {
            type_stat: AtomicU32::new(0),
            root_ref: 0,
            root_table: 0,
            flag: 0,
            object: 0,
            timestamp: 0,
            info: [0; 3],
        }
    }

    /// True iff `type_stat` is all-zero.
    pub fn is_empty(&self) -> bool {
        self.type_stat.load(Ordering::Acquire) == 0
    }

    pub fn cap_type(&self) -> Option<CapType> {
        CapType::from_u8(decode(self.type_stat.load(Ordering::Acquire)).read(TypeStat::Type) as u8)
    }

    pub fn status(&self) -> Option<SlotStatus> {
        SlotStatus::from_u8(
            decode(self.type_stat.load(Ordering::Acquire)).read(TypeStat::Status) as u8,
        )
    }

    pub fn attr(&self) -> SlotAttr {
        SlotAttr::from_bits_truncate(
            decode(self.type_stat.load(Ordering::Acquire)).read(TypeStat::Attr) as u16,
        )
    }

    pub fn is_root(&self) -> bool {
        self.attr().contains(SlotAttr::ROOT)
    }

    pub fn is_leaf(&self) -> bool {
        self.attr().contains(SlotAttr::LEAF)
    }

    /// Overwrite this slot in place with a fully-initialized record. Used by
    /// `*_Crt` for roots and by `Cpt_Add` for leaves. Only valid on a slot
    /// the caller already holds exclusively (an empty destination slot).
    #[allow(clippy::too_many_arguments)]
    pub fn install(
        &mut self,
        ty: CapType,
        status: SlotStatus,
        attr: SlotAttr,
        flag: u32,
        object: usize,
        root_table: usize,
        root_ref: usize,
        info: [u32; 3],
    ) {
        self.root_ref = root_ref;
        self.root_table = root_table;
        self.flag = flag;
        self.object = object;
        self.timestamp = 0;
        self.info = info;
        self.type_stat
            .store(pack(ty, status, attr), Ordering::Release);
    }

    /// Atomically transition `VALID -> FROZEN`, stamping `timestamp` after
    /// the CAS succeeds (spec §5: "timestamp is stamped after the CAS that
    /// freezes a slot"). Returns `false` if the slot was not `VALID`.
    pub fn try_freeze(&mut self, now: u64) -> bool {
        let ty = match self.cap_type() {
            Some(t) => t,
            None => return false,
        };
        let attr = self.attr();
        let valid = pack(ty, SlotStatus::Valid, attr);
        let frozen = pack(ty, SlotStatus::Frozen, attr);
        let ok = self
            .type_stat
            .compare_exchange(valid, frozen, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            self.timestamp = now;
        }
        ok
    }

    /// Atomically transition `FROZEN -> VALID` (I4: only the freezing
    /// operation's abort path, or this explicit unfreeze, may do this).
    pub fn try_unfreeze(&mut self) -> bool {
        let ty = match self.cap_type() {
            Some(t) => t,
            None => return false,
        };
        let attr = self.attr();
        let frozen = pack(ty, SlotStatus::Frozen, attr);
        let valid = pack(ty, SlotStatus::Valid, attr);
        self.type_stat
            .compare_exchange(frozen, valid, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transition `CREATING -> VALID`, completing a `*_Crt` operation.
    pub fn finish_creating(&mut self) -> bool {
        let ty = match self.cap_type() {
            Some(t) => t,
            None => return false,
        };
        let attr = self.attr();
        let creating = pack(ty, SlotStatus::Creating, attr);
        let valid = pack(ty, SlotStatus::Valid, attr);
        self.type_stat
            .compare_exchange(creating, valid, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Zero the slot in place (delete/remove).
    pub fn clear(&mut self) {
        self.type_stat.store(0, Ordering::Release);
        self.root_ref = 0;
        self.root_table = 0;
        self.flag = 0;
        self.object = 0;
        self.timestamp = 0;
        self.info = [0; 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_has_zero_type_stat() {
        assert!(CapSlot::empty().is_empty());
    }

    #[test]
    fn install_round_trips_fields() {
        let mut slot = CapSlot::empty();
        slot.install(CapType::Sig, SlotStatus::Valid, SlotAttr::ROOT, 0b11, 42, 0, 0, [1, 2, 3]);
        assert!(!slot.is_empty());
        assert_eq!(slot.cap_type(), Some(CapType::Sig));
        assert_eq!(slot.status(), Some(SlotStatus::Valid));
        assert!(slot.is_root());
        assert_eq!(slot.flag, 0b11);
        assert_eq!(slot.object, 42);
        assert_eq!(slot.info, [1, 2, 3]);
    }

    #[test]
    fn freeze_then_unfreeze_roundtrips() {
        let mut slot = CapSlot::empty();
        slot.install(CapType::Cpt, SlotStatus::Valid, SlotAttr::LEAF, 0, 0, 0, 0, [0; 3]);
        assert!(slot.try_freeze(7));
        assert_eq!(slot.status(), Some(SlotStatus::Frozen));
        assert_eq!(slot.timestamp, 7);
        assert!(slot.try_unfreeze());
        assert_eq!(slot.status(), Some(SlotStatus::Valid));
        assert!(slot.is_leaf());
    }

    #[test]
    fn freeze_twice_fails_second_time() {
        let mut slot = CapSlot::empty();
        slot.install(CapType::Cpt, SlotStatus::Valid, SlotAttr::ROOT, 0, 0, 0, 0, [0; 3]);
        assert!(slot.try_freeze(1));
        assert!(!slot.try_freeze(2));
    }

    #[test]
    fn clear_empties_slot() {
        let mut slot = CapSlot::empty();
        slot.install(CapType::Thd, SlotStatus::Valid, SlotAttr::ROOT, 0, 7, 0, 0, [0; 3]);
        slot.clear();
        assert!(slot.is_empty());
    }
}
