/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Boot-time fixed-slot creation (spec §6 "Boot state").
//!
//! Grounded on `nucleus/src/boot_info.rs`'s region-bookkeeping shape,
//! generalized from a single root-task bring-up into the fixed eight-slot
//! layout the spec's end-to-end scenario 1 exercises directly: "After
//! `Kmain`, capability 3 (init thread) is the single `READY` thread at
//! priority 0 on CPU 0; `sig_num` of caps 6 and 7 equals 0."
//!
//! Every slot installed here bypasses the normal `Cpt_Add`/`*_Crt` paths —
//! there is no pre-existing root capability to delegate from yet — so this
//! is the one place in the crate allowed to reach into `CapTable::slot_mut`
//! directly instead of going through `caps::table`'s public operations.

use crate::{
    arch::PlatformOps,
    caps::{
        flags::KomFlags,
        slot::{CapType, SlotAttr, SlotStatus},
    },
    config::{BOOT_CAPTABLE_ENTRIES, BOOT_KOM_BASE, BOOT_KOM_SIZE, PGT_SIZE_ORDER},
    error::KernResult,
    kernel::KernelContext,
    kfn::KfnGroup,
    objects::{
        pgt::{pgt_crt, NumOrder, SizeOrder},
        prc::{prc_crt, AddressSpace},
        sig::Signal,
        thd::Thread,
    },
};

/// Fixed boot slot indices (spec §6): `0..7` in the root capability table.
pub mod slot {
    pub const ROOT_CPT: usize = 0;
    pub const TOP_PGT: usize = 1;
    pub const INIT_PRC: usize = 2;
    pub const INIT_THD: usize = 3;
    pub const INIT_KFN: usize = 4;
    pub const INIT_KOM: usize = 5;
    pub const TICK_SIG: usize = 6;
    pub const VECTOR_SIG: usize = 7;
}

/// Run the fixed boot sequence on a freshly constructed [`KernelContext`],
/// leaving the root capability table's slots `0..7` populated and the
/// initial thread `READY` at priority 0 on `cpu`.
pub fn boot<P: PlatformOps>(ctx: &mut KernelContext<P>, cpu: usize) -> KernResult<()> {
    let root = ctx.cpt.alloc_root(BOOT_CAPTABLE_ENTRIES, 0)?;

    let top_pgt = pgt_crt(&mut ctx.pgt, 0, SizeOrder(PGT_SIZE_ORDER), NumOrder(0), None)?;
    let init_prc = prc_crt(&mut ctx.prc, root, AddressSpace::Capability(top_pgt))?;
    let init_thd = ctx.thd.alloc(Thread::new(init_prc)).map_err(crate::error::KernError::from)?;
    ctx.thd_sched_bind(cpu, init_thd, None, None, 0)?;

    let tick_sig = ctx.sig.alloc(Signal::new(true)).map_err(crate::error::KernError::from)?;
    let vector_sig = ctx.sig.alloc(Signal::new(true)).map_err(crate::error::KernError::from)?;
    ctx.cpus[cpu].current = Some(init_thd);
    ctx.cpus[cpu].tick_sig = Some(tick_sig);
    ctx.cpus[cpu].vector_sig = Some(vector_sig);

    let table = ctx.cpt.get_mut(root).ok_or(crate::error::CptError::Range)?;

    table.slot_mut(slot::ROOT_CPT).ok_or(crate::error::CptError::Range)?.install(
        CapType::Cpt,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        crate::caps::flags::CptFlags::ALL.bits(),
        root,
        0,
        0,
        [0; 3],
    );
    table.slot_mut(slot::TOP_PGT).ok_or(crate::error::CptError::Range)?.install(
        CapType::Pgt,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        crate::caps::flags::PgtFlags::ALL.bits(),
        top_pgt,
        0,
        0,
        [0; 3],
    );
    table.slot_mut(slot::INIT_PRC).ok_or(crate::error::CptError::Range)?.install(
        CapType::Prc,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        crate::caps::flags::PrcFlags::ALL.bits(),
        init_prc,
        0,
        0,
        [0; 3],
    );
    table.slot_mut(slot::INIT_THD).ok_or(crate::error::CptError::Range)?.install(
        CapType::Thd,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        crate::caps::flags::ThdFlags::ALL.bits(),
        init_thd.0,
        0,
        0,
        [0; 3],
    );
    table.slot_mut(slot::INIT_KFN).ok_or(crate::error::CptError::Range)?.install(
        CapType::Kfn,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        u32::MAX,
        0,
        0,
        0,
        [KfnGroup::Mem as u32, 0xF5FF, 0],
    );
    let kom = crate::objects::kom::KomRange {
        begin: BOOT_KOM_BASE,
        end: BOOT_KOM_BASE + BOOT_KOM_SIZE,
        flags: KomFlags::ALL,
    };
    table.slot_mut(slot::INIT_KOM).ok_or(crate::error::CptError::Range)?.install(
        CapType::Kom,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        KomFlags::ALL.bits(),
        0,
        0,
        0,
        kom.encode(),
    );
    table.slot_mut(slot::TICK_SIG).ok_or(crate::error::CptError::Range)?.install(
        CapType::Sig,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        crate::caps::flags::SigFlags::ALL.bits(),
        tick_sig,
        0,
        0,
        [0; 3],
    );
    table.slot_mut(slot::VECTOR_SIG).ok_or(crate::error::CptError::Range)?.install(
        CapType::Sig,
        SlotStatus::Valid,
        SlotAttr::ROOT,
        crate::caps::flags::SigFlags::ALL.bits(),
        vector_sig,
        0,
        0,
        [0; 3],
    );

    ctx.booted = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arch::test_platform::TestPlatform, objects::thd::ThreadState};

    #[test]
    fn boot_populates_fixed_slots_and_readies_init_thread() {
        let mut ctx = KernelContext::new(0, TestPlatform::new());
        boot(&mut ctx, 0).unwrap();

        let root = 0; // alloc_root on a fresh arena always returns index 0
        let root_slot = ctx.cpt.get(root).unwrap().slot(slot::ROOT_CPT).unwrap();
        assert_eq!(root_slot.cap_type(), Some(CapType::Cpt));

        let thd_slot = ctx.cpt.get(root).unwrap().slot(slot::INIT_THD).unwrap();
        let init_thd = crate::objects::thd::Tid(thd_slot.object);
        assert_eq!(ctx.thd.get(init_thd).unwrap().state, ThreadState::Ready);
        assert_eq!(ctx.cpus[0].current, Some(init_thd));

        let tick_slot = ctx.cpt.get(root).unwrap().slot(slot::TICK_SIG).unwrap();
        assert_eq!(ctx.sig.get(tick_slot.object).unwrap().count, 0);
        let vector_slot = ctx.cpt.get(root).unwrap().slot(slot::VECTOR_SIG).unwrap();
        assert_eq!(ctx.sig.get(vector_slot.object).unwrap().count, 0);
    }
}
