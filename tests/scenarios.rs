/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! End-to-end scenarios exercising the full boot -> dispatch path across
//! several components at once, rather than one function in isolation.

use rme::{
    boot::{boot, slot},
    caps::{
        flags::SigFlags,
        name::CapName,
        slot::CapType,
        table::{cpt_add, cpt_crt, cpt_rem, lookup, resolve},
    },
    error::CptError,
    kernel::KernelContext,
    objects::{
        kom::KomRange,
        prc::{prc_crt, AddressSpace},
        thd::{ThreadState, Thread, Tid},
    },
};
use rme::arch::test_platform::TestPlatform;

fn booted() -> KernelContext<TestPlatform> {
    let mut ctx = KernelContext::new(0x1000, TestPlatform::new());
    boot(&mut ctx, 0).unwrap();
    ctx
}

#[test]
fn boot_leaves_init_thread_ready_at_top_priority_with_empty_signals() {
    let ctx = booted();
    let root = 0;

    let thd_slot = ctx.cpt.get(root).unwrap().slot(slot::INIT_THD).unwrap();
    assert_eq!(thd_slot.cap_type(), Some(CapType::Thd));
    let init_thd = Tid(thd_slot.object);
    let thread = ctx.thd.get(init_thd).unwrap();
    assert_eq!(thread.state, ThreadState::Ready);
    assert_eq!(thread.prio, 0);
    assert_eq!(ctx.cpus[0].current, Some(init_thd));

    for s in [slot::TICK_SIG, slot::VECTOR_SIG] {
        let sig_slot = ctx.cpt.get(root).unwrap().slot(s).unwrap();
        assert_eq!(ctx.sig.get(sig_slot.object).unwrap().count, 0);
    }
}

#[test]
fn delegated_leaf_grants_exactly_its_masked_flags() {
    let mut ctx = booted();
    let root = 0;

    let kom_slot = ctx.cpt.get(root).unwrap().slot(slot::INIT_KOM).unwrap();
    let kmem = KomRange::decode(kom_slot.info);

    // Cpt_Crt a nested table from the boot KOM cap, at a fresh root slot.
    cpt_crt(&mut ctx.cpt, &ctx.kot, root, 9, kmem, 0, 16).unwrap();
    let nested = ctx.cpt.get(root).unwrap().slot(9).unwrap().object;

    // Cpt_Add a full-rights leaf at (9,3) delegated from the boot vector
    // signal (slot 7), masked to SND|RCV.
    let full = (SigFlags::SND | SigFlags::RCV).bits();
    cpt_add(&mut ctx.cpt, nested, 3, root, slot::VECTOR_SIG, full).unwrap();

    let (t, s) = resolve(&ctx.cpt, root, CapName::two_level(9, 3)).unwrap();
    assert_eq!((t, s), (nested, 3));
    let leaf = lookup(&ctx.cpt, root, CapName::two_level(9, 3)).unwrap();
    assert_eq!(leaf.cap_type(), Some(CapType::Sig));
    assert_eq!(leaf.flag, full);

    // A send-only leaf must not also grant receive.
    cpt_add(&mut ctx.cpt, nested, 4, root, slot::VECTOR_SIG, SigFlags::SND.bits()).unwrap();
    let send_only = lookup(&ctx.cpt, root, CapName::two_level(9, 4)).unwrap();
    assert_eq!(send_only.flag & SigFlags::RCV.bits(), 0);
    assert_ne!(send_only.flag & SigFlags::SND.bits(), 0);

    // The delegated leaves live in `nested`, a table distinct from the
    // vector signal's own root table (`root`). Removing them must find and
    // decrement the true root's refcount, not some unrelated slot in
    // `nested` that happens to share the leaf's former slot index.
    let vector_root_ref_before = ctx.cpt.get(root).unwrap().slot(slot::VECTOR_SIG).unwrap().root_ref;
    assert_eq!(vector_root_ref_before, 2);
    cpt_rem(&mut ctx.cpt, nested, 3).unwrap();
    cpt_rem(&mut ctx.cpt, nested, 4).unwrap();
    assert_eq!(ctx.cpt.get(root).unwrap().slot(slot::VECTOR_SIG).unwrap().root_ref, 0);
}

#[test]
fn sig_snd_and_rcv_through_dispatch_honor_delegated_flags() {
    let mut ctx = booted();
    let root = 0;
    let vector_sig_idx = ctx.cpt.get(root).unwrap().slot(slot::VECTOR_SIG).unwrap().object;

    // Delegate a send-only leaf into an empty one-level root slot: the
    // dispatcher's `capid` field only ever resolves one-level names
    // (see DESIGN.md), so exercise the flag check at that granularity.
    cpt_add(&mut ctx.cpt, root, 10, root, slot::VECTOR_SIG, SigFlags::SND.bits()).unwrap();

    let proc = prc_crt(&mut ctx.prc, root, AddressSpace::Capability(0)).unwrap();
    let tid = ctx.thd.alloc(Thread::new(proc)).unwrap();
    ctx.thd_sched_bind(0, tid, None, None, 5).unwrap();

    use rme::syscall::{Service, SyscallArgs};
    let args_snd = SyscallArgs { svc: Service::SigSnd as u8, capid: 10, param0: 0, param1: 0, param2: 0 };
    let ret = rme::syscall::dispatch(&mut ctx, 0, tid, args_snd);
    assert_eq!(ret, Some(0));
    assert_eq!(ctx.sig.get(vector_sig_idx).unwrap().count, 1);

    let args_rcv = SyscallArgs { svc: Service::SigRcv as u8, capid: 10, param0: 2, param1: 0, param2: 0 };
    let ret = rme::syscall::dispatch(&mut ctx, 0, tid, args_rcv);
    assert_eq!(ret, Some(CptError::Flag.wire_code()));
}

#[test]
fn freeze_quiesce_delete_enforces_the_quiescence_window() {
    use rme::caps::table::{cpt_del, cpt_frz};

    let mut ctx = booted();
    let root = 0;
    let kom_slot = ctx.cpt.get(root).unwrap().slot(slot::INIT_KOM).unwrap();
    let kmem = KomRange::decode(kom_slot.info);
    cpt_crt(&mut ctx.cpt, &ctx.kot, root, 9, kmem, 0, 16).unwrap();

    let t0 = 100u64;
    cpt_frz(&mut ctx.cpt, root, 9, t0).unwrap();

    let quie = rme::config::QUIE_TIME;
    assert_eq!(cpt_del(&mut ctx.cpt, &ctx.kot, root, 9, t0 + quie - 1), Err(CptError::Quie));
    cpt_del(&mut ctx.cpt, &ctx.kot, root, 9, t0 + quie + 1).unwrap();
    assert!(ctx.cpt.get(root).unwrap().slot(9).unwrap().is_empty());
}

#[test]
fn scheduler_notification_reports_timeout_after_full_donation() {
    let mut ctx = booted();
    let proc = prc_crt(&mut ctx.prc, 0, AddressSpace::Capability(0)).unwrap();
    let a = ctx.thd.alloc(Thread::new(proc)).unwrap();
    let b = ctx.thd.alloc(Thread::new(proc)).unwrap();
    ctx.thd_sched_bind(0, a, None, None, 2).unwrap();
    ctx.thd_sched_bind(0, b, Some(a), None, 5).unwrap();

    ctx.thd.get_mut(a).unwrap().slice = 10;
    ctx.thd.get_mut(b).unwrap().slice = 0;
    ctx.thd_time_xfer(a, b, 10).unwrap();
    assert_eq!(ctx.thd.get(a).unwrap().slice, 0);
    assert_eq!(ctx.thd.get(b).unwrap().slice, 10);

    // thd_tick only decrements the *running* thread; drive b explicitly
    // rather than through `ctx.tick`, since boot's init thread is current.
    let mut slice = ctx.thd.get(b).unwrap().slice;
    while slice > 0 {
        rme::objects::thd::thd_tick(&mut ctx.thd, &mut ctx.cpus[0].run_queue, b).unwrap();
        slice = ctx.thd.get(b).unwrap().slice;
    }
    assert_eq!(ctx.thd.get(b).unwrap().state, ThreadState::Timeout);

    let event = ctx.thd_sched_rcv(a).unwrap();
    assert_eq!(event, b.with_timeout());
}
