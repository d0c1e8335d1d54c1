/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! System-Call Dispatcher (spec §4.8).
//!
//! Grounded on `nucleus/src/syscall.rs`'s single-entry-point sketch
//! (never wired to a concrete trap vector there), generalized to the full
//! 34-service table and the three switch-point classes described in
//! `service.rs`.

pub mod service;

pub use service::{Service, ServiceClass};

use crate::{
    arch::PlatformOps,
    caps::{
        flags::{CptFlags, PgtFlags, PrcFlags, SigFlags, ThdFlags},
        name::CapName,
        slot::CapType,
        table::{cpt_add, cpt_crt, cpt_del, cpt_frz, cpt_rem, lookup, resolve},
    },
    error::{CptError, KernError, KernResult, PthError, RetVal},
    kernel::KernelContext,
    kfn::KfnRange,
    objects::{
        inv::InvTarget,
        pgt::{pgt_add, pgt_con, pgt_crt, pgt_del, pgt_des, pgt_rem, NumOrder, PageFlags, SizeOrder},
        prc::{prc_cpt, prc_crt, prc_del, prc_pgt, AddressSpace},
        sig::RecvOption,
        thd::{RegisterFrame, Thread, Tid},
    },
};

/// Decoded syscall arguments (spec §6 "System-call encoding":
/// `{svc:8, capid: word_bits/2-8}` packed in `arg0`; `param0..2` in `arg1..3`).
#[derive(Debug, Clone, Copy)]
pub struct SyscallArgs {
    pub svc: u8,
    pub capid: usize,
    pub param0: usize,
    pub param1: usize,
    pub param2: usize,
}

const HALF_BITS: u32 = usize::BITS / 2;
const CAPID_MASK: usize = (1 << (HALF_BITS - 8)) - 1;

/// `syscall_arg_get`: split the saved frame's `gpr[0..4]` into service number,
/// capability id, and up to three parameters.
pub fn syscall_arg_get(frame: &RegisterFrame) -> SyscallArgs {
    let arg0 = frame.gpr[0];
    SyscallArgs {
        svc: (arg0 >> (HALF_BITS - 8)) as u8,
        capid: arg0 & CAPID_MASK,
        param0: frame.gpr[1],
        param1: frame.gpr[2],
        param2: frame.gpr[3],
    }
}

/// `syscall_ret_set`: write the service's result into the caller's return register.
pub fn syscall_ret_set(frame: &mut RegisterFrame, val: RetVal) {
    frame.gpr[0] = val as usize;
}

/// Resolve `args.capid` against `running`'s process's root capability table.
fn resolve_cap<P: PlatformOps>(
    ctx: &KernelContext<P>,
    running: Tid,
    capid: usize,
) -> KernResult<(usize, usize)> {
    let thread = ctx.thd.get(running).ok_or(PthError::Conflict)?;
    let proc = ctx.prc.get(thread.process).ok_or(PthError::Conflict)?;
    Ok(resolve(&ctx.cpt, proc.cpt, CapName::one_level(capid)).map_err(KernError::from)?)
}

/// Dispatch one decoded syscall for `running` on `cpu`. Non-switching and
/// invocation-return classes (spec §4.8) write their result directly; the
/// potentially-switching class may instead leave `running` blocked, in which
/// case the caller's frame is not updated here and the scheduler picks the
/// next runnable thread.
pub fn dispatch<P: PlatformOps>(
    ctx: &mut KernelContext<P>,
    cpu: usize,
    running: Tid,
    args: SyscallArgs,
) -> Option<RetVal> {
    let svc = Service::from_u8(args.svc)?;
    let result = dispatch_inner(ctx, cpu, running, svc, args);
    match result {
        Ok(DispatchOutcome::Value(v)) => Some(v),
        // A successful Inv_Ret/Inv_Act/Thd_Swt switches context; no return
        // value is written to the (no longer running) caller's frame here.
        Ok(DispatchOutcome::Blocked) => None,
        // On failure there is no context switch: write the error to the
        // caller's own frame, even for the invocation-return class.
        Err(e) => Some(e.wire_code()),
    }
}

enum DispatchOutcome {
    Value(RetVal),
    /// The calling thread is now blocked; no return value is written yet.
    Blocked,
}

fn ok(v: usize) -> KernResult<DispatchOutcome> {
    Ok(DispatchOutcome::Value(v as RetVal))
}

fn dispatch_inner<P: PlatformOps>(
    ctx: &mut KernelContext<P>,
    cpu: usize,
    running: Tid,
    svc: Service,
    args: SyscallArgs,
) -> KernResult<DispatchOutcome> {
    match svc {
        Service::InvRet => {
            let regs = ctx.inv_ret(running)?;
            ctx.thd.get_mut(running).ok_or(PthError::Conflict)?.frame = regs;
            Ok(DispatchOutcome::Blocked)
        }
        Service::InvAct => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            if slot.cap_type() != Some(CapType::Inv) {
                return Err(CptError::Type.into());
            }
            let target = InvTarget {
                process: slot.info[0] as usize,
                entry: slot.info[1] as usize,
                stack: slot.info[2] as usize,
                is_exc_ret: slot.flag & 1 != 0,
            };
            ctx.inv_act(running, target)?;
            Ok(DispatchOutcome::Blocked)
        }
        Service::SigSnd => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            if slot.cap_type() != Some(CapType::Sig) {
                return Err(CptError::Type.into());
            }
            if slot.flag & SigFlags::SND.bits() == 0 {
                return Err(CptError::Flag.into());
            }
            let sig_idx = slot.object;
            ctx.sig_snd(sig_idx)?;
            ok(0)
        }
        Service::SigRcv => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            if slot.cap_type() != Some(CapType::Sig) {
                return Err(CptError::Type.into());
            }
            if slot.flag & SigFlags::RCV.bits() == 0 {
                return Err(CptError::Flag.into());
            }
            let sig_idx = slot.object;
            let option = recv_option(args.param0);
            match ctx.sig_rcv(sig_idx, running, option)? {
                Some(count) => ok(count as usize),
                None => Ok(DispatchOutcome::Blocked),
            }
        }
        Service::Kfn => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            if slot.cap_type() != Some(CapType::Kfn) {
                return Err(CptError::Type.into());
            }
            let range = KfnRange { low: slot.info[0], high: slot.info[1] };
            let v = ctx.kfn_act(range, args.param0 as u32, args.param1)?;
            ok(v)
        }
        Service::ThdSchedFree => {
            let target = Tid(args.param0);
            ctx.thd_sched_free(cpu, target)?;
            ok(0)
        }
        Service::ThdExecSet => {
            let target = Tid(args.param0);
            let t = ctx.thd.get_mut(target).ok_or(PthError::Conflict)?;
            t.frame.pc = args.param1;
            t.frame.sp = args.param2;
            ok(0)
        }
        Service::ThdSchedPrio => {
            let target = Tid(args.param0);
            ctx.thd_sched_prio(cpu, target, args.param1)?;
            ok(0)
        }
        Service::ThdTimeXfer => {
            let to = Tid(args.param0);
            ctx.thd_time_xfer(running, to, args.param1 as u64)?;
            ok(0)
        }
        Service::ThdSwt => {
            // Voluntary yield: return to the run-queue at the same priority.
            let prio = ctx.thd.get(running).ok_or(PthError::Conflict)?.prio;
            ctx.thd_sched_free(cpu, running)?;
            ctx.thd_sched_bind(cpu, running, None, None, prio)?;
            Ok(DispatchOutcome::Blocked)
        }
        Service::CptCrt => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let kmem = kom_range_from_cap(ctx, running, args.param0)?;
            cpt_crt(&mut ctx.cpt, &ctx.kot, t, s, kmem, args.param1, args.param2)?;
            ok(0)
        }
        Service::CptDel => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            cpt_del(&mut ctx.cpt, &ctx.kot, t, s, ctx.platform.tick_now())?;
            ok(0)
        }
        Service::CptFrz => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            cpt_frz(&mut ctx.cpt, t, s, ctx.platform.tick_now())?;
            ok(0)
        }
        Service::CptAdd => {
            let (dst_t, dst_s) = resolve_cap(ctx, running, args.capid)?;
            let (src_t, src_s) = resolve_cap(ctx, running, args.param0)?;
            cpt_add(&mut ctx.cpt, dst_t, dst_s, src_t, src_s, args.param1 as u32)?;
            ok(0)
        }
        Service::CptRem => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            cpt_rem(&mut ctx.cpt, t, s)?;
            ok(0)
        }
        Service::PgtCrt => {
            let idx = pgt_crt(
                &mut ctx.pgt,
                args.param0,
                SizeOrder(args.param1 as u8),
                NumOrder(args.param2 as u8),
                None,
            )?;
            install_slot(ctx, running, args.capid, CapType::Pgt, PgtFlags::ALL.bits(), idx, [0; 3])?;
            ok(0)
        }
        Service::PgtDel => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            pgt_del(&mut ctx.pgt, slot.object)?;
            ok(0)
        }
        Service::PgtAdd => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            let node = slot.object;
            pgt_add(
                &mut ctx.pgt,
                node,
                args.param0,
                args.param1,
                PageFlags::from_bits_truncate(args.param2 as u32),
            )?;
            ok(0)
        }
        Service::PgtRem => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            pgt_rem(&mut ctx.pgt, slot.object, args.param0)?;
            ok(0)
        }
        Service::PgtCon => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let (ct, cs) = resolve_cap(ctx, running, args.param1)?;
            let parent = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?.object;
            let child = lookup(&ctx.cpt, ct, CapName::one_level(cs)).map_err(KernError::from)?.object;
            pgt_con(&mut ctx.pgt, parent, args.param0, child)?;
            ok(0)
        }
        Service::PgtDes => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let parent = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?.object;
            pgt_des(&mut ctx.pgt, parent, args.param0)?;
            ok(0)
        }
        Service::PrcCrt => {
            let (ct, cs) = resolve_cap(ctx, running, args.param0)?;
            let (pt, ps) = resolve_cap(ctx, running, args.param1)?;
            let cpt_obj = lookup(&ctx.cpt, ct, CapName::one_level(cs)).map_err(KernError::from)?.object;
            let pgt_obj = lookup(&ctx.cpt, pt, CapName::one_level(ps)).map_err(KernError::from)?.object;
            let idx = prc_crt(&mut ctx.prc, cpt_obj, AddressSpace::Capability(pgt_obj))?;
            install_slot(ctx, running, args.capid, CapType::Prc, PrcFlags::ALL.bits(), idx, [0; 3])?;
            ok(0)
        }
        Service::PrcDel => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            prc_del(&mut ctx.prc, slot.object)?;
            ok(0)
        }
        Service::PrcCpt => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let proc = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?.object;
            let (ct, cs) = resolve_cap(ctx, running, args.param0)?;
            let new_cpt = lookup(&ctx.cpt, ct, CapName::one_level(cs)).map_err(KernError::from)?.object;
            let old = prc_cpt(&mut ctx.prc, proc, new_cpt)?;
            ok(old)
        }
        Service::PrcPgt => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let proc = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?.object;
            let (pt, ps) = resolve_cap(ctx, running, args.param0)?;
            let new_pgt = lookup(&ctx.cpt, pt, CapName::one_level(ps)).map_err(KernError::from)?.object;
            prc_pgt(&mut ctx.prc, proc, AddressSpace::Capability(new_pgt))?;
            ok(0)
        }
        Service::ThdCrt => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let proc = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?.object;
            let tid = ctx.thd.alloc(Thread::new(proc)).map_err(KernError::from)?;
            install_slot(ctx, running, args.param0, CapType::Thd, ThdFlags::ALL.bits(), tid.0, [0; 3])?;
            ok(0)
        }
        Service::ThdDel => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            ctx.thd.free(Tid(slot.object));
            ok(0)
        }
        Service::ThdSchedBind => {
            let target = Tid(args.param0);
            let sched = if args.param1 == usize::MAX { None } else { Some(Tid(args.param1)) };
            ctx.thd_sched_bind(cpu, target, sched, None, args.param2)?;
            ok(0)
        }
        Service::ThdSchedRcv => {
            let v = ctx.thd_sched_rcv(running)?;
            ok(v)
        }
        Service::SigCrt => {
            let sig_idx = ctx.sig.alloc(crate::objects::sig::Signal::new(args.param0 != 0)).map_err(KernError::from)?;
            install_slot(ctx, running, args.capid, CapType::Sig, SigFlags::ALL.bits(), sig_idx, [0; 3])?;
            ok(0)
        }
        Service::SigDel => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
            ctx.sig.free(slot.object);
            ok(0)
        }
        Service::InvCrt => {
            // Invocation capabilities carry {process, entry, stack} as info words
            // rather than an arena object (spec §3 "three type-specific info words").
            install_slot(
                ctx,
                running,
                args.capid,
                CapType::Inv,
                CptFlags::ALL.bits(),
                0,
                [args.param0 as u32, args.param1 as u32, args.param2 as u32],
            )?;
            ok(0)
        }
        Service::InvDel => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let table = ctx.cpt.get_mut(t).ok_or(CptError::Range)?;
            table.slot_mut(s).ok_or(CptError::Range)?.clear();
            ok(0)
        }
        Service::InvSet => {
            let (t, s) = resolve_cap(ctx, running, args.capid)?;
            let table = ctx.cpt.get_mut(t).ok_or(CptError::Range)?;
            let slot = table.slot_mut(s).ok_or(CptError::Range)?;
            slot.info[2] = args.param0 as u32; // update the stack info word
            ok(0)
        }
    }
}

fn recv_option(param0: usize) -> RecvOption {
    match param0 {
        0 => RecvOption::BlockingSingle,
        1 => RecvOption::BlockingMulti,
        2 => RecvOption::NonBlockingSingle,
        _ => RecvOption::NonBlockingMulti,
    }
}

/// Install a freshly created object into an empty root slot of the caller's
/// capability table.
fn install_slot<P: PlatformOps>(
    ctx: &mut KernelContext<P>,
    running: Tid,
    capid: usize,
    ty: CapType,
    flag: u32,
    object: usize,
    info: [u32; 3],
) -> KernResult<()> {
    let thread = ctx.thd.get(running).ok_or(PthError::Conflict)?;
    let proc_cpt = ctx.prc.get(thread.process).ok_or(PthError::Conflict)?.cpt;
    let (t, s) = resolve(&ctx.cpt, proc_cpt, CapName::one_level(capid)).map_err(KernError::from)?;
    let table = ctx.cpt.get_mut(t).ok_or(CptError::Range)?;
    let slot = table.slot_mut(s).ok_or(CptError::Range)?;
    if !slot.is_empty() {
        return Err(CptError::Exist.into());
    }
    slot.install(
        ty,
        crate::caps::slot::SlotStatus::Valid,
        crate::caps::slot::SlotAttr::ROOT,
        flag,
        object,
        0,
        0,
        info,
    );
    Ok(())
}

/// Read a `KOM` leaf's granted range back out as a [`crate::objects::kom::KomRange`].
fn kom_range_from_cap<P: PlatformOps>(
    ctx: &KernelContext<P>,
    running: Tid,
    capid: usize,
) -> KernResult<crate::objects::kom::KomRange> {
    let (t, s) = resolve_cap(ctx, running, capid)?;
    let slot = lookup(&ctx.cpt, t, CapName::one_level(s)).map_err(KernError::from)?;
    if slot.cap_type() != Some(CapType::Kom) {
        return Err(CptError::Type.into());
    }
    Ok(crate::objects::kom::KomRange::decode(slot.info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::test_platform::TestPlatform;

    #[test]
    fn decode_splits_svc_capid_and_params() {
        let mut frame = RegisterFrame::empty();
        frame.gpr[0] = (2usize << (HALF_BITS - 8)) | 7;
        frame.gpr[1] = 11;
        let args = syscall_arg_get(&frame);
        assert_eq!(args.svc, 2);
        assert_eq!(args.capid, 7);
        assert_eq!(args.param0, 11);
    }

    #[test]
    fn ret_set_writes_gpr0() {
        let mut frame = RegisterFrame::empty();
        syscall_ret_set(&mut frame, -5);
        assert_eq!(frame.gpr[0] as isize, -5);
    }

    #[test]
    fn sig_crt_then_snd_rcv_round_trips_through_dispatch() {
        let mut ctx = KernelContext::new(0x1000, TestPlatform::new());
        let root = ctx.cpt.alloc_root(16, 0).unwrap();
        let proc = prc_crt(&mut ctx.prc, root, AddressSpace::Capability(0)).unwrap();
        let tid = ctx.thd.alloc(Thread::new(proc)).unwrap();
        ctx.thd_sched_bind(0, tid, None, None, 2).unwrap();

        dispatch_inner(&mut ctx, 0, tid, Service::SigCrt, SyscallArgs { svc: 29, capid: 0, param0: 0, param1: 0, param2: 0 }).unwrap();
        let slot_ty = lookup(&ctx.cpt, root, CapName::one_level(0)).unwrap().cap_type();
        assert_eq!(slot_ty, Some(CapType::Sig));
    }
}
