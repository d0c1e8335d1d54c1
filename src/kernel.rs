/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Top-level kernel context (spec §9 "Global mutable state" redesign note).
//!
//! Everything the dispatcher needs — the KOT, every object arena, and the
//! per-CPU array — lives in one value passed by `&mut` reference through the
//! syscall path, instead of the teacher's/original's scattered file-local
//! statics. Interrupt disable around a whole service is the caller's
//! responsibility via [`crate::arch::IrqGuard`]; nothing in here reaches for
//! `PlatformOps` except through the explicit `platform` field.

use crate::{
    arch::PlatformOps,
    caps::table::CapTableArena,
    config::MAX_CPU,
    error::{CptError, KernResult, KfnError, PgtError, PthError, SivError},
    kfn::{kfn_act, KfnRange},
    kot::Kot,
    objects::{
        inv::{inv_act, inv_fault, inv_ret, InvArena, InvStack, InvTarget},
        pgt::PgtArena,
        prc::PrcArena,
        sig::{sig_cancel_wait, sig_rcv, sig_snd, RecvOption, SigArena},
        thd::{
            notify_state_change, thd_sched_bind, thd_sched_free, thd_sched_prio, thd_sched_rcv, thd_tick,
            thd_time_xfer, RegisterFrame, ThdArena, ThreadState, Tid,
        },
    },
    percpu::PerCpu,
};

/// Every kernel object arena plus the KOT plus one [`PerCpu`] per logical
/// core, generic over the concrete platform collaborator `P`.
pub struct KernelContext<P: PlatformOps> {
    pub kot: Kot,
    pub cpt: CapTableArena,
    pub pgt: PgtArena,
    pub prc: PrcArena,
    pub thd: ThdArena,
    pub sig: SigArena,
    pub inv: InvArena,
    pub cpus: [PerCpu; MAX_CPU],
    pub platform: P,
    pub booted: bool,
}

impl<P: PlatformOps> KernelContext<P> {
    pub fn new(kmem_base: usize, platform: P) -> KernelContext<P> {
        KernelContext {
            kot: Kot::new(kmem_base),
            cpt: CapTableArena::new(),
            pgt: PgtArena::new(),
            prc: PrcArena::new(),
            thd: ThdArena::new(),
            sig: SigArena::new(),
            inv: InvArena::new(),
            cpus: core::array::from_fn(PerCpu::new),
            platform,
            booted: false,
        }
    }

    fn inv_stack_of(&self, tid: Tid) -> KernResult<InvStack> {
        let t = self.thd.get(tid).ok_or(PthError::Conflict)?;
        Ok(InvStack {
            top: t.inv_top,
            depth: t.inv_depth,
        })
    }

    fn store_inv_stack(&mut self, tid: Tid, stack: InvStack) -> KernResult<()> {
        let t = self.thd.get_mut(tid).ok_or(PthError::Conflict)?;
        t.inv_top = stack.top;
        t.inv_depth = stack.depth;
        Ok(())
    }

    /// `Inv_Act` (spec §4.6): push an invocation frame for `running`, then
    /// swap the active address space.
    pub fn inv_act(&mut self, running: Tid, target: InvTarget) -> KernResult<()> {
        let mut stack = self.inv_stack_of(running)?;
        let saved = self.thd.get(running).ok_or(PthError::Conflict)?.frame.clone();
        inv_act(&mut self.inv, &mut stack, target, running.0, saved).map_err(SivError_to_err)?;
        self.store_inv_stack(running, stack)?;
        let root = match self.prc.get(target.process).ok_or(PthError::Conflict)?.pgt {
            crate::objects::prc::AddressSpace::Capability(idx) => self.pgt.get(idx).map(|n| n.base).unwrap_or(0),
            #[cfg(feature = "raw_pgt")]
            crate::objects::prc::AddressSpace::Raw(addr) => addr,
        };
        self.platform.pgtbl_set(root);
        Ok(())
    }

    /// `Inv_Ret` (spec §4.6).
    pub fn inv_ret(&mut self, running: Tid) -> KernResult<RegisterFrame> {
        let mut stack = self.inv_stack_of(running)?;
        let (regs, _is_exc) = inv_ret(&mut self.inv, &mut stack).map_err(SivError_to_err)?;
        self.store_inv_stack(running, stack)?;
        Ok(regs)
    }

    /// Fault path for an invocation-bearing thread (spec §4.6, §4.10).
    pub fn inv_fault(&mut self, running: Tid) -> KernResult<Option<RegisterFrame>> {
        let mut stack = self.inv_stack_of(running)?;
        let result = inv_fault(&mut self.inv, &mut stack);
        self.store_inv_stack(running, stack)?;
        match result {
            Some((regs, _err)) => Ok(Some(regs)),
            None => {
                let cpu = self.thd.get(running).ok_or(PthError::Conflict).map_err(PthError_to_err)?.cpu.unwrap_or(0);
                notify_state_change(&mut self.thd, &mut self.cpus[cpu].run_queue, running, ThreadState::Excpend)
                    .map_err(PthError_to_err)?;
                Ok(None)
            }
        }
    }

    /// `Sig_Snd` (spec §4.7).
    pub fn sig_snd(&mut self, sig_idx: usize) -> KernResult<()> {
        let sig = self.sig.get_mut(sig_idx).ok_or(SivError::Empty).map_err(SivError_to_err)?;
        if let Some((tid, delivered)) = sig_snd(sig) {
            let thread = self.thd.get_mut(Tid(tid)).ok_or(PthError::Conflict).map_err(PthError_to_err)?;
            thread.frame.gpr[0] = delivered as usize;
            thread.state = ThreadState::Ready;
            thread.blocked_on = None;
            let prio = thread.prio;
            let cpu = thread.cpu.unwrap_or(0);
            self.cpus[cpu].run_queue.enqueue(prio, Tid(tid)).map_err(PthError_to_err)?;
        }
        Ok(())
    }

    /// `Sig_Rcv` (spec §4.7).
    pub fn sig_rcv(&mut self, sig_idx: usize, tid: Tid, option: RecvOption) -> KernResult<Option<u64>> {
        let sig = self.sig.get_mut(sig_idx).ok_or(SivError::Empty).map_err(SivError_to_err)?;
        let result = sig_rcv(sig, tid.0, option).map_err(SivError_to_err)?;
        if result.is_none() {
            let thread = self.thd.get_mut(tid).ok_or(PthError::Conflict).map_err(PthError_to_err)?;
            thread.state = ThreadState::Blocked;
            thread.blocked_on = Some(sig_idx);
        }
        Ok(result)
    }

    /// `Thd_Sched_Free`'s effect on any endpoint `tid` is waiting on.
    pub fn cancel_wait(&mut self, tid: Tid) -> KernResult<()> {
        if let Some(waiting_on) = self.thd.get(tid).ok_or(PthError::Conflict).map_err(PthError_to_err)?.blocked_on {
            if let Some(sig) = self.sig.get_mut(waiting_on) {
                sig_cancel_wait(sig, tid.0);
            }
        }
        Ok(())
    }

    /// `Kfn_Act` (spec §4.9).
    pub fn kfn_act(&self, range: KfnRange, id: u32, arg: usize) -> KernResult<usize> {
        kfn_act(&self.platform, range, id, arg).map_err(KfnError_to_err)
    }

    /// Tick handler for `cpu`'s current thread.
    pub fn tick(&mut self, cpu: usize) -> KernResult<()> {
        if let Some(running) = self.cpus[cpu].current {
            thd_tick(&mut self.thd, &mut self.cpus[cpu].run_queue, running).map_err(PthError_to_err)?;
        }
        Ok(())
    }

    /// Binds `tid` to `cpu` and marks it live against its owning process
    /// (spec §4.4: `Prc_Cpt`/`Prc_Pgt`/`Prc_Del` refuse while threads are bound).
    pub fn thd_sched_bind(
        &mut self,
        cpu: usize,
        tid: Tid,
        sched_thd: Option<Tid>,
        sched_sig: Option<usize>,
        prio: usize,
    ) -> KernResult<()> {
        thd_sched_bind(&mut self.thd, &mut self.cpus[cpu].run_queue, tid, cpu, sched_thd, sched_sig, prio)
            .map_err(PthError_to_err)?;
        let proc_idx = self.thd.get(tid).ok_or(PthError::Conflict).map_err(PthError_to_err)?.process;
        if let Some(proc) = self.prc.get_mut(proc_idx) {
            proc.live_threads += 1;
        }
        Ok(())
    }

    pub fn thd_sched_free(&mut self, cpu: usize, tid: Tid) -> KernResult<()> {
        self.cancel_wait(tid)?;
        let proc_idx = self.thd.get(tid).ok_or(PthError::Conflict).map_err(PthError_to_err)?.process;
        thd_sched_free(&mut self.thd, &mut self.cpus[cpu].run_queue, tid).map_err(PthError_to_err)?;
        if let Some(proc) = self.prc.get_mut(proc_idx) {
            proc.live_threads = proc.live_threads.saturating_sub(1);
        }
        Ok(())
    }

    pub fn thd_sched_prio(&mut self, cpu: usize, tid: Tid, prio: usize) -> KernResult<()> {
        thd_sched_prio(&mut self.thd, &mut self.cpus[cpu].run_queue, tid, prio).map_err(PthError_to_err)
    }

    pub fn thd_time_xfer(&mut self, from: Tid, to: Tid, amount: u64) -> KernResult<()> {
        thd_time_xfer(&mut self.thd, from, to, amount).map_err(PthError_to_err)
    }

    pub fn thd_sched_rcv(&mut self, sched: Tid) -> KernResult<usize> {
        thd_sched_rcv(&mut self.thd, sched).map_err(PthError_to_err)
    }

    /// `_RME_Kern_High`-equivalent: pick and return the highest-priority
    /// ready thread on `cpu`, without yet performing the context switch.
    pub fn pick_highest(&mut self, cpu: usize) -> Option<Tid> {
        self.cpus[cpu].run_queue.pop_highest()
    }
}

#[allow(non_snake_case)]
fn SivError_to_err(e: SivError) -> crate::error::KernError {
    e.into()
}
#[allow(non_snake_case)]
fn PthError_to_err(e: PthError) -> crate::error::KernError {
    e.into()
}
#[allow(non_snake_case)]
fn KfnError_to_err(e: KfnError) -> crate::error::KernError {
    e.into()
}
#[allow(dead_code)]
#[allow(non_snake_case)]
fn CptError_to_err(e: CptError) -> crate::error::KernError {
    e.into()
}
#[allow(dead_code)]
#[allow(non_snake_case)]
fn PgtError_to_err(e: PgtError) -> crate::error::KernError {
    e.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arch::test_platform::TestPlatform, objects::thd::Thread};

    fn new_ctx() -> KernelContext<TestPlatform> {
        KernelContext::new(0x1000, TestPlatform::new())
    }

    #[test]
    fn sig_snd_wakes_blocked_receiver_and_requeues_it() {
        let mut ctx = new_ctx();
        let proc = crate::objects::prc::prc_crt(&mut ctx.prc, 0, crate::objects::prc::AddressSpace::Capability(0)).unwrap();
        let tid = ctx.thd.alloc(Thread::new(proc)).unwrap();
        ctx.thd_sched_bind(0, tid, None, None, 4).unwrap();
        ctx.cpus[0].run_queue.pop_highest(); // simulate it becoming "current"
        let sig_idx = ctx.sig.alloc(crate::objects::sig::Signal::new(false)).unwrap();
        assert_eq!(ctx.sig_rcv(sig_idx, tid, RecvOption::BlockingSingle), Ok(None));
        ctx.sig_snd(sig_idx).unwrap();
        assert_eq!(ctx.thd.get(tid).unwrap().state, ThreadState::Ready);
        assert_eq!(ctx.thd.get(tid).unwrap().frame.gpr[0], 1);
    }

    #[cfg(feature = "large_mcu")]
    #[test]
    fn sig_snd_requeues_onto_the_receivers_own_cpu() {
        let mut ctx = new_ctx();
        let proc = crate::objects::prc::prc_crt(&mut ctx.prc, 0, crate::objects::prc::AddressSpace::Capability(0)).unwrap();
        let tid = ctx.thd.alloc(Thread::new(proc)).unwrap();
        ctx.thd_sched_bind(1, tid, None, None, 4).unwrap();
        ctx.cpus[1].run_queue.pop_highest(); // simulate it becoming "current" on cpu 1
        let sig_idx = ctx.sig.alloc(crate::objects::sig::Signal::new(false)).unwrap();
        ctx.sig_rcv(sig_idx, tid, RecvOption::BlockingSingle).unwrap();
        ctx.sig_snd(sig_idx).unwrap();
        assert_eq!(ctx.cpus[1].run_queue.pop_highest(), Some(tid));
        assert_eq!(ctx.cpus[0].run_queue.highest(), None);
    }

    #[test]
    fn binding_a_thread_makes_it_live_against_its_process() {
        let mut ctx = new_ctx();
        let proc = crate::objects::prc::prc_crt(&mut ctx.prc, 0, crate::objects::prc::AddressSpace::Capability(0)).unwrap();
        let tid = ctx.thd.alloc(Thread::new(proc)).unwrap();
        assert_eq!(ctx.prc.get(proc).unwrap().live_threads, 0);

        ctx.thd_sched_bind(0, tid, None, None, 4).unwrap();
        assert_eq!(ctx.prc.get(proc).unwrap().live_threads, 1);
        assert_eq!(
            crate::objects::prc::prc_cpt(&mut ctx.prc, proc, 9),
            Err(PthError::Conflict)
        );

        ctx.thd_sched_free(0, tid).unwrap();
        assert_eq!(ctx.prc.get(proc).unwrap().live_threads, 0);
        crate::objects::prc::prc_cpt(&mut ctx.prc, proc, 9).unwrap();
    }

    #[test]
    fn thd_sched_free_cancels_pending_receive() {
        let mut ctx = new_ctx();
        let proc = crate::objects::prc::prc_crt(&mut ctx.prc, 0, crate::objects::prc::AddressSpace::Capability(0)).unwrap();
        let tid = ctx.thd.alloc(Thread::new(proc)).unwrap();
        ctx.thd_sched_bind(0, tid, None, None, 4).unwrap();
        let sig_idx = ctx.sig.alloc(crate::objects::sig::Signal::new(false)).unwrap();
        ctx.sig_rcv(sig_idx, tid, RecvOption::BlockingSingle).unwrap();
        ctx.thd_sched_free(0, tid).unwrap();
        assert!(ctx.sig.get(sig_idx).unwrap().waiter.is_none());
    }
}
