/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Platform collaborator boundary (spec §6, §9).
//!
//! Everything the nucleus needs from a concrete board — context switch,
//! MPU programming, interrupt masking, the tick source — is expressed as
//! one trait. Board bring-up, vector tables and chip headers that implement
//! it live outside this crate; only a host-only test double
//! ([`test_platform`]) ships here.

pub mod test_platform;

use crate::{
    error::HalError,
    objects::{pgt::MpuRegion, thd::RegisterFrame},
};

/// One saved coprocessor/FPU bank, opaque to the nucleus.
pub trait CopState: Clone + Default {}

/// Operations the nucleus requires from the concrete target.
///
/// A single implementation is selected per build (one physical core runs
/// one `PlatformOps` impl); multiple cores each get their own instance and
/// their own [`crate::percpu::PerCpu`].
pub trait PlatformOps {
    /// Coprocessor/FPU state type this platform carries alongside a register frame.
    type Cop: CopState;

    /// Save the currently active register bank into `frame`.
    fn regs_save(&self, frame: &mut RegisterFrame);
    /// Restore `frame` into the currently active register bank.
    fn regs_restore(&self, frame: &RegisterFrame);
    /// Save lazily-enabled coprocessor state, if any is live.
    fn cop_save(&self, frame: &mut RegisterFrame, cop: &mut Self::Cop);
    /// Restore previously saved coprocessor state.
    fn cop_restore(&self, frame: &RegisterFrame, cop: &Self::Cop);

    /// Swap the active address space to the one rooted at `phys_addr`.
    fn pgtbl_set(&self, phys_addr: usize);

    /// Push a full MPU mirror to hardware. `regions[..count]` are valid.
    fn mpu_set(&self, regions: &[MpuRegion], count: usize) -> Result<(), HalError>;

    /// Disable interrupts for the calling core; returns the previous mask
    /// state so it can be restored by a matching `int_mask_leave`.
    fn int_mask_enter(&self) -> usize;
    /// Restore the interrupt mask state returned by `int_mask_enter`.
    fn int_mask_leave(&self, prev: usize);

    /// Monotonic wall-tick counter.
    fn tick_now(&self) -> u64;

    /// This core's logical id, `0..MAX_CPU`.
    fn cpu_id(&self) -> usize;
}

/// RAII interrupt-disable scope (spec §9 "Global mutable state" note).
///
/// Construct with [`IrqGuard::new`]; interrupts are masked for the guard's
/// lifetime and restored to their prior state on drop, regardless of path.
pub struct IrqGuard<'p, P: PlatformOps> {
    platform: &'p P,
    prev: usize,
}

impl<'p, P: PlatformOps> IrqGuard<'p, P> {
    /// Disable interrupts on this core, returning a guard that restores them on drop.
    pub fn new(platform: &'p P) -> Self {
        let prev = platform.int_mask_enter();
        Self { platform, prev }
    }
}

impl<'p, P: PlatformOps> Drop for IrqGuard<'p, P> {
    fn drop(&mut self) {
        self.platform.int_mask_leave(self.prev);
    }
}
