/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Host-only [`PlatformOps`] test double (spec §0 "Test tooling").
//!
//! Stands in for a concrete board's context-switch/MPU/interrupt-mask/tick
//! primitives in `#[cfg(test)]` modules across the crate, the way the
//! teacher's QEMU/semihosting harness stood in for real hardware — except
//! this one runs on the host with the stable toolchain and no emulator.

use core::cell::Cell;

use crate::{
    arch::{CopState, PlatformOps},
    error::HalError,
    objects::{pgt::MpuRegion, thd::RegisterFrame},
};

#[derive(Debug, Clone, Default)]
pub struct TestCop;
impl CopState for TestCop {}

/// Deterministic, introspectable platform double.
pub struct TestPlatform {
    tick: Cell<u64>,
    irq_depth: Cell<usize>,
    last_pgtbl: Cell<usize>,
    mpu_calls: Cell<usize>,
    cpu: usize,
}

impl TestPlatform {
    pub fn new() -> TestPlatform {
        TestPlatform {
            tick: Cell::new(0),
            irq_depth: Cell::new(0),
            last_pgtbl: Cell::new(0),
            mpu_calls: Cell::new(0),
            cpu: 0,
        }
    }

    pub fn advance_tick(&self, by: u64) {
        self.tick.set(self.tick.get() + by);
    }

    pub fn mpu_call_count(&self) -> usize {
        self.mpu_calls.get()
    }

    pub fn last_pgtbl_root(&self) -> usize {
        self.last_pgtbl.get()
    }
}

impl Default for TestPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformOps for TestPlatform {
    type Cop = TestCop;

    fn regs_save(&self, _frame: &mut RegisterFrame) {}
    fn regs_restore(&self, _frame: &RegisterFrame) {}
    fn cop_save(&self, _frame: &mut RegisterFrame, _cop: &mut Self::Cop) {}
    fn cop_restore(&self, _frame: &RegisterFrame, _cop: &Self::Cop) {}

    fn pgtbl_set(&self, phys_addr: usize) {
        self.last_pgtbl.set(phys_addr);
    }

    fn mpu_set(&self, _regions: &[MpuRegion], _count: usize) -> Result<(), HalError> {
        self.mpu_calls.set(self.mpu_calls.get() + 1);
        Ok(())
    }

    fn int_mask_enter(&self) -> usize {
        let prev = self.irq_depth.get();
        self.irq_depth.set(prev + 1);
        prev
    }

    fn int_mask_leave(&self, prev: usize) {
        self.irq_depth.set(prev);
    }

    fn tick_now(&self) -> u64 {
        self.tick.get()
    }

    fn cpu_id(&self) -> usize {
        self.cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::IrqGuard;

    #[test]
    fn irq_guard_restores_previous_mask_depth() {
        let platform = TestPlatform::new();
        assert_eq!(platform.irq_depth.get(), 0);
        {
            let _guard = IrqGuard::new(&platform);
            assert_eq!(platform.irq_depth.get(), 1);
        }
        assert_eq!(platform.irq_depth.get(), 0);
    }

    #[test]
    fn tick_advances_monotonically() {
        let platform = TestPlatform::new();
        platform.advance_tick(5);
        assert_eq!(platform.tick_now(), 5);
    }
}
