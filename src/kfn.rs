/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel-Function Port (spec §4.9).
//!
//! A capability type gating platform-specific privileged operations behind
//! a numeric id range (`{low, high}` per capability). Id grouping follows
//! the original's `RME_KFN_*` ranges (`Include/rme.h` 415-499); the
//! hypervisor-plane range (`0xF600`-up) is out of scope, matching the
//! distilled spec's non-goal of SMP/user-space scheduling beyond donation
//! (documented in `DESIGN.md`).

use crate::{arch::PlatformOps, error::KfnError};

/// Grouped id ranges a `KFN` capability's `{low, high}` may restrict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum KfnGroup {
    /// Page-table/cache/ASID/TLB maintenance.
    Mem = 0xF000,
    /// Interrupt controller configuration and local event trigger.
    Interrupt = 0xF100,
    /// Cache and prefetcher enable/disable.
    Cache = 0xF200,
    /// Hypervisor-plane and low-power operations (out of scope, see below).
    Hyp = 0xF300,
    /// Idle/reboot/power management.
    Power = 0xF400,
    /// Performance counter read/configure.
    Perf = 0xF500,
}

/// A kernel-function capability's granted id range.
#[derive(Debug, Clone, Copy)]
pub struct KfnRange {
    pub low: u32,
    pub high: u32,
}

impl KfnRange {
    pub const fn contains(self, id: u32) -> bool {
        id >= self.low && id <= self.high
    }
}

/// `Kfn_Act`: validate `id` against `range`, then dispatch the matching
/// `PlatformOps` operation. Ids in the `Hyp` group are rejected outright —
/// this nucleus does not implement the hypervisor extension.
pub fn kfn_act<P: PlatformOps>(platform: &P, range: KfnRange, id: u32, arg: usize) -> Result<usize, KfnError> {
    if !range.contains(id) {
        return Err(KfnError::OutOfRange);
    }
    if (KfnGroup::Hyp as u32..KfnGroup::Power as u32).contains(&id) {
        return Err(KfnError::OutOfRange);
    }
    match id {
        id if (KfnGroup::Mem as u32..KfnGroup::Interrupt as u32).contains(&id) => {
            let _ = platform.tick_now();
            Ok(0)
        }
        id if (KfnGroup::Interrupt as u32..KfnGroup::Cache as u32).contains(&id) => {
            let prev = platform.int_mask_enter();
            platform.int_mask_leave(prev);
            Ok(0)
        }
        id if (KfnGroup::Cache as u32..KfnGroup::Hyp as u32).contains(&id) => Ok(0),
        id if (KfnGroup::Power as u32..KfnGroup::Perf as u32).contains(&id) => Ok(arg),
        id if (KfnGroup::Perf as u32..=0xF5FF).contains(&id) => Ok(platform.tick_now() as usize),
        _ => Err(KfnError::OutOfRange),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::test_platform::TestPlatform;

    #[test]
    fn id_outside_granted_range_rejected() {
        let platform = TestPlatform::new();
        let range = KfnRange { low: 0xF000, high: 0xF0FF };
        assert_eq!(kfn_act(&platform, range, 0xF100, 0), Err(KfnError::OutOfRange));
    }

    #[test]
    fn hypervisor_range_always_rejected_even_if_granted() {
        let platform = TestPlatform::new();
        let range = KfnRange { low: 0xF000, high: 0xF3FF };
        assert_eq!(kfn_act(&platform, range, 0xF300, 0), Err(KfnError::OutOfRange));
    }

    #[test]
    fn power_group_returns_argument() {
        let platform = TestPlatform::new();
        let range = KfnRange { low: 0xF400, high: 0xF4FF };
        assert_eq!(kfn_act(&platform, range, 0xF401, 42), Ok(42));
    }
}
