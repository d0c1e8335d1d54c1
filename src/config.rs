/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Compile-time size class for the kernel.
//!
//! Board selection is out of scope for the nucleus; what the nucleus does
//! need from the target is a handful of size constants (run-queue levels,
//! per-core count, MPU region budget). These are selected by feature flag
//! the way the teacher crate selects `rpi3`/`rpi4` board constants, except
//! here the axis is "how big is the box", not "which board".

cfg_if::cfg_if! {
    if #[cfg(feature = "large_mcu")] {
        /// Number of distinct thread priority levels.
        pub const PRIO_LEVELS: usize = 64;
        /// Maximum number of logical cores sharing this kernel image.
        pub const MAX_CPU: usize = 4;
    } else {
        /// Number of distinct thread priority levels.
        pub const PRIO_LEVELS: usize = 32;
        /// Maximum number of logical cores sharing this kernel image.
        pub const MAX_CPU: usize = 1;
    }
}

/// Words needed to hold one bit per priority level in a run-queue bitmap.
pub const PRIO_WORD_NUM: usize = (PRIO_LEVELS + (usize::BITS as usize - 1)) / usize::BITS as usize;

/// Maximum number of hardware MPU regions mirrored from a top-level page table.
pub const REGION_NUM: usize = 8;

/// Minimum number of dynamic (non-statically-pinned) MPU slots that must
/// remain free after any static pin, per spec §4.3.
pub const MIN_DYNAMIC_REGIONS: usize = 2;

/// Ticks a frozen capability slot must sit quiescent before it may be deleted (I5).
pub const QUIE_TIME: u64 = 2;

/// Saturation ceiling for a signal endpoint's pending counter.
pub const MAX_SIG_NUM: u64 = u32::MAX as u64;

/// Maximum depth of a single thread's synchronous-invocation stack.
pub const MAX_INV_DEPTH: usize = 8;

/// Number of distinct capability object arenas' slots, i.e. the size of the
/// kernel object table's bitmap in slots. Kept small enough to unit-test on
/// the host; a real board picks this from its linked kernel-memory extent.
pub const KOT_SLOTS: usize = 4096;

/// `log2` of the smallest allocatable kernel-memory slot, in bytes.
pub const KOT_SLOT_ORDER: usize = 5; // 32 bytes

/// Byte size of one kernel-memory allocator slot.
pub const KOT_SLOT_SIZE: usize = 1 << KOT_SLOT_ORDER;

/// Sentinel time value meaning "do not decrement this thread's slice".
pub const INF_TIME: u64 = u64::MAX;

/// Sentinel time value used for the boot thread before it is scheduled.
pub const INIT_TIME: u64 = 0;

/// Maximum number of capability tables that may exist concurrently (arena size).
pub const MAX_CAPTABLES: usize = 64;

/// Maximum number of slots one capability table may hold.
pub const MAX_CAPTABLE_ENTRIES: usize = 64;

/// Maximum number of child/sibling nodes one page-table node may hold.
pub const MAX_PGT_ENTRIES: usize = 64;

/// Maximum number of page-table nodes that may exist concurrently (arena size).
pub const MAX_PAGE_TABLES: usize = 64;

/// Maximum number of processes that may exist concurrently (arena size).
pub const MAX_PROCESSES: usize = 32;

/// Maximum number of threads that may exist concurrently (arena size).
pub const MAX_THREADS: usize = 64;

/// Maximum number of signal endpoints that may exist concurrently (arena size).
pub const MAX_SIGNALS: usize = 64;

/// Maximum number of invocation capabilities that may exist concurrently (arena size).
pub const MAX_INVOCATIONS: usize = 32;

/// Number of words in one vector-dispatch flag buffer's content array.
pub const VECTOR_WORDS: usize = 4;

/// Slot count of the root capability table the boot sequence creates (spec
/// §6 "Boot state": slots `0..7` are fixed, so this must be at least 8).
pub const BOOT_CAPTABLE_ENTRIES: usize = 16;

/// `log2` of the top-level page table's address-space span.
pub const PGT_SIZE_ORDER: u8 = 32;

/// Base address of the kernel-memory extent handed to the boot-time `KOM` cap.
pub const BOOT_KOM_BASE: usize = 0x1000;

/// Byte size of the kernel-memory extent handed to the boot-time `KOM` cap.
pub const BOOT_KOM_SIZE: usize = 0x10_0000;
