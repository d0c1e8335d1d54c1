/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Error taxonomy (spec §6).
//!
//! Every service returns a negative machine word on failure. We model each
//! domain as its own `Snafu` enum, the way `nucleus/src/caps/captable.rs`
//! and `derivation_tree.rs` do, and convert to the contiguous negative wire
//! ranges the original kernel uses (`RME_ERR_CPT` etc., see
//! `examples/original_source/Include/rme.h`) via `wire_code`.

use snafu::Snafu;

/// One machine word's worth of return value from a service call.
pub type RetVal = isize;

/// Capability-table errors (`ERR_CPT_*`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Snafu)]
#[snafu(module)]
pub enum CptError {
    /// The resolved capability name is `NULL`.
    Null,
    /// The slot holds a capability of the wrong type for this operation.
    Type,
    /// A supplied address or size is out of the allowed range.
    Range,
    /// The kernel-memory allocator could not mark/erase the requested extent.
    Kot,
    /// The destination slot is already occupied.
    Exist,
    /// A reference count would overflow, or underflow below zero.
    Refcnt,
    /// Delegated flags would escalate beyond the source capability's flags.
    Flag,
    /// The slot is frozen but has not yet reached quiescence.
    Quie,
    /// The slot is frozen and this operation cannot act on a frozen slot.
    Frozen,
    /// The operation requires a root capability but the slot holds a leaf.
    Root,
}

impl CptError {
    /// Negative wire code, contiguous from `RME_ERR_CPT = 0`.
    pub const fn wire_code(self) -> RetVal {
        -1 - match self {
            CptError::Null => 0,
            CptError::Type => 1,
            CptError::Range => 2,
            CptError::Kot => 3,
            CptError::Exist => 4,
            CptError::Refcnt => 5,
            CptError::Flag => 6,
            CptError::Quie => 7,
            CptError::Frozen => 8,
            CptError::Root => 9,
        }
    }
}

/// Page-table errors (`ERR_PGT_*`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Snafu)]
#[snafu(module)]
pub enum PgtError {
    /// Virtual or physical address is malformed or misaligned.
    Addr,
    /// The requested map/unmap is not valid at this position.
    Map,
    /// The underlying hardware MPU/MMU rejected the operation.
    Hw,
    /// Requested permissions conflict with the node's established uniform flags (I8).
    Perm,
}

impl PgtError {
    pub const fn wire_code(self) -> RetVal {
        -100 - 1
            - match self {
                PgtError::Addr => 0,
                PgtError::Map => 1,
                PgtError::Hw => 2,
                PgtError::Perm => 3,
            }
    }
}

/// Process/thread errors (`ERR_PTH_*`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Snafu)]
#[snafu(module)]
pub enum PthError {
    /// Operation requires a page table bound to the process and none is bound.
    Pgt,
    /// The process/thread is in a state that conflicts with this request.
    Conflict,
    /// A hardware-specific address constraint was violated.
    Haddr,
    /// The thread is not in a state this operation permits.
    Invstate,
    /// Requested priority is outside the permitted range, or exceeds the ceiling.
    Prio,
    /// A scheduler/process reference count would overflow or underflow.
    Refcnt,
    /// No scheduler-notification signal is bound.
    Notif,
    /// A time/slice quantity would overflow.
    Overflow,
}

impl PthError {
    pub const fn wire_code(self) -> RetVal {
        -200 - 1
            - match self {
                PthError::Pgt => 0,
                PthError::Conflict => 1,
                PthError::Haddr => 2,
                PthError::Invstate => 3,
                PthError::Prio => 4,
                PthError::Refcnt => 5,
                PthError::Notif => 6,
                PthError::Overflow => 7,
            }
    }
}

/// Signal/invocation errors (`ERR_SIV_*`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Snafu)]
#[snafu(module)]
pub enum SivError {
    /// Non-blocking receive found nothing pending.
    Act,
    /// An invocation was aborted by a fault and a synthesized return was made.
    Fault,
    /// An invocation stack is already at its maximum depth.
    Full,
    /// An invocation stack has no frame to pop.
    Empty,
    /// Conflicting concurrent use of the same invocation/signal object.
    Conflict,
    /// A wait was cancelled by `Thd_Sched_Free`.
    Free,
    /// Operation is not permitted before boot has finished.
    Boot,
}

impl SivError {
    pub const fn wire_code(self) -> RetVal {
        -300 - 1
            - match self {
                SivError::Act => 0,
                SivError::Fault => 1,
                SivError::Full => 2,
                SivError::Empty => 3,
                SivError::Conflict => 4,
                SivError::Free => 5,
                SivError::Boot => 6,
            }
    }
}

/// Platform-collaborator failure, e.g. the `PlatformOps` implementation
/// refused an `mpu_set`/`pgtbl_set` request.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Snafu)]
#[snafu(module)]
pub struct HalError;

/// Kernel-function port failure (id out of the capability's granted range, or
/// the platform collaborator rejected the operation).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Snafu)]
#[snafu(module)]
pub enum KfnError {
    /// The numeric id is not covered by the invoking capability's `{{low,high}}` range.
    OutOfRange,
    /// The platform collaborator failed to perform the operation.
    Hal,
}

impl KfnError {
    pub const fn wire_code(self) -> RetVal {
        match self {
            KfnError::OutOfRange => -401,
            KfnError::Hal => -402,
        }
    }
}

/// Top-level error, used where a single service can fail for reasons drawn
/// from more than one domain (e.g. `Pgt_Crt` can fail with either a `CptError`
/// from the backing kernel-memory cap, or a `PgtError` from node setup).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Snafu)]
#[snafu(module)]
pub enum KernError {
    #[snafu(display("capability error: {:?}", source))]
    Cpt { source: CptError },
    #[snafu(display("page table error: {:?}", source))]
    Pgt { source: PgtError },
    #[snafu(display("process/thread error: {:?}", source))]
    Pth { source: PthError },
    #[snafu(display("signal/invocation error: {:?}", source))]
    Siv { source: SivError },
    #[snafu(display("kernel-function error: {:?}", source))]
    Kfn { source: KfnError },
}

impl KernError {
    pub const fn wire_code(self) -> RetVal {
        match self {
            KernError::Cpt { source } => source.wire_code(),
            KernError::Pgt { source } => source.wire_code(),
            KernError::Pth { source } => source.wire_code(),
            KernError::Siv { source } => source.wire_code(),
            KernError::Kfn { source } => source.wire_code(),
        }
    }
}

impl From<CptError> for KernError {
    fn from(source: CptError) -> Self {
        KernError::Cpt { source }
    }
}
impl From<PgtError> for KernError {
    fn from(source: PgtError) -> Self {
        KernError::Pgt { source }
    }
}
impl From<PthError> for KernError {
    fn from(source: PthError) -> Self {
        KernError::Pth { source }
    }
}
impl From<SivError> for KernError {
    fn from(source: SivError) -> Self {
        KernError::Siv { source }
    }
}
impl From<KfnError> for KernError {
    fn from(source: KfnError) -> Self {
        KernError::Kfn { source }
    }
}

pub type KernResult<T> = Result<T, KernError>;
