/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Per-capability-type permission flag masks.
//!
//! The spec describes `flag` generically as "bitmask of permitted
//! sub-operations; ANDed on delegation" (§3). The concrete bit layout for
//! each capability type is the original kernel's `RME_*_FLAG_*` table
//! (`examples/original_source/Include/rme.h` lines 89–208); we reproduce it
//! as one `bitflags!` struct per type so delegation masking
//! (`src & mask`) is a plain bitwise AND with no magic numbers at call sites.

bitflags::bitflags! {
    /// Permission bits for a `CPT` (capability-table) capability.
    pub struct CptFlags: u32 {
        const CRT      = 1 << 0;
        const DEL      = 1 << 1;
        const FRZ      = 1 << 2;
        const ADD_SRC  = 1 << 3;
        const ADD_DST  = 1 << 4;
        const REM      = 1 << 5;
        const PRC_CRT  = 1 << 6;
        const PRC_CPT  = 1 << 7;
        const ALL = Self::CRT.bits | Self::DEL.bits | Self::FRZ.bits | Self::ADD_SRC.bits
            | Self::ADD_DST.bits | Self::REM.bits | Self::PRC_CRT.bits | Self::PRC_CPT.bits;
    }
}

bitflags::bitflags! {
    /// Permission bits for a `PGT` (page-table) capability.
    pub struct PgtFlags: u32 {
        const ADD_SRC    = 1 << 0;
        const ADD_DST    = 1 << 1;
        const REM        = 1 << 2;
        const CHILD      = 1 << 3;
        const CON_PARENT = 1 << 4;
        const DES_PARENT = 1 << 5;
        const PRC_CRT    = 1 << 6;
        const PRC_PGT    = 1 << 7;
        const ALL = Self::ADD_SRC.bits | Self::ADD_DST.bits | Self::REM.bits | Self::CHILD.bits
            | Self::CON_PARENT.bits | Self::DES_PARENT.bits | Self::PRC_CRT.bits | Self::PRC_PGT.bits;
    }
}

bitflags::bitflags! {
    /// Permission bits for a `KOM` (kernel-memory) capability: which object
    /// kinds its range may be used to create.
    pub struct KomFlags: u32 {
        const CPT = 1 << 0;
        const PGT = 1 << 1;
        const THD = 1 << 2;
        const INV = 1 << 3;
        const ALL = Self::CPT.bits | Self::PGT.bits | Self::THD.bits | Self::INV.bits;
    }
}

bitflags::bitflags! {
    /// Permission bits for a `PRC` (process) capability.
    pub struct PrcFlags: u32 {
        const INV = 1 << 0;
        const THD = 1 << 1;
        const CPT = 1 << 2;
        const PGT = 1 << 3;
        const ALL = Self::INV.bits | Self::THD.bits | Self::CPT.bits | Self::PGT.bits;
    }
}

bitflags::bitflags! {
    /// Permission bits for a `THD` (thread) capability.
    pub struct ThdFlags: u32 {
        const EXEC_SET    = 1 << 0;
        const SCHED_CHILD = 1 << 1;
        const SCHED_PARENT = 1 << 2;
        const SCHED_PRIO  = 1 << 3;
        const SCHED_FREE  = 1 << 4;
        const SCHED_RCV   = 1 << 5;
        const XFER_SRC    = 1 << 6;
        const XFER_DST    = 1 << 7;
        const SWT         = 1 << 8;
        const ALL = Self::EXEC_SET.bits | Self::SCHED_CHILD.bits | Self::SCHED_PARENT.bits
            | Self::SCHED_PRIO.bits | Self::SCHED_FREE.bits | Self::SCHED_RCV.bits
            | Self::XFER_SRC.bits | Self::XFER_DST.bits | Self::SWT.bits;
    }
}

bitflags::bitflags! {
    /// Permission bits for a `SIG` (signal endpoint) capability.
    pub struct SigFlags: u32 {
        const SND    = 1 << 0;
        const RCV_BS = 1 << 1;
        const RCV_BM = 1 << 2;
        const RCV_NS = 1 << 3;
        const RCV_NM = 1 << 4;
        const SCHED  = 1 << 5;
        const RCV = Self::RCV_BS.bits | Self::RCV_BM.bits | Self::RCV_NS.bits | Self::RCV_NM.bits;
        const ALL = Self::SND.bits | Self::RCV.bits | Self::SCHED.bits;
    }
}

bitflags::bitflags! {
    /// Permission bits for an `INV` (synchronous invocation) capability.
    pub struct InvFlags: u32 {
        const SET = 1 << 0;
        const ACT = 1 << 1;
        const ALL = Self::SET.bits | Self::ACT.bits;
    }
}
