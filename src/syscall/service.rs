/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Service number enumeration (spec §4.8, §6 "Service numbers").
//!
//! Reproduces the original's `RME_SVC_*` numbering exactly
//! (`Include/rme.h` 336-409): user-space ABI compatibility depends on these
//! specific values, so where the distilled spec is silent on exact numbers
//! we follow the original rather than invent a fresh enumeration.

/// A decoded service number, and the switch-point class it belongs to
/// (spec §4.8: "non-switching / potentially-switching / invocation-return").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Service {
    InvRet = 0,
    InvAct = 1,
    SigSnd = 2,
    SigRcv = 3,
    Kfn = 4,
    ThdSchedFree = 5,
    ThdExecSet = 6,
    ThdSchedPrio = 7,
    ThdTimeXfer = 8,
    ThdSwt = 9,
    CptCrt = 10,
    CptDel = 11,
    CptFrz = 12,
    CptAdd = 13,
    CptRem = 14,
    PgtCrt = 15,
    PgtDel = 16,
    PgtAdd = 17,
    PgtRem = 18,
    PgtCon = 19,
    PgtDes = 20,
    PrcCrt = 21,
    PrcDel = 22,
    PrcCpt = 23,
    PrcPgt = 24,
    ThdCrt = 25,
    ThdDel = 26,
    ThdSchedBind = 27,
    ThdSchedRcv = 28,
    SigCrt = 29,
    SigDel = 30,
    InvCrt = 31,
    InvDel = 32,
    InvSet = 33,
}

impl Service {
    pub const fn from_u8(v: u8) -> Option<Service> {
        Some(match v {
            0 => Service::InvRet,
            1 => Service::InvAct,
            2 => Service::SigSnd,
            3 => Service::SigRcv,
            4 => Service::Kfn,
            5 => Service::ThdSchedFree,
            6 => Service::ThdExecSet,
            7 => Service::ThdSchedPrio,
            8 => Service::ThdTimeXfer,
            9 => Service::ThdSwt,
            10 => Service::CptCrt,
            11 => Service::CptDel,
            12 => Service::CptFrz,
            13 => Service::CptAdd,
            14 => Service::CptRem,
            15 => Service::PgtCrt,
            16 => Service::PgtDel,
            17 => Service::PgtAdd,
            18 => Service::PgtRem,
            19 => Service::PgtCon,
            20 => Service::PgtDes,
            21 => Service::PrcCrt,
            22 => Service::PrcDel,
            23 => Service::PrcCpt,
            24 => Service::PrcPgt,
            25 => Service::ThdCrt,
            26 => Service::ThdDel,
            27 => Service::ThdSchedBind,
            28 => Service::ThdSchedRcv,
            29 => Service::SigCrt,
            30 => Service::SigDel,
            31 => Service::InvCrt,
            32 => Service::InvDel,
            33 => Service::InvSet,
            _ => return None,
        })
    }

    /// Switch-point class (spec §4.8).
    pub const fn class(self) -> ServiceClass {
        match self {
            Service::InvRet => ServiceClass::InvocationReturn,
            Service::InvAct
            | Service::SigSnd
            | Service::SigRcv
            | Service::Kfn
            | Service::ThdSchedFree
            | Service::ThdSchedPrio
            | Service::ThdTimeXfer
            | Service::ThdSwt => ServiceClass::PotentiallySwitching,
            _ => ServiceClass::NonSwitching,
        }
    }
}

/// Spec §4.8's three dispatch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceClass {
    NonSwitching,
    PotentiallySwitching,
    InvocationReturn,
}
