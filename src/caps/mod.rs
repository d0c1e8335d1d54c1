/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Capability system (spec §3, §4.2): names, slots, permission flags, and
//! the capability-table arena that resolves one into the other.

pub mod flags;
pub mod name;
pub mod slot;
pub mod table;

pub use name::CapName;
pub use slot::{CapSlot, CapType, SlotAttr, SlotStatus};
pub use table::{CapTable, CapTableArena};
