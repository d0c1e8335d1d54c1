/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel object kinds (spec §4.1–§4.7), one module per component in
//! dependency order. Each object kind that needs to outlive a single
//! capability slot (page tables, processes, threads, invocation frames,
//! signals) lives in a fixed-size arena addressed by integer handle, per
//! the spec's §9 redesign note.

pub mod inv;
pub mod kom;
pub mod pgt;
pub mod prc;
pub mod sig;
pub mod thd;
