#![no_std]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::nonstandard_macro_braces)] // https://github.com/shepmaster/snafu/issues/296

//! RME: a capability-based microkernel nucleus for MPU-class microcontrollers.
//!
//! The crate is a plain `no_std` library with no target-specific entry
//! point of its own — a board's bring-up code constructs a
//! [`kernel::KernelContext`] over its chosen [`arch::PlatformOps`] impl,
//! calls [`boot::boot`] once, and then feeds every trap into
//! [`syscall::dispatch`]. Everything below that line is architecture-neutral
//! and host-testable.

/// Compile-time size class (run-queue levels, per-core count, MPU budget).
pub mod config;
/// Error taxonomy and the negative wire-code mapping (spec §6).
pub mod error;
/// Platform collaborator boundary (`PlatformOps`) and its host test double.
#[macro_use]
pub mod arch;
/// Capability names, slots and tables (spec §2, §4.2).
pub mod caps;
/// Kernel-Memory Allocator and object table (spec §4.1).
pub mod kot;
/// Kernel objects: page tables, processes, threads, signals, invocations.
pub mod objects;
/// Kernel-Function Port (spec §4.9).
pub mod kfn;
/// Fault classification and the vector-dispatch flag buffer (spec §4.10).
pub mod fault;
/// Per-core scheduler state (spec §9).
pub mod percpu;
/// System-Call Dispatcher (spec §4.8).
pub mod syscall;
/// Top-level kernel context aggregating every arena (spec §9).
pub mod kernel;
/// Boot-time fixed-slot creation (spec §6 "Boot state").
pub mod boot;
/// Kernel console output, routed through a registered sink.
pub mod macros;

pub use arch::PlatformOps;
pub use boot::boot;
pub use kernel::KernelContext;
pub use syscall::{dispatch, Service};
