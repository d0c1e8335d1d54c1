/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Per-CPU local state (spec §3 "Per-CPU local").
//!
//! One instance per logical core; the dispatcher borrows its owning core's
//! instance for the duration of a single syscall (spec §5: "single-threaded
//! cooperative inside the kernel... with interrupts disabled at entry").

use crate::objects::thd::{RunQueue, Tid};

pub struct PerCpu {
    pub cpu_id: usize,
    pub current: Option<Tid>,
    /// Arena index of the kernel's per-CPU tick signal (boot slot 6).
    pub tick_sig: Option<usize>,
    /// Arena index of the kernel's per-CPU vector signal (boot slot 7).
    pub vector_sig: Option<usize>,
    pub run_queue: RunQueue,
}

impl PerCpu {
    pub fn new(cpu_id: usize) -> PerCpu {
        PerCpu {
            cpu_id,
            current: None,
            tick_sig: None,
            vector_sig: None,
            run_queue: RunQueue::new(),
        }
    }
}
