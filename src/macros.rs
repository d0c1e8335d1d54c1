/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Kernel console output, routed through a registered [`Console`] sink
//! instead of a hardcoded UART, since the nucleus never owns the UART
//! itself (board bring-up is a collaborator's job, spec §6 Non-goals).

use core::cell::UnsafeCell;

/// Interior mutability for the `CONSOLE` global. Every kernel service
/// already runs with interrupts masked for its whole duration (spec §7:
/// "every service is single-step under interrupt disable"), so this lock
/// never actually contends; it exists purely to let a `&'static` hand out
/// `&mut` safely.
struct NullLock<T> {
    data: UnsafeCell<T>,
}

unsafe impl<T> Sync for NullLock<T> {}

impl<T> NullLock<T> {
    const fn new(data: T) -> NullLock<T> {
        NullLock { data: UnsafeCell::new(data) }
    }

    fn lock<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        f(unsafe { &mut *self.data.get() })
    }
}

/// A sink the nucleus can write diagnostic text to. A board's bring-up code
/// registers one with [`set_console`]; until then, `print!`/`println!` are
/// silently dropped.
pub trait Console: core::fmt::Write {}
impl<T: core::fmt::Write> Console for T {}

static CONSOLE: NullLock<Option<&'static mut dyn Console>> = NullLock::new(None);

/// Register the console sink used by `print!`/`println!` for the rest of
/// this image's lifetime. Not reentrant-safe to call more than once.
pub fn set_console(console: &'static mut dyn Console) {
    CONSOLE.lock(|slot| *slot = Some(console));
}

/// Macro similar to [std](https://doc.rust-lang.org/src/std/macros.rs.html)
/// but for writing into the registered kernel console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::macros::_print(format_args!($($arg)*)));
}

/// Macro similar to [std](https://doc.rust-lang.org/src/std/macros.rs.html)
/// but for writing into the registered kernel console.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ({
        $crate::macros::_print(format_args!($($arg)*));
        $crate::macros::_print(format_args!("\n"));
    })
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    use core::fmt::Write;

    CONSOLE.lock(|console| {
        if let Some(c) = console {
            let _ = c.write_fmt(args);
        }
    })
}
