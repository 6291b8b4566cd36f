//! Local interrupt flag control.
//!
//! [`IrqGuard`] snapshots the interrupt-enable state of the current CPU,
//! disables interrupts, and restores the previous state on drop. Nesting is
//! safe: an inner guard created while interrupts are already off leaves them
//! off when it is dropped.
//!
//! # Platform
//!
//! - `x86_64` bare metal: `pushfq/pop`, `cli`, `sti`. Must run at CPL0.
//! - Hosted builds: a per-thread flag that starts out enabled. This keeps the
//!   locking code testable without privileged instructions.

/// Whether interrupts are currently enabled on this CPU.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::enabled()
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// # Examples
///
/// ```
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// let before = interrupts_enabled();
/// {
///     let _g = IrqGuard::new();
///     assert!(!interrupts_enabled());
/// }
/// assert_eq!(interrupts_enabled(), before);
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = arch::enabled();
        if were_enabled {
            arch::disable();
        }
        Self { were_enabled }
    }
}

impl Drop for IrqGuard {
    /// Re-enables interrupts only if they were enabled before.
    fn drop(&mut self) {
        if self.were_enabled {
            arch::enable();
        }
    }
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
mod arch {
    /// `RFLAGS.IF`
    const INTERRUPT_FLAG: u64 = 1 << 9;

    #[inline]
    pub fn enabled() -> bool {
        let r: u64;
        // SAFETY: reads RFLAGS through the stack slot pushfq just wrote.
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(preserves_flags)) }
        r & INTERRUPT_FLAG != 0
    }

    #[inline]
    pub fn disable() {
        // SAFETY: runs at CPL0; masking interrupts has no memory effects.
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        // SAFETY: runs at CPL0; only called to restore a previously saved IF.
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(not(target_os = "none"))]
mod arch {
    use std::cell::Cell;

    std::thread_local! {
        static ENABLED: Cell<bool> = const { Cell::new(true) };
    }

    #[inline]
    pub fn enabled() -> bool {
        ENABLED.with(Cell::get)
    }

    #[inline]
    pub fn disable() {
        ENABLED.with(|f| f.set(false));
    }

    #[inline]
    pub fn enable() {
        ENABLED.with(|f| f.set(true));
    }
}

#[cfg(all(target_os = "none", not(target_arch = "x86_64")))]
compile_error!("kernel-sync: interrupt masking is only implemented for x86_64");
