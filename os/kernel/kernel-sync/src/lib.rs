//! # Kernel synchronization primitives
//!
//! - [`SpinLock`]: test-and-test-and-set spin lock with an RAII guard, plus
//!   [`SpinLock::lock_irqsave`] which additionally keeps local interrupts
//!   disabled while the lock is held.
//! - [`IrqGuard`]: save-and-disable of the local interrupt flag.
//! - [`SyncOnceCell`]: write-once cell for boot-time singletons.
//!
//! On bare-metal x86-64 the interrupt flag is the real `RFLAGS.IF`. Hosted
//! builds (unit and integration tests) use a per-thread emulated flag so that
//! lock discipline can still be asserted.

#![cfg_attr(target_os = "none", no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::IrqGuard;
pub use spin_lock::{IrqSpinLockGuard, SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
