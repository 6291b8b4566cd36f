//! # Coherent DMA Memory
//!
//! Buffers shared between the CPU and bus-mastering devices, mapped so that
//! neither side needs explicit cache maintenance for the buffer contents.
//!
//! ```text
//!            ┌──────────────────────── coherent window (one PT) ──────────┐
//!  CPU ─────►│ [alloc A]  [alloc B]       [alloc C]                       │  PCD/PWT/PAT
//!            └─────┬──────────┬───────────────┬───────────────────────────┘
//!                  │          │               │      page table entries
//!            ┌─────▼──┐  ┌────▼─────┐   ┌─────▼──┐
//!  RAM       │ 2^k    │  │ 2^k      │   │ 2^k    │   physical runs
//!            └─────▲──┘  └────▲─────┘   └─────▲──┘
//!                  │          │               │      BusTranslator
//!  Device ─────────┴──────────┴───────────────┘      bus addresses
//! ```
//!
//! ## Pieces
//! - [`AddressWindow`]: the fixed virtual range mappings live in.
//! - [`RegionTracker`]: sorted list of reserved ranges, first-fit placement.
//! - [`CoherentAllocator`]: ties frames, window, page table and cache
//!   maintenance together. Implements [`CoherentDma`].
//! - [`sync_range`] / [`DmaDirection`]: cache maintenance around transfers.
//! - [`CoherentBuffer`]: an allocation that frees itself on drop.
//! - [`global`]: the kernel-wide instance and `dma_*_coherent` wrappers.
//!
//! ## Platform hooks
//! The allocator is generic over [`CacheMaintenance`] and [`BusTranslator`].
//! [`X86CacheOps`] and [`IdentityBus`] are the bare-metal x86-64 choices;
//! tests substitute recording implementations.
//!
//! ## Locking
//! The tracker lock disables interrupts on the local CPU and is never held
//! across frame allocation, page table edits or heap allocation. Leaf entries
//! are edited with per-entry atomics by whoever owns the virtual page.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod arch;
mod buffer;
mod coherent;
mod device;
mod error;
pub mod global;
mod ops;
mod region;
mod sync;
mod window;

#[cfg(target_arch = "x86_64")]
pub use crate::arch::X86CacheOps;
pub use crate::arch::{IdentityBus, OffsetBus};
pub use crate::buffer::CoherentBuffer;
pub use crate::coherent::CoherentAllocator;
pub use crate::device::{CoherentDma, DeviceConstraints};
pub use crate::error::{
    CoherentAllocError, CoherentFreeError, GlobalInstallError, WindowInitError,
};
pub use crate::ops::{BusTranslator, CacheMaintenance};
pub use crate::region::{RegionSlot, RegionTracker, Reservation};
pub use crate::sync::{DmaDirection, sync_range};
pub use crate::window::AddressWindow;

pub use kernel_alloc::frame_alloc::AllocFlags;
pub use kernel_vmem::CacheAttributes;
