//! # Physical Memory Allocation
//!
//! The physical side of kernel memory management:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • HHDM: physical → direct-map virtual address    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • power-of-two runs of 4 KiB frames              │
//! │    • bitmap free/used tracking, DMA zone            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//!
//! [`PageFrameAlloc`](frame_alloc::PageFrameAlloc) hands out naturally
//! aligned runs of `2^order` frames and takes them back whole or one frame at
//! a time. [`BitmapFrameAlloc`](frame_alloc::BitmapFrameAlloc) is the
//! in-kernel implementation; it also implements
//! [`kernel_vmem::FrameAlloc`] so the same pool feeds page-table allocation.
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! [`HhdmPhysMapper`](phys_mapper::HhdmPhysMapper) implements
//! [`kernel_vmem::PhysMapper`] by adding `HHDM_BASE`.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::frame_alloc::{AllocFlags, BitmapFrameAlloc, PageFrameAlloc};
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let mut frames = BitmapFrameAlloc::new(PhysicalAddress::new(0x10_0000), 256);
//! let run = frames.alloc_pages(AllocFlags::empty(), 2).unwrap();
//! assert_eq!(run.pages(), 4);
//! frames.free_pages(run);
//! assert_eq!(frames.free_frames(), 256);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod frame_alloc;
pub mod phys_mapper;
