//! # Kernel Memory Configuration
//!
//! Compile-time memory layout shared by the page-table, frame-allocation and
//! DMA crates. Everything here is a `const`; the layout is fixed per platform
//! and validated by compile-time assertions in [`memory`].
//!
//! * **Direct map**: physical memory is visible at [`memory::HHDM_BASE`] + `pa`.
//! * **Coherent DMA window**: one leaf page table worth of virtual space
//!   ([`memory::DMA_COHERENT_BASE`] .. [`memory::DMA_COHERENT_LIMIT`]) that
//!   the coherent allocator maps uncached pages into.
//! * **DMA zone**: frames below [`memory::DMA_ZONE_LIMIT`] for devices with
//!   narrow address masks.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
