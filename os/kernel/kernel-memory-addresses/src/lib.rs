//! # Virtual, Physical and Bus Address Types
//!
//! Strongly typed wrappers for the three address spaces a coherent DMA buffer
//! lives in at the same time:
//!
//! | Type | Who uses it |
//! |------|-------------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | The CPU, through the page tables. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | The page-frame allocator and page-table entries. |
//! | [`BusAddress`] | A device, when it is programmed to read or write memory. |
//!
//! All three are `#[repr(transparent)]` wrappers around `u64`, so they cost
//! nothing at runtime but refuse to be mixed up at compile time. A bus address
//! is frequently numerically equal to the physical address it was derived
//! from; keeping a separate type makes the translation step explicit.
//!
//! ## Page Sizes
//!
//! Page sizes are marker types implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages, the granularity of every coherent mapping.
//! - [`Size2M`]: 2 MiB, the span covered by one leaf page table. The
//!   coherent window is sized and aligned to this granule.
//!
//! ## Typical Usage
//!
//! ```rust
//! use kernel_memory_addresses::*;
//!
//! let va = VirtualAddress::new(0xFFFF_FFFF_7FE0_1234);
//! let page = va.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0xFFFF_FFFF_7FE0_1000);
//! assert_eq!(va.offset_in::<Size4K>(), 0x234);
//!
//! assert_eq!(Size4K::pages_for(0x1001), 2);
//! assert_eq!(Size4K::align_up(0x1001), Some(0x2000));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod bus_address;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use bus_address::BusAddress;
pub use page_size::{PageSize, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;
