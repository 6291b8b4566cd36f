//! # Memory Layout
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │         User Space              │
//! LAST_USERSPACE_ADDRESS├─────────────────────────────────┤
//!                       │        Guard Region             │
//! HHDM_BASE             ├─────────────────────────────────┤
//!                       │   Higher Half Direct Mapping    │
//! DMA_COHERENT_BASE     ├─────────────────────────────────┤
//!                       │   Coherent DMA window (2 MiB)   │
//! DMA_COHERENT_LIMIT    ├─────────────────────────────────┤ == KERNEL_BASE
//!                       │       Kernel Text & Data        │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```

/// End of userspace VA range after which Kernel space begins.
pub const LAST_USERSPACE_ADDRESS: u64 = 0xffff_0000_0000_0000;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel executes (VMA), matches your linker script.
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Span of one leaf page table (512 × 4 KiB).
pub const LEAF_TABLE_SPAN: u64 = 0x20_0000; // 2 MiB

/// First virtual address of the coherent DMA window.
///
/// Pages handed out by the coherent allocator are mapped uncached inside
/// `[DMA_COHERENT_BASE, DMA_COHERENT_LIMIT)`. The window occupies exactly one
/// leaf page table, directly below the kernel image.
pub const DMA_COHERENT_BASE: u64 = KERNEL_BASE - DMA_COHERENT_SIZE;

/// Size of the coherent DMA window in bytes.
pub const DMA_COHERENT_SIZE: u64 = LEAF_TABLE_SPAN;

/// Exclusive end of the coherent DMA window.
pub const DMA_COHERENT_LIMIT: u64 = DMA_COHERENT_BASE + DMA_COHERENT_SIZE;

/// Physical frames below this address form the DMA zone, reachable by
/// devices with 24 address bits (ISA-style masters).
pub const DMA_ZONE_LIMIT: u64 = 0x0100_0000; // 16 MiB

/// Devices whose coherent mask is narrower than this must be served from the
/// DMA zone.
pub const DMA_FULL_MASK: u64 = 0xffff_ffff;

const _: () = {
    assert!(HHDM_BASE >= LAST_USERSPACE_ADDRESS);
    assert!(KERNEL_BASE > HHDM_BASE);
    assert!(DMA_COHERENT_BASE > HHDM_BASE);
    assert!(DMA_COHERENT_LIMIT <= KERNEL_BASE);
    assert!(DMA_COHERENT_BASE.is_multiple_of(LEAF_TABLE_SPAN));
    assert!(DMA_COHERENT_SIZE <= LEAF_TABLE_SPAN);
    assert!(DMA_ZONE_LIMIT.is_multiple_of(4096));
};
