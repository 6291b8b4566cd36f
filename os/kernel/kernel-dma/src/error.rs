use kernel_memory_addresses::{BusAddress, VirtualAddress};
use kernel_vmem::EnsureTableError;

/// Recoverable failure of a coherent allocation. Nothing is leaked: every
/// frame, bookkeeping object and reservation taken so far has been returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoherentAllocError {
    #[error("zero-sized coherent allocation")]
    ZeroSize,
    #[error("{size:#x} bytes exceed the largest physical run")]
    TooLarge { size: u64 },
    #[error("no free physical run of order {order}")]
    OutOfFrames { order: u32 },
    #[error("out of memory for reservation bookkeeping")]
    OutOfBookkeeping,
    #[error("no {size:#x}-byte gap left in the coherent window")]
    WindowExhausted { size: u64 },
    #[error("bus address {bus} is not reachable with DMA mask {mask:#x}")]
    MaskUnreachable { bus: BusAddress, mask: u64 },
}

/// Rejected coherent free. The call had no side effects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoherentFreeError {
    #[error("{0} is not the start of a coherent allocation")]
    NotAllocated(VirtualAddress),
}

/// Failure to set up the coherent window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowInitError {
    #[error("cannot create page tables for the window: {0}")]
    PageTables(#[from] EnsureTableError),
    #[error("coherent window already contains mappings")]
    WindowInUse,
    #[error("window bounds must be page aligned and non-empty")]
    Misaligned,
    #[error("window must lie within a single leaf page table")]
    SpansTables,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlobalInstallError {
    #[error("a coherent DMA allocator is already installed")]
    AlreadyInstalled,
}
