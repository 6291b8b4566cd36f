use crate::CacheMaintenance;
use kernel_memory_addresses::VirtualAddress;
use log::error;

/// Direction of a device transfer, from the CPU's point of view.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DmaDirection {
    /// Both sides read and write the buffer.
    Bidirectional,
    /// The CPU wrote, the device reads.
    ToDevice,
    /// The device wrote, the CPU reads.
    FromDevice,
    /// No transfer. Only meaningful as a debugging placeholder; syncing with
    /// it is a bug.
    None,
}

/// Make `[start, start + len)` coherent for a transfer in `dir`.
///
/// | Direction       | Maintenance             |
/// |-----------------|-------------------------|
/// | `FromDevice`    | invalidate              |
/// | `ToDevice`      | clean                   |
/// | `Bidirectional` | clean + invalidate      |
///
/// # Panics
/// On [`DmaDirection::None`].
pub fn sync_range<C: CacheMaintenance + ?Sized>(
    cache: &C,
    start: VirtualAddress,
    len: u64,
    dir: DmaDirection,
) {
    match dir {
        DmaDirection::FromDevice => cache.invalidate_range(start, len),
        DmaDirection::ToDevice => cache.clean_range(start, len),
        DmaDirection::Bidirectional => cache.clean_and_invalidate_range(start, len),
        DmaDirection::None => {
            error!("coherent sync of {start}+{len:#x} without a direction");
            panic!("invalid DMA direction {dir:?}");
        }
    }
}
