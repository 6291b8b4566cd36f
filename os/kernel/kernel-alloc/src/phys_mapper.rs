//! # HHDM-based `PhysMapper`
//!
//! With a higher-half direct map (HHDM) every physical address is visible at
//! `HHDM_BASE + pa`. This is the *direct-map alias* of a frame: the cacheable
//! kernel view that the coherent allocator must flush before it hands the
//! same frame to a device through an uncached mapping.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::HhdmPhysMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::PhysMapper;
//!
//! let va = HhdmPhysMapper.phys_to_virt(PhysicalAddress::new(0x1234_0000));
//! assert_eq!(va.as_u64(), kernel_info::memory::HHDM_BASE + 0x1234_0000);
//! ```

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] implementation for kernels with a higher-half direct map.
///
/// # Safety
/// Dereferencing the returned addresses is only sound if the HHDM covers the
/// referenced physical range.
#[derive(Debug, Copy, Clone, Default)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(HHDM_BASE + pa.as_u64())
    }
}
