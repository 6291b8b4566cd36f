//! x86-64 implementations of the platform hooks.

use crate::{BusTranslator, CacheMaintenance};
use kernel_memory_addresses::{BusAddress, PageSize, PhysicalAddress, Size4K, VirtualAddress};

/// Bus addresses equal physical addresses (no IOMMU, no bus offset).
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityBus;

impl BusTranslator for IdentityBus {
    #[inline]
    fn physical_to_bus(&self, pa: PhysicalAddress) -> BusAddress {
        BusAddress::new(pa.as_u64())
    }
}

/// Bus addresses are physical addresses plus a constant, as behind a host
/// bridge that remaps system RAM.
#[derive(Debug, Copy, Clone)]
pub struct OffsetBus {
    pub offset: u64,
}

impl BusTranslator for OffsetBus {
    #[inline]
    fn physical_to_bus(&self, pa: PhysicalAddress) -> BusAddress {
        BusAddress::new(pa.as_u64().wrapping_add(self.offset))
    }
}

/// Cache maintenance with `clflush` and TLB maintenance with `invlpg`.
///
/// x86 has no separate clean and invalidate operations: `clflush` writes a
/// dirty line back and evicts it, which satisfies all three data-cache
/// requests. A trailing `mfence` orders the flushes against later stores and
/// device doorbell writes.
///
/// `invlpg` is privileged; [`invalidate_tlb_range`](CacheMaintenance::invalidate_tlb_range)
/// must run at CPL0.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Copy, Clone, Default)]
pub struct X86CacheOps;

#[cfg(target_arch = "x86_64")]
impl X86CacheOps {
    /// `clflush` granularity on every x86-64 part in practice; CPUID leaf 1
    /// reports it in EBX[15:8].
    pub const CACHE_LINE: u64 = 64;

    fn flush_lines(start: VirtualAddress, len: u64) {
        if len == 0 {
            return;
        }
        let first = start.as_u64() & !(Self::CACHE_LINE - 1);
        let end = start.as_u64().saturating_add(len);
        let mut line = first;
        while line < end {
            // SAFETY: clflush faults only on unmapped addresses; callers pass
            // ranges they own.
            unsafe {
                core::arch::asm!("clflush [{}]", in(reg) line, options(nostack, preserves_flags));
            }
            line += Self::CACHE_LINE;
        }
        // SAFETY: a pure ordering barrier.
        unsafe { core::arch::asm!("mfence", options(nostack, preserves_flags)) }
    }
}

#[cfg(target_arch = "x86_64")]
impl CacheMaintenance for X86CacheOps {
    fn invalidate_range(&self, start: VirtualAddress, len: u64) {
        Self::flush_lines(start, len);
    }

    fn clean_range(&self, start: VirtualAddress, len: u64) {
        Self::flush_lines(start, len);
    }

    fn clean_and_invalidate_range(&self, start: VirtualAddress, len: u64) {
        Self::flush_lines(start, len);
    }

    fn invalidate_tlb_range(&self, start: VirtualAddress, len: u64) {
        let first = start.as_u64() & !(Size4K::SIZE - 1);
        let end = start.as_u64().saturating_add(len);
        let mut page = first;
        while page < end {
            // SAFETY: invlpg only drops a translation; CPL0 is required by
            // the trait contract above.
            unsafe {
                core::arch::asm!("invlpg [{}]", in(reg) page, options(nostack, preserves_flags));
            }
            page += Size4K::SIZE;
        }
    }
}
