//! Virtual-range bookkeeping for the coherent window.
//!
//! [`RegionTracker`] keeps the live reservations as a singly linked list
//! sorted by start address. Free space is implicit: it is whatever lies
//! between two neighbours. Placement is first fit from the window base.
//!
//! ```text
//! base                                                             limit
//!  │ [r0 start, r0 end)   gap   [r1 start, r1 end)        gap        │
//!  └──────────┬──────────────────────────┬────────────────────────────┘
//!          head ───────────────────► r0.next ──► None
//! ```
//!
//! Nodes are ordinary heap boxes. They are allocated by the caller as a
//! [`RegionSlot`] *before* the tracker lock is taken and handed back out on
//! failure or release, so neither the heap nor any other blocking service is
//! entered while the list is locked.

use crate::AddressWindow;
use alloc::alloc::{Layout, alloc};
use alloc::boxed::Box;
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};

/// One reserved, page-aligned range `[start, end)` of the window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reservation {
    start: VirtualAddress,
    end: VirtualAddress,
}

impl Reservation {
    #[inline]
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    /// Exclusive end.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.end.as_u64() - self.start.as_u64()
    }

    /// Start address of every page, ascending.
    pub fn pages(&self) -> impl Iterator<Item = VirtualAddress> + use<> {
        let start = self.start;
        (0..self.size() / Size4K::SIZE).map(move |i| start + i * Size4K::SIZE)
    }
}

struct RegionNode {
    region: Reservation,
    /// Cleared while the reservation is being torn down.
    active: bool,
    next: Option<Box<RegionNode>>,
}

/// Pre-allocated bookkeeping object for one reservation.
pub struct RegionSlot(Box<RegionNode>);

impl RegionSlot {
    /// Allocate a node from the kernel heap.
    ///
    /// Returns `None` instead of aborting when the heap is exhausted.
    #[must_use]
    pub fn try_new() -> Option<Self> {
        let layout = Layout::new::<RegionNode>();
        // SAFETY: RegionNode is not zero-sized.
        let ptr = unsafe { alloc(layout) }.cast::<RegionNode>();
        if ptr.is_null() {
            return None;
        }
        let empty = VirtualAddress::zero();
        // SAFETY: ptr is valid for a write of one RegionNode and was obtained
        // from the global allocator with RegionNode's layout.
        unsafe {
            ptr.write(RegionNode {
                region: Reservation { start: empty, end: empty },
                active: false,
                next: None,
            });
            Some(Self(Box::from_raw(ptr)))
        }
    }
}

impl core::fmt::Debug for RegionSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegionSlot")
            .field("region", &self.0.region)
            .field("active", &self.0.active)
            .finish_non_exhaustive()
    }
}

/// Sorted list of disjoint reservations inside one [`AddressWindow`].
///
/// A reservation passed to [`begin_release`](Self::begin_release) keeps its
/// range occupied until [`finish_release`](Self::finish_release). [`len`](Self::len),
/// [`bytes_reserved`](Self::bytes_reserved) and [`iter`](Self::iter) count it
/// until then; [`find`](Self::find) no longer does.
pub struct RegionTracker {
    window: AddressWindow,
    head: Option<Box<RegionNode>>,
    count: usize,
    bytes: u64,
}

impl RegionTracker {
    #[must_use]
    pub const fn new(window: AddressWindow) -> Self {
        Self {
            window,
            head: None,
            count: 0,
            bytes: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn window(&self) -> AddressWindow {
        self.window
    }

    /// Number of occupied ranges, including ones being released.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sum of all reservation sizes.
    #[inline]
    #[must_use]
    pub const fn bytes_reserved(&self) -> u64 {
        self.bytes
    }

    /// Occupied ranges in ascending order, including ones being released.
    pub fn iter(&self) -> impl Iterator<Item = Reservation> + '_ {
        core::iter::successors(self.head.as_deref(), |n| n.next.as_deref()).map(|n| n.region)
    }

    /// Reserve the first gap of `size` bytes, scanning up from the window base.
    ///
    /// `size` must be a non-zero multiple of the page size.
    ///
    /// # Errors
    /// Hands `slot` back if no gap is large enough.
    pub fn reserve(&mut self, slot: RegionSlot, size: u64) -> Result<Reservation, RegionSlot> {
        debug_assert!(size != 0 && Size4K::is_aligned(size));
        let base = self.window.base().as_u64();
        let limit = self.window.limit().as_u64();
        if size == 0 || size > limit - base {
            return Err(slot);
        }

        let mut addr = base;
        let mut pos = 0;
        for r in self.iter() {
            if addr + size <= r.start.as_u64() {
                break;
            }
            addr = r.end.as_u64();
            if addr > limit - size {
                return Err(slot);
            }
            pos += 1;
        }

        let region = Reservation {
            start: VirtualAddress::new(addr),
            end: VirtualAddress::new(addr + size),
        };

        let mut cursor = &mut self.head;
        for _ in 0..pos {
            let Some(node) = cursor else { break };
            cursor = &mut node.next;
        }

        let mut node = slot.0;
        node.region = region;
        node.active = true;
        node.next = cursor.take();
        *cursor = Some(node);

        self.count += 1;
        self.bytes += size;
        Ok(region)
    }

    /// The live reservation starting exactly at `start`.
    #[must_use]
    pub fn find(&self, start: VirtualAddress) -> Option<Reservation> {
        core::iter::successors(self.head.as_deref(), |n| n.next.as_deref())
            .find(|n| n.active && n.region.start == start)
            .map(|n| n.region)
    }

    /// Mark the live reservation at `start` as being released and return it.
    ///
    /// The range stays occupied until [`finish_release`](Self::finish_release)
    /// unlinks it, and a second `begin_release` for the same start fails.
    pub fn begin_release(&mut self, start: VirtualAddress) -> Option<Reservation> {
        let mut cur = self.head.as_deref_mut();
        while let Some(node) = cur {
            if node.region.start == start {
                if !node.active {
                    return None;
                }
                node.active = false;
                return Some(node.region);
            }
            if node.region.start > start {
                return None;
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    /// Unlink the reservation at `start` previously passed to
    /// [`begin_release`](Self::begin_release) and hand back its node.
    pub fn finish_release(&mut self, start: VirtualAddress) -> Option<RegionSlot> {
        let pos = self.iter().position(|r| r.start == start)?;

        let mut cursor = &mut self.head;
        for _ in 0..pos {
            let Some(node) = cursor else { return None };
            cursor = &mut node.next;
        }

        let mut node = cursor.take()?;
        debug_assert!(!node.active, "releasing a reservation that is still live");
        *cursor = node.next.take();

        self.count -= 1;
        self.bytes -= node.region.size();
        Some(RegionSlot(node))
    }

    /// Release the live reservation at `start` in one step, for callers that
    /// have nothing to tear down in between.
    pub fn release(&mut self, start: VirtualAddress) -> Option<RegionSlot> {
        self.begin_release(start)?;
        self.finish_release(start)
    }
}

impl Drop for RegionTracker {
    fn drop(&mut self) {
        // unlink iteratively; the default drop would recurse once per node
        let mut cur = self.head.take();
        while let Some(mut node) = cur {
            cur = node.next.take();
        }
    }
}
