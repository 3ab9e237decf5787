use core::sync::atomic::{AtomicU64, Ordering};

use static_assertions::const_assert;

/// Page size used for mapping arithmetic
pub const PAGE_SIZE: usize = 4096;
const_assert!(PAGE_SIZE.is_power_of_two());

/// Identifier of a hardware address space. One per process; space zero is
/// the kernel-only space active during early boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AddressSpaceId(u64);
impl AddressSpaceId {
    pub const KERNEL: Self = Self(0);

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// The active-space register and the space id allocator.
///
/// Switching the actual page tables is done by the architecture layer; the
/// filesystem tracks the active space only to enforce the contextual
/// pointer rules.
#[derive(Debug)]
pub struct AddressSpaces {
    current: AtomicU64,
    next: AtomicU64,
}
impl AddressSpaces {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            next: AtomicU64::new(1),
        }
    }

    /// Issues a fresh address space id
    pub fn allocate(&self) -> AddressSpaceId {
        AddressSpaceId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The currently active space
    pub fn current(&self) -> AddressSpaceId {
        AddressSpaceId(self.current.load(Ordering::Acquire))
    }

    /// Switches to `space`, returning the previously active space
    pub fn switch_to(&self, space: AddressSpaceId) -> AddressSpaceId {
        AddressSpaceId(self.current.swap(space.0, Ordering::AcqRel))
    }

    /// Enters `space`; the previously active space is restored on drop
    pub fn enter(&self, space: AddressSpaceId) -> SpaceGuard<'_> {
        let previous = self.switch_to(space);
        SpaceGuard {
            spaces: self,
            previous,
        }
    }
}

/// Restores the saved address space when dropped
pub struct SpaceGuard<'a> {
    spaces: &'a AddressSpaces,
    previous: AddressSpaceId,
}
impl Drop for SpaceGuard<'_> {
    fn drop(&mut self) {
        self.spaces.switch_to(self.previous);
    }
}
