use core::fmt;

use super::AddressSpaceId;

/// A value, usually a raw pointer, bound to the address space it is valid
/// in.
///
/// Dereferencing a user pointer outside its owning space would read
/// unrelated memory, so every access presents the currently active space;
/// a mismatch is an invariant violation and panics instead of returning.
pub struct Contextual<T> {
    value: T,
    space: AddressSpaceId,
}
impl<T: Copy> Contextual<T> {
    pub fn new(value: T, space: AddressSpaceId) -> Self {
        Self { value, space }
    }

    /// The address space this value belongs to
    pub fn space(&self) -> AddressSpaceId {
        self.space
    }

    /// Returns the wrapped value after checking that `current` is the
    /// owning space
    pub fn get(&self, current: AddressSpaceId) -> T {
        assert!(
            current == self.space,
            "contextual value accessed from space {}, owned by space {}",
            current.as_u64(),
            self.space.as_u64()
        );
        self.value
    }
}
impl<T> fmt::Debug for Contextual<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contextual(space {})", self.space.as_u64())
    }
}

// The wrapped pointers are only dereferenced in their owning space, which
// the accessor enforces at runtime.
unsafe impl<T> Send for Contextual<T> {}
unsafe impl<T> Sync for Contextual<T> {}
