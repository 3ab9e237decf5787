//! Address-space bookkeeping for the filesystem core.
//!
//! Real page tables and physical frames are the architecture layer's
//! business; the VFS only consumes the narrow contracts here: the
//! active-space register, the contextual-pointer discipline, and the
//! per-process virtual range pools used when mapping a requester's buffer
//! into a delegate task's space.

mod address_space;
mod contextual;
mod virt_range;

pub use self::address_space::{AddressSpaceId, AddressSpaces, SpaceGuard, PAGE_SIZE};
pub use self::contextual::Contextual;
pub use self::virt_range::VirtRangePool;
