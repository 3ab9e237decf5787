use core::fmt;
use core::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// `ProcessId` is stored as `NonZeroU64`, so that `Option<ProcessId>`
/// still uses only `size_of::<ProcessId>()` bytes
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(NonZeroU64);
impl ProcessId {
    /// The first process id handed out by the scheduler
    pub const fn first() -> Self {
        Self(unsafe { NonZeroU64::new_unchecked(1) })
    }

    /// Only to be used when deserializing from system call data and such
    pub fn from_u64(value: u64) -> Self {
        Self(NonZeroU64::new(value).expect("Zero ProcessId"))
    }

    /// Only to be used by the process scheduler
    pub fn next(self) -> Self {
        Self(NonZeroU64::new(self.0.get() + 1).expect("ProcessId overflow"))
    }

    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}
impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kernel-wide task (thread) identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TaskId(u64);
impl TaskId {
    pub const fn first() -> Self {
        Self(1)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }
}
impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse process privilege. Only gates registering filesystem delegates
/// and changing another process's working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SecurityLevel {
    Kernel = 0,
    Driver = 1,
    Application = 2,
}
