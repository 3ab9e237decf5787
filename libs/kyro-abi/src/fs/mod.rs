//! Filesystem ABI: identifiers, open flags and the per-operation status
//! sets. Every operation has its own closed status enum; statuses never
//! unwind, they are copied into the caller's data struct when the
//! operation finishes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub mod protocol;

/// Maximum length of an absolute path, in bytes
pub const PATH_MAX: usize = 4096;

/// Maximum length of a single path component, in bytes
pub const FILENAME_MAX: usize = 256;

/// Byte capacity of a freshly created pipe
pub const PIPE_DEFAULT_CAPACITY: usize = 0x1000;

/// Globally unique virtual node id. Ids are monotone and never reused;
/// id zero is reserved and never assigned to a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u64);
impl NodeId {
    /// The reserved null id
    pub const ZERO: Self = Self(0);

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

/// Delegate-private identifier: a ramdisk entry id, a pipe id, or whatever
/// id a driver task negotiated for one of its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PhysId(u64);
impl PhysId {
    pub const ZERO: Self = Self(0);

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

/// Per-process file descriptor. Values 0-2 are reserved for the standard
/// streams; the filesystem hands out descriptors starting at 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FileDescriptor(i64);
impl FileDescriptor {
    /// Sentinel for "no descriptor"
    pub const INVALID: Self = Self(-1);

    pub const fn first() -> Self {
        Self(3)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }

    pub const fn from_i64(value: i64) -> Self {
        Self(value)
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

/// Process-wide transaction id, monotone and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TransactionId(u64);
impl TransactionId {
    pub const fn first() -> Self {
        Self(0)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// State of an outstanding transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Dispatched, awaiting completion
    Waiting,
    /// The delegate could not complete this time; the waiter must restart
    /// the transaction with the same handler and the same id
    Repeat,
    /// The handler is ready to finish
    Finished,
}

bitflags! {
    /// Open mode flags
    pub struct OpenFlags: u32 {
        /// Position the offset at the end of the file before each write
        const APPEND   = 1 << 0;
        /// Create the file if it does not exist
        const CREATE   = 1 << 1;
        /// Drop the existing contents on open
        const TRUNCATE = 1 << 2;
    }
}

/// Node kinds in the virtual filesystem graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    Root,
    Mountpoint,
    Folder,
    File,
    Pipe,
}

/// Seek base for `fs_seek`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SeekMode {
    Set,
    Cur,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryStatus {
    Successful,
    NotFound,
    Busy,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenStatus {
    Successful,
    NotFound,
    Busy,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseStatus {
    Successful,
    InvalidFd,
    Busy,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStatus {
    Successful,
    InvalidFd,
    Busy,
    /// Non-blocking pipe operation would have had to wait
    Again,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteStatus {
    Successful,
    InvalidFd,
    Busy,
    /// Non-blocking pipe operation would have had to wait
    Again,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthStatus {
    Successful,
    NotFound,
    InvalidFd,
    Busy,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekStatus {
    Successful,
    InvalidFd,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TellStatus {
    Successful,
    InvalidFd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenDirectoryStatus {
    Successful,
    NotFound,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadDirectoryStatus {
    Successful,
    EndOfDirectory,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryRefreshStatus {
    Successful,
    Busy,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipeStatus {
    Successful,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClonefdStatus {
    Successful,
    InvalidSourceFd,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetWorkingDirectoryStatus {
    Successful,
    NotFound,
    NotAFolder,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetWorkingDirectoryStatus {
    Successful,
    SizeExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterAsDelegateStatus {
    Successful,
    FailedExisting,
    FailedDelegateCreation,
    FailedNotPermitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateNodeStatus {
    Created,
    Updated,
    FailedNoParent,
}

/// `stat`/`fstat` are reserved and unimplemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatStatus {
    Unsupported,
}

/// Directory iteration state, owned by the calling process
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DirectoryIterator {
    /// Folder node being iterated
    pub node_id: NodeId,
    /// Index of the next child to return
    pub position: u64,
    /// Filled by each successful `fs_read_directory`
    pub entry: DirectoryEntry,
}
impl DirectoryIterator {
    pub const fn empty() -> Self {
        Self {
            node_id: NodeId::ZERO,
            position: 0,
            entry: DirectoryEntry::empty(),
        }
    }
}

/// One directory entry as reported to a process
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DirectoryEntry {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub name_len: usize,
    pub name: [u8; FILENAME_MAX],
}
impl DirectoryEntry {
    pub const fn empty() -> Self {
        Self {
            node_id: NodeId::ZERO,
            kind: NodeKind::File,
            name_len: 0,
            name: [0; FILENAME_MAX],
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}
