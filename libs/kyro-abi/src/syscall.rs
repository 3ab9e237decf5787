//! Data structs for the filesystem system calls.
//!
//! Each struct lives in the calling process's address space; the kernel
//! reaches it through a contextual pointer and copies the results into the
//! trailing fields before the call returns (or the task is woken).

use crate::fs::{
    ClonefdStatus, CloseStatus, CreateNodeStatus, DirectoryIterator, FileDescriptor,
    GetWorkingDirectoryStatus, LengthStatus, NodeId, NodeKind, OpenDirectoryStatus, OpenFlags,
    OpenStatus, PhysId, PipeStatus, ReadDirectoryStatus, ReadStatus, RegisterAsDelegateStatus,
    SeekMode, SeekStatus, SetWorkingDirectoryStatus, StatStatus, TellStatus, TransactionId,
    TransactionStatus, WriteStatus,
};
use crate::process::ProcessId;

#[repr(C)]
#[derive(Debug)]
pub struct SetWorkingDirectoryData {
    pub path: *const u8,
    pub path_len: usize,
    /// Target process when a kernel-level task changes another process's
    /// working directory; `None` targets the caller
    pub process: Option<ProcessId>,
    pub status: SetWorkingDirectoryStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct GetWorkingDirectoryData {
    pub buffer: *mut u8,
    pub buffer_len: usize,
    pub result_len: usize,
    pub status: GetWorkingDirectoryStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsOpenData {
    pub path: *const u8,
    pub path_len: usize,
    pub flags: OpenFlags,
    pub status: OpenStatus,
    pub fd: FileDescriptor,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsCloseData {
    pub fd: FileDescriptor,
    pub result: i64,
    pub status: CloseStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsReadData {
    pub fd: FileDescriptor,
    pub buffer: *mut u8,
    pub length: i64,
    pub result: i64,
    pub status: ReadStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsWriteData {
    pub fd: FileDescriptor,
    pub buffer: *const u8,
    pub length: i64,
    pub result: i64,
    pub status: WriteStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsSeekData {
    pub fd: FileDescriptor,
    pub amount: i64,
    pub mode: SeekMode,
    pub result: i64,
    pub status: SeekStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsTellData {
    pub fd: FileDescriptor,
    pub result: i64,
    pub status: TellStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsLengthData {
    /// Take the length of `fd` when true, of `path` otherwise
    pub by_fd: bool,
    pub follow_symlinks: bool,
    pub fd: FileDescriptor,
    pub path: *const u8,
    pub path_len: usize,
    pub length: i64,
    pub status: LengthStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsOpenDirectoryData {
    pub path: *const u8,
    pub path_len: usize,
    pub iterator: *mut DirectoryIterator,
    pub status: OpenDirectoryStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsReadDirectoryData {
    pub iterator: *mut DirectoryIterator,
    pub status: ReadDirectoryStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsPipeData {
    pub blocking: bool,
    pub write_fd: FileDescriptor,
    pub read_fd: FileDescriptor,
    pub status: PipeStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsClonefdData {
    pub source_fd: FileDescriptor,
    pub source_pid: ProcessId,
    /// Explicit target descriptor, or `INVALID` to allocate one
    pub target_fd: FileDescriptor,
    pub target_pid: ProcessId,
    pub result: FileDescriptor,
    pub status: ClonefdStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsStatData {
    pub path: *const u8,
    pub path_len: usize,
    pub follow_symlinks: bool,
    pub result: i64,
    pub status: StatStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsFstatData {
    pub fd: FileDescriptor,
    pub result: i64,
    pub status: StatStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsRegisterAsDelegateData {
    pub name: *const u8,
    pub name_len: usize,
    /// The driver's own id for the mountpoint, echoed back on discovery
    pub phys_mountpoint_id: PhysId,
    pub mountpoint_id: NodeId,
    /// Address of the transaction storage page in the caller's space
    pub transaction_storage: usize,
    pub status: RegisterAsDelegateStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsSetTransactionStatusData {
    pub transaction: TransactionId,
    pub status: TransactionStatus,
}

#[repr(C)]
#[derive(Debug)]
pub struct FsCreateNodeData {
    pub parent_id: NodeId,
    pub name: *const u8,
    pub name_len: usize,
    pub kind: NodeKind,
    pub phys_id: PhysId,
    pub created_id: NodeId,
    pub status: CreateNodeStatus,
}
