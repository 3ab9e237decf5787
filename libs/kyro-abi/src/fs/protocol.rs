//! Protocol between the kernel and user-space filesystem drivers.
//!
//! When a task registers as a delegate, the kernel maps one page of
//! *transaction storage* into that task's address space. For every request
//! the kernel fills the matching variant (request fields in, result fields
//! out) and sends a [`DelegateRequest`] message to the driver's queue. The
//! driver performs the operation, writes the result fields and reports
//! completion with the `fs_set_transaction_status` system call.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use super::{
    CloseStatus, DirectoryRefreshStatus, DiscoveryStatus, LengthStatus, NodeId, OpenFlags,
    OpenStatus, PhysId, ReadStatus, TransactionId, WriteStatus, FILENAME_MAX,
};

/// Message sent to a delegate task when the kernel requests an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateRequest {
    pub operation: RequestOp,
    pub transaction: TransactionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOp {
    Discover,
    Open,
    Close,
    Read,
    Write,
    GetLength,
    DirectoryRefresh,
}

/// Contents of the transaction storage page. One variant per operation;
/// only one operation is in flight per delegate at a time.
#[derive(Debug)]
pub enum TransactionStorage {
    Idle,
    Discovery(DiscoveryStorage),
    Open(OpenStorage),
    Close(CloseStorage),
    Read(ReadStorage),
    Write(WriteStorage),
    GetLength(GetLengthStorage),
    DirectoryRefresh(DirectoryRefreshStorage),
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryStorage {
    pub parent_phys_id: PhysId,
    pub name_len: usize,
    pub name: [u8; FILENAME_MAX],
    pub result_status: DiscoveryStatus,
}
impl DiscoveryStorage {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpenStorage {
    /// Phys id of the node itself when it exists, of its parent otherwise
    pub phys_id: PhysId,
    pub name_len: usize,
    pub name: [u8; FILENAME_MAX],
    pub flags: OpenFlags,
    /// True when discovery found the node, false when it is to be created
    pub existing: bool,
    pub result_status: OpenStatus,
    /// When the driver created the node (via `fs_create_node`), the id of
    /// the created node, so the kernel can map the descriptor onto it
    pub result_node_id: NodeId,
}
impl OpenStorage {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CloseStorage {
    pub phys_id: PhysId,
    pub result_status: CloseStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadStorage {
    pub phys_id: PhysId,
    pub offset: i64,
    pub length: i64,
    /// The requester's buffer, mapped into the delegate's address space for
    /// the duration of the transaction
    pub mapped_buffer: *mut u8,
    pub mapping_start: u64,
    pub mapping_pages: usize,
    pub result_read: i64,
    pub result_status: ReadStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteStorage {
    pub phys_id: PhysId,
    pub offset: i64,
    pub length: i64,
    /// The requester's buffer, mapped into the delegate's address space for
    /// the duration of the transaction
    pub mapped_buffer: *const u8,
    pub mapping_start: u64,
    pub mapping_pages: usize,
    pub result_written: i64,
    pub result_status: WriteStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct GetLengthStorage {
    pub phys_id: PhysId,
    pub result_length: i64,
    pub result_status: LengthStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectoryRefreshStorage {
    pub phys_id: PhysId,
    /// Virtual id of the folder, for the driver's `fs_create_node` calls
    pub parent_node_id: NodeId,
    pub result_status: DirectoryRefreshStatus,
}

// The storage must fit the single page mapped into the delegate task
const_assert!(core::mem::size_of::<TransactionStorage>() <= 4096);
