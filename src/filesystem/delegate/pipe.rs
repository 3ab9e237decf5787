use alloc::sync::Arc;
use spin::Mutex;

use kyro_abi::fs::{
    CloseStatus, DirectoryRefreshStatus, DiscoveryStatus, LengthStatus, NodeId, OpenStatus,
    ReadStatus, TransactionId, TransactionStatus, WriteStatus,
};
use kyro_abi::ProcessId;

use crate::memory::Contextual;

use super::super::handler::{
    CloseHandler, DirectoryRefreshHandler, DiscoveryHandler, GetLengthHandler, OpenHandler,
    ReadHandler, WriteHandler,
};
use super::super::pipes::{Pipe, PipeId};
use super::super::Vfs;

/// Backs pipe nodes with the pipe store's ring buffers. Requests complete
/// inline, except that a blocking pipe which cannot make progress parks
/// the requester by leaving the transaction in `Repeat`.
#[derive(Debug)]
pub struct PipeDelegate;

impl PipeDelegate {
    fn pipe_for(vfs: &Vfs, node: NodeId) -> Option<(PipeId, Arc<Mutex<Pipe>>)> {
        let phys = vfs.nodes.lock().node(node)?.phys_id?;
        let id = PipeId::from(phys);
        let pipe = vfs.pipes.lock().get(id)?;
        Some((id, pipe))
    }

    pub fn request_read(
        &self, vfs: &Vfs, node: NodeId, length: i64, buffer: Contextual<*mut u8>,
        pid: ProcessId, handler: &mut ReadHandler,
    ) -> TransactionId {
        let id = match handler.repeat_transaction {
            Some(repeat) => repeat,
            None => vfs.transactions.lock().next_transaction(),
        };

        let pipe = match Self::pipe_for(vfs, node) {
            Some((_, pipe)) => pipe,
            None => {
                handler.status = ReadStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        let mut pipe = pipe.lock();
        if pipe.size() == 0 {
            if !pipe.has_reference_from_other_process(pid) {
                // the writer side is gone: end of stream
                handler.result = 0;
                handler.status = ReadStatus::Successful;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            } else if !pipe.is_blocking() {
                handler.status = ReadStatus::Again;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            } else {
                vfs.transactions.lock().set(id, TransactionStatus::Repeat);
            }
            return id;
        }

        let dst = unsafe {
            core::slice::from_raw_parts_mut(buffer.get(vfs.spaces.current()), length.max(0) as usize)
        };
        let count = pipe.read(dst);
        handler.result = count as i64;
        handler.status = ReadStatus::Successful;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_write(
        &self, vfs: &Vfs, node: NodeId, length: i64, buffer: Contextual<*const u8>,
        handler: &mut WriteHandler,
    ) -> TransactionId {
        let id = match handler.repeat_transaction {
            Some(repeat) => repeat,
            None => vfs.transactions.lock().next_transaction(),
        };

        let pipe = match Self::pipe_for(vfs, node) {
            Some((_, pipe)) => pipe,
            None => {
                handler.status = WriteStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        let length = length.max(0) as usize;
        let mut pipe = pipe.lock();
        let available = pipe.capacity() - pipe.size();
        if available < length {
            if pipe.is_blocking() {
                vfs.transactions.lock().set(id, TransactionStatus::Repeat);
                return id;
            }
            if available == 0 {
                handler.status = WriteStatus::Again;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            }
            // non-blocking: accept what fits
        }

        let src = unsafe { core::slice::from_raw_parts(buffer.get(vfs.spaces.current()), length) };
        let count = pipe.write(src);
        handler.result = count as i64;
        handler.status = WriteStatus::Successful;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_get_length(
        &self, vfs: &Vfs, node: NodeId, handler: &mut GetLengthHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();
        match Self::pipe_for(vfs, node) {
            Some((_, pipe)) => {
                handler.status = LengthStatus::Successful;
                handler.length = pipe.lock().size() as i64;
            },
            None => {
                handler.status = LengthStatus::NotFound;
                handler.length = 0;
            },
        }
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    /// Descriptor mapping acquired the reference; releasing it here keeps
    /// the pipe alive exactly as long as descriptors point at it. The pipe
    /// node is garbage collected together with its pipe.
    pub fn request_close(
        &self, vfs: &Vfs, pid: ProcessId, node: NodeId, handler: &mut CloseHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();
        if let Some((pipe_id, _)) = Self::pipe_for(vfs, node) {
            let freed = vfs.pipes.lock().remove_reference(pipe_id, pid);
            if freed {
                vfs.nodes.lock().remove_node(node);
                log::trace!("pipe node {:?} removed with pipe {:?}", node, pipe_id);
            }
        }
        handler.status = CloseStatus::Successful;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_open(&self, vfs: &Vfs, handler: &mut OpenHandler) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();
        handler.status = OpenStatus::Successful;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    // pipes are created through the pipe call, never discovered
    pub fn request_discovery(&self, vfs: &Vfs, handler: &mut DiscoveryHandler) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();
        handler.status = DiscoveryStatus::Error;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_directory_refresh(
        &self, vfs: &Vfs, handler: &mut DirectoryRefreshHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();
        handler.status = DirectoryRefreshStatus::Error;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }
}
