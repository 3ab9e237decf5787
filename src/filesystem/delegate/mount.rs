use kyro_abi::fs::{
    CloseStatus, DirectoryRefreshStatus, DiscoveryStatus, LengthStatus, NodeId, OpenStatus,
    ReadStatus, TransactionId, TransactionStatus, WriteStatus,
};

use super::super::handler::{
    CloseHandler, DirectoryRefreshHandler, DiscoveryHandler, GetLengthHandler, OpenHandler,
    ReadHandler, WriteHandler,
};
use super::super::Vfs;

/// Serves the `/mount` node itself. Its children are the built-in and
/// driver-registered mountpoints, which the kernel creates directly, so
/// the delegate has no storage behind it: discovery of unknown names
/// fails and file IO is not applicable.
#[derive(Debug)]
pub struct MountDelegate;

impl MountDelegate {
    fn finished(vfs: &Vfs) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_discovery(&self, vfs: &Vfs, handler: &mut DiscoveryHandler) -> TransactionId {
        handler.status = DiscoveryStatus::NotFound;
        Self::finished(vfs)
    }

    /// Mountpoint children are kernel-created and therefore always current
    pub fn request_directory_refresh(
        &self, vfs: &Vfs, folder: NodeId, handler: &mut DirectoryRefreshHandler,
    ) -> TransactionId {
        if let Some(node) = vfs.nodes.lock().node_mut(folder) {
            node.contents_valid = true;
        }
        handler.status = DirectoryRefreshStatus::Successful;
        Self::finished(vfs)
    }

    pub fn request_open(&self, vfs: &Vfs, handler: &mut OpenHandler) -> TransactionId {
        handler.status = OpenStatus::Error;
        Self::finished(vfs)
    }

    pub fn request_close(&self, vfs: &Vfs, handler: &mut CloseHandler) -> TransactionId {
        handler.status = CloseStatus::Error;
        Self::finished(vfs)
    }

    pub fn request_read(&self, vfs: &Vfs, handler: &mut ReadHandler) -> TransactionId {
        handler.status = ReadStatus::Error;
        Self::finished(vfs)
    }

    pub fn request_write(&self, vfs: &Vfs, handler: &mut WriteHandler) -> TransactionId {
        handler.status = WriteStatus::Error;
        Self::finished(vfs)
    }

    pub fn request_get_length(&self, vfs: &Vfs, handler: &mut GetLengthHandler) -> TransactionId {
        handler.status = LengthStatus::Error;
        Self::finished(vfs)
    }
}
