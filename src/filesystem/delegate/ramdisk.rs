use alloc::string::String;

use kyro_abi::fs::{
    DiscoveryStatus, FileDescriptor, LengthStatus, NodeId, NodeKind, OpenFlags, OpenStatus,
    PhysId, ReadStatus, TransactionId, TransactionStatus, WriteStatus,
};
use kyro_abi::fs::{CloseStatus, DirectoryRefreshStatus};
use kyro_abi::ProcessId;

use crate::memory::Contextual;

use super::super::handler::{
    CloseHandler, DirectoryRefreshHandler, DiscoveryHandler, GetLengthHandler, OpenHandler,
    ReadHandler, WriteHandler,
};
use super::super::ramdisk::{RamdiskEntryKind, RamdiskId};
use super::super::Vfs;

/// Serves nodes backed by the boot archive. Every request completes
/// inline: the transaction is `Finished` before the request returns.
#[derive(Debug)]
pub struct RamdiskDelegate;

impl RamdiskDelegate {
    /// Archive entry backing a node. Mountpoints (and the root itself)
    /// stand for the archive root.
    fn archive_entry_for(vfs: &Vfs, node: NodeId) -> Option<RamdiskId> {
        let (kind, phys) = {
            let nodes = vfs.nodes.lock();
            let n = nodes.node(node)?;
            (n.kind, n.phys_id)
        };
        let id = match kind {
            NodeKind::Mountpoint | NodeKind::Root => vfs.ramdisk.lock().root(),
            _ => RamdiskId::from(phys?),
        };
        if vfs.ramdisk.lock().entry(id).is_some() {
            Some(id)
        } else {
            None
        }
    }

    /// Creates the virtual node for an archive entry and attaches it
    fn create_vfs_node(
        vfs: &Vfs, entry: RamdiskId, name: String, kind: RamdiskEntryKind, parent: NodeId,
    ) -> NodeId {
        let node_kind = match kind {
            RamdiskEntryKind::File => NodeKind::File,
            RamdiskEntryKind::Folder => NodeKind::Folder,
        };
        let mut nodes = vfs.nodes.lock();
        let id = nodes.create_node(node_kind, name);
        nodes.node_mut(id).expect("fresh node").phys_id = Some(PhysId::from(entry));
        nodes.add_child(parent, id);
        id
    }

    pub fn request_discovery(
        &self, vfs: &Vfs, parent: NodeId, name: &str, handler: &mut DiscoveryHandler,
    ) -> TransactionId {
        // the archive is in kernel memory, so the work happens immediately
        let id = vfs.transactions.lock().next_transaction();

        let child = Self::archive_entry_for(vfs, parent).and_then(|rd_parent| {
            let ramdisk = vfs.ramdisk.lock();
            let child = ramdisk.find_child(rd_parent, name)?;
            let entry = ramdisk.entry(child)?;
            Some((child, entry.name.clone(), entry.kind))
        });

        match child {
            Some((entry, entry_name, kind)) => {
                Self::create_vfs_node(vfs, entry, entry_name, kind, parent);
                handler.status = DiscoveryStatus::Successful;
            },
            None => handler.status = DiscoveryStatus::NotFound,
        }

        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_open(
        &self, vfs: &Vfs, node: NodeId, name: &str, flags: OpenFlags, handler: &mut OpenHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        match handler.discovery_status {
            DiscoveryStatus::Successful => match Self::archive_entry_for(vfs, node) {
                Some(entry) => {
                    let mut ramdisk = vfs.ramdisk.lock();
                    let entry = ramdisk.entry_mut(entry).expect("checked entry");
                    if !entry.is_file() {
                        log::warn!(
                            "only files can be opened, '{}' is a {:?}",
                            entry.name,
                            entry.kind
                        );
                        handler.status = OpenStatus::Error;
                    } else {
                        if flags.contains(OpenFlags::TRUNCATE) {
                            // only applies once the data left the read-only archive
                            entry.truncate();
                        }
                        handler.status = OpenStatus::Successful;
                    }
                },
                None => handler.status = OpenStatus::Error,
            },
            DiscoveryStatus::NotFound => {
                if flags.contains(OpenFlags::CREATE) {
                    match Self::archive_entry_for(vfs, node) {
                        Some(parent_entry) => {
                            let created = vfs.ramdisk.lock().create_child(parent_entry, name);
                            handler.node = Self::create_vfs_node(
                                vfs,
                                created,
                                String::from(name),
                                RamdiskEntryKind::File,
                                node,
                            );
                            handler.status = OpenStatus::Successful;
                        },
                        None => handler.status = OpenStatus::Error,
                    }
                } else {
                    handler.status = OpenStatus::NotFound;
                }
            },
            DiscoveryStatus::Busy | DiscoveryStatus::Error => handler.status = OpenStatus::Error,
        }

        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_close(&self, vfs: &Vfs, handler: &mut CloseHandler) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();
        // nothing to do here
        handler.status = CloseStatus::Successful;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_read(
        &self, vfs: &Vfs, node: NodeId, length: i64, buffer: Contextual<*mut u8>,
        pid: ProcessId, fd: FileDescriptor, handler: &mut ReadHandler,
    ) -> TransactionId {
        let id = match handler.repeat_transaction {
            Some(repeat) => repeat,
            None => vfs.transactions.lock().next_transaction(),
        };

        let entry = match Self::archive_entry_for(vfs, node) {
            Some(entry) => entry,
            None => {
                handler.status = ReadStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        let offset = match vfs.descriptors.lock().get(pid, fd) {
            Some(content) => content.offset.max(0) as usize,
            None => {
                handler.status = ReadStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        let dst =
            unsafe { core::slice::from_raw_parts_mut(buffer.get(vfs.spaces.current()), length.max(0) as usize) };
        let copied = {
            let ramdisk = vfs.ramdisk.lock();
            ramdisk.entry(entry).expect("checked entry").read_at(offset, dst)
        };
        if copied > 0 {
            if let Some(content) = vfs.descriptors.lock().get_mut(pid, fd) {
                content.offset += copied as i64;
            }
        }

        handler.result = copied as i64;
        handler.status = ReadStatus::Successful;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_write(
        &self, vfs: &Vfs, node: NodeId, length: i64, buffer: Contextual<*const u8>,
        pid: ProcessId, fd: FileDescriptor, handler: &mut WriteHandler,
    ) -> TransactionId {
        let id = match handler.repeat_transaction {
            Some(repeat) => repeat,
            None => vfs.transactions.lock().next_transaction(),
        };

        let entry = match Self::archive_entry_for(vfs, node) {
            Some(entry) => entry,
            None => {
                handler.status = WriteStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        let (mut offset, flags) = match vfs.descriptors.lock().get(pid, fd) {
            Some(content) => (content.offset.max(0) as usize, content.open_flags),
            None => {
                handler.status = WriteStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        let src =
            unsafe { core::slice::from_raw_parts(buffer.get(vfs.spaces.current()), length.max(0) as usize) };
        {
            let mut ramdisk = vfs.ramdisk.lock();
            let entry = ramdisk.entry_mut(entry).expect("checked entry");
            if flags.contains(OpenFlags::APPEND) {
                offset = entry.len();
            }
            entry.write_at(offset, src);
        }
        if let Some(content) = vfs.descriptors.lock().get_mut(pid, fd) {
            content.offset = (offset + src.len()) as i64;
        }

        handler.result = src.len() as i64;
        handler.status = WriteStatus::Successful;
        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_get_length(
        &self, vfs: &Vfs, node: NodeId, handler: &mut GetLengthHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        match Self::archive_entry_for(vfs, node) {
            Some(entry) => {
                handler.status = LengthStatus::Successful;
                handler.length = vfs.ramdisk.lock().entry(entry).expect("checked entry").len() as i64;
            },
            None => {
                handler.status = LengthStatus::NotFound;
                handler.length = 0;
            },
        }

        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }

    pub fn request_directory_refresh(
        &self, vfs: &Vfs, folder: NodeId, handler: &mut DirectoryRefreshHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        match Self::archive_entry_for(vfs, folder) {
            Some(rd_folder) => {
                // collect the archive children, then create the nodes that
                // do not exist yet; entries that vanished keep their nodes
                let children: alloc::vec::Vec<_> = {
                    let ramdisk = vfs.ramdisk.lock();
                    let mut children = alloc::vec::Vec::new();
                    let mut position = 0;
                    while let Some(child) = ramdisk.child_at(rd_folder, position) {
                        let entry = ramdisk.entry(child).expect("listed child");
                        children.push((child, entry.name.clone(), entry.kind));
                        position += 1;
                    }
                    children
                };

                for (entry, name, kind) in children {
                    let exists = vfs.nodes.lock().find_child(folder, &name).is_some();
                    if !exists {
                        Self::create_vfs_node(vfs, entry, name, kind, folder);
                    }
                }

                if let Some(node) = vfs.nodes.lock().node_mut(folder) {
                    node.contents_valid = true;
                }
                handler.status = DirectoryRefreshStatus::Successful;
            },
            None => handler.status = DirectoryRefreshStatus::Error,
        }

        vfs.transactions.lock().set(id, TransactionStatus::Finished);
        id
    }
}
