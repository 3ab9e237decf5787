use alloc::boxed::Box;

use kyro_abi::fs::protocol::{
    CloseStorage, DelegateRequest, DirectoryRefreshStorage, DiscoveryStorage, GetLengthStorage,
    OpenStorage, ReadStorage, RequestOp, TransactionStorage, WriteStorage,
};
use kyro_abi::fs::{
    CloseStatus, DirectoryRefreshStatus, DiscoveryStatus, FileDescriptor, LengthStatus, NodeId,
    OpenFlags, OpenStatus, PhysId, ReadStatus, TransactionId, TransactionStatus, WriteStatus,
    FILENAME_MAX,
};
use kyro_abi::{ProcessId, TaskId};

use crate::memory::{Contextual, PAGE_SIZE};
use crate::multitasking::Scheduler;

use super::super::handler::{
    CloseHandler, DirectoryRefreshHandler, DiscoveryHandler, GetLengthHandler, OpenHandler,
    ReadHandler, WriteHandler,
};
use super::super::Vfs;
use crate::ipc::SendStatus;

/// A mountpoint served by a user-space driver task.
///
/// Requests are written into the transaction storage page mapped in the
/// driver's address space, then announced with a message. The driver
/// fills the result fields and reports completion through
/// `fs_set_transaction_status`; only then does the waiter run the finish
/// path, which copies the results back out under an explicit space
/// switch.
#[derive(Debug)]
pub struct TaskedDelegate {
    task: TaskId,
    storage: Contextual<*mut TransactionStorage>,
}

impl TaskedDelegate {
    /// Allocates the transaction storage in the delegate task's address
    /// space. Returns the delegate and the storage address to report back
    /// to the driver.
    pub fn prepare(vfs: &Vfs, sched: &mut Scheduler, task: TaskId) -> (Self, usize) {
        let space = sched.process_of(task).address_space;

        // switch into the driver's space for the mapping, in case delegate
        // creation is ever triggered on behalf of another process
        let storage = {
            let _space = vfs.spaces.enter(space);
            Box::into_raw(Box::new(TransactionStorage::Idle))
        };
        log::debug!(
            "fs delegate transaction storage created at {:#x} of task {}",
            storage as usize,
            task
        );

        (
            Self {
                task,
                storage: Contextual::new(storage, space),
            },
            storage as usize,
        )
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    fn with_storage<R>(&self, vfs: &Vfs, f: impl FnOnce(&mut TransactionStorage) -> R) -> R {
        let _space = vfs.spaces.enter(self.storage.space());
        let storage = unsafe { &mut *self.storage.get(vfs.spaces.current()) };
        f(storage)
    }

    fn send_request(&self, vfs: &Vfs, operation: RequestOp, transaction: TransactionId) -> SendStatus {
        let message = pinecone::to_vec(&DelegateRequest {
            operation,
            transaction,
        })
        .expect("delegate request encoding cannot fail");
        vfs.bus.lock().send(self.task, message)
    }

    fn name_array(name: &str) -> ([u8; FILENAME_MAX], usize) {
        let mut array = [0u8; FILENAME_MAX];
        array[..name.len()].copy_from_slice(name.as_bytes());
        (array, name.len())
    }

    fn node_phys(vfs: &Vfs, node: NodeId) -> PhysId {
        vfs.nodes
            .lock()
            .node(node)
            .and_then(|n| n.phys_id)
            .unwrap_or(PhysId::ZERO)
    }

    pub fn request_discovery(
        &self, vfs: &Vfs, _sched: &mut Scheduler, parent: NodeId, name: &str,
        handler: &mut DiscoveryHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        if name.len() > FILENAME_MAX {
            log::warn!("tried to discover a node with a name of illegal length");
            handler.status = DiscoveryStatus::Error;
            vfs.transactions.lock().set(id, TransactionStatus::Finished);
            return id;
        }

        let parent_phys = Self::node_phys(vfs, parent);
        let (name, name_len) = Self::name_array(name);
        self.with_storage(vfs, |storage| {
            *storage = TransactionStorage::Discovery(DiscoveryStorage {
                parent_phys_id: parent_phys,
                name_len,
                name,
                result_status: DiscoveryStatus::Error,
            });
        });

        match self.send_request(vfs, RequestOp::Discover, id) {
            SendStatus::Successful => {
                vfs.transactions.lock().set(id, TransactionStatus::Waiting);
            },
            failure => {
                let status = match failure {
                    SendStatus::QueueFull => DiscoveryStatus::Busy,
                    _ => DiscoveryStatus::Error,
                };
                log::warn!("could not request discovery from fs delegate: {:?}", failure);
                handler.status = status;
                // the finish path reads the storage, so the failure must
                // land there as well
                self.with_storage(vfs, |storage| {
                    if let TransactionStorage::Discovery(d) = storage {
                        d.result_status = status;
                    }
                });
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            },
        }
        id
    }

    pub fn finish_discovery(&self, vfs: &Vfs, handler: &mut DiscoveryHandler) {
        handler.status = self.with_storage(vfs, |storage| match storage {
            TransactionStorage::Discovery(d) => d.result_status,
            other => {
                log::warn!("unexpected transaction storage {:?} on discovery finish", other);
                DiscoveryStatus::Error
            },
        });
    }

    pub fn request_open(
        &self, vfs: &Vfs, _sched: &mut Scheduler, node: NodeId, name: &str, flags: OpenFlags,
        handler: &mut OpenHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        if name.len() > FILENAME_MAX {
            handler.status = OpenStatus::Error;
            vfs.transactions.lock().set(id, TransactionStatus::Finished);
            return id;
        }

        let existing = handler.discovery_status == DiscoveryStatus::Successful;
        let phys = Self::node_phys(vfs, node);
        let (name, name_len) = Self::name_array(name);
        self.with_storage(vfs, |storage| {
            *storage = TransactionStorage::Open(OpenStorage {
                phys_id: phys,
                name_len,
                name,
                flags,
                existing,
                result_status: OpenStatus::Error,
                result_node_id: if existing { node } else { NodeId::ZERO },
            });
        });

        match self.send_request(vfs, RequestOp::Open, id) {
            SendStatus::Successful => {
                vfs.transactions.lock().set(id, TransactionStatus::Waiting);
            },
            failure => {
                let status = match failure {
                    SendStatus::QueueFull => OpenStatus::Busy,
                    _ => OpenStatus::Error,
                };
                log::warn!("could not request open from fs delegate: {:?}", failure);
                handler.status = status;
                self.with_storage(vfs, |storage| {
                    if let TransactionStorage::Open(o) = storage {
                        o.result_status = status;
                    }
                });
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            },
        }
        id
    }

    pub fn finish_open(&self, vfs: &Vfs, handler: &mut OpenHandler) {
        let (status, result_node) = self.with_storage(vfs, |storage| match storage {
            TransactionStorage::Open(o) => (o.result_status, o.result_node_id),
            other => {
                log::warn!("unexpected transaction storage {:?} on open finish", other);
                (OpenStatus::Error, NodeId::ZERO)
            },
        });
        handler.status = status;

        // when the driver created the file, it reports the node id it
        // registered through fs_create_node
        if status == OpenStatus::Successful && handler.discovery_status == DiscoveryStatus::NotFound
        {
            if vfs.nodes.lock().node(result_node).is_some() {
                handler.node = result_node;
            } else {
                log::warn!(
                    "fs delegate reported created node {:?} which does not exist",
                    result_node
                );
                handler.status = OpenStatus::Error;
            }
        }
    }

    pub fn request_close(
        &self, vfs: &Vfs, _sched: &mut Scheduler, node: NodeId, handler: &mut CloseHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        let phys = Self::node_phys(vfs, node);
        self.with_storage(vfs, |storage| {
            *storage = TransactionStorage::Close(CloseStorage {
                phys_id: phys,
                result_status: CloseStatus::Error,
            });
        });

        match self.send_request(vfs, RequestOp::Close, id) {
            SendStatus::Successful => {
                vfs.transactions.lock().set(id, TransactionStatus::Waiting);
            },
            failure => {
                let status = match failure {
                    SendStatus::QueueFull => CloseStatus::Busy,
                    _ => CloseStatus::Error,
                };
                log::warn!("could not request close from fs delegate: {:?}", failure);
                handler.status = status;
                self.with_storage(vfs, |storage| {
                    if let TransactionStorage::Close(c) = storage {
                        c.result_status = status;
                    }
                });
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            },
        }
        id
    }

    pub fn finish_close(&self, vfs: &Vfs, handler: &mut CloseHandler) {
        handler.status = self.with_storage(vfs, |storage| match storage {
            TransactionStorage::Close(c) => c.result_status,
            other => {
                log::warn!("unexpected transaction storage {:?} on close finish", other);
                CloseStatus::Error
            },
        });
    }

    pub fn request_read(
        &self, vfs: &Vfs, sched: &mut Scheduler, node: NodeId, length: i64,
        buffer: Contextual<*mut u8>, pid: ProcessId, fd: FileDescriptor,
        handler: &mut ReadHandler,
    ) -> TransactionId {
        let id = match handler.repeat_transaction {
            Some(repeat) => repeat,
            None => vfs.transactions.lock().next_transaction(),
        };

        let offset = match vfs.descriptors.lock().get(pid, fd) {
            Some(content) => content.offset,
            None => {
                handler.status = ReadStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        // resolve the requester's buffer in its own space, then hand the
        // pages to the driver through a fresh range in its space
        let buffer_ptr = {
            let _space = vfs.spaces.enter(buffer.space());
            buffer.get(vfs.spaces.current())
        };
        let pages = (length.max(0) as usize + PAGE_SIZE - 1) / PAGE_SIZE + 1;
        let mapping_start = sched.process_of_mut(self.task).virtual_ranges.allocate(pages);

        let phys = Self::node_phys(vfs, node);
        self.with_storage(vfs, |storage| {
            *storage = TransactionStorage::Read(ReadStorage {
                phys_id: phys,
                offset,
                length,
                mapped_buffer: buffer_ptr,
                mapping_start,
                mapping_pages: pages,
                result_read: -1,
                result_status: ReadStatus::Error,
            });
        });

        match self.send_request(vfs, RequestOp::Read, id) {
            SendStatus::Successful => {
                vfs.transactions.lock().set(id, TransactionStatus::Waiting);
            },
            failure => {
                let status = match failure {
                    SendStatus::QueueFull => ReadStatus::Busy,
                    _ => ReadStatus::Error,
                };
                log::warn!("could not request read from fs delegate: {:?}", failure);
                handler.status = status;
                self.with_storage(vfs, |storage| {
                    if let TransactionStorage::Read(r) = storage {
                        r.result_status = status;
                        r.result_read = -1;
                    }
                });
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            },
        }
        id
    }

    pub fn finish_read(
        &self, vfs: &Vfs, sched: &mut Scheduler, pid: ProcessId, fd: FileDescriptor,
        handler: &mut ReadHandler,
    ) {
        let (count, status, mapping_start, pages) =
            self.with_storage(vfs, |storage| match storage {
                TransactionStorage::Read(r) => {
                    (r.result_read, r.result_status, r.mapping_start, r.mapping_pages)
                },
                other => {
                    log::warn!("unexpected transaction storage {:?} on read finish", other);
                    (-1, ReadStatus::Error, 0, 0)
                },
            });

        if pages > 0 {
            sched
                .process_of_mut(self.task)
                .virtual_ranges
                .free(mapping_start, pages);
        }

        handler.result = count;
        handler.status = status;
        if count > 0 {
            if let Some(content) = vfs.descriptors.lock().get_mut(pid, fd) {
                content.offset += count;
            }
        }
    }

    pub fn request_write(
        &self, vfs: &Vfs, sched: &mut Scheduler, node: NodeId, length: i64,
        buffer: Contextual<*const u8>, pid: ProcessId, fd: FileDescriptor,
        handler: &mut WriteHandler,
    ) -> TransactionId {
        let id = match handler.repeat_transaction {
            Some(repeat) => repeat,
            None => vfs.transactions.lock().next_transaction(),
        };

        let offset = match vfs.descriptors.lock().get(pid, fd) {
            Some(content) => content.offset,
            None => {
                handler.status = WriteStatus::InvalidFd;
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
                return id;
            },
        };

        let buffer_ptr = {
            let _space = vfs.spaces.enter(buffer.space());
            buffer.get(vfs.spaces.current())
        };
        let pages = (length.max(0) as usize + PAGE_SIZE - 1) / PAGE_SIZE + 1;
        let mapping_start = sched.process_of_mut(self.task).virtual_ranges.allocate(pages);

        let phys = Self::node_phys(vfs, node);
        self.with_storage(vfs, |storage| {
            *storage = TransactionStorage::Write(WriteStorage {
                phys_id: phys,
                offset,
                length,
                mapped_buffer: buffer_ptr,
                mapping_start,
                mapping_pages: pages,
                result_written: -1,
                result_status: WriteStatus::Error,
            });
        });

        match self.send_request(vfs, RequestOp::Write, id) {
            SendStatus::Successful => {
                vfs.transactions.lock().set(id, TransactionStatus::Waiting);
            },
            failure => {
                let status = match failure {
                    SendStatus::QueueFull => WriteStatus::Busy,
                    _ => WriteStatus::Error,
                };
                log::warn!("could not request write from fs delegate: {:?}", failure);
                handler.status = status;
                self.with_storage(vfs, |storage| {
                    if let TransactionStorage::Write(w) = storage {
                        w.result_status = status;
                        w.result_written = -1;
                    }
                });
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            },
        }
        id
    }

    pub fn finish_write(
        &self, vfs: &Vfs, sched: &mut Scheduler, pid: ProcessId, fd: FileDescriptor,
        handler: &mut WriteHandler,
    ) {
        let (count, status, mapping_start, pages) =
            self.with_storage(vfs, |storage| match storage {
                TransactionStorage::Write(w) => {
                    (w.result_written, w.result_status, w.mapping_start, w.mapping_pages)
                },
                other => {
                    log::warn!("unexpected transaction storage {:?} on write finish", other);
                    (-1, WriteStatus::Error, 0, 0)
                },
            });

        if pages > 0 {
            sched
                .process_of_mut(self.task)
                .virtual_ranges
                .free(mapping_start, pages);
        }

        handler.result = count;
        handler.status = status;
        if count > 0 {
            if let Some(content) = vfs.descriptors.lock().get_mut(pid, fd) {
                content.offset += count;
            }
        }
    }

    pub fn request_get_length(
        &self, vfs: &Vfs, _sched: &mut Scheduler, node: NodeId, handler: &mut GetLengthHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        let phys = Self::node_phys(vfs, node);
        self.with_storage(vfs, |storage| {
            *storage = TransactionStorage::GetLength(GetLengthStorage {
                phys_id: phys,
                result_length: -1,
                result_status: LengthStatus::Error,
            });
        });

        match self.send_request(vfs, RequestOp::GetLength, id) {
            SendStatus::Successful => {
                vfs.transactions.lock().set(id, TransactionStatus::Waiting);
            },
            failure => {
                let status = match failure {
                    SendStatus::QueueFull => LengthStatus::Busy,
                    _ => LengthStatus::Error,
                };
                log::warn!("could not request length from fs delegate: {:?}", failure);
                handler.status = status;
                self.with_storage(vfs, |storage| {
                    if let TransactionStorage::GetLength(l) = storage {
                        l.result_status = status;
                    }
                });
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            },
        }
        id
    }

    pub fn finish_get_length(&self, vfs: &Vfs, handler: &mut GetLengthHandler) {
        let (length, status) = self.with_storage(vfs, |storage| match storage {
            TransactionStorage::GetLength(l) => (l.result_length, l.result_status),
            other => {
                log::warn!("unexpected transaction storage {:?} on get-length finish", other);
                (-1, LengthStatus::Error)
            },
        });
        handler.length = length;
        handler.status = status;
    }

    pub fn request_directory_refresh(
        &self, vfs: &Vfs, _sched: &mut Scheduler, folder: NodeId,
        handler: &mut DirectoryRefreshHandler,
    ) -> TransactionId {
        let id = vfs.transactions.lock().next_transaction();

        let phys = Self::node_phys(vfs, folder);
        self.with_storage(vfs, |storage| {
            *storage = TransactionStorage::DirectoryRefresh(DirectoryRefreshStorage {
                phys_id: phys,
                parent_node_id: folder,
                result_status: DirectoryRefreshStatus::Error,
            });
        });

        match self.send_request(vfs, RequestOp::DirectoryRefresh, id) {
            SendStatus::Successful => {
                vfs.transactions.lock().set(id, TransactionStatus::Waiting);
            },
            failure => {
                let status = match failure {
                    SendStatus::QueueFull => DirectoryRefreshStatus::Busy,
                    _ => DirectoryRefreshStatus::Error,
                };
                log::warn!("could not request directory refresh from fs delegate: {:?}", failure);
                handler.status = status;
                self.with_storage(vfs, |storage| {
                    if let TransactionStorage::DirectoryRefresh(r) = storage {
                        r.result_status = status;
                    }
                });
                vfs.transactions.lock().set(id, TransactionStatus::Finished);
            },
        }
        id
    }

    pub fn finish_directory_refresh(&self, vfs: &Vfs, handler: &mut DirectoryRefreshHandler) {
        handler.status = self.with_storage(vfs, |storage| match storage {
            TransactionStorage::DirectoryRefresh(r) => r.result_status,
            other => {
                log::warn!("unexpected transaction storage {:?} on refresh finish", other);
                DirectoryRefreshStatus::Error
            },
        });
        if handler.status == DirectoryRefreshStatus::Successful {
            if let Some(node) = vfs.nodes.lock().node_mut(handler.folder) {
                node.contents_valid = true;
            }
        }
    }
}
