//! Delegates implement the storage operations behind a subtree of the
//! node graph.
//!
//! Every delegate exposes the same six request/finish pairs. A `request_*`
//! call allocates (or, for repeats, reuses) a transaction id, performs or
//! dispatches the work, records the initial transaction status and returns
//! the id. The matching `finish_*` runs once the waiter observed
//! `Finished` and copies the delegate-private results into the handler,
//! switching address spaces where necessary.

mod mount;
mod pipe;
mod ramdisk;
mod tasked;

pub use self::mount::MountDelegate;
pub use self::pipe::PipeDelegate;
pub use self::ramdisk::RamdiskDelegate;
pub use self::tasked::TaskedDelegate;

use alloc::sync::Arc;
use hashbrown::HashMap;

use kyro_abi::fs::{FileDescriptor, NodeId, OpenFlags, TransactionId};
use kyro_abi::ProcessId;

use crate::memory::Contextual;
use crate::multitasking::Scheduler;

use super::handler::{
    CloseHandler, DirectoryRefreshHandler, DiscoveryHandler, GetLengthHandler, OpenHandler,
    ReadHandler, WriteHandler,
};
use super::Vfs;

/// Identifier of a registered delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DelegateId(u64);
impl DelegateId {
    pub const fn first() -> Self {
        Self(0)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Registry of live delegates. Delegates are immutable once registered
/// and never destroyed, so lookups hand out shared references.
#[derive(Debug)]
pub struct DelegateRegistry {
    delegates: HashMap<DelegateId, Arc<Delegate>>,
    next_id: DelegateId,
}
impl DelegateRegistry {
    pub fn new() -> Self {
        Self {
            delegates: HashMap::new(),
            next_id: DelegateId::first(),
        }
    }

    pub fn register(&mut self, delegate: Delegate) -> DelegateId {
        let id = self.next_id;
        self.next_id = id.next();
        self.delegates.insert(id, Arc::new(delegate));
        id
    }

    pub fn get(&self, id: DelegateId) -> Option<Arc<Delegate>> {
        self.delegates.get(&id).cloned()
    }
}

/// The concrete delegates. The abstract surface carries no state of its
/// own, so a variant set with a shared dispatch table replaces the
/// virtual hierarchy.
#[derive(Debug)]
pub enum Delegate {
    Ramdisk(RamdiskDelegate),
    Pipe(PipeDelegate),
    Tasked(TaskedDelegate),
    Mount(MountDelegate),
}

impl Delegate {
    pub fn request_discovery(
        &self, vfs: &Vfs, sched: &mut Scheduler, parent: NodeId, name: &str,
        handler: &mut DiscoveryHandler,
    ) -> TransactionId {
        match self {
            Delegate::Ramdisk(d) => d.request_discovery(vfs, parent, name, handler),
            Delegate::Pipe(d) => d.request_discovery(vfs, handler),
            Delegate::Tasked(d) => d.request_discovery(vfs, sched, parent, name, handler),
            Delegate::Mount(d) => d.request_discovery(vfs, handler),
        }
    }

    pub fn finish_discovery(&self, vfs: &Vfs, handler: &mut DiscoveryHandler) {
        if let Delegate::Tasked(d) = self {
            d.finish_discovery(vfs, handler);
        }
        // synchronous delegates complete their work at request time
    }

    pub fn request_open(
        &self, vfs: &Vfs, sched: &mut Scheduler, node: NodeId, name: &str, flags: OpenFlags,
        handler: &mut OpenHandler,
    ) -> TransactionId {
        match self {
            Delegate::Ramdisk(d) => d.request_open(vfs, node, name, flags, handler),
            Delegate::Pipe(d) => d.request_open(vfs, handler),
            Delegate::Tasked(d) => d.request_open(vfs, sched, node, name, flags, handler),
            Delegate::Mount(d) => d.request_open(vfs, handler),
        }
    }

    pub fn finish_open(&self, vfs: &Vfs, handler: &mut OpenHandler) {
        if let Delegate::Tasked(d) = self {
            d.finish_open(vfs, handler);
        }
    }

    pub fn request_close(
        &self, vfs: &Vfs, sched: &mut Scheduler, pid: ProcessId, node: NodeId,
        handler: &mut CloseHandler,
    ) -> TransactionId {
        match self {
            Delegate::Ramdisk(d) => d.request_close(vfs, handler),
            Delegate::Pipe(d) => d.request_close(vfs, pid, node, handler),
            Delegate::Tasked(d) => d.request_close(vfs, sched, node, handler),
            Delegate::Mount(d) => d.request_close(vfs, handler),
        }
    }

    pub fn finish_close(&self, vfs: &Vfs, handler: &mut CloseHandler) {
        if let Delegate::Tasked(d) = self {
            d.finish_close(vfs, handler);
        }
    }

    pub fn request_read(
        &self, vfs: &Vfs, sched: &mut Scheduler, node: NodeId, length: i64,
        buffer: Contextual<*mut u8>, pid: ProcessId, fd: FileDescriptor,
        handler: &mut ReadHandler,
    ) -> TransactionId {
        match self {
            Delegate::Ramdisk(d) => d.request_read(vfs, node, length, buffer, pid, fd, handler),
            Delegate::Pipe(d) => d.request_read(vfs, node, length, buffer, pid, handler),
            Delegate::Tasked(d) => {
                d.request_read(vfs, sched, node, length, buffer, pid, fd, handler)
            },
            Delegate::Mount(d) => d.request_read(vfs, handler),
        }
    }

    pub fn finish_read(
        &self, vfs: &Vfs, sched: &mut Scheduler, pid: ProcessId, fd: FileDescriptor,
        handler: &mut ReadHandler,
    ) {
        if let Delegate::Tasked(d) = self {
            d.finish_read(vfs, sched, pid, fd, handler);
        }
    }

    pub fn request_write(
        &self, vfs: &Vfs, sched: &mut Scheduler, node: NodeId, length: i64,
        buffer: Contextual<*const u8>, pid: ProcessId, fd: FileDescriptor,
        handler: &mut WriteHandler,
    ) -> TransactionId {
        match self {
            Delegate::Ramdisk(d) => d.request_write(vfs, node, length, buffer, pid, fd, handler),
            Delegate::Pipe(d) => d.request_write(vfs, node, length, buffer, handler),
            Delegate::Tasked(d) => {
                d.request_write(vfs, sched, node, length, buffer, pid, fd, handler)
            },
            Delegate::Mount(d) => d.request_write(vfs, handler),
        }
    }

    pub fn finish_write(
        &self, vfs: &Vfs, sched: &mut Scheduler, pid: ProcessId, fd: FileDescriptor,
        handler: &mut WriteHandler,
    ) {
        if let Delegate::Tasked(d) = self {
            d.finish_write(vfs, sched, pid, fd, handler);
        }
    }

    pub fn request_get_length(
        &self, vfs: &Vfs, sched: &mut Scheduler, node: NodeId, handler: &mut GetLengthHandler,
    ) -> TransactionId {
        match self {
            Delegate::Ramdisk(d) => d.request_get_length(vfs, node, handler),
            Delegate::Pipe(d) => d.request_get_length(vfs, node, handler),
            Delegate::Tasked(d) => d.request_get_length(vfs, sched, node, handler),
            Delegate::Mount(d) => d.request_get_length(vfs, handler),
        }
    }

    pub fn finish_get_length(&self, vfs: &Vfs, handler: &mut GetLengthHandler) {
        if let Delegate::Tasked(d) = self {
            d.finish_get_length(vfs, handler);
        }
    }

    pub fn request_directory_refresh(
        &self, vfs: &Vfs, sched: &mut Scheduler, folder: NodeId,
        handler: &mut DirectoryRefreshHandler,
    ) -> TransactionId {
        match self {
            Delegate::Ramdisk(d) => d.request_directory_refresh(vfs, folder, handler),
            Delegate::Pipe(d) => d.request_directory_refresh(vfs, handler),
            Delegate::Tasked(d) => d.request_directory_refresh(vfs, sched, folder, handler),
            Delegate::Mount(d) => d.request_directory_refresh(vfs, folder, handler),
        }
    }

    pub fn finish_directory_refresh(&self, vfs: &Vfs, handler: &mut DirectoryRefreshHandler) {
        if let Delegate::Tasked(d) = self {
            d.finish_directory_refresh(vfs, handler);
        }
    }
}
