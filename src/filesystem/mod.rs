//! The virtual filesystem: a node graph overlaying several storage
//! providers through delegates, descriptor tables per process, the pipe
//! store, and the transaction engine that suspends requesters while a
//! delegate works.
//!
//! All state lives in the [`Vfs`] struct; the kernel keeps one global
//! instance, while tests build private ones. Each store sits behind its
//! own lock, and guards are dropped before calling into another
//! component.

pub mod delegate;
pub mod handler;

mod descriptors;
mod node;
mod path;
mod pipes;
mod ramdisk;
mod transaction;

pub use self::descriptors::{DescriptorContent, DescriptorRegistry};
pub use self::node::{Lookup, Node, NodeGraph};
pub use self::path::{concat_as_absolute, Path, PathBuf, PATH_MAX};
pub use self::pipes::{Pipe, PipeId, PipeStore};
pub use self::ramdisk::{Ramdisk, RamdiskEntry, RamdiskEntryKind, RamdiskId};
pub use self::transaction::TransactionStore;

use alloc::string::String;
use alloc::sync::Arc;
use spin::Mutex;

use kyro_abi::fs::{
    ClonefdStatus, FileDescriptor, NodeId, NodeKind, OpenFlags, PhysId, RegisterAsDelegateStatus,
};
use kyro_abi::{ProcessId, SecurityLevel, TaskId};

use crate::ipc::MessageBus;
use crate::memory::AddressSpaces;
use crate::multitasking::Scheduler;

use self::delegate::{Delegate, DelegateId, DelegateRegistry, MountDelegate, PipeDelegate,
                     RamdiskDelegate, TaskedDelegate};

/// The filesystem's shared state. Lock order, when more than one guard
/// must be held: delegates, descriptors, nodes, pipes, ramdisk,
/// transactions.
#[derive(Debug)]
pub struct Vfs {
    pub spaces: Arc<AddressSpaces>,
    pub bus: Arc<Mutex<MessageBus>>,
    pub nodes: Mutex<NodeGraph>,
    pub descriptors: Mutex<DescriptorRegistry>,
    pub pipes: Mutex<PipeStore>,
    pub transactions: Mutex<TransactionStore>,
    pub delegates: Mutex<DelegateRegistry>,
    pub ramdisk: Mutex<Ramdisk>,
    mount_root: NodeId,
    pipe_root: NodeId,
}

impl Vfs {
    /// Creates the filesystem with its initial resources: the root (served
    /// by the ramdisk delegate), `/mount`, and the built-in `ramdisk` and
    /// `pipe` mountpoints under it.
    pub fn new(spaces: Arc<AddressSpaces>, bus: Arc<Mutex<MessageBus>>) -> Self {
        let mut nodes = NodeGraph::new();
        let mut delegates = DelegateRegistry::new();

        let ramdisk_delegate = delegates.register(Delegate::Ramdisk(RamdiskDelegate));
        let mount_delegate = delegates.register(Delegate::Mount(MountDelegate));
        let pipe_delegate = delegates.register(Delegate::Pipe(PipeDelegate));

        let root = nodes.root();
        nodes.node_mut(root).expect("root exists").delegate = Some(ramdisk_delegate);

        let mount_root = nodes.create_node(NodeKind::Mountpoint, String::from("mount"));
        nodes.node_mut(mount_root).expect("fresh node").delegate = Some(mount_delegate);
        nodes.add_child(root, mount_root);

        let ramdisk_root = nodes.create_node(NodeKind::Mountpoint, String::from("ramdisk"));
        nodes.node_mut(ramdisk_root).expect("fresh node").delegate = Some(ramdisk_delegate);
        nodes.add_child(mount_root, ramdisk_root);

        let pipe_root = nodes.create_node(NodeKind::Mountpoint, String::from("pipe"));
        nodes.node_mut(pipe_root).expect("fresh node").delegate = Some(pipe_delegate);
        nodes.add_child(mount_root, pipe_root);

        log::info!("filesystem: initial resources created");

        Self {
            spaces,
            bus,
            nodes: Mutex::new(nodes),
            descriptors: Mutex::new(DescriptorRegistry::new()),
            pipes: Mutex::new(PipeStore::new()),
            transactions: Mutex::new(TransactionStore::new()),
            delegates: Mutex::new(delegates),
            ramdisk: Mutex::new(Ramdisk::new()),
            mount_root,
            pipe_root,
        }
    }

    pub fn mount_root(&self) -> NodeId {
        self.mount_root
    }

    /// Resolves a descriptor to its node and contents
    pub fn node_for_descriptor(
        &self, pid: ProcessId, fd: FileDescriptor,
    ) -> Option<(NodeId, DescriptorContent)> {
        let content = self.descriptors.lock().get(pid, fd)?;
        let node = content.node_id;
        self.nodes.lock().node(node)?;
        Some((node, content))
    }

    /// Opens a descriptor for `node` in the given process. Pipe nodes
    /// additionally take a reference on their pipe.
    pub fn map_file(
        &self, pid: ProcessId, node: NodeId, open_flags: OpenFlags, fd: Option<FileDescriptor>,
    ) -> FileDescriptor {
        let (kind, phys) = match self.nodes.lock().node(node) {
            Some(n) => (n.kind, n.phys_id),
            None => return FileDescriptor::INVALID,
        };

        match kind {
            NodeKind::File => self.descriptors.lock().map(pid, node, fd, open_flags),
            NodeKind::Pipe => {
                if let Some(phys) = phys {
                    self.pipes.lock().add_reference(PipeId::from(phys), pid);
                }
                self.descriptors.lock().map(pid, node, fd, open_flags)
            },
            other => {
                log::warn!("tried to map a node of non-file type {:?}", other);
                FileDescriptor::INVALID
            },
        }
    }

    /// Removes a descriptor. Returns false when it was not mapped.
    pub fn unmap_file(&self, pid: ProcessId, fd: FileDescriptor) -> bool {
        self.descriptors.lock().unmap(pid, fd).is_some()
    }

    /// Synchronous close used by `clonefd` and process exit: releases the
    /// pipe reference, skips delegates that would need to block, and
    /// unmaps the descriptor.
    fn close_inline(&self, pid: ProcessId, fd: FileDescriptor) {
        let (node, _) = match self.node_for_descriptor(pid, fd) {
            Some(found) => found,
            None => return,
        };

        let (kind, phys) = match self.nodes.lock().node(node) {
            Some(n) => (n.kind, n.phys_id),
            None => return,
        };
        if kind == NodeKind::Pipe {
            if let Some(phys) = phys {
                let pipe_id = PipeId::from(phys);
                if self.pipes.lock().remove_reference(pipe_id, pid) {
                    self.nodes.lock().remove_node(node);
                    log::trace!("pipe node {:?} removed with pipe {:?}", node, pipe_id);
                }
            }
        }

        self.descriptors.lock().unmap(pid, fd);
    }

    /// Creates a pipe with a node under `/mount/pipe` and two descriptors
    /// on it for the calling process
    pub fn pipe(&self, pid: ProcessId, blocking: bool) -> (FileDescriptor, FileDescriptor) {
        let pipe_id = self.pipes.lock().create(blocking);

        let node = {
            let mut nodes = self.nodes.lock();
            let node = nodes.create_node(NodeKind::Pipe, format!("p{}", pipe_id.as_u64()));
            nodes.node_mut(node).expect("fresh node").phys_id = Some(PhysId::from(pipe_id));
            nodes.add_child(self.pipe_root, node);
            node
        };

        let write_fd = self.map_file(pid, node, OpenFlags::empty(), None);
        let read_fd = self.map_file(pid, node, OpenFlags::empty(), None);
        (write_fd, read_fd)
    }

    /// Opens a new descriptor in the target process on the source
    /// descriptor's node, copying offset and flags. An existing target
    /// descriptor is closed first.
    pub fn clonefd(
        &self, source_fd: FileDescriptor, source_pid: ProcessId,
        target_fd: Option<FileDescriptor>, target_pid: ProcessId,
    ) -> (FileDescriptor, ClonefdStatus) {
        let (source_node, source_content) = match self.node_for_descriptor(source_pid, source_fd) {
            Some(found) => found,
            None => return (FileDescriptor::INVALID, ClonefdStatus::InvalidSourceFd),
        };

        if let Some(target_fd) = target_fd {
            if self.node_for_descriptor(target_pid, target_fd).is_some() {
                self.close_inline(target_pid, target_fd);
            }
        }

        let created = self.map_file(target_pid, source_node, OpenFlags::empty(), target_fd);
        if !created.is_valid() {
            return (FileDescriptor::INVALID, ClonefdStatus::Error);
        }

        let mut descriptors = self.descriptors.lock();
        match descriptors.get_mut(target_pid, created) {
            Some(content) => {
                source_content.clone_into(content);
                (created, ClonefdStatus::Successful)
            },
            None => (FileDescriptor::INVALID, ClonefdStatus::Error),
        }
    }

    /// Registers a user-space driver task as the delegate of a new
    /// mountpoint under `/mount`. Returns the mountpoint node id and the
    /// address of the transaction storage in the driver's space.
    pub fn create_delegate(
        &self, sched: &mut Scheduler, task: TaskId, name: &str, phys_mountpoint_id: PhysId,
    ) -> Result<(NodeId, usize), RegisterAsDelegateStatus> {
        if sched.process_of(task).security_level > SecurityLevel::Driver {
            return Err(RegisterAsDelegateStatus::FailedNotPermitted);
        }
        if self.nodes.lock().find_child(self.mount_root, name).is_some() {
            return Err(RegisterAsDelegateStatus::FailedExisting);
        }
        if name.is_empty() {
            log::warn!("failed to create delegate: empty mountpoint name");
            return Err(RegisterAsDelegateStatus::FailedDelegateCreation);
        }

        let (delegate, storage_address) = TaskedDelegate::prepare(self, sched, task);
        self.bus.lock().ensure_queue(task);
        let delegate_id = self.delegates.lock().register(Delegate::Tasked(delegate));

        let mountpoint = {
            let mut nodes = self.nodes.lock();
            let node = nodes.create_node(NodeKind::Mountpoint, String::from(name));
            let n = nodes.node_mut(node).expect("fresh node");
            n.delegate = Some(delegate_id);
            n.phys_id = Some(phys_mountpoint_id);
            nodes.add_child(self.mount_root, node);
            node
        };

        log::info!(
            "mountpoint '{}' (node {:?}) is handled by delegate task {}",
            name,
            mountpoint,
            task
        );
        Ok((mountpoint, storage_address))
    }

    /// Process exit: every descriptor is closed and released; failures
    /// are logged but never block the exit
    pub fn process_closed(&self, pid: ProcessId) {
        let fds = self.descriptors.lock().fds(pid);
        for fd in fds {
            self.close_inline(pid, fd);
            log::debug!("closed fd {:?} when exiting process {}", fd, pid);
        }
        self.descriptors.lock().unmap_all(pid);
    }

    /// Process fork: every descriptor is cloned into the fork keeping its
    /// descriptor value
    pub fn process_forked(&self, source: ProcessId, fork: ProcessId) {
        let fds = self.descriptors.lock().fds(source);
        for fd in fds {
            let (_, status) = self.clonefd(fd, source, Some(fd), fork);
            log::debug!(
                "forking cloned fd {:?} from process {} -> {} with status {:?}",
                fd,
                source,
                fork,
                status
            );
        }
    }

    /// Nearest delegate for a node, walking ancestors
    pub fn delegate_for(&self, node: NodeId) -> Option<DelegateId> {
        self.nodes.lock().delegate_for(node)
    }
}
