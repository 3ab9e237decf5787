use alloc::vec::Vec;
use hashbrown::HashMap;

use kyro_abi::fs::{FileDescriptor, NodeId, OpenFlags};
use kyro_abi::ProcessId;

/// Contents of one open descriptor
#[derive(Debug, Clone)]
pub struct DescriptorContent {
    pub id: FileDescriptor,
    pub node_id: NodeId,
    pub offset: i64,
    pub open_flags: OpenFlags,
}
impl DescriptorContent {
    /// Copies the mutable fields into `other`, as `clonefd` and process
    /// forking require
    pub fn clone_into(&self, other: &mut DescriptorContent) {
        other.node_id = self.node_id;
        other.offset = self.offset;
        other.open_flags = self.open_flags;
    }
}

/// One process's descriptor table. Descriptors 0-2 are reserved for the
/// standard streams, so allocation starts at 3.
#[derive(Debug)]
struct DescriptorTable {
    next_fd: FileDescriptor,
    descriptors: HashMap<FileDescriptor, DescriptorContent>,
}
impl DescriptorTable {
    fn new() -> Self {
        Self {
            next_fd: FileDescriptor::first(),
            descriptors: HashMap::new(),
        }
    }

    fn create(
        &mut self, node_id: NodeId, open_flags: OpenFlags, override_fd: Option<FileDescriptor>,
    ) -> FileDescriptor {
        let fd = match override_fd {
            Some(fd) => {
                if fd >= self.next_fd {
                    self.next_fd = fd.next();
                }
                fd
            },
            None => {
                let fd = self.next_fd;
                self.next_fd = fd.next();
                fd
            },
        };
        self.descriptors.insert(
            fd,
            DescriptorContent {
                id: fd,
                node_id,
                offset: 0,
                open_flags,
            },
        );
        fd
    }
}

/// All descriptor tables, keyed by process
#[derive(Debug)]
pub struct DescriptorRegistry {
    tables: HashMap<ProcessId, DescriptorTable>,
}
impl DescriptorRegistry {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Maps a node into the process's table, allocating a descriptor or
    /// reusing the supplied one
    pub fn map(
        &mut self, pid: ProcessId, node_id: NodeId, fd: Option<FileDescriptor>,
        open_flags: OpenFlags,
    ) -> FileDescriptor {
        self.tables
            .entry(pid)
            .or_insert_with(DescriptorTable::new)
            .create(node_id, open_flags, fd)
    }

    pub fn unmap(&mut self, pid: ProcessId, fd: FileDescriptor) -> Option<DescriptorContent> {
        self.tables.get_mut(&pid)?.descriptors.remove(&fd)
    }

    /// Drops the whole table, returning the descriptors it still held
    pub fn unmap_all(&mut self, pid: ProcessId) -> Vec<DescriptorContent> {
        match self.tables.remove(&pid) {
            Some(table) => table.descriptors.into_iter().map(|(_, c)| c).collect(),
            None => Vec::new(),
        }
    }

    pub fn get(&self, pid: ProcessId, fd: FileDescriptor) -> Option<DescriptorContent> {
        self.tables.get(&pid)?.descriptors.get(&fd).cloned()
    }

    pub fn get_mut(&mut self, pid: ProcessId, fd: FileDescriptor) -> Option<&mut DescriptorContent> {
        self.tables.get_mut(&pid)?.descriptors.get_mut(&fd)
    }

    /// Descriptor ids currently open in the process
    pub fn fds(&self, pid: ProcessId) -> Vec<FileDescriptor> {
        match self.tables.get(&pid) {
            Some(table) => table.descriptors.keys().copied().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> ProcessId {
        ProcessId::first()
    }

    #[test]
    fn allocation_starts_at_three() {
        let mut reg = DescriptorRegistry::new();
        let fd = reg.map(pid(), NodeId::first(), None, OpenFlags::empty());
        assert_eq!(fd.as_i64(), 3);
        let fd = reg.map(pid(), NodeId::first(), None, OpenFlags::empty());
        assert_eq!(fd.as_i64(), 4);
    }

    #[test]
    fn override_fd_advances_counter() {
        let mut reg = DescriptorRegistry::new();
        let fd = reg.map(pid(), NodeId::first(), Some(FileDescriptor::from_i64(7)), OpenFlags::empty());
        assert_eq!(fd.as_i64(), 7);
        let fd = reg.map(pid(), NodeId::first(), None, OpenFlags::empty());
        assert_eq!(fd.as_i64(), 8);
    }

    #[test]
    fn unmap_removes_exactly_once() {
        let mut reg = DescriptorRegistry::new();
        let fd = reg.map(pid(), NodeId::first(), None, OpenFlags::empty());
        assert!(reg.unmap(pid(), fd).is_some());
        assert!(reg.unmap(pid(), fd).is_none());
        assert!(reg.get(pid(), fd).is_none());
    }

    #[test]
    fn clone_into_copies_mutable_fields() {
        let mut reg = DescriptorRegistry::new();
        let src = reg.map(pid(), NodeId::first(), None, OpenFlags::APPEND);
        reg.get_mut(pid(), src).unwrap().offset = 42;

        let dst = reg.map(pid(), NodeId::first().next(), None, OpenFlags::empty());
        let source = reg.get(pid(), src).unwrap();
        source.clone_into(reg.get_mut(pid(), dst).unwrap());

        let cloned = reg.get(pid(), dst).unwrap();
        assert_eq!(cloned.offset, 42);
        assert_eq!(cloned.node_id, NodeId::first());
        assert_eq!(cloned.open_flags, OpenFlags::APPEND);
        assert_eq!(cloned.id, dst);
    }
}
