use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use spin::Mutex;

use kyro_abi::fs::{PhysId, PIPE_DEFAULT_CAPACITY};
use kyro_abi::ProcessId;

/// Pipe-store private identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PipeId(u64);
impl PipeId {
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
impl From<PipeId> for PhysId {
    fn from(id: PipeId) -> Self {
        PhysId::from_u64(id.as_u64())
    }
}
impl From<PhysId> for PipeId {
    fn from(id: PhysId) -> Self {
        Self(id.as_u64())
    }
}

/// A fixed-capacity byte ring with process reference counting. The
/// reference list drives the pipe's lifetime: one entry per mapped
/// descriptor, and the store frees the pipe when the list empties.
#[derive(Debug)]
pub struct Pipe {
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    size: usize,
    capacity: usize,
    refs: Vec<ProcessId>,
    blocking: bool,
}
impl Pipe {
    fn new(capacity: usize, blocking: bool) -> Self {
        Self {
            buffer: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
            size: 0,
            capacity,
            refs: Vec::new(),
            blocking,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn add_reference(&mut self, pid: ProcessId) {
        self.refs.push(pid);
    }

    /// Drops one reference held by `pid`, returning true when none remain
    pub fn remove_reference(&mut self, pid: ProcessId) -> bool {
        if let Some(i) = self.refs.iter().position(|r| *r == pid) {
            self.refs.remove(i);
        }
        self.refs.is_empty()
    }

    pub fn has_reference_from_other_process(&self, pid: ProcessId) -> bool {
        self.refs.iter().any(|r| *r != pid)
    }

    /// Copies up to `buf.len()` buffered bytes out, wrapping around the
    /// ring. Returns the number of bytes copied.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.size);
        for slot in buf[..count].iter_mut() {
            *slot = self.buffer[self.read_pos];
            self.read_pos = (self.read_pos + 1) % self.capacity;
        }
        self.size -= count;
        count
    }

    /// Copies bytes in until the ring is full. Returns the number of
    /// bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.capacity - self.size);
        for &byte in &data[..count] {
            self.buffer[self.write_pos] = byte;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
        self.size += count;
        count
    }
}

/// Allocator and owner of all pipes. Each pipe sits behind its own lock
/// so buffer access is serialized per pipe, not store-wide.
#[derive(Debug)]
pub struct PipeStore {
    pipes: HashMap<PipeId, Arc<Mutex<Pipe>>>,
    next_id: PipeId,
}
impl PipeStore {
    pub fn new() -> Self {
        Self {
            pipes: HashMap::new(),
            next_id: PipeId::first(),
        }
    }

    pub fn create(&mut self, blocking: bool) -> PipeId {
        let id = self.next_id;
        self.next_id = id.next();
        self.pipes.insert(
            id,
            Arc::new(Mutex::new(Pipe::new(PIPE_DEFAULT_CAPACITY, blocking))),
        );
        id
    }

    pub fn get(&self, id: PipeId) -> Option<Arc<Mutex<Pipe>>> {
        self.pipes.get(&id).cloned()
    }

    pub fn add_reference(&self, id: PipeId, pid: ProcessId) {
        if let Some(pipe) = self.pipes.get(&id) {
            pipe.lock().add_reference(pid);
        }
    }

    /// Removes one of `pid`'s references; frees the pipe when no process
    /// references it anymore. Returns true if the pipe was freed.
    pub fn remove_reference(&mut self, id: PipeId, pid: ProcessId) -> bool {
        let freed = match self.pipes.get(&id) {
            Some(pipe) => pipe.lock().remove_reference(pid),
            None => false,
        };
        if freed {
            self.pipes.remove(&id);
            log::debug!("removing non-referenced pipe {:?}", id);
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_with_wraparound() {
        let mut pipe = Pipe::new(4, true);
        assert_eq!(pipe.write(b"abc"), 3);
        let mut buf = [0u8; 2];
        assert_eq!(pipe.read(&mut buf), 2);
        assert_eq!(&buf, b"ab");
        // wraps around the 4-byte ring
        assert_eq!(pipe.write(b"de"), 2);
        let mut buf = [0u8; 4];
        assert_eq!(pipe.read(&mut buf), 3);
        assert_eq!(&buf[..3], b"cde");
        assert_eq!(pipe.size(), 0);
    }

    #[test]
    fn write_is_bounded_by_capacity() {
        let mut pipe = Pipe::new(4, true);
        assert_eq!(pipe.write(b"abcdef"), 4);
        assert_eq!(pipe.size(), 4);
        assert!(pipe.size() <= pipe.capacity());
    }

    #[test]
    fn references_drive_lifetime() {
        let mut store = PipeStore::new();
        let id = store.create(true);
        let p1 = ProcessId::first();
        let p2 = p1.next();
        store.add_reference(id, p1);
        store.add_reference(id, p2);

        assert!(!store.remove_reference(id, p1));
        assert!(store.get(id).is_some());
        assert!(store.remove_reference(id, p2));
        assert!(store.get(id).is_none());
    }

    #[test]
    fn foreign_reference_check() {
        let mut pipe = Pipe::new(4, true);
        let p1 = ProcessId::first();
        let p2 = p1.next();
        pipe.add_reference(p1);
        pipe.add_reference(p1);
        assert!(!pipe.has_reference_from_other_process(p1));
        pipe.add_reference(p2);
        assert!(pipe.has_reference_from_other_process(p1));
    }
}
