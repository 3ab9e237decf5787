use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

use kyro_abi::fs::PhysId;

/// Initial heap buffer for entries created without contents
const INITIAL_BUFFER: usize = 32;

/// Ramdisk-private entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RamdiskId(u64);
impl RamdiskId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}
impl From<RamdiskId> for PhysId {
    fn from(id: RamdiskId) -> Self {
        PhysId::from_u64(id.as_u64())
    }
}
impl From<PhysId> for RamdiskId {
    fn from(id: PhysId) -> Self {
        Self(id.as_u64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamdiskEntryKind {
    File,
    Folder,
}

/// Where an entry's bytes live. Archive data is the read-only boot image;
/// the first write migrates it to a growable heap buffer.
#[derive(Debug)]
enum EntryData {
    None,
    Archive(Vec<u8>),
    Heap { buf: Vec<u8>, len: usize },
}

#[derive(Debug)]
pub struct RamdiskEntry {
    pub id: RamdiskId,
    pub parent: Option<RamdiskId>,
    pub name: String,
    pub kind: RamdiskEntryKind,
    children: Vec<RamdiskId>,
    data: EntryData,
}
impl RamdiskEntry {
    pub fn is_file(&self) -> bool {
        self.kind == RamdiskEntryKind::File
    }

    pub fn len(&self) -> usize {
        match &self.data {
            EntryData::None => 0,
            EntryData::Archive(data) => data.len(),
            EntryData::Heap { len, .. } => *len,
        }
    }

    /// Allocated buffer size; equals the length while on the archive
    pub fn capacity(&self) -> usize {
        match &self.data {
            EntryData::None => 0,
            EntryData::Archive(data) => data.len(),
            EntryData::Heap { buf, .. } => buf.len(),
        }
    }

    pub fn on_archive(&self) -> bool {
        matches!(self.data, EntryData::Archive(_))
    }

    /// Drops the contents. Applies only once the data left the read-only
    /// archive.
    pub fn truncate(&mut self) {
        if let EntryData::Heap { .. } = self.data {
            self.data = EntryData::None;
        }
    }

    /// Copies bytes starting at `offset` into `buf`, clamped to the entry
    /// length. Returns the number of bytes copied.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let len = self.len();
        if offset >= len {
            return 0;
        }
        let count = buf.len().min(len - offset);
        let src = match &self.data {
            EntryData::None => return 0,
            EntryData::Archive(data) => &data[offset..offset + count],
            EntryData::Heap { buf, .. } => &buf[offset..offset + count],
        };
        buf[..count].copy_from_slice(src);
        count
    }

    /// Writes `data` at `offset`, migrating archive-backed contents to the
    /// heap first and growing the buffer by a factor of 1.2 until the
    /// write fits. The entry length becomes `offset + data.len()`.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) {
        match &mut self.data {
            EntryData::Archive(old) => {
                let capacity = old.len() * 6 / 5;
                let mut buf = vec![0u8; capacity];
                buf[..old.len()].copy_from_slice(old);
                let len = old.len();
                self.data = EntryData::Heap { buf, len };
            },
            EntryData::None => {
                self.data = EntryData::Heap {
                    buf: vec![0u8; INITIAL_BUFFER],
                    len: 0,
                };
            },
            EntryData::Heap { .. } => {},
        }

        if let EntryData::Heap { buf, len } = &mut self.data {
            while buf.len() < offset + data.len() {
                let grown = (buf.len() * 6 / 5).max(buf.len() + 1);
                buf.resize(grown, 0);
            }
            buf[offset..offset + data.len()].copy_from_slice(data);
            *len = offset + data.len();
        }
    }
}

/// The in-memory boot archive backing the ramdisk delegate. The container
/// format is the boot loader's business; it populates entries through the
/// `add_*` builders below.
#[derive(Debug)]
pub struct Ramdisk {
    entries: HashMap<RamdiskId, RamdiskEntry>,
    next_id: RamdiskId,
    root: RamdiskId,
}
impl Ramdisk {
    pub fn new() -> Self {
        let mut ramdisk = Self {
            entries: HashMap::new(),
            next_id: RamdiskId(0),
            root: RamdiskId(0),
        };
        let root = ramdisk.insert(None, String::new(), RamdiskEntryKind::Folder, EntryData::None);
        ramdisk.root = root;
        ramdisk
    }

    fn insert(
        &mut self, parent: Option<RamdiskId>, name: String, kind: RamdiskEntryKind,
        data: EntryData,
    ) -> RamdiskId {
        let id = self.next_id;
        self.next_id = RamdiskId(id.0 + 1);
        self.entries.insert(
            id,
            RamdiskEntry {
                id,
                parent,
                name,
                kind,
                children: Vec::new(),
                data,
            },
        );
        if let Some(parent) = parent {
            self.entries
                .get_mut(&parent)
                .expect("ramdisk: no such parent")
                .children
                .push(id);
        }
        id
    }

    pub fn root(&self) -> RamdiskId {
        self.root
    }

    pub fn entry(&self, id: RamdiskId) -> Option<&RamdiskEntry> {
        self.entries.get(&id)
    }

    pub fn entry_mut(&mut self, id: RamdiskId) -> Option<&mut RamdiskEntry> {
        self.entries.get_mut(&id)
    }

    pub fn find_child(&self, parent: RamdiskId, name: &str) -> Option<RamdiskId> {
        let parent = self.entries.get(&parent)?;
        parent
            .children
            .iter()
            .copied()
            .find(|id| self.entries.get(id).map(|e| e.name == name).unwrap_or(false))
    }

    /// The child at `position` in archive order
    pub fn child_at(&self, parent: RamdiskId, position: usize) -> Option<RamdiskId> {
        self.entries.get(&parent)?.children.get(position).copied()
    }

    /// Creates an empty file entry, used by open-with-create
    pub fn create_child(&mut self, parent: RamdiskId, name: &str) -> RamdiskId {
        self.insert(
            Some(parent),
            String::from(name),
            RamdiskEntryKind::File,
            EntryData::None,
        )
    }

    /// Loader-facing: adds a folder entry
    pub fn add_folder(&mut self, parent: RamdiskId, name: &str) -> RamdiskId {
        self.insert(
            Some(parent),
            String::from(name),
            RamdiskEntryKind::Folder,
            EntryData::None,
        )
    }

    /// Loader-facing: adds a file whose contents stay on the read-only
    /// archive until first written
    pub fn add_file(&mut self, parent: RamdiskId, name: &str, content: Vec<u8>) -> RamdiskId {
        self.insert(
            Some(parent),
            String::from(name),
            RamdiskEntryKind::File,
            EntryData::Archive(content),
        )
    }
}
