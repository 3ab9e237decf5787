use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

pub use kyro_abi::fs::{NodeId, NodeKind, PhysId};

use super::delegate::DelegateId;
use super::path::{Path, PATH_MAX};

/// A node in the virtual filesystem graph. Somewhat analogous to a Unix
/// inode, but purely in-memory: the delegate-private `phys_id` points at
/// whatever entity backs the node.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Component name, unique among siblings. Empty for the root.
    pub name: String,
    pub parent: Option<NodeId>,
    /// Child ids in insertion order
    pub children: Vec<NodeId>,
    /// Delegate serving this subtree; when `None`, the nearest ancestor's
    /// delegate applies
    pub delegate: Option<DelegateId>,
    pub phys_id: Option<PhysId>,
    /// For folders: all children are known and up to date
    pub contents_valid: bool,
}

/// Result of a path walk
#[derive(Debug)]
pub struct Lookup {
    /// Deepest node that resolved as a parent
    pub parent: NodeId,
    /// The fully resolved node, when the whole path exists
    pub node: Option<NodeId>,
    /// The component that stopped the walk, or the final component
    pub last_name: String,
}

/// The node table plus the root. A single graph-wide lock guards
/// insertion and removal.
#[derive(Debug)]
pub struct NodeGraph {
    nodes: HashMap<NodeId, Node>,
    next_id: NodeId,
    root: NodeId,
}
impl NodeGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            next_id: NodeId::first(),
            root: NodeId::ZERO,
        };
        graph.root = graph.create_node(NodeKind::Root, String::new());
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Creates a detached node with a fresh id
    pub fn create_node(&mut self, kind: NodeKind, name: String) -> NodeId {
        let id = self.next_id;
        self.next_id = id.next();
        self.nodes.insert(
            id,
            Node {
                id,
                kind,
                name,
                parent: None,
                children: Vec::new(),
                delegate: None,
                phys_id: None,
                contents_valid: false,
            },
        );
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Attaches `child` under `parent`, at the end of the sibling list
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes
            .get_mut(&child)
            .expect("add_child: no such child")
            .parent = Some(parent);
        self.nodes
            .get_mut(&parent)
            .expect("add_child: no such parent")
            .children
            .push(child);
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let parent = self.nodes.get(&parent)?;
        parent
            .children
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).map(|n| n.name == name).unwrap_or(false))
    }

    /// Detaches and removes a node. Used for pipe nodes once their pipe's
    /// refcount reaches zero.
    pub fn remove_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            if let Some(parent) = node.parent {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.retain(|c| *c != id);
                }
            }
        }
    }

    /// Nearest delegate, walking from `node` towards the root
    pub fn delegate_for(&self, node: NodeId) -> Option<DelegateId> {
        let mut current = Some(node);
        while let Some(id) = current {
            let n = self.nodes.get(&id)?;
            if let Some(delegate) = n.delegate {
                return Some(delegate);
            }
            current = n.parent;
        }
        None
    }

    /// Reconstructs the absolute path of a node by walking parent links
    pub fn real_path(&self, node: NodeId) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let mut total = 0;
        let mut current = self.nodes.get(&node);
        while let Some(n) = current {
            if n.kind == NodeKind::Root {
                break;
            }
            if n.name.is_empty() {
                log::warn!("tried to build the path of nameless node {:?}", n.id);
                break;
            }
            total += n.name.len() + 1;
            if total > PATH_MAX {
                log::warn!("path of node {:?} exceeds PATH_MAX", node);
                break;
            }
            parts.push(&n.name);
            current = n.parent.and_then(|p| self.nodes.get(&p));
        }

        if parts.is_empty() {
            return String::from("/");
        }
        let mut out = String::with_capacity(total);
        for part in parts.iter().rev() {
            out.push('/');
            out.push_str(part);
        }
        out
    }

    /// Walks an absolute path component by component. `.` and `..` are
    /// interpreted here and never exist as child entries. The walk stops
    /// at the first missing component; the deepest resolved node and the
    /// offending component name are reported so a delegate can discover
    /// the next hop.
    pub fn find_existing(&self, absolute_path: &Path<'_>) -> Lookup {
        let mut parent = self.root;
        let mut current = self.root;
        let mut last_name = String::new();
        let mut found = true;

        for component in absolute_path.components() {
            parent = current;
            last_name.clear();
            last_name.push_str(component);

            if component == ".." {
                if let Some(grandparent) = self.nodes.get(&parent).and_then(|n| n.parent) {
                    current = grandparent;
                }
            } else if component == "." {
                // stays on the current node
            } else {
                match self.find_child(parent, component) {
                    Some(child) => current = child,
                    None => {
                        found = false;
                        break;
                    },
                }
            }
        }

        Lookup {
            parent,
            node: if found { Some(current) } else { None },
            last_name,
        }
    }
}
