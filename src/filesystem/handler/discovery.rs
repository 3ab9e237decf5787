use alloc::boxed::Box;
use alloc::string::String;

use kyro_abi::fs::{
    DiscoveryStatus, FileDescriptor, LengthStatus, NodeId, NodeKind, OpenDirectoryStatus,
    OpenStatus, SetWorkingDirectoryStatus,
};
use kyro_abi::syscall::{
    FsLengthData, FsOpenData, FsOpenDirectoryData, SetWorkingDirectoryData,
};
use kyro_abi::{ProcessId, TaskId};

use crate::memory::Contextual;
use crate::multitasking::{Scheduler, TransactionWaiter};

use super::super::delegate::DelegateId;
use super::super::Vfs;
use super::{
    delegate_arc, start_transaction, FinishStatus, GetLengthHandler, Handler, LengthAfterwork,
    OpenHandler, StartStatus,
};
use crate::filesystem::path::PathBuf;

/// Discovers (and has delegates create virtual nodes for) an absolute
/// path.
///
/// All path elements are looked up as virtual nodes top-down. When every
/// element already exists the walk concludes immediately; otherwise the
/// responsible delegate is asked to discover the next missing component
/// and the requester sleeps on the transaction. The waiter drives the
/// walk until the path is resolved or a component is missing, then the
/// follow-up action decides what that means.
#[derive(Debug)]
pub struct DiscoveryHandler {
    pub absolute_path: PathBuf,
    /// Reserved: the walk never enters symlinks in this iteration
    pub follow_symlinks: bool,
    pub status: DiscoveryStatus,
    pub node: Option<NodeId>,
    /// Deepest node that existed, so open-with-create knows where to
    /// create the missing leaf
    pub last_discovered_parent: Option<NodeId>,
    /// The component that stopped the walk
    pub last_name: String,
    pub all_nodes_discovered: bool,
    pub action: DiscoveryAction,
}

/// What to do once the path walk concluded
#[derive(Debug)]
pub enum DiscoveryAction {
    SetCwd {
        /// Explicit target process for privileged callers, the requester
        /// otherwise
        target: Option<ProcessId>,
        data: Contextual<*mut SetWorkingDirectoryData>,
    },
    Open {
        data: Contextual<*mut FsOpenData>,
    },
    OpenDirectory {
        data: Contextual<*mut FsOpenDirectoryData>,
    },
    GetLength {
        data: Contextual<*mut FsLengthData>,
    },
}

impl DiscoveryHandler {
    pub fn new(absolute_path: PathBuf, follow_symlinks: bool, action: DiscoveryAction) -> Self {
        Self {
            absolute_path,
            follow_symlinks,
            status: DiscoveryStatus::Error,
            node: None,
            last_discovered_parent: None,
            last_name: String::new(),
            all_nodes_discovered: false,
            action,
        }
    }
}

pub(super) fn start(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
) -> StartStatus {
    let h = match handler.as_mut() {
        Handler::Discovery(h) => h,
        _ => unreachable!("discovery start on non-discovery handler"),
    };

    let lookup = vfs.nodes.lock().find_existing(&h.absolute_path.as_path());

    // the whole path resolves: conclude and run the follow-up once
    if let Some(node) = lookup.node {
        h.status = DiscoveryStatus::Successful;
        h.node = Some(node);
        h.last_name = lookup.last_name;
        h.all_nodes_discovered = true;
        return match after_finish(vfs, sched, task, handler) {
            FinishStatus::Done => StartStatus::ImmediateFinish,
            _ => StartStatus::WithWaiter,
        };
    }

    let parent = lookup.parent;
    let (delegate_id, root) = {
        let nodes = vfs.nodes.lock();
        (nodes.delegate_for(parent), nodes.root())
    };
    let delegate_id = match delegate_id {
        Some(id) => id,
        None => {
            if parent == root {
                log::warn!("mountpoint for '{}' does not exist", h.absolute_path.as_str());
            } else {
                log::warn!(
                    "discovery of '{}' failed due to missing delegate on node {:?}",
                    h.absolute_path.as_str(),
                    parent
                );
            }
            h.status = DiscoveryStatus::Error;
            h.all_nodes_discovered = true;
            // the follow-up still runs so the caller's data is filled
            let _ = after_finish(vfs, sched, task, handler);
            return StartStatus::Failed;
        },
    };

    h.last_discovered_parent = Some(parent);
    h.last_name = lookup.last_name.clone();

    let delegate = delegate_arc(vfs, delegate_id);
    let tx = delegate.request_discovery(vfs, sched, parent, &lookup.last_name, h);
    sched.wait(task, TransactionWaiter::new(handler, tx, Some(delegate_id)));
    StartStatus::WithWaiter
}

pub(super) fn finish(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
    delegate: Option<DelegateId>,
) -> FinishStatus {
    let h = match handler.as_mut() {
        Handler::Discovery(h) => h,
        _ => unreachable!("discovery finish on non-discovery handler"),
    };

    if !h.all_nodes_discovered {
        if let Some(id) = delegate {
            delegate_arc(vfs, id).finish_discovery(vfs, h);
        }

        if h.status == DiscoveryStatus::Successful {
            // one more component exists now; walk again from the root
            return match start(vfs, sched, task, handler) {
                StartStatus::Failed => FinishStatus::Done,
                // resolved inline; the follow-up already ran
                StartStatus::ImmediateFinish => FinishStatus::Done,
                StartStatus::WithWaiter => FinishStatus::RepeatSameHandler,
            };
        }
        // discovery failed on this component; report through the follow-up
    }

    after_finish(vfs, sched, task, handler)
}

/// Runs the follow-up action once the walk concluded
fn after_finish(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, handler: Box<Handler>,
) -> FinishStatus {
    let h = match *handler {
        Handler::Discovery(h) => h,
        _ => unreachable!("discovery afterwork on non-discovery handler"),
    };
    let current = vfs.spaces.current();

    match h.action {
        DiscoveryAction::SetCwd { target, data } => {
            let d = unsafe { &mut *data.get(current) };
            match h.status {
                DiscoveryStatus::Successful => {
                    let node = h.node.expect("successful discovery carries a node");
                    let (kind, path) = {
                        let nodes = vfs.nodes.lock();
                        let kind = nodes.node(node).map(|n| n.kind);
                        (kind, nodes.real_path(node))
                    };
                    match kind {
                        Some(NodeKind::File) | Some(NodeKind::Pipe) | None => {
                            log::info!(
                                "could not set working directory to '{}', not a folder",
                                h.absolute_path.as_str()
                            );
                            d.status = SetWorkingDirectoryStatus::NotAFolder;
                        },
                        Some(_) => {
                            let pid = target.unwrap_or_else(|| sched.process_of(task).id);
                            sched.process_mut(pid).working_directory = path;
                            log::info!(
                                "working directory of process {} is now '{}'",
                                pid,
                                sched.process(pid).working_directory
                            );
                            d.status = SetWorkingDirectoryStatus::Successful;
                        },
                    }
                },
                DiscoveryStatus::NotFound => {
                    log::info!(
                        "could not set working directory to '{}', node not found",
                        h.absolute_path.as_str()
                    );
                    d.status = SetWorkingDirectoryStatus::NotFound;
                },
                DiscoveryStatus::Busy | DiscoveryStatus::Error => {
                    d.status = SetWorkingDirectoryStatus::Error;
                },
            }
            FinishStatus::Done
        },

        DiscoveryAction::Open { data } => match h.status {
            DiscoveryStatus::Successful | DiscoveryStatus::NotFound => {
                let node = if h.status == DiscoveryStatus::NotFound {
                    h.last_discovered_parent
                        .expect("walk always resolves a parent")
                } else {
                    h.node.expect("successful discovery carries a node")
                };
                let data_ptr = data.get(current);
                let open = OpenHandler::new(node, h.status, h.last_name, data);
                match start_transaction(vfs, sched, task, Box::new(Handler::Open(open))) {
                    StartStatus::WithWaiter => FinishStatus::ContinueNewHandler,
                    StartStatus::ImmediateFinish => FinishStatus::Done,
                    StartStatus::Failed => {
                        log::warn!("failed to start open handler after node discovery");
                        let d = unsafe { &mut *data_ptr };
                        d.fd = FileDescriptor::INVALID;
                        d.status = OpenStatus::Error;
                        FinishStatus::Done
                    },
                }
            },
            DiscoveryStatus::Busy => {
                let d = unsafe { &mut *data.get(current) };
                d.fd = FileDescriptor::INVALID;
                d.status = OpenStatus::Busy;
                FinishStatus::Done
            },
            DiscoveryStatus::Error => {
                let d = unsafe { &mut *data.get(current) };
                d.fd = FileDescriptor::INVALID;
                d.status = OpenStatus::Error;
                FinishStatus::Done
            },
        },

        DiscoveryAction::OpenDirectory { data } => {
            let d = unsafe { &mut *data.get(current) };
            match h.status {
                DiscoveryStatus::Successful => {
                    let node = h.node.expect("successful discovery carries a node");
                    let iterator = unsafe { &mut *d.iterator };
                    iterator.node_id = node;
                    iterator.position = 0;
                    d.status = OpenDirectoryStatus::Successful;
                },
                DiscoveryStatus::NotFound => d.status = OpenDirectoryStatus::NotFound,
                DiscoveryStatus::Busy | DiscoveryStatus::Error => {
                    d.status = OpenDirectoryStatus::Error;
                },
            }
            FinishStatus::Done
        },

        DiscoveryAction::GetLength { data } => match h.status {
            DiscoveryStatus::Successful => {
                let node = h.node.expect("successful discovery carries a node");
                let data_ptr = data.get(current);
                let get_length =
                    GetLengthHandler::new(node, LengthAfterwork::Report { data });
                match start_transaction(vfs, sched, task, Box::new(Handler::GetLength(get_length)))
                {
                    StartStatus::WithWaiter => FinishStatus::ContinueNewHandler,
                    StartStatus::ImmediateFinish => FinishStatus::Done,
                    StartStatus::Failed => {
                        let d = unsafe { &mut *data_ptr };
                        d.length = -1;
                        d.status = LengthStatus::Error;
                        FinishStatus::Done
                    },
                }
            },
            DiscoveryStatus::NotFound => {
                let d = unsafe { &mut *data.get(current) };
                d.length = -1;
                d.status = LengthStatus::NotFound;
                FinishStatus::Done
            },
            DiscoveryStatus::Busy => {
                let d = unsafe { &mut *data.get(current) };
                d.length = -1;
                d.status = LengthStatus::Busy;
                FinishStatus::Done
            },
            DiscoveryStatus::Error => {
                let d = unsafe { &mut *data.get(current) };
                d.length = -1;
                d.status = LengthStatus::Error;
                FinishStatus::Done
            },
        },
    }
}
