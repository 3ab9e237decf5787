use alloc::boxed::Box;

use kyro_abi::fs::{DirectoryRefreshStatus, NodeId, ReadDirectoryStatus, FILENAME_MAX};
use kyro_abi::syscall::FsReadDirectoryData;
use kyro_abi::TaskId;

use crate::memory::Contextual;
use crate::multitasking::{Scheduler, TransactionWaiter};

use super::super::delegate::DelegateId;
use super::super::Vfs;
use super::{delegate_arc, FinishStatus, Handler, StartStatus};

/// Lets the folder's delegate create the virtual nodes for all children,
/// then continues with the wrapped read-directory handler.
#[derive(Debug)]
pub struct DirectoryRefreshHandler {
    pub folder: NodeId,
    pub status: DirectoryRefreshStatus,
    /// The read that triggered the refresh, finished right after it
    pub unfinished: Option<ReadDirectoryHandler>,
}
impl DirectoryRefreshHandler {
    pub fn new(folder: NodeId, unfinished: Option<ReadDirectoryHandler>) -> Self {
        Self {
            folder,
            status: DirectoryRefreshStatus::Error,
            unfinished,
        }
    }
}

/// Returns the child at the iterator's position and advances it
#[derive(Debug)]
pub struct ReadDirectoryHandler {
    pub folder: NodeId,
    pub data: Contextual<*mut FsReadDirectoryData>,
    /// Outcome of the refresh this read was chained behind, if any
    pub refresh_status: Option<DirectoryRefreshStatus>,
}
impl ReadDirectoryHandler {
    pub fn new(folder: NodeId, data: Contextual<*mut FsReadDirectoryData>) -> Self {
        Self {
            folder,
            data,
            refresh_status: None,
        }
    }
}

pub(super) fn start_refresh(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
) -> StartStatus {
    let h = match handler.as_mut() {
        Handler::DirectoryRefresh(h) => h,
        _ => unreachable!("refresh start on non-refresh handler"),
    };

    let delegate_id = match vfs.nodes.lock().delegate_for(h.folder) {
        Some(id) => id,
        None => {
            log::warn!(
                "reading directory failed due to missing delegate on node {:?}",
                h.folder
            );
            if let Some(read) = &h.unfinished {
                let d = unsafe { &mut *read.data.get(vfs.spaces.current()) };
                d.status = ReadDirectoryStatus::Error;
            }
            return StartStatus::Failed;
        },
    };

    let delegate = delegate_arc(vfs, delegate_id);
    let tx = delegate.request_directory_refresh(vfs, sched, h.folder, h);
    sched.wait(task, TransactionWaiter::new(handler, tx, Some(delegate_id)));
    StartStatus::WithWaiter
}

pub(super) fn finish_refresh(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
    delegate: Option<DelegateId>,
) -> FinishStatus {
    let h = match handler.as_mut() {
        Handler::DirectoryRefresh(h) => h,
        _ => unreachable!("refresh finish on non-refresh handler"),
    };

    if let Some(id) = delegate {
        delegate_arc(vfs, id).finish_directory_refresh(vfs, h);
    }

    let status = h.status;
    let unfinished = h.unfinished.take();
    match unfinished {
        Some(mut read) => {
            read.refresh_status = Some(status);
            finish_read(
                vfs,
                sched,
                task,
                Box::new(Handler::ReadDirectory(read)),
                None,
            )
        },
        None => FinishStatus::Done,
    }
}

/// Reading a directory entry never talks to a delegate by itself; the
/// children list is complete once a refresh marked it valid.
pub(super) fn start_read(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, handler: Box<Handler>,
) -> StartStatus {
    match finish_read(vfs, sched, task, handler, None) {
        FinishStatus::Done => StartStatus::ImmediateFinish,
        _ => StartStatus::WithWaiter,
    }
}

pub(super) fn finish_read(
    vfs: &Vfs, _sched: &mut Scheduler, _task: TaskId, mut handler: Box<Handler>,
    _delegate: Option<DelegateId>,
) -> FinishStatus {
    let h = match handler.as_mut() {
        Handler::ReadDirectory(h) => h,
        _ => unreachable!("read-directory finish on non-read-directory handler"),
    };

    let d = unsafe { &mut *h.data.get(vfs.spaces.current()) };

    // a failed refresh invalidates the read chained behind it
    if let Some(refresh_status) = h.refresh_status {
        if refresh_status != DirectoryRefreshStatus::Successful {
            d.status = ReadDirectoryStatus::Error;
            return FinishStatus::Done;
        }
    }

    let iterator = unsafe { &mut *d.iterator };
    let position = iterator.position as usize;

    let child = {
        let nodes = vfs.nodes.lock();
        nodes
            .node(h.folder)
            .and_then(|folder| folder.children.get(position).copied())
            .and_then(|id| nodes.node(id))
            .map(|node| (node.id, node.kind, node.name.clone()))
    };

    match child {
        Some((node_id, kind, name)) => {
            let len = name.len().min(FILENAME_MAX);
            iterator.entry.name[..len].copy_from_slice(&name.as_bytes()[..len]);
            iterator.entry.name_len = len;
            iterator.entry.node_id = node_id;
            iterator.entry.kind = kind;
            iterator.position += 1;
            d.status = ReadDirectoryStatus::Successful;
        },
        None => {
            d.status = ReadDirectoryStatus::EndOfDirectory;
        },
    }

    FinishStatus::Done
}
