use alloc::boxed::Box;

use kyro_abi::fs::{CloseStatus, NodeId};
use kyro_abi::syscall::FsCloseData;
use kyro_abi::{ProcessId, TaskId};

use crate::memory::Contextual;
use crate::multitasking::Scheduler;

use super::super::delegate::DelegateId;
use super::super::Vfs;
use super::{delegate_arc, settle, FinishStatus, Handler, StartStatus};

/// Closes a descriptor through the node's delegate, unmapping it once the
/// delegate agreed.
#[derive(Debug)]
pub struct CloseHandler {
    pub node: NodeId,
    pub pid: ProcessId,
    pub fd: kyro_abi::fs::FileDescriptor,
    pub data: Contextual<*mut FsCloseData>,
    pub status: CloseStatus,
}
impl CloseHandler {
    pub fn new(
        node: NodeId, pid: ProcessId, fd: kyro_abi::fs::FileDescriptor,
        data: Contextual<*mut FsCloseData>,
    ) -> Self {
        Self {
            node,
            pid,
            fd,
            data,
            status: CloseStatus::Error,
        }
    }
}

pub(super) fn start(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
) -> StartStatus {
    let h = match handler.as_mut() {
        Handler::Close(h) => h,
        _ => unreachable!("close start on non-close handler"),
    };

    let delegate_id = match vfs.nodes.lock().delegate_for(h.node) {
        Some(id) => id,
        None => {
            log::warn!(
                "failed to close descriptor {:?} due to missing delegate",
                h.fd
            );
            return StartStatus::Failed;
        },
    };

    let delegate = delegate_arc(vfs, delegate_id);
    let tx = delegate.request_close(vfs, sched, h.pid, h.node, h);
    settle(vfs, sched, task, handler, tx, delegate_id)
}

pub(super) fn finish(
    vfs: &Vfs, _sched: &mut Scheduler, _task: TaskId, mut handler: Box<Handler>,
    delegate: Option<DelegateId>,
) -> FinishStatus {
    let h = match handler.as_mut() {
        Handler::Close(h) => h,
        _ => unreachable!("close finish on non-close handler"),
    };

    if let Some(id) = delegate {
        delegate_arc(vfs, id).finish_close(vfs, h);
    }

    let mut status = h.status;
    let mut result = 0;
    if status == CloseStatus::Successful {
        if !vfs.unmap_file(h.pid, h.fd) {
            log::warn!(
                "delegate closed descriptor {:?} of process {} but it was not mapped",
                h.fd,
                h.pid
            );
            status = CloseStatus::Error;
            result = -1;
        }
    } else {
        result = -1;
    }

    let d = unsafe { &mut *h.data.get(vfs.spaces.current()) };
    d.status = status;
    d.result = result;
    FinishStatus::Done
}
