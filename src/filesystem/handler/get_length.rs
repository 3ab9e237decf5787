use alloc::boxed::Box;

use kyro_abi::fs::{FileDescriptor, LengthStatus, NodeId, SeekMode, SeekStatus};
use kyro_abi::syscall::{FsLengthData, FsSeekData};
use kyro_abi::{ProcessId, TaskId};

use crate::memory::Contextual;
use crate::multitasking::{Scheduler, TransactionWaiter};

use super::super::delegate::DelegateId;
use super::super::Vfs;
use super::{delegate_arc, FinishStatus, Handler, StartStatus};

/// Asks the node's delegate for its length, then runs one of two
/// afterworks: reporting the length, or moving a descriptor offset for
/// the seek call.
#[derive(Debug)]
pub struct GetLengthHandler {
    pub node: NodeId,
    pub status: LengthStatus,
    pub length: i64,
    pub afterwork: LengthAfterwork,
}

#[derive(Debug)]
pub enum LengthAfterwork {
    /// Report the length into the caller's length data
    Report {
        data: Contextual<*mut FsLengthData>,
    },
    /// Implement seek: apply the Set/Cur/End arithmetic, clamped to
    /// `[0, length]`
    Seek {
        pid: ProcessId,
        fd: FileDescriptor,
        data: Contextual<*mut FsSeekData>,
    },
}

impl GetLengthHandler {
    pub fn new(node: NodeId, afterwork: LengthAfterwork) -> Self {
        Self {
            node,
            status: LengthStatus::Error,
            length: -1,
            afterwork,
        }
    }
}

pub(super) fn start(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
) -> StartStatus {
    let h = match handler.as_mut() {
        Handler::GetLength(h) => h,
        _ => unreachable!("get-length start on non-get-length handler"),
    };

    let delegate_id = match vfs.nodes.lock().delegate_for(h.node) {
        Some(id) => id,
        None => return StartStatus::Failed,
    };

    let delegate = delegate_arc(vfs, delegate_id);
    let tx = delegate.request_get_length(vfs, sched, h.node, h);
    sched.wait(task, TransactionWaiter::new(handler, tx, Some(delegate_id)));
    StartStatus::WithWaiter
}

pub(super) fn finish(
    vfs: &Vfs, _sched: &mut Scheduler, _task: TaskId, mut handler: Box<Handler>,
    delegate: Option<DelegateId>,
) -> FinishStatus {
    let h = match handler.as_mut() {
        Handler::GetLength(h) => h,
        _ => unreachable!("get-length finish on non-get-length handler"),
    };

    if let Some(id) = delegate {
        delegate_arc(vfs, id).finish_get_length(vfs, h);
    }

    let current = vfs.spaces.current();
    match &h.afterwork {
        LengthAfterwork::Report { data } => {
            let d = unsafe { &mut *data.get(current) };
            if h.status == LengthStatus::Successful {
                d.status = LengthStatus::Successful;
                d.length = h.length;
            } else {
                d.status = h.status;
                d.length = -1;
            }
        },
        LengthAfterwork::Seek { pid, fd, data } => {
            let d = unsafe { &mut *data.get(current) };
            if h.status == LengthStatus::Successful {
                let mut descriptors = vfs.descriptors.lock();
                match descriptors.get_mut(*pid, *fd) {
                    Some(content) => {
                        match d.mode {
                            SeekMode::Cur => content.offset += d.amount,
                            SeekMode::Set => content.offset = d.amount,
                            SeekMode::End => content.offset = h.length - d.amount,
                        }
                        if content.offset > h.length {
                            content.offset = h.length;
                        }
                        if content.offset < 0 {
                            content.offset = 0;
                        }
                        d.result = content.offset;
                        d.status = SeekStatus::Successful;
                    },
                    None => {
                        d.result = -1;
                        d.status = SeekStatus::InvalidFd;
                    },
                }
            } else {
                d.result = -1;
                d.status = SeekStatus::Error;
            }
        },
    }

    FinishStatus::Done
}
