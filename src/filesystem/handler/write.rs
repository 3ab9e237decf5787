use alloc::boxed::Box;

use kyro_abi::fs::{FileDescriptor, NodeId, TransactionId, WriteStatus};
use kyro_abi::syscall::FsWriteData;
use kyro_abi::{ProcessId, TaskId};

use crate::memory::Contextual;
use crate::multitasking::{Scheduler, TransactionWaiter};

use super::super::delegate::DelegateId;
use super::super::Vfs;
use super::{delegate_arc, settle, FinishStatus, Handler, StartStatus};

/// Drives one write through the node's delegate and copies the outcome
/// into the caller's data struct.
#[derive(Debug)]
pub struct WriteHandler {
    pub node: NodeId,
    pub pid: ProcessId,
    pub fd: FileDescriptor,
    pub data: Contextual<*mut FsWriteData>,
    pub status: WriteStatus,
    pub result: i64,
    /// Transaction id to reuse when the delegate reported `Repeat`
    pub repeat_transaction: Option<TransactionId>,
}
impl WriteHandler {
    pub fn new(
        node: NodeId, pid: ProcessId, fd: FileDescriptor, data: Contextual<*mut FsWriteData>,
    ) -> Self {
        Self {
            node,
            pid,
            fd,
            data,
            status: WriteStatus::Error,
            result: -1,
            repeat_transaction: None,
        }
    }
}

pub(super) fn start(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
) -> StartStatus {
    let h = match handler.as_mut() {
        Handler::Write(h) => h,
        _ => unreachable!("write start on non-write handler"),
    };

    let delegate_id = match vfs.nodes.lock().delegate_for(h.node) {
        Some(id) => id,
        None => {
            log::warn!(
                "writing of {:?} failed due to missing delegate on node {:?}",
                h.fd,
                h.node
            );
            return StartStatus::Failed;
        },
    };

    let (buffer, length) = {
        let d = unsafe { &*h.data.get(vfs.spaces.current()) };
        (Contextual::new(d.buffer, h.data.space()), d.length)
    };

    let delegate = delegate_arc(vfs, delegate_id);
    let (pid, fd) = (h.pid, h.fd);

    if h.repeat_transaction.is_some() {
        let tx = delegate.request_write(vfs, sched, h.node, length, buffer, pid, fd, h);
        sched.wait(task, TransactionWaiter::new(handler, tx, Some(delegate_id)));
        return StartStatus::WithWaiter;
    }

    let tx = delegate.request_write(vfs, sched, h.node, length, buffer, pid, fd, h);
    settle(vfs, sched, task, handler, tx, delegate_id)
}

pub(super) fn finish(
    vfs: &Vfs, sched: &mut Scheduler, _task: TaskId, mut handler: Box<Handler>,
    delegate: Option<DelegateId>,
) -> FinishStatus {
    let h = match handler.as_mut() {
        Handler::Write(h) => h,
        _ => unreachable!("write finish on non-write handler"),
    };

    if let Some(id) = delegate {
        delegate_arc(vfs, id).finish_write(vfs, sched, h.pid, h.fd, h);
    }

    let d = unsafe { &mut *h.data.get(vfs.spaces.current()) };
    d.result = h.result;
    d.status = h.status;
    FinishStatus::Done
}
