use alloc::boxed::Box;
use alloc::string::String;

use kyro_abi::fs::{DiscoveryStatus, FileDescriptor, NodeId, OpenStatus};
use kyro_abi::syscall::FsOpenData;
use kyro_abi::TaskId;

use crate::memory::Contextual;
use crate::multitasking::Scheduler;

use super::super::delegate::DelegateId;
use super::super::Vfs;
use super::{delegate_arc, settle, FinishStatus, Handler, StartStatus};

/// Opens a node through its delegate and maps the descriptor on success.
///
/// `node` is the discovered node when discovery succeeded, or the last
/// discovered parent when the leaf is to be created; `name` is then the
/// missing component's name.
#[derive(Debug)]
pub struct OpenHandler {
    pub node: NodeId,
    pub discovery_status: DiscoveryStatus,
    pub name: String,
    pub data: Contextual<*mut FsOpenData>,
    pub status: OpenStatus,
}
impl OpenHandler {
    pub fn new(
        node: NodeId, discovery_status: DiscoveryStatus, name: String,
        data: Contextual<*mut FsOpenData>,
    ) -> Self {
        Self {
            node,
            discovery_status,
            name,
            data,
            status: OpenStatus::Error,
        }
    }
}

pub(super) fn start(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
) -> StartStatus {
    let h = match handler.as_mut() {
        Handler::Open(h) => h,
        _ => unreachable!("open start on non-open handler"),
    };

    let delegate_id = match vfs.nodes.lock().delegate_for(h.node) {
        Some(id) => id,
        None => {
            log::warn!("failed to open node {:?} due to missing delegate", h.node);
            return StartStatus::Failed;
        },
    };

    let flags = {
        let d = unsafe { &*h.data.get(vfs.spaces.current()) };
        d.flags
    };
    let name = h.name.clone();

    let delegate = delegate_arc(vfs, delegate_id);
    let tx = delegate.request_open(vfs, sched, h.node, &name, flags, h);
    settle(vfs, sched, task, handler, tx, delegate_id)
}

pub(super) fn finish(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, mut handler: Box<Handler>,
    delegate: Option<DelegateId>,
) -> FinishStatus {
    let h = match handler.as_mut() {
        Handler::Open(h) => h,
        _ => unreachable!("open finish on non-open handler"),
    };

    if let Some(id) = delegate {
        delegate_arc(vfs, id).finish_open(vfs, h);
    }

    let d = unsafe { &mut *h.data.get(vfs.spaces.current()) };
    d.status = h.status;

    // once the delegate reports success, back the call with a descriptor
    if h.status == OpenStatus::Successful {
        let pid = sched.process_of(task).id;
        d.fd = vfs.map_file(pid, h.node, d.flags, None);
        if !d.fd.is_valid() {
            d.status = OpenStatus::Error;
        }
    } else {
        d.fd = FileDescriptor::INVALID;
    }

    FinishStatus::Done
}
