//! Kernel-side system call surface of the filesystem.
//!
//! The thunk layer unpacks the call arguments into a per-call data struct
//! in the requesting task's address space and invokes one of these
//! functions with a contextual pointer to it. Each function either
//! completes inline or parks the task on a transaction waiter; the thunk
//! layer deschedules the task in the latter case and the results appear
//! in the data struct before the task wakes.

use alloc::boxed::Box;
use alloc::string::String;

use kyro_abi::fs::{
    CreateNodeStatus, FileDescriptor, GetWorkingDirectoryStatus, LengthStatus,
    OpenDirectoryStatus, OpenStatus, ReadDirectoryStatus, ReadStatus, RegisterAsDelegateStatus,
    SeekStatus, SetWorkingDirectoryStatus, StatStatus, TellStatus, WriteStatus,
};
use kyro_abi::fs::{CloseStatus, PipeStatus};
use kyro_abi::syscall::{
    FsClonefdData, FsCloseData, FsCreateNodeData, FsFstatData, FsLengthData, FsOpenData,
    FsOpenDirectoryData, FsPipeData, FsReadData, FsReadDirectoryData, FsRegisterAsDelegateData,
    FsSeekData, FsSetTransactionStatusData, FsStatData, FsTellData, FsWriteData,
    GetWorkingDirectoryData, SetWorkingDirectoryData,
};
use kyro_abi::{SecurityLevel, TaskId};

use crate::filesystem::handler::{
    self, CloseHandler, DirectoryRefreshHandler, DiscoveryAction, DiscoveryHandler,
    GetLengthHandler, Handler, LengthAfterwork, ReadDirectoryHandler, ReadHandler, StartStatus,
    WriteHandler,
};
use crate::filesystem::{concat_as_absolute, PathBuf, Vfs};
use crate::memory::Contextual;
use crate::multitasking::Scheduler;

/// Whether a call completed inline or parked the task on a waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFlow {
    Completed,
    Parked,
}

/// Copies a string out of the caller's address space. Must run in that
/// space.
fn read_user_str(ptr: *const u8, len: usize) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
    core::str::from_utf8(bytes).ok().map(String::from)
}

fn absolute_path(sched: &Scheduler, task: TaskId, path: &str) -> Option<PathBuf> {
    let cwd = sched.process_of(task).working_directory.clone();
    concat_as_absolute(&cwd, path)
}

fn flow_of(start: StartStatus) -> CallFlow {
    match start {
        StartStatus::WithWaiter => CallFlow::Parked,
        _ => CallFlow::Completed,
    }
}

pub fn set_working_directory(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId,
    data: Contextual<*mut SetWorkingDirectoryData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    // only kernel-level tasks may set the working directory of another
    // process
    if let Some(target) = d.process {
        let allowed = sched.process_of(task).security_level <= SecurityLevel::Kernel
            && sched.process_exists(target);
        if !allowed {
            d.status = SetWorkingDirectoryStatus::Error;
            return CallFlow::Completed;
        }
    }

    let path = match read_user_str(d.path, d.path_len) {
        Some(path) => path,
        None => {
            d.status = SetWorkingDirectoryStatus::Error;
            return CallFlow::Completed;
        },
    };

    let base = match d.process {
        Some(target) => sched.process(target).working_directory.clone(),
        None => sched.process_of(task).working_directory.clone(),
    };
    let absolute = match concat_as_absolute(&base, &path) {
        Some(absolute) => absolute,
        None => {
            d.status = SetWorkingDirectoryStatus::Error;
            return CallFlow::Completed;
        },
    };

    let target = d.process;
    let discovery = DiscoveryHandler::new(absolute, true, DiscoveryAction::SetCwd { target, data });
    flow_of(handler::start_transaction(
        vfs,
        sched,
        task,
        Box::new(Handler::Discovery(discovery)),
    ))
}

pub fn get_working_directory(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut GetWorkingDirectoryData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let cwd = sched.process_of(task).working_directory.clone();
    if d.buffer.is_null() || d.buffer_len < cwd.len() {
        d.result_len = cwd.len();
        d.status = GetWorkingDirectoryStatus::SizeExceeded;
        return CallFlow::Completed;
    }

    let out = unsafe { core::slice::from_raw_parts_mut(d.buffer, cwd.len()) };
    out.copy_from_slice(cwd.as_bytes());
    d.result_len = cwd.len();
    d.status = GetWorkingDirectoryStatus::Successful;
    CallFlow::Completed
}

pub fn fs_open(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsOpenData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let absolute = read_user_str(d.path, d.path_len)
        .and_then(|path| absolute_path(sched, task, &path));
    let absolute = match absolute {
        Some(absolute) => absolute,
        None => {
            d.status = OpenStatus::Error;
            d.fd = FileDescriptor::INVALID;
            return CallFlow::Completed;
        },
    };

    let discovery = DiscoveryHandler::new(absolute, true, DiscoveryAction::Open { data });
    flow_of(handler::start_transaction(
        vfs,
        sched,
        task,
        Box::new(Handler::Discovery(discovery)),
    ))
}

pub fn fs_close(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsCloseData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let pid = sched.process_of(task).id;
    match vfs.node_for_descriptor(pid, d.fd) {
        Some((node, _)) => {
            let close = CloseHandler::new(node, pid, d.fd, data);
            match handler::start_transaction(vfs, sched, task, Box::new(Handler::Close(close))) {
                StartStatus::WithWaiter => CallFlow::Parked,
                StartStatus::ImmediateFinish => CallFlow::Completed,
                StartStatus::Failed => {
                    d.result = -1;
                    d.status = CloseStatus::Error;
                    CallFlow::Completed
                },
            }
        },
        None => {
            d.result = -1;
            d.status = CloseStatus::InvalidFd;
            CallFlow::Completed
        },
    }
}

pub fn fs_read(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsReadData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let pid = sched.process_of(task).id;
    match vfs.node_for_descriptor(pid, d.fd) {
        Some((node, _)) => {
            let read = ReadHandler::new(node, pid, d.fd, data);
            match handler::start_transaction(vfs, sched, task, Box::new(Handler::Read(read))) {
                StartStatus::WithWaiter => CallFlow::Parked,
                StartStatus::ImmediateFinish => CallFlow::Completed,
                StartStatus::Failed => {
                    d.result = -1;
                    d.status = ReadStatus::InvalidFd;
                    CallFlow::Completed
                },
            }
        },
        None => {
            d.result = -1;
            d.status = ReadStatus::InvalidFd;
            CallFlow::Completed
        },
    }
}

pub fn fs_write(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsWriteData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let pid = sched.process_of(task).id;
    match vfs.node_for_descriptor(pid, d.fd) {
        Some((node, _)) => {
            let write = WriteHandler::new(node, pid, d.fd, data);
            match handler::start_transaction(vfs, sched, task, Box::new(Handler::Write(write))) {
                StartStatus::WithWaiter => CallFlow::Parked,
                StartStatus::ImmediateFinish => CallFlow::Completed,
                StartStatus::Failed => {
                    d.result = -1;
                    d.status = WriteStatus::InvalidFd;
                    CallFlow::Completed
                },
            }
        },
        None => {
            d.result = -1;
            d.status = WriteStatus::InvalidFd;
            CallFlow::Completed
        },
    }
}

pub fn fs_seek(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsSeekData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let pid = sched.process_of(task).id;
    match vfs.node_for_descriptor(pid, d.fd) {
        Some((node, _)) => {
            let get_length = GetLengthHandler::new(
                node,
                LengthAfterwork::Seek {
                    pid,
                    fd: d.fd,
                    data,
                },
            );
            match handler::start_transaction(
                vfs,
                sched,
                task,
                Box::new(Handler::GetLength(get_length)),
            ) {
                StartStatus::WithWaiter => CallFlow::Parked,
                StartStatus::ImmediateFinish => CallFlow::Completed,
                StartStatus::Failed => {
                    d.result = -1;
                    d.status = SeekStatus::Error;
                    CallFlow::Completed
                },
            }
        },
        None => {
            d.result = -1;
            d.status = SeekStatus::InvalidFd;
            CallFlow::Completed
        },
    }
}

pub fn fs_tell(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsTellData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let pid = sched.process_of(task).id;
    match vfs.node_for_descriptor(pid, d.fd) {
        Some((_, content)) => {
            d.result = content.offset;
            d.status = TellStatus::Successful;
        },
        None => {
            d.result = -1;
            d.status = TellStatus::InvalidFd;
        },
    }
    CallFlow::Completed
}

pub fn fs_length(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsLengthData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    if d.by_fd {
        let pid = sched.process_of(task).id;
        match vfs.node_for_descriptor(pid, d.fd) {
            Some((node, _)) => {
                let get_length = GetLengthHandler::new(node, LengthAfterwork::Report { data });
                match handler::start_transaction(
                    vfs,
                    sched,
                    task,
                    Box::new(Handler::GetLength(get_length)),
                ) {
                    StartStatus::WithWaiter => CallFlow::Parked,
                    StartStatus::ImmediateFinish => CallFlow::Completed,
                    StartStatus::Failed => {
                        d.length = -1;
                        d.status = LengthStatus::Error;
                        CallFlow::Completed
                    },
                }
            },
            None => {
                d.length = -1;
                d.status = LengthStatus::InvalidFd;
                CallFlow::Completed
            },
        }
    } else {
        let absolute = read_user_str(d.path, d.path_len)
            .and_then(|path| absolute_path(sched, task, &path));
        let absolute = match absolute {
            Some(absolute) => absolute,
            None => {
                d.length = -1;
                d.status = LengthStatus::Error;
                return CallFlow::Completed;
            },
        };

        let discovery = DiscoveryHandler::new(
            absolute,
            d.follow_symlinks,
            DiscoveryAction::GetLength { data },
        );
        flow_of(handler::start_transaction(
            vfs,
            sched,
            task,
            Box::new(Handler::Discovery(discovery)),
        ))
    }
}

pub fn fs_open_directory(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsOpenDirectoryData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let absolute = read_user_str(d.path, d.path_len)
        .and_then(|path| absolute_path(sched, task, &path));
    let absolute = match absolute {
        Some(absolute) => absolute,
        None => {
            d.status = OpenDirectoryStatus::Error;
            return CallFlow::Completed;
        },
    };

    let discovery = DiscoveryHandler::new(absolute, true, DiscoveryAction::OpenDirectory { data });
    flow_of(handler::start_transaction(
        vfs,
        sched,
        task,
        Box::new(Handler::Discovery(discovery)),
    ))
}

pub fn fs_read_directory(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsReadDirectoryData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let folder = unsafe { &*d.iterator }.node_id;
    let contents_valid = match vfs.nodes.lock().node(folder) {
        Some(node) => node.contents_valid,
        None => {
            d.status = ReadDirectoryStatus::Error;
            return CallFlow::Completed;
        },
    };

    let read = ReadDirectoryHandler::new(folder, data);

    // an already-refreshed folder is answered from the children list
    if contents_valid {
        let _ = handler::finish_transaction(
            vfs,
            sched,
            task,
            Box::new(Handler::ReadDirectory(read)),
            None,
        );
        return CallFlow::Completed;
    }

    let refresh = DirectoryRefreshHandler::new(folder, Some(read));
    match handler::start_transaction(
        vfs,
        sched,
        task,
        Box::new(Handler::DirectoryRefresh(refresh)),
    ) {
        StartStatus::WithWaiter => CallFlow::Parked,
        StartStatus::ImmediateFinish => CallFlow::Completed,
        StartStatus::Failed => {
            d.status = ReadDirectoryStatus::Error;
            CallFlow::Completed
        },
    }
}

pub fn fs_pipe(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsPipeData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let pid = sched.process_of(task).id;
    let (write_fd, read_fd) = vfs.pipe(pid, d.blocking);
    d.write_fd = write_fd;
    d.read_fd = read_fd;
    d.status = if write_fd.is_valid() && read_fd.is_valid() {
        PipeStatus::Successful
    } else {
        PipeStatus::Error
    };
    CallFlow::Completed
}

pub fn fs_clonefd(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsClonefdData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let target_fd = if d.target_fd.is_valid() {
        Some(d.target_fd)
    } else {
        None
    };
    let (result, status) = vfs.clonefd(d.source_fd, d.source_pid, target_fd, d.target_pid);
    d.result = result;
    d.status = status;
    CallFlow::Completed
}

/// Reserved
pub fn fs_stat(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsStatData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };
    d.result = -1;
    d.status = StatStatus::Unsupported;
    CallFlow::Completed
}

/// Reserved
pub fn fs_fstat(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsFstatData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };
    d.result = -1;
    d.status = StatStatus::Unsupported;
    CallFlow::Completed
}

pub fn fs_register_as_delegate(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId,
    data: Contextual<*mut FsRegisterAsDelegateData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let name = match read_user_str(d.name, d.name_len) {
        Some(name) => name,
        None => {
            d.status = RegisterAsDelegateStatus::FailedDelegateCreation;
            return CallFlow::Completed;
        },
    };

    match vfs.create_delegate(sched, task, &name, d.phys_mountpoint_id) {
        Ok((mountpoint, storage_address)) => {
            d.mountpoint_id = mountpoint;
            d.transaction_storage = storage_address;
            d.status = RegisterAsDelegateStatus::Successful;
        },
        Err(status) => {
            d.status = status;
        },
    }
    CallFlow::Completed
}

pub fn fs_set_transaction_status(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId,
    data: Contextual<*mut FsSetTransactionStatusData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &*data.get(vfs.spaces.current()) };
    vfs.transactions.lock().set(d.transaction, d.status);
    CallFlow::Completed
}

pub fn fs_create_node(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, data: Contextual<*mut FsCreateNodeData>,
) -> CallFlow {
    let _space = vfs.spaces.enter(sched.process_of(task).address_space);
    let d = unsafe { &mut *data.get(vfs.spaces.current()) };

    let name = match read_user_str(d.name, d.name_len) {
        Some(name) if !name.is_empty() => name,
        _ => {
            d.status = CreateNodeStatus::FailedNoParent;
            return CallFlow::Completed;
        },
    };

    let mut nodes = vfs.nodes.lock();
    if nodes.node(d.parent_id).is_none() {
        d.status = CreateNodeStatus::FailedNoParent;
        return CallFlow::Completed;
    }

    let (node, status) = match nodes.find_child(d.parent_id, &name) {
        Some(existing) => (existing, CreateNodeStatus::Updated),
        None => {
            let node = nodes.create_node(d.kind, name);
            nodes.add_child(d.parent_id, node);
            (node, CreateNodeStatus::Created)
        },
    };

    let n = nodes.node_mut(node).expect("node just resolved");
    n.kind = d.kind;
    n.phys_id = Some(d.phys_id);
    d.created_id = node;
    d.status = status;
    CallFlow::Completed
}
