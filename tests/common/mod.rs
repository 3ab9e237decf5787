#![allow(dead_code)]

use std::sync::Arc;

use spin::Mutex;

use kyro_abi::fs::protocol::{DelegateRequest, TransactionStorage};
use kyro_abi::fs::{
    ClonefdStatus, CloseStatus, DirectoryIterator, FileDescriptor, LengthStatus, NodeId,
    NodeKind, OpenDirectoryStatus, OpenFlags, OpenStatus, PhysId, PipeStatus,
    ReadDirectoryStatus, ReadStatus, RegisterAsDelegateStatus, SeekMode, SeekStatus,
    SetWorkingDirectoryStatus, TellStatus, TransactionId, TransactionStatus, WriteStatus,
};
use kyro_abi::syscall::{
    FsClonefdData, FsCloseData, FsCreateNodeData, FsLengthData, FsOpenData,
    FsOpenDirectoryData, FsPipeData, FsReadData, FsReadDirectoryData, FsRegisterAsDelegateData,
    FsSeekData, FsSetTransactionStatusData, FsTellData, FsWriteData, GetWorkingDirectoryData,
    SetWorkingDirectoryData,
};
use kyro_abi::{ProcessId, SecurityLevel, TaskId};

use kyro_vfs::filesystem::Vfs;
use kyro_vfs::ipc::MessageBus;
use kyro_vfs::memory::{AddressSpaceId, AddressSpaces, Contextual};
use kyro_vfs::multitasking::Scheduler;
use kyro_vfs::syscall::{self, CallFlow};

/// A private kernel instance for one test
pub struct Kernel {
    pub spaces: Arc<AddressSpaces>,
    pub bus: Arc<Mutex<MessageBus>>,
    pub vfs: Vfs,
    pub sched: Scheduler,
}

impl Kernel {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let spaces = Arc::new(AddressSpaces::new());
        let bus = Arc::new(Mutex::new(MessageBus::new()));
        let vfs = Vfs::new(spaces.clone(), bus.clone());
        let sched = Scheduler::new(spaces.clone());
        Kernel {
            spaces,
            bus,
            vfs,
            sched,
        }
    }

    pub fn spawn(&mut self, level: SecurityLevel) -> TaskId {
        self.sched.spawn(level)
    }

    pub fn space_of(&self, task: TaskId) -> AddressSpaceId {
        self.sched.process_of(task).address_space
    }

    pub fn pid_of(&self, task: TaskId) -> ProcessId {
        self.sched.process_of(task).id
    }

    pub fn ctx<T>(&self, task: TaskId, data: &mut T) -> Contextual<*mut T> {
        Contextual::new(data as *mut T, self.space_of(task))
    }

    /// Runs scheduling rounds until the task wakes up
    pub fn pump(&mut self, task: TaskId) {
        for _ in 0..64 {
            if self.sched.is_runnable(task) {
                return;
            }
            self.sched.schedule(&self.vfs);
        }
        panic!("task {} did not wake up", task);
    }

    fn settle(&mut self, task: TaskId, flow: CallFlow) {
        if flow == CallFlow::Parked {
            self.pump(task);
        }
    }

    pub fn open(&mut self, task: TaskId, path: &str, flags: OpenFlags) -> (OpenStatus, FileDescriptor) {
        let path = path.as_bytes().to_vec();
        let mut data = FsOpenData {
            path: path.as_ptr(),
            path_len: path.len(),
            flags,
            status: OpenStatus::Error,
            fd: FileDescriptor::INVALID,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_open(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.fd)
    }

    pub fn close(&mut self, task: TaskId, fd: FileDescriptor) -> CloseStatus {
        let mut data = FsCloseData {
            fd,
            result: -1,
            status: CloseStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_close(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        data.status
    }

    pub fn read(&mut self, task: TaskId, fd: FileDescriptor, buf: &mut [u8]) -> (ReadStatus, i64) {
        let mut data = FsReadData {
            fd,
            buffer: buf.as_mut_ptr(),
            length: buf.len() as i64,
            result: -1,
            status: ReadStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_read(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.result)
    }

    pub fn write(&mut self, task: TaskId, fd: FileDescriptor, bytes: &[u8]) -> (WriteStatus, i64) {
        let mut data = FsWriteData {
            fd,
            buffer: bytes.as_ptr(),
            length: bytes.len() as i64,
            result: -1,
            status: WriteStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_write(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.result)
    }

    pub fn seek(
        &mut self, task: TaskId, fd: FileDescriptor, amount: i64, mode: SeekMode,
    ) -> (SeekStatus, i64) {
        let mut data = FsSeekData {
            fd,
            amount,
            mode,
            result: -1,
            status: SeekStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_seek(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.result)
    }

    pub fn tell(&mut self, task: TaskId, fd: FileDescriptor) -> (TellStatus, i64) {
        let mut data = FsTellData {
            fd,
            result: -1,
            status: TellStatus::InvalidFd,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_tell(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.result)
    }

    pub fn length_fd(&mut self, task: TaskId, fd: FileDescriptor) -> (LengthStatus, i64) {
        let mut data = FsLengthData {
            by_fd: true,
            follow_symlinks: true,
            fd,
            path: core::ptr::null(),
            path_len: 0,
            length: -1,
            status: LengthStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_length(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.length)
    }

    pub fn length_path(&mut self, task: TaskId, path: &str) -> (LengthStatus, i64) {
        let path = path.as_bytes().to_vec();
        let mut data = FsLengthData {
            by_fd: false,
            follow_symlinks: true,
            fd: FileDescriptor::INVALID,
            path: path.as_ptr(),
            path_len: path.len(),
            length: -1,
            status: LengthStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_length(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.length)
    }

    pub fn pipe(&mut self, task: TaskId, blocking: bool) -> (FileDescriptor, FileDescriptor) {
        let mut data = FsPipeData {
            blocking,
            write_fd: FileDescriptor::INVALID,
            read_fd: FileDescriptor::INVALID,
            status: PipeStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_pipe(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        assert_eq!(data.status, PipeStatus::Successful);
        (data.write_fd, data.read_fd)
    }

    pub fn clonefd(
        &mut self, task: TaskId, source_fd: FileDescriptor, source_pid: ProcessId,
        target_fd: Option<FileDescriptor>, target_pid: ProcessId,
    ) -> (ClonefdStatus, FileDescriptor) {
        let mut data = FsClonefdData {
            source_fd,
            source_pid,
            target_fd: target_fd.unwrap_or(FileDescriptor::INVALID),
            target_pid,
            result: FileDescriptor::INVALID,
            status: ClonefdStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_clonefd(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        (data.status, data.result)
    }

    pub fn open_directory(
        &mut self, task: TaskId, path: &str, iterator: &mut DirectoryIterator,
    ) -> OpenDirectoryStatus {
        let path = path.as_bytes().to_vec();
        let mut data = FsOpenDirectoryData {
            path: path.as_ptr(),
            path_len: path.len(),
            iterator: iterator as *mut DirectoryIterator,
            status: OpenDirectoryStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_open_directory(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        data.status
    }

    pub fn read_directory(
        &mut self, task: TaskId, iterator: &mut DirectoryIterator,
    ) -> ReadDirectoryStatus {
        let mut data = FsReadDirectoryData {
            iterator: iterator as *mut DirectoryIterator,
            status: ReadDirectoryStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::fs_read_directory(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        data.status
    }

    pub fn set_cwd(&mut self, task: TaskId, path: &str) -> SetWorkingDirectoryStatus {
        let path = path.as_bytes().to_vec();
        let mut data = SetWorkingDirectoryData {
            path: path.as_ptr(),
            path_len: path.len(),
            process: None,
            status: SetWorkingDirectoryStatus::Error,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::set_working_directory(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        data.status
    }

    pub fn get_cwd(&mut self, task: TaskId) -> String {
        let mut buffer = [0u8; 4096];
        let mut data = GetWorkingDirectoryData {
            buffer: buffer.as_mut_ptr(),
            buffer_len: buffer.len(),
            result_len: 0,
            status: kyro_abi::fs::GetWorkingDirectoryStatus::SizeExceeded,
        };
        let ctx = self.ctx(task, &mut data);
        let flow = syscall::get_working_directory(&self.vfs, &mut self.sched, task, ctx);
        self.settle(task, flow);
        String::from_utf8(buffer[..data.result_len].to_vec()).unwrap()
    }
}

/// A fake user-space filesystem driver for the tasked delegate tests
pub struct Driver {
    pub task: TaskId,
    pub mountpoint: NodeId,
    pub storage: *mut TransactionStorage,
    pub space: AddressSpaceId,
}

impl Driver {
    pub fn register(kernel: &mut Kernel, name: &str, phys: PhysId) -> Driver {
        let task = kernel.spawn(SecurityLevel::Driver);
        let space = kernel.space_of(task);
        let name_bytes = name.as_bytes().to_vec();
        let mut data = FsRegisterAsDelegateData {
            name: name_bytes.as_ptr(),
            name_len: name_bytes.len(),
            phys_mountpoint_id: phys,
            mountpoint_id: NodeId::ZERO,
            transaction_storage: 0,
            status: RegisterAsDelegateStatus::FailedDelegateCreation,
        };
        let ctx = kernel.ctx(task, &mut data);
        let flow = syscall::fs_register_as_delegate(&kernel.vfs, &mut kernel.sched, task, ctx);
        assert_eq!(flow, CallFlow::Completed);
        assert_eq!(data.status, RegisterAsDelegateStatus::Successful);
        Driver {
            task,
            mountpoint: data.mountpoint_id,
            storage: data.transaction_storage as *mut TransactionStorage,
            space,
        }
    }

    /// Next request from the driver's message queue
    pub fn next_request(&self, kernel: &mut Kernel) -> Option<DelegateRequest> {
        let message = kernel.bus.lock().receive(self.task)?;
        Some(pinecone::from_bytes(&message).expect("malformed delegate request"))
    }

    pub fn expect_request(&self, kernel: &mut Kernel) -> DelegateRequest {
        self.next_request(kernel).expect("no pending delegate request")
    }

    /// Access the transaction storage the way the driver would: from
    /// within its own address space
    pub fn with_storage<R>(&self, kernel: &Kernel, f: impl FnOnce(&mut TransactionStorage) -> R) -> R {
        let _space = kernel.spaces.enter(self.space);
        f(unsafe { &mut *self.storage })
    }

    /// Report a transaction as finished, as the driver's reply path does
    pub fn complete(&self, kernel: &mut Kernel, transaction: TransactionId) {
        let mut data = FsSetTransactionStatusData {
            transaction,
            status: TransactionStatus::Finished,
        };
        let ctx = kernel.ctx(self.task, &mut data);
        let flow =
            syscall::fs_set_transaction_status(&kernel.vfs, &mut kernel.sched, self.task, ctx);
        assert_eq!(flow, CallFlow::Completed);
    }

    /// Create (or update) a virtual node, as drivers do while serving
    /// discovery and refresh requests
    pub fn create_node(
        &self, kernel: &mut Kernel, parent: NodeId, name: &str, kind: NodeKind, phys: PhysId,
    ) -> NodeId {
        let name_bytes = name.as_bytes().to_vec();
        let mut data = FsCreateNodeData {
            parent_id: parent,
            name: name_bytes.as_ptr(),
            name_len: name_bytes.len(),
            kind,
            phys_id: phys,
            created_id: NodeId::ZERO,
            status: kyro_abi::fs::CreateNodeStatus::FailedNoParent,
        };
        let ctx = kernel.ctx(self.task, &mut data);
        let flow = syscall::fs_create_node(&kernel.vfs, &mut kernel.sched, self.task, ctx);
        assert_eq!(flow, CallFlow::Completed);
        data.created_id
    }
}
