mod common;

use common::Kernel;
use kyro_abi::fs::{
    ClonefdStatus, OpenFlags, OpenStatus, ReadStatus, SeekMode, StatStatus, WriteStatus,
};
use kyro_abi::syscall::{FsFstatData, FsStatData, GetWorkingDirectoryData};
use kyro_abi::SecurityLevel;
use kyro_vfs::filesystem::PipeId;
use kyro_vfs::syscall;

fn kernel_with_file() -> Kernel {
    let kernel = Kernel::new();
    {
        let mut ramdisk = kernel.vfs.ramdisk.lock();
        let root = ramdisk.root();
        let folder = ramdisk.add_folder(root, "ramdisk");
        ramdisk.add_file(folder, "data.bin", vec![0u8; 64]);
    }
    kernel
}

#[test]
fn cloned_descriptor_has_independent_offset() {
    let mut kernel = kernel_with_file();
    let task = kernel.spawn(SecurityLevel::Application);
    let pid = kernel.pid_of(task);

    let (status, src) = kernel.open(task, "/ramdisk/data.bin", OpenFlags::empty());
    assert_eq!(status, OpenStatus::Successful);
    kernel.seek(task, src, 8, SeekMode::Set);

    let (status, dst) = kernel.clonefd(task, src, pid, None, pid);
    assert_eq!(status, ClonefdStatus::Successful);
    assert_ne!(src, dst);

    // the clone starts at the source offset
    assert_eq!(kernel.tell(task, dst).1, 8);

    // writing through the clone moves only the clone
    let (status, count) = kernel.write(task, dst, b"xyz");
    assert_eq!(status, WriteStatus::Successful);
    assert_eq!(count, 3);
    assert_eq!(kernel.tell(task, dst).1, 11);
    assert_eq!(kernel.tell(task, src).1, 8);
}

#[test]
fn clonefd_replaces_an_existing_target_descriptor() {
    let mut kernel = kernel_with_file();
    let a = kernel.spawn(SecurityLevel::Application);
    let b = kernel.spawn(SecurityLevel::Application);
    let pid_a = kernel.pid_of(a);
    let pid_b = kernel.pid_of(b);

    let (_, source) = kernel.open(a, "/ramdisk/data.bin", OpenFlags::empty());
    let (_, occupied) = kernel.open(b, "/ramdisk/data.bin", OpenFlags::empty());

    let (status, result) = kernel.clonefd(a, source, pid_a, Some(occupied), pid_b);
    assert_eq!(status, ClonefdStatus::Successful);
    assert_eq!(result, occupied);

    // still exactly one descriptor with that id in the target process
    let mut buf = [0u8; 4];
    assert_eq!(kernel.read(b, occupied, &mut buf).0, ReadStatus::Successful);
}

#[test]
fn clonefd_rejects_unknown_sources() {
    let mut kernel = kernel_with_file();
    let task = kernel.spawn(SecurityLevel::Application);
    let pid = kernel.pid_of(task);

    let bogus = kyro_abi::fs::FileDescriptor::from_i64(55);
    let (status, result) = kernel.clonefd(task, bogus, pid, None, pid);
    assert_eq!(status, ClonefdStatus::InvalidSourceFd);
    assert_eq!(result.as_i64(), -1);
}

#[test]
fn fork_clones_descriptors_keeping_values() {
    let mut kernel = kernel_with_file();
    let parent = kernel.spawn(SecurityLevel::Application);
    let child = kernel.spawn(SecurityLevel::Application);
    let parent_pid = kernel.pid_of(parent);
    let child_pid = kernel.pid_of(child);

    let (_, fd) = kernel.open(parent, "/ramdisk/data.bin", OpenFlags::empty());
    kernel.seek(parent, fd, 5, SeekMode::Set);

    kernel.vfs.process_forked(parent_pid, child_pid);

    // same descriptor value, same node, same offset in the fork
    assert_eq!(kernel.tell(child, fd).1, 5);
    let parent_node = kernel.vfs.node_for_descriptor(parent_pid, fd).unwrap().0;
    let child_node = kernel.vfs.node_for_descriptor(child_pid, fd).unwrap().0;
    assert_eq!(parent_node, child_node);
}

#[test]
fn process_exit_releases_descriptors_and_pipes() {
    let mut kernel = kernel_with_file();
    let a = kernel.spawn(SecurityLevel::Application);
    let b = kernel.spawn(SecurityLevel::Application);
    let pid_a = kernel.pid_of(a);
    let pid_b = kernel.pid_of(b);

    let (write_fd, read_fd) = kernel.pipe(a, true);
    kernel.open(a, "/ramdisk/data.bin", OpenFlags::empty());
    kernel.clonefd(a, read_fd, pid_a, None, pid_b);

    let pipe_node = kernel.vfs.node_for_descriptor(pid_a, write_fd).unwrap().0;
    let pipe_id = {
        let nodes = kernel.vfs.nodes.lock();
        PipeId::from(nodes.node(pipe_node).unwrap().phys_id.unwrap())
    };

    // a exits; its references are dropped, but b still holds the pipe
    kernel.vfs.process_closed(pid_a);
    kernel.sched.remove_process(pid_a);
    assert!(kernel.vfs.descriptors.lock().fds(pid_a).is_empty());
    assert!(kernel.vfs.pipes.lock().get(pipe_id).is_some());

    // once b exits too, the pipe and its node are gone
    kernel.vfs.process_closed(pid_b);
    kernel.sched.remove_process(pid_b);
    assert!(kernel.vfs.pipes.lock().get(pipe_id).is_none());
    assert!(kernel.vfs.nodes.lock().node(pipe_node).is_none());
}

#[test]
fn stat_and_fstat_are_reserved() {
    let mut kernel = kernel_with_file();
    let task = kernel.spawn(SecurityLevel::Application);

    let path = b"/ramdisk/data.bin".to_vec();
    let mut stat = FsStatData {
        path: path.as_ptr(),
        path_len: path.len(),
        follow_symlinks: true,
        result: 0,
        status: StatStatus::Unsupported,
    };
    let ctx = kernel.ctx(task, &mut stat);
    syscall::fs_stat(&kernel.vfs, &mut kernel.sched, task, ctx);
    assert_eq!(stat.result, -1);
    assert_eq!(stat.status, StatStatus::Unsupported);

    let (_, fd) = kernel.open(task, "/ramdisk/data.bin", OpenFlags::empty());
    let mut fstat = FsFstatData {
        fd,
        result: 0,
        status: StatStatus::Unsupported,
    };
    let ctx = kernel.ctx(task, &mut fstat);
    syscall::fs_fstat(&kernel.vfs, &mut kernel.sched, task, ctx);
    assert_eq!(fstat.result, -1);
    assert_eq!(fstat.status, StatStatus::Unsupported);
}

#[test]
fn get_working_directory_reports_undersized_buffers() {
    let mut kernel = kernel_with_file();
    let task = kernel.spawn(SecurityLevel::Application);
    kernel.set_cwd(task, "/ramdisk");

    let mut buffer = [0u8; 4];
    let mut data = GetWorkingDirectoryData {
        buffer: buffer.as_mut_ptr(),
        buffer_len: buffer.len(),
        result_len: 0,
        status: kyro_abi::fs::GetWorkingDirectoryStatus::Successful,
    };
    let ctx = kernel.ctx(task, &mut data);
    syscall::get_working_directory(&kernel.vfs, &mut kernel.sched, task, ctx);
    assert_eq!(
        data.status,
        kyro_abi::fs::GetWorkingDirectoryStatus::SizeExceeded
    );
    assert_eq!(data.result_len, "/ramdisk".len());
}
