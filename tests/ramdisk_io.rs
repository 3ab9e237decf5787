mod common;

use common::Kernel;
use kyro_abi::fs::{
    CloseStatus, LengthStatus, OpenFlags, OpenStatus, ReadStatus, SeekMode, SeekStatus,
    TellStatus, WriteStatus,
};
use kyro_abi::SecurityLevel;

fn kernel_with_hello() -> Kernel {
    let kernel = Kernel::new();
    {
        let mut ramdisk = kernel.vfs.ramdisk.lock();
        let root = ramdisk.root();
        let folder = ramdisk.add_folder(root, "ramdisk");
        ramdisk.add_file(folder, "hello.txt", b"hello world\n".to_vec());
    }
    kernel
}

#[test]
fn open_read_close_existing_file() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    let (status, fd) = kernel.open(task, "/ramdisk/hello.txt", OpenFlags::empty());
    assert_eq!(status, OpenStatus::Successful);
    assert!(fd.as_i64() >= 3);

    let mut buf = [0u8; 12];
    let (status, count) = kernel.read(task, fd, &mut buf);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, 12);
    assert_eq!(&buf, b"hello world\n");

    let (status, offset) = kernel.tell(task, fd);
    assert_eq!(status, TellStatus::Successful);
    assert_eq!(offset, 12);

    // reading at the end yields zero bytes and leaves the offset alone
    let mut byte = [0u8; 1];
    let (status, count) = kernel.read(task, fd, &mut byte);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, 0);
    assert_eq!(kernel.tell(task, fd).1, 12);

    assert_eq!(kernel.close(task, fd), CloseStatus::Successful);
    assert_eq!(kernel.close(task, fd), CloseStatus::InvalidFd);
}

#[test]
fn open_with_create_writes_and_reads_back() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    let (status, fd) = kernel.open(task, "/ramdisk/new.txt", OpenFlags::CREATE);
    assert_eq!(status, OpenStatus::Successful);
    assert!(fd.as_i64() >= 3);

    let (status, count) = kernel.write(task, fd, b"abc");
    assert_eq!(status, WriteStatus::Successful);
    assert_eq!(count, 3);

    let (status, length) = kernel.length_fd(task, fd);
    assert_eq!(status, LengthStatus::Successful);
    assert_eq!(length, 3);

    let (status, position) = kernel.seek(task, fd, 1, SeekMode::Set);
    assert_eq!(status, SeekStatus::Successful);
    assert_eq!(position, 1);

    let mut buf = [0u8; 2];
    let (status, count) = kernel.read(task, fd, &mut buf);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, 2);
    assert_eq!(&buf, b"bc");
}

#[test]
fn open_missing_path_reports_not_found() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    let (status, fd) = kernel.open(task, "/nowhere/x", OpenFlags::empty());
    assert_eq!(status, OpenStatus::NotFound);
    assert_eq!(fd.as_i64(), -1);
}

#[test]
fn write_round_trip() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    let (_, fd) = kernel.open(task, "/ramdisk/roundtrip.bin", OpenFlags::CREATE);
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();

    let (status, count) = kernel.write(task, fd, &payload);
    assert_eq!(status, WriteStatus::Successful);
    assert_eq!(count, payload.len() as i64);

    assert_eq!(kernel.seek(task, fd, 0, SeekMode::Set).1, 0);
    let mut back = vec![0u8; payload.len()];
    let (status, count) = kernel.read(task, fd, &mut back);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, payload.len() as i64);
    assert_eq!(back, payload);
}

#[test]
fn seek_clamps_to_file_bounds() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);
    let (_, fd) = kernel.open(task, "/ramdisk/hello.txt", OpenFlags::empty());

    // beyond the end clamps to the length
    let (status, position) = kernel.seek(task, fd, 1000, SeekMode::Set);
    assert_eq!(status, SeekStatus::Successful);
    assert_eq!(position, 12);

    // below zero clamps to zero
    let (status, position) = kernel.seek(task, fd, 20, SeekMode::End);
    assert_eq!(status, SeekStatus::Successful);
    assert_eq!(position, 0);

    // tell after seek(n, Set) is min(n, length)
    for n in &[0i64, 5, 12, 30] {
        kernel.seek(task, fd, *n, SeekMode::Set);
        assert_eq!(kernel.tell(task, fd).1, (*n).min(12));
    }

    let (status, position) = kernel.seek(task, fd, 4, SeekMode::Cur);
    assert_eq!(status, SeekStatus::Successful);
    assert_eq!(position, 12);
}

#[test]
fn append_flag_positions_writes_at_the_end() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    let (_, fd) = kernel.open(task, "/ramdisk/log.txt", OpenFlags::CREATE | OpenFlags::APPEND);
    kernel.write(task, fd, b"one");
    kernel.seek(task, fd, 0, SeekMode::Set);
    kernel.write(task, fd, b"two");

    assert_eq!(kernel.length_fd(task, fd).1, 6);
    kernel.seek(task, fd, 0, SeekMode::Set);
    let mut buf = [0u8; 6];
    kernel.read(task, fd, &mut buf);
    assert_eq!(&buf, b"onetwo");
}

#[test]
fn truncate_applies_only_off_the_archive() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    // still archive-backed: truncate is a no-op
    let (_, fd) = kernel.open(task, "/ramdisk/hello.txt", OpenFlags::TRUNCATE);
    assert_eq!(kernel.length_fd(task, fd).1, 12);

    // writing moves the data off the archive; now truncate empties it
    kernel.seek(task, fd, 0, SeekMode::End);
    kernel.write(task, fd, b"!");
    assert_eq!(kernel.length_fd(task, fd).1, 13);
    kernel.close(task, fd);

    let (_, fd) = kernel.open(task, "/ramdisk/hello.txt", OpenFlags::TRUNCATE);
    assert_eq!(kernel.length_fd(task, fd).1, 0);
}

#[test]
fn length_by_path_and_missing_paths() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    let (status, length) = kernel.length_path(task, "/ramdisk/hello.txt");
    assert_eq!(status, LengthStatus::Successful);
    assert_eq!(length, 12);

    let (status, length) = kernel.length_path(task, "/ramdisk/absent.txt");
    assert_eq!(status, LengthStatus::NotFound);
    assert_eq!(length, -1);
}

#[test]
fn read_and_write_reject_unknown_descriptors() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    let bogus = kyro_abi::fs::FileDescriptor::from_i64(77);
    let mut buf = [0u8; 4];
    assert_eq!(kernel.read(task, bogus, &mut buf).0, ReadStatus::InvalidFd);
    assert_eq!(kernel.write(task, bogus, b"zz").0, WriteStatus::InvalidFd);
    assert_eq!(kernel.tell(task, bogus).0, TellStatus::InvalidFd);
    assert_eq!(kernel.length_fd(task, bogus).0, LengthStatus::InvalidFd);
}

#[test]
fn relative_paths_resolve_against_working_directory() {
    let mut kernel = kernel_with_hello();
    let task = kernel.spawn(SecurityLevel::Application);

    use kyro_abi::fs::SetWorkingDirectoryStatus;
    assert_eq!(kernel.set_cwd(task, "/ramdisk"), SetWorkingDirectoryStatus::Successful);
    assert_eq!(kernel.get_cwd(task), "/ramdisk");

    let (status, fd) = kernel.open(task, "hello.txt", OpenFlags::empty());
    assert_eq!(status, OpenStatus::Successful);
    assert!(fd.as_i64() >= 3);

    // a file is not a valid working directory
    assert_eq!(
        kernel.set_cwd(task, "hello.txt"),
        SetWorkingDirectoryStatus::NotAFolder
    );
    assert_eq!(
        kernel.set_cwd(task, "/missing"),
        SetWorkingDirectoryStatus::NotFound
    );
}
