mod common;

use common::Kernel;
use kyro_abi::fs::{CloseStatus, ClonefdStatus, ReadStatus, WriteStatus, PIPE_DEFAULT_CAPACITY};
use kyro_abi::syscall::FsReadData;
use kyro_abi::SecurityLevel;
use kyro_vfs::syscall::{self, CallFlow};

#[test]
fn pipe_transfers_bytes_in_order() {
    let mut kernel = Kernel::new();
    let task = kernel.spawn(SecurityLevel::Application);

    let (write_fd, read_fd) = kernel.pipe(task, true);
    assert!(write_fd.as_i64() >= 3);
    assert!(read_fd.as_i64() >= 3);

    let (status, count) = kernel.write(task, write_fd, b"ping");
    assert_eq!(status, WriteStatus::Successful);
    assert_eq!(count, 4);

    let mut buf = [0u8; 4];
    let (status, count) = kernel.read(task, read_fd, &mut buf);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, 4);
    assert_eq!(&buf, b"ping");

    // drained and no other process holds a reference: end of stream
    assert_eq!(kernel.close(task, write_fd), CloseStatus::Successful);
    let (status, count) = kernel.read(task, read_fd, &mut buf);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, 0);
}

#[test]
fn pipe_fifo_across_chunked_reads() {
    let mut kernel = Kernel::new();
    let task = kernel.spawn(SecurityLevel::Application);
    let (write_fd, read_fd) = kernel.pipe(task, true);

    kernel.write(task, write_fd, b"abcdef");
    kernel.write(task, write_fd, b"ghi");

    let mut collected = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        let (status, count) = kernel.read(task, read_fd, &mut buf);
        assert_eq!(status, ReadStatus::Successful);
        if count == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..count as usize]);
        if collected.len() >= 9 {
            break;
        }
    }
    assert_eq!(collected, b"abcdefghi");
}

#[test]
fn blocking_read_waits_for_a_writer() {
    let mut kernel = Kernel::new();
    let reader = kernel.spawn(SecurityLevel::Application);
    let writer = kernel.spawn(SecurityLevel::Application);
    let reader_pid = kernel.pid_of(reader);
    let writer_pid = kernel.pid_of(writer);

    let (write_fd, read_fd) = kernel.pipe(reader, true);

    // hand the write end to the writer process, drop the reader's copy
    let (status, writer_fd) = kernel.clonefd(reader, write_fd, reader_pid, None, writer_pid);
    assert_eq!(status, ClonefdStatus::Successful);
    assert_eq!(kernel.close(reader, write_fd), CloseStatus::Successful);

    // the read parks: the pipe is empty but the writer side is alive
    let mut buf = [0u8; 4];
    let mut data = FsReadData {
        fd: read_fd,
        buffer: buf.as_mut_ptr(),
        length: buf.len() as i64,
        result: -1,
        status: ReadStatus::Error,
    };
    let ctx = kernel.ctx(reader, &mut data);
    let flow = syscall::fs_read(&kernel.vfs, &mut kernel.sched, reader, ctx);
    assert_eq!(flow, CallFlow::Parked);

    kernel.sched.schedule(&kernel.vfs);
    kernel.sched.schedule(&kernel.vfs);
    assert!(!kernel.sched.is_runnable(reader));

    let (status, count) = kernel.write(writer, writer_fd, b"hi");
    assert_eq!(status, WriteStatus::Successful);
    assert_eq!(count, 2);

    kernel.pump(reader);
    assert_eq!(data.status, ReadStatus::Successful);
    assert_eq!(data.result, 2);
    assert_eq!(&buf[..2], b"hi");
}

#[test]
fn nonblocking_read_reports_again() {
    let mut kernel = Kernel::new();
    let reader = kernel.spawn(SecurityLevel::Application);
    let writer = kernel.spawn(SecurityLevel::Application);
    let reader_pid = kernel.pid_of(reader);
    let writer_pid = kernel.pid_of(writer);

    let (write_fd, read_fd) = kernel.pipe(reader, false);
    let (_, writer_fd) = kernel.clonefd(reader, write_fd, reader_pid, None, writer_pid);
    kernel.close(reader, write_fd);

    let mut buf = [0u8; 1];
    let (status, _) = kernel.read(reader, read_fd, &mut buf);
    assert_eq!(status, ReadStatus::Again);

    kernel.write(writer, writer_fd, b"x");
    let (status, count) = kernel.read(reader, read_fd, &mut buf);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, 1);
    assert_eq!(&buf, b"x");
}

#[test]
fn blocking_write_waits_for_space() {
    let mut kernel = Kernel::new();
    let writer = kernel.spawn(SecurityLevel::Application);
    let reader = kernel.spawn(SecurityLevel::Application);
    let writer_pid = kernel.pid_of(writer);
    let reader_pid = kernel.pid_of(reader);

    let (write_fd, read_fd) = kernel.pipe(writer, true);
    let (_, reader_fd) = kernel.clonefd(writer, read_fd, writer_pid, None, reader_pid);
    kernel.close(writer, read_fd);

    let fill = vec![7u8; PIPE_DEFAULT_CAPACITY];
    let (status, count) = kernel.write(writer, write_fd, &fill);
    assert_eq!(status, WriteStatus::Successful);
    assert_eq!(count, PIPE_DEFAULT_CAPACITY as i64);

    // no room left: the writer parks until the reader drains a byte
    let payload = [42u8];
    let mut data = kyro_abi::syscall::FsWriteData {
        fd: write_fd,
        buffer: payload.as_ptr(),
        length: 1,
        result: -1,
        status: WriteStatus::Error,
    };
    let ctx = kernel.ctx(writer, &mut data);
    let flow = syscall::fs_write(&kernel.vfs, &mut kernel.sched, writer, ctx);
    assert_eq!(flow, CallFlow::Parked);
    kernel.sched.schedule(&kernel.vfs);
    assert!(!kernel.sched.is_runnable(writer));

    let mut buf = [0u8; 16];
    let (status, count) = kernel.read(reader, reader_fd, &mut buf);
    assert_eq!(status, ReadStatus::Successful);
    assert_eq!(count, 16);

    kernel.pump(writer);
    assert_eq!(data.status, WriteStatus::Successful);
    assert_eq!(data.result, 1);
}

#[test]
fn nonblocking_write_accepts_what_fits() {
    let mut kernel = Kernel::new();
    let writer = kernel.spawn(SecurityLevel::Application);
    let reader = kernel.spawn(SecurityLevel::Application);
    let writer_pid = kernel.pid_of(writer);
    let reader_pid = kernel.pid_of(reader);

    let (write_fd, read_fd) = kernel.pipe(writer, false);
    let (_, _reader_fd) = kernel.clonefd(writer, read_fd, writer_pid, None, reader_pid);

    let fill = vec![1u8; PIPE_DEFAULT_CAPACITY - 2];
    kernel.write(writer, write_fd, &fill);

    // only two bytes fit
    let (status, count) = kernel.write(writer, write_fd, b"abcd");
    assert_eq!(status, WriteStatus::Successful);
    assert_eq!(count, 2);

    // and now nothing does
    let (status, _) = kernel.write(writer, write_fd, b"x");
    assert_eq!(status, WriteStatus::Again);
}

#[test]
fn cancelled_read_wakes_with_last_status() {
    let mut kernel = Kernel::new();
    let reader = kernel.spawn(SecurityLevel::Application);
    let writer = kernel.spawn(SecurityLevel::Application);
    let reader_pid = kernel.pid_of(reader);
    let writer_pid = kernel.pid_of(writer);

    let (write_fd, read_fd) = kernel.pipe(reader, true);
    kernel.clonefd(reader, write_fd, reader_pid, None, writer_pid);
    kernel.close(reader, write_fd);

    let mut buf = [0u8; 4];
    let mut data = FsReadData {
        fd: read_fd,
        buffer: buf.as_mut_ptr(),
        length: buf.len() as i64,
        result: -1,
        status: ReadStatus::Error,
    };
    let ctx = kernel.ctx(reader, &mut data);
    let flow = syscall::fs_read(&kernel.vfs, &mut kernel.sched, reader, ctx);
    assert_eq!(flow, CallFlow::Parked);

    // attach a break condition, then trip it
    let mut break_byte = 0u8;
    let byte_ptr = &mut break_byte as *mut u8;
    let condition =
        kyro_vfs::memory::Contextual::new(byte_ptr as *const u8, kernel.space_of(reader));
    kernel.sched.set_break_condition(reader, condition);

    kernel.sched.schedule(&kernel.vfs);
    assert!(!kernel.sched.is_runnable(reader));

    unsafe { *byte_ptr = 1 };
    kernel.pump(reader);

    // the handler finished with the last observed (unsuccessful) status
    assert_eq!(data.result, -1);
    assert_eq!(data.status, ReadStatus::Error);
}
