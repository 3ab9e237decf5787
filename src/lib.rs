//! kyro-vfs: the virtual filesystem core of the kyro microkernel.
//!
//! The filesystem is a uniform node graph overlaying multiple storage
//! providers. Each subtree is served by a *delegate* (ramdisk, pipe store,
//! or a user-space driver task); every delegate operation is an
//! asynchronous *transaction* that parks the requesting task on a waiter
//! until the delegate reports completion.
//!
//! Component dependency order, leaf first: pipe store, descriptor tables,
//! node graph, delegates, transaction engine, handlers, waiter.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate alloc;

pub mod filesystem;
pub mod ipc;
pub mod memory;
pub mod multitasking;
pub mod syscall;

use alloc::sync::Arc;
use lazy_static::lazy_static;
use spin::Mutex;

use self::filesystem::Vfs;
use self::ipc::MessageBus;
use self::memory::AddressSpaces;
use self::multitasking::Scheduler;

lazy_static! {
    /// Address spaces known to the kernel
    pub static ref ADDRESS_SPACES: Arc<AddressSpaces> = Arc::new(AddressSpaces::new());

    /// The inter-task message bus
    pub static ref MESSAGE_BUS: Arc<Mutex<MessageBus>> = Arc::new(Mutex::new(MessageBus::new()));

    /// The virtual filesystem
    pub static ref VFS: Vfs = Vfs::new(ADDRESS_SPACES.clone(), MESSAGE_BUS.clone());

    /// The task scheduler
    pub static ref SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new(ADDRESS_SPACES.clone()));
}
