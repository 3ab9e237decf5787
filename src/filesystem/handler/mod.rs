//! Transaction handlers.
//!
//! A handler is a temporary object that accompanies one operation across
//! one or more transactions. It holds the values the stateless delegate
//! needs: the delegate sets output fields at request time (synchronous
//! delegates) or lets the handler's finish step pull them out of the
//! delegate-private side (asynchronous delegates). The finish step then
//! does whatever the operation requires next: filling the caller's data
//! struct, mapping a descriptor, or starting a follow-up handler.
//!
//! Ownership of the boxed handler travels with the transaction: `start`
//! moves it into a waiter when the task parks, and `finish` may move it
//! (or a successor) into a fresh waiter when the operation chains.

mod close;
mod directory;
mod discovery;
mod get_length;
mod open;
mod read;
mod write;

pub use self::close::CloseHandler;
pub use self::directory::{DirectoryRefreshHandler, ReadDirectoryHandler};
pub use self::discovery::{DiscoveryAction, DiscoveryHandler};
pub use self::get_length::{GetLengthHandler, LengthAfterwork};
pub use self::open::OpenHandler;
pub use self::read::ReadHandler;
pub use self::write::WriteHandler;

use alloc::boxed::Box;
use alloc::sync::Arc;

use kyro_abi::fs::{TransactionId, TransactionStatus};
use kyro_abi::TaskId;

use crate::multitasking::{Scheduler, TransactionWaiter};

use super::delegate::{Delegate, DelegateId};
use super::Vfs;

/// Outcome of starting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    /// The operation could not even be dispatched
    Failed,
    /// The delegate completed synchronously; no waiter was needed
    ImmediateFinish,
    /// A waiter was parked on the requesting task
    WithWaiter,
}

/// Outcome of finishing a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishStatus {
    /// The operation is complete; the task wakes up
    Done,
    /// The same handler started another transaction and stays parked
    RepeatSameHandler,
    /// A follow-up handler took over; the task stays parked
    ContinueNewHandler,
}

/// Every handler shape
#[derive(Debug)]
pub enum Handler {
    Discovery(DiscoveryHandler),
    Open(OpenHandler),
    Close(CloseHandler),
    Read(ReadHandler),
    Write(WriteHandler),
    GetLength(GetLengthHandler),
    DirectoryRefresh(DirectoryRefreshHandler),
    ReadDirectory(ReadDirectoryHandler),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    Discovery,
    Open,
    Close,
    Read,
    Write,
    GetLength,
    DirectoryRefresh,
    ReadDirectory,
}

impl Handler {
    fn kind(&self) -> HandlerKind {
        match self {
            Handler::Discovery(_) => HandlerKind::Discovery,
            Handler::Open(_) => HandlerKind::Open,
            Handler::Close(_) => HandlerKind::Close,
            Handler::Read(_) => HandlerKind::Read,
            Handler::Write(_) => HandlerKind::Write,
            Handler::GetLength(_) => HandlerKind::GetLength,
            Handler::DirectoryRefresh(_) => HandlerKind::DirectoryRefresh,
            Handler::ReadDirectory(_) => HandlerKind::ReadDirectory,
        }
    }

    /// Marks the next start as a retry of `transaction`; the delegate then
    /// reuses the id instead of allocating a fresh one
    pub fn prepare_repeat(&mut self, transaction: TransactionId) {
        match self {
            Handler::Read(h) => h.repeat_transaction = Some(transaction),
            Handler::Write(h) => h.repeat_transaction = Some(transaction),
            // the remaining operations never report Repeat
            _ => {},
        }
    }
}

/// Starts the handler's transaction. When the task must sleep, the
/// handler is moved into a waiter parked on the task.
pub fn start_transaction(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, handler: Box<Handler>,
) -> StartStatus {
    match handler.kind() {
        HandlerKind::Discovery => discovery::start(vfs, sched, task, handler),
        HandlerKind::Open => open::start(vfs, sched, task, handler),
        HandlerKind::Close => close::start(vfs, sched, task, handler),
        HandlerKind::Read => read::start(vfs, sched, task, handler),
        HandlerKind::Write => write::start(vfs, sched, task, handler),
        HandlerKind::GetLength => get_length::start(vfs, sched, task, handler),
        HandlerKind::DirectoryRefresh => directory::start_refresh(vfs, sched, task, handler),
        HandlerKind::ReadDirectory => directory::start_read(vfs, sched, task, handler),
    }
}

/// Runs the handler's finish step after the waiter observed `Finished`
pub fn finish_transaction(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, handler: Box<Handler>,
    delegate: Option<DelegateId>,
) -> FinishStatus {
    match handler.kind() {
        HandlerKind::Discovery => discovery::finish(vfs, sched, task, handler, delegate),
        HandlerKind::Open => open::finish(vfs, sched, task, handler, delegate),
        HandlerKind::Close => close::finish(vfs, sched, task, handler, delegate),
        HandlerKind::Read => read::finish(vfs, sched, task, handler, delegate),
        HandlerKind::Write => write::finish(vfs, sched, task, handler, delegate),
        HandlerKind::GetLength => get_length::finish(vfs, sched, task, handler, delegate),
        HandlerKind::DirectoryRefresh => {
            directory::finish_refresh(vfs, sched, task, handler, delegate)
        },
        HandlerKind::ReadDirectory => directory::finish_read(vfs, sched, task, handler, delegate),
    }
}

/// Shared resolver for the delegate serving a node
pub(super) fn delegate_arc(vfs: &Vfs, id: DelegateId) -> Arc<Delegate> {
    vfs.delegates
        .lock()
        .get(id)
        .expect("delegate disappeared while in use")
}

/// After a request, either the transaction already finished (synchronous
/// delegate) and the handler finishes inline, or the task parks on a
/// waiter bound to the transaction.
pub(super) fn settle(
    vfs: &Vfs, sched: &mut Scheduler, task: TaskId, handler: Box<Handler>, tx: TransactionId,
    delegate: DelegateId,
) -> StartStatus {
    let status = vfs.transactions.lock().get(tx);
    match status {
        TransactionStatus::Finished => {
            let finish = finish_transaction(vfs, sched, task, handler, Some(delegate));
            vfs.transactions.lock().remove(tx);
            match finish {
                FinishStatus::Done => StartStatus::ImmediateFinish,
                _ => StartStatus::WithWaiter,
            }
        },
        TransactionStatus::Waiting | TransactionStatus::Repeat => {
            sched.wait(task, TransactionWaiter::new(handler, tx, Some(delegate)));
            StartStatus::WithWaiter
        },
    }
}
