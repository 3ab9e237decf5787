use alloc::boxed::Box;

use kyro_abi::fs::{TransactionId, TransactionStatus};

use crate::filesystem::delegate::DelegateId;
use crate::filesystem::handler::{self, FinishStatus, Handler, StartStatus};
use crate::filesystem::Vfs;
use crate::memory::Contextual;

use super::scheduler::Scheduler;
use super::TaskId;

/// Keeps a task suspended until a transaction is finished.
///
/// The scheduler polls the waiter on every resume attempt. A `Waiting`
/// transaction keeps the task parked; `Repeat` restarts the same handler
/// with the same transaction id; `Finished` runs the handler's finish
/// step, which may complete the call, retry with the same handler, or
/// continue with a new one.
#[derive(Debug)]
pub struct TransactionWaiter {
    handler: Box<Handler>,
    transaction: TransactionId,
    delegate: Option<DelegateId>,
    /// When set, a non-zero byte releases the waiter even if the
    /// transaction never finishes; the handler still observes the last
    /// status so the call data is filled consistently.
    break_condition: Option<Contextual<*const u8>>,
}
impl TransactionWaiter {
    pub fn new(handler: Box<Handler>, transaction: TransactionId, delegate: Option<DelegateId>) -> Self {
        Self {
            handler,
            transaction,
            delegate,
            break_condition: None,
        }
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    pub(crate) fn set_break_condition(&mut self, condition: Contextual<*const u8>) {
        self.break_condition = Some(condition);
    }

    fn break_requested(&self, vfs: &Vfs) -> bool {
        match &self.break_condition {
            None => false,
            Some(condition) => {
                let _space = vfs.spaces.enter(condition.space());
                unsafe { *condition.get(vfs.spaces.current()) != 0 }
            },
        }
    }

    /// One poll from the scheduler, entered in the waiting task's address
    /// space. Re-parks the task through `sched.wait` when it must stay
    /// suspended; otherwise the task becomes runnable.
    pub fn poll(mut self, vfs: &Vfs, sched: &mut Scheduler, task: TaskId) {
        let transaction = self.transaction;
        let delegate = self.delegate;
        let status = vfs.transactions.lock().get(transaction);

        if self.break_requested(vfs) {
            log::debug!(
                "transaction {:?} cancelled while {:?}, finishing with last observed status",
                transaction,
                status
            );
            let _ = handler::finish_transaction(vfs, sched, task, self.handler, delegate);
            vfs.transactions.lock().remove(transaction);
            return;
        }

        match status {
            TransactionStatus::Waiting => {
                sched.wait(task, self);
            },
            TransactionStatus::Repeat => {
                // the restart parks a fresh waiter; the break condition
                // belongs to the task's wait and survives the retry
                let break_condition = self.break_condition.take();
                self.handler.prepare_repeat(transaction);
                match handler::start_transaction(vfs, sched, task, self.handler) {
                    StartStatus::WithWaiter | StartStatus::ImmediateFinish => {
                        if let Some(condition) = break_condition {
                            sched.set_break_condition(task, condition);
                        }
                    },
                    StartStatus::Failed => {
                        log::warn!("failed to repeat transaction {:?}", transaction);
                        vfs.transactions.lock().remove(transaction);
                    },
                }
            },
            TransactionStatus::Finished => {
                let _finish: FinishStatus =
                    handler::finish_transaction(vfs, sched, task, self.handler, delegate);
                vfs.transactions.lock().remove(transaction);
                // on RepeatSameHandler / ContinueNewHandler the finish path
                // has already parked the task on a fresh waiter
            },
        }
    }
}
