//! Minimal task and process model, plus the scheduler contract the
//! filesystem consumes: `wait(waiter)` parks the current task and
//! `schedule()` polls every parked task's waiter once per round.

pub mod process;
mod scheduler;
mod waiter;

pub use self::process::Process;
pub use self::scheduler::{Scheduler, Task};
pub use self::waiter::TransactionWaiter;
pub use kyro_abi::{ProcessId, SecurityLevel, TaskId};
