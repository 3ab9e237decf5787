use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;

use kyro_abi::{ProcessId, SecurityLevel, TaskId};

use crate::filesystem::Vfs;
use crate::memory::{AddressSpaces, Contextual};

use super::process::Process;
use super::waiter::TransactionWaiter;

#[derive(Debug)]
enum TaskState {
    Runnable,
    Blocked(TransactionWaiter),
}

/// A kernel task (thread)
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub process: ProcessId,
    state: TaskState,
}
impl Task {
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Runnable)
    }
}

/// Cooperative scheduler. The filesystem uses exactly two of its
/// operations: `wait` parks a task on a transaction waiter, and `schedule`
/// polls every parked task's waiter in that task's address space.
#[derive(Debug)]
pub struct Scheduler {
    spaces: Arc<AddressSpaces>,
    processes: HashMap<ProcessId, Process>,
    tasks: HashMap<TaskId, Task>,
    next_pid: ProcessId,
    next_tid: TaskId,
}
impl Scheduler {
    pub fn new(spaces: Arc<AddressSpaces>) -> Self {
        Self {
            spaces,
            processes: HashMap::new(),
            tasks: HashMap::new(),
            next_pid: ProcessId::first(),
            next_tid: TaskId::first(),
        }
    }

    /// Creates a new process with its own address space and one main task,
    /// returning the task id
    pub fn spawn(&mut self, security_level: SecurityLevel) -> TaskId {
        let pid = self.next_pid;
        self.next_pid = pid.next();
        let space = self.spaces.allocate();
        self.processes
            .insert(pid, Process::new(pid, space, security_level));

        let tid = self.next_tid;
        self.next_tid = tid.next();
        self.tasks.insert(
            tid,
            Task {
                id: tid,
                process: pid,
                state: TaskState::Runnable,
            },
        );
        log::debug!("spawned process {} (main task {})", pid, tid);
        tid
    }

    pub fn task(&self, task: TaskId) -> &Task {
        self.tasks.get(&task).expect("No such task")
    }

    pub fn process(&self, pid: ProcessId) -> &Process {
        self.processes.get(&pid).expect("No such process")
    }

    pub fn process_mut(&mut self, pid: ProcessId) -> &mut Process {
        self.processes.get_mut(&pid).expect("No such process")
    }

    pub fn process_exists(&self, pid: ProcessId) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn process_of(&self, task: TaskId) -> &Process {
        self.process(self.task(task).process)
    }

    pub fn process_of_mut(&mut self, task: TaskId) -> &mut Process {
        let pid = self.task(task).process;
        self.process_mut(pid)
    }

    pub fn is_runnable(&self, task: TaskId) -> bool {
        self.task(task).is_runnable()
    }

    /// Parks `task` on the given waiter. An already-parked task has its
    /// waiter replaced; handlers use this when chaining transactions.
    pub fn wait(&mut self, task: TaskId, waiter: TransactionWaiter) {
        let t = self.tasks.get_mut(&task).expect("No such task");
        t.state = TaskState::Blocked(waiter);
    }

    /// Attaches a break condition to a parked task's waiter. The scheduler
    /// releases the waiter once the byte behind the pointer turns non-zero.
    pub fn set_break_condition(&mut self, task: TaskId, condition: Contextual<*const u8>) {
        if let Some(t) = self.tasks.get_mut(&task) {
            if let TaskState::Blocked(waiter) = &mut t.state {
                waiter.set_break_condition(condition);
            }
        }
    }

    /// One scheduling round: every parked task's waiter is polled in that
    /// task's address space. Tasks whose handlers completed become
    /// runnable; the rest stay parked.
    pub fn schedule(&mut self, vfs: &Vfs) {
        let parked: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, t)| !t.is_runnable())
            .map(|(id, _)| *id)
            .collect();

        for tid in parked {
            let waiter = match core::mem::replace(
                &mut self.tasks.get_mut(&tid).expect("No such task").state,
                TaskState::Runnable,
            ) {
                TaskState::Blocked(waiter) => waiter,
                TaskState::Runnable => continue,
            };

            let space = self.process_of(tid).address_space;
            let spaces = self.spaces.clone();
            let _space = spaces.enter(space);
            // the waiter re-parks itself (or its successor) through `wait`
            // whenever the task must remain suspended
            waiter.poll(vfs, self, tid);
        }
    }

    /// Removes a process and all of its tasks. The filesystem's
    /// `process_closed` hook must run first so descriptors are released.
    pub fn remove_process(&mut self, pid: ProcessId) {
        self.tasks.retain(|_, t| t.process != pid);
        self.processes.remove(&pid);
    }
}
