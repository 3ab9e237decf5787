//! Inter-task messaging.
//!
//! The filesystem consumes one narrow contract from the message bus: a
//! typed message can be sent to a task's bounded queue, and the send
//! reports whether it was delivered, the queue was full, or the target is
//! unreachable. Delegates map those outcomes onto transaction statuses.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use hashbrown::HashMap;

use kyro_abi::TaskId;

/// Maximum number of undelivered messages per task queue
pub const QUEUE_LIMIT: usize = 64;

/// Outcome of a message send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Successful,
    QueueFull,
    Failed,
}

/// Per-task bounded message queues
#[derive(Debug)]
pub struct MessageBus {
    queues: HashMap<TaskId, VecDeque<Vec<u8>>>,
}
impl MessageBus {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    /// Creates the receive queue for a task. Sending to a task without a
    /// queue fails.
    pub fn ensure_queue(&mut self, task: TaskId) {
        self.queues.entry(task).or_insert_with(VecDeque::new);
    }

    pub fn send(&mut self, task: TaskId, message: Vec<u8>) -> SendStatus {
        match self.queues.get_mut(&task) {
            None => SendStatus::Failed,
            Some(queue) if queue.len() >= QUEUE_LIMIT => SendStatus::QueueFull,
            Some(queue) => {
                queue.push_back(message);
                SendStatus::Successful
            },
        }
    }

    /// Nonblocking, returns `None` if the queue is empty
    pub fn receive(&mut self, task: TaskId) -> Option<Vec<u8>> {
        self.queues.get_mut(&task)?.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_queue_fails() {
        let mut bus = MessageBus::new();
        assert_eq!(bus.send(TaskId::first(), vec![1]), SendStatus::Failed);
    }

    #[test]
    fn full_queue_reports_queue_full() {
        let mut bus = MessageBus::new();
        let task = TaskId::first();
        bus.ensure_queue(task);
        for _ in 0..QUEUE_LIMIT {
            assert_eq!(bus.send(task, vec![0]), SendStatus::Successful);
        }
        assert_eq!(bus.send(task, vec![0]), SendStatus::QueueFull);
        assert!(bus.receive(task).is_some());
        assert_eq!(bus.send(task, vec![0]), SendStatus::Successful);
    }
}
