//manager/queue.rs
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// FIFO admission to a fixed number of execution slots.
pub struct Queue {
    max_concurrent: usize,
    running: usize,
    waiting: VecDeque<Arc<Notify>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub running: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
}

impl Queue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            running: 0,
            waiting: VecDeque::new(),
        }
    }

    /// Takes a slot if one is free. Otherwise returns the `Notify` that will
    /// be signalled once a slot has been handed over to the caller.
    pub fn try_acquire_slot(&mut self) -> Option<Arc<Notify>> {
        if self.running < self.max_concurrent {
            self.running += 1;
            None
        } else {
            let notify = Arc::new(Notify::new());
            self.waiting.push_back(notify.clone());
            Some(notify)
        }
    }

    /// Frees a slot, passing it straight to the longest waiter if any.
    pub fn release_slot(&mut self) {
        self.running = self.running.saturating_sub(1);

        if let Some(waiting_task) = self.waiting.pop_front() {
            self.running += 1;
            waiting_task.notify_one();
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            running: self.running,
            waiting: self.waiting.len(),
            max_concurrent: self.max_concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_handed_over_in_order() {
        let mut queue = Queue::new(1);
        assert!(queue.try_acquire_slot().is_none());
        let first = queue.try_acquire_slot().unwrap();
        let second = queue.try_acquire_slot().unwrap();
        assert_eq!(queue.stats(), QueueStats { running: 1, waiting: 2, max_concurrent: 1 });

        queue.release_slot();
        assert_eq!(queue.stats().waiting, 1);
        assert_eq!(queue.stats().running, 1);
        assert!(Arc::strong_count(&first) == 1);
        assert!(Arc::strong_count(&second) == 2);

        queue.release_slot();
        queue.release_slot();
        assert_eq!(queue.stats(), QueueStats { running: 0, waiting: 0, max_concurrent: 1 });
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut queue = Queue::new(0);
        assert!(queue.try_acquire_slot().is_none());
        assert_eq!(queue.stats().max_concurrent, 1);
    }
}
