use crossbeam_queue::{ArrayQueue, SegQueue};

use crate::{ConcurrentQueue, QueueConfig, QueueError};

/// crossbeam's queues behind the shared contract, for benchmarking.
///
/// Unbounded configurations use [`SegQueue`], bounded ones [`ArrayQueue`].
pub enum CrossbeamQueue<T> {
    Unbounded(SegQueue<T>),
    Bounded(ArrayQueue<T>),
}

impl<T: Send> ConcurrentQueue<T> for CrossbeamQueue<T> {
    /// # Panics
    ///
    /// Panics on a capacity of zero, which [`ArrayQueue`] rejects.
    fn with_config(config: QueueConfig) -> Self {
        if config.is_bounded() {
            CrossbeamQueue::Bounded(ArrayQueue::new(config.get_capacity()))
        } else {
            CrossbeamQueue::Unbounded(SegQueue::new())
        }
    }

    fn len(&self) -> usize {
        match self {
            CrossbeamQueue::Unbounded(queue) => queue.len(),
            CrossbeamQueue::Bounded(queue) => queue.len(),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            CrossbeamQueue::Unbounded(_) => usize::MAX,
            CrossbeamQueue::Bounded(queue) => queue.capacity(),
        }
    }

    fn enqueue(&self, item: T) -> Result<(), QueueError> {
        match self {
            CrossbeamQueue::Unbounded(queue) => {
                queue.push(item);
                Ok(())
            }
            CrossbeamQueue::Bounded(queue) => queue.push(item).map_err(|_| QueueError::Full),
        }
    }

    fn dequeue(&self) -> Result<T, QueueError> {
        match self {
            CrossbeamQueue::Unbounded(queue) => queue.pop(),
            CrossbeamQueue::Bounded(queue) => queue.pop(),
        }
        .ok_or(QueueError::Empty)
    }
}
