use ::concurrent_queue::{PopError, PushError};

use crate::{ConcurrentQueue, QueueConfig, QueueError};

/// The `concurrent-queue` crate behind the shared contract, for benchmarking.
impl<T: Send> ConcurrentQueue<T> for ::concurrent_queue::ConcurrentQueue<T> {
    /// # Panics
    ///
    /// Panics on a capacity of zero, which `concurrent-queue` rejects.
    fn with_config(config: QueueConfig) -> Self {
        if config.is_bounded() {
            ::concurrent_queue::ConcurrentQueue::bounded(config.get_capacity())
        } else {
            ::concurrent_queue::ConcurrentQueue::unbounded()
        }
    }

    fn len(&self) -> usize {
        ::concurrent_queue::ConcurrentQueue::len(self)
    }

    fn capacity(&self) -> usize {
        ::concurrent_queue::ConcurrentQueue::capacity(self).unwrap_or(usize::MAX)
    }

    fn enqueue(&self, item: T) -> Result<(), QueueError> {
        // The queue is never closed, so a rejected push means it is full.
        self.push(item).map_err(|err| match err {
            PushError::Full(_) | PushError::Closed(_) => QueueError::Full,
        })
    }

    fn dequeue(&self) -> Result<T, QueueError> {
        self.pop().map_err(|err| match err {
            PopError::Empty | PopError::Closed => QueueError::Empty,
        })
    }
}

#[cfg(test)]
mod test {
    use crate::{ConcurrentQueue, QueueConfig, QueueError};

    type Queue<T> = ::concurrent_queue::ConcurrentQueue<T>;

    #[test]
    fn bounded_reports_full() {
        let queue: Queue<i32> = ConcurrentQueue::with_config(QueueConfig::default().capacity(2));
        assert_eq!(ConcurrentQueue::capacity(&queue), 2);
        ConcurrentQueue::enqueue(&queue, 1).unwrap();
        ConcurrentQueue::enqueue(&queue, 2).unwrap();
        assert_eq!(ConcurrentQueue::enqueue(&queue, 3), Err(QueueError::Full));
        assert_eq!(ConcurrentQueue::dequeue(&queue), Ok(1));
    }

    #[test]
    fn unbounded_reports_empty() {
        let queue: Queue<i32> = ConcurrentQueue::with_config(QueueConfig::default());
        assert_eq!(ConcurrentQueue::capacity(&queue), usize::MAX);
        assert_eq!(ConcurrentQueue::dequeue(&queue), Err(QueueError::Empty));
    }
}
