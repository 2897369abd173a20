//! Concurrent FIFO queues behind one contract.
//!
//! [`LockFreeQueue`] links nodes with compare-and-swap only, [`RwLockQueue`]
//! serializes the same ring under one reader/writer lock. Both can be bounded
//! through [`QueueConfig`] and report [`QueueError::Full`] or
//! [`QueueError::Empty`] instead of blocking.
//!
//! ```
//! use strict_queues::{LockFreeQueue, QueueConfig, QueueError};
//!
//! let queue = LockFreeQueue::with_config(QueueConfig::default().capacity(1));
//! queue.enqueue(1).unwrap();
//! assert_eq!(queue.enqueue(1), Err(QueueError::Full));
//! assert_eq!(queue.dequeue(), Ok(1));
//! assert_eq!(queue.dequeue(), Err(QueueError::Empty));
//! ```

pub mod config;
pub mod error;
mod pool;
pub mod recover;
pub mod strict_queues;

pub use config::QueueConfig;
pub use error::{is_queue_empty, is_queue_full, queue_error, QueueError};
pub use strict_queues::{LockFreeQueue, RwLockQueue};

/// A FIFO queue shared between any number of producers and consumers.
///
/// No operation waits for the queue to change: a full or empty queue is
/// reported immediately.
pub trait ConcurrentQueue<T> {
    /// Creates a queue, with the given configuration
    fn with_config(config: QueueConfig) -> Self
    where
        Self: Sized;

    /// Current best-known number of elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper bound on [`ConcurrentQueue::len`], `usize::MAX` when unbounded.
    fn capacity(&self) -> usize;

    /// Appends `item` at the tail, or fails with [`QueueError::Full`].
    fn enqueue(&self, item: T) -> Result<(), QueueError>;

    /// Removes the head, or fails with [`QueueError::Empty`].
    fn dequeue(&self) -> Result<T, QueueError>;
}

/// A [`ConcurrentQueue`] whose elements can be walked without removing them.
pub trait IterableQueue<T>: ConcurrentQueue<T> {
    type Iter<'a>: Iterator<Item = &'a T>
    where
        Self: 'a,
        T: 'a;

    /// Walks the elements from head to tail.
    fn iter(&mut self) -> Self::Iter<'_>;
}
