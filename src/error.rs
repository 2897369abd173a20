use std::error::Error;

use thiserror::Error;

/// The two expected, recoverable outcomes of a queue operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueError {
    /// The queue already holds `capacity` elements.
    #[error("queue is full")]
    Full,
    /// The queue holds no element.
    #[error("queue is empty")]
    Empty,
}

/// Finds a [`QueueError`] anywhere in the `source()` chain of `err`.
pub fn queue_error(err: &(dyn Error + 'static)) -> Option<QueueError> {
    std::iter::successors(Some(err), |&e| e.source())
        .find_map(|e| e.downcast_ref::<QueueError>())
        .copied()
}

/// Whether `err`, or any error it wraps, is [`QueueError::Full`].
pub fn is_queue_full(err: &(dyn Error + 'static)) -> bool {
    queue_error(err) == Some(QueueError::Full)
}

/// Whether `err`, or any error it wraps, is [`QueueError::Empty`].
pub fn is_queue_empty(err: &(dyn Error + 'static)) -> bool {
    queue_error(err) == Some(QueueError::Empty)
}
