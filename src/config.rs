/// Construction options shared by every queue in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    capacity: usize,
}

impl Default for QueueConfig {
    /// Unbounded.
    fn default() -> Self {
        Self {
            capacity: usize::MAX,
        }
    }
}

impl QueueConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Bounds the number of live elements. Setting it twice keeps the last value.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Applies an optional bound, leaving the queue unbounded on `None`.
    pub fn maybe_capacity(self, capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => self.capacity(capacity),
            None => self,
        }
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity != usize::MAX
    }
}
