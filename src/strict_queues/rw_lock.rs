use std::{
    fmt,
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::{self, NonNull},
};

use parking_lot::RwLock;

use crate::{pool::NodePool, ConcurrentQueue, IterableQueue, QueueConfig, QueueError};

struct Node<T> {
    value: MaybeUninit<T>,
    prev: *mut Node<T>,
    next: *mut Node<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }
}

/// FIFO queue over a sentinel-terminated, doubly linked ring, serialized by a
/// single reader/writer lock.
///
/// `len` takes the lock shared, `enqueue` and `dequeue` take it exclusively
/// for the whole splice. Iteration does not take the lock, see
/// [`RwLockQueue::iter_unsynchronized`].
pub struct RwLockQueue<T> {
    capacity: usize,
    /// Live element count. Holding the write side also grants access to every
    /// node link.
    count: RwLock<usize>,
    sentinel: NonNull<Node<T>>,
    pool: NodePool<Node<T>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for RwLockQueue<T> {}
unsafe impl<T: Send> Sync for RwLockQueue<T> {}

impl<T> RwLockQueue<T> {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(QueueConfig::default().capacity(capacity))
    }

    pub fn with_config(config: QueueConfig) -> Self {
        let sentinel = NonNull::from(Box::leak(Box::<Node<T>>::default()));
        unsafe {
            (*sentinel.as_ptr()).prev = sentinel.as_ptr();
            (*sentinel.as_ptr()).next = sentinel.as_ptr();
        }
        Self {
            capacity: config.get_capacity(),
            count: RwLock::new(0),
            sentinel,
            pool: NodePool::new(),
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        *self.count.read()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut count = self.count.write();
        if *count == self.capacity {
            return Err(QueueError::Full);
        }
        let sentinel = self.sentinel.as_ptr();
        let node = self.pool.acquire().as_ptr();
        unsafe {
            (*node).value.write(item);
            let last = (*sentinel).prev;
            (*node).prev = last;
            (*node).next = sentinel;
            (*last).next = node;
            (*sentinel).prev = node;
        }
        *count += 1;
        Ok(())
    }

    pub fn dequeue(&self) -> Result<T, QueueError> {
        let mut count = self.count.write();
        if *count == 0 {
            return Err(QueueError::Empty);
        }
        let sentinel = self.sentinel.as_ptr();
        let value = unsafe {
            let first = (*sentinel).next;
            let second = (*first).next;
            (*sentinel).next = second;
            (*second).prev = sentinel;

            let value = (*first).value.assume_init_read();
            (*first).prev = ptr::null_mut();
            (*first).next = ptr::null_mut();
            self.pool.release(NonNull::new_unchecked(first));
            value
        };
        *count -= 1;
        Ok(value)
    }

    /// Walks the queue from head to tail without removing anything.
    pub fn iter(&mut self) -> Iter<'_, T> {
        self.cursor()
    }

    /// Walks the queue from head to tail without taking the lock.
    ///
    /// # Safety
    ///
    /// The walk reads node links that `enqueue` and `dequeue` rewrite under
    /// the lock, so neither may run on this queue while the iterator, or any
    /// reference it produced, is alive.
    pub unsafe fn iter_unsynchronized(&self) -> Iter<'_, T>
    where
        T: Sync,
    {
        self.cursor()
    }

    fn cursor(&self) -> Iter<'_, T> {
        let sentinel = self.sentinel.as_ptr();
        Iter {
            sentinel,
            next: unsafe { (*sentinel).next },
            _queue: PhantomData,
        }
    }

    #[cfg(test)]
    fn pooled_nodes(&self) -> usize {
        self.pool.len()
    }
}

impl<T> Default for RwLockQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RwLockQueue<T> {
    fn drop(&mut self) {
        let sentinel = self.sentinel.as_ptr();
        let mut current = unsafe { (*sentinel).next };
        while current != sentinel {
            let mut node = unsafe { Box::from_raw(current) };
            current = node.next;
            unsafe { node.value.assume_init_drop() };
        }
        drop(unsafe { Box::from_raw(sentinel) });
    }
}

impl<T> fmt::Debug for RwLockQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLockQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Cursor over a [`RwLockQueue`], see [`RwLockQueue::iter`].
pub struct Iter<'a, T> {
    sentinel: *const Node<T>,
    next: *const Node<T>,
    _queue: PhantomData<&'a RwLockQueue<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.next.is_null() || self.next == self.sentinel {
            return None;
        }
        let node = unsafe { &*self.next };
        self.next = node.next;
        Some(unsafe { node.value.assume_init_ref() })
    }
}

impl<T: Send> ConcurrentQueue<T> for RwLockQueue<T> {
    fn with_config(config: QueueConfig) -> Self {
        RwLockQueue::with_config(config)
    }

    fn len(&self) -> usize {
        RwLockQueue::len(self)
    }

    fn capacity(&self) -> usize {
        RwLockQueue::capacity(self)
    }

    fn enqueue(&self, item: T) -> Result<(), QueueError> {
        RwLockQueue::enqueue(self, item)
    }

    fn dequeue(&self) -> Result<T, QueueError> {
        RwLockQueue::dequeue(self)
    }
}

impl<T: Send> IterableQueue<T> for RwLockQueue<T> {
    type Iter<'a> = Iter<'a, T> where Self: 'a, T: 'a;

    fn iter(&mut self) -> Self::Iter<'_> {
        RwLockQueue::iter(self)
    }
}
