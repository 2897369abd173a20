use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use crossbeam_utils::CachePadded;

use crate::{pool::NodePool, ConcurrentQueue, IterableQueue, QueueConfig, QueueError};

struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    prev: AtomicPtr<Node<T>>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            prev: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> Node<T> {
    fn prev(&self) -> *mut Node<T> {
        self.prev.load(Ordering::Acquire)
    }

    fn next(&self) -> *mut Node<T> {
        self.next.load(Ordering::Acquire)
    }

    fn cas_next(&self, expected: *mut Node<T>, target: *mut Node<T>) -> bool {
        self.next
            .compare_exchange(expected, target, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
    }
}

/// Lock-free FIFO queue over a sentinel-terminated, doubly linked ring.
///
/// `sentinel.next` is the head and `sentinel.prev` caches the tail. The cache
/// may lag: the real tail is the node whose `next` is the sentinel, and
/// producers walk forward to it when their cached tail is stale.
///
/// Retired nodes go back to a shared [`NodePool`] and are reused without any
/// hazard-pointer or epoch protection. Node memory is only freed when the
/// queue is dropped, so a stale pointer never dangles, but a straggling
/// thread can observe a recycled node (ABA). This is not repaired: if a
/// producer links behind a cached tail that was dequeued and handed to
/// another producer before that producer linked it, the two nodes end up
/// pointing at each other off the ring. Their elements are lost while still
/// counted by [`len`](Self::len), and later producers spin forever looking
/// for a tail.
pub struct LockFreeQueue<T> {
    capacity: usize,
    count: CachePadded<AtomicUsize>,
    sentinel: NonNull<Node<T>>,
    pool: NodePool<Node<T>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(QueueConfig::default().capacity(capacity))
    }

    pub fn with_config(config: QueueConfig) -> Self {
        let sentinel = NonNull::from(Box::leak(Box::<Node<T>>::default()));
        let sentinel_ref = unsafe { sentinel.as_ref() };
        sentinel_ref.prev.store(sentinel.as_ptr(), Ordering::Relaxed);
        sentinel_ref.next.store(sentinel.as_ptr(), Ordering::Relaxed);
        Self {
            capacity: config.get_capacity(),
            count: CachePadded::new(AtomicUsize::new(0)),
            sentinel,
            pool: NodePool::new(),
            _marker: PhantomData,
        }
    }

    fn sentinel(&self) -> &Node<T> {
        unsafe { self.sentinel.as_ref() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Best-known number of elements.
    ///
    /// An enqueue counts itself before it links its node and a dequeue stops
    /// counting its node after unlinking it, so the value is exact only when
    /// no operation is in flight.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims one slot of capacity for an upcoming insertion.
    fn reserve(&self) -> Result<(), QueueError> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.capacity).then(|| count + 1)
            })
            .map(|_| ())
            .map_err(|_| QueueError::Full)
    }

    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        self.reserve()?;
        let node = self.prepare(item);
        self.link(node, self.sentinel().prev());
        Ok(())
    }

    /// Takes a node from the pool and fills it in as a new tail.
    fn prepare(&self, item: T) -> NonNull<Node<T>> {
        let node = self.pool.acquire();
        let node_ref = unsafe { node.as_ref() };
        unsafe { (*node_ref.value.get()).write(item) };
        node_ref
            .next
            .store(self.sentinel.as_ptr(), Ordering::Release);
        node
    }

    /// Links a prepared node, starting the search for the tail at `last`.
    fn link(&self, node: NonNull<Node<T>>, mut last: *mut Node<T>) {
        let sentinel = self.sentinel.as_ptr();
        let node_ref = unsafe { node.as_ref() };
        loop {
            if last == node.as_ptr() {
                // The cached tail is the retired node just taken from the
                // pool, find the real tail from the head instead.
                last = sentinel;
            }
            // Nobody else sees the node until the CAS below publishes it.
            node_ref.prev.store(last, Ordering::Relaxed);
            if unsafe { &*last }.cas_next(sentinel, node.as_ptr()) {
                self.publish_tail(node.as_ptr());
                return;
            }
            last = self.tail_candidate(last);
        }
    }

    /// Caches `node` as the tail once it is linked.
    fn publish_tail(&self, node: *mut Node<T>) {
        let sentinel = self.sentinel.as_ptr();
        let sentinel_ref = self.sentinel();
        sentinel_ref.prev.store(node, Ordering::SeqCst);
        // A consumer may have drained the queue past `node` before the store
        // above, an empty ring must point back at the sentinel.
        if sentinel_ref.next.load(Ordering::SeqCst) == sentinel {
            let _ = sentinel_ref.prev.compare_exchange(
                node,
                sentinel,
                Ordering::SeqCst,
                Ordering::Relaxed,
            );
        }
    }

    /// Picks the next node to try linking behind after a failed CAS on `last`.
    fn tail_candidate(&self, last: *mut Node<T>) -> *mut Node<T> {
        let sentinel = self.sentinel.as_ptr();
        let next = unsafe { &*last }.next();
        if next == sentinel {
            return last;
        }
        if !next.is_null() && next != last {
            // The cached tail lags behind the real one.
            return next;
        }
        // `last` has been unlinked (null) or is being unlinked (self loop).
        std::hint::spin_loop();
        let cached = self.sentinel().prev();
        if cached == last {
            sentinel
        } else {
            cached
        }
    }

    pub fn dequeue(&self) -> Result<T, QueueError> {
        let sentinel = self.sentinel.as_ptr();
        loop {
            let first = self.sentinel().next();
            if first == sentinel {
                return Err(QueueError::Empty);
            }
            let first_ref = unsafe { &*first };
            let after_first = first_ref.next();
            if after_first.is_null() || after_first == first {
                // Another consumer already owns `first`.
                std::hint::spin_loop();
                continue;
            }

            if after_first == sentinel {
                // Seal the last node so no producer links behind it while it
                // is unlinked.
                if !first_ref.cas_next(sentinel, first) {
                    continue;
                }
                if !self.sentinel().cas_next(first, sentinel) {
                    // `first` was recycled into the tail while this consumer
                    // was looking at it, it is not the head.
                    first_ref.next.store(sentinel, Ordering::Release);
                    continue;
                }
                self.sentinel().prev.store(sentinel, Ordering::SeqCst);
            } else if self.sentinel().cas_next(first, after_first) {
                unsafe { &*after_first }
                    .prev
                    .store(sentinel, Ordering::Release);
            } else {
                continue;
            }

            self.count.fetch_sub(1, Ordering::AcqRel);
            return Ok(unsafe { self.retire(first) });
        }
    }

    /// Moves the value out of an unlinked node and hands the node to the pool.
    ///
    /// # Safety
    ///
    /// The caller must have unlinked `node` itself and hold no other alias.
    unsafe fn retire(&self, node: *mut Node<T>) -> T {
        let node_ref = &*node;
        let value = (*node_ref.value.get()).assume_init_read();
        node_ref.prev.store(ptr::null_mut(), Ordering::Release);
        node_ref.next.store(ptr::null_mut(), Ordering::Release);
        self.pool.release(NonNull::new_unchecked(node));
        value
    }

    /// Walks the queue from head to tail without removing anything.
    pub fn iter(&mut self) -> Iter<'_, T> {
        self.cursor()
    }

    /// Walks the queue from head to tail while other threads may use it.
    ///
    /// The walk starts at the head current at the time of the call and takes
    /// no ownership of the nodes it visits, so elements enqueued during the
    /// walk may or may not be seen.
    ///
    /// # Safety
    ///
    /// No `dequeue` may run on this queue while the iterator, or any reference
    /// it produced, is alive: a dequeue moves the value out and recycles the
    /// node. Concurrent `enqueue` calls are fine, since a node is fully written
    /// before it becomes reachable.
    pub unsafe fn iter_unsynchronized(&self) -> Iter<'_, T>
    where
        T: Sync,
    {
        self.cursor()
    }

    fn cursor(&self) -> Iter<'_, T> {
        Iter {
            sentinel: self.sentinel.as_ptr(),
            next: self.sentinel().next(),
            _queue: PhantomData,
        }
    }

    #[cfg(test)]
    fn pooled_nodes(&self) -> usize {
        self.pool.len()
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        let sentinel = self.sentinel.as_ptr();
        let mut current = self.sentinel().next();
        while current != sentinel {
            let node = unsafe { Box::from_raw(current) };
            current = node.next();
            unsafe { (*node.value.get()).assume_init_drop() };
        }
        drop(unsafe { Box::from_raw(sentinel) });
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Cursor over a [`LockFreeQueue`], see [`LockFreeQueue::iter`].
pub struct Iter<'a, T> {
    sentinel: *const Node<T>,
    next: *const Node<T>,
    _queue: PhantomData<&'a LockFreeQueue<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.next.is_null() || self.next == self.sentinel {
            return None;
        }
        let node = unsafe { &*self.next };
        let value = unsafe { (*node.value.get()).assume_init_ref() };
        let next = node.next();
        // A sealed node points at itself, treat it as the end.
        self.next = if ptr::eq(next, self.next) {
            ptr::null()
        } else {
            next
        };
        Some(value)
    }
}

impl<T: Send> ConcurrentQueue<T> for LockFreeQueue<T> {
    fn with_config(config: QueueConfig) -> Self {
        LockFreeQueue::with_config(config)
    }

    fn len(&self) -> usize {
        LockFreeQueue::len(self)
    }

    fn capacity(&self) -> usize {
        LockFreeQueue::capacity(self)
    }

    fn enqueue(&self, item: T) -> Result<(), QueueError> {
        LockFreeQueue::enqueue(self, item)
    }

    fn dequeue(&self) -> Result<T, QueueError> {
        LockFreeQueue::dequeue(self)
    }
}

impl<T: Send> IterableQueue<T> for LockFreeQueue<T> {
    type Iter<'a> = Iter<'a, T> where Self: 'a, T: 'a;

    fn iter(&mut self) -> Self::Iter<'_> {
        LockFreeQueue::iter(self)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::LockFreeQueue;
    use crate::QueueError;

    #[test]
    fn simple_test() {
        let queue = LockFreeQueue::new();
        queue.enqueue(5).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue(), Ok(5));
        assert_eq!(queue.dequeue(), Err(QueueError::Empty));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn many_elem_test() {
        let queue = LockFreeQueue::new();
        for i in 0..5 {
            queue.enqueue(i).unwrap();
        }
        assert_eq!(queue.dequeue(), Ok(0));
        assert_eq!(queue.dequeue(), Ok(1));
        for i in 5..10 {
            queue.enqueue(i).unwrap();
        }
        for i in 2..10 {
            assert_eq!(queue.dequeue(), Ok(i));
        }
        for _ in 0..4 {
            assert_eq!(queue.dequeue(), Err(QueueError::Empty));
        }
    }

    #[test]
    fn ring_is_restored_when_drained() {
        let queue = LockFreeQueue::new();
        queue.enqueue("a").unwrap();
        queue.enqueue("b").unwrap();
        queue.dequeue().unwrap();
        queue.dequeue().unwrap();
        let sentinel = queue.sentinel.as_ptr();
        assert_eq!(queue.sentinel().next(), sentinel);
        assert_eq!(queue.sentinel().prev(), sentinel);
    }

    #[test]
    fn recycles_nodes() {
        let queue = LockFreeQueue::new();
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert_eq!(queue.pooled_nodes(), 0);
        queue.dequeue().unwrap();
        queue.dequeue().unwrap();
        assert_eq!(queue.pooled_nodes(), 2);
        queue.enqueue(3).unwrap();
        assert_eq!(queue.pooled_nodes(), 1);
        assert_eq!(queue.dequeue(), Ok(3));
    }

    #[test]
    fn full_enqueue_does_not_touch_the_ring() {
        let queue = LockFreeQueue::with_capacity(2);
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert_eq!(queue.enqueue(3), Err(QueueError::Full));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pooled_nodes(), 0);
        assert_eq!(queue.dequeue(), Ok(1));
        queue.enqueue(4).unwrap();
        assert_eq!(queue.dequeue(), Ok(2));
        assert_eq!(queue.dequeue(), Ok(4));
    }

    #[test]
    fn drop_releases_remaining_values() {
        let tracker = Arc::new(());
        {
            let queue = LockFreeQueue::new();
            for _ in 0..10 {
                queue.enqueue(Arc::clone(&tracker)).unwrap();
            }
            drop(queue.dequeue().unwrap());
            assert_eq!(Arc::strong_count(&tracker), 10);
        }
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn unsynchronized_iter_with_concurrent_enqueues() {
        let queue = LockFreeQueue::<usize>::new();
        for i in 0..100 {
            queue.enqueue(i).unwrap();
        }
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 100..1000 {
                    queue.enqueue(i).unwrap();
                }
            });
            // No dequeue runs while the iterator is alive.
            let seen: Vec<_> = unsafe { queue.iter_unsynchronized() }.copied().collect();
            assert!(seen.len() >= 100);
            assert!(seen.iter().copied().eq(0..seen.len()));
        });
        assert_eq!(queue.len(), 1000);
    }

    #[test]
    fn stale_tail_recycled_between_producers_detaches_nodes() {
        let mut queue = LockFreeQueue::<usize>::new();
        let sentinel = queue.sentinel.as_ptr();
        queue.enqueue(10).unwrap();
        queue.enqueue(11).unwrap();
        // The first producer reads the cached tail and stalls.
        let stale = queue.sentinel().prev();
        assert_eq!(queue.dequeue(), Ok(10));
        assert_eq!(queue.dequeue(), Ok(11));
        queue.enqueue(1).unwrap();

        // The second producer draws the stale tail from the pool.
        queue.reserve().unwrap();
        let recycled = queue.prepare(2);
        assert_eq!(recycled.as_ptr(), stale);

        // The first producer resumes and links behind its stale tail.
        queue.reserve().unwrap();
        let fresh = queue.prepare(3);
        queue.link(fresh, stale);
        assert_eq!(queue.sentinel().prev(), fresh.as_ptr());

        // The second producer links behind the tail it now reads.
        queue.link(recycled, queue.sentinel().prev());

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![1]);
        let detached = [recycled.as_ptr(), fresh.as_ptr()];
        let mut last = queue.sentinel().prev();
        for _ in 0..16 {
            last = queue.tail_candidate(last);
            assert!(detached.contains(&last));
            assert_ne!(unsafe { &*last }.next(), sentinel);
        }

        assert_eq!(queue.dequeue(), Ok(1));
        // Neither the ring nor the pool reaches the detached pair any more.
        for node in detached {
            drop(unsafe { Box::from_raw(node) });
        }
    }

    #[test]
    fn simple_multi_threaded_enqueue_test() {
        let queue = LockFreeQueue::<usize>::new();
        std::thread::scope(|s| {
            let queue = &queue;
            for c in 0..3 {
                s.spawn(move || {
                    for i in (c * 100)..((c + 1) * 100) {
                        queue.enqueue(i).unwrap();
                    }
                });
            }
        });

        let mut next_expected = [0, 100, 200];
        for _ in 0..300 {
            let val = queue.dequeue().expect("should have more elements");
            assert_eq!(next_expected[val / 100], val);
            next_expected[val / 100] = val + 1;
        }
        assert_eq!(queue.dequeue(), Err(QueueError::Empty));
    }

    #[test]
    fn bounded_under_contention() {
        let queue = LockFreeQueue::with_capacity(64);
        let accepted = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for i in 0..100 {
                        match queue.enqueue(i) {
                            Ok(()) => {
                                accepted.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => assert_eq!(err, QueueError::Full),
                        }
                        assert!(queue.len() <= 64);
                    }
                });
            }
        });
        assert_eq!(accepted.into_inner(), 64);
        assert_eq!(queue.len(), 64);
    }

    #[test]
    fn multi_threaded_check_all_exists() {
        let queue = LockFreeQueue::new();
        std::thread::scope(|s| {
            let queue = &queue;
            for c in 0..10 {
                s.spawn(move || {
                    for i in (c * 100)..((c + 1) * 100) {
                        queue.enqueue(i).unwrap();
                    }
                });
            }
            for _ in 0..10 {
                s.spawn(move || {
                    let mut successful = 0;
                    while successful < 100 {
                        if let Ok(val) = queue.dequeue() {
                            successful += 1;
                            queue.enqueue(val).unwrap();
                        }
                    }
                });
            }
        });
        let collected_elements = Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..10 {
                s.spawn(|| {
                    for _ in 0..100 {
                        if let Ok(val) = queue.dequeue() {
                            queue.enqueue(val).unwrap();
                        }
                    }
                });
            }
            for _ in 0..10 {
                s.spawn(|| {
                    while let Ok(v) = queue.dequeue() {
                        collected_elements.lock().unwrap().push(v);
                    }
                });
            }
        });
        let mut collected_elements = collected_elements.into_inner().unwrap();
        while let Ok(v) = queue.dequeue() {
            collected_elements.push(v);
        }
        assert_eq!(collected_elements.len(), 1000);
        collected_elements.sort_unstable();
        for (i, v) in collected_elements.into_iter().enumerate() {
            assert_eq!(v, i);
        }
        assert_eq!(queue.len(), 0);
    }
}
