use std::ptr::NonNull;

use crossbeam_queue::SegQueue;

struct Retired<N>(NonNull<N>);

// Pooled nodes are cleared and owned by the pool alone, the owning queue
// decides whether its element type may cross threads.
unsafe impl<N> Send for Retired<N> {}

/// Free list of heap nodes shared by every thread using one queue.
///
/// Nodes handed back through [`NodePool::release`] stay allocated until the
/// pool is dropped, so a pointer to a retired node never dangles while the
/// owning queue is alive.
pub(crate) struct NodePool<N> {
    retired: SegQueue<Retired<N>>,
}

impl<N: Default> NodePool<N> {
    pub fn new() -> Self {
        Self {
            retired: SegQueue::new(),
        }
    }

    /// Pops a retired node, or allocates a fresh one if none is available.
    pub fn acquire(&self) -> NonNull<N> {
        match self.retired.pop() {
            Some(Retired(node)) => node,
            None => NonNull::from(Box::leak(Box::default())),
        }
    }
}

impl<N> NodePool<N> {
    /// Returns a node for reuse.
    ///
    /// # Safety
    ///
    /// `node` must have been allocated by [`NodePool::acquire`] on this pool,
    /// its fields must be cleared and no other holder may reuse it.
    pub unsafe fn release(&self, node: NonNull<N>) {
        self.retired.push(Retired(node));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.retired.len()
    }
}

impl<N> Drop for NodePool<N> {
    fn drop(&mut self) {
        while let Some(Retired(node)) = self.retired.pop() {
            drop(unsafe { Box::from_raw(node.as_ptr()) });
        }
    }
}
