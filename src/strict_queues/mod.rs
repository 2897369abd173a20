pub mod concurrent_queue;
pub mod crossbeam_queue;
pub mod lock_free;
pub mod rw_lock;

pub use lock_free::LockFreeQueue;
pub use rw_lock::RwLockQueue;

pub use self::crossbeam_queue::CrossbeamQueue;
