use clap::{Parser, ValueEnum};
use rand::Rng;
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};
use tracing_subscriber::EnvFilter;

use strict_queues::{
    strict_queues::CrossbeamQueue, ConcurrentQueue, LockFreeQueue, QueueConfig, QueueError,
    RwLockQueue,
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BenchConfig::parse();
    tracing::info!(?config, "starting benchmark");
    let queue_config = QueueConfig::default().maybe_capacity(config.capacity);
    match config.queue {
        QueueKind::LockFree => {
            benchmark_producer_consumer(LockFreeQueue::with_config(queue_config), &config)
        }
        QueueKind::RwLock => {
            benchmark_producer_consumer(RwLockQueue::with_config(queue_config), &config)
        }
        QueueKind::Crossbeam => benchmark_producer_consumer(
            <CrossbeamQueue<usize> as ConcurrentQueue<usize>>::with_config(queue_config),
            &config,
        ),
        QueueKind::ConcurrentQueue => benchmark_producer_consumer(
            <concurrent_queue::ConcurrentQueue<usize> as ConcurrentQueue<usize>>::with_config(
                queue_config,
            ),
            &config,
        ),
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QueueKind {
    /// CAS-linked ring from this crate
    LockFree,
    /// reader/writer locked ring from this crate
    RwLock,
    /// crossbeam SegQueue, or ArrayQueue when bounded
    Crossbeam,
    /// the concurrent-queue crate
    ConcurrentQueue,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct BenchConfig {
    /// queue implementation to measure.
    #[arg(long, value_enum, default_value_t = QueueKind::LockFree)]
    queue: QueueKind,
    /// bound on the number of queued elements, unbounded when omitted.
    #[arg(long)]
    capacity: Option<usize>,
    /// number of elements to add to the queue before starting the main
    /// threaded test.
    #[arg(long, default_value_t = 0)]
    prefill: usize,
    /// number of threads pushing elements onto the queue.
    #[arg(long)]
    producer_threads: usize,
    /// number of threads popping elements off the queue.
    #[arg(long)]
    consumer_threads: usize,
    /// number of threads that enqueue three times for every dequeue.
    #[arg(long, default_value_t = 0)]
    mixed_threads: usize,
    /// number of threads only reading the queue length.
    #[arg(long, default_value_t = 0)]
    len_readers: usize,
    /// duration in seconds to run the test
    #[arg(long)]
    duration: u64,
    /// pin every worker thread to its own core.
    #[arg(long)]
    pin: bool,
}

#[derive(Default)]
struct Counters {
    enqueues: AtomicUsize,
    dequeues: AtomicUsize,
    full: AtomicUsize,
    empty: AtomicUsize,
    len_reads: AtomicUsize,
}

#[derive(Default)]
struct Local {
    enqueues: usize,
    dequeues: usize,
    full: usize,
    empty: usize,
}

impl Local {
    fn enqueue<Q: ConcurrentQueue<usize>>(&mut self, queue: &Q, item: usize) {
        match queue.enqueue(item) {
            Ok(()) => self.enqueues += 1,
            Err(QueueError::Full) => self.full += 1,
            Err(QueueError::Empty) => unreachable!("enqueue never reports empty"),
        }
    }

    fn dequeue<Q: ConcurrentQueue<usize>>(&mut self, queue: &Q) {
        match queue.dequeue() {
            Ok(_) => self.dequeues += 1,
            Err(QueueError::Empty) => self.empty += 1,
            Err(QueueError::Full) => unreachable!("dequeue never reports full"),
        }
    }

    fn publish(self, counters: &Counters) {
        counters.enqueues.fetch_add(self.enqueues, Ordering::Relaxed);
        counters.dequeues.fetch_add(self.dequeues, Ordering::Relaxed);
        counters.full.fetch_add(self.full, Ordering::Relaxed);
        counters.empty.fetch_add(self.empty, Ordering::Relaxed);
    }
}

fn pin_to_core(worker: usize) {
    let Some(cores) = core_affinity::get_core_ids().filter(|cores| !cores.is_empty()) else {
        tracing::warn!(worker, "could not list cores, running unpinned");
        return;
    };
    let core = cores[worker % cores.len()];
    if !core_affinity::set_for_current(core) {
        tracing::warn!(worker, core = core.id, "failed to pin worker");
    }
}

fn benchmark_producer_consumer<C>(queue: C, config: &BenchConfig)
where
    C: ConcurrentQueue<usize> + Sync,
{
    let mut prefilled = 0;
    for i in 0..config.prefill {
        if queue.enqueue(i).is_err() {
            tracing::warn!(
                requested = config.prefill,
                capacity = queue.capacity(),
                "prefill stopped at capacity"
            );
            break;
        }
        prefilled += 1;
    }
    tracing::debug!(prefilled, "queue prefilled");

    let done: AtomicBool = AtomicBool::new(false);
    let counters = Counters::default();
    let worker = AtomicUsize::new(0);
    let start_worker = || {
        let id = worker.fetch_add(1, Ordering::Relaxed);
        if config.pin {
            pin_to_core(id);
        }
        id
    };

    let started = Instant::now();
    thread::scope(|s| {
        for _ in 0..config.producer_threads {
            s.spawn(|| {
                let id = start_worker();
                let mut local = Local::default();
                while !done.load(Ordering::Relaxed) {
                    local.enqueue(&queue, id);
                }
                local.publish(&counters);
            });
        }
        for _ in 0..config.consumer_threads {
            s.spawn(|| {
                start_worker();
                let mut local = Local::default();
                while !done.load(Ordering::Relaxed) {
                    local.dequeue(&queue);
                }
                local.publish(&counters);
            });
        }
        for _ in 0..config.mixed_threads {
            s.spawn(|| {
                let id = start_worker();
                let mut rng = rand::thread_rng();
                let mut local = Local::default();
                while !done.load(Ordering::Relaxed) {
                    if rng.gen_bool(0.75) {
                        local.enqueue(&queue, id);
                    } else {
                        local.dequeue(&queue);
                    }
                }
                local.publish(&counters);
            });
        }
        for _ in 0..config.len_readers {
            s.spawn(|| {
                start_worker();
                let mut reads = 0;
                while !done.load(Ordering::Relaxed) {
                    std::hint::black_box(queue.len());
                    reads += 1;
                }
                counters.len_reads.fetch_add(reads, Ordering::Relaxed);
            });
        }

        thread::sleep(Duration::from_secs(config.duration));
        done.store(true, Ordering::Relaxed);
    });
    let elapsed = started.elapsed().as_secs_f64();

    let enqueues = counters.enqueues.into_inner();
    let dequeues = counters.dequeues.into_inner();
    tracing::info!(elapsed, remaining = queue.len(), "benchmark finished");
    println!("throughput: {}", (enqueues + dequeues) as f64 / elapsed);
    println!("number of enqueues: {}", enqueues);
    println!("number of dequeues: {}", dequeues);
    println!("rejected as full: {}", counters.full.into_inner());
    println!("rejected as empty: {}", counters.empty.into_inner());
    println!("length reads: {}", counters.len_reads.into_inner());
}
