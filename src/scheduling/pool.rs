//! Fixed-size worker pool fed by a bounded [`Channel`].
//!
//! Workers are spawned up front and live until the pool is dropped. While the pool is
//! active, an idle worker waits according to its [`WaitStrategy`]; once shutdown begins it
//! stops waiting for new arrivals, drains whatever is still queued, and exits. Dropping the
//! pool therefore blocks until every task that was queued at that moment has run.
//!
//! The pool never grows its queue. A full queue rejects the submission and leaves
//! backpressure to the caller.
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::{
    comms::channel::Channel,
    scheduling::{
        config::{PoolConfig, WaitStrategy},
        task::{self, TaskHandle},
    },
    AtomyError,
};

/// A queued unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    tasks: Channel<Task>,
    /// Cleared exactly once, when shutdown begins
    active: AtomicBool,
    wait: WaitStrategy,
}

/// A thread pool with a bounded task queue of `2^n - 1` slots.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Creates a pool with a task queue of exponent `n` and `threads` workers
    /// (0 means one per available core), using the blocking wait strategy.
    pub fn new(n: u8, threads: usize) -> Result<Self, AtomyError> {
        Self::with_config(PoolConfig::new(n).threads(threads))
    }

    pub fn with_config(config: PoolConfig) -> Result<Self, AtomyError> {
        let threads = config.resolved_threads();
        let shared = Arc::new(Shared {
            tasks: Channel::new(config.capacity_exponent)?,
            active: AtomicBool::new(true),
            wait: config.wait,
        });

        let mut pool = ThreadPool {
            shared,
            workers: Vec::with_capacity(threads),
        };
        for id in 0..threads {
            let shared = Arc::clone(&pool.shared);
            // on error, dropping `pool` shuts down and joins the workers spawned so far
            let handle = thread::Builder::new()
                .name(format!("{}-{id}", config.thread_name))
                .spawn(move || shared.work(id))?;
            pool.workers.push(handle);
        }

        tracing::debug!(
            threads,
            capacity = pool.shared.tasks.capacity(),
            wait = %pool.shared.wait,
            "thread pool started"
        );
        Ok(pool)
    }

    /// Queues a task for execution.
    ///
    /// Returns `Err(QueueFull)` without running the task when the queue is full.
    pub fn execute<F>(&self, f: F) -> Result<(), AtomyError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared
            .tasks
            .push(Box::new(f))
            .map_err(|_| AtomyError::QueueFull)
    }

    /// Queues a value-returning task and hands back a handle to its result.
    ///
    /// If the queue is full the handle is completed with `QueueFull` right away and the task
    /// is never run. A panic inside the task arrives as `TaskPanicked`.
    pub fn submit<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (completer, handle) = task::pair();
        let job = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
                AtomyError::TaskPanicked(task::panic_message(payload.as_ref()))
            });
            completer.complete(result);
        };

        if let Err(rejected) = self.shared.tasks.push(Box::new(job)) {
            // the completer lives inside the rejected job; dropping it would only report
            // `Disconnected`, so reject through a fresh pair instead
            drop(rejected);
            let (completer, handle) = task::pair();
            completer.complete(Err(AtomyError::QueueFull));
            return handle;
        }
        handle
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Approximate number of queued tasks not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.tasks.count()
    }

    /// Usable capacity of the task queue.
    pub fn capacity(&self) -> usize {
        self.shared.tasks.capacity()
    }

    /// False once shutdown has begun.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Acquire)
    }

    /// Shuts the pool down and waits for every queued task to finish.
    pub fn join(self) {
        drop(self)
    }

    fn shutdown(&mut self) {
        self.shared.active.store(false, Release);
        tracing::debug!(
            threads = self.workers.len(),
            pending = self.shared.tasks.count(),
            "thread pool shutting down"
        );
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().map(str::to_owned);
            if worker.join().is_err() {
                tracing::warn!(worker = ?name, "worker thread panicked");
            }
        }
        tracing::debug!("thread pool joined");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.workers.len())
            .field("pending", &self.pending())
            .field("active", &self.is_active())
            .field("wait", &self.shared.wait)
            .finish()
    }
}

impl Shared {
    /// Worker body: running until the active flag clears, then draining, then stopped.
    fn work(&self, id: usize) {
        tracing::trace!(worker = id, "worker started");
        while self.active.load(Acquire) {
            if let Some(job) = self.next_task() {
                run(id, job);
            }
        }

        tracing::trace!(worker = id, "worker draining");
        let mut drained = 0usize;
        while let Some(job) = self.tasks.try_pop() {
            run(id, job);
            drained += 1;
        }
        tracing::trace!(worker = id, drained, "worker stopped");
    }

    /// Waits for a task according to the configured strategy. `None` means the wait elapsed
    /// and the caller should re-check the active flag.
    fn next_task(&self) -> Option<Task> {
        match self.wait {
            WaitStrategy::Blocking { timeout } => self.tasks.pop_timeout(timeout),
            WaitStrategy::Backoff { retries, sleep } => {
                for _ in 0..=retries {
                    if let Some(job) = self.tasks.try_pop() {
                        return Some(job);
                    }
                }
                thread::sleep(sleep);
                None
            }
        }
    }
}

/// Runs one task, keeping a panic from taking the worker down with it.
fn run(id: usize, job: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        tracing::warn!(
            worker = id,
            panic = %task::panic_message(payload.as_ref()),
            "task panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::SeqCst;
    use std::sync::{Barrier, Mutex};
    use std::time::Duration;

    fn drains_all_tasks(wait: WaitStrategy) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::with_config(PoolConfig::new(4).threads(2).wait(wait)).unwrap();
        assert_eq!(pool.threads(), 2);
        assert_eq!(pool.capacity(), 15);

        for i in 0..15 {
            let log = Arc::clone(&log);
            pool.execute(move || log.lock().unwrap().push(i)).unwrap();
        }
        drop(pool);

        let mut log = log.lock().unwrap().clone();
        log.sort_unstable();
        assert_eq!(log, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn drop_runs_every_queued_task_blocking() {
        drains_all_tasks(WaitStrategy::blocking());
    }

    #[test]
    fn drop_runs_every_queued_task_backoff() {
        drains_all_tasks(WaitStrategy::backoff());
    }

    #[test]
    fn drop_drains_tasks_queued_before_shutdown() {
        // one worker held on a barrier while the whole queue fills up behind it
        let gate = Arc::new(Barrier::new(2));
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(4, 1).unwrap();

        let started = Arc::new(Barrier::new(2));
        {
            let gate = Arc::clone(&gate);
            let started = Arc::clone(&started);
            pool.execute(move || {
                started.wait();
                gate.wait();
            })
            .unwrap();
        }
        started.wait();

        for _ in 0..15 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, SeqCst);
            })
            .unwrap();
        }

        let release = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gate.wait();
        });
        drop(pool);
        release.join().unwrap();
        assert_eq!(counter.load(SeqCst), 15);
    }

    #[test]
    fn full_queue_rejects_both_submission_forms() {
        const WORKERS: usize = 2;
        let started = Arc::new(Barrier::new(WORKERS + 1));
        let release = Arc::new(Barrier::new(WORKERS + 1));
        let pool = ThreadPool::new(4, WORKERS).unwrap();

        for _ in 0..WORKERS {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            pool.execute(move || {
                started.wait();
                release.wait();
            })
            .unwrap();
        }
        // both workers are now parked inside a task
        started.wait();

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..pool.capacity() {
            let ran = Arc::clone(&ran);
            pool.execute(move || {
                ran.fetch_add(1, SeqCst);
            })
            .unwrap();
        }

        assert_eq!(pool.execute(|| {}), Err(AtomyError::QueueFull));

        let invoked = Arc::new(AtomicUsize::new(0));
        let handle = {
            let invoked = Arc::clone(&invoked);
            pool.submit(move || invoked.fetch_add(1, SeqCst))
        };
        assert_eq!(handle.try_get(), Some(Err(AtomyError::QueueFull)));

        release.wait();
        drop(pool);
        assert_eq!(ran.load(SeqCst), 15);
        assert_eq!(invoked.load(SeqCst), 0, "rejected task must never run");
    }

    #[test]
    fn submit_returns_value() {
        let pool = ThreadPool::new(3, 2).unwrap();
        let handles: Vec<_> = (0..5u64).map(|i| pool.submit(move || i * i)).collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, vec![0, 1, 4, 9, 16]);
    }

    #[test]
    fn panicking_tasks_do_not_kill_workers() {
        let pool = ThreadPool::new(3, 1).unwrap();

        pool.execute(|| panic!("fire and forget")).unwrap();
        let failed = pool.submit(|| -> u32 { panic!("with result") });
        assert_eq!(
            failed.wait(),
            Err(AtomyError::TaskPanicked("with result".to_string()))
        );

        // the single worker is still alive and serving
        assert_eq!(pool.submit(|| 11).wait(), Ok(11));
        assert!(pool.is_active());
    }

    #[test]
    fn idle_pool_shuts_down_promptly() {
        let pool = ThreadPool::with_config(
            PoolConfig::new(2)
                .threads(4)
                .wait(WaitStrategy::Blocking {
                    timeout: Duration::from_millis(10),
                }),
        )
        .unwrap();
        assert_eq!(pool.pending(), 0);
        pool.join();
    }

    #[test]
    fn invalid_exponent_is_rejected() {
        assert_eq!(
            ThreadPool::new(0, 1).err(),
            Some(AtomyError::InvalidExponent(0))
        );
    }

    #[test]
    fn workers_are_named() {
        let pool =
            ThreadPool::with_config(PoolConfig::new(2).threads(1).thread_name("named")).unwrap();
        let name = pool
            .submit(|| thread::current().name().map(str::to_owned))
            .wait()
            .unwrap();
        assert_eq!(name.as_deref(), Some("named-0"));
    }
}
