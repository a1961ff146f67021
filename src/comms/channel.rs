//! Blocking MPMC channel layered over the lock-free [`Queue`].
//!
//! Pushing never blocks and never takes the lock unless somebody is parked. Popping first
//! tries the queue directly and only falls back to the mutex/condvar pair when it comes back
//! empty, waiting with a predicate that performs the dequeue itself. A notification that lands
//! before the waiter parks is therefore never lost: the predicate simply succeeds when it is
//! first evaluated, and spurious wakeups just rerun a non-blocking attempt.
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{fence, AtomicUsize};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{concurrency::queue::Queue, AtomyError};

/// A bounded channel with non-blocking `push` and blocking, timed, or immediate `pop`.
#[derive(Debug)]
pub struct Channel<T> {
    queue: Queue<T>,
    /// Guards nothing but the wait/notify handshake
    lock: Mutex<()>,
    ready: Condvar,
    /// Threads currently inside the locked slow path of `pop`
    waiters: AtomicUsize,
}

impl<T> Channel<T> {
    /// Creates a channel over a queue of `2^n` slots (`2^n - 1` usable).
    pub fn new(n: u8) -> Result<Self, AtomyError> {
        Ok(Self {
            queue: Queue::new(n)?,
            lock: Mutex::new(()),
            ready: Condvar::new(),
            waiters: AtomicUsize::new(0),
        })
    }

    /// Pushes an item without blocking, handing it back if the channel is full.
    ///
    /// On success at most one parked consumer is woken.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.queue.push(item)?;
        // pairs with the fence in `register`: either the waiter sees the item in its
        // predicate, or we see the waiter and notify after it has parked
        fence(SeqCst);
        if self.waiters.load(SeqCst) > 0 {
            drop(self.locked());
            self.ready.notify_one();
        }
        Ok(())
    }

    /// Blocks until an item is available and returns it.
    pub fn pop(&self) -> T {
        if let Some(item) = self.queue.pop() {
            return item;
        }
        let mut guard = self.register();
        let item = loop {
            if let Some(item) = self.queue.pop() {
                break item;
            }
            guard = self
                .ready
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        };
        self.waiters.fetch_sub(1, SeqCst);
        drop(guard);
        item
    }

    /// Blocks for at most `timeout` waiting for an item.
    ///
    /// A zero timeout makes exactly one non-blocking attempt, like [`Channel::try_pop`].
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(item) = self.queue.pop() {
            return Some(item);
        }
        if timeout.is_zero() {
            return None;
        }
        let mut slot = None;
        let guard = self.register();
        let (guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |_| {
                slot = self.queue.pop();
                slot.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);
        self.waiters.fetch_sub(1, SeqCst);
        drop(guard);
        slot
    }

    /// A single non-blocking attempt.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.queue.try_pop()
    }

    /// True when no items are currently available.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True when the next push would be rejected.
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Approximate number of items held.
    pub fn count(&self) -> usize {
        self.queue.count()
    }

    /// Usable capacity, `2^n - 1`.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    fn locked(&self) -> MutexGuard<'_, ()> {
        // the mutex protects no data, a poisoned guard is as good as a clean one
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the lock and announces a waiter before the first predicate check.
    fn register(&self) -> MutexGuard<'_, ()> {
        let guard = self.locked();
        self.waiters.fetch_add(1, SeqCst);
        fence(SeqCst);
        guard
    }
}
