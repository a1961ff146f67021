//! Bounded lock-free multi-producer, multi-consumer queue.
//!
//! `Queue` orders concurrent operations with index reservation: a producer first claims a
//! slot by advancing the reservation index with a compare-and-swap, writes into it, and then
//! waits for every earlier claimant to publish before publishing its own slot. Consumers
//! mirror the protocol with their own pair of indices, so items become visible strictly in
//! reservation order even though the writes themselves happen out of order.
//!
//! The backing array has `2^n` slots, one of which always stays empty to tell "full" apart
//! from "empty", so the usable capacity is `2^n - 1`.
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Release};

use crossbeam_utils::{Backoff, CachePadded};

use crate::AtomyError;

/// A bounded lock-free MPMC FIFO queue with `2^n - 1` usable slots.
///
/// The four indices grow monotonically and are reduced with `mask` only when a slot is
/// addressed, which keeps the reservation compare-and-swap free of ABA on wrap-around.
pub struct Queue<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Producer reservation index
    pre_tail: CachePadded<AtomicUsize>,
    /// Producer publish index, everything below it is readable
    pos_tail: CachePadded<AtomicUsize>,
    /// Consumer reservation index
    pre_head: CachePadded<AtomicUsize>,
    /// Consumer publish index, everything below it is free for producers
    pos_head: CachePadded<AtomicUsize>,
}

impl<T> Queue<T> {
    /// Creates a queue with `2^n` slots.
    ///
    /// `n == 0` would leave zero usable slots and is rejected, as is any exponent that does
    /// not fit the pointer width.
    pub fn new(n: u8) -> Result<Self, AtomyError> {
        if n == 0 || u32::from(n) >= usize::BITS - 1 {
            return Err(AtomyError::InvalidExponent(n));
        }
        let size = 1usize << n;
        let slots = (0..size)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            slots,
            mask: size - 1,
            pre_tail: CachePadded::new(AtomicUsize::new(0)),
            pos_tail: CachePadded::new(AtomicUsize::new(0)),
            pre_head: CachePadded::new(AtomicUsize::new(0)),
            pos_head: CachePadded::new(AtomicUsize::new(0)),
        })
    }

    /// Pushes an item to the tail of the queue.
    ///
    /// Returns the item back if the queue is full; the queue is left untouched in that case.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut tail = self.pre_tail.load(Acquire);
        loop {
            let head = self.pos_head.load(Acquire);
            let used = tail.wrapping_sub(head);
            if used > self.mask {
                // stale tail snapshot, the consumers are already past it
                tail = self.pre_tail.load(Acquire);
                continue;
            }
            if used == self.mask {
                return Err(item);
            }
            match self
                .pre_tail
                .compare_exchange_weak(tail, tail.wrapping_add(1), AcqRel, Acquire)
            {
                Ok(_) => break,
                Err(current) => tail = current,
            }
        }

        // Reserved slots are exclusively ours until `pos_tail` moves past them.
        unsafe {
            (*self.slots[tail & self.mask].get()).write(item);
        }

        let backoff = Backoff::new();
        while self.pos_tail.load(Acquire) != tail {
            backoff.snooze();
        }
        self.pos_tail.store(tail.wrapping_add(1), Release);
        Ok(())
    }

    /// Pops the item at the head of the queue, or `None` if it is empty.
    pub fn pop(&self) -> Option<T> {
        let mut head = self.pre_head.load(Acquire);
        loop {
            let tail = self.pos_tail.load(Acquire);
            if tail == head {
                return None;
            }
            if tail.wrapping_sub(head) > self.mask {
                head = self.pre_head.load(Acquire);
                continue;
            }
            match self
                .pre_head
                .compare_exchange_weak(head, head.wrapping_add(1), AcqRel, Acquire)
            {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        // The slot was published by a producer and no other consumer can claim it.
        let item = unsafe { (*self.slots[head & self.mask].get()).assume_init_read() };

        let backoff = Backoff::new();
        while self.pos_head.load(Acquire) != head {
            backoff.snooze();
        }
        self.pos_head.store(head.wrapping_add(1), Release);
        Some(item)
    }

    /// Non-blocking pop. The queue never blocks, so this is the same as [`Queue::pop`].
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.pop()
    }

    /// True when the next reservation would collide with the oldest unread slot.
    pub fn is_full(&self) -> bool {
        let head = self.pos_head.load(Acquire);
        let tail = self.pre_tail.load(Acquire);
        tail.wrapping_sub(head) >= self.mask
    }

    /// True when every published item has been reserved by a consumer.
    pub fn is_empty(&self) -> bool {
        let head = self.pre_head.load(Acquire);
        self.pos_tail.load(Acquire) == head
    }

    /// Total number of slots, `2^n`.
    #[inline]
    pub fn size(&self) -> usize {
        self.mask + 1
    }

    /// Usable number of slots, `2^n - 1`.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Number of items currently held. Only a snapshot under concurrent use.
    pub fn count(&self) -> usize {
        let head = self.pre_head.load(Acquire);
        let tail = self.pre_tail.load(Acquire);
        tail.wrapping_sub(head).min(self.mask)
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        let head = *self.pre_head.get_mut();
        let tail = *self.pos_tail.get_mut();
        let mut idx = head;
        while idx != tail {
            unsafe {
                self.slots[idx & self.mask].get_mut().assume_init_drop();
            }
            idx = idx.wrapping_add(1);
        }
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("size", &self.size())
            .field("count", &self.count())
            .finish()
    }
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}
