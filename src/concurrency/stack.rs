//! Lock-free LIFO stack (Treiber stack).
//!
//! Nodes are linked from a single atomic `top` pointer and swapped in and out with
//! compare-and-swap loops. A popped node is not freed on the spot: another thread may have
//! read the same `top` and be about to follow its `next` link, so the node is retired through
//! `crossbeam_epoch` and only reclaimed once every thread pinned at that time has moved on.
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_epoch::{self as epoch, Atomic, Owned};

struct Node<T> {
    /// Moved out by the popping thread, never dropped with the node
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

/// Unbounded lock-free stack with epoch-based node reclamation.
pub struct Stack<T> {
    top: Atomic<Node<T>>,
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Stack::new()
    }
}

impl<T> Stack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self { top: Atomic::null() }
    }

    /// Pushes an item on top of the stack. Always succeeds.
    pub fn push(&self, item: T) {
        let mut node = Owned::new(Node {
            value: ManuallyDrop::new(item),
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        loop {
            let top = self.top.load(Relaxed, &guard);
            node.next.store(top, Relaxed);
            match self
                .top
                .compare_exchange_weak(top, node, Release, Relaxed, &guard)
            {
                Ok(_) => return,
                Err(err) => node = err.new,
            }
        }
    }

    /// Pops the most recently pushed item, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let top = self.top.load(Acquire, &guard);
            // the guard keeps `top` alive even if another thread pops it first
            let node = unsafe { top.as_ref() }?;
            let next = node.next.load(Relaxed, &guard);
            if self
                .top
                .compare_exchange_weak(top, next, Relaxed, Relaxed, &guard)
                .is_ok()
            {
                unsafe {
                    let value = ptr::read(&*node.value);
                    guard.defer_destroy(top);
                    return Some(value);
                }
            }
        }
    }

    /// True when no items are held.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.top.load(Acquire, &guard).is_null()
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        // `&mut self` means no other thread can observe the nodes anymore.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.top.load(Relaxed, guard);
            while !current.is_null() {
                let mut node = current.into_owned();
                current = node.next.load(Relaxed, guard);
                ManuallyDrop::drop(&mut node.value);
            }
        }
    }
}

impl<T> std::fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("empty", &self.is_empty())
            .finish()
    }
}

unsafe impl<T: Send> Send for Stack<T> {}
unsafe impl<T: Send> Sync for Stack<T> {}
