//! Non-blocking containers.
//!
//! `queue` holds a bounded multi-producer, multi-consumer FIFO built on index reservation,
//! and `stack` an unbounded LIFO with epoch-based reclamation. Neither ever parks the caller:
//! every operation either completes after a bounded number of compare-and-swap retries or
//! reports that it is not possible right now.
pub mod queue;
pub mod stack;
