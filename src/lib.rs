//! Small concurrency toolkit: a bounded lock-free queue, a lock-free stack, a blocking
//! channel built on the queue, and a worker pool built on the channel.
//!
//! ```
//! use atomy::ThreadPool;
//!
//! let pool = ThreadPool::new(4, 2).unwrap();
//! let answer = pool.submit(|| 6 * 7);
//! assert_eq!(answer.wait(), Ok(42));
//! ```
pub mod comms;
pub mod concurrency;
pub mod error;
pub mod scheduling;

pub use comms::channel::Channel;
pub use concurrency::{queue::Queue, stack::Stack};
pub use error::{AtomyError, IoError};
pub use scheduling::{
    config::{PoolConfig, WaitStrategy},
    pool::{Task, ThreadPool},
    task::TaskHandle,
};
