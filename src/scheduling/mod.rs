//! Task execution on a fixed set of worker threads.
//!
//! `pool` holds the `ThreadPool` itself, `config` its construction parameters, and `task` the
//! handles returned by value-producing submissions.
pub mod config;
pub mod pool;
pub mod task;
