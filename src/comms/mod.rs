//! Blocking communication on top of the lock-free containers.
//!
//! Currently this holds `Channel`, a bounded queue with blocking and timed receives.
pub mod channel;
