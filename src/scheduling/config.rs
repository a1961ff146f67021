//! Construction parameters for [`ThreadPool`](super::pool::ThreadPool).
use std::fmt::Display;
use std::time::Duration;

/// How an idle worker waits for the next task while the pool is active.
///
/// Both strategies honour the same contract; they differ only in wake-up latency and in how
/// much CPU an idle pool burns.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Park on the channel's condition variable for up to `timeout`, then re-check the
    /// active flag.
    Blocking { timeout: Duration },
    /// Retry the queue `retries` times in a row, then sleep for `sleep` before trying again.
    Backoff { retries: u32, sleep: Duration },
}

impl WaitStrategy {
    /// The blocking strategy with a 100 ms re-check interval.
    pub const fn blocking() -> Self {
        WaitStrategy::Blocking {
            timeout: Duration::from_millis(100),
        }
    }

    /// The retry-then-sleep strategy with 64 retries and a 1 ms sleep.
    pub const fn backoff() -> Self {
        WaitStrategy::Backoff {
            retries: 64,
            sleep: Duration::from_millis(1),
        }
    }
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::blocking()
    }
}

impl Display for WaitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitStrategy::Blocking { timeout } => write!(f, "blocking ({timeout:?})"),
            WaitStrategy::Backoff { retries, sleep } => {
                write!(f, "backoff ({retries} retries, {sleep:?} sleep)")
            }
        }
    }
}

/// Builder-style pool configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Task queue holds `2^capacity_exponent - 1` tasks
    pub capacity_exponent: u8,
    /// Worker count, 0 means one per available core
    pub threads: usize,
    pub wait: WaitStrategy,
    /// Workers are named `{thread_name}-{index}`
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity_exponent: 10,
            threads: 0,
            wait: WaitStrategy::default(),
            thread_name: "atomy-worker".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn new(capacity_exponent: u8) -> Self {
        Self {
            capacity_exponent,
            ..Self::default()
        }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Worker count after resolving `0` to the available parallelism.
    pub fn resolved_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
