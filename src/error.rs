use std::fmt::Display;

use thiserror::Error;

/// Wrapper type for `std::io::Error`
#[derive(Debug, Error)]
pub struct IoError(std::io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl Eq for IoError {}
impl Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError(err)
    }
}

/// Error type for all primitives
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtomyError {
    #[error("Capacity exponent {0} is out of range, must be at least 1 and below the pointer width minus one")]
    InvalidExponent(u8),
    #[error("Task queue is full")]
    QueueFull,
    #[error("Task panicked: {0}")]
    TaskPanicked(String),
    #[error("Task was dropped before it produced a result")]
    Disconnected,
    #[error("Timed out waiting for the task result")]
    Timeout,
    #[error("I/O error while spawning a worker {:?}", err)]
    Io {
        #[from]
        err: IoError,
    },
}

impl From<std::io::Error> for AtomyError {
    fn from(err: std::io::Error) -> Self {
        AtomyError::Io { err: err.into() }
    }
}
