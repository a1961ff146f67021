//! Result handles for value-returning pool submissions.
use std::any::Any;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::AtomyError;

/// Handle to the eventual result of a task submitted with
/// [`ThreadPool::submit`](super::pool::ThreadPool::submit).
///
/// Submission failures and task failures arrive through the same channel, so a caller
/// that only looks at the handle sees one uniform `Result`.
#[derive(Debug)]
pub struct TaskHandle<T> {
    result: Receiver<Result<T, AtomyError>>,
}

/// Sending half kept inside the queued task.
pub(crate) struct Completer<T> {
    result: Sender<Result<T, AtomyError>>,
}

pub(crate) fn pair<T>() -> (Completer<T>, TaskHandle<T>) {
    let (tx, rx) = channel::bounded(1);
    (Completer { result: tx }, TaskHandle { result: rx })
}

impl<T> Completer<T> {
    pub(crate) fn complete(self, result: Result<T, AtomyError>) {
        // the caller may have dropped its handle, nobody is left to tell
        let _ = self.result.send(result);
    }
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has run (or was rejected) and returns its result.
    pub fn wait(self) -> Result<T, AtomyError> {
        self.result
            .recv()
            .unwrap_or(Err(AtomyError::Disconnected))
    }

    /// Blocks for at most `timeout`. On `Err(Timeout)` the handle can be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, AtomyError> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AtomyError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(AtomyError::Disconnected),
        }
    }

    /// Returns the result if it is already available.
    pub fn try_get(&self) -> Option<Result<T, AtomyError>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(AtomyError::Disconnected)),
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
