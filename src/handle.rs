use crate::error::PoolError;

use std::fmt;
use std::panic;
use std::thread;

use crossbeam_channel::Receiver;
use tracing::warn;

/// A handle to a task submitted to the [`ThreadPoolManager`].
///
/// Each handle is bound one-to-one with its task at submission time and
/// resolves exactly once: either with the task's result, or immediately with
/// the type's default value if the submission was rejected.
///
/// [`ThreadPoolManager`]: crate::ThreadPoolManager
pub struct TaskHandle<R: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) result_receiver: Option<Receiver<thread::Result<R>>>,
  pub(crate) rejection: Option<PoolError>,
}

impl<R: Send + 'static> TaskHandle<R> {
  pub(crate) fn bound(task_id: u64, result_receiver: Receiver<thread::Result<R>>) -> Self {
    Self {
      task_id,
      result_receiver: Some(result_receiver),
      rejection: None,
    }
  }

  /// Creates the handle returned for a submission the pool did not accept.
  pub(crate) fn rejected(task_id: u64, reason: PoolError) -> Self {
    Self {
      task_id,
      result_receiver: None,
      rejection: Some(reason),
    }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Returns `false` only if the submission was rejected by backpressure or
  /// the pool was not running. Callers must check this before relying on
  /// [`get`](Self::get) for a meaningful value.
  pub fn is_valid(&self) -> bool {
    self.result_receiver.is_some()
  }

  /// Blocks until the bound task has completed, then returns its value.
  ///
  /// An invalid handle returns `R::default()` immediately, never blocking.
  /// If the task panicked, the panic is resumed here: a panicking task is a
  /// programmer error and is fatal at the point of use.
  pub fn get(self) -> R
  where
    R: Default,
  {
    match self.into_result() {
      Ok(value) => value,
      Err(_) => R::default(),
    }
  }

  /// Blocking retrieval that reports rejection instead of defaulting.
  ///
  /// # Errors
  /// Returns the rejection cause (`PoolError::QueueFull` or
  /// `PoolError::PoolNotRunning`) if the handle is invalid.
  /// Returns `PoolError::ResultChannelError` if the completing side went away
  /// without resolving the task.
  pub fn into_result(mut self) -> Result<R, PoolError> {
    let Some(rx) = self.result_receiver.take() else {
      return Err(self.rejection.take().unwrap_or(PoolError::ResultUnavailable));
    };
    match rx.recv() {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(panic_payload)) => panic::resume_unwind(panic_payload),
      Err(recv_error) => {
        warn!(task_id = %self.task_id, "Result channel receive error: {}", recv_error);
        Err(PoolError::ResultChannelError(format!(
          "Task (id: {}) result channel unexpectedly closed: {}",
          self.task_id, recv_error
        )))
      }
    }
  }
}

impl<R: Send + 'static> fmt::Debug for TaskHandle<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskHandle")
      .field("task_id", &self.task_id)
      .field("valid", &self.is_valid())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::time::Duration;

  #[test]
  fn test_rejected_handle_defaults_immediately() {
    let handle = TaskHandle::<i64>::rejected(3, PoolError::PoolNotRunning);
    assert!(!handle.is_valid());
    assert_eq!(handle.get(), 0);
  }

  #[test]
  fn test_rejected_handle_into_result_reports_cause() {
    let reason = PoolError::QueueFull(Duration::from_secs(1));
    let handle = TaskHandle::<String>::rejected(4, reason);
    assert_eq!(
      handle.into_result(),
      Err(PoolError::QueueFull(Duration::from_secs(1)))
    );
  }

  #[test]
  fn test_bound_handle_returns_sent_value() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = TaskHandle::bound(5, rx);
    assert!(handle.is_valid());
    tx.send(Ok("done".to_string())).unwrap();
    assert_eq!(handle.get(), "done");
  }
}
