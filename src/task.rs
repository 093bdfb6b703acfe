use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::Sender;
use tracing::error;

/// The unit of work accepted by the pool.
/// It must be `Send` and `'static`, and produce a result of type `R`.
pub type TaskFn<R> = Box<dyn FnOnce() -> R + Send + 'static>;

/// Internal representation of a task sitting in the pool's queue.
///
/// The concrete result type is erased here: the run closure captures the
/// typed sender half of the handle's result channel, so heterogeneous task
/// types can share one queue while each handle stays fully typed. Executing
/// the closure delivers the outcome and thereby performs the completion
/// signal; the binding was fixed at submission and is never reassigned.
pub(crate) struct QueuedTask {
  task_id: u64,
  run: Box<dyn FnOnce() + Send + 'static>,
}

impl QueuedTask {
  pub(crate) fn new<R: Send + 'static>(
    task_id: u64,
    task: TaskFn<R>,
    result_tx: Sender<thread::Result<R>>,
  ) -> Self {
    let run = Box::new(move || {
      let outcome = panic::catch_unwind(AssertUnwindSafe(task));
      if outcome.is_err() {
        error!(%task_id, "Task panicked during execution.");
      }
      // A dropped receiver just means the caller lost interest in the result.
      let _ = result_tx.send(outcome);
    });
    Self { task_id, run }
  }

  pub(crate) fn task_id(&self) -> u64 {
    self.task_id
  }

  /// Executes the user routine and resolves the bound handle.
  pub(crate) fn run(self) {
    (self.run)()
  }
}

impl fmt::Debug for QueuedTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueuedTask")
      .field("task_id", &self.task_id)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossbeam_channel::bounded;

  #[test]
  fn test_run_delivers_result() {
    let (tx, rx) = bounded(1);
    let task = QueuedTask::new(7, Box::new(|| 21 * 2), tx);
    assert_eq!(task.task_id(), 7);
    task.run();
    assert_eq!(rx.recv().unwrap().unwrap(), 42);
  }

  #[test]
  fn test_run_captures_panic() {
    let (tx, rx) = bounded::<thread::Result<u32>>(1);
    let task = QueuedTask::new(8, Box::new(|| -> u32 { panic!("boom") }), tx);
    task.run();
    assert!(rx.recv().unwrap().is_err());
  }

  #[test]
  fn test_run_tolerates_dropped_receiver() {
    let (tx, rx) = bounded::<thread::Result<u32>>(1);
    drop(rx);
    QueuedTask::new(9, Box::new(|| 1), tx).run();
  }
}
