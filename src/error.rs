use std::time::Duration;

use thiserror::Error;

/// Errors that can occur within the `thread_orchestra` pool.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("Task queue stayed full for {0:?}, submission rejected")]
  QueueFull(Duration),

  #[error("Pool is not running, cannot accept new tasks")]
  PoolNotRunning,

  #[error("Failed to spawn worker thread: {0}")]
  WorkerSpawnFailed(String),

  #[error("Task result already taken or the submission was rejected")]
  ResultUnavailable,

  #[error("Task result channel unexpectedly closed: {0}")]
  ResultChannelError(String),
}
