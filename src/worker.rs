use crate::error::PoolError;
use crate::manager::PoolCore;

use std::sync::Arc;
use std::thread;

use tracing::debug;

/// One execution slot of the pool: an identity plus the pool-supplied loop.
///
/// Identities come from a monotonically increasing counter scoped to the pool
/// core and are never reused. The thread is detached on launch: the loop
/// alone decides when to return, and deregisters its own identity from the
/// pool's worker registry before doing so. This keeps shutdown from having to
/// join an arbitrary number of dynamically created threads.
#[derive(Debug)]
pub(crate) struct Worker {
  id: u64,
}

impl Worker {
  pub(crate) fn new(id: u64) -> Self {
    Self { id }
  }

  /// Launches the worker loop on an independent, named thread.
  ///
  /// The spawned thread is not tracked further. A spawn failure is fatal to
  /// this worker only; the caller reverts its registration.
  pub(crate) fn start(&self, core: Arc<PoolCore>) -> Result<(), PoolError> {
    let id = self.id;
    let name = format!("{}-worker-{}", core.pool_name(), id);
    thread::Builder::new()
      .name(name)
      .spawn(move || core.worker_loop(id))
      .map_err(|spawn_error| PoolError::WorkerSpawnFailed(spawn_error.to_string()))?;
    debug!(worker_id = %id, "Worker thread launched.");
    Ok(())
  }
}
