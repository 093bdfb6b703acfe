//! A thread-based pool for executing closures on a bounded set of reusable
//! worker threads, with bounded queueing, submission backpressure, optional
//! elastic sizing and per-task result handles.
//!
//! The pool runs in one of two modes. In [`PoolMode::Static`] the worker
//! count is fixed after [`ThreadPoolManager::start`]. In [`PoolMode::Elastic`]
//! the pool spawns additional workers while the queue outgrows the idle set,
//! up to a configurable ceiling, and reclaims them once they idle past a
//! timeout.
//!
//! Every submission is bound, before enqueueing, to exactly one
//! [`TaskHandle`], which the caller later blocks on to retrieve the typed
//! result. A full queue never produces an error or an unbounded block:
//! submission waits briefly for a slot and otherwise returns an invalid
//! handle, which resolves to the type's default value immediately.

mod error;
mod handle;
mod manager;
mod task;
mod worker;

pub use error::PoolError;
pub use handle::TaskHandle;
pub use manager::{PoolMode, ThreadPoolManager};
pub use task::TaskFn;
