use crate::error::PoolError;
use crate::handle::TaskHandle;
use crate::task::{QueuedTask, TaskFn};
use crate::worker::Worker;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

/// How long `submit` may wait for a queue slot before rejecting.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(1);
/// Wake-up interval for elastic workers waiting on an empty queue, so they
/// can re-check their idle expiry.
const IDLE_POLL: Duration = Duration::from_secs(1);

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_WORKER_CEILING: usize = 100;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Defines how the pool sizes its worker set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
  /// The worker count is fixed after `start`.
  Static,
  /// Workers are spawned on demand under queue pressure, up to a ceiling,
  /// and reclaimed once they idle past the idle timeout.
  Elastic,
}

#[derive(Debug, Clone, Copy)]
struct PoolConfig {
  mode: PoolMode,
  queue_capacity: usize,
  worker_ceiling: usize,
  idle_timeout: Duration,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      mode: PoolMode::Static,
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      worker_ceiling: DEFAULT_WORKER_CEILING,
      idle_timeout: DEFAULT_IDLE_TIMEOUT,
    }
  }
}

/// State shared between the manager and every worker thread.
///
/// The queue mutex serializes all pool-state mutation; the counters are
/// additionally atomic so the elastic scale-up heuristic can read them
/// without the lock (advisory only, tolerating bounded overshoot).
pub(crate) struct PoolCore {
  pool_name: Arc<String>,
  config: RwLock<PoolConfig>,
  queue: Mutex<VecDeque<QueuedTask>>,
  not_full: Condvar,
  not_empty: Condvar,
  workers_drained: Condvar,
  workers: DashMap<u64, Worker>,
  queued_tasks: AtomicUsize,
  idle_workers: AtomicUsize,
  current_workers: AtomicUsize,
  initial_workers: AtomicUsize,
  next_worker_id: AtomicU64,
  next_task_id: AtomicU64,
  running: AtomicBool,
}

impl PoolCore {
  fn new(pool_name: &str) -> Self {
    Self {
      pool_name: Arc::new(pool_name.to_string()),
      config: RwLock::new(PoolConfig::default()),
      queue: Mutex::new(VecDeque::new()),
      not_full: Condvar::new(),
      not_empty: Condvar::new(),
      workers_drained: Condvar::new(),
      workers: DashMap::new(),
      queued_tasks: AtomicUsize::new(0),
      idle_workers: AtomicUsize::new(0),
      current_workers: AtomicUsize::new(0),
      initial_workers: AtomicUsize::new(0),
      next_worker_id: AtomicU64::new(0),
      next_task_id: AtomicU64::new(0),
      running: AtomicBool::new(false),
    }
  }

  pub(crate) fn pool_name(&self) -> &str {
    &self.pool_name
  }

  /// Creates, registers and launches one worker. Registration happens before
  /// launch so the loop's self-deregistration can never precede it.
  fn spawn_worker(self: &Arc<Self>) {
    let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
    self.workers.insert(id, Worker::new(id));
    self.current_workers.fetch_add(1, Ordering::Relaxed);
    self.idle_workers.fetch_add(1, Ordering::Relaxed);

    let start_result = match self.workers.get(&id) {
      Some(worker) => worker.start(Arc::clone(self)),
      None => return,
    };

    if let Err(spawn_error) = start_result {
      error!(
        pool_name = %self.pool_name,
        worker_id = %id,
        "Worker thread creation failed: {}",
        spawn_error
      );
      self.workers.remove(&id);
      self.current_workers.fetch_sub(1, Ordering::Relaxed);
      self.idle_workers.fetch_sub(1, Ordering::Relaxed);
    }
  }

  /// Removes this worker's identity from the registry and wakes the shutdown
  /// waiter. Must be called with the queue lock held, so the drain wait in
  /// `shutdown` cannot miss the notification.
  fn deregister_worker(&self, worker_id: u64, reason: &str) {
    self.current_workers.fetch_sub(1, Ordering::Relaxed);
    self.idle_workers.fetch_sub(1, Ordering::Relaxed);
    self.workers.remove(&worker_id);
    self.workers_drained.notify_all();
    debug!(pool_name = %self.pool_name, %worker_id, reason, "Worker deregistered.");
  }

  /// The loop every worker thread runs until it deregisters itself.
  pub(crate) fn worker_loop(&self, worker_id: u64) {
    debug!(pool_name = %self.pool_name, %worker_id, "Worker loop started.");
    let mut last_active = Instant::now();

    loop {
      let (task, backlog) = {
        let mut queue = self.queue.lock();
        loop {
          if let Some(task) = queue.pop_front() {
            self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            self.idle_workers.fetch_sub(1, Ordering::Relaxed);
            break (task, !queue.is_empty());
          }

          // The stopped flag is only consulted once the queue is empty, so
          // accepted work always drains before workers exit.
          if !self.running.load(Ordering::Acquire) {
            self.deregister_worker(worker_id, "pool shutdown");
            return;
          }

          let (mode, idle_timeout) = {
            let config = self.config.read();
            (config.mode, config.idle_timeout)
          };
          match mode {
            PoolMode::Elastic => {
              let timed_out = self.not_empty.wait_for(&mut queue, IDLE_POLL).timed_out();
              if timed_out
                && last_active.elapsed() >= idle_timeout
                && self.current_workers.load(Ordering::Relaxed)
                  > self.initial_workers.load(Ordering::Relaxed)
              {
                self.deregister_worker(worker_id, "idle timeout");
                return;
              }
            }
            PoolMode::Static => self.not_empty.wait(&mut queue),
          }
        }
      };

      if backlog {
        // Cascading wake so a burst drains across all idle workers instead
        // of serially.
        self.not_empty.notify_all();
      }
      self.not_full.notify_all();

      trace!(
        pool_name = %self.pool_name,
        %worker_id,
        task_id = %task.task_id(),
        "Dequeued task, executing."
      );
      task.run();
      last_active = Instant::now();
      self.idle_workers.fetch_add(1, Ordering::Relaxed);
    }
  }
}

/// A pool of reusable worker threads executing submitted closures.
///
/// Configuration is only settable before [`start`](Self::start); setters are
/// silent no-ops while the pool is running. Dropping the manager blocks until
/// every worker has exited.
pub struct ThreadPoolManager {
  core: Arc<PoolCore>,
}

impl ThreadPoolManager {
  pub fn new(pool_name: &str) -> Self {
    Self {
      core: Arc::new(PoolCore::new(pool_name)),
    }
  }

  pub fn name(&self) -> &str {
    self.core.pool_name()
  }

  pub fn is_running(&self) -> bool {
    self.core.running.load(Ordering::Acquire)
  }

  pub fn mode(&self) -> PoolMode {
    self.core.config.read().mode
  }

  pub fn queue_capacity(&self) -> usize {
    self.core.config.read().queue_capacity
  }

  /// Returns the current number of tasks waiting in the queue.
  pub fn queued_task_count(&self) -> usize {
    self.core.queued_tasks.load(Ordering::Relaxed)
  }

  pub fn idle_worker_count(&self) -> usize {
    self.core.idle_workers.load(Ordering::Relaxed)
  }

  pub fn current_worker_count(&self) -> usize {
    self.core.current_workers.load(Ordering::Relaxed)
  }

  /// Selects static or elastic sizing. Ignored once the pool is running.
  pub fn set_mode(&self, mode: PoolMode) {
    if self.check_running("set_mode") {
      return;
    }
    self.core.config.write().mode = mode;
  }

  /// Caps the task queue. Ignored once the pool is running.
  pub fn set_queue_capacity(&self, capacity: usize) {
    if self.check_running("set_queue_capacity") {
      return;
    }
    self.core.config.write().queue_capacity = capacity.max(1);
  }

  /// Caps the worker count under elastic sizing. Ignored once the pool is
  /// running, and ignored outside [`PoolMode::Elastic`].
  pub fn set_worker_ceiling(&self, ceiling: usize) {
    if self.check_running("set_worker_ceiling") {
      return;
    }
    let mut config = self.core.config.write();
    if config.mode != PoolMode::Elastic {
      warn!(pool_name = %self.core.pool_name, "set_worker_ceiling only applies in Elastic mode, ignoring.");
      return;
    }
    config.worker_ceiling = ceiling.max(1);
  }

  /// Sets how long an elastic worker above the initial count may idle before
  /// self-terminating. Ignored once the pool is running, and ignored outside
  /// [`PoolMode::Elastic`].
  pub fn set_idle_timeout(&self, timeout: Duration) {
    if self.check_running("set_idle_timeout") {
      return;
    }
    let mut config = self.core.config.write();
    if config.mode != PoolMode::Elastic {
      warn!(pool_name = %self.core.pool_name, "set_idle_timeout only applies in Elastic mode, ignoring.");
      return;
    }
    config.idle_timeout = timeout;
  }

  /// One-time activation: creates, registers and launches `initial_workers`
  /// workers (at least one) and marks the pool running.
  pub fn start(&self, initial_workers: usize) {
    let core = &self.core;
    if core.running.swap(true, Ordering::AcqRel) {
      warn!(pool_name = %core.pool_name, "Start: pool is already running, ignoring.");
      return;
    }
    let initial = initial_workers.max(1);
    core.initial_workers.store(initial, Ordering::Relaxed);
    info!(
      pool_name = %core.pool_name,
      workers = initial,
      mode = ?core.config.read().mode,
      "Starting pool."
    );
    for _ in 0..initial {
      core.spawn_worker();
    }
  }

  /// Starts with one worker per available CPU.
  pub fn start_default(&self) {
    self.start(num_cpus::get());
  }

  /// Submits a task for execution and returns the handle bound to it.
  ///
  /// If the queue stays at capacity for the whole backpressure window the
  /// task is not enqueued and an invalid handle is returned; this never
  /// raises and never blocks without bound. Check
  /// [`TaskHandle::is_valid`] before relying on the result.
  pub fn submit<R: Send + 'static>(&self, task: TaskFn<R>) -> TaskHandle<R> {
    let core = &self.core;
    let task_id = core.next_task_id.fetch_add(1, Ordering::Relaxed);

    if !core.running.load(Ordering::Acquire) {
      warn!(pool_name = %core.pool_name, %task_id, "Submit: pool is not running, rejecting task.");
      return TaskHandle::rejected(task_id, PoolError::PoolNotRunning);
    }

    let (result_tx, result_rx) = bounded(1);
    let queued = QueuedTask::new(task_id, task, result_tx);
    let capacity = core.config.read().queue_capacity;

    {
      let mut queue = core.queue.lock();
      let deadline = Instant::now() + SUBMIT_TIMEOUT;
      while queue.len() >= capacity {
        if core.not_full.wait_until(&mut queue, deadline).timed_out() {
          if queue.len() >= capacity {
            warn!(
              pool_name = %core.pool_name,
              %task_id,
              "Submit: queue still full after {:?}, rejecting task.",
              SUBMIT_TIMEOUT
            );
            return TaskHandle::rejected(task_id, PoolError::QueueFull(SUBMIT_TIMEOUT));
          }
          break;
        }
      }
      queue.push_back(queued);
      core.queued_tasks.fetch_add(1, Ordering::Relaxed);
    }
    core.not_empty.notify_all();
    debug!(pool_name = %core.pool_name, %task_id, "Task enqueued.");

    let (mode, ceiling) = {
      let config = core.config.read();
      (config.mode, config.worker_ceiling)
    };
    if mode == PoolMode::Elastic {
      // Latency heuristic, not an exact sizing rule: the counters are read
      // outside the queue lock, so concurrent submitters may transiently
      // overshoot the ceiling by a bounded amount.
      let queued_now = core.queued_tasks.load(Ordering::Relaxed);
      let idle = core.idle_workers.load(Ordering::Relaxed);
      let current = core.current_workers.load(Ordering::Relaxed);
      if queued_now > idle && current < ceiling {
        debug!(
          pool_name = %core.pool_name,
          queued = queued_now,
          idle,
          current,
          "Queue pressure exceeds idle workers, spawning one more."
        );
        core.spawn_worker();
      }
    }

    TaskHandle::bound(task_id, result_rx)
  }

  /// Stops the pool and blocks until every worker has deregistered itself.
  ///
  /// Queued and in-flight tasks finish first: workers only observe the stop
  /// once the queue is empty. Idempotent.
  pub fn shutdown(&self) {
    let core = &self.core;
    if !core.running.swap(false, Ordering::AcqRel) {
      return;
    }
    info!(pool_name = %core.pool_name, "Initiating pool shutdown.");

    let mut queue = core.queue.lock();
    core.not_empty.notify_all();
    while !core.workers.is_empty() {
      core.workers_drained.wait(&mut queue);
    }
    info!(pool_name = %core.pool_name, "All workers drained, pool shut down.");
  }

  fn check_running(&self, setter: &str) -> bool {
    let running = self.core.running.load(Ordering::Acquire);
    if running {
      warn!(pool_name = %self.core.pool_name, setter, "Configuration ignored while the pool is running.");
    }
    running
  }
}

impl Drop for ThreadPoolManager {
  fn drop(&mut self) {
    self.shutdown();
  }
}
