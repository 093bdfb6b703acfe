use thread_orchestra::{PoolMode, ThreadPoolManager};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use rand::Rng;

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter =
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,thread_orchestra=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

#[test]
fn test_backpressure_rejects_when_queue_stays_full() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::new("test_pool_backpressure");
  pool.set_queue_capacity(2);
  pool.start(1);

  // Park the only worker on a gate so the queue cannot drain.
  let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
  let blocker = pool.submit(Box::new(move || {
    let _ = gate_rx.recv();
  }));
  assert!(blocker.is_valid());

  // Give the worker time to dequeue the blocker, leaving the queue empty.
  sleep(Duration::from_millis(100));
  assert_eq!(pool.queued_task_count(), 0);

  let first = pool.submit(Box::new(|| 1u32));
  let second = pool.submit(Box::new(|| 2u32));
  assert!(first.is_valid());
  assert!(second.is_valid());
  assert_eq!(pool.queued_task_count(), 2);

  // The queue is at capacity and the worker is parked, so the next submit
  // must time out and come back invalid.
  let started = Instant::now();
  let third = pool.submit(Box::new(|| 3u32));
  let waited = started.elapsed();
  assert!(!third.is_valid());
  assert!(
    waited >= Duration::from_millis(800),
    "rejection should only happen after the backpressure window, waited {:?}",
    waited
  );

  let resolved = Instant::now();
  assert_eq!(third.get(), 0);
  assert!(resolved.elapsed() < Duration::from_millis(100));

  gate_tx.send(()).unwrap();
  assert_eq!(first.get(), 1);
  assert_eq!(second.get(), 2);
  blocker.get();

  pool.shutdown();
  assert_eq!(pool.current_worker_count(), 0);
}

#[test]
fn test_elastic_pool_scales_up_and_decays() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::new("test_pool_elastic_scaling");
  pool.set_mode(PoolMode::Elastic);
  pool.set_worker_ceiling(8);
  pool.set_idle_timeout(Duration::from_millis(300));
  pool.start(2);
  assert_eq!(pool.current_worker_count(), 2);

  let handles: Vec<_> = (0..10)
    .map(|_| {
      pool.submit(Box::new(|| {
        sleep(Duration::from_millis(400));
        1u64
      }))
    })
    .collect();

  let grown = pool.current_worker_count();
  assert!(grown > 2, "pool should have grown under pressure, got {}", grown);
  assert!(grown <= 8, "pool must stay bounded by the ceiling, got {}", grown);

  let total: u64 = handles.into_iter().map(|h| h.get()).sum();
  assert_eq!(total, 10);

  // After the burst completes, surplus workers idle past the timeout and
  // reclaim themselves down to the initial count.
  sleep(Duration::from_secs(4));
  assert_eq!(pool.current_worker_count(), 2);
  assert_eq!(pool.idle_worker_count(), 2);

  pool.shutdown();
  assert_eq!(pool.current_worker_count(), 0);
}

#[test]
fn test_shutdown_drains_queued_work_first() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::new("test_pool_shutdown_drains");
  pool.start(1);

  let completed = Arc::new(AtomicUsize::new(0));
  let handles: Vec<_> = (0..5)
    .map(|_| {
      let completed = completed.clone();
      pool.submit(Box::new(move || {
        sleep(Duration::from_millis(30));
        completed.fetch_add(1, Ordering::SeqCst);
      }))
    })
    .collect();

  pool.shutdown();
  assert_eq!(completed.load(Ordering::SeqCst), 5);
  assert_eq!(pool.current_worker_count(), 0);
  assert_eq!(pool.queued_task_count(), 0);

  // Every accepted task resolved before shutdown returned.
  for handle in handles {
    assert!(handle.is_valid());
    handle.get();
  }
}

#[test]
fn test_shutdown_is_prompt_when_idle_and_idempotent() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::new("test_pool_shutdown_prompt");
  pool.start(4);
  sleep(Duration::from_millis(50));

  let started = Instant::now();
  pool.shutdown();
  assert!(
    started.elapsed() < Duration::from_secs(1),
    "idle shutdown should terminate promptly"
  );
  assert_eq!(pool.current_worker_count(), 0);
  assert!(!pool.is_running());

  // A second call must return immediately without blocking.
  pool.shutdown();
}

#[test]
fn test_elastic_stress_with_random_durations() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::new("test_pool_elastic_stress");
  pool.set_mode(PoolMode::Elastic);
  pool.set_worker_ceiling(6);
  pool.start(2);

  let mut rng = rand::rng();
  let handles: Vec<_> = (0u64..50)
    .map(|i| {
      let pause = Duration::from_millis(rng.random_range(1..20));
      pool.submit(Box::new(move || {
        sleep(pause);
        i
      }))
    })
    .collect();

  let total: u64 = handles.into_iter().map(|h| h.get()).sum();
  assert_eq!(total, (0u64..50).sum());

  pool.shutdown();
  assert_eq!(pool.current_worker_count(), 0);
}
