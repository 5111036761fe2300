use integration::Stop;
use skq::*;
use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
  thread,
  time::Duration,
};

fn main() {
  const N: usize = 1000;

  let executor = ScheduledExecutor::new().unwrap();
  let runs = Arc::new(AtomicUsize::new(0));
  let stop = Stop::default();

  let ticker = {
    let stop = stop.clone();
    executor
      .schedule_at_fixed_rate(Duration::ZERO, Duration::from_millis(1), move || {
        assert!(!stop.is_stopped(), "periodic task ran after shutdown");
      })
      .unwrap()
  };

  let tasks = (0..N)
    .map(|i| {
      let runs = runs.clone();
      executor
        .schedule(Duration::from_millis((i % 50) as u64), move || {
          runs.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
    })
    .collect::<Vec<_>>();

  for (i, task) in tasks.iter().enumerate() {
    if i % 10 == 0 {
      task.cancel();
    }
  }

  thread::sleep(Duration::from_millis(10));
  executor.shutdown();
  assert!(executor.await_termination(Duration::from_secs(10)));
  stop.stop();

  assert!(ticker.is_cancelled());
  let cancelled = tasks.iter().filter(|t| t.is_cancelled()).count();
  assert_eq!(runs.load(Ordering::SeqCst) + cancelled, N);
}
