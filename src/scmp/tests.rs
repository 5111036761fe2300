use super::*;
use crate::{CondvarSynchronizer, ParkSynchronizer, SyncKind};

use std::{
  sync::Arc,
  thread,
  time::{Duration, Instant},
};

#[cfg(not(miri))]
const N: usize = 10_000;
#[cfg(miri)]
const N: usize = 64;

fn all_options() -> [Options; 3] {
  [
    Options::new(),
    Options::new().with_spins(64),
    Options::new().with_sync(SyncKind::Condvar),
  ]
}

#[test]
fn test_poll_and_peek() {
  let q = ScmpQueue::new();
  assert_eq!(q.poll(), None);
  assert_eq!(q.peek(), None);

  assert!(q.offer(5));
  q.put(1);
  q.offer(3);
  assert_eq!(q.len(), 3);
  assert_eq!(q.peek(), Some(1));
  assert_eq!(q.poll(), Some(1));
  assert_eq!(q.poll(), Some(3));
  assert_eq!(q.poll(), Some(5));
  assert!(q.is_empty());
  assert_eq!(q.remaining_capacity(), usize::MAX);
}

#[test]
fn test_drain() {
  let q = ScmpQueue::new();
  for i in (0..10).rev() {
    q.offer(i);
  }

  let mut out = Vec::new();
  assert_eq!(q.drain_into(&mut out, 4), 4);
  assert_eq!(out, vec![0, 1, 2, 3]);
  assert_eq!(q.drain_all(&mut out), 6);
  assert_eq!(out, (0..10).collect::<Vec<_>>());
  assert_eq!(q.drain_all(&mut out), 0);
}

#[test]
fn test_remove_and_clear() {
  let q = ScmpQueue::new();
  q.offer(1);
  q.offer(2);
  assert_eq!(q.remove(&2), Some(2));
  assert_eq!(q.remove(&2), None);
  q.clear();
  assert!(q.is_empty());
}

#[test]
fn test_fifo_backend() {
  let q = ScmpQueue::with_parts(Mutex::new(VecDeque::new()), ParkSynchronizer::new());
  for i in [3, 1, 2] {
    q.offer(i);
  }
  assert_eq!(q.take(), Ok(3));
  assert_eq!(q.take(), Ok(1));
  assert_eq!(q.poll_timeout(Duration::ZERO), Ok(Some(2)));
  assert_eq!(q.poll_timeout(Duration::ZERO), Ok(None));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_poll_timeout_elapses() {
  for options in all_options() {
    let q = ScmpQueue::<u32>::with_options(options);
    let start = Instant::now();
    assert_eq!(q.poll_timeout(Duration::from_millis(50)), Ok(None));
    assert!(start.elapsed() >= Duration::from_millis(50));
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_take_waits_for_offer() {
  for options in all_options() {
    let q = Arc::new(ScmpQueue::with_options(options));
    let producer = {
      let q = q.clone();
      thread::spawn(move || {
        while !q.synchronizer().should_signal() {
          thread::yield_now();
        }
        q.offer(42u64);
      })
    };

    assert_eq!(q.take(), Ok(42));
    producer.join().unwrap();
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_interrupt_take() {
  for options in all_options() {
    let q = Arc::new(ScmpQueue::<u32>::with_options(options));
    let interrupter = {
      let q = q.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        q.interrupt();
      })
    };

    assert_eq!(q.take(), Err(Interrupted));
    interrupter.join().unwrap();
    // the consumer is unregistered after the interruption
    assert!(!q.synchronizer().should_signal());
  }
}

fn no_lost_wakeups<Q, S>(q: Arc<ScmpQueue<usize, Q, S>>)
where
  Q: ConcurrentQueue<usize> + 'static,
  S: OwnedSynchronizer + 'static,
{
  let producers = 4;
  let handles = (0..producers)
    .map(|p| {
      let q = q.clone();
      thread::spawn(move || {
        for i in 0..N {
          q.offer(p * N + i);
          if i % 64 == 0 {
            thread::yield_now();
          }
        }
      })
    })
    .collect::<Vec<_>>();

  let mut seen = vec![false; producers * N];
  for _ in 0..producers * N {
    let v = q
      .poll_timeout(Duration::from_secs(10))
      .unwrap()
      .expect("consumer was never woken");
    assert!(!seen[v]);
    seen[v] = true;
  }

  for h in handles {
    h.join().unwrap();
  }
  assert!(q.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_no_lost_wakeups_skip_queue() {
  for options in all_options() {
    no_lost_wakeups(Arc::new(ScmpQueue::with_options(options)));
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_no_lost_wakeups_fifo() {
  no_lost_wakeups(Arc::new(ScmpQueue::with_parts(
    Mutex::new(VecDeque::new()),
    CondvarSynchronizer::new(),
  )));
  no_lost_wakeups(Arc::new(ScmpQueue::with_parts(
    Mutex::new(VecDeque::new()),
    ParkSynchronizer::with_spins(16),
  )));
}

#[test]
#[should_panic(expected = "already has a registered waiter")]
fn test_second_consumer_panics() {
  let q = ScmpQueue::<u32>::new();
  let _reg = q.register();
  let _ = q.take();
}
