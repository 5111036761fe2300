use super::*;
use crate::SyncKind;

use std::{sync::Arc, thread};

fn ms(millis: u64) -> Duration {
  Duration::from_millis(millis)
}

fn value(v: Option<DelayedValue<u32>>) -> Option<u32> {
  v.map(DelayedValue::into_value)
}

fn sleep_until(start: Instant, millis: u64) {
  let at = start + ms(millis);
  let now = Instant::now();
  if at > now {
    thread::sleep(at - now);
  }
}

#[test]
fn test_delayed_value_order() {
  let now = Instant::now();
  let a = DelayedValue::at("a", now);
  let b = DelayedValue::at("b", now);
  let c = DelayedValue::at("c", now - ms(1));
  assert!(a < b);
  assert!(c < a);
  assert_ne!(a, b);
  assert_eq!(a.clone(), a);
  assert!(a.is_expired());
  assert!(!DelayedValue::new((), ms(1000)).is_expired());
}

#[test]
fn test_huge_delay_does_not_overflow() {
  let v = DelayedValue::new(1, Duration::MAX);
  assert!(v.delay() > Duration::from_secs(365 * 24 * 60 * 60));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_poll() {
  let q = DelayQueue::new();
  let start = Instant::now();
  q.offer(DelayedValue::new(3, ms(600)));
  q.offer(DelayedValue::new(1, ms(200)));
  q.offer(DelayedValue::new(2, ms(400)));

  sleep_until(start, 100);
  assert_eq!(value(q.poll()), None);
  sleep_until(start, 250);
  assert_eq!(value(q.poll()), Some(1));
  assert_eq!(value(q.poll()), None);
  sleep_until(start, 450);
  assert_eq!(value(q.poll()), Some(2));
  assert_eq!(value(q.poll()), None);
  sleep_until(start, 650);
  assert_eq!(value(q.poll()), Some(3));
  assert!(q.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_timed_poll() {
  let q = DelayQueue::with_options(Options::new().with_sync(SyncKind::Condvar));
  q.offer(DelayedValue::new(2, ms(200)));
  q.offer(DelayedValue::new(1, ms(100)));
  q.offer(DelayedValue::new(3, ms(300)));

  assert_eq!(value(q.poll_timeout(ms(50)).unwrap()), None);
  assert_eq!(value(q.poll_timeout(ms(500)).unwrap()), Some(1));
  assert_eq!(value(q.poll_timeout(ms(20)).unwrap()), None);
  assert_eq!(value(q.poll_timeout(ms(500)).unwrap()), Some(2));
  assert_eq!(value(q.poll_timeout(ms(500)).unwrap()), Some(3));
  assert_eq!(value(q.poll_timeout(Duration::ZERO).unwrap()), None);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_take() {
  let q = DelayQueue::new();
  q.offer(DelayedValue::new(2, ms(100)));
  q.offer(DelayedValue::new(1, ms(50)));
  q.offer(DelayedValue::new(3, ms(150)));

  let start = Instant::now();
  assert_eq!(q.take().map(DelayedValue::into_value), Ok(1));
  assert_eq!(q.take().map(DelayedValue::into_value), Ok(2));
  assert_eq!(q.take().map(DelayedValue::into_value), Ok(3));
  let elapsed = start.elapsed();
  assert!(elapsed > ms(140) && elapsed < ms(1000), "elapsed: {elapsed:?}");
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_timed_poll_with_surprise_insertions() {
  let q = DelayQueue::new();
  assert_eq!(value(q.poll_timeout(ms(30)).unwrap()), None);
  q.offer(DelayedValue::new(2, ms(400)));
  assert_eq!(value(q.poll_timeout(ms(30)).unwrap()), None);
  q.offer(DelayedValue::new(1, ms(20)));
  assert_eq!(value(q.poll_timeout(ms(200)).unwrap()), Some(1));
  assert_eq!(value(q.poll_timeout(ms(1000)).unwrap()), Some(2));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_earlier_head_wakes_consumer() {
  let q = Arc::new(DelayQueue::new());
  q.offer(DelayedValue::new(2, Duration::from_secs(10)));

  let producer = {
    let q = q.clone();
    thread::spawn(move || {
      while !q.inner.synchronizer().should_signal() {
        thread::yield_now();
      }
      q.offer(DelayedValue::new(1, ms(20)));
    })
  };

  let start = Instant::now();
  assert_eq!(q.take().map(DelayedValue::into_value), Ok(1));
  assert!(start.elapsed() < Duration::from_secs(5));
  producer.join().unwrap();
  assert_eq!(q.len(), 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_interrupt_take() {
  let q = Arc::new(DelayQueue::<DelayedValue<u32>>::new());
  q.offer(DelayedValue::new(1, Duration::from_secs(10)));
  let interrupter = {
    let q = q.clone();
    thread::spawn(move || {
      thread::sleep(ms(20));
      q.interrupt();
    })
  };
  assert_eq!(q.take(), Err(Interrupted));
  interrupter.join().unwrap();
  assert_eq!(q.len(), 1);
}

#[test]
fn test_drain_expired() {
  let q = DelayQueue::new();
  let now = Instant::now();
  for i in 0..5 {
    q.offer(DelayedValue::at(i, now));
  }
  q.offer(DelayedValue::new(9, Duration::from_secs(60)));

  let mut out = Vec::new();
  assert_eq!(q.drain_expired_into(&mut out, usize::MAX), 5);
  assert_eq!(
    out.into_iter().map(DelayedValue::into_value).collect::<Vec<_>>(),
    vec![0, 1, 2, 3, 4]
  );
  assert_eq!(q.peek().map(DelayedValue::into_value), Some(9));
  assert_eq!(q.pop_any().map(DelayedValue::into_value), Some(9));
  assert!(q.is_empty());
}
