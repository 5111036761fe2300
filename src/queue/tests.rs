use super::*;
use crate::Descend;

use std::{
  collections::BTreeSet,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
};

// `len` walks the queue and is only approximate while other threads mutate
// it. Exact lengths are only asserted once every thread has been joined.

#[cfg(not(miri))]
const N: usize = 1000;
#[cfg(miri)]
const N: usize = 32;

/// Orders `(key, seq)` pairs by `key` only.
#[derive(Clone, Copy, Default)]
struct ByKey;

impl Comparator<(u32, u32)> for ByKey {
  fn compare(&self, a: &(u32, u32), b: &(u32, u32)) -> CmpOrdering {
    a.0.cmp(&b.0)
  }
}

#[test]
fn test_empty() {
  let q = SkipQueue::<u32>::new();
  assert!(q.is_empty());
  assert_eq!(q.len(), 0);
  assert_eq!(q.peek(), None);
  assert_eq!(q.peek_last(), None);
  assert_eq!(q.pop(), None);
  assert_eq!(q.pop_last(), None);
  assert_eq!(q.remove(&1), None);
  assert!(!q.contains(&1));
  assert_eq!(q.iter().next(), None);
}

#[test]
fn test_pop_in_order() {
  let q = SkipQueue::new();
  for i in (0..N).rev() {
    q.push(i);
  }
  assert_eq!(q.len(), N);

  for i in 0..N {
    assert_eq!(q.peek(), Some(i));
    assert_eq!(q.pop(), Some(i));
  }
  assert!(q.is_empty());
}

#[test]
fn test_push_reports_new_head() {
  let q = SkipQueue::new();
  assert!(q.push(5));
  assert!(q.push(1));
  assert!(!q.push(3));
  assert!(!q.push(1));
  assert!(q.push(0));
}

#[test]
fn test_equal_elements_are_fifo() {
  let q = SkipQueue::with_comparator(ByKey);
  for seq in 0..N as u32 {
    q.push((seq % 4, seq));
  }

  let mut last: Option<(u32, u32)> = None;
  while let Some(item) = q.pop() {
    if let Some(prev) = last {
      assert!(prev.0 < item.0 || (prev.0 == item.0 && prev.1 < item.1));
    }
    last = Some(item);
  }
}

#[test]
fn test_descend() {
  let q = SkipQueue::with_comparator(Descend);
  for i in [3, 9, 1, 7] {
    q.push(i);
  }
  assert_eq!(q.iter().collect::<Vec<_>>(), vec![9, 7, 3, 1]);
  assert_eq!(q.peek_last(), Some(1));
}

#[test]
fn test_peek_and_pop_last() {
  let q: SkipQueue<_> = (0..N).collect();
  assert_eq!(q.peek(), Some(0));
  assert_eq!(q.peek_last(), Some(N - 1));

  for i in (0..N).rev() {
    assert_eq!(q.pop_last(), Some(i));
  }
  assert_eq!(q.pop_last(), None);
  assert!(q.is_empty());
}

#[test]
fn test_pop_if() {
  let q: SkipQueue<_> = [4, 2, 8].into_iter().collect();
  assert_eq!(q.pop_if(|v| *v > 2), None);
  assert_eq!(q.pop_if(|v| *v == 2), Some(2));
  assert_eq!(q.pop_if(|v| *v > 2), Some(4));
  assert_eq!(q.len(), 1);
}

#[test]
fn test_remove_and_contains() {
  let q: SkipQueue<_> = (0..N).collect();
  for i in (0..N).step_by(2) {
    assert!(q.contains(&i));
    assert_eq!(q.remove(&i), Some(i));
    assert!(!q.contains(&i));
    assert_eq!(q.remove(&i), None);
  }

  assert_eq!(q.len(), N / 2);
  assert!(q.iter().all(|v| v % 2 == 1));
}

#[test]
fn test_remove_distinct_equal_elements() {
  let q = SkipQueue::with_comparator(ByKey);
  q.push((1, 0));
  q.push((1, 1));
  q.push((1, 2));

  assert_eq!(q.remove(&(1, 1)), Some((1, 1)));
  assert!(!q.contains(&(1, 1)));
  assert!(q.contains(&(1, 2)));
  assert_eq!(q.iter().collect::<Vec<_>>(), vec![(1, 0), (1, 2)]);
}

#[test]
fn test_clear_and_drain() {
  let q: SkipQueue<_> = (0..N).collect();
  let mut out = Vec::new();
  assert_eq!(q.drain_into(&mut out, 10), 10);
  assert_eq!(out, (0..10).collect::<Vec<_>>());

  q.clear();
  assert!(q.is_empty());
  assert_eq!(q.drain_into(&mut out, 10), 0);
}

#[test]
fn test_clone_and_debug() {
  let q: SkipQueue<_> = [3, 1, 2].into_iter().collect();
  let c = q.clone();
  q.pop();
  assert_eq!(c.len(), 3);
  assert_eq!(format!("{c:?}"), "[1, 2, 3]");
}

#[derive(Clone)]
struct Tracked(u64, Arc<AtomicUsize>);

impl Drop for Tracked {
  fn drop(&mut self) {
    self.1.fetch_add(1, Ordering::SeqCst);
  }
}

impl PartialEq for Tracked {
  fn eq(&self, other: &Self) -> bool {
    self.0 == other.0
  }
}

impl Eq for Tracked {}

impl PartialOrd for Tracked {
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
    Some(self.cmp(other))
  }
}

impl Ord for Tracked {
  fn cmp(&self, other: &Self) -> CmpOrdering {
    self.0.cmp(&other.0)
  }
}

#[test]
fn test_drop_frees_remaining_elements() {
  let drops = Arc::new(AtomicUsize::new(0));
  {
    let q = SkipQueue::new();
    for i in 0..N as u64 {
      q.push(Tracked(i, drops.clone()));
    }
  }
  assert_eq!(drops.load(Ordering::SeqCst), N);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_push() {
  let q = Arc::new(SkipQueue::new());
  let threads = 8;
  let handles = (0..threads)
    .map(|t| {
      let q = q.clone();
      std::thread::spawn(move || {
        for i in (t..N).step_by(threads) {
          q.push(i);
        }
      })
    })
    .collect::<Vec<_>>();
  for h in handles {
    h.join().unwrap();
  }

  assert_eq!(q.len(), N);
  for i in 0..N {
    assert_eq!(q.pop(), Some(i));
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_push_pop() {
  let q = Arc::new(SkipQueue::new());
  let seen = Arc::new(Mutex::new(BTreeSet::new()));
  let producers = 4;
  let consumers = 4;
  let done = Arc::new(AtomicUsize::new(0));

  let mut handles = Vec::new();
  for p in 0..producers {
    let q = q.clone();
    let done = done.clone();
    handles.push(std::thread::spawn(move || {
      for i in 0..N {
        q.push(p * N + i);
      }
      done.fetch_add(1, Ordering::SeqCst);
    }));
  }

  for _ in 0..consumers {
    let q = q.clone();
    let seen = seen.clone();
    let done = done.clone();
    handles.push(std::thread::spawn(move || loop {
      match q.pop() {
        Some(v) => assert!(seen.lock().unwrap().insert(v), "{v} popped twice"),
        None if done.load(Ordering::SeqCst) == producers && q.is_empty() => break,
        None => std::thread::yield_now(),
      }
    }));
  }

  for h in handles {
    h.join().unwrap();
  }
  assert_eq!(seen.lock().unwrap().len(), producers * N);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_remove() {
  let q: Arc<SkipQueue<_>> = Arc::new((0..N).collect());
  let removed = Arc::new(AtomicUsize::new(0));

  let handles = (0..4)
    .map(|_| {
      let q = q.clone();
      let removed = removed.clone();
      std::thread::spawn(move || {
        for i in 0..N {
          if q.remove(&i).is_some() {
            removed.fetch_add(1, Ordering::SeqCst);
          }
        }
      })
    })
    .collect::<Vec<_>>();
  for h in handles {
    h.join().unwrap();
  }

  assert_eq!(removed.load(Ordering::SeqCst), N);
  assert!(q.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_iter_while_popping() {
  let q: Arc<SkipQueue<_>> = Arc::new((0..N).collect());
  let popper = {
    let q = q.clone();
    std::thread::spawn(move || while q.pop().is_some() {})
  };

  let mut last = None;
  for v in q.iter() {
    if let Some(prev) = last {
      assert!(prev < v);
    }
    last = Some(v);
  }
  popper.join().unwrap();
  assert!(q.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_level_grows_and_shrinks() {
  let q = SkipQueue::new();
  for i in (0..100_000).rev() {
    q.push(i);
  }
  let grown = q.level();
  assert!(grown > 3, "level stayed at {grown}");

  let mut expected = 0;
  while let Some(v) = q.pop() {
    assert_eq!(v, expected);
    expected += 1;
  }
  assert_eq!(expected, 100_000);
  assert!(q.level() <= grown);

  // every pop lowers the height by one level at most, finish it off
  let guard = &epoch::pin();
  for _ in 0..MAX_HEIGHT {
    q.clear_index_to_first(guard);
  }
  assert!(q.level() <= 3, "level stuck at {}", q.level());

  // the queue keeps working once it shrank
  for i in (0..N).rev() {
    q.push(i);
  }
  assert_eq!(q.pop(), Some(0));
  assert_eq!(q.pop_last(), Some(N - 1));
  assert_eq!(q.len(), N - 2);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_push_pop_while_level_changes() {
  const ROUNDS: usize = 5;
  const PER_ROUND: usize = 5_000;

  let q = Arc::new(SkipQueue::new());
  let producers = 4;
  let handles = (0..producers)
    .map(|p| {
      let q = q.clone();
      std::thread::spawn(move || {
        let mut popped = Vec::new();
        for round in 0..ROUNDS {
          // grow the queue then drain it so the height goes up and down
          for i in 0..PER_ROUND {
            q.push((round * producers + p) * PER_ROUND + i);
          }
          for _ in 0..PER_ROUND {
            if let Some(v) = q.pop() {
              popped.push(v);
            }
          }
        }
        popped
      })
    })
    .collect::<Vec<_>>();

  let mut seen = BTreeSet::new();
  for h in handles {
    for v in h.join().unwrap() {
      assert!(seen.insert(v), "{v} popped twice");
    }
  }
  while let Some(v) = q.pop() {
    assert!(seen.insert(v), "{v} popped twice");
  }
  assert_eq!(seen.len(), ROUNDS * producers * PER_ROUND);
  assert!(q.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_pop_pop_last_and_remove() {
  const M: usize = 20_000;

  let q: Arc<SkipQueue<_>> = Arc::new((0..M).collect());
  let done = Arc::new(AtomicUsize::new(0));
  let mut handles = Vec::new();

  // producers keep adding above the prefilled range while it is consumed
  for p in 0..2 {
    let q = q.clone();
    let done = done.clone();
    handles.push(std::thread::spawn(move || {
      for i in (M + p..3 * M).step_by(2) {
        q.push(i);
      }
      done.fetch_add(1, Ordering::SeqCst);
      Vec::new()
    }));
  }

  for t in 0..6 {
    let q = q.clone();
    let done = done.clone();
    handles.push(std::thread::spawn(move || {
      let mut got = Vec::new();
      let mut i = t;
      loop {
        let v = match t % 3 {
          0 => q.pop(),
          1 => q.pop_last(),
          _ => {
            let v = q.remove(&(i % (3 * M)));
            i += 3;
            v
          }
        };
        match v {
          Some(v) => got.push(v),
          None if done.load(Ordering::SeqCst) == 2 && q.is_empty() => break,
          None if t % 3 == 2 && i >= 3 * M => break,
          None => std::thread::yield_now(),
        }
      }
      got
    }));
  }

  let mut seen = BTreeSet::new();
  for h in handles {
    for v in h.join().unwrap() {
      assert!(seen.insert(v), "{v} returned twice");
    }
  }
  while let Some(v) = q.pop() {
    assert!(seen.insert(v), "{v} returned twice");
  }
  assert_eq!(seen.iter().copied().collect::<Vec<_>>(), (0..3 * M).collect::<Vec<_>>());
}
