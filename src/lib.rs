#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]
#![warn(missing_docs)]
#![allow(clippy::type_complexity, rustdoc::bare_urls)]

use core::{cell::Cell, cmp};

mod error;
pub use error::{Interrupted, Rejected};

mod options;
pub use options::{Options, SyncKind};

/// A lock-free concurrent priority queue based on skiplist.
pub mod queue;
pub use queue::SkipQueue;

/// Single-owner block/wake primitives used by the consumer side of the queues.
pub mod sync;
pub use sync::{CondvarSynchronizer, OwnedSynchronizer, ParkSynchronizer, Synchronizer};

/// Single-consumer/multi-producer blocking wrapper over any concurrent queue.
pub mod scmp;
pub use scmp::{ConcurrentQueue, ScmpQueue};

/// Single-consumer/multi-producer priority queue guarded by a mutex and condition variable.
pub mod priority;
pub use priority::ScmpPriorityQueue;

/// A single-consumer delay queue.
pub mod delay;
pub use delay::{DelayQueue, Delayed, DelayedValue};

/// A single-threaded scheduled executor driven by a [`DelayQueue`].
pub mod executor;
pub use executor::{ExecutorOptions, ScheduledExecutor, ScheduledTask};

/// The maximum height of a node tower, the base level included.
const MAX_HEIGHT: usize = 32;

std::thread_local! {
  static SEED: Cell<u32> = Cell::new(rand::random::<u32>() | 0x0100);
}

/// Returns a random number of index levels for a new node.
///
/// A level of zero, which means the node is only linked in the base list, is
/// returned three times out of four. Otherwise every extra level has a
/// probability of one half.
fn random_level() -> usize {
  let mut x = SEED.with(|seed| {
    let mut x = seed.get();
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    seed.set(x);
    x
  });

  // test highest and lowest bits
  if x & 0x8000_0001 != 0 {
    return 0;
  }

  let mut level = 1;
  loop {
    x >>= 1;
    if x & 1 == 0 {
      break;
    }
    level += 1;
  }
  level.min(MAX_HEIGHT - 1)
}

/// Comparator is used to define the order of the elements in a [`SkipQueue`].
///
/// The comparator must define a total order. A comparator that does not is
/// not detected, the queue will simply misbehave.
pub trait Comparator<T: ?Sized> {
  /// Compares two elements.
  fn compare(&self, a: &T, b: &T) -> cmp::Ordering;
}

/// Ascend is a comparator that orders elements by their natural order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ascend;

impl<T: Ord + ?Sized> Comparator<T> for Ascend {
  #[inline]
  fn compare(&self, a: &T, b: &T) -> cmp::Ordering {
    a.cmp(b)
  }
}

/// Descend is a comparator that orders elements by their reversed natural order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Descend;

impl<T: Ord + ?Sized> Comparator<T> for Descend {
  #[inline]
  fn compare(&self, a: &T, b: &T) -> cmp::Ordering {
    b.cmp(a)
  }
}

impl<T: ?Sized, C: Comparator<T> + ?Sized> Comparator<T> for &C {
  #[inline]
  fn compare(&self, a: &T, b: &T) -> cmp::Ordering {
    (**self).compare(a, b)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_random_level_distribution() {
    const N: usize = 100_000;
    let mut zeros = 0;
    let mut max = 0;
    for _ in 0..N {
      let lvl = random_level();
      if lvl == 0 {
        zeros += 1;
      }
      max = max.max(lvl);
    }

    assert!(max < MAX_HEIGHT);
    // roughly three quarters of the nodes carry no index
    assert!(zeros > N * 6 / 10 && zeros < N * 9 / 10, "zeros: {zeros}");
  }

  #[test]
  fn test_comparators() {
    assert_eq!(Ascend.compare(&1, &2), cmp::Ordering::Less);
    assert_eq!(Descend.compare(&1, &2), cmp::Ordering::Greater);
    assert_eq!((&Ascend).compare("b", "a"), cmp::Ordering::Greater);
  }
}
