use core::{
  sync::atomic::{fence, AtomicBool, Ordering},
  time::Duration,
};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::{Ascend, Comparator, Interrupted, SkipQueue};


/// Clears the blocking flag when the consumer leaves its wait loop.
struct Blocking<'a>(&'a AtomicBool);

impl<'a> Blocking<'a> {
  #[inline]
  fn enter(flag: &'a AtomicBool) -> Self {
    flag.store(true, Ordering::SeqCst);
    // pairs with the fence producers issue after publishing
    fence(Ordering::SeqCst);
    Self(flag)
  }
}

impl Drop for Blocking<'_> {
  #[inline]
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

/// A single-consumer/multi-producer priority queue which blocks its consumer
/// on a mutex and a condition variable.
///
/// Producers insert into the lock-free [`SkipQueue`] without taking any lock.
/// They only take the lock to signal, and only when the consumer announced it
/// is blocking and the new element became the head. The consumer announces
/// itself while holding the lock, then re-checks the queue before waiting,
/// so a producer which missed the announcement has its element seen by the
/// re-check.
///
/// This is the same protocol [`ScmpQueue`](crate::ScmpQueue) runs on top of
/// an [`OwnedSynchronizer`](crate::OwnedSynchronizer), with its signalling
/// state reduced to one flag guarded by the condition's own lock. Only one
/// thread at a time may block in [`take`](Self::take) or
/// [`poll_timeout`](Self::poll_timeout).
pub struct ScmpPriorityQueue<T, C = Ascend> {
  queue: SkipQueue<T, C>,
  lock: Mutex<()>,
  not_empty: Condvar,
  consumer_blocking: AtomicBool,
  interrupted: AtomicBool,
}

impl<T> Default for ScmpPriorityQueue<T> {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<T> ScmpPriorityQueue<T> {
  /// Creates a queue which orders its elements by their natural order.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::ScmpPriorityQueue;
  ///
  /// let queue = ScmpPriorityQueue::new();
  /// queue.offer(2);
  /// queue.offer(1);
  /// assert_eq!(queue.take(), Ok(1));
  /// ```
  #[inline]
  pub fn new() -> Self {
    Self::with_comparator(Ascend)
  }
}

impl<T, C> ScmpPriorityQueue<T, C> {
  /// Creates a queue which orders its elements with `cmp`.
  #[inline]
  pub fn with_comparator(cmp: C) -> Self {
    Self {
      queue: SkipQueue::with_comparator(cmp),
      lock: Mutex::new(()),
      not_empty: Condvar::new(),
      consumer_blocking: AtomicBool::new(false),
      interrupted: AtomicBool::new(false),
    }
  }

  /// Returns the underlying skiplist.
  #[inline]
  pub const fn queue(&self) -> &SkipQueue<T, C> {
    &self.queue
  }

  /// Returns `true` while the consumer is blocked, or about to block.
  #[inline]
  pub fn is_consumer_blocking(&self) -> bool {
    self.consumer_blocking.load(Ordering::SeqCst)
  }

  /// Returns the number of elements, which may be approximate.
  #[inline]
  pub fn len(&self) -> usize {
    self.queue.len()
  }

  /// Returns `true` if the queue is empty.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }

  /// Interrupts the blocked consumer. If none is blocked, the next blocking
  /// call returns [`Interrupted`] right away.
  pub fn interrupt(&self) {
    self.interrupted.store(true, Ordering::SeqCst);
    let _lock = self.lock.lock();
    self.not_empty.notify_one();
  }

  #[inline]
  fn take_interrupt(&self) -> Result<(), Interrupted> {
    if self.interrupted.swap(false, Ordering::AcqRel) {
      return Err(Interrupted);
    }
    Ok(())
  }
}

impl<T, C> ScmpPriorityQueue<T, C>
where
  T: Clone + Send + 'static,
  C: Comparator<T>,
{
  /// Inserts an element, never blocking. Always returns `true`.
  pub fn offer(&self, item: T) -> bool {
    let first = self.queue.push(item);
    fence(Ordering::SeqCst);
    if first && self.consumer_blocking.load(Ordering::SeqCst) {
      let _lock = self.lock.lock();
      if self.consumer_blocking.load(Ordering::SeqCst) {
        self.not_empty.notify_one();
      }
    }
    true
  }

  /// Removes the head of the queue if there is one.
  #[inline]
  pub fn poll(&self) -> Option<T> {
    self.queue.pop()
  }

  /// Removes the head of the queue, waiting for an element if needed.
  pub fn take(&self) -> Result<T, Interrupted> {
    if let Some(item) = self.queue.pop() {
      return Ok(item);
    }

    let mut lock = self.lock.lock();
    let _blocking = Blocking::enter(&self.consumer_blocking);
    loop {
      self.take_interrupt()?;
      if let Some(item) = self.queue.pop() {
        return Ok(item);
      }
      self.not_empty.wait(&mut lock);
    }
  }

  /// Removes the head of the queue, waiting up to `timeout` for an element.
  ///
  /// Returns `Ok(None)` if the timeout elapsed.
  pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>, Interrupted> {
    if let Some(item) = self.queue.pop() {
      return Ok(Some(item));
    }
    if timeout.is_zero() {
      return Ok(None);
    }

    let start = Instant::now();
    let mut lock = self.lock.lock();
    let _blocking = Blocking::enter(&self.consumer_blocking);
    loop {
      self.take_interrupt()?;
      if let Some(item) = self.queue.pop() {
        return Ok(Some(item));
      }

      let remaining = timeout.saturating_sub(start.elapsed());
      if remaining.is_zero() {
        return Ok(None);
      }
      self.not_empty.wait_for(&mut lock, remaining);
    }
  }

  /// Returns a copy of the head of the queue.
  #[inline]
  pub fn peek(&self) -> Option<T> {
    self.queue.peek()
  }

  /// Removes up to `max` elements and appends them to `out`, in order.
  /// Returns how many were moved.
  #[inline]
  pub fn drain_into(&self, out: &mut Vec<T>, max: usize) -> usize {
    self.queue.drain_into(out, max)
  }

  /// Removes one element equal to `item`.
  #[inline]
  pub fn remove(&self, item: &T) -> Option<T>
  where
    T: PartialEq,
  {
    self.queue.remove(item)
  }

  /// Returns `true` if the queue holds an element equal to `item`.
  #[inline]
  pub fn contains(&self, item: &T) -> bool
  where
    T: PartialEq,
  {
    self.queue.contains(item)
  }

  /// Removes every element.
  #[inline]
  pub fn clear(&self) {
    self.queue.clear()
  }
}

impl<T: core::fmt::Debug + Clone, C> core::fmt::Debug for ScmpPriorityQueue<T, C> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ScmpPriorityQueue")
      .field("queue", &self.queue)
      .field("consumer_blocking", &self.is_consumer_blocking())
      .finish()
  }
}
