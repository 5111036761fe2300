use core::{
  cmp::Ordering as CmpOrdering,
  sync::atomic::{AtomicU64, Ordering},
  time::Duration,
};
use std::time::Instant;

use super::{
  Ascend, Comparator, Interrupted, Options, OwnedSynchronizer, ScmpQueue, SkipQueue, Synchronizer,
};

#[cfg(test)]
mod tests;

/// An element which may only be taken from a [`DelayQueue`] once its delay
/// has elapsed.
pub trait Delayed {
  /// Returns the remaining delay, [`Duration::ZERO`] once expired.
  fn delay(&self) -> Duration;

  /// Returns `true` once the delay has elapsed.
  #[inline]
  fn is_expired(&self) -> bool {
    self.delay().is_zero()
  }
}

impl<D: Delayed + ?Sized> Delayed for &D {
  #[inline]
  fn delay(&self) -> Duration {
    (**self).delay()
  }
}

impl<D: Delayed + ?Sized> Delayed for std::sync::Arc<D> {
  #[inline]
  fn delay(&self) -> Duration {
    (**self).delay()
  }
}

/// An unbounded single-consumer/multi-producer queue of [`Delayed`]
/// elements, ordered by the comparator `C`, normally by deadline.
///
/// An element can only be removed once its delay has elapsed. A consumer
/// blocked in [`take`](DelayQueue::take) sleeps exactly until the head's
/// deadline, and is woken early only when a producer inserts a new head.
pub struct DelayQueue<T, C = Ascend, S = Synchronizer> {
  inner: ScmpQueue<T, SkipQueue<T, C>, S>,
}

impl<T> Default for DelayQueue<T>
where
  T: Delayed + Ord + Clone + Send + Sync + 'static,
{
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<T> DelayQueue<T>
where
  T: Delayed + Ord + Clone + Send + Sync + 'static,
{
  /// Creates a delay queue ordered by the natural order of its elements.
  ///
  /// # Example
  ///
  /// ```
  /// use std::time::Duration;
  ///
  /// use skq::{DelayQueue, DelayedValue};
  ///
  /// let queue = DelayQueue::new();
  /// queue.offer(DelayedValue::new("later", Duration::from_secs(60)));
  /// queue.offer(DelayedValue::new("now", Duration::ZERO));
  /// assert_eq!(queue.poll().map(DelayedValue::into_value), Some("now"));
  /// assert!(queue.poll().is_none());
  /// ```
  #[inline]
  pub fn new() -> Self {
    Self::with_options(Options::new())
  }

  /// Creates a delay queue whose consumer blocks on the synchronizer
  /// described by `options`.
  #[inline]
  pub fn with_options(options: Options) -> Self {
    Self::with_parts(SkipQueue::new(), Synchronizer::new(&options))
  }
}

impl<T, C, S> DelayQueue<T, C, S> {
  /// Creates a delay queue from its storage and its synchronizer.
  #[inline]
  pub const fn with_parts(queue: SkipQueue<T, C>, sync: S) -> Self {
    Self {
      inner: ScmpQueue::with_parts(queue, sync),
    }
  }

  /// Returns the underlying skiplist.
  #[inline]
  pub const fn queue(&self) -> &SkipQueue<T, C> {
    self.inner.queue()
  }
}

impl<T, C, S> DelayQueue<T, C, S>
where
  T: Delayed + Clone + Send + Sync + 'static,
  C: Comparator<T> + Send + Sync,
  S: OwnedSynchronizer,
{
  /// Inserts an element, never blocking. Always returns `true`.
  #[inline]
  pub fn offer(&self, item: T) -> bool {
    self.inner.offer(item)
  }

  /// Inserts an element, never blocking.
  #[inline]
  pub fn put(&self, item: T) {
    self.inner.put(item)
  }

  /// Removes the head of the queue if its delay has elapsed.
  ///
  /// The element removed may not be the one a previous `peek` returned, if a
  /// producer inserted an earlier expired one meanwhile. Whatever is removed
  /// has expired.
  #[inline]
  pub fn poll(&self) -> Option<T> {
    self.queue().pop_if(|item| item.is_expired())
  }

  /// Returns the remaining delay of the head, if any.
  #[inline]
  fn head_delay(&self) -> Option<Duration> {
    self.queue().peek_with(|item| item.delay())
  }

  /// Removes the head of the queue, waiting for its delay to elapse or for an
  /// element to arrive.
  ///
  /// # Panics
  /// - If another consumer is currently blocked on this queue.
  pub fn take(&self) -> Result<T, Interrupted> {
    if let Some(item) = self.poll() {
      return Ok(item);
    }

    let reg = self.inner.register();
    loop {
      match self.head_delay() {
        None => reg.wait()?,
        Some(delay) if delay.is_zero() => {
          if let Some(item) = self.poll() {
            return Ok(item);
          }
        }
        Some(delay) => {
          reg.wait_timeout(delay)?;
        }
      }
    }
  }

  /// Removes the head of the queue, waiting up to `timeout` for an element to
  /// expire. Returns `Ok(None)` if the timeout elapsed first.
  ///
  /// # Panics
  /// - If another consumer is currently blocked on this queue.
  pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>, Interrupted> {
    if let Some(item) = self.poll() {
      return Ok(Some(item));
    }
    if timeout.is_zero() {
      return Ok(None);
    }

    let start = Instant::now();
    let reg = self.inner.register();
    loop {
      let delay = self.head_delay();
      if delay.is_some_and(|d| d.is_zero()) {
        if let Some(item) = self.poll() {
          return Ok(Some(item));
        }
        continue;
      }

      let remaining = timeout.saturating_sub(start.elapsed());
      if remaining.is_zero() {
        return Ok(None);
      }
      reg.wait_timeout(delay.map_or(remaining, |d| d.min(remaining)))?;
    }
  }

  /// Removes up to `max` expired elements and appends them to `out`, in
  /// order. Returns how many were moved.
  pub fn drain_expired_into(&self, out: &mut Vec<T>, max: usize) -> usize {
    let mut moved = 0;
    while moved < max {
      match self.poll() {
        Some(item) => {
          out.push(item);
          moved += 1;
        }
        None => break,
      }
    }
    moved
  }

  /// Returns a copy of the head of the queue, expired or not.
  #[inline]
  pub fn peek(&self) -> Option<T> {
    self.inner.peek()
  }

  /// Removes one element equal to `item`, expired or not.
  #[inline]
  pub fn remove(&self, item: &T) -> Option<T>
  where
    T: PartialEq,
  {
    self.inner.remove(item)
  }

  /// Removes and returns the head of the queue, expired or not.
  #[inline]
  pub(crate) fn pop_any(&self) -> Option<T> {
    self.queue().pop()
  }

  /// Returns the number of elements, expired or not. May be approximate.
  #[inline]
  pub fn len(&self) -> usize {
    self.inner.len()
  }

  /// Returns `true` if the queue is empty.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  /// Removes every element.
  #[inline]
  pub fn clear(&self) {
    self.inner.clear()
  }

  /// Interrupts the blocked consumer. If none is blocked, the next blocking
  /// call returns [`Interrupted`] right away.
  #[inline]
  pub fn interrupt(&self) {
    self.inner.interrupt()
  }
}

impl<T: core::fmt::Debug + Clone, C, S: core::fmt::Debug> core::fmt::Debug for DelayQueue<T, C, S> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("DelayQueue")
      .field("queue", self.queue())
      .field("sync", self.inner.synchronizer())
      .finish()
  }
}

static SEQUENCER: AtomicU64 = AtomicU64::new(0);

/// A value which becomes available after a delay.
///
/// Values are ordered by deadline, values sharing a deadline by creation
/// order, so a [`DelayQueue`] hands them out first in first out.
#[derive(Debug, Clone)]
pub struct DelayedValue<V> {
  deadline: Instant,
  seq: u64,
  value: V,
}

impl<V> DelayedValue<V> {
  /// Creates a value available after `delay`.
  ///
  /// A delay too large to be represented is clamped to roughly thirty years.
  #[inline]
  pub fn new(value: V, delay: Duration) -> Self {
    Self::at(value, deadline_after(Instant::now(), delay))
  }

  /// Creates a value available at `deadline`.
  #[inline]
  pub fn at(value: V, deadline: Instant) -> Self {
    Self {
      deadline,
      seq: SEQUENCER.fetch_add(1, Ordering::Relaxed),
      value,
    }
  }

  /// Returns the instant the value becomes available.
  #[inline]
  pub const fn deadline(&self) -> Instant {
    self.deadline
  }

  /// Returns the tie-breaking sequence number.
  #[inline]
  pub const fn seq(&self) -> u64 {
    self.seq
  }

  /// Returns a reference to the value.
  #[inline]
  pub const fn value(&self) -> &V {
    &self.value
  }

  /// Consumes the wrapper and returns the value.
  #[inline]
  pub fn into_value(self) -> V {
    self.value
  }
}

impl<V> Delayed for DelayedValue<V> {
  #[inline]
  fn delay(&self) -> Duration {
    self.deadline.saturating_duration_since(Instant::now())
  }
}

impl<V> PartialEq for DelayedValue<V> {
  #[inline]
  fn eq(&self, other: &Self) -> bool {
    self.deadline == other.deadline && self.seq == other.seq
  }
}

impl<V> Eq for DelayedValue<V> {}

impl<V> PartialOrd for DelayedValue<V> {
  #[inline]
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
    Some(self.cmp(other))
  }
}

impl<V> Ord for DelayedValue<V> {
  #[inline]
  fn cmp(&self, other: &Self) -> CmpOrdering {
    self
      .deadline
      .cmp(&other.deadline)
      .then(self.seq.cmp(&other.seq))
  }
}

/// The largest delay honored, `Instant` arithmetic overflows past some point
/// which depends on the platform.
pub(crate) const MAX_DELAY: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Returns `now + delay`, clamping `delay` so the result never overflows.
#[inline]
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
  let delay = delay.min(MAX_DELAY);
  now
    .checked_add(delay)
    .or_else(|| now.checked_add(delay / 2))
    .unwrap_or(now)
}
