use core::{
  marker::PhantomData,
  sync::atomic::{fence, Ordering},
  time::Duration,
};
use std::collections::VecDeque;

use parking_lot::Mutex;

use super::{
  sync::Registration, Comparator, Interrupted, Options, OwnedSynchronizer, SkipQueue, Synchronizer,
};

#[cfg(test)]
mod tests;

/// A queue which can be shared between threads, the storage side of a
/// [`ScmpQueue`].
pub trait ConcurrentQueue<T>: Send + Sync {
  /// Inserts an element. Returns `true` if the element is now the head of
  /// the queue, i.e. the next one [`pop`](ConcurrentQueue::pop) would return.
  fn push(&self, item: T) -> bool;

  /// Removes and returns the head of the queue.
  fn pop(&self) -> Option<T>;

  /// Removes and returns the head of the queue if `pred` holds for it.
  fn pop_if<F>(&self, pred: F) -> Option<T>
  where
    F: FnMut(&T) -> bool;

  /// Calls `f` with the head of the queue without removing it.
  fn peek_with<R, F>(&self, f: F) -> Option<R>
  where
    F: FnOnce(&T) -> R;

  /// Returns the number of elements, which may be approximate.
  fn len(&self) -> usize;

  /// Returns `true` if the queue is empty.
  fn is_empty(&self) -> bool;

  /// Removes one element equal to `item`.
  fn remove(&self, item: &T) -> Option<T>
  where
    T: PartialEq;

  /// Removes every element.
  fn clear(&self);
}

impl<T, C> ConcurrentQueue<T> for SkipQueue<T, C>
where
  T: Clone + Send + Sync + 'static,
  C: Comparator<T> + Send + Sync,
{
  #[inline]
  fn push(&self, item: T) -> bool {
    SkipQueue::push(self, item)
  }

  #[inline]
  fn pop(&self) -> Option<T> {
    SkipQueue::pop(self)
  }

  #[inline]
  fn pop_if<F>(&self, pred: F) -> Option<T>
  where
    F: FnMut(&T) -> bool,
  {
    SkipQueue::pop_if(self, pred)
  }

  #[inline]
  fn peek_with<R, F>(&self, f: F) -> Option<R>
  where
    F: FnOnce(&T) -> R,
  {
    SkipQueue::peek_with(self, f)
  }

  #[inline]
  fn len(&self) -> usize {
    SkipQueue::len(self)
  }

  #[inline]
  fn is_empty(&self) -> bool {
    SkipQueue::is_empty(self)
  }

  #[inline]
  fn remove(&self, item: &T) -> Option<T>
  where
    T: PartialEq,
  {
    SkipQueue::remove(self, item)
  }

  #[inline]
  fn clear(&self) {
    SkipQueue::clear(self)
  }
}

/// A plain FIFO queue behind a lock.
impl<T: Send> ConcurrentQueue<T> for Mutex<VecDeque<T>> {
  fn push(&self, item: T) -> bool {
    let mut queue = self.lock();
    queue.push_back(item);
    queue.len() == 1
  }

  #[inline]
  fn pop(&self) -> Option<T> {
    self.lock().pop_front()
  }

  fn pop_if<F>(&self, mut pred: F) -> Option<T>
  where
    F: FnMut(&T) -> bool,
  {
    let mut queue = self.lock();
    match queue.front() {
      Some(front) if pred(front) => queue.pop_front(),
      _ => None,
    }
  }

  #[inline]
  fn peek_with<R, F>(&self, f: F) -> Option<R>
  where
    F: FnOnce(&T) -> R,
  {
    self.lock().front().map(f)
  }

  #[inline]
  fn len(&self) -> usize {
    self.lock().len()
  }

  #[inline]
  fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn remove(&self, item: &T) -> Option<T>
  where
    T: PartialEq,
  {
    let mut queue = self.lock();
    let idx = queue.iter().position(|x| x == item)?;
    queue.remove(idx)
  }

  #[inline]
  fn clear(&self) {
    self.lock().clear()
  }
}

/// An unbounded single-consumer/multi-producer blocking queue.
///
/// Producers never block: [`offer`](ScmpQueue::offer) inserts right away and
/// only signals the consumer when one is registered and the new element
/// became the head, which is the only case the consumer can be waiting for.
/// A single consumer at a time may block in [`take`](ScmpQueue::take) or
/// [`poll_timeout`](ScmpQueue::poll_timeout); the non-blocking methods may be
/// called from any thread.
///
/// Producers are lock free as long as the underlying queue is. The wake path
/// uses whatever discipline the synchronizer `S` uses.
pub struct ScmpQueue<T, Q = SkipQueue<T>, S = Synchronizer> {
  queue: Q,
  sync: S,
  _marker: PhantomData<fn(T) -> T>,
}

impl<T> Default for ScmpQueue<T>
where
  T: Ord + Clone + Send + Sync + 'static,
{
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<T> ScmpQueue<T>
where
  T: Ord + Clone + Send + Sync + 'static,
{
  /// Creates a priority queue in natural order with the default synchronizer.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::ScmpQueue;
  ///
  /// let queue = ScmpQueue::new();
  /// queue.offer(3);
  /// queue.offer(1);
  /// assert_eq!(queue.take(), Ok(1));
  /// assert_eq!(queue.poll(), Some(3));
  /// ```
  #[inline]
  pub fn new() -> Self {
    Self::with_options(Options::new())
  }

  /// Creates a priority queue in natural order with the synchronizer described
  /// by `options`.
  #[inline]
  pub fn with_options(options: Options) -> Self {
    Self::with_parts(SkipQueue::new(), Synchronizer::new(&options))
  }
}

impl<T, Q, S> ScmpQueue<T, Q, S> {
  /// Creates a queue from its storage and its synchronizer.
  ///
  /// # Example
  ///
  /// ```
  /// use std::collections::VecDeque;
  ///
  /// use parking_lot::Mutex;
  /// use skq::{ScmpQueue, CondvarSynchronizer};
  ///
  /// let fifo = ScmpQueue::with_parts(Mutex::new(VecDeque::new()), CondvarSynchronizer::new());
  /// fifo.offer("a");
  /// fifo.offer("b");
  /// assert_eq!(fifo.poll(), Some("a"));
  /// ```
  #[inline]
  pub const fn with_parts(queue: Q, sync: S) -> Self {
    Self {
      queue,
      sync,
      _marker: PhantomData,
    }
  }

  /// Returns the underlying queue.
  #[inline]
  pub const fn queue(&self) -> &Q {
    &self.queue
  }

  /// Returns the synchronizer the consumer blocks on.
  #[inline]
  pub const fn synchronizer(&self) -> &S {
    &self.sync
  }
}

impl<T, Q, S> ScmpQueue<T, Q, S>
where
  Q: ConcurrentQueue<T>,
  S: OwnedSynchronizer,
{
  /// Inserts an element, never blocking. Always returns `true` since the
  /// queue is unbounded.
  pub fn offer(&self, item: T) -> bool {
    let first = self.queue.push(item);
    // pairs with the fence the consumer issues after registering
    fence(Ordering::SeqCst);
    if first && self.sync.should_signal() {
      self.sync.signal();
    }
    true
  }

  /// Inserts an element, never blocking.
  #[inline]
  pub fn put(&self, item: T) {
    self.offer(item);
  }

  /// Removes the head of the queue if there is one.
  #[inline]
  pub fn poll(&self) -> Option<T> {
    self.queue.pop()
  }

  /// Removes the head of the queue, waiting for an element if needed.
  ///
  /// Only one thread at a time may block here.
  ///
  /// # Panics
  /// - If another consumer is currently blocked on this queue.
  pub fn take(&self) -> Result<T, Interrupted> {
    if let Some(item) = self.queue.pop() {
      return Ok(item);
    }

    let reg = self.register();
    loop {
      if let Some(item) = self.queue.pop() {
        return Ok(item);
      }
      reg.wait()?;
    }
  }

  /// Removes the head of the queue, waiting up to `timeout` for an element.
  ///
  /// Returns `Ok(None)` if the timeout elapsed.
  ///
  /// # Panics
  /// - If another consumer is currently blocked on this queue.
  pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>, Interrupted> {
    if let Some(item) = self.queue.pop() {
      return Ok(Some(item));
    }
    if timeout.is_zero() {
      return Ok(None);
    }

    let reg = self.register();
    let mut remaining = timeout;
    loop {
      if let Some(item) = self.queue.pop() {
        return Ok(Some(item));
      }
      match reg.wait_timeout(remaining)? {
        Some(left) => remaining = left,
        None => return Ok(self.queue.pop()),
      }
    }
  }

  #[inline]
  pub(crate) fn register(&self) -> Registration<'_, S> {
    let reg = Registration::new(&self.sync);
    // pairs with the fence producers issue after publishing
    fence(Ordering::SeqCst);
    reg
  }

  /// Returns a copy of the head of the queue.
  #[inline]
  pub fn peek(&self) -> Option<T>
  where
    T: Clone,
  {
    self.queue.peek_with(T::clone)
  }

  /// Calls `f` with the head of the queue without removing it.
  #[inline]
  pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
    self.queue.peek_with(f)
  }

  /// Removes up to `max` elements and appends them to `out`, in order.
  /// Returns how many were moved.
  pub fn drain_into(&self, out: &mut Vec<T>, max: usize) -> usize {
    let mut moved = 0;
    while moved < max {
      match self.queue.pop() {
        Some(item) => {
          out.push(item);
          moved += 1;
        }
        None => break,
      }
    }
    moved
  }

  /// Removes every available element and appends them to `out`, in order.
  #[inline]
  pub fn drain_all(&self, out: &mut Vec<T>) -> usize {
    self.drain_into(out, usize::MAX)
  }

  /// Removes one element equal to `item`.
  #[inline]
  pub fn remove(&self, item: &T) -> Option<T>
  where
    T: PartialEq,
  {
    self.queue.remove(item)
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

  /// Removes every element.
  #[inline]
  pub fn clear(&self) {
    self.queue.clear()
  }

  /// Always returns `usize::MAX`, the queue is unbounded.
  #[inline]
  pub const fn remaining_capacity(&self) -> usize {
    usize::MAX
  }

  /// Interrupts the blocked consumer. If none is blocked, the next blocking
  /// call returns [`Interrupted`] right away.
  #[inline]
  pub fn interrupt(&self) {
    self.sync.interrupt()
  }
}

impl<T, Q, S> core::fmt::Debug for ScmpQueue<T, Q, S>
where
  Q: core::fmt::Debug,
  S: core::fmt::Debug,
{
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ScmpQueue")
      .field("queue", &self.queue)
      .field("sync", &self.sync)
      .finish()
  }
}
