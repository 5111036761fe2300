use core::{iter::FusedIterator, ptr, sync::atomic::Ordering};

use crossbeam_epoch::{self as epoch, Guard};

use super::{Node, SkipQueue};

/// An iterator over the elements of a [`SkipQueue`], in order.
///
/// Created by [`SkipQueue::iter`].
pub struct Iter<'a, T, C> {
  queue: &'a SkipQueue<T, C>,
  guard: Guard,
  next: *const Node<T>,
}

impl<'a, T, C> Iter<'a, T, C> {
  pub(super) fn new(queue: &'a SkipQueue<T, C>) -> Self {
    let guard = epoch::pin();
    let next = queue
      .first_live(&guard)
      .map_or(ptr::null(), |n| n.as_raw());
    Self { queue, guard, next }
  }

  /// Returns the queue this iterator walks.
  #[inline]
  pub const fn queue(&self) -> &'a SkipQueue<T, C> {
    self.queue
  }
}

impl<T: Clone, C> Iterator for Iter<'_, T, C> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    // Safety: `next` was loaded under `self.guard`, which is still pinned.
    let node = unsafe { self.next.as_ref() }?;

    let mut n = node.next.load(Ordering::Acquire, &self.guard);
    // skip markers and removed elements
    while let Some(succ) = unsafe { n.as_ref() } {
      if succ.is_live() {
        break;
      }
      n = succ.next.load(Ordering::Acquire, &self.guard);
    }
    self.next = n.as_raw();

    // Safety: only data nodes are ever stored in `next`.
    Some(unsafe { node.key() }.clone())
  }
}

impl<T: Clone, C> FusedIterator for Iter<'_, T, C> {}

impl<T, C> core::fmt::Debug for Iter<'_, T, C> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Iter").finish_non_exhaustive()
  }
}
