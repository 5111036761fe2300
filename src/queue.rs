use core::{
  cmp::Ordering as CmpOrdering,
  fmt,
  sync::atomic::{AtomicUsize, Ordering},
};
use std::collections::HashSet;

use crossbeam_epoch::{self as epoch, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;

use super::{random_level, Ascend, Comparator, MAX_HEIGHT};

mod node;
use node::Node;

mod iterator;
pub use iterator::Iter;

#[cfg(test)]
mod tests;

/// Outcome of trying to link one index level of a new node.
enum Link {
  Linked,
  /// The predecessor moved or was deleted, search again.
  Retry,
  /// The node was deleted meanwhile, its remaining levels are dropped.
  Abandoned,
}

/// A lock-free concurrent priority queue based on skiplist.
///
/// Elements are kept in the order defined by the comparator `C`, the head of
/// the queue being the least element. Elements comparing equal are dequeued
/// in insertion order.
///
/// All operations may be called concurrently from any number of threads.
/// `len` is not a constant-time operation, it walks the whole queue, and the
/// result may be inaccurate if the queue is modified meanwhile. The same goes
/// for iteration, which is weakly consistent: it never fails and never yields
/// an element twice, but it may or may not reflect modifications which happen
/// after it was created.
///
/// Removed memory is reclaimed with epoch based reclamation, which is why
/// the mutating methods require `T: Send + 'static`.
pub struct SkipQueue<T, C = Ascend> {
  head: Box<Node<T>>,
  /// The current number of index levels, always at least `1`.
  level: CachePadded<AtomicUsize>,
  cmp: C,
}

impl<T> Default for SkipQueue<T> {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<T> SkipQueue<T> {
  /// Creates a new empty queue which orders its elements by their natural order.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::SkipQueue;
  ///
  /// let queue = SkipQueue::<u64>::new();
  /// assert!(queue.is_empty());
  /// ```
  #[inline]
  pub fn new() -> Self {
    Self::with_comparator(Ascend)
  }
}

impl<T, C> SkipQueue<T, C> {
  /// Creates a new empty queue which orders its elements with the given comparator.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::{SkipQueue, Descend};
  ///
  /// let queue = SkipQueue::with_comparator(Descend);
  /// queue.push(1);
  /// queue.push(3);
  /// assert_eq!(queue.pop(), Some(3));
  /// ```
  pub fn with_comparator(cmp: C) -> Self {
    Self {
      head: Box::new(Node::header(MAX_HEIGHT - 1)),
      level: CachePadded::new(AtomicUsize::new(1)),
      cmp,
    }
  }

  /// Returns the comparator used by the queue.
  #[inline]
  pub const fn comparator(&self) -> &C {
    &self.cmp
  }

  #[inline]
  fn head<'g>(&self, _: &'g Guard) -> Shared<'g, Node<T>> {
    Shared::from(&*self.head as *const Node<T>)
  }

  #[inline]
  fn level(&self) -> usize {
    self.level.load(Ordering::Acquire)
  }

  /// Returns the number of elements in the queue.
  ///
  /// This walks the whole queue.
  pub fn len(&self) -> usize {
    let guard = &epoch::pin();
    let mut count = 0;
    let mut n = self.head.next.load(Ordering::Acquire, guard);
    // Safety: nodes reachable while pinned are not reclaimed until unpinned.
    while let Some(node) = unsafe { n.as_ref() } {
      if node.is_live() {
        count += 1;
      }
      n = node.next.load(Ordering::Acquire, guard);
    }
    count
  }

  /// Returns `true` if the queue holds no element.
  #[inline]
  pub fn is_empty(&self) -> bool {
    let guard = &epoch::pin();
    self.first_live(guard).is_none()
  }

  /// Returns the first live node without helping deletions.
  fn first_live<'g>(&self, guard: &'g Guard) -> Option<Shared<'g, Node<T>>> {
    let mut n = self.head.next.load(Ordering::Acquire, guard);
    // Safety: nodes reachable while pinned are not reclaimed until unpinned.
    while let Some(node) = unsafe { n.as_ref() } {
      if node.is_live() {
        return Some(n);
      }
      n = node.next.load(Ordering::Acquire, guard);
    }
    None
  }
}

impl<T, C> SkipQueue<T, C>
where
  T: Send + 'static,
  C: Comparator<T>,
{
  /// Inserts an element into the queue.
  ///
  /// Returns `true` if the element became the head of the queue at the moment
  /// it was linked, which is what a blocked consumer has to be woken for.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::SkipQueue;
  ///
  /// let queue = SkipQueue::new();
  /// assert!(queue.push(5));
  /// assert!(queue.push(1));
  /// assert!(!queue.push(3));
  /// ```
  pub fn push(&self, item: T) -> bool {
    let guard = &epoch::pin();
    let levels = random_level().min(self.level() + 1);
    let mut z = Owned::new(Node::new(item, levels));
    // The key lives on the heap, it does not move with the `Owned` box.
    // Safety: `z` is a data node.
    let key: *const T = unsafe { z.key() };

    'retry: loop {
      // Safety: `key` stays valid until the node is reclaimed, which cannot
      // happen before this call returns. Shared pointers are loaded while pinned.
      unsafe {
        let key = &*key;
        let mut b = self.find_predecessor(key, true, guard);
        let mut n = b.deref().next.load(Ordering::Acquire, guard);
        loop {
          if let Some(node) = n.as_ref() {
            let f = node.next.load(Ordering::Acquire, guard);
            if n != b.deref().next.load(Ordering::Acquire, guard) {
              continue 'retry;
            }
            if node.is_deleted() {
              self.help_delete(b, n, f, guard);
              continue 'retry;
            }
            if node.is_marker() || b.deref().is_deleted() {
              continue 'retry;
            }
            // equal elements go after the existing ones
            if self.cmp.compare(key, node.key()) != CmpOrdering::Less {
              b = n;
              n = f;
              continue;
            }
          }

          z.next.store(n, Ordering::Relaxed);
          match b
            .deref()
            .next
            .compare_exchange(n, z, Ordering::AcqRel, Ordering::Acquire, guard)
          {
            Ok(z) => {
              let first = b == self.head(guard);
              if levels > 0 {
                self.insert_index(z, levels, guard);
              }
              return first;
            }
            Err(e) => {
              z = e.new;
              continue 'retry;
            }
          }
        }
      }
    }
  }

  /// Returns the first live node, unlinking deleted ones on the way.
  fn find_first<'g>(&self, guard: &'g Guard) -> Option<Shared<'g, Node<T>>> {
    let b = self.head(guard);
    loop {
      let n = self.head.next.load(Ordering::Acquire, guard);
      // Safety: nodes reachable while pinned are not reclaimed until unpinned.
      let node = unsafe { n.as_ref() }?;
      if !node.is_deleted() {
        return Some(n);
      }
      let f = node.next.load(Ordering::Acquire, guard);
      self.help_delete(b, n, f, guard);
    }
  }

  /// Returns the last live node, unlinking deleted index slots on the way.
  fn find_last<'g>(&self, guard: &'g Guard) -> Option<Shared<'g, Node<T>>> {
    'restart: loop {
      let mut q = self.head(guard);
      let mut level = self.level();
      // Safety: all shared pointers below are loaded while pinned.
      unsafe {
        loop {
          let r = q.deref().right(level, guard).with_tag(0);
          if let Some(rn) = r.as_ref() {
            if rn.is_deleted() {
              self.unlink(q, level, r, guard);
              continue 'restart;
            }
            q = r;
          } else if level > 1 {
            level -= 1;
          } else {
            break;
          }
        }

        let mut b = q;
        let mut n = b.deref().next.load(Ordering::Acquire, guard);
        loop {
          let node = match n.as_ref() {
            Some(node) => node,
            None => {
              let bn = b.deref();
              if bn.is_header() {
                return None;
              }
              if bn.is_deleted() {
                continue 'restart;
              }
              return Some(b);
            }
          };

          let f = node.next.load(Ordering::Acquire, guard);
          if n != b.deref().next.load(Ordering::Acquire, guard) {
            continue 'restart;
          }
          if node.is_deleted() {
            self.help_delete(b, n, f, guard);
            continue 'restart;
          }
          if node.is_marker() || b.deref().is_deleted() {
            continue 'restart;
          }
          b = n;
          n = f;
        }
      }
    }
  }

  /// Retrieves the head of the queue without removing it.
  #[inline]
  pub fn peek(&self) -> Option<T>
  where
    T: Clone,
  {
    self.peek_with(T::clone)
  }

  /// Calls `f` with the head of the queue, if any, without removing it.
  ///
  /// The element may be removed by another thread while `f` runs, it stays
  /// readable until `f` returns.
  pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
    let guard = &epoch::pin();
    self
      .find_first(guard)
      // Safety: `find_first` only returns data nodes, loaded while pinned.
      .map(|n| unsafe { f(n.deref().key()) })
  }

  /// Retrieves the last element of the queue without removing it.
  pub fn peek_last(&self) -> Option<T>
  where
    T: Clone,
  {
    let guard = &epoch::pin();
    self
      .find_last(guard)
      // Safety: `find_last` only returns data nodes, loaded while pinned.
      .map(|n| unsafe { n.deref().key().clone() })
  }

  /// Retrieves and removes the head of the queue.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::SkipQueue;
  ///
  /// let queue: SkipQueue<_> = [5, 1, 3].into_iter().collect();
  /// assert_eq!(queue.pop(), Some(1));
  /// assert_eq!(queue.pop(), Some(3));
  /// assert_eq!(queue.pop(), Some(5));
  /// assert_eq!(queue.pop(), None);
  /// ```
  #[inline]
  pub fn pop(&self) -> Option<T>
  where
    T: Clone,
  {
    self.pop_first_with(|_| true, T::clone)
  }

  /// Retrieves and removes the head of the queue only if `pred` holds for it.
  ///
  /// `pred` is called again whenever the head changes under contention.
  #[inline]
  pub fn pop_if(&self, pred: impl FnMut(&T) -> bool) -> Option<T>
  where
    T: Clone,
  {
    self.pop_first_with(pred, T::clone)
  }

  fn pop_first_with<R>(
    &self,
    mut pred: impl FnMut(&T) -> bool,
    take: impl FnOnce(&T) -> R,
  ) -> Option<R> {
    let guard = &epoch::pin();
    let b = self.head(guard);
    loop {
      let n = self.head.next.load(Ordering::Acquire, guard);
      // Safety: all shared pointers are loaded while pinned, the head is never
      // followed by a marker so `n` is a data node.
      unsafe {
        let node = n.as_ref()?;
        let f = node.next.load(Ordering::Acquire, guard);
        if n != self.head.next.load(Ordering::Acquire, guard) {
          continue;
        }
        if node.is_deleted() {
          self.help_delete(b, n, f, guard);
          continue;
        }
        if !pred(node.key()) {
          return None;
        }
        if !node.try_delete() {
          continue;
        }

        let out = take(node.key());
        node.mark_tower(guard);
        if !self.unlink_deleted(b, n, f, guard) {
          self.find_first(guard);
        }
        self.clear_index_to_first(guard);
        return Some(out);
      }
    }
  }

  /// Retrieves and removes the last element of the queue.
  pub fn pop_last(&self) -> Option<T>
  where
    T: Clone,
  {
    let guard = &epoch::pin();
    loop {
      let mut b = self.find_predecessor_of_last(guard);
      // Safety: all shared pointers are loaded while pinned.
      unsafe {
        let mut n = b.deref().next.load(Ordering::Acquire, guard);
        if n.is_null() {
          if b.deref().is_header() {
            return None;
          }
          continue;
        }

        loop {
          let node = n.deref();
          let f = node.next.load(Ordering::Acquire, guard);
          if n != b.deref().next.load(Ordering::Acquire, guard) {
            break;
          }
          if node.is_deleted() {
            self.help_delete(b, n, f, guard);
            break;
          }
          if node.is_marker() || b.deref().is_deleted() {
            break;
          }
          if !f.is_null() {
            b = n;
            n = f;
            continue;
          }
          if !node.try_delete() {
            break;
          }

          let key = node.key();
          let out = key.clone();
          node.mark_tower(guard);
          if !self.unlink_deleted(b, n, f, guard) {
            self.clean(key, guard);
          } else {
            self.find_predecessor(key, false, guard);
            self.try_reduce_level(guard);
          }
          return Some(out);
        }
      }
    }
  }

  /// Removes one element equal to `key` from the queue.
  ///
  /// Equality is decided by the comparator first and then by `PartialEq`, so
  /// several elements may share an ordering position while being distinct.
  pub fn remove(&self, key: &T) -> Option<T>
  where
    T: Clone + PartialEq,
  {
    self.remove_with(key, T::clone)
  }

  fn remove_with<R>(&self, key: &T, take: impl FnOnce(&T) -> R) -> Option<R>
  where
    T: PartialEq,
  {
    let guard = &epoch::pin();
    'retry: loop {
      // Safety: all shared pointers are loaded while pinned.
      unsafe {
        let mut b = self.find_predecessor(key, false, guard);
        let mut n = b.deref().next.load(Ordering::Acquire, guard);
        loop {
          let node = n.as_ref()?;
          let f = node.next.load(Ordering::Acquire, guard);
          if n != b.deref().next.load(Ordering::Acquire, guard) {
            continue 'retry;
          }
          if node.is_deleted() {
            self.help_delete(b, n, f, guard);
            continue 'retry;
          }
          if node.is_marker() || b.deref().is_deleted() {
            continue 'retry;
          }

          let k = node.key();
          match self.cmp.compare(key, k) {
            CmpOrdering::Less => return None,
            CmpOrdering::Equal if key == k => {}
            _ => {
              b = n;
              n = f;
              continue;
            }
          }

          if !node.try_delete() {
            continue 'retry;
          }

          let out = take(k);
          node.mark_tower(guard);
          if !self.unlink_deleted(b, n, f, guard) {
            self.clean(key, guard);
          } else {
            self.find_predecessor(key, false, guard);
            self.try_reduce_level(guard);
          }
          return Some(out);
        }
      }
    }
  }

  /// Returns `true` if the queue holds an element equal to `key`.
  pub fn contains(&self, key: &T) -> bool
  where
    T: PartialEq,
  {
    let guard = &epoch::pin();
    self.find_node(key, guard).is_some()
  }

  /// Removes every element from the queue.
  ///
  /// Elements pushed concurrently may survive.
  pub fn clear(&self) {
    while self.pop_first_with(|_| true, |_| ()).is_some() {}
  }

  /// Removes the elements of the queue in order and appends them to `out`,
  /// up to `max` of them. Returns how many were moved.
  pub fn drain_into(&self, out: &mut Vec<T>, max: usize) -> usize
  where
    T: Clone,
  {
    let mut moved = 0;
    while moved < max {
      match self.pop() {
        Some(item) => {
          out.push(item);
          moved += 1;
        }
        None => break,
      }
    }
    moved
  }

  /// Returns the closest node on the base level preceding `key`.
  ///
  /// With `skip_equal` the search moves past nodes equal to `key`, which is
  /// what insertion needs to keep equal elements in FIFO order. Without it
  /// the search stops before the first equal node.
  ///
  /// Deleted nodes met on index levels are unlinked.
  fn find_predecessor<'g>(
    &self,
    key: &T,
    skip_equal: bool,
    guard: &'g Guard,
  ) -> Shared<'g, Node<T>> {
    'retry: loop {
      let mut q = self.head(guard);
      let mut level = self.level();
      loop {
        // Safety: `q` is the header or a node linked at `level`, loaded while pinned.
        unsafe {
          let r = q.deref().right(level, guard).with_tag(0);
          if let Some(rn) = r.as_ref() {
            if rn.is_deleted() {
              if !self.unlink(q, level, r, guard) {
                continue 'retry;
              }
              continue;
            }

            match self.cmp.compare(key, rn.key()) {
              CmpOrdering::Greater => {
                q = r;
                continue;
              }
              CmpOrdering::Equal if skip_equal => {
                q = r;
                continue;
              }
              _ => {}
            }
          }
        }

        if level == 1 {
          return q;
        }
        level -= 1;
      }
    }
  }

  /// Returns the predecessor of the last node on the base level.
  fn find_predecessor_of_last<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
    'retry: loop {
      let mut q = self.head(guard);
      let mut level = self.level();
      loop {
        // Safety: see `find_predecessor`.
        unsafe {
          let r = q.deref().right(level, guard).with_tag(0);
          if let Some(rn) = r.as_ref() {
            if rn.is_deleted() {
              self.unlink(q, level, r, guard);
              continue 'retry;
            }
            // only move to nodes which are not the last one
            if !rn.next.load(Ordering::Acquire, guard).is_null() {
              q = r;
              continue;
            }
          }
        }

        if level == 1 {
          return q;
        }
        level -= 1;
      }
    }
  }

  fn find_node<'g>(&self, key: &T, guard: &'g Guard) -> Option<Shared<'g, Node<T>>>
  where
    T: PartialEq,
  {
    'retry: loop {
      // Safety: all shared pointers are loaded while pinned.
      unsafe {
        let mut b = self.find_predecessor(key, false, guard);
        let mut n = b.deref().next.load(Ordering::Acquire, guard);
        loop {
          let node = n.as_ref()?;
          let f = node.next.load(Ordering::Acquire, guard);
          if n != b.deref().next.load(Ordering::Acquire, guard) {
            continue 'retry;
          }
          if node.is_deleted() {
            self.help_delete(b, n, f, guard);
            continue 'retry;
          }
          if node.is_marker() || b.deref().is_deleted() {
            continue 'retry;
          }

          let k = node.key();
          match self.cmp.compare(key, k) {
            CmpOrdering::Less => return None,
            CmpOrdering::Equal if key == k => return Some(n),
            _ => {}
          }
          b = n;
          n = f;
        }
      }
    }
  }

  /// Unlinks every deleted base node ordered at or before `key`.
  fn clean(&self, key: &T, guard: &Guard) {
    'retry: loop {
      // Safety: all shared pointers are loaded while pinned.
      unsafe {
        let mut b = self.find_predecessor(key, false, guard);
        let mut n = b.deref().next.load(Ordering::Acquire, guard);
        loop {
          let node = match n.as_ref() {
            Some(node) => node,
            None => return,
          };
          let f = node.next.load(Ordering::Acquire, guard);
          if n != b.deref().next.load(Ordering::Acquire, guard) {
            continue 'retry;
          }
          if node.is_deleted() {
            self.help_delete(b, n, f, guard);
            continue 'retry;
          }
          if node.is_marker() || b.deref().is_deleted() {
            continue 'retry;
          }
          if self.cmp.compare(key, node.key()) == CmpOrdering::Less {
            return;
          }
          b = n;
          n = f;
        }
      }
    }
  }

  /// Links the index levels of a freshly inserted node, growing the height of
  /// the queue by one level if needed.
  fn insert_index<'g>(&self, z: Shared<'g, Node<T>>, levels: usize, guard: &'g Guard) {
    let mut max = self.level();
    while levels > max {
      match self
        .level
        .compare_exchange(max, levels, Ordering::AcqRel, Ordering::Acquire)
      {
        Ok(_) => break,
        Err(current) => max = current,
      }
    }
    self.add_index(z, levels, guard);
  }

  fn add_index<'g>(&self, z: Shared<'g, Node<T>>, levels: usize, guard: &'g Guard) {
    // Safety: `z` is a data node we inserted, it cannot be reclaimed before all
    // of its levels are released. Other pointers are loaded while pinned.
    unsafe {
      let zn = z.deref();
      debug_assert_eq!(zn.levels(), levels);
      let key = zn.key();
      let mut insertion_level = levels;

      'retry: loop {
        let mut level = self.level();
        if level < insertion_level {
          // the queue shrank meanwhile, upper levels cannot be reached anymore
          Node::release(z, insertion_level - level, guard);
          insertion_level = level;
        }

        let mut q = self.head(guard);
        loop {
          let r = q.deref().right(level, guard).with_tag(0);
          if let Some(rn) = r.as_ref() {
            if rn.is_deleted() {
              if !self.unlink(q, level, r, guard) {
                continue 'retry;
              }
              continue;
            }
            if self.cmp.compare(key, rn.key()) == CmpOrdering::Greater {
              q = r;
              continue;
            }
          }

          if level == insertion_level {
            if zn.is_deleted() {
              Node::release(z, insertion_level, guard);
              self.find_predecessor(key, true, guard);
              return;
            }

            match self.link(q, level, r, z, guard) {
              Link::Linked => {}
              Link::Retry => continue 'retry,
              Link::Abandoned => {
                Node::release(z, insertion_level, guard);
                self.find_predecessor(key, true, guard);
                return;
              }
            }

            insertion_level -= 1;
            if insertion_level == 0 {
              // make sure a concurrent removal does not leave the slots linked
              if zn.is_deleted() {
                self.find_predecessor(key, true, guard);
              }
              return;
            }
          }

          level -= 1;
        }
      }
    }
  }

  /// Links the `level` slot of `z` between `q` and `r`.
  ///
  /// ## Safety
  /// - `q` must be the header or a node with an index slot at `level`.
  /// - `z` must be a data node with an index slot at `level`.
  unsafe fn link<'g>(
    &self,
    q: Shared<'g, Node<T>>,
    level: usize,
    r: Shared<'g, Node<T>>,
    z: Shared<'g, Node<T>>,
    guard: &'g Guard,
  ) -> Link {
    let slot = z.deref().tower(level);
    let current = slot.load(Ordering::Acquire, guard);
    // a tagged slot means the node was deleted and its tower frozen
    if current.tag() != 0
      || slot
        .compare_exchange(current, r, Ordering::AcqRel, Ordering::Acquire, guard)
        .is_err()
    {
      return Link::Abandoned;
    }

    let qn = q.deref();
    if qn.is_deleted() {
      return Link::Retry;
    }

    match qn
      .tower(level)
      .compare_exchange(r, z, Ordering::AcqRel, Ordering::Acquire, guard)
    {
      Ok(_) => Link::Linked,
      Err(_) => Link::Retry,
    }
  }

  /// Unlinks the deleted node `r` from the `level` index list right after `q`.
  ///
  /// Returns `false` if `q` was deleted or its link changed.
  ///
  /// ## Safety
  /// - `q` must be the header or a node with an index slot at `level`.
  /// - `r` must be untagged and linked at `level`.
  unsafe fn unlink<'g>(
    &self,
    q: Shared<'g, Node<T>>,
    level: usize,
    r: Shared<'g, Node<T>>,
    guard: &'g Guard,
  ) -> bool {
    let succ = r
      .deref()
      .tower(level)
      .fetch_or(1, Ordering::AcqRel, guard)
      .with_tag(0);
    let qn = q.deref();
    if qn.is_deleted() {
      return false;
    }

    match qn
      .tower(level)
      .compare_exchange(r, succ, Ordering::AcqRel, Ordering::Acquire, guard)
    {
      Ok(_) => {
        Node::release(r, 1, guard);
        true
      }
      Err(_) => false,
    }
  }

  /// Helps to unlink the deleted node `n` placed between `b` and `f`.
  ///
  /// The first call appends a marker after `n`, the second one unlinks both
  /// `n` and the marker.
  fn help_delete<'g>(
    &self,
    b: Shared<'g, Node<T>>,
    n: Shared<'g, Node<T>>,
    f: Shared<'g, Node<T>>,
    guard: &'g Guard,
  ) {
    // Safety: all shared pointers are loaded while pinned, `n` is a data node.
    unsafe {
      let node = n.deref();
      let bn = b.deref();
      if f != node.next.load(Ordering::Acquire, guard)
        || n != bn.next.load(Ordering::Acquire, guard)
      {
        return;
      }

      match f.as_ref() {
        Some(marker) if marker.is_marker() => {
          let after = marker.next.load(Ordering::Acquire, guard);
          if bn
            .next
            .compare_exchange(n, after, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
          {
            Node::release(n, 1, guard);
            Node::release(f, 1, guard);
          }
        }
        _ => {
          node.append_marker(f, guard);
        }
      }
    }
  }

  /// Appends a marker after the deleted node `n` and unlinks both of them
  /// from `b`. Returns `false` if another thread got in the way.
  ///
  /// ## Safety
  /// - `n` must be a deleted data node, `b` its predecessor and `f` its successor
  ///   when `n` was deleted.
  unsafe fn unlink_deleted<'g>(
    &self,
    b: Shared<'g, Node<T>>,
    n: Shared<'g, Node<T>>,
    f: Shared<'g, Node<T>>,
    guard: &'g Guard,
  ) -> bool {
    let marker = match n.deref().append_marker(f, guard) {
      Some(marker) => marker,
      None => return false,
    };

    match b
      .deref()
      .next
      .compare_exchange(n, f, Ordering::AcqRel, Ordering::Acquire, guard)
    {
      Ok(_) => {
        Node::release(n, 1, guard);
        Node::release(marker, 1, guard);
        true
      }
      Err(_) => false,
    }
  }

  /// Unlinks the deleted nodes sitting at the front of every index level.
  fn clear_index_to_first(&self, guard: &Guard) {
    let q = self.head(guard);
    'retry: loop {
      let mut level = self.level();
      loop {
        // Safety: `q` is the header, other pointers are loaded while pinned.
        unsafe {
          let r = q.deref().right(level, guard).with_tag(0);
          if let Some(rn) = r.as_ref() {
            if rn.is_deleted() && !self.unlink(q, level, r, guard) {
              continue 'retry;
            }
          }
        }

        if level == 1 {
          self.try_reduce_level(guard);
          return;
        }
        level -= 1;
      }
    }
  }

  /// Tries to drop the top index level when the three topmost ones look empty.
  ///
  /// This may wrongly reduce the height while an insertion is linking a new
  /// top level. The insertion backs the change out when it notices the level
  /// is not empty anymore, and the queue stays correct either way, only a
  /// little slower.
  fn try_reduce_level(&self, guard: &Guard) {
    let h = self.level();
    if h <= 3 {
      return;
    }

    let head = &self.head;
    if head.right(h, guard).is_null()
      && head.right(h - 1, guard).is_null()
      && head.right(h - 2, guard).is_null()
      && self
        .level
        .compare_exchange(h, h - 1, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
      && !head.right(h, guard).is_null()
    {
      let _ = self
        .level
        .compare_exchange(h - 1, h, Ordering::AcqRel, Ordering::Acquire);
    }
  }
}

impl<T, C> SkipQueue<T, C> {
  /// Returns an iterator over the elements of the queue in order.
  ///
  /// The iterator keeps the current thread pinned, memory removed from the
  /// queue is not reclaimed while it is alive.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::SkipQueue;
  ///
  /// let queue: SkipQueue<_> = [3, 1, 2].into_iter().collect();
  /// assert_eq!(queue.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
  /// ```
  #[inline]
  pub fn iter(&self) -> Iter<'_, T, C>
  where
    T: Clone,
  {
    Iter::new(self)
  }
}

impl<T, C> Extend<T> for SkipQueue<T, C>
where
  T: Send + 'static,
  C: Comparator<T>,
{
  fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
    for item in iter {
      self.push(item);
    }
  }
}

impl<T, C> FromIterator<T> for SkipQueue<T, C>
where
  T: Send + 'static,
  C: Comparator<T> + Default,
{
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    let mut queue = Self::with_comparator(C::default());
    queue.extend(iter);
    queue
  }
}

impl<T, C> Clone for SkipQueue<T, C>
where
  T: Clone + Send + 'static,
  C: Comparator<T> + Clone,
{
  fn clone(&self) -> Self {
    let mut queue = Self::with_comparator(self.cmp.clone());
    queue.extend(self.iter());
    queue
  }
}

impl<T: fmt::Debug + Clone, C> fmt::Debug for SkipQueue<T, C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

impl<T, C> Drop for SkipQueue<T, C> {
  fn drop(&mut self) {
    // Safety: we have unique access, nothing else can touch the nodes. Every
    // node still linked somewhere is freed exactly once, the ones already
    // retired are owned by the collector.
    unsafe {
      let guard = epoch::unprotected();
      let mut seen = HashSet::new();
      let mut nodes = Vec::new();

      let mut n = self.head.next.load(Ordering::Relaxed, guard);
      while let Some(node) = n.as_ref() {
        if seen.insert(n.as_raw()) {
          nodes.push(n);
        }
        n = node.next.load(Ordering::Relaxed, guard);
      }

      for level in 1..MAX_HEIGHT {
        let mut r = self.head.right(level, guard).with_tag(0);
        while let Some(node) = r.as_ref() {
          if seen.insert(r.as_raw()) {
            nodes.push(r);
          }
          r = node.right(level, guard).with_tag(0);
        }
      }

      for node in nodes {
        drop(node.into_owned());
      }
    }
  }
}
