use core::{
  mem::MaybeUninit,
  sync::atomic::{AtomicU8, AtomicUsize, Ordering},
};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

/// The node holds an element which has not been removed.
pub(super) const LIVE: u8 = 0;
/// The node has been logically removed. Its tower is being frozen and it will
/// be unlinked by the remover or by any thread passing by.
pub(super) const DELETED: u8 = 1;
/// The node is a deletion marker spliced right after a deleted node.
pub(super) const MARKER: u8 = 2;
/// The node is the base header of the list.
pub(super) const HEADER: u8 = 3;

/// A node of the skiplist.
///
/// The base level uses the `next` link and deletion markers. Index levels use
/// the tower, where `tower[i]` is the right link at index level `i + 1`. A
/// tower link is tagged once its node is deleted, which freezes it: any CAS
/// expecting an untagged pointer on it fails, so an index slot is unlinked
/// at most once.
pub(super) struct Node<T> {
  key: MaybeUninit<T>,
  state: AtomicU8,
  /// Number of positions linking this node: the base list plus every linked
  /// index slot. The node is retired when it drops to zero.
  refs: AtomicUsize,
  pub(super) next: Atomic<Node<T>>,
  tower: Box<[Atomic<Node<T>>]>,
}

impl<T> Node<T> {
  #[inline]
  pub(super) fn new(key: T, levels: usize) -> Self {
    Self {
      key: MaybeUninit::new(key),
      state: AtomicU8::new(LIVE),
      refs: AtomicUsize::new(1 + levels),
      next: Atomic::null(),
      tower: (0..levels).map(|_| Atomic::null()).collect(),
    }
  }

  #[inline]
  pub(super) fn header(levels: usize) -> Self {
    Self {
      key: MaybeUninit::uninit(),
      state: AtomicU8::new(HEADER),
      refs: AtomicUsize::new(1),
      next: Atomic::null(),
      tower: (0..levels).map(|_| Atomic::null()).collect(),
    }
  }

  #[inline]
  fn marker() -> Self {
    Self {
      key: MaybeUninit::uninit(),
      state: AtomicU8::new(MARKER),
      refs: AtomicUsize::new(1),
      next: Atomic::null(),
      tower: Box::new([]),
    }
  }

  /// ## Safety
  /// - The node must be a data node, i.e. neither a marker nor the header.
  #[inline]
  pub(super) unsafe fn key(&self) -> &T {
    debug_assert!(self.state.load(Ordering::Relaxed) < MARKER);
    self.key.assume_init_ref()
  }

  #[inline]
  pub(super) fn state(&self) -> u8 {
    self.state.load(Ordering::Acquire)
  }

  #[inline]
  pub(super) fn is_live(&self) -> bool {
    self.state() == LIVE
  }

  #[inline]
  pub(super) fn is_deleted(&self) -> bool {
    self.state() == DELETED
  }

  #[inline]
  pub(super) fn is_marker(&self) -> bool {
    self.state() == MARKER
  }

  #[inline]
  pub(super) fn is_header(&self) -> bool {
    self.state() == HEADER
  }

  /// Logically removes the node. This is the linearization point of every
  /// removal, only one thread can win it.
  #[inline]
  pub(super) fn try_delete(&self) -> bool {
    self
      .state
      .compare_exchange(LIVE, DELETED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Returns the number of index levels of the node.
  #[inline]
  pub(super) fn levels(&self) -> usize {
    self.tower.len()
  }

  /// Returns the right link at index `level`, starting from `1`.
  #[inline]
  pub(super) fn tower(&self, level: usize) -> &Atomic<Node<T>> {
    &self.tower[level - 1]
  }

  #[inline]
  pub(super) fn right<'g>(&self, level: usize, guard: &'g Guard) -> Shared<'g, Node<T>> {
    self.tower(level).load(Ordering::Acquire, guard)
  }

  /// Freezes every index link of a deleted node, top level first.
  pub(super) fn mark_tower(&self, guard: &Guard) {
    for link in self.tower.iter().rev() {
      link.fetch_or(1, Ordering::AcqRel, guard);
    }
  }

  /// Tries to splice a deletion marker between this node and `f`.
  pub(super) fn append_marker<'g>(
    &self,
    f: Shared<'g, Node<T>>,
    guard: &'g Guard,
  ) -> Option<Shared<'g, Node<T>>> {
    let marker = Owned::new(Node::marker());
    marker.next.store(f, Ordering::Relaxed);
    self
      .next
      .compare_exchange(f, marker, Ordering::AcqRel, Ordering::Acquire, guard)
      .ok()
  }

  /// Drops `n` linked positions of the node and retires it once none are left.
  ///
  /// ## Safety
  /// - `this` must point to a node which is not the header.
  /// - The caller must own the `n` positions it gives back, each of them is
  ///   released exactly once.
  #[inline]
  pub(super) unsafe fn release(this: Shared<'_, Node<T>>, n: usize, guard: &Guard)
  where
    T: Send + 'static,
  {
    if n == 0 {
      return;
    }

    let node = this.deref();
    if node.refs.fetch_sub(n, Ordering::AcqRel) == n {
      guard.defer_destroy(this);
    }
  }
}

impl<T> Drop for Node<T> {
  fn drop(&mut self) {
    if *self.state.get_mut() < MARKER {
      // Safety: data nodes always hold an initialized key.
      unsafe { self.key.assume_init_drop() };
    }
  }
}
