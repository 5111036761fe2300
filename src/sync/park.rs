use core::{
  sync::atomic::{fence, AtomicBool, Ordering},
  time::Duration,
};
use std::{
  thread::{self, Thread},
  time::Instant,
};

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::{Backoff, CachePadded};

use super::{Interrupted, OwnedSynchronizer};

/// An [`OwnedSynchronizer`] built on a single CAS installed waiter slot and
/// thread park/unpark.
///
/// Producers never take a lock: `signal` is a load of the waiter slot, a
/// store to the `available` flag and an unpark. The waiter optionally spins
/// on the flag before parking.
pub struct ParkSynchronizer {
  waiter: Atomic<Thread>,
  available: CachePadded<AtomicBool>,
  interrupted: AtomicBool,
  spins: u32,
}

impl Default for ParkSynchronizer {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl core::fmt::Debug for ParkSynchronizer {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ParkSynchronizer")
      .field("registered", &self.should_signal())
      .field("available", &self.available.load(Ordering::Relaxed))
      .field("interrupted", &self.interrupted.load(Ordering::Relaxed))
      .field("spins", &self.spins)
      .finish()
  }
}

impl ParkSynchronizer {
  /// Creates a synchronizer which parks right away.
  #[inline]
  pub fn new() -> Self {
    Self::with_spins(0)
  }

  /// Creates a synchronizer which spins `spins` times on the wake flag before
  /// parking.
  #[inline]
  pub fn with_spins(spins: u32) -> Self {
    Self {
      waiter: Atomic::null(),
      available: CachePadded::new(AtomicBool::new(false)),
      interrupted: AtomicBool::new(false),
      spins,
    }
  }

  fn is_owner(&self) -> bool {
    let guard = &epoch::pin();
    let waiter = self.waiter.load(Ordering::Acquire, guard);
    // Safety: the waiter is only retired through the epoch, we are pinned.
    unsafe { waiter.as_ref() }.is_some_and(|t| t.id() == thread::current().id())
  }

  fn assert_owner(&self) {
    if !self.is_owner() {
      #[cfg(feature = "tracing")]
      tracing::error!(thread = ?thread::current().id(), "wait on a synchronizer by a thread which is not its waiter");
      panic!("wait on a synchronizer by a thread which is not its registered waiter");
    }
  }

  /// Consumes a pending interrupt or signal.
  #[inline]
  fn poll_wake(&self) -> Option<Result<(), Interrupted>> {
    if self.interrupted.swap(false, Ordering::AcqRel) {
      return Some(Err(Interrupted));
    }
    if self.available.swap(false, Ordering::AcqRel) {
      return Some(Ok(()));
    }
    None
  }

  fn spin(&self) -> Option<Result<(), Interrupted>> {
    let backoff = Backoff::new();
    for _ in 0..self.spins {
      if let Some(res) = self.poll_wake() {
        return Some(res);
      }
      backoff.spin();
    }
    None
  }
}

impl OwnedSynchronizer for ParkSynchronizer {
  fn register(&self) {
    let guard = &epoch::pin();
    let current = Owned::new(thread::current());
    if let Err(e) = self.waiter.compare_exchange(
      epoch::Shared::null(),
      current,
      Ordering::AcqRel,
      Ordering::Acquire,
      guard,
    ) {
      #[cfg(feature = "tracing")]
      tracing::error!(thread = ?thread::current().id(), "register on a synchronizer which already has a waiter");
      drop(e.new);
      panic!("synchronizer already has a registered waiter");
    }
    // only the new owner drops stale signals
    self.available.store(false, Ordering::Release);
    // pairs with the fence producers issue between publishing and `should_signal`
    fence(Ordering::SeqCst);
  }

  fn unregister(&self) {
    let guard = &epoch::pin();
    if !self.is_owner() {
      #[cfg(feature = "tracing")]
      tracing::error!(thread = ?thread::current().id(), "unregister from a synchronizer by a thread which is not its waiter");
      panic!("unregister by a thread which is not the registered waiter");
    }

    let old = self
      .waiter
      .swap(epoch::Shared::null(), Ordering::AcqRel, guard);
    // Safety: `old` was just unlinked, signallers may still be reading it.
    unsafe { guard.defer_destroy(old) };
  }

  #[inline]
  fn should_signal(&self) -> bool {
    let guard = &epoch::pin();
    !self.waiter.load(Ordering::SeqCst, guard).is_null()
  }

  fn signal(&self) {
    let guard = &epoch::pin();
    let waiter = self.waiter.load(Ordering::Acquire, guard);
    // Safety: the waiter is only retired through the epoch, we are pinned.
    if let Some(t) = unsafe { waiter.as_ref() } {
      self.available.store(true, Ordering::Release);
      t.unpark();
    }
  }

  fn wait(&self) -> Result<(), Interrupted> {
    self.assert_owner();
    if let Some(res) = self.spin() {
      return res;
    }

    loop {
      if let Some(res) = self.poll_wake() {
        return res;
      }
      thread::park();
    }
  }

  fn wait_timeout(&self, timeout: Duration) -> Result<Option<Duration>, Interrupted> {
    self.assert_owner();
    let start = Instant::now();
    if let Some(res) = self.spin() {
      return res.map(|_| Some(timeout.saturating_sub(start.elapsed())));
    }

    loop {
      if let Some(res) = self.poll_wake() {
        return res.map(|_| Some(timeout.saturating_sub(start.elapsed())));
      }

      let remaining = timeout.saturating_sub(start.elapsed());
      if remaining.is_zero() {
        return Ok(None);
      }
      thread::park_timeout(remaining);
    }
  }

  fn interrupt(&self) {
    self.interrupted.store(true, Ordering::Release);
    let guard = &epoch::pin();
    let waiter = self.waiter.load(Ordering::Acquire, guard);
    // Safety: the waiter is only retired through the epoch, we are pinned.
    if let Some(t) = unsafe { waiter.as_ref() } {
      t.unpark();
    }
  }
}

impl Drop for ParkSynchronizer {
  fn drop(&mut self) {
    // Safety: we have unique access.
    unsafe {
      let guard = epoch::unprotected();
      let waiter = self.waiter.load(Ordering::Relaxed, guard);
      if !waiter.is_null() {
        drop(waiter.into_owned());
      }
    }
  }
}
