use core::time::Duration;
use std::time::Instant;

use super::{Interrupted, Options, SyncKind};

mod park;
pub use park::ParkSynchronizer;

mod condvar;
pub use condvar::CondvarSynchronizer;

#[cfg(test)]
mod tests;

/// A block/wake primitive owned by a single waiting thread at a time.
///
/// The owner declares itself with [`register`](OwnedSynchronizer::register),
/// checks the condition it waits for, and only then blocks in one of the
/// `wait` methods. Any thread may [`signal`](OwnedSynchronizer::signal) it.
/// Checking the condition after registering is what makes lost wakeups
/// impossible: a producer which changed the condition before the consumer
/// registered is seen by the check, one which changed it after sees the
/// registration and signals.
///
/// Every `wait` may return spuriously, callers must re-check their condition
/// in a loop.
///
/// Rust threads cannot be interrupted, so each synchronizer carries its own
/// interrupt flag. [`interrupt`](OwnedSynchronizer::interrupt) raises it and
/// wakes the owner; the flag stays pending until a wait consumes it by
/// returning [`Interrupted`].
pub trait OwnedSynchronizer: Send + Sync {
  /// Declares the current thread as the sole waiter.
  ///
  /// # Panics
  /// - If another waiter is already registered.
  fn register(&self);

  /// Withdraws the current thread as the waiter.
  ///
  /// # Panics
  /// - If the current thread is not the registered waiter.
  fn unregister(&self);

  /// Returns `true` if a waiter is registered and may need a signal.
  fn should_signal(&self) -> bool;

  /// Wakes the registered waiter, if any. A no-op otherwise.
  fn signal(&self);

  /// Blocks the registered waiter until it is signalled or interrupted.
  fn wait(&self) -> Result<(), Interrupted>;

  /// Blocks the registered waiter until it is signalled, interrupted or
  /// `timeout` elapses.
  ///
  /// Returns the remaining time if woken by a signal and `None` once the
  /// timeout elapsed.
  fn wait_timeout(&self, timeout: Duration) -> Result<Option<Duration>, Interrupted>;

  /// Blocks the registered waiter until it is signalled, interrupted or
  /// `deadline` passes. Returns `false` if the deadline passed.
  fn wait_deadline(&self, deadline: Instant) -> Result<bool, Interrupted> {
    let timeout = deadline.saturating_duration_since(Instant::now());
    if timeout.is_zero() {
      return Ok(false);
    }
    self.wait_timeout(timeout).map(|remaining| remaining.is_some())
  }

  /// Raises the interrupt flag and wakes the registered waiter, if any.
  fn interrupt(&self);
}

/// An RAII registration on an [`OwnedSynchronizer`], unregistering on drop.
///
/// This guarantees the waiter is withdrawn on every exit path of a blocking
/// operation, including early returns and unwinding.
#[must_use = "the waiter is unregistered as soon as the registration is dropped"]
pub struct Registration<'a, S: OwnedSynchronizer + ?Sized> {
  sync: &'a S,
}

impl<'a, S: OwnedSynchronizer + ?Sized> Registration<'a, S> {
  /// Registers the current thread on `sync`.
  ///
  /// # Panics
  /// - If another waiter is already registered.
  #[inline]
  pub fn new(sync: &'a S) -> Self {
    sync.register();
    Self { sync }
  }
}

impl<S: OwnedSynchronizer + ?Sized> core::ops::Deref for Registration<'_, S> {
  type Target = S;

  #[inline]
  fn deref(&self) -> &S {
    self.sync
  }
}

impl<S: OwnedSynchronizer + ?Sized> Drop for Registration<'_, S> {
  #[inline]
  fn drop(&mut self) {
    self.sync.unregister();
  }
}

/// An [`OwnedSynchronizer`] whose backend is picked at runtime by [`SyncKind`].
#[derive(Debug)]
pub enum Synchronizer {
  /// See [`ParkSynchronizer`].
  Park(ParkSynchronizer),
  /// See [`CondvarSynchronizer`].
  Condvar(CondvarSynchronizer),
}

impl Default for Synchronizer {
  #[inline]
  fn default() -> Self {
    Self::new(&Options::new())
  }
}

impl Synchronizer {
  /// Creates a synchronizer with the backend and spin count of `options`.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::{Options, SyncKind, Synchronizer};
  ///
  /// let sync = Synchronizer::new(&Options::new().with_sync(SyncKind::Condvar));
  /// assert!(matches!(sync, Synchronizer::Condvar(_)));
  /// ```
  pub fn new(options: &Options) -> Self {
    match options.sync() {
      SyncKind::Park => Self::Park(ParkSynchronizer::with_spins(options.spins())),
      SyncKind::Condvar => Self::Condvar(CondvarSynchronizer::new()),
    }
  }

  /// Returns the backend kind.
  #[inline]
  pub const fn kind(&self) -> SyncKind {
    match self {
      Self::Park(_) => SyncKind::Park,
      Self::Condvar(_) => SyncKind::Condvar,
    }
  }
}

macro_rules! dispatch {
  ($this:ident.$method:ident($($arg:expr),*)) => {
    match $this {
      Synchronizer::Park(s) => s.$method($($arg),*),
      Synchronizer::Condvar(s) => s.$method($($arg),*),
    }
  };
}

impl OwnedSynchronizer for Synchronizer {
  #[inline]
  fn register(&self) {
    dispatch!(self.register())
  }

  #[inline]
  fn unregister(&self) {
    dispatch!(self.unregister())
  }

  #[inline]
  fn should_signal(&self) -> bool {
    dispatch!(self.should_signal())
  }

  #[inline]
  fn signal(&self) {
    dispatch!(self.signal())
  }

  #[inline]
  fn wait(&self) -> Result<(), Interrupted> {
    dispatch!(self.wait())
  }

  #[inline]
  fn wait_timeout(&self, timeout: Duration) -> Result<Option<Duration>, Interrupted> {
    dispatch!(self.wait_timeout(timeout))
  }

  #[inline]
  fn wait_deadline(&self, deadline: Instant) -> Result<bool, Interrupted> {
    dispatch!(self.wait_deadline(deadline))
  }

  #[inline]
  fn interrupt(&self) {
    dispatch!(self.interrupt())
  }
}

impl<S: OwnedSynchronizer + ?Sized> OwnedSynchronizer for std::sync::Arc<S> {
  #[inline]
  fn register(&self) {
    (**self).register()
  }

  #[inline]
  fn unregister(&self) {
    (**self).unregister()
  }

  #[inline]
  fn should_signal(&self) -> bool {
    (**self).should_signal()
  }

  #[inline]
  fn signal(&self) {
    (**self).signal()
  }

  #[inline]
  fn wait(&self) -> Result<(), Interrupted> {
    (**self).wait()
  }

  #[inline]
  fn wait_timeout(&self, timeout: Duration) -> Result<Option<Duration>, Interrupted> {
    (**self).wait_timeout(timeout)
  }

  #[inline]
  fn wait_deadline(&self, deadline: Instant) -> Result<bool, Interrupted> {
    (**self).wait_deadline(deadline)
  }

  #[inline]
  fn interrupt(&self) {
    (**self).interrupt()
  }
}
