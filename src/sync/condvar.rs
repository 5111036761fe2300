use core::{
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};
use std::{
  thread::{self, ThreadId},
  time::Instant,
};

use parking_lot::{Condvar, Mutex};

use super::{Interrupted, OwnedSynchronizer};

#[derive(Debug, Default)]
struct State {
  owner: Option<ThreadId>,
  available: bool,
  interrupted: bool,
}

/// An [`OwnedSynchronizer`] built on a mutex and a condition variable.
///
/// Every operation takes the lock, including `signal`. The registration flag
/// is mirrored in an atomic so `should_signal` stays lock free.
#[derive(Debug, Default)]
pub struct CondvarSynchronizer {
  state: Mutex<State>,
  cond: Condvar,
  registered: AtomicBool,
}

impl CondvarSynchronizer {
  /// Creates a new synchronizer.
  #[inline]
  pub fn new() -> Self {
    Self::default()
  }

  fn assert_owner(state: &State) {
    if state.owner != Some(thread::current().id()) {
      #[cfg(feature = "tracing")]
      tracing::error!(thread = ?thread::current().id(), "wait on a synchronizer by a thread which is not its waiter");
      panic!("wait on a synchronizer by a thread which is not its registered waiter");
    }
  }
}

impl OwnedSynchronizer for CondvarSynchronizer {
  fn register(&self) {
    let mut state = self.state.lock();
    if state.owner.is_some() {
      drop(state);
      #[cfg(feature = "tracing")]
      tracing::error!(thread = ?thread::current().id(), "register on a synchronizer which already has a waiter");
      panic!("synchronizer already has a registered waiter");
    }
    state.owner = Some(thread::current().id());
    state.available = false;
    self.registered.store(true, Ordering::SeqCst);
  }

  fn unregister(&self) {
    let mut state = self.state.lock();
    if state.owner != Some(thread::current().id()) {
      drop(state);
      #[cfg(feature = "tracing")]
      tracing::error!(thread = ?thread::current().id(), "unregister from a synchronizer by a thread which is not its waiter");
      panic!("unregister by a thread which is not the registered waiter");
    }
    state.owner = None;
    self.registered.store(false, Ordering::SeqCst);
  }

  #[inline]
  fn should_signal(&self) -> bool {
    self.registered.load(Ordering::SeqCst)
  }

  fn signal(&self) {
    let mut state = self.state.lock();
    if state.owner.is_some() {
      state.available = true;
      self.cond.notify_one();
    }
  }

  fn wait(&self) -> Result<(), Interrupted> {
    let mut state = self.state.lock();
    Self::assert_owner(&state);
    loop {
      if state.interrupted {
        state.interrupted = false;
        return Err(Interrupted);
      }
      if state.available {
        state.available = false;
        return Ok(());
      }
      self.cond.wait(&mut state);
    }
  }

  fn wait_timeout(&self, timeout: Duration) -> Result<Option<Duration>, Interrupted> {
    let start = Instant::now();
    let mut state = self.state.lock();
    Self::assert_owner(&state);
    loop {
      if state.interrupted {
        state.interrupted = false;
        return Err(Interrupted);
      }
      if state.available {
        state.available = false;
        return Ok(Some(timeout.saturating_sub(start.elapsed())));
      }

      let remaining = timeout.saturating_sub(start.elapsed());
      if remaining.is_zero() {
        return Ok(None);
      }
      self.cond.wait_for(&mut state, remaining);
    }
  }

  fn interrupt(&self) {
    let mut state = self.state.lock();
    state.interrupted = true;
    self.cond.notify_one();
  }
}
