use core::{
  cmp::Ordering as CmpOrdering,
  fmt,
  sync::atomic::{fence, AtomicU8, Ordering},
  time::Duration,
};
use std::{
  panic::{catch_unwind, AssertUnwindSafe},
  sync::{Arc, Weak},
  time::Instant,
};

use parking_lot::{Condvar, Mutex};

use super::Shared;
use crate::{delay::deadline_after, Delayed};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;
const FAILED: u8 = 3;

/// How a task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Period {
  Once,
  /// The next run is triggered `period` after the previous trigger time,
  /// whatever the duration of the run.
  FixedRate(Duration),
  /// The next run is triggered `delay` after the previous run completed.
  FixedDelay(Duration),
}

enum Job {
  Once(Option<Box<dyn FnOnce() + Send>>),
  Repeat(Box<dyn FnMut() + Send>),
}

pub(super) struct TaskInner {
  state: AtomicU8,
  period: Period,
  seq: u64,
  /// The next trigger time. Only the worker moves it forward.
  time: Mutex<Instant>,
  job: Mutex<Job>,
  lock: Mutex<()>,
  done: Condvar,
  executor: Weak<Shared>,
}

impl TaskInner {
  fn new(job: Job, period: Period, time: Instant, seq: u64, executor: Weak<Shared>) -> Self {
    Self {
      state: AtomicU8::new(PENDING),
      period,
      seq,
      time: Mutex::new(time),
      job: Mutex::new(job),
      lock: Mutex::new(()),
      done: Condvar::new(),
      executor,
    }
  }

  pub(super) fn once(
    f: impl FnOnce() + Send + 'static,
    time: Instant,
    seq: u64,
    executor: Weak<Shared>,
  ) -> Self {
    Self::new(Job::Once(Some(Box::new(f))), Period::Once, time, seq, executor)
  }

  pub(super) fn periodic(
    f: impl FnMut() + Send + 'static,
    period: Period,
    time: Instant,
    seq: u64,
    executor: Weak<Shared>,
  ) -> Self {
    Self::new(Job::Repeat(Box::new(f)), period, time, seq, executor)
  }

  #[inline]
  fn state(&self) -> u8 {
    self.state.load(Ordering::Acquire)
  }

  #[inline]
  pub(super) fn is_pending(&self) -> bool {
    self.state() == PENDING
  }

  #[inline]
  pub(super) fn is_periodic(&self) -> bool {
    self.period != Period::Once
  }

  #[inline]
  pub(super) fn is_cancelled(&self) -> bool {
    self.state() == CANCELLED
  }

  fn transition(&self, to: u8) -> bool {
    if self
      .state
      .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return false;
    }
    let _lock = self.lock.lock();
    self.done.notify_all();
    true
  }

  /// Cancels the task without touching the queue.
  #[inline]
  pub(super) fn cancel(&self) -> bool {
    self.transition(CANCELLED)
  }

  /// Runs the job once. Returns `false` if it panicked, the task is failed then.
  pub(super) fn execute(&self) -> bool {
    let mut job = self.job.lock();
    let res = catch_unwind(AssertUnwindSafe(|| match &mut *job {
      Job::Once(f) => {
        if let Some(f) = f.take() {
          f()
        }
      }
      Job::Repeat(f) => f(),
    }));

    match res {
      Ok(()) => {
        if !self.is_periodic() {
          self.transition(COMPLETED);
        }
        true
      }
      Err(payload) => {
        #[cfg(feature = "tracing")]
        {
          let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
          tracing::warn!(seq = self.seq, periodic = self.is_periodic(), panic = msg, "scheduled task panicked");
        }
        #[cfg(not(feature = "tracing"))]
        drop(payload);
        self.transition(FAILED);
        false
      }
    }
  }

  /// Moves the trigger time to the next period and returns it.
  pub(super) fn set_next_run_time(&self) -> Instant {
    let mut time = self.time.lock();
    *time = match self.period {
      Period::FixedRate(period) => deadline_after(*time, period),
      Period::FixedDelay(delay) => deadline_after(Instant::now(), delay),
      Period::Once => *time,
    };
    *time
  }
}

/// A snapshot of a task queued for a given trigger time.
#[derive(Clone)]
pub(super) struct Entry {
  pub(super) task: Arc<TaskInner>,
  time: Instant,
}

impl Entry {
  /// Snapshots the current trigger time of `task`.
  #[inline]
  pub(super) fn new(task: Arc<TaskInner>) -> Self {
    let time = *task.time.lock();
    Self { task, time }
  }
}

impl Delayed for Entry {
  #[inline]
  fn delay(&self) -> Duration {
    self.time.saturating_duration_since(Instant::now())
  }
}

impl PartialEq for Entry {
  #[inline]
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.task, &other.task) && self.time == other.time
  }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
  #[inline]
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
    Some(self.cmp(other))
  }
}

impl Ord for Entry {
  #[inline]
  fn cmp(&self, other: &Self) -> CmpOrdering {
    self
      .time
      .cmp(&other.time)
      .then(self.task.seq.cmp(&other.task.seq))
  }
}

impl fmt::Debug for Entry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Entry")
      .field("seq", &self.task.seq)
      .field("time", &self.time)
      .finish()
  }
}

/// A handle to a task submitted to a [`ScheduledExecutor`](crate::ScheduledExecutor).
///
/// Dropping the handle does not cancel the task.
#[derive(Clone)]
pub struct ScheduledTask {
  pub(super) inner: Arc<TaskInner>,
}

impl ScheduledTask {
  /// Cancels the task. Returns `false` if it already completed, failed or was
  /// cancelled.
  ///
  /// A running task is not stopped, but a periodic one is not run again. If
  /// the executor has the remove-on-cancel policy set, the task is also
  /// removed from its queue.
  pub fn cancel(&self) -> bool {
    if !self.inner.cancel() {
      return false;
    }
    // pairs with the fence of the queue offer, a periodic entry put back
    // concurrently is either found here or removed by the worker
    fence(Ordering::SeqCst);

    if let Some(shared) = self.inner.executor.upgrade() {
      if shared.remove_on_cancel() {
        shared.remove(&Entry::new(self.inner.clone()));
      }
    }
    true
  }

  /// Returns `true` if the task was cancelled.
  #[inline]
  pub fn is_cancelled(&self) -> bool {
    self.inner.is_cancelled()
  }

  /// Returns `true` if the task will not run anymore: it completed, failed or
  /// was cancelled. A periodic task is never done unless it fails or is
  /// cancelled.
  #[inline]
  pub fn is_done(&self) -> bool {
    !self.inner.is_pending()
  }

  /// Returns `true` if the task panicked.
  #[inline]
  pub fn is_failed(&self) -> bool {
    self.inner.state() == FAILED
  }

  /// Returns `true` if the task repeats.
  #[inline]
  pub fn is_periodic(&self) -> bool {
    self.inner.is_periodic()
  }

  /// Returns the time left before the next trigger, zero if it is due.
  #[inline]
  pub fn delay(&self) -> Duration {
    self
      .inner
      .time
      .lock()
      .saturating_duration_since(Instant::now())
  }

  /// Blocks until the task is done.
  pub fn wait(&self) {
    let mut lock = self.inner.lock.lock();
    while self.inner.is_pending() {
      self.inner.done.wait(&mut lock);
    }
  }

  /// Blocks until the task is done or `timeout` elapses. Returns `true` if
  /// the task is done.
  pub fn wait_timeout(&self, timeout: Duration) -> bool {
    let deadline = deadline_after(Instant::now(), timeout);
    let mut lock = self.inner.lock.lock();
    while self.inner.is_pending() {
      if self.inner.done.wait_until(&mut lock, deadline).timed_out() {
        return !self.inner.is_pending();
      }
    }
    true
  }
}

impl fmt::Debug for ScheduledTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match self.inner.state() {
      PENDING => "pending",
      COMPLETED => "completed",
      CANCELLED => "cancelled",
      _ => "failed",
    };
    f.debug_struct("ScheduledTask")
      .field("seq", &self.inner.seq)
      .field("period", &self.inner.period)
      .field("state", &state)
      .finish()
  }
}
