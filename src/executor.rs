use core::{
  sync::atomic::{fence, AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering},
  time::Duration,
};
use std::{
  io,
  sync::{Arc, Weak},
  thread::{self, JoinHandle},
  time::Instant,
};

use parking_lot::{Condvar, Mutex};

use super::{delay::deadline_after, DelayQueue, Rejected, SkipQueue, Synchronizer};

mod options;
pub use options::ExecutorOptions;

mod task;
pub use task::ScheduledTask;
use task::{Entry, Period, TaskInner};


const RUNNING: u8 = 0;
const SHUTDOWN: u8 = 1;
const STOP: u8 = 2;
const TERMINATED: u8 = 3;

static NAME_SUFFIX: AtomicUsize = AtomicUsize::new(0);

/// State shared by the executor handle, its worker and the task handles.
struct Shared {
  name: String,
  queue: DelayQueue<Entry>,
  state: AtomicU8,
  /// Serializes run state transitions.
  main_lock: Mutex<()>,
  continue_periodic: AtomicBool,
  execute_delayed: AtomicBool,
  remove_on_cancel: AtomicBool,
  sequencer: AtomicU64,
  terminated: Mutex<bool>,
  on_terminate: Condvar,
}

impl Shared {
  #[inline]
  fn state(&self) -> u8 {
    self.state.load(Ordering::Acquire)
  }

  #[inline]
  fn remove_on_cancel(&self) -> bool {
    self.remove_on_cancel.load(Ordering::Acquire)
  }

  #[inline]
  fn is_running_or_shutdown(&self, shutdown_ok: bool) -> bool {
    match self.state() {
      RUNNING => true,
      SHUTDOWN => shutdown_ok,
      _ => false,
    }
  }

  #[inline]
  fn can_run_in_current_state(&self, periodic: bool) -> bool {
    self.is_running_or_shutdown(if periodic {
      self.continue_periodic.load(Ordering::Acquire)
    } else {
      self.execute_delayed.load(Ordering::Acquire)
    })
  }

  /// Removes a queued entry. While draining after shutdown, the worker only
  /// waits as long as the queue is not empty, so it is woken to check again.
  fn remove(&self, entry: &Entry) -> bool {
    let removed = self.queue.remove(entry).is_some();
    if removed && self.state() == SHUTDOWN {
      self.queue.interrupt();
    }
    removed
  }

  fn run(&self, entry: Entry) {
    let task = &entry.task;
    let periodic = task.is_periodic();
    if !self.can_run_in_current_state(periodic) {
      task.cancel();
      return;
    }
    if !task.is_pending() {
      return;
    }

    if task.execute() && periodic && task.is_pending() {
      task.set_next_run_time();
      self.re_execute_periodic(Entry::new(entry.task.clone()));
    }
  }

  fn re_execute_periodic(&self, entry: Entry) {
    if !self.can_run_in_current_state(true) {
      entry.task.cancel();
      return;
    }

    self.queue.offer(entry.clone());
    // a shutdown or a cancel may have looked at the queue before the entry
    // was back in it
    let cancelled = entry.task.is_cancelled() && self.remove_on_cancel();
    if (cancelled || !self.can_run_in_current_state(true))
      && self.queue.remove(&entry).is_some()
    {
      entry.task.cancel();
    }
  }

  /// Drops the queued tasks the shutdown policies do not keep.
  fn on_shutdown(&self) {
    let keep_delayed = self.execute_delayed.load(Ordering::Acquire);
    let keep_periodic = self.continue_periodic.load(Ordering::Acquire);

    if !keep_delayed && !keep_periodic {
      while let Some(entry) = self.queue.pop_any() {
        entry.task.cancel();
      }
    } else {
      for entry in self.queue.queue().iter() {
        let task = &entry.task;
        let keep = if task.is_periodic() {
          keep_periodic
        } else {
          keep_delayed
        };
        if (!keep || task.is_cancelled()) && self.queue.remove(&entry).is_some() {
          task.cancel();
        }
      }
    }
  }

  fn work(&self) {
    #[cfg(feature = "tracing")]
    tracing::debug!(executor = %self.name, "scheduled executor started");

    while self.state() == RUNNING {
      match self.queue.take() {
        Ok(entry) => self.run(entry),
        Err(_) if self.state() != RUNNING => break,
        Err(_) => {}
      }
    }

    // pairs with the fence submitters issue between offering and checking
    // the state, a task offered after the last look at the queue is backed out
    fence(Ordering::SeqCst);
    if self.state() == SHUTDOWN {
      self.on_shutdown();
      while self.state() == SHUTDOWN && !self.queue.is_empty() {
        // interrupts only ask to check the state and the queue again
        if let Ok(entry) = self.queue.take() {
          self.run(entry);
        }
      }
    }
  }

  fn terminate(&self) {
    {
      let _lock = self.main_lock.lock();
      self.state.store(TERMINATED, Ordering::SeqCst);
    }

    let mut terminated = self.terminated.lock();
    *terminated = true;
    self.on_terminate.notify_all();

    #[cfg(feature = "tracing")]
    tracing::debug!(executor = %self.name, "scheduled executor terminated");
  }
}

/// Marks the executor terminated when the worker exits, even by unwinding.
struct Terminate<'a>(&'a Shared);

impl Drop for Terminate<'_> {
  fn drop(&mut self) {
    self.0.terminate();
  }
}

/// An executor running delayed and periodic tasks on a single dedicated
/// thread.
///
/// Tasks run inline on the worker thread, one at a time, so they must be
/// brief. Tasks due at the same instant run in submission order. A task
/// which panics is marked failed, and a periodic one is not run again; the
/// worker keeps going.
///
/// The run state only moves forward: running, shut down (no new task is
/// accepted, queued ones may still run depending on the policies), stopped
/// (nothing runs anymore) and terminated (the worker exited).
///
/// Dropping the executor stops it and joins the worker.
///
/// # Example
///
/// ```
/// use std::{sync::mpsc, time::Duration};
///
/// use skq::ScheduledExecutor;
///
/// let executor = ScheduledExecutor::new().unwrap();
/// let (tx, rx) = mpsc::channel();
/// executor
///   .schedule(Duration::from_millis(10), move || tx.send("done").unwrap())
///   .unwrap();
/// assert_eq!(rx.recv().unwrap(), "done");
///
/// executor.shutdown();
/// assert!(executor.await_termination(Duration::from_secs(5)));
/// ```
pub struct ScheduledExecutor {
  shared: Arc<Shared>,
  worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledExecutor {
  /// Creates an executor with the default options and starts its worker.
  #[inline]
  pub fn new() -> io::Result<Self> {
    Self::with_options(ExecutorOptions::new())
  }

  /// Creates an executor and starts its worker.
  ///
  /// Fails if the worker thread cannot be spawned.
  pub fn with_options(options: ExecutorOptions) -> io::Result<Self> {
    let name = match options.name() {
      Some(name) => name.to_string(),
      None => format!(
        "skq-scheduler-{}",
        NAME_SUFFIX.fetch_add(1, Ordering::Relaxed) + 1
      ),
    };

    let shared = Arc::new(Shared {
      name: name.clone(),
      queue: DelayQueue::with_parts(
        SkipQueue::new(),
        Synchronizer::new(&options.queue_options()),
      ),
      state: AtomicU8::new(RUNNING),
      main_lock: Mutex::new(()),
      continue_periodic: AtomicBool::new(options.continue_existing_periodic_tasks_after_shutdown()),
      execute_delayed: AtomicBool::new(options.execute_existing_delayed_tasks_after_shutdown()),
      remove_on_cancel: AtomicBool::new(options.remove_on_cancel()),
      sequencer: AtomicU64::new(0),
      terminated: Mutex::new(false),
      on_terminate: Condvar::new(),
    });

    let worker = {
      let shared = shared.clone();
      thread::Builder::new().name(name).spawn(move || {
        let _terminate = Terminate(&shared);
        shared.work();
      })?
    };

    Ok(Self {
      shared,
      worker: Mutex::new(Some(worker)),
    })
  }

  /// Returns the name of the worker thread.
  #[inline]
  pub fn name(&self) -> &str {
    &self.shared.name
  }

  #[inline]
  fn next_seq(&self) -> u64 {
    self.shared.sequencer.fetch_add(1, Ordering::Relaxed)
  }

  #[inline]
  fn weak(&self) -> Weak<Shared> {
    Arc::downgrade(&self.shared)
  }

  fn reject(&self) -> Rejected {
    #[cfg(feature = "tracing")]
    tracing::debug!(executor = %self.shared.name, "task rejected, executor is shut down");
    Rejected::new(self.shared.name.as_str())
  }

  fn delayed_execute(&self, task: TaskInner) -> Result<ScheduledTask, Rejected> {
    if self.is_shutdown() {
      return Err(self.reject());
    }
    self.enqueue(Arc::new(task))
  }

  /// Queues a task which passed the shutdown check. A shutdown landing in
  /// between may let the worker exit without seeing the task, so it is taken
  /// back out and rejected unless the worker already got it.
  fn enqueue(&self, inner: Arc<TaskInner>) -> Result<ScheduledTask, Rejected> {
    let entry = Entry::new(inner.clone());
    self.shared.queue.offer(entry.clone());
    fence(Ordering::SeqCst);
    if self.shared.state.load(Ordering::SeqCst) >= SHUTDOWN && self.shared.remove(&entry) {
      inner.cancel();
      return Err(self.reject());
    }
    Ok(ScheduledTask { inner })
  }

  /// Runs `f` once after `delay`.
  ///
  /// Returns [`Rejected`] if the executor is shut down.
  pub fn schedule<F>(&self, delay: Duration, f: F) -> Result<ScheduledTask, Rejected>
  where
    F: FnOnce() + Send + 'static,
  {
    let time = deadline_after(Instant::now(), delay);
    self.delayed_execute(TaskInner::once(f, time, self.next_seq(), self.weak()))
  }

  /// Runs `f` as soon as possible.
  #[inline]
  pub fn execute<F>(&self, f: F) -> Result<ScheduledTask, Rejected>
  where
    F: FnOnce() + Send + 'static,
  {
    self.schedule(Duration::ZERO, f)
  }

  /// Runs `f` after `initial_delay`, then every `period`, measured between
  /// trigger times. A run taking longer than `period` makes the next ones
  /// run late, back to back, until the schedule is caught up.
  ///
  /// # Panics
  /// - If `period` is zero.
  pub fn schedule_at_fixed_rate<F>(
    &self,
    initial_delay: Duration,
    period: Duration,
    f: F,
  ) -> Result<ScheduledTask, Rejected>
  where
    F: FnMut() + Send + 'static,
  {
    assert!(!period.is_zero(), "period must be positive");
    let time = deadline_after(Instant::now(), initial_delay);
    self.delayed_execute(TaskInner::periodic(
      f,
      Period::FixedRate(period),
      time,
      self.next_seq(),
      self.weak(),
    ))
  }

  /// Runs `f` after `initial_delay`, then again `delay` after each run
  /// completes.
  ///
  /// # Panics
  /// - If `delay` is zero.
  pub fn schedule_with_fixed_delay<F>(
    &self,
    initial_delay: Duration,
    delay: Duration,
    f: F,
  ) -> Result<ScheduledTask, Rejected>
  where
    F: FnMut() + Send + 'static,
  {
    assert!(!delay.is_zero(), "delay must be positive");
    let time = deadline_after(Instant::now(), initial_delay);
    self.delayed_execute(TaskInner::periodic(
      f,
      Period::FixedDelay(delay),
      time,
      self.next_seq(),
      self.weak(),
    ))
  }

  /// Starts an orderly shutdown: no new task is accepted, queued tasks run or
  /// are dropped according to the shutdown policies.
  pub fn shutdown(&self) {
    {
      let _lock = self.shared.main_lock.lock();
      if self.shared.state() < SHUTDOWN {
        self.shared.state.store(SHUTDOWN, Ordering::SeqCst);
        #[cfg(feature = "tracing")]
        tracing::debug!(executor = %self.shared.name, "scheduled executor shutting down");
      }
    }
    self.shared.queue.interrupt();
  }

  /// Stops the executor: no queued task runs anymore. Returns the tasks which
  /// were still queued, they are neither run nor cancelled.
  ///
  /// A task running when this is called completes.
  pub fn shutdown_now(&self) -> Vec<ScheduledTask> {
    let _lock = self.shared.main_lock.lock();
    if self.shared.state() < STOP {
      self.shared.state.store(STOP, Ordering::SeqCst);
      #[cfg(feature = "tracing")]
      tracing::debug!(executor = %self.shared.name, "scheduled executor stopping");
    }
    self.shared.queue.interrupt();

    let mut tasks = Vec::new();
    while let Some(entry) = self.shared.queue.pop_any() {
      tasks.push(ScheduledTask { inner: entry.task });
    }
    tasks
  }

  /// Blocks until the worker exited after a shutdown, or `timeout` elapses.
  /// Returns `true` if the executor terminated.
  pub fn await_termination(&self, timeout: Duration) -> bool {
    let deadline = deadline_after(Instant::now(), timeout);
    let mut terminated = self.shared.terminated.lock();
    while !*terminated {
      if self
        .shared
        .on_terminate
        .wait_until(&mut terminated, deadline)
        .timed_out()
      {
        return *terminated;
      }
    }
    true
  }

  /// Returns `true` once the executor was shut down.
  #[inline]
  pub fn is_shutdown(&self) -> bool {
    self.shared.state() >= SHUTDOWN
  }

  /// Returns `true` once the worker exited.
  #[inline]
  pub fn is_terminated(&self) -> bool {
    self.shared.state() == TERMINATED
  }

  /// Returns the number of queued tasks, cancelled ones included.
  #[inline]
  pub fn queue_len(&self) -> usize {
    self.shared.queue.len()
  }

  /// Returns whether periodic tasks keep running after shutdown.
  #[inline]
  pub fn continue_existing_periodic_tasks_after_shutdown(&self) -> bool {
    self.shared.continue_periodic.load(Ordering::Acquire)
  }

  /// Sets whether periodic tasks keep running after shutdown. Turning it off
  /// after shutdown drops the queued periodic tasks.
  pub fn set_continue_existing_periodic_tasks_after_shutdown(&self, value: bool) {
    self.shared.continue_periodic.store(value, Ordering::Release);
    if !value && self.is_shutdown() {
      self.purge_after_shutdown();
    }
  }

  /// Returns whether delayed one-shot tasks still run after shutdown.
  #[inline]
  pub fn execute_existing_delayed_tasks_after_shutdown(&self) -> bool {
    self.shared.execute_delayed.load(Ordering::Acquire)
  }

  /// Sets whether delayed one-shot tasks still run after shutdown. Turning it
  /// off after shutdown drops the queued one-shot tasks.
  pub fn set_execute_existing_delayed_tasks_after_shutdown(&self, value: bool) {
    self.shared.execute_delayed.store(value, Ordering::Release);
    if !value && self.is_shutdown() {
      self.purge_after_shutdown();
    }
  }

  /// Returns whether cancelled tasks are removed from the queue right away.
  #[inline]
  pub fn remove_on_cancel(&self) -> bool {
    self.shared.remove_on_cancel()
  }

  /// Sets whether cancelled tasks are removed from the queue right away.
  #[inline]
  pub fn set_remove_on_cancel(&self, value: bool) {
    self.shared.remove_on_cancel.store(value, Ordering::Release);
  }

  fn purge_after_shutdown(&self) {
    self.shared.on_shutdown();
    // the worker may be waiting on a task which is gone now
    self.shared.queue.interrupt();
  }
}

impl Drop for ScheduledExecutor {
  fn drop(&mut self) {
    self.shutdown_now();
    if let Some(worker) = self.worker.get_mut().take() {
      // a task dropping the last handle cannot join its own thread
      if worker.thread().id() != thread::current().id() {
        let _ = worker.join();
      }
    }
  }
}

impl core::fmt::Debug for ScheduledExecutor {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    let state = match self.shared.state() {
      RUNNING => "running",
      SHUTDOWN => "shutdown",
      STOP => "stop",
      _ => "terminated",
    };
    f.debug_struct("ScheduledExecutor")
      .field("name", &self.shared.name)
      .field("state", &state)
      .field("queued", &self.queue_len())
      .finish()
  }
}
