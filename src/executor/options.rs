use crate::Options;

/// Options for a [`ScheduledExecutor`](crate::ScheduledExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
  name: Option<String>,
  continue_existing_periodic_tasks_after_shutdown: bool,
  execute_existing_delayed_tasks_after_shutdown: bool,
  remove_on_cancel: bool,
  queue: Options,
}

impl Default for ExecutorOptions {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl ExecutorOptions {
  /// Creates the default options: delayed tasks still run after shutdown,
  /// periodic ones do not, cancelled tasks stay queued until due.
  #[inline]
  pub const fn new() -> Self {
    Self {
      name: None,
      continue_existing_periodic_tasks_after_shutdown: false,
      execute_existing_delayed_tasks_after_shutdown: true,
      remove_on_cancel: false,
      queue: Options::new(),
    }
  }

  /// Sets the name of the worker thread.
  ///
  /// Default is `skq-scheduler-<n>`, `n` counting the executors created by
  /// the process.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::ExecutorOptions;
  ///
  /// let options = ExecutorOptions::new().with_name("timers");
  /// assert_eq!(options.name(), Some("timers"));
  /// ```
  #[inline]
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Sets whether periodic tasks keep running after
  /// [`shutdown`](crate::ScheduledExecutor::shutdown).
  ///
  /// Default is `false`.
  #[inline]
  pub const fn with_continue_existing_periodic_tasks_after_shutdown(mut self, value: bool) -> Self {
    self.continue_existing_periodic_tasks_after_shutdown = value;
    self
  }

  /// Sets whether delayed one-shot tasks still run after
  /// [`shutdown`](crate::ScheduledExecutor::shutdown).
  ///
  /// Default is `true`.
  #[inline]
  pub const fn with_execute_existing_delayed_tasks_after_shutdown(mut self, value: bool) -> Self {
    self.execute_existing_delayed_tasks_after_shutdown = value;
    self
  }

  /// Sets whether cancelled tasks are removed from the queue right away.
  ///
  /// Default is `false`, a cancelled task is dropped when it comes due.
  #[inline]
  pub const fn with_remove_on_cancel(mut self, value: bool) -> Self {
    self.remove_on_cancel = value;
    self
  }

  /// Sets the options of the delay queue feeding the worker.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::{ExecutorOptions, Options, SyncKind};
  ///
  /// let options = ExecutorOptions::new().with_queue_options(Options::new().with_sync(SyncKind::Condvar));
  /// assert_eq!(options.queue_options().sync(), SyncKind::Condvar);
  /// ```
  #[inline]
  pub const fn with_queue_options(mut self, queue: Options) -> Self {
    self.queue = queue;
    self
  }

  /// Returns the worker thread name, if set.
  #[inline]
  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// Returns whether periodic tasks keep running after shutdown.
  #[inline]
  pub const fn continue_existing_periodic_tasks_after_shutdown(&self) -> bool {
    self.continue_existing_periodic_tasks_after_shutdown
  }

  /// Returns whether delayed one-shot tasks still run after shutdown.
  #[inline]
  pub const fn execute_existing_delayed_tasks_after_shutdown(&self) -> bool {
    self.execute_existing_delayed_tasks_after_shutdown
  }

  /// Returns whether cancelled tasks are removed from the queue right away.
  #[inline]
  pub const fn remove_on_cancel(&self) -> bool {
    self.remove_on_cancel
  }

  /// Returns the options of the delay queue.
  #[inline]
  pub const fn queue_options(&self) -> Options {
    self.queue
  }
}
