/// Returned when a blocked consumer is woken by an interrupt rather than by
/// an element becoming available or a timeout elapsing.
///
/// Rust threads cannot be interrupted from the outside, so every
/// [`OwnedSynchronizer`](crate::OwnedSynchronizer) carries its own pending
/// interrupt flag which is raised by `interrupt` and consumed by the next wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Interrupted;

impl core::fmt::Display for Interrupted {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "wait was interrupted")
  }
}

impl std::error::Error for Interrupted {}

/// Returned when a task is submitted to a [`ScheduledExecutor`](crate::ScheduledExecutor)
/// which has already been shut down.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rejected {
  executor: String,
}

impl Rejected {
  #[inline]
  pub(crate) fn new(executor: impl Into<String>) -> Self {
    Self {
      executor: executor.into(),
    }
  }

  /// Returns the name of the executor which rejected the task.
  #[inline]
  pub fn executor(&self) -> &str {
    &self.executor
  }
}

impl core::fmt::Display for Rejected {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "task rejected from {}: executor is shut down", self.executor)
  }
}

impl std::error::Error for Rejected {}
