/// The block/wake backend used by the consumer side of a queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SyncKind {
  /// CAS installed waiter slot with thread park/unpark, see [`ParkSynchronizer`](crate::ParkSynchronizer).
  #[default]
  Park,
  /// Mutex plus condition variable, see [`CondvarSynchronizer`](crate::CondvarSynchronizer).
  Condvar,
}

/// Options for the blocking queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Options {
  sync: SyncKind,
  spins: u32,
}

impl Default for Options {
  #[inline]
  fn default() -> Options {
    Options::new()
  }
}

impl Options {
  /// Creates a new set of options with the default values.
  #[inline]
  pub const fn new() -> Options {
    Options {
      sync: SyncKind::Park,
      spins: 0,
    }
  }

  /// Sets the synchronizer backend used to block the consumer.
  ///
  /// Default is [`SyncKind::Park`].
  ///
  /// # Example
  ///
  /// ```
  /// use skq::{Options, SyncKind};
  ///
  /// let options = Options::new().with_sync(SyncKind::Condvar);
  /// ```
  #[inline]
  pub const fn with_sync(mut self, sync: SyncKind) -> Options {
    self.sync = sync;
    self
  }

  /// Sets how many times the consumer spins on the wake flag before parking.
  ///
  /// Only used by [`SyncKind::Park`]. Default is `0`, spinning only pays off
  /// when producers and the consumer run on different cores and signals are
  /// frequent.
  ///
  /// # Example
  ///
  /// ```
  /// use skq::Options;
  ///
  /// let options = Options::new().with_spins(64);
  /// assert_eq!(options.spins(), 64);
  /// ```
  #[inline]
  pub const fn with_spins(mut self, spins: u32) -> Options {
    self.spins = spins;
    self
  }

  /// Returns the synchronizer backend.
  #[inline]
  pub const fn sync(&self) -> SyncKind {
    self.sync
  }

  /// Returns the spin count used before parking.
  #[inline]
  pub const fn spins(&self) -> u32 {
    self.spins
  }
}
