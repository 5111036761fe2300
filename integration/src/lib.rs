use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread::{self, JoinHandle},
};

/// Only used for testing
pub fn spawn_producers<F>(n: usize, f: F) -> Vec<JoinHandle<()>>
where
  F: Fn(usize) + Send + Sync + 'static,
{
  let f = Arc::new(f);
  (0..n)
    .map(|i| {
      let f = f.clone();
      thread::spawn(move || f(i))
    })
    .collect()
}

/// Only used for testing
pub fn join_all(handles: Vec<JoinHandle<()>>) {
  for h in handles {
    h.join().unwrap();
  }
}

/// Only used for testing
#[derive(Clone, Default)]
pub struct Stop(Arc<AtomicBool>);

impl Stop {
  /// Only used for testing
  pub fn stop(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  /// Only used for testing
  pub fn is_stopped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}
