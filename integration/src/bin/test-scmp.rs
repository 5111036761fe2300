use integration::{join_all, spawn_producers};
use skq::*;
use std::{sync::Arc, time::Duration};

fn run(kind: SyncKind) {
  const PRODUCERS: usize = 8;
  const N: usize = 5_000;

  let q = Arc::new(ScmpQueue::<usize>::with_options(
    Options::new().with_sync(kind),
  ));
  let handles = {
    let q = q.clone();
    spawn_producers(PRODUCERS, move |p| {
      for i in 0..N {
        q.offer(p * N + i);
      }
    })
  };

  let mut seen = vec![false; PRODUCERS * N];
  for _ in 0..PRODUCERS * N {
    let v = q
      .poll_timeout(Duration::from_secs(10))
      .unwrap()
      .unwrap_or_else(|| panic!("lost wakeup with {kind:?}"));
    assert!(!seen[v], "duplicate: {v}");
    seen[v] = true;
  }
  join_all(handles);
  assert!(q.is_empty());
}

fn main() {
  run(SyncKind::Park);
  run(SyncKind::Condvar);
}
