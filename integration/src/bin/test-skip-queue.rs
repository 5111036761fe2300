use integration::{join_all, spawn_producers};
use rand::prelude::*;
use skq::*;
use std::sync::Arc;

fn main() {
  {
    const N: usize = 1000;
    let q = Arc::new(SkipQueue::new());
    let handles = {
      let q = q.clone();
      spawn_producers(N, move |i| {
        q.push(i);
      })
    };
    join_all(handles);
    assert_eq!(q.len(), N);
    for i in 0..N {
      assert_eq!(q.pop(), Some(i), "broken: {i}");
    }
    assert!(q.is_empty());
  }

  {
    const PRODUCERS: usize = 8;
    const N: usize = 10_000;
    let q = Arc::new(SkipQueue::<u64>::new());
    let handles = {
      let q = q.clone();
      spawn_producers(PRODUCERS, move |_| {
        let mut rng = rand::rng();
        for _ in 0..N {
          let k = rng.random_range(0..1_000);
          q.push(k);
          if rng.random_bool(0.3) {
            q.remove(&k);
          }
        }
      })
    };
    join_all(handles);

    let mut prev = None;
    let mut popped = 0;
    while let Some(k) = q.pop() {
      if let Some(p) = prev {
        assert!(p <= k, "out of order: {p} > {k}");
      }
      prev = Some(k);
      popped += 1;
    }
    assert!(popped <= PRODUCERS * N);
  }
}
