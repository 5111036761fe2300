use super::*;

use std::{sync::Arc, thread};

const SHORT: Duration = Duration::from_millis(50);

fn backends() -> [Synchronizer; 3] {
  [
    Synchronizer::new(&Options::new()),
    Synchronizer::new(&Options::new().with_spins(128)),
    Synchronizer::new(&Options::new().with_sync(SyncKind::Condvar)),
  ]
}

#[test]
fn test_should_signal_follows_registration() {
  for sync in backends() {
    assert!(!sync.should_signal());
    {
      let _reg = Registration::new(&sync);
      assert!(sync.should_signal());
    }
    assert!(!sync.should_signal());
  }
}

#[test]
fn test_signal_without_waiter_is_noop() {
  for sync in backends() {
    sync.signal();
    let reg = Registration::new(&sync);
    // the signal was not recorded, so the wait times out
    assert_eq!(reg.wait_timeout(SHORT), Ok(None));
  }
}

#[test]
fn test_signal_before_wait() {
  for sync in backends() {
    let reg = Registration::new(&sync);
    reg.signal();
    assert_eq!(reg.wait(), Ok(()));

    reg.signal();
    let remaining = reg.wait_timeout(Duration::from_secs(10)).unwrap();
    assert!(remaining.is_some());
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_wait_timeout_elapses() {
  for sync in backends() {
    let reg = Registration::new(&sync);
    let start = Instant::now();
    assert_eq!(reg.wait_timeout(SHORT), Ok(None));
    assert!(start.elapsed() >= SHORT);

    let deadline = Instant::now() + SHORT;
    assert_eq!(reg.wait_deadline(deadline), Ok(false));
    assert!(Instant::now() >= deadline);
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_signal_wakes_waiter() {
  for sync in backends() {
    let sync = Arc::new(sync);
    let reg = Registration::new(&sync);

    let signaller = {
      let sync = sync.clone();
      thread::spawn(move || {
        while !sync.should_signal() {
          thread::yield_now();
        }
        thread::sleep(SHORT);
        sync.signal();
      })
    };

    let remaining = reg.wait_timeout(Duration::from_secs(10)).unwrap();
    assert!(remaining.is_some());
    signaller.join().unwrap();
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_interrupt() {
  for sync in backends() {
    let sync = Arc::new(sync);

    // a pending interrupt is consumed by the next wait
    sync.interrupt();
    {
      let reg = Registration::new(&sync);
      assert_eq!(reg.wait(), Err(Interrupted));
      assert_eq!(reg.wait_timeout(SHORT), Ok(None));
    }

    let reg = Registration::new(&sync);
    let interrupter = {
      let sync = sync.clone();
      thread::spawn(move || {
        thread::sleep(SHORT);
        sync.interrupt();
      })
    };
    assert_eq!(reg.wait(), Err(Interrupted));
    interrupter.join().unwrap();
  }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_rejected_register_keeps_pending_signal() {
  for sync in backends() {
    let sync = Arc::new(sync);
    let reg = Registration::new(&sync);
    reg.signal();

    let other = {
      let sync = sync.clone();
      thread::spawn(move || sync.register())
    };
    assert!(other.join().is_err());

    // the owner still sees the signal sent before the failed registration
    let remaining = reg.wait_timeout(Duration::from_secs(10)).unwrap();
    assert!(remaining.is_some());
  }
}

#[test]
#[should_panic(expected = "already has a registered waiter")]
fn test_park_double_register() {
  let sync = ParkSynchronizer::new();
  sync.register();
  sync.register();
}

#[test]
#[should_panic(expected = "already has a registered waiter")]
fn test_condvar_double_register() {
  let sync = CondvarSynchronizer::new();
  sync.register();
  sync.register();
}

#[test]
#[should_panic(expected = "not the registered waiter")]
fn test_park_unregister_without_register() {
  ParkSynchronizer::new().unregister();
}

#[test]
#[should_panic(expected = "not the registered waiter")]
fn test_condvar_unregister_from_other_thread() {
  let sync = Arc::new(CondvarSynchronizer::new());
  sync.register();
  let other = sync.clone();
  let res = thread::spawn(move || other.unregister()).join();
  // propagate the panic of the other thread with its message
  if let Err(e) = res {
    std::panic::resume_unwind(e);
  }
}

#[test]
#[should_panic(expected = "not its registered waiter")]
fn test_wait_without_register() {
  let _ = ParkSynchronizer::new().wait();
}

#[test]
fn test_kind() {
  let [park, spin, condvar] = backends();
  assert_eq!(park.kind(), SyncKind::Park);
  assert_eq!(spin.kind(), SyncKind::Park);
  assert_eq!(condvar.kind(), SyncKind::Condvar);
}
