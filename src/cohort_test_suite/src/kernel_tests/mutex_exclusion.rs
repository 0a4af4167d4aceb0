//! Two tasks repeatedly compete for a mutex with non-blocking lock attempts.
//! At most one of them may be inside the critical section at any time, and a
//! failed attempt must not block.
use assert_matches::assert_matches;
use cohort_core::{kernel::TryLockMutexError, time::Duration};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::{spawn, Driver, SupportedSystem};

const ITERATIONS: usize = 200;

struct Shared {
    inside: AtomicUsize,
    entered: AtomicUsize,
    finished: AtomicUsize,
}

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let mutex = kernel.raw_mutex_create().unwrap();
    let shared = Arc::new(Shared {
        inside: AtomicUsize::new(0),
        entered: AtomicUsize::new(0),
        finished: AtomicUsize::new(0),
    });

    for name in ["task0", "task1"] {
        let shared = Arc::clone(&shared);
        let driver = Arc::clone(&driver);
        spawn(kernel, name, move |kernel| {
            for _ in 0..ITERATIONS {
                match kernel.raw_mutex_try_lock(mutex, Duration::ZERO) {
                    Ok(()) => {
                        assert_eq!(shared.inside.fetch_add(1, Ordering::SeqCst), 0);
                        shared.entered.fetch_add(1, Ordering::SeqCst);

                        // Locking it again would deadlock
                        assert_matches!(
                            kernel.raw_mutex_try_lock(mutex, Duration::ZERO),
                            Err(TryLockMutexError::WouldDeadlock)
                        );
                        std::thread::yield_now();

                        assert_eq!(shared.inside.fetch_sub(1, Ordering::SeqCst), 1);
                        kernel.raw_mutex_unlock(mutex).unwrap();
                    }
                    Err(TryLockMutexError::Timeout) => {}
                    Err(e) => panic!("unexpected error: {e:?}"),
                }
                kernel.raw_sleep(Duration::ZERO).unwrap();
            }

            if shared.finished.fetch_add(1, Ordering::SeqCst) == 1 {
                log::debug!(
                    "entered the critical section {} times",
                    shared.entered.load(Ordering::SeqCst)
                );
                assert!(shared.entered.load(Ordering::SeqCst) > 0);
                assert_eq!(kernel.raw_mutex_is_locked(mutex), Ok(false));
                driver.success();
            }
        });
    }
}
