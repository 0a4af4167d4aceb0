//! A task waits for a mutex to be unlocked with timeout.
//!
//! 1. (`seq`: 0 → 1) `task0` locks a mutex and creates `task1`.
//! 2. (`seq`: 1 → 2) `task1` tries to lock the mutex for 30 ticks, which
//!    times out, and then starts waiting indefinitely.
//! 3. (`seq`: 2 → 3) `task0` wakes up from a 100-tick sleep and unlocks the
//!    mutex.
//! 4. (`seq`: 3 → 4) `task1` acquires the mutex.
use assert_matches::assert_matches;
use cohort_core::{kernel::TryLockMutexError, time::Duration};
use std::sync::Arc;

use super::{spawn, Driver, SupportedSystem};
use crate::utils::SeqTracker;

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let mutex = kernel.raw_mutex_create().unwrap();
    let seq = Arc::new(SeqTracker::new());

    spawn(kernel, "task0", move |kernel| {
        seq.expect_and_replace(0, 1);
        kernel.raw_mutex_try_lock(mutex, Duration::ZERO).unwrap();

        let seq2 = Arc::clone(&seq);
        spawn(&kernel, "task1", move |kernel| {
            seq2.expect_and_replace(1, 2);
            let start = kernel.raw_tick_count();
            assert_matches!(
                kernel.raw_mutex_try_lock(mutex, Duration::from_ticks(30)),
                Err(TryLockMutexError::Timeout)
            );
            assert!(kernel.raw_tick_count().duration_since(start) >= Duration::from_ticks(30));

            kernel.raw_mutex_try_lock(mutex, Duration::MAX).unwrap();
            seq2.expect_and_replace(3, 4);
            kernel.raw_mutex_unlock(mutex).unwrap();
            driver.success();
        });

        kernel.raw_sleep(Duration::from_ticks(100)).unwrap();
        seq.expect_and_replace(2, 3);
        kernel.raw_mutex_unlock(mutex).unwrap();
    });
}
