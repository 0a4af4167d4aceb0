//! Blocking with timeouts.
use cohort_core::{kernel::WaitTimeoutError, time::Duration};
use spin::Mutex as SpinMutex;
use std::{
    thread::{self, Thread},
    time::Instant,
};

use crate::StdKernel;

/// A set of threads waiting for some condition of an object to change.
///
/// A thread registers itself before re-checking the condition, so a wake-up
/// issued in between is never lost: it leaves an unpark token, and the
/// following `park` returns immediately.
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    waiters: SpinMutex<Vec<Thread>>,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn register(&self) {
        let current = thread::current();
        let mut waiters = self.waiters.lock();
        if !waiters.iter().any(|t| t.id() == current.id()) {
            waiters.push(current);
        }
    }

    /// Wake up every waiting thread. They re-check their conditions.
    pub(crate) fn wake_all(&self) {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        for waiter in waiters {
            waiter.unpark();
        }
    }
}

impl StdKernel {
    /// Call `poll` until it returns `Some(_)`, blocking on `wait_queue` for at
    /// most `timeout` in the meantime.
    ///
    /// `poll` is called with no lock held, so it must perform its own
    /// check-and-update atomically.
    pub(crate) fn wait_until<T>(
        &self,
        wait_queue: &WaitQueue,
        timeout: Duration,
        mut poll: impl FnMut() -> Option<T>,
    ) -> Result<T, WaitTimeoutError> {
        if timeout.is_zero() {
            return poll().ok_or(WaitTimeoutError::Timeout);
        }
        // Blocking calls are rejected even if they wouldn't have to block
        if self.is_timer_service_context() {
            return Err(WaitTimeoutError::BadContext);
        }
        if let Some(x) = poll() {
            return Ok(x);
        }

        let deadline = self.deadline_after(timeout);
        loop {
            self.checkpoint();

            wait_queue.register();
            if let Some(x) = poll() {
                return Ok(x);
            }

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(WaitTimeoutError::Timeout);
                }
                thread::park_timeout(deadline - now);
            } else {
                thread::park();
            }
        }
    }

    /// Block the current thread until the deadline corresponding to
    /// `duration` passes, applying pending suspensions and deletions to the
    /// current task on every wake-up.
    pub(crate) fn sleep_for(&self, duration: Duration) {
        let deadline = self.deadline_after(duration);
        loop {
            self.checkpoint();

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return;
                }
                thread::park_timeout(deadline - now);
            } else {
                thread::park();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PortConfig, ThreadRole, THREAD_ROLE};
    use assert_matches::assert_matches;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration as WallDuration,
    };

    fn kernel() -> StdKernel {
        crate::init_test_logger();
        StdKernel::new(PortConfig::DEFAULT.with_tick(WallDuration::from_millis(1)))
    }

    #[test]
    fn immediate_success() {
        let kernel = kernel();
        let queue = WaitQueue::new();
        assert_eq!(kernel.wait_until(&queue, Duration::ZERO, || Some(42)), Ok(42));
    }

    #[test]
    fn zero_timeout_fails_without_blocking() {
        let kernel = kernel();
        let queue = WaitQueue::new();
        let start = Instant::now();
        assert_matches!(
            kernel.wait_until(&queue, Duration::ZERO, || None::<()>),
            Err(WaitTimeoutError::Timeout)
        );
        assert!(start.elapsed() < WallDuration::from_millis(500));
    }

    #[test]
    fn times_out() {
        let kernel = kernel();
        let queue = WaitQueue::new();
        let start = Instant::now();
        assert_matches!(
            kernel.wait_until(&queue, Duration::from_ticks(20), || None::<()>),
            Err(WaitTimeoutError::Timeout)
        );
        assert!(start.elapsed() >= WallDuration::from_millis(20));
    }

    #[test]
    fn timer_service_cannot_block() {
        let kernel = kernel();
        let queue = WaitQueue::new();
        let key = kernel.key();
        let kernel2 = kernel.clone();
        let results = std::thread::spawn(move || {
            THREAD_ROLE.with(|role| role.set(ThreadRole::TimerService { kernel: key }));
            (
                kernel2.wait_until(&queue, Duration::ZERO, || Some(1)),
                kernel2.wait_until(&queue, Duration::from_ticks(1), || Some(2)),
                kernel2.wait_until(&queue, Duration::MAX, || Some(3)),
            )
        })
        .join()
        .unwrap();
        assert_eq!(
            results,
            (
                Ok(1),
                Err(WaitTimeoutError::BadContext),
                Err(WaitTimeoutError::BadContext)
            )
        );
    }

    #[test]
    fn woken_by_another_thread() {
        let kernel = kernel();
        let queue = Arc::new(WaitQueue::new());
        let flag = Arc::new(AtomicBool::new(false));

        let waker = {
            let (queue, flag) = (Arc::clone(&queue), Arc::clone(&flag));
            std::thread::spawn(move || {
                std::thread::sleep(WallDuration::from_millis(20));
                flag.store(true, Ordering::SeqCst);
                queue.wake_all();
            })
        };

        let result = kernel.wait_until(&queue, Duration::MAX, || {
            flag.load(Ordering::SeqCst).then_some(())
        });
        assert_eq!(result, Ok(()));
        waker.join().unwrap();
    }
}
