//! Mutexes
use cohort_core::{
    kernel::{CreateMutexError, KernelMutex, QueryMutexError, TryLockMutexError, UnlockMutexError},
    time::Duration,
};
use spin::Mutex as SpinMutex;
use std::{
    sync::Arc,
    thread::{self, ThreadId},
};

use crate::{lookup, wait::WaitQueue, MutexId, StdKernel};

/// Mutex control block
pub(crate) struct MutexCb {
    /// The thread currently holding the mutex.
    owner: SpinMutex<Option<ThreadId>>,
    wait_queue: WaitQueue,
}

impl KernelMutex for StdKernel {
    type RawMutexId = MutexId;

    fn raw_mutex_create(&self) -> Result<MutexId, CreateMutexError> {
        let mut mutexes = self.state.mutexes.lock();
        self.check_alloc(mutexes.len(), self.state.config.max_mutexes)?;
        let id = MutexId(mutexes.insert(Arc::new(MutexCb {
            owner: SpinMutex::new(None),
            wait_queue: WaitQueue::new(),
        })));
        log::trace!("raw_mutex_create() = {id:?}");
        Ok(id)
    }

    fn raw_mutex_try_lock(&self, this: MutexId, timeout: Duration) -> Result<(), TryLockMutexError> {
        let mutex = lookup(&self.state.mutexes, this.0)?;
        let current = thread::current().id();

        if *mutex.owner.lock() == Some(current) {
            return Err(TryLockMutexError::WouldDeadlock);
        }

        self.wait_until(&mutex.wait_queue, timeout, || {
            let mut owner = mutex.owner.lock();
            if owner.is_none() {
                *owner = Some(current);
                Some(())
            } else {
                None
            }
        })?;
        Ok(())
    }

    fn raw_mutex_unlock(&self, this: MutexId) -> Result<(), UnlockMutexError> {
        let mutex = lookup(&self.state.mutexes, this.0)?;
        {
            let mut owner = mutex.owner.lock();
            if *owner != Some(thread::current().id()) {
                return Err(UnlockMutexError::NotOwner);
            }
            *owner = None;
        }
        mutex.wait_queue.wake_all();
        Ok(())
    }

    fn raw_mutex_is_locked(&self, this: MutexId) -> Result<bool, QueryMutexError> {
        Ok(lookup(&self.state.mutexes, this.0)?.owner.lock().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortConfig;
    use assert_matches::assert_matches;

    fn kernel() -> StdKernel {
        crate::init_test_logger();
        StdKernel::new(PortConfig::DEFAULT)
    }

    #[test]
    fn lock_unlock() {
        let kernel = kernel();
        let m = kernel.raw_mutex_create().unwrap();
        assert_eq!(kernel.raw_mutex_is_locked(m), Ok(false));

        kernel.raw_mutex_try_lock(m, Duration::ZERO).unwrap();
        assert_eq!(kernel.raw_mutex_is_locked(m), Ok(true));
        assert_matches!(
            kernel.raw_mutex_try_lock(m, Duration::ZERO),
            Err(TryLockMutexError::WouldDeadlock)
        );

        kernel.raw_mutex_unlock(m).unwrap();
        assert_eq!(kernel.raw_mutex_is_locked(m), Ok(false));
        assert_matches!(kernel.raw_mutex_unlock(m), Err(UnlockMutexError::NotOwner));
    }

    #[test]
    fn contended_try_lock_fails_immediately() {
        let kernel = kernel();
        let m = kernel.raw_mutex_create().unwrap();
        kernel.raw_mutex_try_lock(m, Duration::ZERO).unwrap();

        let kernel2 = kernel.clone();
        let result = thread::spawn(move || {
            let r = kernel2.raw_mutex_try_lock(m, Duration::ZERO);
            (r, kernel2.raw_mutex_unlock(m))
        })
        .join()
        .unwrap();
        assert_matches!(result, (Err(TryLockMutexError::Timeout), Err(UnlockMutexError::NotOwner)));

        kernel.raw_mutex_unlock(m).unwrap();
    }

    #[test]
    fn blocking_lock_waits_for_unlock() {
        let kernel = kernel();
        let m = kernel.raw_mutex_create().unwrap();
        kernel.raw_mutex_try_lock(m, Duration::ZERO).unwrap();

        let kernel2 = kernel.clone();
        let waiter = thread::spawn(move || {
            kernel2.raw_mutex_try_lock(m, Duration::MAX).unwrap();
            kernel2.raw_mutex_unlock(m).unwrap();
        });

        thread::sleep(std::time::Duration::from_millis(20));
        kernel.raw_mutex_unlock(m).unwrap();
        waiter.join().unwrap();
        assert_eq!(kernel.raw_mutex_is_locked(m), Ok(false));
    }

    #[test]
    fn bad_id() {
        let kernel = kernel();
        assert_matches!(
            kernel.raw_mutex_try_lock(MutexId(3), Duration::ZERO),
            Err(TryLockMutexError::NoAccess)
        );
    }

    #[test]
    fn mutex_budget() {
        crate::init_test_logger();
        let kernel = StdKernel::new(PortConfig {
            max_mutexes: 1,
            ..PortConfig::DEFAULT
        });
        kernel.raw_mutex_create().unwrap();
        assert_matches!(kernel.raw_mutex_create(), Err(CreateMutexError::NoMemory));
    }
}
