//! The mutex-arbitrated console.
use cohort_core::{
    kernel::{CreateMutexError, KernelMutex, QueryMutexError, TryLockMutexError},
    time::Duration,
};
use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};
use std::sync::Arc;

use crate::trap::trap;

/// An output stream `W` shared by several tasks and protected by a kernel
/// mutex.
///
/// Unlike [`std::sync::Mutex`], the only way to get access is a
/// non-blocking [`try_lock`](Self::try_lock). A task that loses the race
/// skips its turn instead of waiting.
///
///  - Locking a console that the current thread already holds fails with
///    [`TryLockError::WouldDeadlock`].
///
///  - The returned [`ConsoleGuard`] must be dropped on the thread that
///    created it, which is why it's `!Send`.
pub struct Console<K: KernelMutex, W> {
    kernel: Arc<K>,
    mutex: K::RawMutexId,
    data: UnsafeCell<W>,
}

// Safety: Access to `data` is serialized by `mutex`.
unsafe impl<K: KernelMutex, W: Send> Send for Console<K, W> {}
unsafe impl<K: KernelMutex, W: Send> Sync for Console<K, W> {}

/// An RAII implementation of a "scoped lock" of a console. When this
/// structure is dropped, the lock will be released.
#[must_use = "if unused the Console will immediately unlock"]
pub struct ConsoleGuard<'a, K: KernelMutex, W> {
    console: &'a Console<K, W>,
    _no_send_sync: PhantomData<*mut ()>,
}

/// Error type of [`Console::try_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryLockError {
    /// The current context can't own a mutex.
    BadContext,
    /// The current thread already holds the console.
    WouldDeadlock,
    /// Someone else holds the console.
    WouldBlock,
}

impl<K: KernelMutex, W> Console<K, W> {
    /// Wrap `data` with a newly created kernel mutex.
    pub fn new(kernel: Arc<K>, data: W) -> Result<Self, CreateMutexError> {
        let mutex = kernel.raw_mutex_create()?;
        Ok(Self {
            kernel,
            mutex,
            data: UnsafeCell::new(data),
        })
    }

    /// Attempt to acquire the console without blocking.
    pub fn try_lock(&self) -> Result<ConsoleGuard<'_, K, W>, TryLockError> {
        match self.kernel.raw_mutex_try_lock(self.mutex, Duration::ZERO) {
            Ok(()) => Ok(ConsoleGuard {
                console: self,
                _no_send_sync: PhantomData,
            }),
            Err(TryLockMutexError::NoAccess) => trap("the console mutex has vanished"),
            Err(TryLockMutexError::BadContext) => Err(TryLockError::BadContext),
            Err(TryLockMutexError::WouldDeadlock) => Err(TryLockError::WouldDeadlock),
            Err(TryLockMutexError::Timeout) => Err(TryLockError::WouldBlock),
        }
    }

    /// Get a flag indicating whether someone holds the console.
    pub fn is_locked(&self) -> Result<bool, QueryMutexError> {
        self.kernel.raw_mutex_is_locked(self.mutex)
    }
}

impl<K: KernelMutex, W> fmt::Debug for Console<K, W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Console")
            .field("mutex", &self.mutex)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

impl<K: KernelMutex, W> Drop for ConsoleGuard<'_, K, W> {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = self.console.kernel.raw_mutex_unlock(self.console.mutex) {
            trap(format_args!("failed to release the console: {e}"));
        }
    }
}

impl<K: KernelMutex, W> Deref for ConsoleGuard<'_, K, W> {
    type Target = W;
    #[inline]
    fn deref(&self) -> &Self::Target {
        // Safety: The guard proves that we hold the mutex
        unsafe { &*self.console.data.get() }
    }
}

impl<K: KernelMutex, W> DerefMut for ConsoleGuard<'_, K, W> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: The guard proves that we hold the mutex
        unsafe { &mut *self.console.data.get() }
    }
}

impl<K: KernelMutex, W: fmt::Debug> fmt::Debug for ConsoleGuard<'_, K, W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
