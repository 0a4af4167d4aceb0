//! The low-level kernel interface to be implemented by a kernel implementor.
//!
//! The interface is split by capability so that a component can state exactly
//! which services it relies on. For example, a component that only drives
//! task lifecycles from timers bounds its kernel type by
//! `KernelBase + KernelTimer`, which also makes it easy to substitute a
//! recording kernel in tests.
//!
//! Object identifiers are plain values. Creating an object hands out an
//! identifier; the kernel keeps owning the object. Using an identifier after
//! the object was deleted is reported as `NoAccess` (see [`ResultCode`]).
//!
//! [`ResultCode`]: super::ResultCode
use core::{fmt, hash::Hash};

use super::{
    error::*, Message, TaskAttr, TaskEntry, TaskState, TimerAttr, TimerCallback,
};
use crate::time::{Duration, Ticks};

/// A group of traits that must be implemented by kernel object ID types,
/// including [`KernelBase::RawTaskId`].
pub trait Id: fmt::Debug + Copy + Eq + Ord + Hash + Send + Sync + 'static {}
impl<T: ?Sized + fmt::Debug + Copy + Eq + Ord + Hash + Send + Sync + 'static> Id for T {}

/// Provides tasks, delays, and the tick counter.
pub trait KernelBase: Send + Sync + 'static {
    /// The type to identify tasks.
    type RawTaskId: Id;

    /// Create a task that runs `entry`.
    ///
    /// Tasks created before the kernel starts scheduling begin running when
    /// it does.
    fn raw_task_create(
        &self,
        attr: TaskAttr,
        entry: TaskEntry,
    ) -> Result<Self::RawTaskId, CreateTaskError>;

    /// Suspend a task. A suspended task doesn't run until
    /// [`raw_task_resume`] is called for it.
    ///
    /// This is not idempotent: suspending a suspended task fails with
    /// `BadObjectState`.
    ///
    /// [`raw_task_resume`]: Self::raw_task_resume
    fn raw_task_suspend(&self, this: Self::RawTaskId) -> Result<(), SuspendTaskError>;

    /// Resume a suspended task.
    fn raw_task_resume(&self, this: Self::RawTaskId) -> Result<(), ResumeTaskError>;

    /// Delete a task. The task's current activity is abandoned without
    /// notice, and its identifier becomes invalid.
    fn raw_task_delete(&self, this: Self::RawTaskId) -> Result<(), DeleteTaskError>;

    /// Get the lifecycle state of a task.
    ///
    /// Unlike other services, this reports [`TaskState::Deleted`] instead of
    /// failing for a deleted task, so that an observer can tell "deleted"
    /// apart from "never existed".
    fn raw_task_state(&self, this: Self::RawTaskId) -> Result<TaskState, GetTaskStateError>;

    /// Get the current task.
    fn raw_task_current(&self) -> Result<Self::RawTaskId, GetCurrentTaskError>;

    /// Block the current context for the specified duration.
    fn raw_sleep(&self, duration: Duration) -> Result<(), SleepError>;

    /// Get the number of ticks elapsed since the kernel was created.
    fn raw_tick_count(&self) -> Ticks;
}

/// Provides mutexes.
pub trait KernelMutex: KernelBase {
    /// The type to identify mutexes.
    type RawMutexId: Id;

    /// Create an unlocked mutex.
    fn raw_mutex_create(&self) -> Result<Self::RawMutexId, CreateMutexError>;

    /// Attempt to lock a mutex, waiting for at most `timeout` if it's held by
    /// someone else. [`Duration::ZERO`] makes this a non-blocking attempt.
    fn raw_mutex_try_lock(
        &self,
        this: Self::RawMutexId,
        timeout: Duration,
    ) -> Result<(), TryLockMutexError>;

    /// Unlock a mutex held by the current thread.
    fn raw_mutex_unlock(&self, this: Self::RawMutexId) -> Result<(), UnlockMutexError>;

    /// Get a flag indicating whether the mutex is currently locked.
    fn raw_mutex_is_locked(&self, this: Self::RawMutexId) -> Result<bool, QueryMutexError>;
}

/// Provides bounded FIFO queues of [`Message`]s.
pub trait KernelQueue: KernelBase {
    /// The type to identify queues.
    type RawQueueId: Id;

    /// Create an empty queue that holds at most `capacity` messages.
    fn raw_queue_create(&self, capacity: usize) -> Result<Self::RawQueueId, CreateQueueError>;

    /// Append a message to the back of a queue, waiting for at most `timeout`
    /// for a free slot.
    fn raw_queue_send(
        &self,
        this: Self::RawQueueId,
        message: Message,
        timeout: Duration,
    ) -> Result<(), SendQueueError>;

    /// Remove the message at the front of a queue, waiting for at most
    /// `timeout` for one to arrive.
    fn raw_queue_receive(
        &self,
        this: Self::RawQueueId,
        timeout: Duration,
    ) -> Result<Message, ReceiveQueueError>;

    /// Get the number of messages waiting in a queue. This doesn't consume
    /// anything.
    fn raw_queue_len(&self, this: Self::RawQueueId) -> Result<usize, QueryQueueError>;

    /// Get the capacity a queue was created with.
    fn raw_queue_capacity(&self, this: Self::RawQueueId) -> Result<usize, QueryQueueError>;
}

/// Provides software timers.
pub trait KernelTimer: KernelBase {
    /// The type to identify timers.
    type RawTimerId: Id;

    /// Create a dormant timer. `callback` runs in the timer service context
    /// every time the timer fires.
    fn raw_timer_create(
        &self,
        attr: TimerAttr,
        callback: TimerCallback<Self::RawTimerId>,
    ) -> Result<Self::RawTimerId, CreateTimerError>;

    /// Arm a timer so that it fires one period from now. Starting an armed
    /// timer restarts its period from now.
    fn raw_timer_start(&self, this: Self::RawTimerId) -> Result<(), StartTimerError>;

    /// Disarm a timer. Stopping a dormant timer has no effect.
    fn raw_timer_stop(&self, this: Self::RawTimerId) -> Result<(), StopTimerError>;

    /// Get a flag indicating whether the timer is armed.
    fn raw_timer_is_active(&self, this: Self::RawTimerId) -> Result<bool, QueryTimerError>;
}

/// A kernel providing every service Cohort uses.
pub trait Kernel: KernelMutex + KernelQueue + KernelTimer {}
impl<T: KernelMutex + KernelQueue + KernelTimer> Kernel for T {}
