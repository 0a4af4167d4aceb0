//! The kernel interface.
//!
//! # Contexts
//!
//! A kernel service is called from one of these contexts:
//!
//!  - A **task context** is the body of a task created by
//!    [`KernelBase::raw_task_create`]. Blocking services are allowed, and they
//!    are where the kernel applies a pending suspension or deletion to the
//!    calling task.
//!
//!  - The **timer service context** runs timer callbacks one at a time.
//!    Services that would block with a non-zero timeout fail with
//!    `BadContext` there; zero-timeout calls are fine.
//!
//!  - Any other thread (e.g., the thread that boots the system) may call
//!    every service. Blocking calls simply block that thread.
mod error;
pub mod raw;

pub use self::{error::*, raw::*};

/// The fixed-width message type carried by kernel queues.
pub type Message = i32;

/// The body of a task.
pub type TaskEntry = alloc::boxed::Box<dyn FnOnce() + Send + 'static>;

/// A timer callback. It receives the identifier of the timer that fired, so
/// one callback can serve several timers.
pub type TimerCallback<TimerId> = alloc::boxed::Box<dyn FnMut(TimerId) + Send + 'static>;

/// The static properties of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskAttr {
    /// A human-readable name, used in log messages.
    pub name: &'static str,
    /// The task's base priority. Larger values mean higher priorities.
    pub priority: usize,
}

impl TaskAttr {
    pub const fn new(name: &'static str, priority: usize) -> Self {
        Self { name, priority }
    }
}

/// The static properties of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerAttr {
    /// A human-readable name, used in log messages.
    pub name: &'static str,
    /// The interval between the time the timer is started and its first
    /// expiration, and between subsequent expirations of a periodic timer.
    pub period: crate::time::Duration,
    /// `true` for a periodic timer, `false` for a one-shot timer. A one-shot
    /// timer goes back to the dormant state after firing once.
    pub auto_reload: bool,
}

/// The lifecycle state of a task as seen by other tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The task is running, ready to run, or blocked in a kernel service.
    Active,
    /// The task was suspended and won't run until it's resumed.
    Suspended,
    /// The task was deleted. It will never run again.
    Deleted,
}
