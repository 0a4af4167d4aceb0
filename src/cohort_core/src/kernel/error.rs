use core::{fmt, mem::transmute};

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use cohort_core::kernel::ResultCode;
            /// assert_eq!(ResultCode::BadObjectState.as_str(), "BadObjectState");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }

        impl fmt::Display for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that a kernel service can
    /// report.
    ///
    /// The error codes are matched to their closest equivalents in μITRON4.0
    /// so that a port wrapping a C kernel can pass them through unchanged.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful. No additional information is available.
        Success = 0,
        /// A parameter is invalid in a way that is no covered by any other error
        /// codes.
        BadParam = -17,
        /// The specified object identifier is invalid, or the object has been
        /// deleted.
        ///
        /// Application code should not try to recover from this. It means the
        /// caller's bookkeeping of object lifetimes is wrong.
        NoAccess = -18,
        /// The current context disallows the operation, e.g., a blocking call
        /// was made from the timer service context.
        BadContext = -25,
        /// The caller does not own the resource.
        NotOwner = -29,
        /// Resource deadlock would occur.
        WouldDeadlock = -30,
        /// The kernel ran out of memory for a new object.
        NoMemory = -33,
        /// A target object is in a state that disallows the operation.
        BadObjectState = -41,
        /// The operation timed out.
        Timeout = -50,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident $(: $($subty:ident),* $(,)*)? {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode` for cost-free
                // conversion
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                // Safety: `ResultCode` and `$name` has the same representation
                //         type, and the representation of `ResultCode` is a
                //         superset of `x`.
                unsafe { transmute(x) }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }

        $($(
            $subty!(impl From<_> for $name);
        )*)?

        #[allow(unused_macros)]
        macro_rules! $name {
            (impl From<_> for $dest_ty:ty) => {
                impl From<$name> for $dest_ty {
                    #[inline]
                    fn from(x: $name) -> Self {
                        match x {
                            $(
                                $name::$vname => Self::$vname,
                            )*
                        }
                    }
                }
            };
        }
    };
}

// Building blocks shared by kernel implementations. Each of these converts
// into every operation error that includes its variants.

define_error! {
    mod no_access_error {}
    /// The object identifier is invalid or refers to a deleted object.
    pub enum NoAccessError {
        NoAccess,
    }
}

define_error! {
    mod alloc_object_error {}
    /// Error type for allocating a kernel object.
    pub enum AllocObjectError {
        /// The kernel's object budget is exhausted.
        NoMemory,
        /// The kernel has been shut down.
        BadObjectState,
    }
}

define_error! {
    mod wait_timeout_error {}
    /// Error type for a bounded wait.
    pub enum WaitTimeoutError {
        /// The current context can't block (e.g., the timer service context)
        /// and the timeout wasn't zero.
        BadContext,
        /// The wait didn't complete before the timeout.
        Timeout,
    }
}

// Tasks

define_error! {
    mod create_task_error {}
    /// Error type for [`KernelBase::raw_task_create`].
    ///
    /// [`KernelBase::raw_task_create`]: super::KernelBase::raw_task_create
    pub enum CreateTaskError: AllocObjectError {
        NoMemory,
        BadObjectState,
    }
}

define_error! {
    mod suspend_task_error {}
    /// Error type for [`KernelBase::raw_task_suspend`].
    ///
    /// [`KernelBase::raw_task_suspend`]: super::KernelBase::raw_task_suspend
    pub enum SuspendTaskError: NoAccessError {
        NoAccess,
        /// The task is already suspended.
        BadObjectState,
    }
}

define_error! {
    mod resume_task_error {}
    /// Error type for [`KernelBase::raw_task_resume`].
    ///
    /// [`KernelBase::raw_task_resume`]: super::KernelBase::raw_task_resume
    pub enum ResumeTaskError: NoAccessError {
        NoAccess,
        /// The task is not suspended.
        BadObjectState,
    }
}

define_error! {
    mod delete_task_error {}
    /// Error type for [`KernelBase::raw_task_delete`].
    ///
    /// Deleting a task twice is reported as `NoAccess`.
    ///
    /// [`KernelBase::raw_task_delete`]: super::KernelBase::raw_task_delete
    pub enum DeleteTaskError: NoAccessError {
        NoAccess,
    }
}

define_error! {
    mod get_task_state_error {}
    /// Error type for [`KernelBase::raw_task_state`].
    ///
    /// [`KernelBase::raw_task_state`]: super::KernelBase::raw_task_state
    pub enum GetTaskStateError: NoAccessError {
        NoAccess,
    }
}

define_error! {
    mod get_current_task_error {}
    /// Error type for [`KernelBase::raw_task_current`].
    ///
    /// [`KernelBase::raw_task_current`]: super::KernelBase::raw_task_current
    pub enum GetCurrentTaskError {
        /// The current context is not a task context.
        BadContext,
    }
}

define_error! {
    mod sleep_error {}
    /// Error type for [`KernelBase::raw_sleep`].
    ///
    /// [`KernelBase::raw_sleep`]: super::KernelBase::raw_sleep
    pub enum SleepError {
        /// The current context can't block.
        BadContext,
    }
}

// Mutexes

define_error! {
    mod create_mutex_error {}
    /// Error type for [`KernelMutex::raw_mutex_create`].
    ///
    /// [`KernelMutex::raw_mutex_create`]: super::KernelMutex::raw_mutex_create
    pub enum CreateMutexError: AllocObjectError {
        NoMemory,
        BadObjectState,
    }
}

define_error! {
    mod try_lock_mutex_error {}
    /// Error type for [`KernelMutex::raw_mutex_try_lock`].
    ///
    /// [`KernelMutex::raw_mutex_try_lock`]: super::KernelMutex::raw_mutex_try_lock
    pub enum TryLockMutexError: NoAccessError, WaitTimeoutError {
        NoAccess,
        BadContext,
        /// The current thread already owns the mutex.
        WouldDeadlock,
        /// The mutex is held by someone else and the timeout elapsed (or was
        /// zero).
        Timeout,
    }
}

define_error! {
    mod unlock_mutex_error {}
    /// Error type for [`KernelMutex::raw_mutex_unlock`].
    ///
    /// [`KernelMutex::raw_mutex_unlock`]: super::KernelMutex::raw_mutex_unlock
    pub enum UnlockMutexError: NoAccessError {
        NoAccess,
        /// The current thread does not own the mutex.
        NotOwner,
    }
}

define_error! {
    mod query_mutex_error {}
    /// Error type for [`KernelMutex::raw_mutex_is_locked`].
    ///
    /// [`KernelMutex::raw_mutex_is_locked`]: super::KernelMutex::raw_mutex_is_locked
    pub enum QueryMutexError: NoAccessError {
        NoAccess,
    }
}

// Queues

define_error! {
    mod create_queue_error {}
    /// Error type for [`KernelQueue::raw_queue_create`].
    ///
    /// [`KernelQueue::raw_queue_create`]: super::KernelQueue::raw_queue_create
    pub enum CreateQueueError: AllocObjectError {
        NoMemory,
        /// The capacity is zero.
        BadParam,
        BadObjectState,
    }
}

define_error! {
    mod send_queue_error {}
    /// Error type for [`KernelQueue::raw_queue_send`].
    ///
    /// [`KernelQueue::raw_queue_send`]: super::KernelQueue::raw_queue_send
    pub enum SendQueueError: NoAccessError, WaitTimeoutError {
        NoAccess,
        BadContext,
        /// The queue stayed full until the timeout elapsed (or the timeout was
        /// zero).
        Timeout,
    }
}

define_error! {
    mod receive_queue_error {}
    /// Error type for [`KernelQueue::raw_queue_receive`].
    ///
    /// [`KernelQueue::raw_queue_receive`]: super::KernelQueue::raw_queue_receive
    pub enum ReceiveQueueError: NoAccessError, WaitTimeoutError {
        NoAccess,
        BadContext,
        /// The queue stayed empty until the timeout elapsed (or the timeout was
        /// zero).
        Timeout,
    }
}

define_error! {
    mod query_queue_error {}
    /// Error type for [`KernelQueue::raw_queue_len`] and
    /// [`KernelQueue::raw_queue_capacity`].
    ///
    /// [`KernelQueue::raw_queue_len`]: super::KernelQueue::raw_queue_len
    /// [`KernelQueue::raw_queue_capacity`]: super::KernelQueue::raw_queue_capacity
    pub enum QueryQueueError: NoAccessError {
        NoAccess,
    }
}

// Timers

define_error! {
    mod create_timer_error {}
    /// Error type for [`KernelTimer::raw_timer_create`].
    ///
    /// [`KernelTimer::raw_timer_create`]: super::KernelTimer::raw_timer_create
    pub enum CreateTimerError: AllocObjectError {
        NoMemory,
        /// The period is zero.
        BadParam,
        BadObjectState,
    }
}

define_error! {
    mod start_timer_error {}
    /// Error type for [`KernelTimer::raw_timer_start`].
    ///
    /// [`KernelTimer::raw_timer_start`]: super::KernelTimer::raw_timer_start
    pub enum StartTimerError: NoAccessError {
        NoAccess,
    }
}

define_error! {
    mod stop_timer_error {}
    /// Error type for [`KernelTimer::raw_timer_stop`].
    ///
    /// [`KernelTimer::raw_timer_stop`]: super::KernelTimer::raw_timer_stop
    pub enum StopTimerError: NoAccessError {
        NoAccess,
    }
}

define_error! {
    mod query_timer_error {}
    /// Error type for [`KernelTimer::raw_timer_is_active`].
    ///
    /// [`KernelTimer::raw_timer_is_active`]: super::KernelTimer::raw_timer_is_active
    pub enum QueryTimerError: NoAccessError {
        NoAccess,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_sign() {
        assert!(ResultCode::Success.is_ok());
        assert!(ResultCode::Timeout.is_err());
        assert!(ResultCode::NoMemory.is_err());
    }

    #[test]
    fn subtype_conversion() {
        assert_eq!(
            SendQueueError::from(WaitTimeoutError::Timeout),
            SendQueueError::Timeout
        );
        assert_eq!(
            TryLockMutexError::from(NoAccessError::NoAccess),
            TryLockMutexError::NoAccess
        );
        assert_eq!(
            CreateTimerError::from(AllocObjectError::NoMemory),
            CreateTimerError::NoMemory
        );
    }

    #[test]
    fn debug_prints_code_name() {
        assert_eq!(format!("{:?}", ReceiveQueueError::Timeout), "Timeout");
        assert_eq!(format!("{}", CreateTaskError::NoMemory), "NoMemory");
    }
}
