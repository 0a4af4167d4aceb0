//! The common loop of periodic workers.
use cohort_core::{
    kernel::{KernelBase, QueryQueueError, ReceiveQueueError, SendQueueError, SleepError},
    time::Duration,
};
use std::{fmt, io};

use crate::{console::TryLockError, trap::trap};

/// An unexpected error in a worker task. Workers don't recover from these.
#[derive(Debug)]
pub enum WorkerError {
    /// The console mutex couldn't be used.
    Console(TryLockError),
    /// Writing to the console's output failed.
    Output(io::Error),
    Send(SendQueueError),
    Receive(ReceiveQueueError),
    Query(QueryQueueError),
    Sleep(SleepError),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Console(e) => write!(f, "failed to lock the console: {e:?}"),
            Self::Output(e) => write!(f, "failed to write to the console: {e}"),
            Self::Send(e) => write!(f, "failed to send a message: {e}"),
            Self::Receive(e) => write!(f, "failed to receive a message: {e}"),
            Self::Query(e) => write!(f, "failed to query the channel: {e}"),
            Self::Sleep(e) => write!(f, "failed to sleep: {e}"),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Output(e) => Some(e),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($( $variant:ident($ty:ty) ),* $(,)?) => {$(
        impl From<$ty> for WorkerError {
            fn from(e: $ty) -> Self {
                Self::$variant(e)
            }
        }
    )*};
}

impl_from! {
    Console(TryLockError),
    Output(io::Error),
    Send(SendQueueError),
    Receive(ReceiveQueueError),
    Query(QueryQueueError),
    Sleep(SleepError),
}

/// Call `cycle` and then sleep for `period`, forever. An error is fatal.
pub(crate) fn run_periodic<K: KernelBase>(
    kernel: &K,
    period: Duration,
    mut cycle: impl FnMut() -> Result<(), WorkerError>,
) -> ! {
    loop {
        if let Err(e) = cycle() {
            trap(e);
        }
        if let Err(e) = kernel.raw_sleep(period) {
            trap(WorkerError::from(e));
        }
    }
}
