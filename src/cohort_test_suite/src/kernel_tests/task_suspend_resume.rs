//! A suspended task stops making progress until it's resumed.
//!
//! `task1` counts up in a loop, sleeping for one tick per iteration. `task0`
//! suspends it, checks that the count stops changing, and then resumes it.
use assert_matches::assert_matches;
use cohort_core::{
    kernel::{ResumeTaskError, SuspendTaskError, TaskState},
    time::Duration,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::{spawn, Driver, SupportedSystem};

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let counter = Arc::new(AtomicUsize::new(0));

    let counter2 = Arc::clone(&counter);
    let task1 = spawn(kernel, "task1", move |kernel| loop {
        counter2.fetch_add(1, Ordering::SeqCst);
        kernel.raw_sleep(Duration::from_ticks(1)).unwrap();
    });

    spawn(kernel, "task0", move |kernel| {
        kernel.raw_sleep(Duration::from_ticks(20)).unwrap();
        assert!(counter.load(Ordering::SeqCst) > 0);

        kernel.raw_task_suspend(task1).unwrap();
        assert_eq!(kernel.raw_task_state(task1), Ok(TaskState::Suspended));
        assert_matches!(
            kernel.raw_task_suspend(task1),
            Err(SuspendTaskError::BadObjectState)
        );

        // Let `task1` reach its next checkpoint
        kernel.raw_sleep(Duration::from_ticks(20)).unwrap();
        let frozen = counter.load(Ordering::SeqCst);
        kernel.raw_sleep(Duration::from_ticks(50)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), frozen);

        kernel.raw_task_resume(task1).unwrap();
        assert_eq!(kernel.raw_task_state(task1), Ok(TaskState::Active));
        assert_matches!(
            kernel.raw_task_resume(task1),
            Err(ResumeTaskError::BadObjectState)
        );

        kernel.raw_sleep(Duration::from_ticks(50)).unwrap();
        assert!(counter.load(Ordering::SeqCst) > frozen);
        driver.success();
    });
}
