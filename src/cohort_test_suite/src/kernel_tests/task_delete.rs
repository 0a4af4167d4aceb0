//! A deleted task never runs again, and its identifier stops being usable.
//!
//! `task1` counts up in a loop, sleeping for one tick per iteration. `task0`
//! deletes it and checks that the count stops changing for good.
use assert_matches::assert_matches;
use cohort_core::{
    kernel::{DeleteTaskError, ResumeTaskError, SuspendTaskError, TaskState},
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
        kernel.raw_task_delete(task1).unwrap();
        assert_eq!(kernel.raw_task_state(task1), Ok(TaskState::Deleted));

        kernel.raw_sleep(Duration::from_ticks(20)).unwrap();
        let frozen = counter.load(Ordering::SeqCst);
        kernel.raw_sleep(Duration::from_ticks(50)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), frozen);

        assert_matches!(kernel.raw_task_delete(task1), Err(DeleteTaskError::NoAccess));
        assert_matches!(kernel.raw_task_suspend(task1), Err(SuspendTaskError::NoAccess));
        assert_matches!(kernel.raw_task_resume(task1), Err(ResumeTaskError::NoAccess));

        // A task may delete itself. Nothing after that runs.
        let progress = Arc::new(AtomicUsize::new(0));
        let progress2 = Arc::clone(&progress);
        let task2 = spawn(&kernel, "task2", move |kernel| {
            progress2.store(1, Ordering::SeqCst);
            let current = kernel.raw_task_current().unwrap();
            let _ = kernel.raw_task_delete(current);
            progress2.store(2, Ordering::SeqCst);
        });

        kernel.raw_sleep(Duration::from_ticks(20)).unwrap();
        assert_eq!(progress.load(Ordering::SeqCst), 1);
        assert_eq!(kernel.raw_task_state(task2), Ok(TaskState::Deleted));
        driver.success();
    });
}
