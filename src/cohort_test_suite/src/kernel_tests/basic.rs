//! Runs a task that succeeds immediately.
use std::sync::Arc;

use super::{spawn, Driver, SupportedSystem};

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    spawn(kernel, "task0", move |kernel| {
        let current = kernel.raw_task_current().unwrap();
        assert_eq!(
            kernel.raw_task_state(current),
            Ok(cohort_core::kernel::TaskState::Active)
        );
        driver.success();
    });
}
