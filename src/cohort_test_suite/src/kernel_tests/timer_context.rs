//! Timer callbacks may only use non-blocking services.
use assert_matches::assert_matches;
use cohort_core::{
    kernel::{GetCurrentTaskError, SendQueueError, SleepError, TimerAttr, TryLockMutexError},
    time::Duration,
};
use std::sync::Arc;

use super::{spawn, Driver, SupportedSystem};

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let queue = kernel.raw_queue_create(1).unwrap();
    let mutex = kernel.raw_mutex_create().unwrap();
    let full_queue = kernel.raw_queue_create(1).unwrap();
    kernel.raw_queue_send(full_queue, 0, Duration::ZERO).unwrap();

    let kernel2 = Arc::clone(kernel);
    let timer = kernel
        .raw_timer_create(
            TimerAttr {
                name: "context check",
                period: Duration::from_ticks(5),
                auto_reload: false,
            },
            Box::new(move |_| {
                let kernel = &kernel2;
                assert_matches!(kernel.raw_task_current(), Err(GetCurrentTaskError::BadContext));
                assert_matches!(
                    kernel.raw_sleep(Duration::from_ticks(1)),
                    Err(SleepError::BadContext)
                );
                assert_matches!(
                    kernel.raw_mutex_try_lock(mutex, Duration::from_ticks(1)),
                    Err(TryLockMutexError::BadContext)
                );

                // Zero-timeout calls are fine
                kernel.raw_mutex_try_lock(mutex, Duration::ZERO).unwrap();
                kernel.raw_mutex_unlock(mutex).unwrap();
                kernel.raw_queue_send(queue, 1, Duration::ZERO).unwrap();
                assert_matches!(
                    kernel.raw_queue_send(full_queue, 2, Duration::from_ticks(1)),
                    Err(SendQueueError::BadContext)
                );
            }),
        )
        .unwrap();

    spawn(kernel, "task0", move |kernel| {
        kernel.raw_timer_start(timer).unwrap();
        assert_eq!(kernel.raw_queue_receive(queue, Duration::from_ticks(1000)), Ok(1));
        driver.success();
    });
}
