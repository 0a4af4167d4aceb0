//! A periodic timer keeps firing until it's stopped. Its callback receives
//! the identifier of the timer, which it can use to stop the timer.
use assert_matches::assert_matches;
use cohort_core::{
    kernel::{ReceiveQueueError, TimerAttr},
    time::Duration,
};
use std::sync::Arc;

use super::{spawn, Driver, SupportedSystem};

const FIRINGS: i32 = 4;

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let queue = kernel.raw_queue_create(8).unwrap();

    let kernel2 = Arc::clone(kernel);
    let mut count = 0;
    let timer = kernel
        .raw_timer_create(
            TimerAttr {
                name: "periodic",
                period: Duration::from_ticks(10),
                auto_reload: true,
            },
            Box::new(move |this| {
                count += 1;
                if count == FIRINGS {
                    kernel2.raw_timer_stop(this).unwrap();
                }
                kernel2.raw_queue_send(queue, count, Duration::ZERO).unwrap();
            }),
        )
        .unwrap();
    kernel.raw_timer_start(timer).unwrap();

    spawn(kernel, "task0", move |kernel| {
        for expected in 1..=FIRINGS {
            assert_eq!(
                kernel.raw_queue_receive(queue, Duration::from_ticks(1000)),
                Ok(expected)
            );
        }
        assert_matches!(
            kernel.raw_queue_receive(queue, Duration::from_ticks(100)),
            Err(ReceiveQueueError::Timeout)
        );
        assert_eq!(kernel.raw_timer_is_active(timer), Ok(false));

        // Restarting resumes the sequence
        kernel.raw_timer_start(timer).unwrap();
        assert_eq!(
            kernel.raw_queue_receive(queue, Duration::from_ticks(1000)),
            Ok(FIRINGS + 1)
        );
        kernel.raw_timer_stop(timer).unwrap();
        driver.success();
    });
}
