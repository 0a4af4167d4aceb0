//! A one-shot timer fires exactly once, one period after it's started, and
//! then goes dormant.
use assert_matches::assert_matches;
use cohort_core::{
    kernel::{ReceiveQueueError, TimerAttr},
    time::Duration,
};
use std::sync::Arc;

use super::{spawn, Driver, SupportedSystem};

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let queue = kernel.raw_queue_create(4).unwrap();

    let kernel2 = Arc::clone(kernel);
    let timer = kernel
        .raw_timer_create(
            TimerAttr {
                name: "one shot",
                period: Duration::from_ticks(30),
                auto_reload: false,
            },
            Box::new(move |_| {
                let now = kernel2.raw_tick_count().get() as i32;
                kernel2.raw_queue_send(queue, now, Duration::ZERO).unwrap();
            }),
        )
        .unwrap();

    spawn(kernel, "task0", move |kernel| {
        assert_eq!(kernel.raw_timer_is_active(timer), Ok(false));
        let start = kernel.raw_tick_count();
        kernel.raw_timer_start(timer).unwrap();
        assert_eq!(kernel.raw_timer_is_active(timer), Ok(true));

        let fired_at = kernel.raw_queue_receive(queue, Duration::from_ticks(1000)).unwrap();
        let elapsed = (fired_at as u32).wrapping_sub(start.get());
        log::debug!("the timer fired after {elapsed} ticks");
        assert!(elapsed >= 30);

        assert_matches!(
            kernel.raw_queue_receive(queue, Duration::from_ticks(100)),
            Err(ReceiveQueueError::Timeout)
        );
        assert_eq!(kernel.raw_timer_is_active(timer), Ok(false));
        driver.success();
    });
}
