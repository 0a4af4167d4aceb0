//! Receiving from an empty queue times out after the specified number of
//! ticks, and a zero-timeout receive fails immediately.
use assert_matches::assert_matches;
use cohort_core::{kernel::ReceiveQueueError, time::Duration};
use std::sync::Arc;

use super::{spawn, Driver, SupportedSystem};

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let queue = kernel.raw_queue_create(1).unwrap();

    spawn(kernel, "task0", move |kernel| {
        assert_matches!(
            kernel.raw_queue_receive(queue, Duration::ZERO),
            Err(ReceiveQueueError::Timeout)
        );

        let start = kernel.raw_tick_count();
        assert_matches!(
            kernel.raw_queue_receive(queue, Duration::from_ticks(50)),
            Err(ReceiveQueueError::Timeout)
        );
        let elapsed = kernel.raw_tick_count().duration_since(start);
        log::debug!("receive timed out after {elapsed:?}");
        assert!(elapsed >= Duration::from_ticks(50));

        kernel.raw_queue_send(queue, 7, Duration::ZERO).unwrap();
        assert_eq!(kernel.raw_queue_receive(queue, Duration::from_ticks(50)), Ok(7));
        driver.success();
    });
}
