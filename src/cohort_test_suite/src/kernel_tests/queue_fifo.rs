//! Messages are delivered in FIFO order, and a queue never holds more than
//! its capacity.
//!
//! 1. (`seq`: 0 → 1) `task0` fills a queue of capacity 5 with zero-wait
//!    sends. The sixth send fails without blocking.
//! 2. (`seq`: 1 → 2) `task0` creates `task1` and blocks sending the sixth
//!    message.
//! 3. `task1` receives six messages in the order they were sent and reports
//!    success.
use assert_matches::assert_matches;
use cohort_core::{kernel::SendQueueError, time::Duration};
use std::sync::Arc;

use super::{spawn, Driver, SupportedSystem};
use crate::utils::SeqTracker;

const CAPACITY: usize = 5;

pub fn start<System: SupportedSystem, D: Driver>(kernel: &Arc<System>, driver: Arc<D>) {
    let queue = kernel.raw_queue_create(CAPACITY).unwrap();
    let seq = Arc::new(SeqTracker::new());

    spawn(kernel, "task0", move |kernel| {
        assert_eq!(kernel.raw_queue_capacity(queue), Ok(CAPACITY));
        assert_eq!(kernel.raw_queue_len(queue), Ok(0));

        seq.expect_and_replace(0, 1);
        for i in 0..CAPACITY as i32 {
            kernel.raw_queue_send(queue, 100 + i, Duration::ZERO).unwrap();
        }
        assert_eq!(kernel.raw_queue_len(queue), Ok(CAPACITY));
        assert_matches!(
            kernel.raw_queue_send(queue, 105, Duration::ZERO),
            Err(SendQueueError::Timeout)
        );
        assert_eq!(kernel.raw_queue_len(queue), Ok(CAPACITY));

        seq.expect_and_replace(1, 2);
        let seq2 = Arc::clone(&seq);
        spawn(&kernel, "task1", move |kernel| {
            for expected in 100..106 {
                assert_eq!(
                    kernel.raw_queue_receive(queue, Duration::from_ticks(1000)),
                    Ok(expected)
                );
            }
            assert_eq!(seq2.get(), 2);
            assert_eq!(kernel.raw_queue_len(queue), Ok(0));
            driver.success();
        });

        // Blocks until `task1` makes room
        kernel.raw_queue_send(queue, 105, Duration::MAX).unwrap();
    });
}
