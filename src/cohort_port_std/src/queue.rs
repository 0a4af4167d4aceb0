//! Message queues
use cohort_core::{
    kernel::{
        CreateQueueError, KernelQueue, Message, QueryQueueError, ReceiveQueueError,
        SendQueueError,
    },
    time::Duration,
};
use spin::Mutex as SpinMutex;
use std::{collections::VecDeque, sync::Arc};

use crate::{lookup, wait::WaitQueue, QueueId, StdKernel};

/// Queue control block
pub(crate) struct QueueCb {
    capacity: usize,
    items: SpinMutex<VecDeque<Message>>,
    /// Senders waiting for a free slot and receivers waiting for a message.
    /// Any change wakes up both.
    wait_queue: WaitQueue,
}

impl KernelQueue for StdKernel {
    type RawQueueId = QueueId;

    fn raw_queue_create(&self, capacity: usize) -> Result<QueueId, CreateQueueError> {
        if capacity == 0 {
            return Err(CreateQueueError::BadParam);
        }
        let mut queues = self.state.queues.lock();
        self.check_alloc(queues.len(), self.state.config.max_queues)?;
        let id = QueueId(queues.insert(Arc::new(QueueCb {
            capacity,
            items: SpinMutex::new(VecDeque::with_capacity(capacity)),
            wait_queue: WaitQueue::new(),
        })));
        log::trace!("raw_queue_create({capacity}) = {id:?}");
        Ok(id)
    }

    fn raw_queue_send(
        &self,
        this: QueueId,
        message: Message,
        timeout: Duration,
    ) -> Result<(), SendQueueError> {
        let queue = lookup(&self.state.queues, this.0)?;
        self.wait_until(&queue.wait_queue, timeout, || {
            let mut items = queue.items.lock();
            if items.len() < queue.capacity {
                items.push_back(message);
                Some(())
            } else {
                None
            }
        })?;
        queue.wait_queue.wake_all();
        Ok(())
    }

    fn raw_queue_receive(
        &self,
        this: QueueId,
        timeout: Duration,
    ) -> Result<Message, ReceiveQueueError> {
        let queue = lookup(&self.state.queues, this.0)?;
        let message = self.wait_until(&queue.wait_queue, timeout, || {
            queue.items.lock().pop_front()
        })?;
        queue.wait_queue.wake_all();
        Ok(message)
    }

    fn raw_queue_len(&self, this: QueueId) -> Result<usize, QueryQueueError> {
        Ok(lookup(&self.state.queues, this.0)?.items.lock().len())
    }

    fn raw_queue_capacity(&self, this: QueueId) -> Result<usize, QueryQueueError> {
        Ok(lookup(&self.state.queues, this.0)?.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortConfig;
    use assert_matches::assert_matches;
    use quickcheck_macros::quickcheck;
    use std::thread;

    fn kernel() -> StdKernel {
        crate::init_test_logger();
        StdKernel::new(PortConfig::DEFAULT)
    }

    #[test]
    fn zero_capacity() {
        let kernel = kernel();
        assert_matches!(kernel.raw_queue_create(0), Err(CreateQueueError::BadParam));
    }

    #[test]
    fn full_queue_rejects_zero_wait_send() {
        let kernel = kernel();
        let q = kernel.raw_queue_create(2).unwrap();
        kernel.raw_queue_send(q, 1, Duration::ZERO).unwrap();
        kernel.raw_queue_send(q, 2, Duration::ZERO).unwrap();
        assert_matches!(
            kernel.raw_queue_send(q, 3, Duration::ZERO),
            Err(SendQueueError::Timeout)
        );
        assert_eq!(kernel.raw_queue_len(q), Ok(2));
        assert_eq!(kernel.raw_queue_receive(q, Duration::ZERO), Ok(1));
        assert_eq!(kernel.raw_queue_receive(q, Duration::ZERO), Ok(2));
    }

    #[test]
    fn receive_times_out() {
        let kernel = kernel();
        let q = kernel.raw_queue_create(1).unwrap();
        assert_matches!(
            kernel.raw_queue_receive(q, Duration::from_ticks(10)),
            Err(ReceiveQueueError::Timeout)
        );
    }

    #[test]
    fn blocked_receiver_gets_message() {
        let kernel = kernel();
        let q = kernel.raw_queue_create(1).unwrap();
        let kernel2 = kernel.clone();
        let receiver = thread::spawn(move || kernel2.raw_queue_receive(q, Duration::MAX));
        thread::sleep(std::time::Duration::from_millis(20));
        kernel.raw_queue_send(q, 77, Duration::ZERO).unwrap();
        assert_eq!(receiver.join().unwrap(), Ok(77));
    }

    #[quickcheck]
    fn fifo_and_bounded(capacity: u8, values: Vec<i32>) -> bool {
        let capacity = usize::from(capacity % 8) + 1;
        let kernel = kernel();
        let q = kernel.raw_queue_create(capacity).unwrap();

        let mut accepted = Vec::new();
        for &x in &values {
            match kernel.raw_queue_send(q, x, Duration::ZERO) {
                Ok(()) => accepted.push(x),
                Err(SendQueueError::Timeout) => {}
                Err(_) => return false,
            }
            if kernel.raw_queue_len(q).unwrap() > capacity {
                return false;
            }
        }

        let mut received = Vec::new();
        while let Ok(x) = kernel.raw_queue_receive(q, Duration::ZERO) {
            received.push(x);
        }

        let expected: Vec<i32> = values.iter().copied().take(capacity).collect();
        received == accepted && accepted == expected
    }
}
