//! The bounded channel between the producer and the consumer.
use cohort_core::{
    kernel::{
        CreateQueueError, KernelQueue, Message, QueryQueueError, ReceiveQueueError,
        SendQueueError,
    },
    time::Duration,
};
use std::{fmt, sync::Arc};

use crate::{trap::trap, worker::run_periodic, WorkerError};

/// A fixed-capacity FIFO of [`Message`]s backed by a kernel queue.
pub struct Channel<K: KernelQueue> {
    kernel: Arc<K>,
    queue: K::RawQueueId,
}

impl<K: KernelQueue> Clone for Channel<K> {
    fn clone(&self) -> Self {
        Self {
            kernel: Arc::clone(&self.kernel),
            queue: self.queue,
        }
    }
}

impl<K: KernelQueue> fmt::Debug for Channel<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("queue", &self.queue)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl<K: KernelQueue> Channel<K> {
    /// Create a channel that holds at most `capacity` messages.
    pub fn new(kernel: Arc<K>, capacity: usize) -> Result<Self, CreateQueueError> {
        let queue = kernel.raw_queue_create(capacity)?;
        Ok(Self { kernel, queue })
    }

    /// Append a message, waiting for at most `timeout` for a free slot.
    pub fn send(&self, message: Message, timeout: Duration) -> Result<(), SendQueueError> {
        self.kernel.raw_queue_send(self.queue, message, timeout)
    }

    /// Append a message if there's a free slot. Fails with `Timeout`
    /// otherwise.
    pub fn try_send(&self, message: Message) -> Result<(), SendQueueError> {
        self.send(message, Duration::ZERO)
    }

    /// Remove the oldest message, waiting for at most `timeout` for one to
    /// arrive.
    pub fn recv(&self, timeout: Duration) -> Result<Message, ReceiveQueueError> {
        self.kernel.raw_queue_receive(self.queue, timeout)
    }

    /// Get the number of messages waiting to be received.
    pub fn pending_count(&self) -> Result<usize, QueryQueueError> {
        self.kernel.raw_queue_len(self.queue)
    }

    pub fn capacity(&self) -> Result<usize, QueryQueueError> {
        self.kernel.raw_queue_capacity(self.queue)
    }

    /// Get the underlying queue.
    pub fn raw_queue(&self) -> K::RawQueueId {
        self.queue
    }
}

/// Sends an increasing sequence of values at a fixed interval. A value that
/// doesn't fit in the channel is dropped.
#[derive(Debug)]
pub struct Producer<K: KernelQueue> {
    channel: Channel<K>,
    next: Message,
    interval: Duration,
}

impl<K: KernelQueue> Producer<K> {
    pub fn new(channel: Channel<K>, seed: Message, interval: Duration) -> Self {
        Self {
            channel,
            next: seed,
            interval,
        }
    }

    /// The value to be sent in the next cycle.
    pub fn next_value(&self) -> Message {
        self.next
    }

    /// Offer the next value to the channel without waiting. Returns whether
    /// it was accepted. The sequence advances either way.
    pub fn cycle(&mut self) -> Result<bool, WorkerError> {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        match self.channel.try_send(value) {
            Ok(()) => Ok(true),
            Err(SendQueueError::Timeout) => {
                log::debug!("channel full, dropping {value}");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The task body.
    pub fn run(mut self) -> ! {
        let kernel = Arc::clone(&self.channel.kernel);
        run_periodic(&*kernel, self.interval, || self.cycle().map(drop))
    }
}

/// What [`Consumer::cycle`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerCycle {
    /// The number of pending messages at the start of the cycle.
    pub observed_pending: usize,
    /// The message received in the cycle, or `None` if the wait timed out.
    pub received: Option<Message>,
}

/// Reports the channel's backlog and receives messages one at a time.
#[derive(Debug)]
pub struct Consumer<K: KernelQueue> {
    channel: Channel<K>,
    timeout: Duration,
}

impl<K: KernelQueue> Consumer<K> {
    pub fn new(channel: Channel<K>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Report the backlog if there is one, and then wait for at most the
    /// configured timeout for a message.
    pub fn cycle(&mut self) -> Result<ConsumerCycle, WorkerError> {
        let observed_pending = self.channel.pending_count()?;
        if observed_pending != 0 {
            log::info!("Queue items count = {observed_pending}");
        }

        let received = match self.channel.recv(self.timeout) {
            Ok(value) => {
                log::info!("Received = {value}");
                Some(value)
            }
            Err(ReceiveQueueError::Timeout) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(ConsumerCycle {
            observed_pending,
            received,
        })
    }

    /// The task body. The bounded wait in each cycle paces the loop.
    pub fn run(mut self) -> ! {
        loop {
            if let Err(e) = self.cycle() {
                trap(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_port_std::StdKernel;
    use quickcheck_macros::quickcheck;

    fn channel(capacity: usize) -> Channel<StdKernel> {
        let _ = env_logger::builder().is_test(true).try_init();
        Channel::new(Arc::new(StdKernel::default()), capacity).unwrap()
    }

    #[test]
    fn reference_scenario() {
        let channel = channel(5);
        let mut producer = Producer::new(channel.clone(), 123, Duration::from_ticks(500));
        let mut consumer = Consumer::new(channel.clone(), Duration::from_ticks(100));

        for _ in 0..3 {
            assert!(producer.cycle().unwrap());
        }
        assert_eq!(channel.pending_count(), Ok(3));
        assert_eq!(producer.next_value(), 126);

        let cycles: Vec<_> = (0..3).map(|_| consumer.cycle().unwrap()).collect();
        assert_eq!(
            cycles,
            [(3, 123), (2, 124), (1, 125)].map(|(observed_pending, value)| ConsumerCycle {
                observed_pending,
                received: Some(value),
            })
        );

        // The next cycle waits for 100 ticks and gives up
        assert_eq!(
            consumer.cycle().unwrap(),
            ConsumerCycle {
                observed_pending: 0,
                received: None,
            }
        );
    }

    #[test]
    fn full_channel_drops_values() {
        let channel = channel(5);
        let mut producer = Producer::new(channel.clone(), 123, Duration::from_ticks(500));

        let accepted: Vec<bool> = (0..7).map(|_| producer.cycle().unwrap()).collect();
        assert_eq!(accepted, [true, true, true, true, true, false, false]);
        assert_eq!(channel.pending_count(), Ok(5));
        assert_eq!(producer.next_value(), 130);

        let received: Vec<_> = (0..5)
            .map(|_| channel.recv(Duration::ZERO).unwrap())
            .collect();
        assert_eq!(received, [123, 124, 125, 126, 127]);
    }

    #[quickcheck]
    fn fifo_up_to_capacity(values: Vec<i32>) -> bool {
        let channel = channel(5);
        let n = values.len().min(5);
        for &v in &values[..n] {
            if channel.try_send(v).is_err() {
                return false;
            }
        }
        if channel.pending_count() != Ok(n) {
            return false;
        }
        (0..n)
            .map(|_| channel.recv(Duration::ZERO))
            .eq(values[..n].iter().map(|&v| Ok(v)))
    }

    #[quickcheck]
    fn pending_never_exceeds_capacity(sends: u8) -> bool {
        let channel = channel(5);
        let mut producer = Producer::new(channel.clone(), 0, Duration::from_ticks(1));
        (0..sends).all(|_| {
            producer.cycle().is_ok() && channel.pending_count().map_or(false, |n| n <= 5)
        })
    }
}
