//! The heartbeat worker and status indicators.
use cohort_core::{kernel::KernelBase, time::Duration};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use crate::worker::run_periodic;

/// A binary status output, such as an LED.
pub trait StatusIndicator: Send + Sync + 'static {
    fn set(&self, on: bool);
}

/// A [`StatusIndicator`] that remembers its state and logs every change.
#[derive(Debug, Default)]
pub struct SimulatedLed {
    on: AtomicBool,
    changes: AtomicUsize,
}

impl SimulatedLed {
    pub const fn new() -> Self {
        Self {
            on: AtomicBool::new(false),
            changes: AtomicUsize::new(0),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }

    /// The number of times the state actually changed.
    pub fn change_count(&self) -> usize {
        self.changes.load(Ordering::Relaxed)
    }
}

impl StatusIndicator for SimulatedLed {
    fn set(&self, on: bool) {
        if self.on.swap(on, Ordering::Relaxed) != on {
            self.changes.fetch_add(1, Ordering::Relaxed);
            log::trace!("status LED {}", if on { "on" } else { "off" });
        }
    }
}

/// Toggles a status indicator, spending the same time in each state.
pub struct Heartbeat<K: KernelBase> {
    kernel: Arc<K>,
    indicator: Arc<dyn StatusIndicator>,
    half_period: Duration,
    on: bool,
}

impl<K: KernelBase> Heartbeat<K> {
    pub fn new(kernel: Arc<K>, indicator: Arc<dyn StatusIndicator>, half_period: Duration) -> Self {
        Self {
            kernel,
            indicator,
            half_period,
            on: false,
        }
    }

    /// Flip the indicator. The first call turns it on.
    pub fn cycle(&mut self) {
        self.on = !self.on;
        self.indicator.set(self.on);
    }

    /// The task body.
    pub fn run(mut self) -> ! {
        let kernel = Arc::clone(&self.kernel);
        run_periodic(&*kernel, self.half_period, || {
            self.cycle();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_port_std::StdKernel;

    #[test]
    fn toggles_starting_with_on() {
        let led = Arc::new(SimulatedLed::new());
        let mut heartbeat = Heartbeat::new(
            Arc::new(StdKernel::default()),
            led.clone(),
            Duration::from_ticks(50),
        );

        heartbeat.cycle();
        assert!(led.is_on());
        heartbeat.cycle();
        assert!(!led.is_on());
        heartbeat.cycle();
        assert!(led.is_on());
        assert_eq!(led.change_count(), 3);
    }

    #[test]
    fn redundant_set_is_not_a_change() {
        let led = SimulatedLed::new();
        led.set(true);
        led.set(true);
        led.set(false);
        assert_eq!(led.change_count(), 2);
    }
}
