//! Printer workers.
use cohort_core::{kernel::KernelMutex, time::Duration};
use std::{
    io::{self, Write},
    sync::Arc,
};

use crate::{
    console::{Console, TryLockError},
    worker::run_periodic,
    WorkerError,
};

/// A worker that periodically prints a burst of one glyph to the shared
/// console, skipping its turn when the console is busy.
pub struct Printer<K: KernelMutex, W> {
    kernel: Arc<K>,
    console: Arc<Console<K, W>>,
    glyph: u8,
    burst_len: usize,
    period: Duration,
}

impl<K: KernelMutex, W: io::Write> Printer<K, W> {
    pub fn new(
        kernel: Arc<K>,
        console: Arc<Console<K, W>>,
        glyph: u8,
        burst_len: usize,
        period: Duration,
    ) -> Self {
        Self {
            kernel,
            console,
            glyph,
            burst_len,
            period,
        }
    }

    /// Make one attempt to print a burst. Returns `Ok(true)` if the burst was
    /// printed and `Ok(false)` if the console was busy.
    pub fn cycle(&self) -> Result<bool, WorkerError> {
        let mut guard = match self.console.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                log::debug!("{:?}: console busy, skipping", self.glyph as char);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let mut line = vec![self.glyph; self.burst_len];
        line.push(b'\n');
        guard.write_all(&line)?;
        guard.flush()?;
        Ok(true)
    }

    /// The task body.
    pub fn run(self) -> ! {
        let kernel = Arc::clone(&self.kernel);
        run_periodic(&*kernel, self.period, || self.cycle().map(drop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_port_std::StdKernel;
    use std::thread;

    fn printer(glyph: u8) -> Printer<StdKernel, Vec<u8>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let kernel = Arc::new(StdKernel::default());
        let console = Arc::new(Console::new(Arc::clone(&kernel), Vec::new()).unwrap());
        Printer::new(kernel, console, glyph, 10, Duration::from_ticks(100))
    }

    #[test]
    fn prints_a_burst() {
        let printer = printer(b'O');
        assert!(printer.cycle().unwrap());
        assert!(printer.cycle().unwrap());
        let output = printer.console.try_lock().unwrap().clone();
        assert_eq!(output, b"OOOOOOOOOO\nOOOOOOOOOO\n");
    }

    #[test]
    fn skips_when_busy() {
        let printer = Arc::new(printer(b'X'));
        let guard = printer.console.try_lock().unwrap();

        let printer2 = Arc::clone(&printer);
        let printed = thread::spawn(move || printer2.cycle().unwrap())
            .join()
            .unwrap();
        assert!(!printed);
        assert!(guard.is_empty());
    }
}
