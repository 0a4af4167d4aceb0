use core::sync::atomic::{AtomicUsize, Ordering};

/// An atomic counter for checking an execution sequence.
#[derive(Debug, Default)]
pub struct SeqTracker {
    counter: AtomicUsize,
}

impl SeqTracker {
    /// Construct `SeqTracker`.
    pub const fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    pub fn get(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    /// Assert that the counter is equal to `old` and then replace it with
    /// `new`.
    #[track_caller]
    pub fn expect_and_replace(&self, old: usize, new: usize) {
        let got = self
            .counter
            .compare_exchange(old, new, Ordering::AcqRel, Ordering::Acquire)
            .unwrap_or_else(|got| got);
        log::debug!("{} (expected: {}) → {}", got, old, new);
        assert_eq!(got, old, "expected {}, got {}", old, got);
    }
}
