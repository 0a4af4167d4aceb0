use core::fmt;

use super::Duration;

/// A wrapping snapshot of the kernel's tick counter.
///
/// The counter starts at zero when the kernel is created and wraps around
/// after `u32::MAX` ticks, so only differences between nearby snapshots are
/// meaningful.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Ticks(pub u32);

impl Ticks {
    /// Get the raw counter value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Get the number of ticks elapsed from `earlier` to `self`, accounting
    /// for a single wrap-around.
    #[inline]
    pub const fn duration_since(self, earlier: Ticks) -> Duration {
        Duration::from_ticks(self.0.wrapping_sub(earlier.0))
    }
}

impl fmt::Debug for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since_wraps() {
        assert_eq!(Ticks(10).duration_since(Ticks(4)), Duration::from_ticks(6));
        assert_eq!(
            Ticks(2).duration_since(Ticks(u32::MAX - 1)),
            Duration::from_ticks(4)
        );
    }
}
