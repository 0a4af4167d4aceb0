use core::fmt;

/// Represents a non-negative time span measured in kernel ticks.
///
/// `Duration` is backed by `u32`. [`Duration::MAX`] doubles as "wait
/// indefinitely" when passed as the timeout of a blocking kernel service.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Duration {
    ticks: u32,
}

impl Duration {
    /// An empty interval. As a timeout, it makes a kernel service fail
    /// immediately instead of blocking.
    pub const ZERO: Self = Duration { ticks: 0 };

    /// The largest representable time span. As a timeout, it means "block
    /// until the operation can complete".
    pub const MAX: Self = Duration { ticks: u32::MAX };

    /// Construct a new `Duration` from the specified number of ticks.
    #[inline]
    pub const fn from_ticks(ticks: u32) -> Self {
        Self { ticks }
    }

    /// Get the total number of ticks contained by this `Duration`.
    #[inline]
    pub const fn as_ticks(self) -> u32 {
        self.ticks
    }

    /// Return `true` if and only if `self` is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.ticks == 0
    }

    /// Return `true` if and only if `self` is [`Duration::MAX`].
    #[inline]
    pub const fn is_indefinite(self) -> bool {
        self.ticks == u32::MAX
    }

    /// Convert `self` to a wall-clock `core::time::Duration`, given the length
    /// of one tick. Returns `None` if the result overflows.
    pub fn checked_to_wall(self, tick: core::time::Duration) -> Option<core::time::Duration> {
        tick.checked_mul(self.ticks)
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_indefinite() {
            f.write_str("∞")
        } else {
            write!(f, "{}t", self.ticks)
        }
    }
}
