//! Application configuration.
use cohort_core::time::Duration;
use core::fmt;

/// Static configuration of the application. All intervals are in kernel
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    /// The priority of every task.
    pub priority: usize,

    /// The interval between console access attempts by a printer.
    pub printer_period: Duration,
    /// The number of glyphs in one burst, excluding the newline.
    pub burst_len: usize,
    /// The glyph of Printer-O.
    pub glyph_o: u8,
    /// The glyph of Printer-X.
    pub glyph_x: u8,

    /// The period of the repeating supervisor timer.
    pub repeating_period: Duration,
    /// The repeating timer's count at which Printer-O is suspended.
    pub suspend_o_at: u32,
    /// The repeating timer's count at which Printer-X is suspended.
    pub suspend_x_at: u32,
    /// The repeating timer's count at which both printers are resumed and
    /// control is handed over to the one-shot timer.
    pub hand_off_at: u32,
    /// The delay between the hand-off and the deletion of both printers.
    pub one_shot_period: Duration,

    /// The capacity of the channel between the producer and the consumer.
    pub queue_capacity: usize,
    /// The first value sent by the producer.
    pub seed: i32,
    /// The interval between two sends by the producer.
    pub producer_interval: Duration,
    /// How long the consumer waits for a message in each cycle.
    pub consumer_timeout: Duration,

    /// The time the status indicator spends in each state.
    pub heartbeat_half_period: Duration,
}

impl AppConfig {
    /// The reference scenario.
    pub const DEFAULT: Self = Self {
        priority: 1,
        printer_period: Duration::from_ticks(100),
        burst_len: 10,
        glyph_o: b'O',
        glyph_x: b'X',
        repeating_period: Duration::from_ticks(500),
        suspend_o_at: 2,
        suspend_x_at: 4,
        hand_off_at: 5,
        one_shot_period: Duration::from_ticks(5000),
        queue_capacity: 5,
        seed: 123,
        producer_interval: Duration::from_ticks(500),
        consumer_timeout: Duration::from_ticks(100),
        heartbeat_half_period: Duration::from_ticks(50),
    };

    /// Check the configuration for values the application can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("printer_period", self.printer_period),
            ("repeating_period", self.repeating_period),
            ("one_shot_period", self.one_shot_period),
            ("producer_interval", self.producer_interval),
            ("heartbeat_half_period", self.heartbeat_half_period),
        ];
        if let Some(&(name, _)) = periods.iter().find(|(_, p)| p.is_zero()) {
            return Err(ConfigError::ZeroPeriod(name));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.burst_len == 0 {
            return Err(ConfigError::EmptyBurst);
        }
        if !(0 < self.suspend_o_at
            && self.suspend_o_at < self.suspend_x_at
            && self.suspend_x_at < self.hand_off_at)
        {
            return Err(ConfigError::ScriptOrder);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Error type of [`AppConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The named interval is zero.
    ZeroPeriod(&'static str),
    /// The channel capacity is zero.
    ZeroCapacity,
    /// The burst length is zero.
    EmptyBurst,
    /// The supervisor's script counts aren't strictly increasing from one.
    ScriptOrder,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ZeroPeriod(name) => write!(f, "`{name}` must be non-zero"),
            Self::ZeroCapacity => f.write_str("`queue_capacity` must be non-zero"),
            Self::EmptyBurst => f.write_str("`burst_len` must be non-zero"),
            Self::ScriptOrder => f.write_str(
                "`suspend_o_at`, `suspend_x_at`, and `hand_off_at` must be strictly increasing \
                 and start from one or more",
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_is_valid() {
        assert_eq!(AppConfig::DEFAULT.validate(), Ok(()));
        assert_eq!(AppConfig::default(), AppConfig::DEFAULT);
    }

    #[test]
    fn rejects_zero_period() {
        let config = AppConfig {
            one_shot_period: Duration::ZERO,
            ..AppConfig::DEFAULT
        };
        assert_matches!(config.validate(), Err(ConfigError::ZeroPeriod("one_shot_period")));
    }

    #[test]
    fn rejects_unordered_script() {
        for (o, x, h) in [(0, 4, 5), (2, 2, 5), (4, 2, 5), (2, 5, 5)] {
            let config = AppConfig {
                suspend_o_at: o,
                suspend_x_at: x,
                hand_off_at: h,
                ..AppConfig::DEFAULT
            };
            assert_matches!(config.validate(), Err(ConfigError::ScriptOrder), "{o} {x} {h}");
        }
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = AppConfig {
            queue_capacity: 0,
            ..AppConfig::DEFAULT
        };
        assert_matches!(config.validate(), Err(ConfigError::ZeroCapacity));
        assert_eq!(
            ConfigError::ZeroCapacity.to_string(),
            "`queue_capacity` must be non-zero"
        );
    }
}
