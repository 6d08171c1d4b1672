//! Board clock configuration.

use std::time::Duration;

use crate::Ticks;

/// Clock configuration for a board.
///
/// A single oscillator drives the CPU and every device. One tick of this
/// clock is one bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// Oscillator frequency in Hz (e.g. `1_000_000` for a 1 MHz board).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Wall-clock time covered by `ticks` cycles at this frequency.
    ///
    /// A zero frequency yields a zero duration.
    #[must_use]
    pub fn duration_of(&self, ticks: Ticks) -> Duration {
        if self.frequency_hz == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(ticks.get()) * 1_000_000_000 / u128::from(self.frequency_hz);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Ticks that elapse in `interval` (rounded down, at least one).
    #[must_use]
    pub fn ticks_in(&self, interval: Duration) -> Ticks {
        let ticks = interval.as_nanos() * u128::from(self.frequency_hz) / 1_000_000_000;
        Ticks::new(u64::try_from(ticks).unwrap_or(u64::MAX).max(1))
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}
