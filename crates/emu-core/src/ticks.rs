//! Cycle counts.

use std::fmt;

/// A number of board clock cycles.
///
/// CPU instructions, VIA timers, LCD busy time and serial character time
/// are all counted in these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    /// A single bus cycle, the step every device sees.
    pub const ONE: Self = Self(1);

    #[must_use]
    pub const fn new(cycles: u64) -> Self {
        Self(cycles)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Ticks {
    fn from(cycles: u64) -> Self {
        Self(cycles)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            1 => f.write_str("1 cycle"),
            n => write!(f, "{n} cycles"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pluralises() {
        assert_eq!(Ticks::ONE.to_string(), "1 cycle");
        assert_eq!(Ticks::new(520).to_string(), "520 cycles");
    }
}
