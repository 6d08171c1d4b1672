//! 6502 processor status register (P).

use std::fmt;

/// Carry.
pub const C: u8 = 0x01;

/// Zero.
pub const Z: u8 = 0x02;

/// Interrupt disable. While set, IRQ is not serviced.
pub const I: u8 = 0x04;

/// Decimal mode. Only ADC and SBC look at it.
pub const D: u8 = 0x08;

/// Break. Exists only in the copy of P pushed to the stack: set by
/// BRK/PHP, clear for IRQ/NMI.
pub const B: u8 = 0x10;

/// Unused bit, always reads as 1.
pub const U: u8 = 0x20;

/// Overflow.
pub const V: u8 = 0x40;

/// Negative.
pub const N: u8 = 0x80;

/// Processor status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    /// Status with only the unused bit set.
    #[must_use]
    pub const fn new() -> Self {
        Self(U)
    }

    /// Status pulled from the stack (PLP/RTI). B is not a real flag.
    #[must_use]
    pub const fn from_byte(value: u8) -> Self {
        Self((value | U) & !B)
    }

    /// Value pushed by BRK and PHP.
    #[must_use]
    pub const fn to_byte_brk(self) -> u8 {
        self.0 | U | B
    }

    /// Value pushed by the IRQ/NMI sequence.
    #[must_use]
    pub const fn to_byte_irq(self) -> u8 {
        (self.0 | U) & !B
    }

    #[must_use]
    pub const fn is_set(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    /// Set or clear a flag based on condition.
    pub fn set_if(&mut self, flag: u8, condition: bool) {
        if condition {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    /// Update N and Z from a result.
    pub fn update_nz(&mut self, value: u8) {
        self.set_if(N, value & 0x80 != 0);
        self.set_if(Z, value == 0);
    }
}

/// Renders as `NV-BDIZC` with clear flags shown as `.`.
impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u8, char); 8] = [
            (N, 'N'),
            (V, 'V'),
            (U, '-'),
            (B, 'B'),
            (D, 'D'),
            (I, 'I'),
            (Z, 'Z'),
            (C, 'C'),
        ];
        for (flag, name) in NAMES {
            let c = if self.is_set(flag) { name } else { '.' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
