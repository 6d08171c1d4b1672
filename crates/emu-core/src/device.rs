//! Memory-mapped device contract.

use std::any::Any;

use crate::{Observable, Ticks};

/// A named group of pins a device exposes for board wiring, such as a
/// VIA port or the LCD enable line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortInfo {
    pub name: &'static str,
    /// Number of pins, at most 8.
    pub width: u8,
}

impl PortInfo {
    #[must_use]
    pub const fn new(name: &'static str, width: u8) -> Self {
        Self { name, width }
    }

    /// Bits that exist on this port.
    #[must_use]
    pub const fn mask(self) -> u8 {
        if self.width >= 8 {
            0xFF
        } else {
            (1 << self.width) - 1
        }
    }
}

/// What a device puts on the wires of one port. Pins outside `mask` are
/// inputs or high impedance and leave the wires alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Drive {
    pub levels: u8,
    pub mask: u8,
}

impl Drive {
    /// Nothing driven.
    pub const FLOATING: Self = Self { levels: 0, mask: 0 };

    #[must_use]
    pub const fn new(levels: u8, mask: u8) -> Self {
        Self { levels, mask }
    }
}

/// A peripheral wired onto the bus.
///
/// The board owns every device and decodes addresses; a device only ever
/// sees offsets relative to the start of its own window. Devices never
/// touch each other or the CPU directly: they respond to bus traffic,
/// advance with the clock, and expose an interrupt output the board wires
/// to IRQ or NMI.
pub trait Device: Observable + Send {
    /// Short device type name (e.g. `"via"`).
    fn kind(&self) -> &'static str;

    /// Bus read at `offset` within the window. May have side effects.
    fn read(&mut self, offset: u16) -> u8;

    /// Bus write at `offset` within the window.
    fn write(&mut self, offset: u16, value: u8);

    /// Read at `offset` without side effects.
    fn peek(&self, offset: u16) -> u8;

    /// Advance by `elapsed` bus cycles.
    fn tick(&mut self, _elapsed: Ticks) {}

    /// Interrupt output. True while the device requests service.
    fn irq(&self) -> bool {
        false
    }

    /// RESET line asserted. Devices without reset behaviour ignore it.
    fn reset(&mut self) {}

    /// Whether a bus write at `offset` is stored. ROM returns false.
    fn is_writable(&self, _offset: u16) -> bool {
        true
    }

    /// Pin groups available for wiring. Port numbers used by `drive` and
    /// `sense` index this slice.
    fn ports(&self) -> &'static [PortInfo] {
        &[]
    }

    /// Levels driven on `port` after the current cycle.
    fn drive(&self, _port: usize) -> Drive {
        Drive::FLOATING
    }

    /// Wire levels seen on `port`. Only bits in `mask` are connected.
    fn sense(&mut self, _port: usize, _levels: u8, _mask: u8) {}

    /// Concrete-type access for host-side helpers (serial input, LCD text).
    fn as_any(&self) -> &dyn Any;

    /// Mutable concrete-type access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_mask_covers_its_width() {
        assert_eq!(PortInfo::new("EN", 1).mask(), 0x01);
        assert_eq!(PortInfo::new("CTL", 3).mask(), 0x07);
        assert_eq!(PortInfo::new("PA", 8).mask(), 0xFF);
    }
}
