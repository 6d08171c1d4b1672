//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// The CPU performs every memory access through this trait. Implementations
/// handle address decoding and routing to the owning device.
pub trait Bus {
    /// Read a byte from the given address. Reads may have side effects on
    /// memory-mapped devices (e.g. clearing an interrupt flag).
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);

    /// Read a byte without side effects, for debuggers and disassembly.
    fn peek(&self, address: u16) -> u8;
}

/// Flat 64K RAM bus.
///
/// No devices, no mirroring. Used by CPU tests and as a scratch bus for
/// tools that only need memory.
pub struct SimpleBus {
    memory: Box<[u8; 0x10000]>,
}

impl SimpleBus {
    /// Create a bus with all memory zeroed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
        }
    }

    /// Copy `data` into memory starting at `address`, wrapping at $FFFF.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        let mut addr = address;
        for &byte in data {
            self.memory[addr as usize] = byte;
            addr = addr.wrapping_add(1);
        }
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    fn peek(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_wraps_at_top_of_memory() {
        let mut bus = SimpleBus::new();
        bus.load(0xFFFF, &[0x11, 0x22]);
        assert_eq!(bus.peek(0xFFFF), 0x11);
        assert_eq!(bus.peek(0x0000), 0x22);
    }

    #[test]
    fn read_and_peek_agree() {
        let mut bus = SimpleBus::new();
        bus.write(0x1234, 0xAB);
        assert_eq!(bus.read(0x1234), 0xAB);
        assert_eq!(bus.peek(0x1234), 0xAB);
    }
}
