//! Register file.

use std::fmt;

use crate::Status;
use crate::flags::{I, U};

/// The stack lives in page one.
const STACK_PAGE: u16 = 0x0100;

/// Programmer-visible 6502 state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer: the next free slot in page one.
    pub s: u8,
    pub pc: u16,
    pub p: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// Power-on contents. The chip leaves these undefined; zeros keep runs
    /// reproducible. S becomes $FD after the first reset sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0,
            pc: 0,
            p: Status(U | I),
        }
    }

    /// Stack address S points at.
    #[must_use]
    pub const fn stack_addr(&self) -> u16 {
        STACK_PAGE | self.s as u16
    }

    /// Slot for a push, post-decrementing S.
    pub fn push(&mut self) -> u16 {
        let slot = self.stack_addr();
        self.s = self.s.wrapping_sub(1);
        slot
    }

    /// Slot for a pull, pre-incrementing S.
    pub fn pop(&mut self) -> u16 {
        self.s = self.s.wrapping_add(1);
        self.stack_addr()
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PC=${:04X} A=${:02X} X=${:02X} Y=${:02X} S=${:02X} P={}",
            self.pc, self.a, self.x, self.y, self.s, self.p
        )
    }
}
