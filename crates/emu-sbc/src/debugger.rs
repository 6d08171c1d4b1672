//! Breakpoints and call stack tracking.
//!
//! The debugger watches completed instructions and interrupt entries. It
//! never touches board state; the clock engine consults it to decide when
//! continuous running should stop.

use std::collections::BTreeSet;

use emu_core::Bus;
use mos_6502::{Completed, Interrupt, Mos6502};

/// Deepest call stack tracked. The 6502 stack holds at most 128 return
/// addresses, so anything beyond this is a program that never returns.
const MAX_DEPTH: usize = 128;

const JSR: u8 = 0x20;
const BRK: u8 = 0x00;
const RTS: u8 = 0x60;
const RTI: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Subroutine,
    Break,
    Interrupt(Interrupt),
}

/// One entry on the tracked call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Entry point of the subroutine or handler.
    pub target: u16,
    /// Where execution resumes on return.
    pub return_address: u16,
}

#[derive(Debug, Default)]
pub struct Debugger {
    breakpoints: BTreeSet<u16>,
    call_stack: Vec<Frame>,
}

impl Debugger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the breakpoint was already set.
    pub fn add_breakpoint(&mut self, address: u16) -> bool {
        self.breakpoints.insert(address)
    }

    /// Returns false if there was no breakpoint at `address`.
    pub fn remove_breakpoint(&mut self, address: u16) -> bool {
        self.breakpoints.remove(&address)
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Breakpoints in address order.
    pub fn breakpoints(&self) -> impl Iterator<Item = u16> + '_ {
        self.breakpoints.iter().copied()
    }

    #[must_use]
    pub fn has_breakpoint(&self, address: u16) -> bool {
        self.breakpoints.contains(&address)
    }

    /// Innermost frame last.
    #[must_use]
    pub fn call_stack(&self) -> &[Frame] {
        &self.call_stack
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Forget the call stack. Breakpoints survive.
    pub fn reset(&mut self) {
        self.call_stack.clear();
    }

    /// Update the call stack after `completed` finished on `cpu`.
    pub fn observe<B: Bus + ?Sized>(&mut self, completed: Completed, cpu: &Mos6502, bus: &B) {
        match completed {
            Completed::Instruction(decoded) => match decoded.opcode {
                JSR => self.push(Frame {
                    kind: FrameKind::Subroutine,
                    target: decoded.operand_value(),
                    return_address: decoded.address.wrapping_add(3),
                }),
                BRK => self.push(Frame {
                    kind: FrameKind::Break,
                    target: cpu.regs.pc,
                    return_address: stacked_return(cpu, bus),
                }),
                RTS | RTI => {
                    self.call_stack.pop();
                }
                _ => {}
            },
            Completed::Interrupt(kind) => self.push(Frame {
                kind: FrameKind::Interrupt(kind),
                target: cpu.regs.pc,
                return_address: stacked_return(cpu, bus),
            }),
            Completed::Reset => self.call_stack.clear(),
        }
    }

    fn push(&mut self, frame: Frame) {
        if self.call_stack.len() == MAX_DEPTH {
            self.call_stack.remove(0);
        }
        self.call_stack.push(frame);
    }
}

/// Return address pushed by an interrupt sequence, just above the saved
/// status byte.
fn stacked_return<B: Bus + ?Sized>(cpu: &Mos6502, bus: &B) -> u16 {
    let s = cpu.regs.s;
    let lo = bus.peek(0x0100 | u16::from(s.wrapping_add(2)));
    let hi = bus.peek(0x0100 | u16::from(s.wrapping_add(3)));
    u16::from_le_bytes([lo, hi])
}
