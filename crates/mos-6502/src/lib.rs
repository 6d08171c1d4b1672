//! Cycle-accurate MOS 6502 CPU emulator.
//!
//! The 6502 executes one bus access per cycle. Each `tick()` advances
//! exactly one cycle. Instructions take multiple cycles, and the CPU
//! tracks its internal state between cycles.
//!
//! Every completed instruction is reported as a [`DecodedInstruction`]
//! so a front end can build a disassembly feed without re-reading memory.

mod alu;
mod cpu;
pub mod flags;
pub mod opcodes;
mod registers;

pub use cpu::{
    Completed, IRQ_VECTOR, IllegalOpcode, IllegalOpcodePolicy, Interrupt, Mos6502, NMI_VECTOR,
    Phase, RESET_VECTOR,
};
pub use flags::Status;
pub use opcodes::{AddressingMode, DecodedInstruction, Opcode, disassemble};
pub use registers::Registers;
