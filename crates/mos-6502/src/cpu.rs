//! 6502 CPU implementation.
//!
//! Cycle-accurate emulation where each `tick()` performs exactly one bus
//! access. The instruction cycle is an explicit state machine:
//!
//! ```text
//! Reset(7 cycles) -> Fetch -> Decode -> Execute(1..n) -> Fetch ...
//!                      \-> Interrupt(7 cycles) -> Fetch
//! ```
//!
//! `Decode` is the table lookup between the opcode fetch and the first
//! execute cycle. It performs no bus access of its own: the tick that
//! leaves `Decode` also runs execute cycle 1, so instruction timing matches
//! the hardware.

use emu_core::{Bus, Cpu, Observable, Value};
use thiserror::Error;

use crate::flags::{B, C, D, I, N, U, V, Z};
use crate::alu::{ModifyOp, ReadOp};
use crate::opcodes::{self, DecodedInstruction};
use crate::{Registers, Status};

/// IRQ/BRK vector.
pub const IRQ_VECTOR: u16 = 0xFFFE;
/// NMI vector.
pub const NMI_VECTOR: u16 = 0xFFFA;
/// Reset vector.
pub const RESET_VECTOR: u16 = 0xFFFC;

/// An undocumented opcode the CPU refused to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal opcode ${opcode:02X} at ${address:04X}")]
pub struct IllegalOpcode {
    pub opcode: u8,
    /// Address of the opcode byte.
    pub address: u16,
}

/// What to do when decode meets an undocumented opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IllegalOpcodePolicy {
    /// Halt and report the opcode. Reset recovers.
    #[default]
    Halt,
    /// Execute the NMOS behaviour of the undocumented opcode. JAM opcodes
    /// still halt.
    Emulate,
}

/// Interrupt source for the interrupt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Irq,
    Nmi,
}

impl Interrupt {
    #[must_use]
    pub const fn vector(self) -> u16 {
        match self {
            Self::Irq => IRQ_VECTOR,
            Self::Nmi => NMI_VECTOR,
        }
    }
}

/// Externally visible phase of the instruction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reset,
    Fetch,
    Decode,
    Execute,
    Interrupt,
    Halted,
}

impl Phase {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Fetch => "fetch",
            Self::Decode => "decode",
            Self::Execute => "execute",
            Self::Interrupt => "interrupt",
            Self::Halted => "halted",
        }
    }
}

/// A sequence that finished on the most recent tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completed {
    /// The reset sequence loaded PC from the reset vector.
    Reset,
    /// An interrupt sequence entered its handler.
    Interrupt(Interrupt),
    /// An instruction finished executing.
    Instruction(DecodedInstruction),
}

/// Internal state of the instruction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reset sequence, `cycle` 1-7.
    Reset,
    /// Next tick fetches an opcode (or starts an interrupt).
    Fetch,
    /// Opcode latched; the next tick looks it up and runs execute cycle 1.
    Decode,
    /// Executing instruction cycle `cycle`.
    Execute,
    /// Interrupt sequence, `cycle` 1-7.
    Interrupt(Interrupt),
    /// JAM or refused illegal opcode. Only reset leaves this state.
    Halted,
}

/// NMOS 6502 core, stepped one bus cycle per `tick()`.
///
/// Every cycle performs exactly the read or write the silicon does,
/// dummy accesses included, so memory-mapped devices see the same
/// traffic as on a real board.
#[derive(Debug)]
pub struct Mos6502 {
    /// CPU registers.
    pub regs: Registers,

    state: State,

    /// Opcode being executed.
    opcode: u8,

    /// Cycle within the instruction or sequence (1-based).
    cycle: u8,

    /// Effective address latch.
    addr: u16,

    /// Data latch. Also holds the page-cross flag between address cycles.
    data: u8,

    /// Zero-page pointer latch; high byte of the base address for SHx stores.
    pointer: u8,

    /// Instruction being decoded, for the disassembly feed.
    current: DecodedInstruction,

    /// Operand bytes captured so far for `current`.
    operand_count: u8,

    /// Cycles spent on `current`, including the opcode fetch.
    instr_cycles: u8,

    /// Most recently completed instruction.
    last_instruction: Option<DecodedInstruction>,

    /// Sequence completed on the most recent tick.
    completed: Option<Completed>,

    /// IRQ input level (true = asserted).
    irq_line: bool,

    /// NMI input level (true = asserted).
    nmi_line: bool,

    /// Latched NMI edge awaiting service.
    nmi_pending: bool,

    /// SYNC output: high during opcode fetch cycles.
    sync: bool,

    policy: IllegalOpcodePolicy,

    /// Why the CPU halted, if it did.
    halt: Option<IllegalOpcode>,

    /// Total cycles executed.
    total_cycles: u64,
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6502 {
    /// Power on. The reset sequence runs on the first seven ticks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            state: State::Reset,
            opcode: 0,
            cycle: 1,
            addr: 0,
            data: 0,
            pointer: 0,
            current: DecodedInstruction::new(0, 0xEA),
            operand_count: 0,
            instr_cycles: 0,
            last_instruction: None,
            completed: None,
            irq_line: false,
            nmi_line: false,
            nmi_pending: false,
            sync: false,
            policy: IllegalOpcodePolicy::Halt,
            halt: None,
            total_cycles: 0,
        }
    }

    /// Select the undocumented-opcode policy.
    pub fn set_illegal_policy(&mut self, policy: IllegalOpcodePolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn illegal_policy(&self) -> IllegalOpcodePolicy {
        self.policy
    }

    /// Force PC and abandon whatever sequence was in progress. The next
    /// tick fetches an opcode from `pc`.
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
        self.state = State::Fetch;
        self.cycle = 0;
        self.halt = None;
    }

    /// True when the next tick starts a new instruction.
    #[must_use]
    pub fn is_instruction_complete(&self) -> bool {
        self.state == State::Fetch
    }

    /// Current phase of the instruction cycle.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self.state {
            State::Reset => Phase::Reset,
            State::Fetch => Phase::Fetch,
            State::Decode => Phase::Decode,
            State::Execute => Phase::Execute,
            State::Interrupt(_) => Phase::Interrupt,
            State::Halted => Phase::Halted,
        }
    }

    /// Cycle index within the current instruction or sequence.
    #[must_use]
    pub fn cycle(&self) -> u8 {
        self.cycle
    }

    /// Sequence that finished on the most recent tick, if any.
    #[must_use]
    pub fn completed(&self) -> Option<Completed> {
        self.completed
    }

    /// Most recently completed instruction.
    #[must_use]
    pub fn last_instruction(&self) -> Option<DecodedInstruction> {
        self.last_instruction
    }

    /// SYNC output for the most recent tick.
    #[must_use]
    pub fn sync(&self) -> bool {
        self.sync
    }

    /// The illegal opcode that halted the CPU, if any.
    #[must_use]
    pub fn illegal_opcode(&self) -> Option<IllegalOpcode> {
        self.halt
    }

    /// Total cycles executed since power-on.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    #[must_use]
    pub fn irq_line(&self) -> bool {
        self.irq_line
    }

    #[must_use]
    pub fn nmi_line(&self) -> bool {
        self.nmi_line
    }

    /// Execute one CPU cycle.
    fn execute_cycle<B: Bus>(&mut self, bus: &mut B) {
        self.total_cycles += 1;
        self.completed = None;
        self.sync = false;

        match self.state {
            State::Reset => self.reset_sequence(bus),
            State::Fetch => {
                // Interrupts are sampled only at instruction boundaries
                if self.nmi_pending {
                    self.nmi_pending = false;
                    self.begin_interrupt(bus, Interrupt::Nmi);
                    return;
                }
                if self.irq_line && !self.regs.p.is_set(I) {
                    self.begin_interrupt(bus, Interrupt::Irq);
                    return;
                }

                let address = self.regs.pc;
                self.sync = true;
                self.opcode = bus.read(address);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.current = DecodedInstruction::new(address, self.opcode);
                self.operand_count = 0;
                self.instr_cycles = 1;
                self.state = State::Decode;
            }
            State::Decode => {
                self.instr_cycles += 1;
                let info = opcodes::lookup(self.opcode);
                if info.is_jam()
                    || (info.illegal && self.policy == IllegalOpcodePolicy::Halt)
                {
                    self.halt = Some(IllegalOpcode {
                        opcode: self.opcode,
                        address: self.current.address,
                    });
                    self.state = State::Halted;
                    let _ = bus.read(self.regs.pc);
                    return;
                }
                self.state = State::Execute;
                self.cycle = 1;
                self.execute_instruction(bus);
            }
            State::Execute => {
                self.instr_cycles += 1;
                self.execute_instruction(bus);
            }
            State::Interrupt(kind) => self.interrupt_sequence(bus, kind),
            State::Halted => {
                // Locked up: the address bus keeps presenting PC
                let _ = bus.read(self.regs.pc);
            }
        }
    }

    /// Reset sequence: two dummy reads, three stack reads that decrement S
    /// without writing, then the vector.
    fn reset_sequence<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 | 2 => {
                let _ = bus.read(self.regs.pc);
                self.cycle += 1;
            }
            3..=5 => {
                let _ = bus.read(self.regs.stack_addr());
                self.regs.s = self.regs.s.wrapping_sub(1);
                self.cycle += 1;
            }
            6 => {
                self.addr = u16::from(bus.read(RESET_VECTOR));
                self.regs.p.set(I);
                self.cycle = 7;
            }
            7 => {
                self.addr |= u16::from(bus.read(RESET_VECTOR + 1)) << 8;
                self.regs.pc = self.addr;
                self.state = State::Fetch;
                self.cycle = 0;
                self.completed = Some(Completed::Reset);
            }
            _ => unreachable!(),
        }
    }

    /// First cycle of an interrupt: the opcode fetch is replaced by a
    /// dummy read and PC is not incremented.
    fn begin_interrupt<B: Bus>(&mut self, bus: &mut B, kind: Interrupt) {
        let _ = bus.read(self.regs.pc);
        self.state = State::Interrupt(kind);
        self.cycle = 2;
    }

    fn interrupt_sequence<B: Bus>(&mut self, bus: &mut B, kind: Interrupt) {
        match self.cycle {
            2 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.push();
                bus.write(addr, (self.regs.pc >> 8) as u8);
                self.cycle = 4;
            }
            4 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.pc as u8);
                self.cycle = 5;
            }
            5 => {
                // Pushed copy has B clear
                let addr = self.regs.push();
                bus.write(addr, self.regs.p.to_byte_irq());
                self.cycle = 6;
            }
            6 => {
                self.addr = u16::from(bus.read(kind.vector()));
                self.regs.p.set(I);
                self.cycle = 7;
            }
            7 => {
                self.addr |= u16::from(bus.read(kind.vector() + 1)) << 8;
                self.regs.pc = self.addr;
                self.state = State::Fetch;
                self.cycle = 0;
                self.completed = Some(Completed::Interrupt(kind));
            }
            _ => unreachable!(),
        }
    }

    /// Read the next instruction byte at PC and advance PC.
    fn fetch_operand<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.latch_operand(value);
        value
    }

    /// Record an operand byte for the disassembly feed.
    fn latch_operand(&mut self, value: u8) {
        if self.operand_count + 1 < self.current.length {
            self.current.operand[usize::from(self.operand_count)] = value;
            self.operand_count += 1;
        }
    }

    /// Finish current instruction and return to opcode fetch.
    fn finish(&mut self) {
        self.state = State::Fetch;
        self.cycle = 0;
        self.current.cycles = self.instr_cycles;
        self.last_instruction = Some(self.current);
        self.completed = Some(Completed::Instruction(self.current));
    }

    /// Execute one cycle of the current instruction.
    fn execute_instruction<B: Bus>(&mut self, bus: &mut B) {
        match self.opcode {
            // BRK - 7 cycles
            0x00 => self.op_brk(bus),
            // ORA (zp,X) - 6 cycles
            0x01 => self.addr_izx(bus, Registers::ora),
            // SLO (zp,X) - 8 cycles
            0x03 => self.addr_izx_rmw(bus, Registers::slo),
            // NOP zp - 3 cycles
            0x04 | 0x44 | 0x64 => self.addr_zp(bus, Registers::nop),
            // ORA zp - 3 cycles
            0x05 => self.addr_zp(bus, Registers::ora),
            // ASL zp - 5 cycles
            0x06 => self.addr_zp_rmw(bus, Registers::asl),
            // SLO zp - 5 cycles
            0x07 => self.addr_zp_rmw(bus, Registers::slo),
            // PHP - 3 cycles
            0x08 => self.op_push(bus, |r| r.p.to_byte_brk()),
            // ORA imm - 2 cycles
            0x09 => self.addr_imm(bus, Registers::ora),
            // ASL A - 2 cycles
            0x0A => self.op_accumulator(bus, Registers::asl),
            // ANC imm - 2 cycles
            0x0B | 0x2B => self.addr_imm(bus, Registers::anc),
            // NOP abs - 4 cycles
            0x0C => self.addr_abs(bus, Registers::nop),
            // ORA abs - 4 cycles
            0x0D => self.addr_abs(bus, Registers::ora),
            // ASL abs - 6 cycles
            0x0E => self.addr_abs_rmw(bus, Registers::asl),
            // SLO abs - 6 cycles
            0x0F => self.addr_abs_rmw(bus, Registers::slo),

            // BPL rel - 2/3/4 cycles
            0x10 => self.op_branch(bus, !self.regs.p.is_set(N)),
            // ORA (zp),Y - 5/6 cycles
            0x11 => self.addr_izy(bus, Registers::ora),
            // SLO (zp),Y - 8 cycles
            0x13 => self.addr_izy_rmw(bus, Registers::slo),
            // NOP zp,X - 4 cycles
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => {
                self.addr_zpi(bus, self.regs.x, Registers::nop);
            }
            // ORA zp,X - 4 cycles
            0x15 => self.addr_zpi(bus, self.regs.x, Registers::ora),
            // ASL zp,X - 6 cycles
            0x16 => self.addr_zpx_rmw(bus, Registers::asl),
            // SLO zp,X - 6 cycles
            0x17 => self.addr_zpx_rmw(bus, Registers::slo),
            // CLC - 2 cycles
            0x18 => self.op_flag(bus, C, false),
            // ORA abs,Y - 4/5 cycles
            0x19 => self.addr_abi(bus, self.regs.y, Registers::ora),
            // NOP - 2 cycles
            0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xEA | 0xFA => self.op_implied(bus, |_| {}),
            // SLO abs,Y - 7 cycles
            0x1B => self.addr_abi_rmw(bus, self.regs.y, Registers::slo),
            // NOP abs,X - 4/5 cycles
            0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => {
                self.addr_abi(bus, self.regs.x, Registers::nop);
            }
            // ORA abs,X - 4/5 cycles
            0x1D => self.addr_abi(bus, self.regs.x, Registers::ora),
            // ASL abs,X - 7 cycles
            0x1E => self.addr_abi_rmw(bus, self.regs.x, Registers::asl),
            // SLO abs,X - 7 cycles
            0x1F => self.addr_abi_rmw(bus, self.regs.x, Registers::slo),

            // JSR abs - 6 cycles
            0x20 => self.op_jsr(bus),
            // AND (zp,X) - 6 cycles
            0x21 => self.addr_izx(bus, Registers::and),
            // RLA (zp,X) - 8 cycles
            0x23 => self.addr_izx_rmw(bus, Registers::rla),
            // BIT zp - 3 cycles
            0x24 => self.addr_zp(bus, Registers::bit),
            // AND zp - 3 cycles
            0x25 => self.addr_zp(bus, Registers::and),
            // ROL zp - 5 cycles
            0x26 => self.addr_zp_rmw(bus, Registers::rol),
            // RLA zp - 5 cycles
            0x27 => self.addr_zp_rmw(bus, Registers::rla),
            // PLP - 4 cycles
            0x28 => self.op_pull(bus, |r, v| r.p = Status::from_byte(v)),
            // AND imm - 2 cycles
            0x29 => self.addr_imm(bus, Registers::and),
            // ROL A - 2 cycles
            0x2A => self.op_accumulator(bus, Registers::rol),
            // BIT abs - 4 cycles
            0x2C => self.addr_abs(bus, Registers::bit),
            // AND abs - 4 cycles
            0x2D => self.addr_abs(bus, Registers::and),
            // ROL abs - 6 cycles
            0x2E => self.addr_abs_rmw(bus, Registers::rol),
            // RLA abs - 6 cycles
            0x2F => self.addr_abs_rmw(bus, Registers::rla),

            // BMI rel - 2/3/4 cycles
            0x30 => self.op_branch(bus, self.regs.p.is_set(N)),
            // AND (zp),Y - 5/6 cycles
            0x31 => self.addr_izy(bus, Registers::and),
            // RLA (zp),Y - 8 cycles
            0x33 => self.addr_izy_rmw(bus, Registers::rla),
            // AND zp,X - 4 cycles
            0x35 => self.addr_zpi(bus, self.regs.x, Registers::and),
            // ROL zp,X - 6 cycles
            0x36 => self.addr_zpx_rmw(bus, Registers::rol),
            // RLA zp,X - 6 cycles
            0x37 => self.addr_zpx_rmw(bus, Registers::rla),
            // SEC - 2 cycles
            0x38 => self.op_flag(bus, C, true),
            // AND abs,Y - 4/5 cycles
            0x39 => self.addr_abi(bus, self.regs.y, Registers::and),
            // RLA abs,Y - 7 cycles
            0x3B => self.addr_abi_rmw(bus, self.regs.y, Registers::rla),
            // AND abs,X - 4/5 cycles
            0x3D => self.addr_abi(bus, self.regs.x, Registers::and),
            // ROL abs,X - 7 cycles
            0x3E => self.addr_abi_rmw(bus, self.regs.x, Registers::rol),
            // RLA abs,X - 7 cycles
            0x3F => self.addr_abi_rmw(bus, self.regs.x, Registers::rla),

            // RTI - 6 cycles
            0x40 => self.op_rti(bus),
            // EOR (zp,X) - 6 cycles
            0x41 => self.addr_izx(bus, Registers::eor),
            // SRE (zp,X) - 8 cycles
            0x43 => self.addr_izx_rmw(bus, Registers::sre),
            // EOR zp - 3 cycles
            0x45 => self.addr_zp(bus, Registers::eor),
            // LSR zp - 5 cycles
            0x46 => self.addr_zp_rmw(bus, Registers::lsr),
            // SRE zp - 5 cycles
            0x47 => self.addr_zp_rmw(bus, Registers::sre),
            // PHA - 3 cycles
            0x48 => self.op_push(bus, |r| r.a),
            // EOR imm - 2 cycles
            0x49 => self.addr_imm(bus, Registers::eor),
            // LSR A - 2 cycles
            0x4A => self.op_accumulator(bus, Registers::lsr),
            // ALR imm - 2 cycles
            0x4B => self.addr_imm(bus, Registers::alr),
            // JMP abs - 3 cycles
            0x4C => self.op_jmp_abs(bus),
            // EOR abs - 4 cycles
            0x4D => self.addr_abs(bus, Registers::eor),
            // LSR abs - 6 cycles
            0x4E => self.addr_abs_rmw(bus, Registers::lsr),
            // SRE abs - 6 cycles
            0x4F => self.addr_abs_rmw(bus, Registers::sre),

            // BVC rel - 2/3/4 cycles
            0x50 => self.op_branch(bus, !self.regs.p.is_set(V)),
            // EOR (zp),Y - 5/6 cycles
            0x51 => self.addr_izy(bus, Registers::eor),
            // SRE (zp),Y - 8 cycles
            0x53 => self.addr_izy_rmw(bus, Registers::sre),
            // EOR zp,X - 4 cycles
            0x55 => self.addr_zpi(bus, self.regs.x, Registers::eor),
            // LSR zp,X - 6 cycles
            0x56 => self.addr_zpx_rmw(bus, Registers::lsr),
            // SRE zp,X - 6 cycles
            0x57 => self.addr_zpx_rmw(bus, Registers::sre),
            // CLI - 2 cycles
            0x58 => self.op_flag(bus, I, false),
            // EOR abs,Y - 4/5 cycles
            0x59 => self.addr_abi(bus, self.regs.y, Registers::eor),
            // SRE abs,Y - 7 cycles
            0x5B => self.addr_abi_rmw(bus, self.regs.y, Registers::sre),
            // EOR abs,X - 4/5 cycles
            0x5D => self.addr_abi(bus, self.regs.x, Registers::eor),
            // LSR abs,X - 7 cycles
            0x5E => self.addr_abi_rmw(bus, self.regs.x, Registers::lsr),
            // SRE abs,X - 7 cycles
            0x5F => self.addr_abi_rmw(bus, self.regs.x, Registers::sre),

            // RTS - 6 cycles
            0x60 => self.op_rts(bus),
            // ADC (zp,X) - 6 cycles
            0x61 => self.addr_izx(bus, Registers::adc),
            // RRA (zp,X) - 8 cycles
            0x63 => self.addr_izx_rmw(bus, Registers::rra),
            // ADC zp - 3 cycles
            0x65 => self.addr_zp(bus, Registers::adc),
            // ROR zp - 5 cycles
            0x66 => self.addr_zp_rmw(bus, Registers::ror),
            // RRA zp - 5 cycles
            0x67 => self.addr_zp_rmw(bus, Registers::rra),
            // PLA - 4 cycles
            0x68 => self.op_pull(bus, Registers::lda),
            // ADC imm - 2 cycles
            0x69 => self.addr_imm(bus, Registers::adc),
            // ROR A - 2 cycles
            0x6A => self.op_accumulator(bus, Registers::ror),
            // ARR imm - 2 cycles
            0x6B => self.addr_imm(bus, Registers::arr),
            // JMP (ind) - 5 cycles
            0x6C => self.op_jmp_ind(bus),
            // ADC abs - 4 cycles
            0x6D => self.addr_abs(bus, Registers::adc),
            // ROR abs - 6 cycles
            0x6E => self.addr_abs_rmw(bus, Registers::ror),
            // RRA abs - 6 cycles
            0x6F => self.addr_abs_rmw(bus, Registers::rra),

            // BVS rel - 2/3/4 cycles
            0x70 => self.op_branch(bus, self.regs.p.is_set(V)),
            // ADC (zp),Y - 5/6 cycles
            0x71 => self.addr_izy(bus, Registers::adc),
            // RRA (zp),Y - 8 cycles
            0x73 => self.addr_izy_rmw(bus, Registers::rra),
            // ADC zp,X - 4 cycles
            0x75 => self.addr_zpi(bus, self.regs.x, Registers::adc),
            // ROR zp,X - 6 cycles
            0x76 => self.addr_zpx_rmw(bus, Registers::ror),
            // RRA zp,X - 6 cycles
            0x77 => self.addr_zpx_rmw(bus, Registers::rra),
            // SEI - 2 cycles
            0x78 => self.op_flag(bus, I, true),
            // ADC abs,Y - 4/5 cycles
            0x79 => self.addr_abi(bus, self.regs.y, Registers::adc),
            // RRA abs,Y - 7 cycles
            0x7B => self.addr_abi_rmw(bus, self.regs.y, Registers::rra),
            // ADC abs,X - 4/5 cycles
            0x7D => self.addr_abi(bus, self.regs.x, Registers::adc),
            // ROR abs,X - 7 cycles
            0x7E => self.addr_abi_rmw(bus, self.regs.x, Registers::ror),
            // RRA abs,X - 7 cycles
            0x7F => self.addr_abi_rmw(bus, self.regs.x, Registers::rra),

            // NOP imm - 2 cycles
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => self.addr_imm(bus, Registers::nop),
            // STA (zp,X) - 6 cycles
            0x81 => self.addr_izx_w(bus, |r| r.a),
            // SAX (zp,X) - 6 cycles
            0x83 => self.addr_izx_w(bus, |r| r.a & r.x),
            // STY zp - 3 cycles
            0x84 => self.addr_zp_w(bus, |r| r.y),
            // STA zp - 3 cycles
            0x85 => self.addr_zp_w(bus, |r| r.a),
            // STX zp - 3 cycles
            0x86 => self.addr_zp_w(bus, |r| r.x),
            // SAX zp - 3 cycles
            0x87 => self.addr_zp_w(bus, |r| r.a & r.x),
            // DEY - 2 cycles
            0x88 => self.op_implied(bus, |r| {
                r.y = r.y.wrapping_sub(1);
                r.p.update_nz(r.y);
            }),
            // TXA - 2 cycles
            0x8A => self.op_implied(bus, |r| {
                r.a = r.x;
                r.p.update_nz(r.a);
            }),
            // ANE imm - 2 cycles
            0x8B => self.addr_imm(bus, Registers::ane),
            // STY abs - 4 cycles
            0x8C => self.addr_abs_w(bus, |r| r.y),
            // STA abs - 4 cycles
            0x8D => self.addr_abs_w(bus, |r| r.a),
            // STX abs - 4 cycles
            0x8E => self.addr_abs_w(bus, |r| r.x),
            // SAX abs - 4 cycles
            0x8F => self.addr_abs_w(bus, |r| r.a & r.x),

            // BCC rel - 2/3/4 cycles
            0x90 => self.op_branch(bus, !self.regs.p.is_set(C)),
            // STA (zp),Y - 6 cycles
            0x91 => self.addr_izy_w(bus, |r| r.a),
            // SHA (zp),Y - 6 cycles
            0x93 => self.addr_izy_sh(bus, |r, hi| r.a & r.x & hi),
            // STY zp,X - 4 cycles
            0x94 => self.addr_zpi_w(bus, self.regs.x, |r| r.y),
            // STA zp,X - 4 cycles
            0x95 => self.addr_zpi_w(bus, self.regs.x, |r| r.a),
            // STX zp,Y - 4 cycles
            0x96 => self.addr_zpi_w(bus, self.regs.y, |r| r.x),
            // SAX zp,Y - 4 cycles
            0x97 => self.addr_zpi_w(bus, self.regs.y, |r| r.a & r.x),
            // TYA - 2 cycles
            0x98 => self.op_implied(bus, |r| {
                r.a = r.y;
                r.p.update_nz(r.a);
            }),
            // STA abs,Y - 5 cycles
            0x99 => self.addr_abi_w(bus, self.regs.y, |r| r.a),
            // TXS - 2 cycles (no flags)
            0x9A => self.op_implied(bus, |r| r.s = r.x),
            // TAS abs,Y - 5 cycles
            0x9B => self.addr_abi_sh(bus, self.regs.y, |r, hi| {
                r.s = r.a & r.x;
                r.s & hi
            }),
            // SHY abs,X - 5 cycles
            0x9C => self.addr_abi_sh(bus, self.regs.x, |r, hi| r.y & hi),
            // STA abs,X - 5 cycles
            0x9D => self.addr_abi_w(bus, self.regs.x, |r| r.a),
            // SHX abs,Y - 5 cycles
            0x9E => self.addr_abi_sh(bus, self.regs.y, |r, hi| r.x & hi),
            // SHA abs,Y - 5 cycles
            0x9F => self.addr_abi_sh(bus, self.regs.y, |r, hi| {
                r.a & r.x & hi
            }),

            // LDY imm - 2 cycles
            0xA0 => self.addr_imm(bus, Registers::ldy),
            // LDA (zp,X) - 6 cycles
            0xA1 => self.addr_izx(bus, Registers::lda),
            // LDX imm - 2 cycles
            0xA2 => self.addr_imm(bus, Registers::ldx),
            // LAX (zp,X) - 6 cycles
            0xA3 => self.addr_izx(bus, Registers::lax),
            // LDY zp - 3 cycles
            0xA4 => self.addr_zp(bus, Registers::ldy),
            // LDA zp - 3 cycles
            0xA5 => self.addr_zp(bus, Registers::lda),
            // LDX zp - 3 cycles
            0xA6 => self.addr_zp(bus, Registers::ldx),
            // LAX zp - 3 cycles
            0xA7 => self.addr_zp(bus, Registers::lax),
            // TAY - 2 cycles
            0xA8 => self.op_implied(bus, |r| {
                r.y = r.a;
                r.p.update_nz(r.y);
            }),
            // LDA imm - 2 cycles
            0xA9 => self.addr_imm(bus, Registers::lda),
            // TAX - 2 cycles
            0xAA => self.op_implied(bus, |r| {
                r.x = r.a;
                r.p.update_nz(r.x);
            }),
            // LXA imm - 2 cycles
            0xAB => self.addr_imm(bus, Registers::lxa),
            // LDY abs - 4 cycles
            0xAC => self.addr_abs(bus, Registers::ldy),
            // LDA abs - 4 cycles
            0xAD => self.addr_abs(bus, Registers::lda),
            // LDX abs - 4 cycles
            0xAE => self.addr_abs(bus, Registers::ldx),
            // LAX abs - 4 cycles
            0xAF => self.addr_abs(bus, Registers::lax),

            // BCS rel - 2/3/4 cycles
            0xB0 => self.op_branch(bus, self.regs.p.is_set(C)),
            // LDA (zp),Y - 5/6 cycles
            0xB1 => self.addr_izy(bus, Registers::lda),
            // LAX (zp),Y - 5/6 cycles
            0xB3 => self.addr_izy(bus, Registers::lax),
            // LDY zp,X - 4 cycles
            0xB4 => self.addr_zpi(bus, self.regs.x, Registers::ldy),
            // LDA zp,X - 4 cycles
            0xB5 => self.addr_zpi(bus, self.regs.x, Registers::lda),
            // LDX zp,Y - 4 cycles
            0xB6 => self.addr_zpi(bus, self.regs.y, Registers::ldx),
            // LAX zp,Y - 4 cycles
            0xB7 => self.addr_zpi(bus, self.regs.y, Registers::lax),
            // CLV - 2 cycles
            0xB8 => self.op_flag(bus, V, false),
            // LDA abs,Y - 4/5 cycles
            0xB9 => self.addr_abi(bus, self.regs.y, Registers::lda),
            // TSX - 2 cycles
            0xBA => self.op_implied(bus, |r| {
                r.x = r.s;
                r.p.update_nz(r.x);
            }),
            // LAS abs,Y - 4/5 cycles
            0xBB => self.addr_abi(bus, self.regs.y, Registers::las),
            // LDY abs,X - 4/5 cycles
            0xBC => self.addr_abi(bus, self.regs.x, Registers::ldy),
            // LDA abs,X - 4/5 cycles
            0xBD => self.addr_abi(bus, self.regs.x, Registers::lda),
            // LDX abs,Y - 4/5 cycles
            0xBE => self.addr_abi(bus, self.regs.y, Registers::ldx),
            // LAX abs,Y - 4/5 cycles
            0xBF => self.addr_abi(bus, self.regs.y, Registers::lax),

            // CPY imm - 2 cycles
            0xC0 => self.addr_imm(bus, Registers::cpy),
            // CMP (zp,X) - 6 cycles
            0xC1 => self.addr_izx(bus, Registers::cmp),
            // DCP (zp,X) - 8 cycles
            0xC3 => self.addr_izx_rmw(bus, Registers::dcp),
            // CPY zp - 3 cycles
            0xC4 => self.addr_zp(bus, Registers::cpy),
            // CMP zp - 3 cycles
            0xC5 => self.addr_zp(bus, Registers::cmp),
            // DEC zp - 5 cycles
            0xC6 => self.addr_zp_rmw(bus, Registers::dec),
            // DCP zp - 5 cycles
            0xC7 => self.addr_zp_rmw(bus, Registers::dcp),
            // INY - 2 cycles
            0xC8 => self.op_implied(bus, |r| {
                r.y = r.y.wrapping_add(1);
                r.p.update_nz(r.y);
            }),
            // CMP imm - 2 cycles
            0xC9 => self.addr_imm(bus, Registers::cmp),
            // DEX - 2 cycles
            0xCA => self.op_implied(bus, |r| {
                r.x = r.x.wrapping_sub(1);
                r.p.update_nz(r.x);
            }),
            // SBX imm - 2 cycles
            0xCB => self.addr_imm(bus, Registers::sbx),
            // CPY abs - 4 cycles
            0xCC => self.addr_abs(bus, Registers::cpy),
            // CMP abs - 4 cycles
            0xCD => self.addr_abs(bus, Registers::cmp),
            // DEC abs - 6 cycles
            0xCE => self.addr_abs_rmw(bus, Registers::dec),
            // DCP abs - 6 cycles
            0xCF => self.addr_abs_rmw(bus, Registers::dcp),

            // BNE rel - 2/3/4 cycles
            0xD0 => self.op_branch(bus, !self.regs.p.is_set(Z)),
            // CMP (zp),Y - 5/6 cycles
            0xD1 => self.addr_izy(bus, Registers::cmp),
            // DCP (zp),Y - 8 cycles
            0xD3 => self.addr_izy_rmw(bus, Registers::dcp),
            // CMP zp,X - 4 cycles
            0xD5 => self.addr_zpi(bus, self.regs.x, Registers::cmp),
            // DEC zp,X - 6 cycles
            0xD6 => self.addr_zpx_rmw(bus, Registers::dec),
            // DCP zp,X - 6 cycles
            0xD7 => self.addr_zpx_rmw(bus, Registers::dcp),
            // CLD - 2 cycles
            0xD8 => self.op_flag(bus, D, false),
            // CMP abs,Y - 4/5 cycles
            0xD9 => self.addr_abi(bus, self.regs.y, Registers::cmp),
            // DCP abs,Y - 7 cycles
            0xDB => self.addr_abi_rmw(bus, self.regs.y, Registers::dcp),
            // CMP abs,X - 4/5 cycles
            0xDD => self.addr_abi(bus, self.regs.x, Registers::cmp),
            // DEC abs,X - 7 cycles
            0xDE => self.addr_abi_rmw(bus, self.regs.x, Registers::dec),
            // DCP abs,X - 7 cycles
            0xDF => self.addr_abi_rmw(bus, self.regs.x, Registers::dcp),

            // CPX imm - 2 cycles
            0xE0 => self.addr_imm(bus, Registers::cpx),
            // SBC (zp,X) - 6 cycles
            0xE1 => self.addr_izx(bus, Registers::sbc),
            // ISC (zp,X) - 8 cycles
            0xE3 => self.addr_izx_rmw(bus, Registers::isc),
            // CPX zp - 3 cycles
            0xE4 => self.addr_zp(bus, Registers::cpx),
            // SBC zp - 3 cycles
            0xE5 => self.addr_zp(bus, Registers::sbc),
            // INC zp - 5 cycles
            0xE6 => self.addr_zp_rmw(bus, Registers::inc),
            // ISC zp - 5 cycles
            0xE7 => self.addr_zp_rmw(bus, Registers::isc),
            // INX - 2 cycles
            0xE8 => self.op_implied(bus, |r| {
                r.x = r.x.wrapping_add(1);
                r.p.update_nz(r.x);
            }),
            // SBC imm - 2 cycles (USBC $EB is identical)
            0xE9 | 0xEB => self.addr_imm(bus, Registers::sbc),
            // CPX abs - 4 cycles
            0xEC => self.addr_abs(bus, Registers::cpx),
            // SBC abs - 4 cycles
            0xED => self.addr_abs(bus, Registers::sbc),
            // INC abs - 6 cycles
            0xEE => self.addr_abs_rmw(bus, Registers::inc),
            // ISC abs - 6 cycles
            0xEF => self.addr_abs_rmw(bus, Registers::isc),

            // BEQ rel - 2/3/4 cycles
            0xF0 => self.op_branch(bus, self.regs.p.is_set(Z)),
            // SBC (zp),Y - 5/6 cycles
            0xF1 => self.addr_izy(bus, Registers::sbc),
            // ISC (zp),Y - 8 cycles
            0xF3 => self.addr_izy_rmw(bus, Registers::isc),
            // SBC zp,X - 4 cycles
            0xF5 => self.addr_zpi(bus, self.regs.x, Registers::sbc),
            // INC zp,X - 6 cycles
            0xF6 => self.addr_zpx_rmw(bus, Registers::inc),
            // ISC zp,X - 6 cycles
            0xF7 => self.addr_zpx_rmw(bus, Registers::isc),
            // SED - 2 cycles
            0xF8 => self.op_flag(bus, D, true),
            // SBC abs,Y - 4/5 cycles
            0xF9 => self.addr_abi(bus, self.regs.y, Registers::sbc),
            // ISC abs,Y - 7 cycles
            0xFB => self.addr_abi_rmw(bus, self.regs.y, Registers::isc),
            // SBC abs,X - 4/5 cycles
            0xFD => self.addr_abi(bus, self.regs.x, Registers::sbc),
            // INC abs,X - 7 cycles
            0xFE => self.addr_abi_rmw(bus, self.regs.x, Registers::inc),
            // ISC abs,X - 7 cycles
            0xFF => self.addr_abi_rmw(bus, self.regs.x, Registers::isc),

            // JAM opcodes never reach execute; decode halts on them
            _ => unreachable!("opcode ${:02X} dispatched after decode", self.opcode),
        }
    }

    // ========================================================================
    // Addressing mode helpers - read operations
    // ========================================================================

    /// Final cycle of every read: fetch the operand and apply `op`.
    fn read_and_apply<B: Bus>(&mut self, bus: &mut B, op: ReadOp) {
        self.data = bus.read(self.addr);
        op(&mut self.regs, self.data);
        self.finish();
    }

    /// Immediate addressing: operand is next byte.
    fn addr_imm<B: Bus>(&mut self, bus: &mut B, op: ReadOp) {
        if self.cycle == 1 {
            self.data = self.fetch_operand(bus);
            op(&mut self.regs, self.data);
            self.finish();
        }
    }

    /// Zero page addressing.
    fn addr_zp<B: Bus>(&mut self, bus: &mut B, op: ReadOp) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => self.read_and_apply(bus, op),
            _ => unreachable!(),
        }
    }

    /// Zero page indexed by X or Y (wraps within page zero).
    fn addr_zpi<B: Bus>(&mut self, bus: &mut B, index: u8, op: ReadOp) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch_operand(bus);
                self.cycle = 2;
            }
            2 => {
                // Dummy read while adding the index
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            3 => self.read_and_apply(bus, op),
            _ => unreachable!(),
        }
    }

    /// Absolute addressing.
    fn addr_abs<B: Bus>(&mut self, bus: &mut B, op: ReadOp) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch_operand(bus)) << 8;
                self.cycle = 3;
            }
            3 => self.read_and_apply(bus, op),
            _ => unreachable!(),
        }
    }

    /// Cycle 2 of absolute indexed modes: fetch the high byte, add the
    /// index to the low byte only and remember whether a carry is owed.
    fn abs_indexed_high<B: Bus>(&mut self, bus: &mut B, index: u8) {
        let hi = self.fetch_operand(bus);
        let lo = (self.addr as u8).wrapping_add(index);
        self.pointer = hi;
        self.addr = u16::from(lo) | (u16::from(hi) << 8);
        self.data = u8::from(lo < index);
    }

    /// Absolute indexed read with page crossing penalty.
    fn addr_abi<B: Bus>(&mut self, bus: &mut B, index: u8, op: ReadOp) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => {
                self.abs_indexed_high(bus, index);
                self.cycle = 3;
            }
            3 => {
                if self.data != 0 {
                    // Page crossed - read from the unfixed address, then fix
                    let _ = bus.read(self.addr);
                    self.addr = self.addr.wrapping_add(0x100);
                    self.cycle = 4;
                } else {
                    self.read_and_apply(bus, op);
                }
            }
            4 => self.read_and_apply(bus, op),
            _ => unreachable!(),
        }
    }

    /// Indexed indirect (zp,X) addressing.
    fn addr_izx<B: Bus>(&mut self, bus: &mut B, op: ReadOp) {
        if self.izx_address(bus) {
            self.read_and_apply(bus, op);
        }
    }

    /// Cycles 1-4 of (zp,X). Returns true on cycle 5, when `addr` holds
    /// the effective address and the caller performs its access.
    fn izx_address<B: Bus>(&mut self, bus: &mut B) -> bool {
        match self.cycle {
            1 => {
                self.pointer = self.fetch_operand(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.pointer = self.pointer.wrapping_add(self.regs.x);
                self.cycle = 3;
            }
            3 => {
                self.addr = u16::from(bus.read(u16::from(self.pointer)));
                self.cycle = 4;
            }
            4 => {
                // High byte wraps within page zero
                self.addr |= u16::from(bus.read(u16::from(self.pointer.wrapping_add(1)))) << 8;
                self.cycle = 5;
            }
            _ => return true,
        }
        false
    }

    /// Cycles 1-3 of (zp),Y: pointer, base low, base high + index.
    fn izy_base<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch_operand(bus);
                self.cycle = 2;
            }
            2 => {
                self.addr = u16::from(bus.read(u16::from(self.pointer)));
                self.cycle = 3;
            }
            3 => {
                let hi = bus.read(u16::from(self.pointer.wrapping_add(1)));
                let lo = (self.addr as u8).wrapping_add(self.regs.y);
                self.pointer = hi;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.data = u8::from(lo < self.regs.y);
                self.cycle = 4;
            }
            _ => unreachable!(),
        }
    }

    /// Indirect indexed (zp),Y read with page crossing penalty.
    fn addr_izy<B: Bus>(&mut self, bus: &mut B, op: ReadOp) {
        match self.cycle {
            1..=3 => self.izy_base(bus),
            4 => {
                if self.data != 0 {
                    let _ = bus.read(self.addr);
                    self.addr = self.addr.wrapping_add(0x100);
                    self.cycle = 5;
                } else {
                    self.read_and_apply(bus, op);
                }
            }
            5 => self.read_and_apply(bus, op),
            _ => unreachable!(),
        }
    }

    // ========================================================================
    // Addressing mode helpers - write operations
    // ========================================================================

    fn write_value<B: Bus>(&mut self, bus: &mut B, val: fn(&Registers) -> u8) {
        bus.write(self.addr, val(&self.regs));
        self.finish();
    }

    /// Zero page write.
    fn addr_zp_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Registers) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => self.write_value(bus, val),
            _ => unreachable!(),
        }
    }

    /// Zero page indexed write.
    fn addr_zpi_w<B: Bus>(&mut self, bus: &mut B, index: u8, val: fn(&Registers) -> u8) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch_operand(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            3 => self.write_value(bus, val),
            _ => unreachable!(),
        }
    }

    /// Absolute write.
    fn addr_abs_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Registers) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch_operand(bus)) << 8;
                self.cycle = 3;
            }
            3 => self.write_value(bus, val),
            _ => unreachable!(),
        }
    }

    /// Absolute indexed write (always 5 cycles).
    fn addr_abi_w<B: Bus>(&mut self, bus: &mut B, index: u8, val: fn(&Registers) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => {
                self.abs_indexed_high(bus, index);
                self.cycle = 3;
            }
            3 => {
                // Writes always spend the fix-up cycle
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 4;
            }
            4 => self.write_value(bus, val),
            _ => unreachable!(),
        }
    }

    /// Indexed indirect (zp,X) write.
    fn addr_izx_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Registers) -> u8) {
        if self.izx_address(bus) {
            self.write_value(bus, val);
        }
    }

    /// Indirect indexed (zp),Y write (always 6 cycles).
    fn addr_izy_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Registers) -> u8) {
        match self.cycle {
            1..=3 => self.izy_base(bus),
            4 => {
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 5;
            }
            5 => self.write_value(bus, val),
            _ => unreachable!(),
        }
    }

    /// SHA/SHX/SHY/TAS store: the value is ANDed with the base high byte
    /// plus one, and on a page cross that value also replaces the high byte
    /// of the target address.
    fn store_sh<B: Bus>(&mut self, bus: &mut B, val: ModifyOp) {
        let value = val(&mut self.regs, self.pointer.wrapping_add(1));
        if self.data != 0 {
            self.addr = (self.addr & 0x00FF) | (u16::from(value) << 8);
        }
        bus.write(self.addr, value);
        self.finish();
    }

    fn addr_abi_sh<B: Bus>(&mut self, bus: &mut B, index: u8, val: ModifyOp) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => {
                self.abs_indexed_high(bus, index);
                self.cycle = 3;
            }
            3 => {
                let _ = bus.read(self.addr);
                self.cycle = 4;
            }
            4 => self.store_sh(bus, val),
            _ => unreachable!(),
        }
    }

    fn addr_izy_sh<B: Bus>(&mut self, bus: &mut B, val: ModifyOp) {
        match self.cycle {
            1..=3 => self.izy_base(bus),
            4 => {
                let _ = bus.read(self.addr);
                self.cycle = 5;
            }
            5 => self.store_sh(bus, val),
            _ => unreachable!(),
        }
    }

    // ========================================================================
    // Addressing mode helpers - read-modify-write operations
    // ========================================================================

    /// The three data cycles shared by every read-modify-write: read,
    /// write the unmodified value back, write the result. `first` is the
    /// cycle number of the read.
    fn rmw_data<B: Bus>(&mut self, bus: &mut B, first: u8, op: ModifyOp) {
        match self.cycle - first {
            0 => {
                self.data = bus.read(self.addr);
                self.cycle += 1;
            }
            1 => {
                bus.write(self.addr, self.data);
                self.data = op(&mut self.regs, self.data);
                self.cycle += 1;
            }
            2 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Zero page read-modify-write.
    fn addr_zp_rmw<B: Bus>(&mut self, bus: &mut B, op: ModifyOp) {
        if self.cycle == 1 {
            self.addr = u16::from(self.fetch_operand(bus));
            self.cycle = 2;
        } else {
            self.rmw_data(bus, 2, op);
        }
    }

    /// Zero page,X read-modify-write.
    fn addr_zpx_rmw<B: Bus>(&mut self, bus: &mut B, op: ModifyOp) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch_operand(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(self.regs.x));
                self.cycle = 3;
            }
            _ => self.rmw_data(bus, 3, op),
        }
    }

    /// Absolute read-modify-write.
    fn addr_abs_rmw<B: Bus>(&mut self, bus: &mut B, op: ModifyOp) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch_operand(bus)) << 8;
                self.cycle = 3;
            }
            _ => self.rmw_data(bus, 3, op),
        }
    }

    /// Absolute indexed read-modify-write (always 7 cycles).
    fn addr_abi_rmw<B: Bus>(&mut self, bus: &mut B, index: u8, op: ModifyOp) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch_operand(bus));
                self.cycle = 2;
            }
            2 => {
                self.abs_indexed_high(bus, index);
                self.cycle = 3;
            }
            3 => {
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 4;
            }
            _ => self.rmw_data(bus, 4, op),
        }
    }

    /// Indexed indirect (zp,X) read-modify-write (8 cycles).
    fn addr_izx_rmw<B: Bus>(&mut self, bus: &mut B, op: ModifyOp) {
        if self.cycle < 5 {
            let _ = self.izx_address(bus);
        } else {
            self.rmw_data(bus, 5, op);
        }
    }

    /// Indirect indexed (zp),Y read-modify-write (8 cycles).
    fn addr_izy_rmw<B: Bus>(&mut self, bus: &mut B, op: ModifyOp) {
        match self.cycle {
            1..=3 => self.izy_base(bus),
            4 => {
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 5;
            }
            _ => self.rmw_data(bus, 5, op),
        }
    }

    // ========================================================================
    // Control flow and stack
    // ========================================================================

    /// Discarded read of the byte after the opcode, as every one-byte
    /// instruction does on its second cycle.
    fn dummy_read_pc<B: Bus>(&mut self, bus: &mut B) {
        let _ = bus.read(self.regs.pc);
    }

    /// Discarded read at S while the CPU adjusts the pointer.
    fn dummy_read_stack<B: Bus>(&mut self, bus: &mut B) {
        let _ = bus.read(self.regs.stack_addr());
    }

    fn push_byte<B: Bus>(&mut self, bus: &mut B, value: u8) {
        let slot = self.regs.push();
        bus.write(slot, value);
    }

    fn pull_byte<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let slot = self.regs.pop();
        bus.read(slot)
    }

    fn op_brk<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                // Signature byte: skipped, but PC moves past it
                let _ = self.fetch_operand(bus);
            }
            2 => self.push_byte(bus, (self.regs.pc >> 8) as u8),
            3 => self.push_byte(bus, self.regs.pc as u8),
            4 => self.push_byte(bus, self.regs.p.to_byte_brk()),
            5 => {
                self.addr = u16::from(bus.read(IRQ_VECTOR));
                self.regs.p.set(I);
            }
            6 => {
                self.regs.pc = self.addr | u16::from(bus.read(IRQ_VECTOR + 1)) << 8;
                return self.finish();
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_rti<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => self.dummy_read_pc(bus),
            2 => self.dummy_read_stack(bus),
            3 => self.regs.p = Status::from_byte(self.pull_byte(bus)),
            4 => self.addr = u16::from(self.pull_byte(bus)),
            5 => {
                self.regs.pc = self.addr | u16::from(self.pull_byte(bus)) << 8;
                return self.finish();
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_rts<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => self.dummy_read_pc(bus),
            2 => self.dummy_read_stack(bus),
            3 => self.addr = u16::from(self.pull_byte(bus)),
            4 => self.addr |= u16::from(self.pull_byte(bus)) << 8,
            5 => {
                // JSR pushed the address of its own last byte
                let _ = bus.read(self.addr);
                self.regs.pc = self.addr.wrapping_add(1);
                return self.finish();
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_jsr<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => self.addr = u16::from(self.fetch_operand(bus)),
            2 => self.dummy_read_stack(bus),
            3 => self.push_byte(bus, (self.regs.pc >> 8) as u8),
            4 => self.push_byte(bus, self.regs.pc as u8),
            5 => {
                // Target high byte arrives after the pushes, with PC left
                // pointing at it
                let hi = bus.read(self.regs.pc);
                self.latch_operand(hi);
                self.regs.pc = self.addr | u16::from(hi) << 8;
                return self.finish();
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_jmp_abs<B: Bus>(&mut self, bus: &mut B) {
        if self.cycle == 1 {
            self.addr = u16::from(self.fetch_operand(bus));
            self.cycle = 2;
        } else {
            self.regs.pc = self.addr | u16::from(self.fetch_operand(bus)) << 8;
            self.finish();
        }
    }

    fn op_jmp_ind<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => self.addr = u16::from(self.fetch_operand(bus)),
            2 => self.addr |= u16::from(self.fetch_operand(bus)) << 8,
            3 => self.data = bus.read(self.addr),
            4 => {
                // The pointer's high byte never carries into the next page
                let [lo, page] = self.addr.to_le_bytes();
                let hi = bus.read(u16::from_le_bytes([lo.wrapping_add(1), page]));
                self.regs.pc = u16::from_le_bytes([self.data, hi]);
                return self.finish();
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    /// Relative branch: 2 cycles not taken, 3 taken, 4 taken across a page.
    fn op_branch<B: Bus>(&mut self, bus: &mut B, taken: bool) {
        match self.cycle {
            1 => {
                self.data = self.fetch_operand(bus);
                if !taken {
                    return self.finish();
                }
            }
            2 => {
                self.dummy_read_pc(bus);
                let target = self.regs.pc.wrapping_add_signed(i16::from(self.data as i8));
                if target >> 8 == self.regs.pc >> 8 {
                    self.regs.pc = target;
                    return self.finish();
                }
                self.addr = target;
            }
            3 => {
                // PCL already moved; this read uses the stale PCH
                let _ = bus.read((self.regs.pc & 0xFF00) | (self.addr & 0x00FF));
                self.regs.pc = self.addr;
                return self.finish();
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    /// PHA and PHP.
    fn op_push<B: Bus>(&mut self, bus: &mut B, value: fn(&Registers) -> u8) {
        if self.cycle == 1 {
            self.dummy_read_pc(bus);
            self.cycle = 2;
        } else {
            self.push_byte(bus, value(&self.regs));
            self.finish();
        }
    }

    /// PLA and PLP.
    fn op_pull<B: Bus>(&mut self, bus: &mut B, apply: ReadOp) {
        match self.cycle {
            1 => self.dummy_read_pc(bus),
            2 => self.dummy_read_stack(bus),
            3 => {
                let value = self.pull_byte(bus);
                apply(&mut self.regs, value);
                return self.finish();
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    /// CLC, SEC, CLI, SEI, CLV, CLD, SED.
    fn op_flag<B: Bus>(&mut self, bus: &mut B, flag: u8, set: bool) {
        self.dummy_read_pc(bus);
        self.regs.p.set_if(flag, set);
        self.finish();
    }

    /// Two-cycle register operation: transfers, INX/DEX and friends, NOP.
    fn op_implied<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Registers)) {
        self.dummy_read_pc(bus);
        op(&mut self.regs);
        self.finish();
    }

    /// ASL A, LSR A, ROL A, ROR A.
    fn op_accumulator<B: Bus>(&mut self, bus: &mut B, op: ModifyOp) {
        self.dummy_read_pc(bus);
        let a = self.regs.a;
        self.regs.a = op(&mut self.regs, a);
        self.finish();
    }
}

// ============================================================================
// Trait implementations
// ============================================================================

impl Cpu for Mos6502 {
    type Registers = Registers;

    fn tick<B: Bus>(&mut self, bus: &mut B) {
        self.execute_cycle(bus);
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.state == State::Halted
    }

    fn set_irq(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    fn set_nmi(&mut self, asserted: bool) {
        // Edge-triggered: latch only the inactive -> active transition
        if asserted && !self.nmi_line {
            self.nmi_pending = true;
        }
        self.nmi_line = asserted;
    }

    fn reset(&mut self) {
        self.state = State::Reset;
        self.cycle = 1;
        self.nmi_pending = false;
        self.halt = None;
        self.completed = None;
        self.sync = false;
    }
}

/// Status bits by the name used in `flags.<name>` queries.
const FLAG_BITS: [(&str, u8); 8] = [
    ("n", N),
    ("v", V),
    ("u", U),
    ("b", B),
    ("d", D),
    ("i", I),
    ("z", Z),
    ("c", C),
];

impl Observable for Mos6502 {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(name) = path.strip_prefix("flags.") {
            return FLAG_BITS
                .iter()
                .find(|(flag, _)| *flag == name)
                .map(|&(_, bit)| self.regs.p.is_set(bit).into());
        }
        let value: Value = match path {
            "pc" => self.regs.pc.into(),
            "a" => self.regs.a.into(),
            "x" => self.regs.x.into(),
            "y" => self.regs.y.into(),
            "s" => self.regs.s.into(),
            "p" => self.regs.p.0.into(),
            "flags" => self.regs.p.to_string().into(),
            "state" => self.phase().name().into(),
            "cycle" => self.cycle.into(),
            "cycles" => self.total_cycles.into(),
            "sync" => self.sync.into(),
            "irq" => self.irq_line.into(),
            "nmi" => self.nmi_line.into(),
            "halted" => self.is_halted().into(),
            "opcode" => self.opcode.into(),
            _ => return None,
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc", "a", "x", "y", "s", "p", "flags", "flags.n", "flags.v", "flags.u",
            "flags.b", "flags.d", "flags.i", "flags.z", "flags.c", "state", "cycle",
            "cycles", "sync", "irq", "nmi", "halted", "opcode",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    fn cpu_at(bus: &mut SimpleBus, pc: u16, program: &[u8]) -> Mos6502 {
        bus.load(pc, program);
        let mut cpu = Mos6502::new();
        cpu.set_pc(pc);
        cpu
    }

    #[test]
    fn test_lda_immediate() {
        let mut bus = SimpleBus::new();
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0xA9, 0x42]);

        // Cycle 1: fetch opcode
        cpu.tick(&mut bus);
        assert_eq!(cpu.phase(), Phase::Decode);
        assert!(cpu.sync());
        // Cycle 2: decode, fetch operand, execute
        cpu.tick(&mut bus);
        assert_eq!(cpu.regs.a, 0x42);
        assert!(cpu.is_instruction_complete());
        assert!(!cpu.sync());
    }

    #[test]
    fn test_sta_zeropage() {
        let mut bus = SimpleBus::new();
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0x85, 0x10]);
        cpu.regs.a = 0x99;
        for _ in 0..3 {
            cpu.tick(&mut bus);
        }
        assert_eq!(bus.peek(0x0010), 0x99);
        assert!(cpu.is_instruction_complete());
    }

    #[test]
    fn test_jmp_absolute() {
        let mut bus = SimpleBus::new();
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0x4C, 0x34, 0x12]);
        for _ in 0..3 {
            cpu.tick(&mut bus);
        }
        assert_eq!(cpu.pc(), 0x1234);
    }

    #[test]
    fn reset_takes_seven_cycles_and_reads_vector() {
        let mut bus = SimpleBus::new();
        bus.load(0xFFFC, &[0x00, 0x80]);
        let mut cpu = Mos6502::new();
        for _ in 0..6 {
            cpu.tick(&mut bus);
            assert_eq!(cpu.phase(), Phase::Reset);
        }
        cpu.tick(&mut bus);
        assert_eq!(cpu.completed(), Some(Completed::Reset));
        assert_eq!(cpu.pc(), 0x8000);
        assert_eq!(cpu.regs.s, 0xFD);
        assert!(cpu.regs.p.is_set(I));
        assert_eq!(cpu.total_cycles(), 7);
    }

    #[test]
    fn completed_instruction_carries_operands() {
        let mut bus = SimpleBus::new();
        let mut cpu = cpu_at(&mut bus, 0x0600, &[0x8D, 0x00, 0x02]);
        for _ in 0..4 {
            cpu.tick(&mut bus);
        }
        let Some(Completed::Instruction(decoded)) = cpu.completed() else {
            panic!("STA abs should complete on its fourth cycle");
        };
        assert_eq!(decoded.address, 0x0600);
        assert_eq!(decoded.mnemonic, "STA");
        assert_eq!(decoded.operand, [0x00, 0x02]);
        assert_eq!(decoded.cycles, 4);
    }

    #[test]
    fn brk_does_not_latch_padding_byte() {
        let mut bus = SimpleBus::new();
        bus.load(0xFFFE, &[0x00, 0x03]);
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0x00, 0xEA]);
        for _ in 0..7 {
            cpu.tick(&mut bus);
        }
        let decoded = cpu.last_instruction().expect("BRK completed");
        assert_eq!(decoded.length, 1);
        assert_eq!(decoded.operand, [0, 0]);
        assert_eq!(cpu.pc(), 0x0300);
    }

    #[test]
    fn query_reports_registers() {
        let mut cpu = Mos6502::new();
        cpu.regs.a = 0x12;
        assert_eq!(cpu.query("a"), Some(Value::U8(0x12)));
        assert_eq!(cpu.query("state"), Some(Value::from("reset")));
        assert_eq!(cpu.query("nope"), None);
    }
}
