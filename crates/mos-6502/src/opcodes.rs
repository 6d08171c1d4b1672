//! The 256-entry opcode table and instruction decoding.
//!
//! The table is shared by the CPU (decode, illegal-opcode policy) and the
//! disassembly feed. Cycle counts are NMOS base counts: indexed reads add
//! one cycle on a page cross (`page_penalty`), taken branches add one
//! cycle plus one more when the target is on another page.

use std::fmt;

use emu_core::Bus;

/// How an instruction computes its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    /// `(zp,X)`
    IndexedIndirect,
    /// `(zp),Y`
    IndirectIndexed,
    Relative,
}

impl AddressingMode {
    /// Number of operand bytes following the opcode.
    #[must_use]
    pub const fn operand_len(self) -> u8 {
        match self {
            Self::Implied | Self::Accumulator => 0,
            Self::Immediate
            | Self::ZeroPage
            | Self::ZeroPageX
            | Self::ZeroPageY
            | Self::IndexedIndirect
            | Self::IndirectIndexed
            | Self::Relative => 1,
            Self::Absolute | Self::AbsoluteX | Self::AbsoluteY | Self::Indirect => 2,
        }
    }

    /// Lower-case name used by observers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Implied => "implied",
            Self::Accumulator => "accumulator",
            Self::Immediate => "immediate",
            Self::ZeroPage => "zero-page",
            Self::ZeroPageX => "zero-page,x",
            Self::ZeroPageY => "zero-page,y",
            Self::Absolute => "absolute",
            Self::AbsoluteX => "absolute,x",
            Self::AbsoluteY => "absolute,y",
            Self::Indirect => "indirect",
            Self::IndexedIndirect => "(indirect,x)",
            Self::IndirectIndexed => "(indirect),y",
            Self::Relative => "relative",
        }
    }
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    /// Base cycle count including the opcode fetch.
    pub cycles: u8,
    /// One extra cycle when indexing crosses a page.
    pub page_penalty: bool,
    /// Undocumented on the NMOS 6502.
    pub illegal: bool,
}

impl Opcode {
    /// Instruction length in bytes.
    #[must_use]
    pub const fn length(&self) -> u8 {
        1 + self.mode.operand_len()
    }

    #[must_use]
    pub const fn is_branch(&self) -> bool {
        matches!(self.mode, AddressingMode::Relative)
    }

    /// JAM opcodes lock the processor until reset.
    #[must_use]
    pub fn is_jam(&self) -> bool {
        self.mnemonic == "JAM"
    }
}

const IMP: AddressingMode = AddressingMode::Implied;
const ACC: AddressingMode = AddressingMode::Accumulator;
const IMM: AddressingMode = AddressingMode::Immediate;
const ZP: AddressingMode = AddressingMode::ZeroPage;
const ZPX: AddressingMode = AddressingMode::ZeroPageX;
const ZPY: AddressingMode = AddressingMode::ZeroPageY;
const ABS: AddressingMode = AddressingMode::Absolute;
const ABX: AddressingMode = AddressingMode::AbsoluteX;
const ABY: AddressingMode = AddressingMode::AbsoluteY;
const IND: AddressingMode = AddressingMode::Indirect;
const IZX: AddressingMode = AddressingMode::IndexedIndirect;
const IZY: AddressingMode = AddressingMode::IndirectIndexed;
const REL: AddressingMode = AddressingMode::Relative;

const fn op(mnemonic: &'static str, mode: AddressingMode, cycles: u8) -> Opcode {
    Opcode {
        mnemonic,
        mode,
        cycles,
        page_penalty: false,
        illegal: false,
    }
}

const fn opx(mnemonic: &'static str, mode: AddressingMode, cycles: u8) -> Opcode {
    Opcode {
        page_penalty: true,
        ..op(mnemonic, mode, cycles)
    }
}

const fn il(mnemonic: &'static str, mode: AddressingMode, cycles: u8) -> Opcode {
    Opcode {
        illegal: true,
        ..op(mnemonic, mode, cycles)
    }
}

const fn ilx(mnemonic: &'static str, mode: AddressingMode, cycles: u8) -> Opcode {
    Opcode {
        illegal: true,
        page_penalty: true,
        ..op(mnemonic, mode, cycles)
    }
}

const JAM: Opcode = il("JAM", IMP, 2);

/// The full NMOS 6502 opcode matrix, indexed by opcode byte.
pub static OPCODES: [Opcode; 256] = [
    // $00
    op("BRK", IMP, 7), op("ORA", IZX, 6), JAM, il("SLO", IZX, 8),
    il("NOP", ZP, 3), op("ORA", ZP, 3), op("ASL", ZP, 5), il("SLO", ZP, 5),
    op("PHP", IMP, 3), op("ORA", IMM, 2), op("ASL", ACC, 2), il("ANC", IMM, 2),
    il("NOP", ABS, 4), op("ORA", ABS, 4), op("ASL", ABS, 6), il("SLO", ABS, 6),
    // $10
    op("BPL", REL, 2), opx("ORA", IZY, 5), JAM, il("SLO", IZY, 8),
    il("NOP", ZPX, 4), op("ORA", ZPX, 4), op("ASL", ZPX, 6), il("SLO", ZPX, 6),
    op("CLC", IMP, 2), opx("ORA", ABY, 4), il("NOP", IMP, 2), il("SLO", ABY, 7),
    ilx("NOP", ABX, 4), opx("ORA", ABX, 4), op("ASL", ABX, 7), il("SLO", ABX, 7),
    // $20
    op("JSR", ABS, 6), op("AND", IZX, 6), JAM, il("RLA", IZX, 8),
    op("BIT", ZP, 3), op("AND", ZP, 3), op("ROL", ZP, 5), il("RLA", ZP, 5),
    op("PLP", IMP, 4), op("AND", IMM, 2), op("ROL", ACC, 2), il("ANC", IMM, 2),
    op("BIT", ABS, 4), op("AND", ABS, 4), op("ROL", ABS, 6), il("RLA", ABS, 6),
    // $30
    op("BMI", REL, 2), opx("AND", IZY, 5), JAM, il("RLA", IZY, 8),
    il("NOP", ZPX, 4), op("AND", ZPX, 4), op("ROL", ZPX, 6), il("RLA", ZPX, 6),
    op("SEC", IMP, 2), opx("AND", ABY, 4), il("NOP", IMP, 2), il("RLA", ABY, 7),
    ilx("NOP", ABX, 4), opx("AND", ABX, 4), op("ROL", ABX, 7), il("RLA", ABX, 7),
    // $40
    op("RTI", IMP, 6), op("EOR", IZX, 6), JAM, il("SRE", IZX, 8),
    il("NOP", ZP, 3), op("EOR", ZP, 3), op("LSR", ZP, 5), il("SRE", ZP, 5),
    op("PHA", IMP, 3), op("EOR", IMM, 2), op("LSR", ACC, 2), il("ALR", IMM, 2),
    op("JMP", ABS, 3), op("EOR", ABS, 4), op("LSR", ABS, 6), il("SRE", ABS, 6),
    // $50
    op("BVC", REL, 2), opx("EOR", IZY, 5), JAM, il("SRE", IZY, 8),
    il("NOP", ZPX, 4), op("EOR", ZPX, 4), op("LSR", ZPX, 6), il("SRE", ZPX, 6),
    op("CLI", IMP, 2), opx("EOR", ABY, 4), il("NOP", IMP, 2), il("SRE", ABY, 7),
    ilx("NOP", ABX, 4), opx("EOR", ABX, 4), op("LSR", ABX, 7), il("SRE", ABX, 7),
    // $60
    op("RTS", IMP, 6), op("ADC", IZX, 6), JAM, il("RRA", IZX, 8),
    il("NOP", ZP, 3), op("ADC", ZP, 3), op("ROR", ZP, 5), il("RRA", ZP, 5),
    op("PLA", IMP, 4), op("ADC", IMM, 2), op("ROR", ACC, 2), il("ARR", IMM, 2),
    op("JMP", IND, 5), op("ADC", ABS, 4), op("ROR", ABS, 6), il("RRA", ABS, 6),
    // $70
    op("BVS", REL, 2), opx("ADC", IZY, 5), JAM, il("RRA", IZY, 8),
    il("NOP", ZPX, 4), op("ADC", ZPX, 4), op("ROR", ZPX, 6), il("RRA", ZPX, 6),
    op("SEI", IMP, 2), opx("ADC", ABY, 4), il("NOP", IMP, 2), il("RRA", ABY, 7),
    ilx("NOP", ABX, 4), opx("ADC", ABX, 4), op("ROR", ABX, 7), il("RRA", ABX, 7),
    // $80
    il("NOP", IMM, 2), op("STA", IZX, 6), il("NOP", IMM, 2), il("SAX", IZX, 6),
    op("STY", ZP, 3), op("STA", ZP, 3), op("STX", ZP, 3), il("SAX", ZP, 3),
    op("DEY", IMP, 2), il("NOP", IMM, 2), op("TXA", IMP, 2), il("ANE", IMM, 2),
    op("STY", ABS, 4), op("STA", ABS, 4), op("STX", ABS, 4), il("SAX", ABS, 4),
    // $90
    op("BCC", REL, 2), op("STA", IZY, 6), JAM, il("SHA", IZY, 6),
    op("STY", ZPX, 4), op("STA", ZPX, 4), op("STX", ZPY, 4), il("SAX", ZPY, 4),
    op("TYA", IMP, 2), op("STA", ABY, 5), op("TXS", IMP, 2), il("TAS", ABY, 5),
    il("SHY", ABX, 5), op("STA", ABX, 5), il("SHX", ABY, 5), il("SHA", ABY, 5),
    // $A0
    op("LDY", IMM, 2), op("LDA", IZX, 6), op("LDX", IMM, 2), il("LAX", IZX, 6),
    op("LDY", ZP, 3), op("LDA", ZP, 3), op("LDX", ZP, 3), il("LAX", ZP, 3),
    op("TAY", IMP, 2), op("LDA", IMM, 2), op("TAX", IMP, 2), il("LXA", IMM, 2),
    op("LDY", ABS, 4), op("LDA", ABS, 4), op("LDX", ABS, 4), il("LAX", ABS, 4),
    // $B0
    op("BCS", REL, 2), opx("LDA", IZY, 5), JAM, ilx("LAX", IZY, 5),
    op("LDY", ZPX, 4), op("LDA", ZPX, 4), op("LDX", ZPY, 4), il("LAX", ZPY, 4),
    op("CLV", IMP, 2), opx("LDA", ABY, 4), op("TSX", IMP, 2), ilx("LAS", ABY, 4),
    opx("LDY", ABX, 4), opx("LDA", ABX, 4), opx("LDX", ABY, 4), ilx("LAX", ABY, 4),
    // $C0
    op("CPY", IMM, 2), op("CMP", IZX, 6), il("NOP", IMM, 2), il("DCP", IZX, 8),
    op("CPY", ZP, 3), op("CMP", ZP, 3), op("DEC", ZP, 5), il("DCP", ZP, 5),
    op("INY", IMP, 2), op("CMP", IMM, 2), op("DEX", IMP, 2), il("SBX", IMM, 2),
    op("CPY", ABS, 4), op("CMP", ABS, 4), op("DEC", ABS, 6), il("DCP", ABS, 6),
    // $D0
    op("BNE", REL, 2), opx("CMP", IZY, 5), JAM, il("DCP", IZY, 8),
    il("NOP", ZPX, 4), op("CMP", ZPX, 4), op("DEC", ZPX, 6), il("DCP", ZPX, 6),
    op("CLD", IMP, 2), opx("CMP", ABY, 4), il("NOP", IMP, 2), il("DCP", ABY, 7),
    ilx("NOP", ABX, 4), opx("CMP", ABX, 4), op("DEC", ABX, 7), il("DCP", ABX, 7),
    // $E0
    op("CPX", IMM, 2), op("SBC", IZX, 6), il("NOP", IMM, 2), il("ISC", IZX, 8),
    op("CPX", ZP, 3), op("SBC", ZP, 3), op("INC", ZP, 5), il("ISC", ZP, 5),
    op("INX", IMP, 2), op("SBC", IMM, 2), op("NOP", IMP, 2), il("USBC", IMM, 2),
    op("CPX", ABS, 4), op("SBC", ABS, 4), op("INC", ABS, 6), il("ISC", ABS, 6),
    // $F0
    op("BEQ", REL, 2), opx("SBC", IZY, 5), JAM, il("ISC", IZY, 8),
    il("NOP", ZPX, 4), op("SBC", ZPX, 4), op("INC", ZPX, 6), il("ISC", ZPX, 6),
    op("SED", IMP, 2), opx("SBC", ABY, 4), il("NOP", IMP, 2), il("ISC", ABY, 7),
    ilx("NOP", ABX, 4), opx("SBC", ABX, 4), op("INC", ABX, 7), il("ISC", ABX, 7),
];

/// Look up an opcode byte.
#[must_use]
pub fn lookup(opcode: u8) -> &'static Opcode {
    &OPCODES[opcode as usize]
}

/// A decoded instruction, as latched by the CPU or read from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Address of the opcode byte.
    pub address: u16,
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    /// Operand bytes, little-endian; only `length - 1` are meaningful.
    pub operand: [u8; 2],
    /// Length in bytes.
    pub length: u8,
    /// Cycles consumed. Base cycles for static disassembly.
    pub cycles: u8,
    pub illegal: bool,
}

impl DecodedInstruction {
    /// Start decoding `opcode` found at `address`. Operand bytes are
    /// filled in as they are fetched.
    #[must_use]
    pub fn new(address: u16, opcode: u8) -> Self {
        let info = lookup(opcode);
        Self {
            address,
            opcode,
            mnemonic: info.mnemonic,
            mode: info.mode,
            operand: [0; 2],
            length: info.length(),
            cycles: info.cycles,
            illegal: info.illegal,
        }
    }

    /// Operand as a 16-bit value (zero-extended for one-byte operands).
    #[must_use]
    pub fn operand_value(&self) -> u16 {
        match self.length {
            2 => u16::from(self.operand[0]),
            3 => u16::from_le_bytes(self.operand),
            _ => 0,
        }
    }

    /// Branch destination for relative instructions.
    #[must_use]
    pub fn branch_target(&self) -> Option<u16> {
        (self.mode == AddressingMode::Relative).then(|| {
            let next = self.address.wrapping_add(2);
            next.wrapping_add(self.operand[0] as i8 as u16)
        })
    }

    /// Raw instruction bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.opcode];
        bytes.extend_from_slice(&self.operand[..usize::from(self.length - 1)]);
        bytes
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.operand_value();
        write!(f, "{}", self.mnemonic)?;
        match self.mode {
            AddressingMode::Implied => Ok(()),
            AddressingMode::Accumulator => write!(f, " A"),
            AddressingMode::Immediate => write!(f, " #${v:02X}"),
            AddressingMode::ZeroPage => write!(f, " ${v:02X}"),
            AddressingMode::ZeroPageX => write!(f, " ${v:02X},X"),
            AddressingMode::ZeroPageY => write!(f, " ${v:02X},Y"),
            AddressingMode::Absolute => write!(f, " ${v:04X}"),
            AddressingMode::AbsoluteX => write!(f, " ${v:04X},X"),
            AddressingMode::AbsoluteY => write!(f, " ${v:04X},Y"),
            AddressingMode::Indirect => write!(f, " (${v:04X})"),
            AddressingMode::IndexedIndirect => write!(f, " (${v:02X},X)"),
            AddressingMode::IndirectIndexed => write!(f, " (${v:02X}),Y"),
            AddressingMode::Relative => {
                write!(f, " ${:04X}", self.branch_target().unwrap_or_default())
            }
        }
    }
}

/// Decode `count` instructions starting at `address` without side effects.
pub fn disassemble<B: Bus + ?Sized>(bus: &B, address: u16, count: usize) -> Vec<DecodedInstruction> {
    let mut out = Vec::with_capacity(count);
    let mut pc = address;
    for _ in 0..count {
        let mut decoded = DecodedInstruction::new(pc, bus.peek(pc));
        for i in 0..decoded.length - 1 {
            decoded.operand[usize::from(i)] = bus.peek(pc.wrapping_add(1 + u16::from(i)));
        }
        pc = pc.wrapping_add(u16::from(decoded.length));
        out.push(decoded);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    #[test]
    fn documented_opcode_count() {
        let documented = OPCODES.iter().filter(|o| !o.illegal).count();
        assert_eq!(documented, 151);
    }

    #[test]
    fn twelve_jam_opcodes() {
        let jams: Vec<usize> = (0..256).filter(|&i| OPCODES[i].is_jam()).collect();
        assert_eq!(
            jams,
            vec![0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2]
        );
    }

    #[test]
    fn lengths_follow_addressing_mode() {
        assert_eq!(lookup(0xEA).length(), 1);
        assert_eq!(lookup(0xA9).length(), 2);
        assert_eq!(lookup(0x8D).length(), 3);
        assert_eq!(lookup(0x6C).length(), 3);
        assert_eq!(lookup(0xD0).length(), 2);
    }

    #[test]
    fn disassemble_small_program() {
        let mut bus = SimpleBus::new();
        bus.load(0x0600, &[0xA9, 0x05, 0x8D, 0x00, 0x02, 0xD0, 0xFE, 0xB1, 0x10]);
        let lines: Vec<String> = disassemble(&bus, 0x0600, 4)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(lines, vec!["LDA #$05", "STA $0200", "BNE $0605", "LDA ($10),Y"]);
    }

    #[test]
    fn bytes_respect_length() {
        let mut d = DecodedInstruction::new(0x1000, 0x20);
        d.operand = [0x34, 0x12];
        assert_eq!(d.bytes(), vec![0x20, 0x34, 0x12]);
        assert_eq!(d.to_string(), "JSR $1234");
    }
}
