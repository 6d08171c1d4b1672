//! Cycle timing for every opcode, reset and interrupt sequences.

use emu_core::{Bus, Cpu, SimpleBus};
use mos_6502::{Completed, IllegalOpcodePolicy, Interrupt, Mos6502, Phase, flags, opcodes};

/// Bus that records every access as (address, value, is_write).
struct RecordingBus {
    inner: SimpleBus,
    log: Vec<(u16, u8, bool)>,
}

impl RecordingBus {
    fn new() -> Self {
        Self {
            inner: SimpleBus::new(),
            log: Vec::new(),
        }
    }
}

impl Bus for RecordingBus {
    fn read(&mut self, address: u16) -> u8 {
        let value = self.inner.read(address);
        self.log.push((address, value, false));
        value
    }

    fn write(&mut self, address: u16, value: u8) {
        self.log.push((address, value, true));
        self.inner.write(address, value);
    }

    fn peek(&self, address: u16) -> u8 {
        self.inner.peek(address)
    }
}

/// NMOS 6502 base cycle counts, documented and undocumented opcodes alike.
/// Branches show their not-taken time; 0 marks the JAM opcodes.
#[rustfmt::skip]
const BASE_CYCLES: [u8; 256] = [
//  0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F
    7, 6, 0, 8, 3, 3, 5, 5, 3, 2, 2, 2, 4, 4, 6, 6, // 0
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 1
    6, 6, 0, 8, 3, 3, 5, 5, 4, 2, 2, 2, 4, 4, 6, 6, // 2
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 3
    6, 6, 0, 8, 3, 3, 5, 5, 3, 2, 2, 2, 3, 4, 6, 6, // 4
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 5
    6, 6, 0, 8, 3, 3, 5, 5, 4, 2, 2, 2, 5, 4, 6, 6, // 6
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 7
    2, 6, 2, 6, 3, 3, 3, 3, 2, 2, 2, 2, 4, 4, 4, 4, // 8
    2, 6, 0, 6, 4, 4, 4, 4, 2, 5, 2, 5, 5, 5, 5, 5, // 9
    2, 6, 2, 6, 3, 3, 3, 3, 2, 2, 2, 2, 4, 4, 4, 4, // A
    2, 5, 0, 5, 4, 4, 4, 4, 2, 4, 2, 4, 4, 4, 4, 4, // B
    2, 6, 2, 8, 3, 3, 5, 5, 2, 2, 2, 2, 4, 4, 6, 6, // C
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // D
    2, 6, 2, 8, 3, 3, 5, 5, 2, 2, 2, 2, 4, 4, 6, 6, // E
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // F
];

/// Indexed reads that take one more cycle when the index carries into the
/// high byte. Stores and read-modify-write opcodes always pay it up front.
const PAGE_CROSS_PENALTY: [u8; 32] = [
    // (zp),Y
    0x11, 0x31, 0x51, 0x71, 0xB1, 0xD1, 0xF1, 0xB3,
    // abs,Y
    0x19, 0x39, 0x59, 0x79, 0xB9, 0xD9, 0xF9, 0xBB, 0xBE, 0xBF,
    // abs,X
    0x1C, 0x1D, 0x3C, 0x3D, 0x5C, 0x5D, 0x7C, 0x7D, 0xBC, 0xBD, 0xDC, 0xDD, 0xFC, 0xFD,
];

/// Execute a single instruction at $0200 with both index registers set to
/// `index` and count its ticks. Every operand and the (zp) pointer at $10
/// aim at $0310, so an index of $FF carries into page $04 and an index of
/// 0 stays put.
fn count_cycles(opcode: u8, index: u8) -> u32 {
    let mut bus = SimpleBus::new();
    bus.load(0x0200, &[opcode, 0x10, 0x03]);
    bus.load(0x0010, &[0x10, 0x03]);
    // (zp,X) with X = $FF reads its pointer from $0F/$10
    bus.load(0x000F, &[0x10]);

    let mut cpu = Mos6502::new();
    cpu.set_illegal_policy(IllegalOpcodePolicy::Emulate);
    cpu.set_pc(0x0200);
    cpu.regs.s = 0xFD;
    cpu.regs.x = index;
    cpu.regs.y = index;

    cpu.tick(&mut bus);
    let mut ticks = 1;
    while !cpu.is_instruction_complete() {
        assert!(ticks < 10, "opcode ${opcode:02X} never completed");
        cpu.tick(&mut bus);
        ticks += 1;
    }

    let Some(Completed::Instruction(decoded)) = cpu.completed() else {
        panic!("opcode ${opcode:02X} did not report completion");
    };
    assert_eq!(u32::from(decoded.cycles), ticks, "reported cycles for ${opcode:02X}");
    ticks
}

/// Opcodes whose timing is fixed by the table: everything but JAMs and
/// branches, which have their own tests.
fn timed_opcodes() -> impl Iterator<Item = u8> {
    (0..=0xFF_u8).filter(|&opcode| BASE_CYCLES[usize::from(opcode)] != 0 && opcode & 0x1F != 0x10)
}

fn mismatches(index: u8, extra: impl Fn(u8) -> u32) -> Vec<String> {
    timed_opcodes()
        .filter_map(|opcode| {
            let expected = u32::from(BASE_CYCLES[usize::from(opcode)]) + extra(opcode);
            let actual = count_cycles(opcode, index);
            let info = opcodes::lookup(opcode);
            (actual != expected).then(|| {
                format!(
                    "{} {} (${opcode:02X}): {actual} cycles, expected {expected}",
                    info.mnemonic,
                    info.mode.name()
                )
            })
        })
        .collect()
}

#[test]
fn every_opcode_takes_its_nmos_cycle_count() {
    assert_eq!(mismatches(0, |_| 0), Vec::<String>::new());
}

#[test]
fn indexed_reads_pay_one_cycle_for_a_page_cross() {
    assert_eq!(
        mismatches(0xFF, |opcode| u32::from(PAGE_CROSS_PENALTY.contains(&opcode))),
        Vec::<String>::new()
    );
}

#[test]
fn decode_table_agrees_with_nmos_cycle_counts() {
    for opcode in timed_opcodes() {
        assert_eq!(
            opcodes::lookup(opcode).cycles,
            BASE_CYCLES[usize::from(opcode)],
            "${opcode:02X}"
        );
    }
}

#[test]
fn reset_sequence_reads_vector_without_writing() {
    let mut bus = RecordingBus::new();
    bus.inner.load(0xFFFC, &[0x34, 0x12]);
    let mut cpu = Mos6502::new();

    for _ in 0..7 {
        cpu.tick(&mut bus);
    }

    assert_eq!(bus.log.len(), 7);
    assert!(bus.log.iter().all(|&(_, _, write)| !write));
    assert_eq!(bus.log[5].0, 0xFFFC);
    assert_eq!(bus.log[6].0, 0xFFFD);
    assert_eq!(cpu.pc(), 0x1234);
    assert_eq!(cpu.regs.s, 0xFD);
    assert_eq!(cpu.phase(), Phase::Fetch);
}

#[test]
fn sync_is_high_only_on_opcode_fetch() {
    let mut bus = SimpleBus::new();
    bus.load(0x0200, &[0xAD, 0x00, 0x03]);
    let mut cpu = Mos6502::new();
    cpu.set_pc(0x0200);

    let mut pattern = Vec::new();
    for _ in 0..4 {
        cpu.tick(&mut bus);
        pattern.push(cpu.sync());
    }
    assert_eq!(pattern, [true, false, false, false]);
}

#[test]
fn one_bus_access_per_tick() {
    let mut bus = RecordingBus::new();
    // LDA $0300; INC $0300; JSR $0210
    bus.inner.load(0x0200, &[0xAD, 0x00, 0x03, 0xEE, 0x00, 0x03, 0x20, 0x10, 0x02]);
    let mut cpu = Mos6502::new();
    cpu.set_pc(0x0200);
    cpu.regs.s = 0xFD;

    let ticks = 4 + 6 + 6;
    for _ in 0..ticks {
        cpu.tick(&mut bus);
    }
    assert_eq!(bus.log.len(), ticks);

    // INC: read, write old value, write new value
    let inc = &bus.log[4..10];
    assert_eq!(inc[3], (0x0300, 0x00, false));
    assert_eq!(inc[4], (0x0300, 0x00, true));
    assert_eq!(inc[5], (0x0300, 0x01, true));
    assert_eq!(cpu.pc(), 0x0210);
}

fn irq_machine() -> (Mos6502, SimpleBus) {
    let mut bus = SimpleBus::new();
    // Main program: NOPs. Handlers at $0300 (IRQ) and $0400 (NMI).
    bus.load(0x0200, &[0xEA; 16]);
    bus.load(0x0300, &[0xEA; 16]);
    bus.load(0x0400, &[0xEA; 16]);
    bus.load(0xFFFA, &[0x00, 0x04, 0x00, 0x00, 0x00, 0x03]);
    let mut cpu = Mos6502::new();
    cpu.set_pc(0x0200);
    cpu.regs.s = 0xFD;
    (cpu, bus)
}

fn run_ticks(cpu: &mut Mos6502, bus: &mut SimpleBus, n: usize) {
    for _ in 0..n {
        cpu.tick(bus);
    }
}

#[test]
fn irq_is_ignored_while_interrupts_disabled() {
    let (mut cpu, mut bus) = irq_machine();
    cpu.regs.p.set(flags::I);
    cpu.set_irq(true);

    run_ticks(&mut cpu, &mut bus, 10);
    assert_eq!(cpu.pc(), 0x0205);
    assert_eq!(cpu.regs.s, 0xFD);
}

#[test]
fn irq_takes_seven_cycles_and_pushes_status_without_break() {
    let (mut cpu, mut bus) = irq_machine();
    cpu.regs.p.clear(flags::I);
    cpu.regs.p.set(flags::C);
    cpu.set_irq(true);

    run_ticks(&mut cpu, &mut bus, 6);
    assert_eq!(cpu.phase(), Phase::Interrupt);
    cpu.tick(&mut bus);
    assert_eq!(cpu.completed(), Some(Completed::Interrupt(Interrupt::Irq)));

    assert_eq!(cpu.pc(), 0x0300);
    assert!(cpu.regs.p.is_set(flags::I));
    assert_eq!(bus.peek(0x01FD), 0x02);
    assert_eq!(bus.peek(0x01FC), 0x00);
    let pushed = bus.peek(0x01FB);
    assert_eq!(pushed & flags::B, 0);
    assert_eq!(pushed & (flags::U | flags::C), flags::U | flags::C);
}

#[test]
fn irq_waits_for_instruction_boundary() {
    let (mut cpu, mut bus) = irq_machine();
    bus.load(0x0200, &[0xAD, 0x00, 0x05]);
    cpu.regs.p.clear(flags::I);

    cpu.tick(&mut bus);
    cpu.set_irq(true);
    run_ticks(&mut cpu, &mut bus, 3);
    assert!(cpu.is_instruction_complete());
    assert_eq!(cpu.pc(), 0x0203, "LDA abs finished before the interrupt");

    run_ticks(&mut cpu, &mut bus, 7);
    assert_eq!(cpu.pc(), 0x0300);
    assert_eq!(bus.peek(0x01FC), 0x03);
}

#[test]
fn nmi_fires_once_per_edge() {
    let (mut cpu, mut bus) = irq_machine();
    cpu.set_nmi(true);
    run_ticks(&mut cpu, &mut bus, 7);
    assert_eq!(cpu.completed(), Some(Completed::Interrupt(Interrupt::Nmi)));
    assert_eq!(cpu.pc(), 0x0400);

    // Line held: no second NMI
    cpu.set_nmi(true);
    run_ticks(&mut cpu, &mut bus, 10);
    assert_eq!(cpu.pc(), 0x0405);
    assert_eq!(cpu.regs.s, 0xFA);

    // Release and reassert: second NMI
    cpu.set_nmi(false);
    cpu.set_nmi(true);
    run_ticks(&mut cpu, &mut bus, 7);
    assert_eq!(cpu.pc(), 0x0400);
    assert_eq!(cpu.regs.s, 0xF7);
}

#[test]
fn nmi_ignores_interrupt_disable_and_wins_over_irq() {
    let (mut cpu, mut bus) = irq_machine();
    cpu.regs.p.set(flags::I);
    cpu.set_irq(true);
    cpu.set_nmi(true);

    run_ticks(&mut cpu, &mut bus, 7);
    assert_eq!(cpu.pc(), 0x0400);
}
