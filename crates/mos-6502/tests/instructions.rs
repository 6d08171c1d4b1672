//! Behavioural tests for 6502 instructions.

use emu_core::{Bus, Cpu, SimpleBus};
use mos_6502::{Completed, IllegalOpcode, IllegalOpcodePolicy, Mos6502, flags};

/// Run one complete instruction and return the number of ticks it took.
fn run_instruction(cpu: &mut Mos6502, bus: &mut SimpleBus) -> u32 {
    cpu.tick(bus);
    let mut ticks = 1;
    while !cpu.is_instruction_complete() {
        assert!(ticks < 20, "instruction did not complete within 20 cycles");
        assert!(!cpu.is_halted(), "CPU halted mid-instruction");
        cpu.tick(bus);
        ticks += 1;
    }
    ticks
}

/// Load a program at $0200 and point the CPU at it with a usable stack.
fn setup(program: &[u8]) -> (Mos6502, SimpleBus) {
    let mut bus = SimpleBus::new();
    bus.load(0x0200, program);
    let mut cpu = Mos6502::new();
    cpu.set_pc(0x0200);
    cpu.regs.s = 0xFD;
    (cpu, bus)
}

fn emulating(program: &[u8]) -> (Mos6502, SimpleBus) {
    let (mut cpu, bus) = setup(program);
    cpu.set_illegal_policy(IllegalOpcodePolicy::Emulate);
    (cpu, bus)
}

// ============================================================================
// Loads, stores and transfers
// ============================================================================

#[test]
fn lda_sets_zero_and_negative() {
    let (mut cpu, mut bus) = setup(&[0xA9, 0x00, 0xA9, 0x80]);

    run_instruction(&mut cpu, &mut bus);
    assert!(cpu.regs.p.is_set(flags::Z));
    assert!(!cpu.regs.p.is_set(flags::N));

    run_instruction(&mut cpu, &mut bus);
    assert!(!cpu.regs.p.is_set(flags::Z));
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn lda_sta_scenario_leaves_value_in_ram() {
    // LDA #$05; STA $0200 from $0600
    let mut bus = SimpleBus::new();
    bus.load(0x0600, &[0xA9, 0x05, 0x8D, 0x00, 0x02]);
    let mut cpu = Mos6502::new();
    cpu.set_pc(0x0600);

    assert_eq!(run_instruction(&mut cpu, &mut bus), 2);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 4);

    assert_eq!(cpu.regs.a, 0x05);
    assert_eq!(bus.peek(0x0200), 0x05);
    assert_eq!(cpu.pc(), 0x0605);
}

#[test]
fn zero_page_indexing_wraps_within_page_zero() {
    // LDX #$10; LDA $F8,X reads $08, not $0108
    let (mut cpu, mut bus) = setup(&[0xA2, 0x10, 0xB5, 0xF8]);
    bus.write(0x0008, 0x5A);
    bus.write(0x0108, 0xA5);

    run_instruction(&mut cpu, &mut bus);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x5A);
}

#[test]
fn indexed_indirect_pointer_wraps_within_page_zero() {
    // LDX #$00; LDA ($FF,X): pointer low at $FF, high at $00
    let (mut cpu, mut bus) = setup(&[0xA2, 0x00, 0xA1, 0xFF]);
    bus.write(0x00FF, 0x34);
    bus.write(0x0000, 0x12);
    bus.write(0x1234, 0x77);

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
    assert_eq!(cpu.regs.a, 0x77);
}

#[test]
fn indirect_indexed_read_pays_for_page_cross() {
    // LDY #$FF; LDA ($10),Y with base $12F0 lands on $13EF
    let (mut cpu, mut bus) = setup(&[0xA0, 0xFF, 0xB1, 0x10]);
    bus.write(0x0010, 0xF0);
    bus.write(0x0011, 0x12);
    bus.write(0x13EF, 0x42);

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
    assert_eq!(cpu.regs.a, 0x42);
}

#[test]
fn absolute_indexed_read_pays_for_page_cross() {
    // LDX #$01; LDA $12FF,X -> $1300 in 5 cycles; LDA $1200,X in 4
    let (mut cpu, mut bus) = setup(&[0xA2, 0x01, 0xBD, 0xFF, 0x12, 0xBD, 0x00, 0x12]);
    bus.write(0x1300, 0x11);
    bus.write(0x1201, 0x22);

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
    assert_eq!(cpu.regs.a, 0x11);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 4);
    assert_eq!(cpu.regs.a, 0x22);
}

#[test]
fn indexed_store_always_takes_five_cycles() {
    // LDX #$01; STA $1200,X
    let (mut cpu, mut bus) = setup(&[0xA2, 0x01, 0x9D, 0x00, 0x12]);
    cpu.regs.a = 0x99;

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
    assert_eq!(bus.peek(0x1201), 0x99);
}

#[test]
fn transfers_update_flags_except_txs() {
    // LDA #$80; TAX; LDX #$00; TXS
    let (mut cpu, mut bus) = setup(&[0xA9, 0x80, 0xAA, 0xA2, 0x00, 0x9A]);

    run_instruction(&mut cpu, &mut bus);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.x, 0x80);
    assert!(cpu.regs.p.is_set(flags::N));

    run_instruction(&mut cpu, &mut bus);
    assert!(cpu.regs.p.is_set(flags::Z));
    cpu.regs.p.clear(flags::Z);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.s, 0x00);
    assert!(!cpu.regs.p.is_set(flags::Z), "TXS must not touch flags");
}

// ============================================================================
// Stack
// ============================================================================

#[test]
fn pha_pla_round_trip() {
    // LDA #$42; LDX #$FF; TXS; PHA; LDA #$00; PLA
    let (mut cpu, mut bus) = setup(&[0xA9, 0x42, 0xA2, 0xFF, 0x9A, 0x48, 0xA9, 0x00, 0x68]);

    for _ in 0..6 {
        run_instruction(&mut cpu, &mut bus);
    }

    assert_eq!(cpu.regs.a, 0x42);
    assert_eq!(cpu.regs.s, 0xFF);
    assert_eq!(bus.peek(0x01FF), 0x42);
}

#[test]
fn php_pushes_break_and_unused_bits() {
    // SEC; PHP; CLC; PLP
    let (mut cpu, mut bus) = setup(&[0x38, 0x08, 0x18, 0x28]);

    run_instruction(&mut cpu, &mut bus);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(bus.peek(0x01FD) & 0x31, 0x31);

    run_instruction(&mut cpu, &mut bus);
    run_instruction(&mut cpu, &mut bus);
    assert!(cpu.regs.p.is_set(flags::C));
    assert!(!cpu.regs.p.is_set(flags::B), "B only exists on the stack");
    assert_eq!(cpu.regs.s, 0xFD);
}

#[test]
fn stack_pointer_wraps_within_page_one() {
    // LDX #$00; TXS; PHA
    let (mut cpu, mut bus) = setup(&[0xA2, 0x00, 0x9A, 0x48]);
    cpu.regs.a = 0x5C;

    for _ in 0..3 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(bus.peek(0x0100), 0x5C);
    assert_eq!(cpu.regs.s, 0xFF);
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn jsr_rts_round_trip() {
    // $0200: JSR $0300; LDA #$01
    // $0300: LDX #$07; RTS
    let (mut cpu, mut bus) = setup(&[0x20, 0x00, 0x03, 0xA9, 0x01]);
    bus.load(0x0300, &[0xA2, 0x07, 0x60]);

    assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
    assert_eq!(cpu.pc(), 0x0300);
    // Return address pushed is the last byte of the JSR
    assert_eq!(bus.peek(0x01FD), 0x02);
    assert_eq!(bus.peek(0x01FC), 0x02);

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
    assert_eq!(cpu.pc(), 0x0203);

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x01);
    assert_eq!(cpu.regs.x, 0x07);
    assert_eq!(cpu.regs.s, 0xFD);
}

#[test]
fn jsr_reports_both_operand_bytes() {
    let (mut cpu, mut bus) = setup(&[0x20, 0x34, 0x12]);
    run_instruction(&mut cpu, &mut bus);

    let decoded = cpu.last_instruction().expect("JSR completed");
    assert_eq!(decoded.operand, [0x34, 0x12]);
    assert_eq!(decoded.to_string(), "JSR $1234");
}

#[test]
fn jmp_indirect_wraps_pointer_within_page() {
    // JMP ($10FF) reads the high byte from $1000, not $1100
    let (mut cpu, mut bus) = setup(&[0x6C, 0xFF, 0x10]);
    bus.write(0x10FF, 0x34);
    bus.write(0x1000, 0x12);
    bus.write(0x1100, 0x56);

    assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
    assert_eq!(cpu.pc(), 0x1234);
}

#[test]
fn branch_timing_depends_on_outcome_and_page() {
    // BNE not taken (Z set): 2 cycles
    let (mut cpu, mut bus) = setup(&[0xD0, 0x10]);
    cpu.regs.p.set(flags::Z);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 2);
    assert_eq!(cpu.pc(), 0x0202);

    // Taken, same page: 3 cycles
    let (mut cpu, mut bus) = setup(&[0xD0, 0x10]);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 3);
    assert_eq!(cpu.pc(), 0x0212);

    // Taken backwards across a page: 4 cycles
    let (mut cpu, mut bus) = setup(&[0xD0, 0xFC]);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 4);
    assert_eq!(cpu.pc(), 0x01FE);
}

#[test]
fn brk_pushes_return_address_past_padding() {
    // CLI; BRK; padding
    let (mut cpu, mut bus) = setup(&[0x58, 0x00, 0xEA]);
    bus.load(0xFFFE, &[0x00, 0x03]);

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 7);

    assert_eq!(cpu.pc(), 0x0300);
    assert_eq!(cpu.regs.s, 0xFA);
    assert!(cpu.regs.p.is_set(flags::I));
    assert_eq!(bus.peek(0x01FD), 0x02);
    assert_eq!(bus.peek(0x01FC), 0x03);

    let pushed_p = bus.peek(0x01FB);
    assert_eq!(pushed_p & 0x30, 0x30, "B and U set on the pushed copy");
    assert_eq!(pushed_p & flags::I, 0, "I was clear when BRK executed");
}

#[test]
fn rti_restores_status_and_pc() {
    // Handler at $0300 is a bare RTI
    let (mut cpu, mut bus) = setup(&[0x58, 0x00, 0xEA, 0xA9, 0x01]);
    bus.load(0xFFFE, &[0x00, 0x03]);
    bus.write(0x0300, 0x40);

    run_instruction(&mut cpu, &mut bus);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 6);

    assert_eq!(cpu.pc(), 0x0203);
    assert!(!cpu.regs.p.is_set(flags::I));
    assert!(!cpu.regs.p.is_set(flags::B));
    assert_eq!(cpu.regs.s, 0xFD);
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn adc_binary_sets_carry_and_overflow() {
    // CLC; LDA #$7F; ADC #$01 -> $80, V set
    let (mut cpu, mut bus) = setup(&[0x18, 0xA9, 0x7F, 0x69, 0x01]);
    for _ in 0..3 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(cpu.regs.a, 0x80);
    assert!(cpu.regs.p.is_set(flags::V));
    assert!(!cpu.regs.p.is_set(flags::C));

    // SEC; LDA #$FF; ADC #$01 -> $01, C set
    let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0xFF, 0x69, 0x01]);
    for _ in 0..3 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(cpu.regs.a, 0x01);
    assert!(cpu.regs.p.is_set(flags::C));
    assert!(!cpu.regs.p.is_set(flags::V));
}

#[test]
fn sbc_binary_borrows() {
    // SEC; LDA #$00; SBC #$01 -> $FF, C clear
    let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0x00, 0xE9, 0x01]);
    for _ in 0..3 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(cpu.regs.a, 0xFF);
    assert!(!cpu.regs.p.is_set(flags::C));
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn adc_decimal_carries_between_digits() {
    // SED; CLC; LDA #$09; ADC #$01
    let (mut cpu, mut bus) = setup(&[0xF8, 0x18, 0xA9, 0x09, 0x69, 0x01]);
    for _ in 0..4 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(cpu.regs.a, 0x10);
    assert!(!cpu.regs.p.is_set(flags::C));

    // SED; CLC; LDA #$99; ADC #$01 -> $00 with carry
    let (mut cpu, mut bus) = setup(&[0xF8, 0x18, 0xA9, 0x99, 0x69, 0x01]);
    for _ in 0..4 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(cpu.regs.a, 0x00);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn sbc_decimal_borrows_between_digits() {
    // SED; SEC; LDA #$10; SBC #$01
    let (mut cpu, mut bus) = setup(&[0xF8, 0x38, 0xA9, 0x10, 0xE9, 0x01]);
    for _ in 0..4 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(cpu.regs.a, 0x09);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn compare_sets_carry_when_register_not_less() {
    // LDA #$40; CMP #$40; CMP #$41
    let (mut cpu, mut bus) = setup(&[0xA9, 0x40, 0xC9, 0x40, 0xC9, 0x41]);
    run_instruction(&mut cpu, &mut bus);

    run_instruction(&mut cpu, &mut bus);
    assert!(cpu.regs.p.is_set(flags::C));
    assert!(cpu.regs.p.is_set(flags::Z));

    run_instruction(&mut cpu, &mut bus);
    assert!(!cpu.regs.p.is_set(flags::C));
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn bit_copies_operand_bits_into_n_and_v() {
    // LDA #$01; BIT $10
    let (mut cpu, mut bus) = setup(&[0xA9, 0x01, 0x24, 0x10]);
    bus.write(0x0010, 0xC0);
    run_instruction(&mut cpu, &mut bus);
    run_instruction(&mut cpu, &mut bus);

    assert!(cpu.regs.p.is_set(flags::N));
    assert!(cpu.regs.p.is_set(flags::V));
    assert!(cpu.regs.p.is_set(flags::Z));
}

#[test]
fn read_modify_write_writes_original_value_first() {
    // INC $10 with a recording bus would show two writes; check the result
    let (mut cpu, mut bus) = setup(&[0xE6, 0x10, 0x0E, 0x00, 0x12]);
    bus.write(0x0010, 0xFF);
    bus.write(0x1200, 0x81);

    assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
    assert_eq!(bus.peek(0x0010), 0x00);
    assert!(cpu.regs.p.is_set(flags::Z));

    assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
    assert_eq!(bus.peek(0x1200), 0x02);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn rotate_through_carry() {
    // SEC; LDA #$80; ROL A -> $01, C set; ROR A -> $80, C set
    let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0x80, 0x2A, 0x6A]);
    for _ in 0..3 {
        run_instruction(&mut cpu, &mut bus);
    }
    assert_eq!(cpu.regs.a, 0x01);
    assert!(cpu.regs.p.is_set(flags::C));

    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x80);
    assert!(cpu.regs.p.is_set(flags::C));
}

// ============================================================================
// Undocumented opcodes
// ============================================================================

#[test]
fn illegal_opcode_halts_by_default() {
    // LAX $10 under the default policy
    let (mut cpu, mut bus) = setup(&[0xEA, 0xA7, 0x10]);
    run_instruction(&mut cpu, &mut bus);

    cpu.tick(&mut bus);
    cpu.tick(&mut bus);
    assert!(cpu.is_halted());
    assert_eq!(
        cpu.illegal_opcode(),
        Some(IllegalOpcode {
            opcode: 0xA7,
            address: 0x0201
        })
    );
    assert_eq!(
        cpu.illegal_opcode().map(|e| e.to_string()),
        Some("illegal opcode $A7 at $0201".to_string())
    );

    // Further ticks leave registers alone
    let regs = cpu.registers();
    for _ in 0..10 {
        cpu.tick(&mut bus);
    }
    assert_eq!(cpu.registers(), regs);
}

#[test]
fn reset_recovers_from_halt() {
    let (mut cpu, mut bus) = setup(&[0x02]);
    bus.load(0xFFFC, &[0x00, 0x04]);
    cpu.tick(&mut bus);
    cpu.tick(&mut bus);
    assert!(cpu.is_halted());

    cpu.reset();
    for _ in 0..7 {
        cpu.tick(&mut bus);
    }
    assert!(!cpu.is_halted());
    assert_eq!(cpu.illegal_opcode(), None);
    assert_eq!(cpu.completed(), Some(Completed::Reset));
    assert_eq!(cpu.pc(), 0x0400);
}

#[test]
fn jam_halts_even_when_emulating() {
    let (mut cpu, mut bus) = emulating(&[0x02]);
    cpu.tick(&mut bus);
    cpu.tick(&mut bus);
    assert!(cpu.is_halted());
    assert_eq!(cpu.illegal_opcode().map(|e| e.opcode), Some(0x02));
}

#[test]
fn lax_loads_a_and_x() {
    let (mut cpu, mut bus) = emulating(&[0xA7, 0x10]);
    bus.write(0x0010, 0x8E);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 3);
    assert_eq!(cpu.regs.a, 0x8E);
    assert_eq!(cpu.regs.x, 0x8E);
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn sax_stores_a_and_x() {
    let (mut cpu, mut bus) = emulating(&[0x87, 0x10]);
    cpu.regs.a = 0xF0;
    cpu.regs.x = 0x3C;
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(bus.peek(0x0010), 0x30);
}

#[test]
fn slo_shifts_memory_then_ors() {
    let (mut cpu, mut bus) = emulating(&[0x07, 0x10]);
    bus.write(0x0010, 0x81);
    cpu.regs.a = 0x01;
    assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
    assert_eq!(bus.peek(0x0010), 0x02);
    assert_eq!(cpu.regs.a, 0x03);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn rla_rotates_memory_then_ands() {
    let (mut cpu, mut bus) = emulating(&[0x27, 0x10]);
    bus.write(0x0010, 0x40);
    cpu.regs.a = 0xFF;
    cpu.regs.p.set(flags::C);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(bus.peek(0x0010), 0x81);
    assert_eq!(cpu.regs.a, 0x81);
    assert!(!cpu.regs.p.is_set(flags::C));
}

#[test]
fn dcp_decrements_then_compares() {
    let (mut cpu, mut bus) = emulating(&[0xC7, 0x10]);
    bus.write(0x0010, 0x43);
    cpu.regs.a = 0x42;
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(bus.peek(0x0010), 0x42);
    assert!(cpu.regs.p.is_set(flags::Z));
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn isc_increments_then_subtracts() {
    let (mut cpu, mut bus) = emulating(&[0xE7, 0x10]);
    bus.write(0x0010, 0x0F);
    cpu.regs.a = 0x20;
    cpu.regs.p.set(flags::C);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(bus.peek(0x0010), 0x10);
    assert_eq!(cpu.regs.a, 0x10);
}

#[test]
fn anc_and_alr_and_sbx() {
    // ANC #$80 with A=$FF: A=$80, C copies N
    let (mut cpu, mut bus) = emulating(&[0x0B, 0x80]);
    cpu.regs.a = 0xFF;
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x80);
    assert!(cpu.regs.p.is_set(flags::C));

    // ALR #$03 with A=$FF: AND then LSR -> $01, C set
    let (mut cpu, mut bus) = emulating(&[0x4B, 0x03]);
    cpu.regs.a = 0xFF;
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x01);
    assert!(cpu.regs.p.is_set(flags::C));

    // SBX #$02 with A=$0F, X=$F3: X = ($0F & $F3) - 2 = $01
    let (mut cpu, mut bus) = emulating(&[0xCB, 0x02]);
    cpu.regs.a = 0x0F;
    cpu.regs.x = 0xF3;
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.x, 0x01);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn arr_takes_carry_from_bit_six() {
    // A=$FF, C set: ($FF & $C0) >> 1 | $80 = $E0; C = bit 6, V = bit6 ^ bit5
    let (mut cpu, mut bus) = emulating(&[0x6B, 0xC0]);
    cpu.regs.a = 0xFF;
    cpu.regs.p.set(flags::C);
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0xE0);
    assert!(cpu.regs.p.is_set(flags::C));
    assert!(!cpu.regs.p.is_set(flags::V));
}

#[test]
fn undocumented_nops_consume_operands() {
    // NOP (1 byte), NOP #imm, NOP zp, NOP abs, NOP zp,X
    let (mut cpu, mut bus) = emulating(&[0x1A, 0x80, 0xFF, 0x04, 0x10, 0x0C, 0x00, 0x12, 0x14, 0x10]);
    let before = cpu.registers();

    assert_eq!(run_instruction(&mut cpu, &mut bus), 2);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 2);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 3);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 4);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 4);

    assert_eq!(cpu.pc(), 0x020A);
    assert_eq!(cpu.regs.a, before.a);
    assert_eq!(cpu.regs.p, before.p);
}

#[test]
fn shx_masks_with_base_high_byte_plus_one() {
    // LDY #$01; SHX $1200,Y with X=$FF stores $13 at $1201
    let (mut cpu, mut bus) = emulating(&[0xA0, 0x01, 0x9E, 0x00, 0x12]);
    cpu.regs.x = 0xFF;
    run_instruction(&mut cpu, &mut bus);
    assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
    assert_eq!(bus.peek(0x1201), 0x13);
}
