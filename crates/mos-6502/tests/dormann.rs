//! Klaus Dormann's 6502 functional and decimal test programs.
//!
//! The binaries are not distributed with the crate. Assemble them with a
//! load address of $0000 and drop them into `tests/data/`, then run with
//! `--ignored`.
//!
//! Both programs signal completion by trapping: a branch or jump to
//! itself. The functional test traps at $3469 on success.

use emu_core::{Bus, Cpu, SimpleBus};
use mos_6502::{IllegalOpcodePolicy, Mos6502};

const FUNCTIONAL_SUCCESS: u16 = 0x3469;

/// Run instructions from `start` until PC stops moving. Returns the trap
/// address, or `None` if the instruction limit is hit first.
fn run_until_trap(cpu: &mut Mos6502, bus: &mut SimpleBus, start: u16, limit: u64) -> Option<u16> {
    cpu.set_pc(start);
    let mut previous = None;
    let mut repeats = 0;

    for instructions in 0..limit {
        let pc = cpu.pc();
        if previous == Some(pc) {
            repeats += 1;
            if repeats > 2 {
                eprintln!("trapped at ${pc:04X} after {instructions} instructions");
                return Some(pc);
            }
        } else {
            repeats = 0;
            previous = Some(pc);
        }

        cpu.tick(bus);
        while !cpu.is_instruction_complete() {
            assert!(!cpu.is_halted(), "CPU halted at ${:04X}", cpu.pc());
            cpu.tick(bus);
        }
    }
    None
}

fn load(path: &str) -> SimpleBus {
    let binary = std::fs::read(path)
        .unwrap_or_else(|e| panic!("{path}: {e} - assemble it from Klaus Dormann's test suite"));
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &binary);
    bus
}

#[test]
#[ignore = "needs tests/data/6502_functional_test.bin"]
fn dormann_functional() {
    let mut bus = load("tests/data/6502_functional_test.bin");
    let mut cpu = Mos6502::new();
    cpu.set_illegal_policy(IllegalOpcodePolicy::Halt);

    let trap = run_until_trap(&mut cpu, &mut bus, 0x0400, 100_000_000);
    assert_eq!(trap, Some(FUNCTIONAL_SUCCESS), "functional test failed");
}

#[test]
#[ignore = "needs tests/data/6502_decimal_test.bin"]
fn dormann_decimal() {
    let mut bus = load("tests/data/6502_decimal_test.bin");
    let mut cpu = Mos6502::new();

    let trap = run_until_trap(&mut cpu, &mut bus, 0x0200, 50_000_000);
    assert!(trap.is_some(), "decimal test did not finish");
    // ERROR byte at $000B is zero when every case matched
    assert_eq!(bus.peek(0x000B), 0, "decimal test reported an error");
}
