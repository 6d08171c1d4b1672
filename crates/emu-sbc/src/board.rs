//! Top-level single-board computer.
//!
//! A board is one 6502, one address map and whatever devices the
//! configuration places on it. The master clock ticks at CPU cycle rate
//! and every device ticks on every cycle.
//!
//! # Tick loop
//!
//! Each tick:
//! 1. CPU: one bus cycle (a single read or write through the address map)
//! 2. Devices: advance one cycle, seeing the bus access that just happened
//! 3. Wires: port outputs settle onto the auxiliary buses and back into
//!    the connected inputs
//! 4. Interrupt outputs are OR-ed per line and drive CPU IRQ/NMI
//! 5. On instruction completion: disassembly feed and debugger update
//!
//! A device on the wires sees a port write one cycle after the CPU makes
//! it.
//!
//! The CPU samples IRQ/NMI at its next instruction boundary, so a device
//! that asserts its line during cycle `n` is seen before the fetch that
//! follows.

use std::collections::{BTreeMap, VecDeque};

use emu_core::{Bus, Cpu, Device, MasterClock, Observable, Ticks, Value};
use mos_6502::{Completed, DecodedInstruction, IllegalOpcode, Mos6502, Phase, Registers};

use crate::address_map::{AddressMap, IrqLine};
use crate::config::BoardConfig;
use crate::debugger::Debugger;
use crate::error::{ConfigurationError, ImageLoadError};
use crate::memory::Memory;
use crate::program::Program;
use crate::wiring::Wiring;

/// Decoded instructions kept for display collaborators.
pub const HISTORY_LEN: usize = 256;

/// Read-only view of the board for display collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub registers: Registers,
    pub phase: Phase,
    pub address: u16,
    pub data: u8,
    pub write: bool,
    pub sync: bool,
    pub irq: bool,
    pub nmi: bool,
    /// RESET is held while the CPU runs its reset sequence.
    pub reset: bool,
    pub cycles: u64,
    pub last_instruction: Option<DecodedInstruction>,
}

pub struct Board {
    cpu: Mos6502,
    bus: AddressMap,
    wiring: Wiring,
    clock: MasterClock,
    /// Master clock: counts CPU cycles.
    cycles: u64,
    debugger: Debugger,
    history: VecDeque<DecodedInstruction>,
    /// Log every completed instruction at trace level.
    trace: bool,
}

impl Board {
    /// Build every device and map it. Nothing is constructed if any
    /// device fails.
    pub fn new(config: &BoardConfig) -> Result<Self, ConfigurationError> {
        let mut bus = AddressMap::new();
        for device in &config.devices {
            let built = device.build()?;
            match device.range()? {
                Some(range) => bus.register(device.name.clone(), range, device.irq_line(), built)?,
                None => bus.attach(device.name.clone(), device.irq_line(), built)?,
            };
        }
        let wiring = Wiring::new(&config.buses, &config.devices, &bus)?;
        let mut board = Self::with_bus(bus, config.clock());
        board.wiring = wiring;
        board.cpu.set_illegal_policy(config.illegal_policy());
        Ok(board)
    }

    /// Board around an already populated address map.
    #[must_use]
    pub fn with_bus(bus: AddressMap, clock: MasterClock) -> Self {
        Self {
            cpu: Mos6502::new(),
            bus,
            wiring: Wiring::default(),
            clock,
            cycles: 0,
            debugger: Debugger::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            trace: false,
        }
    }

    /// Advance the whole board by one bus cycle.
    pub fn tick(&mut self) {
        // 1. CPU bus cycle
        self.cpu.tick(&mut self.bus);

        // 2. Devices see the same cycle
        self.bus.tick_devices(Ticks::ONE);

        // 3. Wires
        self.wiring.propagate(&mut self.bus);

        // 4. Interrupt lines
        let (irq, nmi) = self.bus.interrupt_lines();
        self.cpu.set_irq(irq);
        self.cpu.set_nmi(nmi);

        self.cycles += 1;

        // 5. Disassembly feed
        if let Some(completed) = self.cpu.completed() {
            self.debugger.observe(completed, &self.cpu, &self.bus);
            if let Completed::Instruction(decoded) = completed {
                if self.trace {
                    tracing::trace!(
                        address = format_args!("${:04X}", decoded.address),
                        cycles = decoded.cycles,
                        "{decoded}"
                    );
                }
                if self.history.len() == HISTORY_LEN {
                    self.history.pop_front();
                }
                self.history.push_back(decoded);
            }
        }
    }

    /// Tick until the next instruction completes. Reset and interrupt
    /// sequences on the way are run through.
    pub fn step_instruction(&mut self) -> Result<DecodedInstruction, IllegalOpcode> {
        loop {
            if let Some(illegal) = self.cpu.illegal_opcode() {
                return Err(illegal);
            }
            self.tick();
            if let Some(Completed::Instruction(decoded)) = self.cpu.completed() {
                return Ok(decoded);
            }
        }
    }

    /// Assert RESET. The CPU runs its reset sequence on the next seven
    /// ticks; devices reset immediately.
    pub fn reset(&mut self) {
        tracing::debug!("board reset");
        self.cpu.reset();
        self.bus.reset_devices();
        self.debugger.reset();
        self.history.clear();
    }

    /// Start executing at `pc` on the next tick, abandoning any sequence in
    /// progress.
    pub fn set_program_counter(&mut self, pc: u16) {
        self.cpu.set_pc(pc);
    }

    /// Write `bytes` from `address` as ordinary bus writes, so devices in
    /// the range see them as live traffic.
    ///
    /// Every target address is checked first: the image must fit below
    /// $10000 and land only on mapped, writable cells. Nothing is written
    /// unless all of it can be.
    pub fn load_image(&mut self, address: u16, bytes: &[u8]) -> Result<(), ImageLoadError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if usize::from(address) + bytes.len() > 0x1_0000 {
            return Err(ImageLoadError::OutOfRange {
                address,
                len: bytes.len(),
            });
        }

        let mut target = address;
        for _ in 0..bytes.len() {
            let (id, offset) = self
                .bus
                .resolve(target)
                .ok_or(ImageLoadError::Unmapped(target))?;
            if !self.bus.device(id).is_writable(offset) {
                return Err(ImageLoadError::ReadOnly {
                    device: self.bus.name(id).to_string(),
                    address: target,
                });
            }
            target = target.wrapping_add(1);
        }

        for (i, &byte) in bytes.iter().enumerate() {
            self.bus.write(address.wrapping_add(i as u16), byte);
        }
        tracing::debug!(
            address = format_args!("${address:04X}"),
            len = bytes.len(),
            "image loaded"
        );
        Ok(())
    }

    /// Load a program at `address`, or at its own origin when `address` is
    /// None. Returns the load address.
    pub fn load_program(
        &mut self,
        program: &Program,
        address: Option<u16>,
    ) -> Result<u16, ImageLoadError> {
        let address = address.or(program.origin()).unwrap_or(0);
        self.load_image(address, program.bytes())?;
        Ok(address)
    }

    /// Burn `bytes` into ROM (or RAM) from `address` without bus traffic,
    /// the way an EEPROM programmer would. Every target must be a memory
    /// device.
    pub fn program_rom(&mut self, address: u16, bytes: &[u8]) -> Result<(), ImageLoadError> {
        if usize::from(address) + bytes.len() > 0x1_0000 {
            return Err(ImageLoadError::OutOfRange {
                address,
                len: bytes.len(),
            });
        }

        let mut target = address;
        for _ in 0..bytes.len() {
            let (id, _) = self
                .bus
                .resolve(target)
                .ok_or(ImageLoadError::Unmapped(target))?;
            if self.bus.device(id).as_any().downcast_ref::<Memory>().is_none() {
                return Err(ImageLoadError::ReadOnly {
                    device: self.bus.name(id).to_string(),
                    address: target,
                });
            }
            target = target.wrapping_add(1);
        }

        let mut written = 0;
        while written < bytes.len() {
            let target = address.wrapping_add(written as u16);
            let Some((id, offset)) = self.bus.resolve(target) else {
                break;
            };
            let Some(memory) = self.bus.device_mut(id).as_any_mut().downcast_mut::<Memory>()
            else {
                break;
            };
            let count = memory.program(offset, &bytes[written..]);
            if count == 0 {
                break;
            }
            written += count;
        }
        Ok(())
    }

    /// Read memory without side effects.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.bus.peek(address)
    }

    /// Device registered under `name`, if it is a `T`.
    #[must_use]
    pub fn device<T: Device + 'static>(&self, name: &str) -> Option<&T> {
        let id = self.bus.find(name)?;
        self.bus.device(id).as_any().downcast_ref()
    }

    pub fn device_mut<T: Device + 'static>(&mut self, name: &str) -> Option<&mut T> {
        let id = self.bus.find(name)?;
        self.bus.device_mut(id).as_any_mut().downcast_mut()
    }

    /// Full register state of the device named `name`.
    #[must_use]
    pub fn device_state(&self, name: &str) -> Option<BTreeMap<String, Value>> {
        let id = self.bus.find(name)?;
        Some(self.bus.device(id).snapshot())
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.cpu.registers(),
            phase: self.cpu.phase(),
            address: self.bus.last_address(),
            data: self.bus.last_data(),
            write: self.bus.last_was_write(),
            sync: self.cpu.sync(),
            irq: self.cpu.irq_line(),
            nmi: self.cpu.nmi_line(),
            reset: self.cpu.phase() == Phase::Reset,
            cycles: self.cycles,
            last_instruction: self.cpu.last_instruction(),
        }
    }

    /// Decode `count` instructions from `address` without touching devices.
    #[must_use]
    pub fn disassemble(&self, address: u16, count: usize) -> Vec<DecodedInstruction> {
        mos_6502::disassemble(&self.bus, address, count)
    }

    /// Take the decoded instructions accumulated since the last drain.
    pub fn drain_instructions(&mut self) -> Vec<DecodedInstruction> {
        self.history.drain(..).collect()
    }

    /// True when the next tick would fetch an opcode from a breakpoint.
    #[must_use]
    pub fn at_breakpoint(&self) -> bool {
        self.cpu.is_instruction_complete() && self.debugger.has_breakpoint(self.cpu.pc())
    }

    /// True when the next instruction is a JSR.
    #[must_use]
    pub fn at_subroutine_call(&self) -> bool {
        self.cpu.is_instruction_complete() && self.bus.peek(self.cpu.pc()) == 0x20
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &AddressMap {
        &self.bus
    }

    #[must_use]
    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    #[must_use]
    pub fn clock(&self) -> MasterClock {
        self.clock
    }

    /// Cycles since the board was built.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    /// Current levels on the auxiliary bus called `name`.
    #[must_use]
    pub fn wire_bus(&self, name: &str) -> Option<u64> {
        self.wiring.bus_levels(name)
    }

    /// Interrupt line of the device named `name`.
    #[must_use]
    pub fn irq_line(&self, name: &str) -> Option<IrqLine> {
        self.bus.find(name).map(|id| self.bus.irq_line(id))
    }
}

impl Observable for Board {
    /// `cpu.*` and `bus.*` reach the CPU and bus lines, `wires.<bus>` an
    /// auxiliary bus; `<device>.<path>` reaches a device by name.
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(name) = path.strip_prefix("wires.") {
            return self.wiring.bus_levels(name).map(Value::from);
        }
        if let Some(rest) = path.strip_prefix("cpu.") {
            return self.cpu.query(rest);
        }
        if let Some(rest) = path.strip_prefix("bus.") {
            return self.bus.query(rest);
        }
        match path {
            "cycles" => Some(self.cycles.into()),
            "halted" => Some(self.is_halted().into()),
            "reset" => Some((self.cpu.phase() == Phase::Reset).into()),
            "instruction" => self.cpu.last_instruction().map(|i| i.to_string().into()),
            "breakpoints" => Some(Value::Array(
                self.debugger.breakpoints().map(Value::from).collect(),
            )),
            _ => {
                let (name, rest) = path.split_once('.')?;
                let id = self.bus.find(name)?;
                self.bus.device(id).query(rest)
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cycles",
            "halted",
            "reset",
            "instruction",
            "breakpoints",
            "cpu.pc",
            "cpu.a",
            "cpu.x",
            "cpu.y",
            "cpu.s",
            "cpu.p",
            "cpu.flags",
            "cpu.state",
            "cpu.sync",
            "cpu.irq",
            "cpu.nmi",
            "bus.address",
            "bus.data",
            "bus.rw",
        ]
    }
}
