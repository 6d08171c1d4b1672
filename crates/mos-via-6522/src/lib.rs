//! MOS 6522 Versatile Interface Adapter (VIA).
//!
//! The 6522 provides two 8-bit I/O ports, two 16-bit timers, a serial
//! shift register, and an interrupt controller. On a single-board
//! computer it usually sits on the CPU's IRQ line and drives an LCD or
//! keypad through its ports.
//!
//! # Registers ($0-$F)
//!
//! | Reg | Name | Description                              |
//! |-----|------|------------------------------------------|
//! | $0  | ORB  | Port B data (read clears CB1/CB2)        |
//! | $1  | ORA  | Port A data (read clears CA1/CA2)        |
//! | $2  | DDRB | Port B data direction (1 = output)       |
//! | $3  | DDRA | Port A data direction (1 = output)       |
//! | $4  | T1CL | Timer 1 counter low (read clears T1)     |
//! | $5  | T1CH | Timer 1 counter high (write starts T1)   |
//! | $6  | T1LL | Timer 1 latch low                        |
//! | $7  | T1LH | Timer 1 latch high (write clears T1)     |
//! | $8  | T2CL | Timer 2 counter low (read clears T2)     |
//! | $9  | T2CH | Timer 2 counter high (write starts T2)   |
//! | $A  | SR   | Shift register (access clears SR)        |
//! | $B  | ACR  | Auxiliary control register               |
//! | $C  | PCR  | Peripheral control register              |
//! | $D  | IFR  | Interrupt flags (write 1s to clear)      |
//! | $E  | IER  | Interrupt enable (bit 7 = set/clear)     |
//! | $F  | ORA  | Port A data (no handshake)               |
//!
//! Boards that hang the chip off higher address lines can select the
//! register with a shifted offset; see [`Via6522::with_register_shift`].
//!
//! # Ports
//!
//! PA and PB are exposed as wiring ports 0 and 1. Output bits (DDR = 1)
//! are driven onto whatever the board connects them to; input bits follow
//! the wires. With ACR bit 5 set, falling edges on PB6 count timer 2 down.

use std::any::Any;

use emu_core::{Device, Drive, Observable, PortInfo, Ticks, Value};

/// CA2 active edge.
pub const IFR_CA2: u8 = 0x01;
/// CA1 active edge.
pub const IFR_CA1: u8 = 0x02;
/// Shift register complete.
pub const IFR_SR: u8 = 0x04;
/// CB2 active edge.
pub const IFR_CB2: u8 = 0x08;
/// CB1 active edge.
pub const IFR_CB1: u8 = 0x10;
/// Timer 2 underflow.
pub const IFR_T2: u8 = 0x20;
/// Timer 1 underflow.
pub const IFR_T1: u8 = 0x40;

const PORTS: [PortInfo; 2] = [PortInfo::new("PA", 8), PortInfo::new("PB", 8)];
const PORT_A: usize = 0;
const PORT_B: usize = 1;
const PB6: u8 = 0x40;

/// One 8-bit port: output register, direction register and the levels
/// driven onto input pins from outside.
#[derive(Debug, Clone, Copy)]
struct Port {
    output: u8,
    ddr: u8,
    input: u8,
}

impl Port {
    const fn new() -> Self {
        Self {
            output: 0,
            ddr: 0,
            input: 0xFF,
        }
    }

    /// Output bits come from the register, input bits from the pins.
    const fn pins(self) -> u8 {
        (self.output & self.ddr) | (self.input & !self.ddr)
    }
}

/// A 16-bit down-counter with reload latch.
#[derive(Debug, Clone, Copy)]
struct Timer {
    counter: u16,
    latch: u16,
    /// Armed: an underflow will raise the interrupt flag.
    armed: bool,
}

impl Timer {
    const fn new() -> Self {
        Self {
            counter: 0xFFFF,
            latch: 0xFFFF,
            armed: false,
        }
    }

    /// Count one cycle or pulse. Returns true on underflow.
    fn step(&mut self) -> bool {
        let (next, underflow) = self.counter.overflowing_sub(1);
        self.counter = next;
        underflow
    }
}

/// MOS 6522 Versatile Interface Adapter.
#[derive(Debug)]
pub struct Via6522 {
    port_a: Port,
    port_b: Port,
    t1: Timer,
    t2: Timer,
    shift_register: u8,
    acr: u8,
    pcr: u8,
    ifr: u8,
    ier: u8,
    ca1: bool,
    cb1: bool,
    /// CB2 level driven by the shift register.
    cb2_out: bool,
    /// CB2 level driven from outside, shifted in by the input modes.
    cb2_in: bool,
    /// PB7 square wave from timer 1 in free-run mode.
    pb7: bool,
    shifter: Shifter,
    /// Right shift applied to the bus offset before register select.
    register_shift: u8,
}

/// Shift register sequencing: bits left in the current byte and cycles to
/// the next shift.
#[derive(Debug, Clone, Copy, Default)]
struct Shifter {
    active: bool,
    remaining: u8,
    countdown: u16,
}

impl Default for Via6522 {
    fn default() -> Self {
        Self::new()
    }
}

impl Via6522 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            port_a: Port::new(),
            port_b: Port::new(),
            t1: Timer::new(),
            t2: Timer::new(),
            shift_register: 0,
            acr: 0,
            pcr: 0,
            ifr: 0,
            ier: 0,
            ca1: false,
            cb1: false,
            cb2_out: false,
            cb2_in: false,
            pb7: false,
            shifter: Shifter::default(),
            register_shift: 0,
        }
    }

    /// A VIA whose RS0-RS3 pins sit on address lines `shift` and up, so
    /// register `n` appears at offset `n << shift`.
    #[must_use]
    pub fn with_register_shift(shift: u8) -> Self {
        Self {
            register_shift: shift.min(12),
            ..Self::new()
        }
    }

    /// IFR as read from the bus: bit 7 set while any enabled flag is set.
    #[must_use]
    pub fn ifr(&self) -> u8 {
        let any = if self.irq_asserted() { 0x80 } else { 0 };
        (self.ifr & 0x7F) | any
    }

    /// IER as read from the bus: bit 7 always reads 1.
    #[must_use]
    pub fn ier(&self) -> u8 {
        self.ier | 0x80
    }

    #[must_use]
    pub fn acr(&self) -> u8 {
        self.acr
    }

    #[must_use]
    pub fn timer1_counter(&self) -> u16 {
        self.t1.counter
    }

    #[must_use]
    pub fn timer2_counter(&self) -> u16 {
        self.t2.counter
    }

    /// Drive the port A input pins.
    pub fn set_port_a_input(&mut self, value: u8) {
        self.port_a.input = value;
    }

    /// Drive the port B input pins.
    pub fn set_port_b_input(&mut self, value: u8) {
        self.sense_port_b(value, 0xFF);
    }

    fn sense_port_b(&mut self, levels: u8, mask: u8) {
        let before = self.port_b.input;
        self.port_b.input = (before & !mask) | (levels & mask);
        let pb6_fell = before & PB6 != 0 && self.port_b.input & PB6 == 0;
        if pb6_fell && self.t2_counts_pulses() {
            self.count_t2_pulse();
        }
    }

    /// Pulse-counting mode: the flag is raised when the count reaches zero.
    fn count_t2_pulse(&mut self) {
        self.t2.step();
        if self.t2.counter == 0 && self.t2.armed {
            self.ifr |= IFR_T2;
            self.t2.armed = false;
            tracing::trace!("VIA timer 2 pulse count reached zero");
        }
    }

    /// Levels on port A output pins. Input pins read as 0.
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        self.port_a.output & self.port_a.ddr
    }

    /// Levels on port B output pins, with PB7 taken from timer 1 when
    /// ACR bit 7 routes it there.
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        self.with_pb7(self.port_b.output & self.port_b.ddr)
    }

    /// Drive CA1. The active edge is selected by PCR bit 0.
    pub fn set_ca1(&mut self, level: bool) {
        if Self::is_active_edge(self.ca1, level, self.pcr & 0x01 != 0) {
            self.ifr |= IFR_CA1;
        }
        self.ca1 = level;
    }

    /// Drive CB1. The active edge is selected by PCR bit 4. In the
    /// externally clocked shift modes a rising edge also shifts one bit.
    pub fn set_cb1(&mut self, level: bool) {
        if Self::is_active_edge(self.cb1, level, self.pcr & 0x10 != 0) {
            self.ifr |= IFR_CB1;
        }
        let rising = !self.cb1 && level;
        self.cb1 = level;
        if rising && matches!(self.shift_mode(), 3 | 7) && self.shifter.active {
            self.shift_bit();
        }
    }

    /// Drive the CB2 input shifted in by the shift-in modes.
    pub fn set_cb2(&mut self, level: bool) {
        self.cb2_in = level;
    }

    /// CB2 as driven by the shift-out modes.
    #[must_use]
    pub fn cb2_output(&self) -> bool {
        self.cb2_out
    }

    #[must_use]
    pub fn shift_register(&self) -> u8 {
        self.shift_register
    }

    /// Raise the CA2 flag (external edge detection on CA2).
    pub fn set_ca2_flag(&mut self) {
        self.ifr |= IFR_CA2;
    }

    /// Raise the CB2 flag.
    pub fn set_cb2_flag(&mut self) {
        self.ifr |= IFR_CB2;
    }

    fn is_active_edge(previous: bool, level: bool, positive: bool) -> bool {
        if positive {
            !previous && level
        } else {
            previous && !level
        }
    }

    fn irq_asserted(&self) -> bool {
        self.ifr & self.ier & 0x7F != 0
    }

    fn with_pb7(&self, value: u8) -> u8 {
        if self.acr & 0x80 != 0 {
            (value & 0x7F) | if self.pb7 { 0x80 } else { 0 }
        } else {
            value
        }
    }

    /// ACR bit 6: timer 1 free-run (continuous interrupts).
    fn t1_free_run(&self) -> bool {
        self.acr & 0x40 != 0
    }

    /// ACR bit 5: timer 2 counts PB6 pulses instead of clock cycles.
    fn t2_counts_pulses(&self) -> bool {
        self.acr & 0x20 != 0
    }

    /// ACR bits 4-2: shift register mode. 0 disables it; 1-3 shift in
    /// under T2, phase 2 or CB1; 4 free-runs out under T2; 5-7 shift out
    /// under T2, phase 2 or CB1.
    fn shift_mode(&self) -> u8 {
        (self.acr >> 2) & 0x07
    }

    /// Cycles per bit for the internally clocked modes. CB1 toggles once
    /// per T2 low-latch period (N + 2 cycles) or once per cycle, and a bit
    /// moves every full CB1 period.
    fn shift_period(&self) -> u16 {
        match self.shift_mode() {
            2 | 6 => 2,
            _ => 2 * (u16::from(self.t2.latch as u8) + 2),
        }
    }

    /// An access to SR starts an eight-bit transfer in any enabled mode.
    fn start_shifting(&mut self) {
        if self.shift_mode() == 0 {
            return;
        }
        self.shifter = Shifter {
            active: true,
            remaining: 8,
            countdown: self.shift_period(),
        };
    }

    fn shift_bit(&mut self) {
        if self.shift_mode() >= 4 {
            self.cb2_out = self.shift_register & 0x80 != 0;
            self.shift_register = self.shift_register.rotate_left(1);
        } else {
            self.shift_register = (self.shift_register << 1) | u8::from(self.cb2_in);
        }
        self.shifter.remaining -= 1;
        if self.shifter.remaining == 0 {
            if self.shift_mode() == 4 {
                // Free-running: recirculates without interrupting
                self.shifter.remaining = 8;
            } else {
                self.shifter.active = false;
                self.ifr |= IFR_SR;
                tracing::trace!(sr = self.shift_register, "VIA shift register complete");
            }
        }
    }

    fn step_shifter(&mut self) {
        if !self.shifter.active || matches!(self.shift_mode(), 0 | 3 | 7) {
            return;
        }
        self.shifter.countdown = self.shifter.countdown.saturating_sub(1);
        if self.shifter.countdown == 0 {
            self.shift_bit();
            self.shifter.countdown = self.shift_period();
        }
    }

    fn register_select(&self, offset: u16) -> u8 {
        ((offset >> self.register_shift) & 0x0F) as u8
    }

    /// Register contents without read side effects.
    fn register(&self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => self.with_pb7(self.port_b.pins()),
            0x01 | 0x0F => self.port_a.pins(),
            0x02 => self.port_b.ddr,
            0x03 => self.port_a.ddr,
            0x04 => self.t1.counter as u8,
            0x05 => (self.t1.counter >> 8) as u8,
            0x06 => self.t1.latch as u8,
            0x07 => (self.t1.latch >> 8) as u8,
            0x08 => self.t2.counter as u8,
            0x09 => (self.t2.counter >> 8) as u8,
            0x0A => self.shift_register,
            0x0B => self.acr,
            0x0C => self.pcr,
            0x0D => self.ifr(),
            _ => self.ier(),
        }
    }

    /// Flags cleared as a side effect of accessing `reg`.
    fn access_clears(reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => IFR_CB1 | IFR_CB2,
            0x01 => IFR_CA1 | IFR_CA2,
            0x0A => IFR_SR,
            _ => 0,
        }
    }

    fn step_cycle(&mut self) {
        if self.t1.step() {
            if self.t1.armed {
                self.ifr |= IFR_T1;
                tracing::trace!(latch = self.t1.latch, "VIA timer 1 underflow");
            }
            if self.t1_free_run() {
                self.t1.counter = self.t1.latch;
                self.pb7 = !self.pb7;
            } else {
                // One-shot: keeps counting from $FFFF but interrupts once
                self.t1.armed = false;
            }
        }

        if !self.t2_counts_pulses() && self.t2.step() && self.t2.armed {
            self.ifr |= IFR_T2;
            self.t2.armed = false;
        }

        self.step_shifter();
    }
}

impl Device for Via6522 {
    fn kind(&self) -> &'static str {
        "via"
    }

    fn read(&mut self, offset: u16) -> u8 {
        let reg = self.register_select(offset);
        let value = self.register(reg);
        self.ifr &= !Self::access_clears(reg);
        match reg {
            0x04 => self.ifr &= !IFR_T1,
            0x08 => self.ifr &= !IFR_T2,
            0x0A => self.start_shifting(),
            _ => {}
        }
        value
    }

    fn write(&mut self, offset: u16, value: u8) {
        let reg = self.register_select(offset);
        self.ifr &= !Self::access_clears(reg);
        match reg {
            0x00 => self.port_b.output = value,
            0x01 | 0x0F => self.port_a.output = value,
            0x02 => self.port_b.ddr = value,
            0x03 => self.port_a.ddr = value,
            0x04 | 0x06 => self.t1.latch = (self.t1.latch & 0xFF00) | u16::from(value),
            0x05 => {
                // Latch high, transfer latch to counter, arm
                self.t1.latch = (self.t1.latch & 0x00FF) | (u16::from(value) << 8);
                self.t1.counter = self.t1.latch;
                self.t1.armed = true;
                self.ifr &= !IFR_T1;
                self.pb7 = false;
            }
            0x07 => {
                self.t1.latch = (self.t1.latch & 0x00FF) | (u16::from(value) << 8);
                self.ifr &= !IFR_T1;
            }
            0x08 => self.t2.latch = (self.t2.latch & 0xFF00) | u16::from(value),
            0x09 => {
                self.t2.counter = (self.t2.latch & 0x00FF) | (u16::from(value) << 8);
                self.t2.armed = true;
                self.ifr &= !IFR_T2;
            }
            0x0A => {
                self.shift_register = value;
                self.start_shifting();
            }
            0x0B => {
                self.acr = value;
                if self.shift_mode() == 0 {
                    self.shifter.active = false;
                }
            }
            0x0C => self.pcr = value,
            0x0D => self.ifr &= !value,
            _ => {
                if value & 0x80 != 0 {
                    self.ier |= value & 0x7F;
                } else {
                    self.ier &= !value;
                }
            }
        }
    }

    fn peek(&self, offset: u16) -> u8 {
        self.register(self.register_select(offset))
    }

    fn tick(&mut self, elapsed: Ticks) {
        for _ in 0..elapsed.get() {
            self.step_cycle();
        }
    }

    fn irq(&self) -> bool {
        self.irq_asserted()
    }

    /// RESET clears the port, control and interrupt registers. Timers,
    /// latches and the shift register are not affected.
    fn reset(&mut self) {
        self.port_a.output = 0;
        self.port_a.ddr = 0;
        self.port_b.output = 0;
        self.port_b.ddr = 0;
        self.acr = 0;
        self.pcr = 0;
        self.ifr = 0;
        self.ier = 0;
        self.t1.armed = false;
        self.t2.armed = false;
        self.pb7 = false;
        self.cb2_out = false;
        self.shifter = Shifter::default();
    }

    fn ports(&self) -> &'static [PortInfo] {
        &PORTS
    }

    fn drive(&self, port: usize) -> Drive {
        match port {
            PORT_A => Drive::new(self.port_a.output, self.port_a.ddr),
            PORT_B => {
                let pb7 = if self.acr & 0x80 != 0 { 0x80 } else { 0 };
                Drive::new(self.with_pb7(self.port_b.output), self.port_b.ddr | pb7)
            }
            _ => Drive::FLOATING,
        }
    }

    fn sense(&mut self, port: usize, levels: u8, mask: u8) {
        match port {
            PORT_A => self.port_a.input = (self.port_a.input & !mask) | (levels & mask),
            PORT_B => self.sense_port_b(levels, mask),
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Observable for Via6522 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "ora" => Some(self.port_a.output.into()),
            "orb" => Some(self.port_b.output.into()),
            "ddra" => Some(self.port_a.ddr.into()),
            "ddrb" => Some(self.port_b.ddr.into()),
            "port_a" => Some(self.port_a.pins().into()),
            "port_b" => Some(self.with_pb7(self.port_b.pins()).into()),
            "t1.counter" => Some(self.t1.counter.into()),
            "t1.latch" => Some(self.t1.latch.into()),
            "t1.armed" => Some(self.t1.armed.into()),
            "t2.counter" => Some(self.t2.counter.into()),
            "t2.latch" => Some((self.t2.latch as u8).into()),
            "t2.armed" => Some(self.t2.armed.into()),
            "sr" => Some(self.shift_register.into()),
            "sr.active" => Some(self.shifter.active.into()),
            "cb2" => Some(self.cb2_out.into()),
            "acr" => Some(self.acr.into()),
            "pcr" => Some(self.pcr.into()),
            "ifr" => Some(self.ifr().into()),
            "ier" => Some(self.ier().into()),
            "irq" => Some(self.irq_asserted().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "ora", "orb", "ddra", "ddrb", "port_a", "port_b", "t1.counter", "t1.latch",
            "t1.armed", "t2.counter", "t2.latch", "t2.armed", "sr", "sr.active", "cb2", "acr",
            "pcr", "ifr", "ier", "irq",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(via: &mut Via6522, n: u64) {
        Device::tick(via, Ticks::new(n));
    }

    fn start_t1(via: &mut Via6522, count: u16) {
        via.write(0x04, count as u8);
        via.write(0x05, (count >> 8) as u8);
    }

    #[test]
    fn timer1_underflow_raises_flag() {
        let mut via = Via6522::new();
        start_t1(&mut via, 3);
        assert_eq!(via.timer1_counter(), 3);

        tick(&mut via, 3);
        assert_eq!(via.timer1_counter(), 0);
        assert_eq!(via.ifr() & IFR_T1, 0);

        tick(&mut via, 1);
        assert_ne!(via.ifr() & IFR_T1, 0);
    }

    #[test]
    fn timer1_underflow_asserts_irq_only_when_enabled() {
        let mut via = Via6522::new();
        start_t1(&mut via, 1);
        tick(&mut via, 2);
        assert!(!via.irq());

        via.write(0x0E, 0x80 | IFR_T1);
        assert!(via.irq());
        assert_eq!(via.read(0x0D) & 0xC0, 0xC0);
    }

    #[test]
    fn reading_t1_low_clears_flag_and_irq() {
        let mut via = Via6522::new();
        via.write(0x0E, 0x80 | IFR_T1);
        start_t1(&mut via, 0);
        tick(&mut via, 1);
        assert!(via.irq());

        let _ = via.read(0x04);
        assert_eq!(via.ifr() & IFR_T1, 0);
        assert!(!via.irq());
    }

    #[test]
    fn irq_stays_asserted_while_another_enabled_flag_is_set() {
        let mut via = Via6522::new();
        via.write(0x0E, 0x80 | IFR_T1 | IFR_CA1);
        via.write(0x0C, 0x01);
        via.set_ca1(true);
        start_t1(&mut via, 0);
        tick(&mut via, 1);

        let _ = via.read(0x04);
        assert!(via.irq(), "CA1 still pending");
        let _ = via.read(0x01);
        assert!(!via.irq());
    }

    #[test]
    fn timer1_one_shot_interrupts_once() {
        let mut via = Via6522::new();
        start_t1(&mut via, 2);
        tick(&mut via, 3);
        assert_ne!(via.ifr() & IFR_T1, 0);

        via.write(0x0D, IFR_T1);
        tick(&mut via, 0x1_0000);
        assert_eq!(via.ifr() & IFR_T1, 0);
    }

    #[test]
    fn timer1_free_run_reloads_and_toggles_pb7() {
        let mut via = Via6522::new();
        via.write(0x0B, 0xC0);
        via.write(0x02, 0x80);
        start_t1(&mut via, 2);

        tick(&mut via, 3);
        assert_ne!(via.ifr() & IFR_T1, 0);
        assert_eq!(via.timer1_counter(), 2);
        assert_eq!(via.port_b_output() & 0x80, 0x80);

        tick(&mut via, 3);
        assert_eq!(via.port_b_output() & 0x80, 0x00);
    }

    #[test]
    fn writing_t1_latch_high_clears_flag_without_starting() {
        let mut via = Via6522::new();
        start_t1(&mut via, 0);
        tick(&mut via, 1);
        let counter = via.timer1_counter();

        via.write(0x06, 0x10);
        via.write(0x07, 0x00);
        assert_eq!(via.ifr() & IFR_T1, 0);
        assert_eq!(via.timer1_counter(), counter);
    }

    #[test]
    fn timer2_one_shot_and_read_clear() {
        let mut via = Via6522::new();
        via.write(0x08, 3);
        via.write(0x09, 0);

        tick(&mut via, 4);
        assert_ne!(via.ifr() & IFR_T2, 0);

        let _ = via.read(0x08);
        assert_eq!(via.ifr() & IFR_T2, 0);
    }

    #[test]
    fn timer2_holds_in_pulse_counting_mode() {
        let mut via = Via6522::new();
        via.write(0x0B, 0x20);
        via.write(0x08, 5);
        via.write(0x09, 0);
        tick(&mut via, 10);
        assert_eq!(via.timer2_counter(), 5);
    }

    #[test]
    fn ifr_write_clears_selected_flags() {
        let mut via = Via6522::new();
        via.set_ca2_flag();
        via.set_cb2_flag();
        via.write(0x0D, IFR_CA2);
        assert_eq!(via.ifr(), IFR_CB2);
    }

    #[test]
    fn ier_set_and_clear() {
        let mut via = Via6522::new();
        via.write(0x0E, 0x80 | IFR_T1 | IFR_CB1);
        assert_eq!(via.read(0x0E), 0x80 | IFR_T1 | IFR_CB1);

        via.write(0x0E, IFR_T1);
        assert_eq!(via.read(0x0E), 0x80 | IFR_CB1);
    }

    #[test]
    fn port_reads_mix_outputs_and_inputs() {
        let mut via = Via6522::new();
        via.write(0x03, 0x0F);
        via.write(0x01, 0xAB);
        via.set_port_a_input(0xC0);
        assert_eq!(via.read(0x0F), 0xCB);
        assert_eq!(via.port_a_output(), 0x0B);

        via.set_port_b_input(0x42);
        assert_eq!(via.read(0x00), 0x42);
    }

    #[test]
    fn port_access_clears_handshake_flags() {
        let mut via = Via6522::new();
        via.write(0x0C, 0x11);
        via.set_ca1(true);
        via.set_cb1(true);
        via.set_ca2_flag();

        let _ = via.read(0x0F);
        assert_eq!(via.ifr() & (IFR_CA1 | IFR_CA2), IFR_CA1 | IFR_CA2);

        let _ = via.read(0x01);
        assert_eq!(via.ifr() & (IFR_CA1 | IFR_CA2), 0);
        assert_ne!(via.ifr() & IFR_CB1, 0);

        via.write(0x00, 0xFF);
        assert_eq!(via.ifr() & IFR_CB1, 0);
    }

    #[test]
    fn ca1_edge_follows_pcr() {
        let mut via = Via6522::new();
        // Negative edge by default
        via.set_ca1(true);
        assert_eq!(via.ifr() & IFR_CA1, 0);
        via.set_ca1(false);
        assert_ne!(via.ifr() & IFR_CA1, 0);
    }

    #[test]
    fn peek_has_no_side_effects() {
        let mut via = Via6522::new();
        start_t1(&mut via, 0);
        tick(&mut via, 1);
        assert_eq!(via.peek(0x04), 0xFF);
        assert_ne!(via.ifr() & IFR_T1, 0);
    }

    #[test]
    fn reset_clears_control_but_keeps_timers() {
        let mut via = Via6522::new();
        via.write(0x0E, 0xFF);
        via.write(0x02, 0xFF);
        start_t1(&mut via, 0x1234);
        via.reset();

        assert_eq!(via.read(0x0E), 0x80);
        assert_eq!(via.read(0x02), 0x00);
        assert_eq!(via.timer1_counter(), 0x1234);
        assert_eq!(via.query("t1.latch"), Some(Value::U16(0x1234)));
    }

    #[test]
    fn timer2_counts_pb6_falling_edges() {
        let mut via = Via6522::new();
        via.write(0x0B, 0x20);
        via.write(0x08, 2);
        via.write(0x09, 0);

        via.set_port_b_input(0x00);
        assert_eq!(via.timer2_counter(), 1);
        via.set_port_b_input(0x40);
        assert_eq!(via.timer2_counter(), 1, "rising edge does not count");
        via.set_port_b_input(0x00);
        assert_eq!(via.timer2_counter(), 0);
        assert_ne!(via.ifr() & IFR_T2, 0);

        via.write(0x0E, 0x80 | IFR_T2);
        assert!(via.irq());
    }

    #[test]
    fn shift_out_at_phase2_rate_sets_flag_after_eight_bits() {
        let mut via = Via6522::new();
        via.write(0x0E, 0x80 | IFR_SR);
        via.write(0x0B, 0x18);
        via.write(0x0A, 0b1000_0001);
        assert_eq!(via.query("sr.active"), Some(Value::Bool(true)));

        tick(&mut via, 2);
        assert!(via.cb2_output(), "bit 7 goes out first");
        tick(&mut via, 13);
        assert_eq!(via.ifr() & IFR_SR, 0);
        tick(&mut via, 1);
        assert_ne!(via.ifr() & IFR_SR, 0);
        assert!(via.irq());
        assert_eq!(via.shift_register(), 0b1000_0001, "shift out recirculates");

        let _ = via.read(0x0A);
        assert_eq!(via.ifr() & IFR_SR, 0);
    }

    #[test]
    fn shift_in_under_cb1_takes_cb2_levels() {
        let mut via = Via6522::new();
        via.write(0x0B, 0x0C);
        let _ = via.read(0x0A);
        for bit in [true, false, true, true, false, false, true, false] {
            via.set_cb2(bit);
            via.set_cb1(true);
            via.set_cb1(false);
        }
        assert_eq!(via.shift_register(), 0b1011_0010);
        assert_ne!(via.ifr() & IFR_SR, 0);
    }

    #[test]
    fn shift_register_is_inert_when_disabled() {
        let mut via = Via6522::new();
        via.write(0x0A, 0x55);
        tick(&mut via, 100);
        assert_eq!(via.shift_register(), 0x55);
        assert_eq!(via.ifr() & IFR_SR, 0);
    }

    #[test]
    fn register_select_honours_address_shift() {
        let mut via = Via6522::with_register_shift(4);
        via.write(0x03 << 4, 0xF0);
        assert_eq!(via.query("ddra"), Some(Value::U8(0xF0)));
        assert_eq!(via.peek(0x03 << 4), 0xF0);
        assert_eq!(via.read(0x0E << 4), 0x80);
    }

    #[test]
    fn ports_drive_outputs_and_sense_inputs() {
        let mut via = Via6522::new();
        assert_eq!(via.ports()[1].name, "PB");
        via.write(0x03, 0xE0);
        via.write(0x01, 0xA5);
        assert_eq!(via.drive(0), Drive::new(0xA5, 0xE0));

        // Low nibble pulled down from outside; bit 4 is an input left high
        via.sense(0, 0x00, 0x0F);
        assert_eq!(via.read(0x0F), 0xB0);
        assert_eq!(via.drive(1), Drive::FLOATING);
    }
}
