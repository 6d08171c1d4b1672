//! Hitachi HD44780 dot-matrix character LCD controller.
//!
//! The controller is wired straight onto the data bus with address bit 0
//! as RS: even offsets reach the instruction register (writes) and the
//! busy flag / address counter (reads), odd offsets reach display or
//! character-generator RAM.
//!
//! Display RAM is modelled as 80 linear cells. In two-line mode the
//! hardware addresses $00-$27 map to cells 0-39 and $40-$67 to cells
//! 40-79, so the address counter steps from $27 to $40 exactly as the
//! chip does.
//!
//! # Pin interface
//!
//! On boards where the module hangs off VIA ports instead of the system
//! bus, the board wires its DATA (DB0-DB7), RS, RW and EN pins. A write
//! is taken when EN falls with RW low; a read puts the status or RAM byte
//! on DB0-DB7 when EN rises with RW high, and holds it there while EN and
//! RW stay high. Pins are evaluated once per tick, so a change made by
//! the CPU is acted on during the following cycle.

use std::any::Any;

use emu_core::{Device, Drive, Observable, PortInfo, Ticks, Value};

/// Display RAM cells.
pub const DDRAM_SIZE: usize = 80;
/// Character generator RAM bytes (8 characters of 8 rows).
pub const CGRAM_SIZE: usize = 64;
/// Cells per display line.
pub const LINE_LENGTH: u8 = 40;
/// Visible characters per line on the common 16x2 module.
pub const VISIBLE_COLUMNS: u8 = 16;
/// Busy time for an instruction, in bus cycles (about 37us at 1 MHz).
pub const DEFAULT_BUSY_CYCLES: u64 = 40;

const PORTS: [PortInfo; 4] = [
    PortInfo::new("DATA", 8),
    PortInfo::new("RS", 1),
    PortInfo::new("RW", 1),
    PortInfo::new("EN", 1),
];
const PORT_DATA: usize = 0;
const PORT_RS: usize = 1;
const PORT_RW: usize = 2;
const PORT_EN: usize = 3;

/// Levels on the MPU interface pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Pins {
    data: u8,
    rs: bool,
    rw: bool,
    en: bool,
}

/// Which RAM the address counter points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Ddram,
    Cgram,
}

/// HD44780 controller state.
#[derive(Debug)]
pub struct Hd44780 {
    ddram: [u8; DDRAM_SIZE],
    cgram: [u8; CGRAM_SIZE],
    /// Cell index into DDRAM (0-79) or byte index into CGRAM (0-63).
    address: u8,
    target: Target,
    /// Entry mode I/D.
    increment: bool,
    /// Entry mode S: shift the display on every data write.
    shift_on_write: bool,
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
    eight_bit: bool,
    two_line: bool,
    large_font: bool,
    /// DDRAM column shown at the left edge (0-39).
    shift: u8,
    busy: u64,
    busy_cycles: u64,
    /// Pin levels as last sensed from the wiring.
    pins: Pins,
    /// Pin levels at the previous evaluation, for edge detection.
    clocked: Pins,
    /// Byte driven on DB0-DB7 during a pin-interface read.
    output: Option<u8>,
}

impl Default for Hd44780 {
    fn default() -> Self {
        Self::new(DEFAULT_BUSY_CYCLES)
    }
}

impl Hd44780 {
    /// Power-on state. `busy_cycles` is how long each instruction or data
    /// write keeps the busy flag set.
    #[must_use]
    pub fn new(busy_cycles: u64) -> Self {
        Self {
            ddram: [b' '; DDRAM_SIZE],
            cgram: [0; CGRAM_SIZE],
            address: 0,
            target: Target::Ddram,
            increment: true,
            shift_on_write: false,
            display_on: false,
            cursor_on: false,
            blink_on: false,
            eight_bit: true,
            two_line: false,
            large_font: false,
            shift: 0,
            busy: 0,
            busy_cycles,
            pins: Pins::default(),
            clocked: Pins::default(),
            output: None,
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy > 0
    }

    /// Cursor position as a DDRAM cell index.
    #[must_use]
    pub fn cursor(&self) -> u8 {
        self.address
    }

    #[must_use]
    pub fn display_shift(&self) -> u8 {
        self.shift
    }

    #[must_use]
    pub fn is_display_on(&self) -> bool {
        self.display_on
    }

    #[must_use]
    pub fn is_cursor_on(&self) -> bool {
        self.cursor_on
    }

    #[must_use]
    pub fn is_blink_on(&self) -> bool {
        self.blink_on
    }

    #[must_use]
    pub fn is_two_line(&self) -> bool {
        self.two_line
    }

    #[must_use]
    pub fn ddram(&self) -> &[u8; DDRAM_SIZE] {
        &self.ddram
    }

    /// Row patterns of custom character `code` (0-7).
    #[must_use]
    pub fn custom_char(&self, code: u8) -> &[u8] {
        let start = usize::from(code & 0x07) * 8;
        &self.cgram[start..start + 8]
    }

    /// Number of display lines selected by function set.
    #[must_use]
    pub fn lines(&self) -> u8 {
        if self.two_line { 2 } else { 1 }
    }

    /// Text currently visible on `row`, honouring the display shift.
    /// Non-printable codes (custom characters and the Japanese ROM half)
    /// render as `?`. Returns `None` for rows the display does not have.
    #[must_use]
    pub fn visible_line(&self, row: u8) -> Option<String> {
        if row >= self.lines() {
            return None;
        }
        let base = usize::from(row) * usize::from(LINE_LENGTH);
        let text = (0..VISIBLE_COLUMNS)
            .map(|col| {
                let cell = base + usize::from((self.shift + col) % LINE_LENGTH);
                let code = self.ddram[cell];
                if (0x20..0x7F).contains(&code) {
                    char::from(code)
                } else {
                    '?'
                }
            })
            .collect();
        Some(text)
    }

    /// Address counter as the chip reports it.
    fn address_counter(&self) -> u8 {
        match self.target {
            Target::Cgram => self.address,
            Target::Ddram if self.two_line && self.address >= LINE_LENGTH => {
                0x40 + (self.address - LINE_LENGTH)
            }
            Target::Ddram => self.address,
        }
    }

    fn set_ddram_address(&mut self, hw: u8) {
        self.target = Target::Ddram;
        self.address = if self.two_line {
            let column = (hw & 0x3F) % LINE_LENGTH;
            if hw & 0x40 != 0 { LINE_LENGTH + column } else { column }
        } else {
            hw % DDRAM_SIZE as u8
        };
    }

    fn advance(&mut self) {
        let size = match self.target {
            Target::Ddram => DDRAM_SIZE as u8,
            Target::Cgram => CGRAM_SIZE as u8,
        };
        self.address = if self.increment {
            (self.address + 1) % size
        } else {
            (self.address + size - 1) % size
        };
    }

    /// Move the display window one column. Shifting left shows later cells.
    fn shift_display(&mut self, left: bool) {
        self.shift = if left {
            (self.shift + 1) % LINE_LENGTH
        } else {
            (self.shift + LINE_LENGTH - 1) % LINE_LENGTH
        };
    }

    fn execute(&mut self, command: u8) {
        match command.leading_zeros() {
            0 => self.set_ddram_address(command & 0x7F),
            1 => {
                self.target = Target::Cgram;
                self.address = command & 0x3F;
            }
            2 => {
                self.eight_bit = command & 0x10 != 0;
                self.two_line = command & 0x08 != 0;
                self.large_font = command & 0x04 != 0;
            }
            3 => {
                let right = command & 0x04 != 0;
                if command & 0x08 != 0 {
                    self.shift_display(!right);
                } else {
                    let size = DDRAM_SIZE as u8;
                    self.address = if right {
                        (self.address + 1) % size
                    } else {
                        (self.address + size - 1) % size
                    };
                }
            }
            4 => {
                self.display_on = command & 0x04 != 0;
                self.cursor_on = command & 0x02 != 0;
                self.blink_on = command & 0x01 != 0;
            }
            5 => {
                self.increment = command & 0x02 != 0;
                self.shift_on_write = command & 0x01 != 0;
            }
            6 => {
                // Return home
                self.target = Target::Ddram;
                self.address = 0;
                self.shift = 0;
            }
            7 => {
                // Clear display
                self.ddram = [b' '; DDRAM_SIZE];
                self.target = Target::Ddram;
                self.address = 0;
                self.shift = 0;
                self.increment = true;
            }
            _ => {}
        }
    }

    fn write_data(&mut self, value: u8) {
        match self.target {
            Target::Ddram => {
                self.ddram[usize::from(self.address)] = value;
                if self.shift_on_write {
                    self.shift_display(self.increment);
                }
            }
            Target::Cgram => self.cgram[usize::from(self.address)] = value,
        }
        self.advance();
    }

    fn current_data(&self) -> u8 {
        match self.target {
            Target::Ddram => self.ddram[usize::from(self.address)],
            Target::Cgram => self.cgram[usize::from(self.address)],
        }
    }

    fn status(&self) -> u8 {
        let busy = if self.is_busy() { 0x80 } else { 0 };
        busy | (self.address_counter() & 0x7F)
    }

    /// Instruction (RS low) or data (RS high) write from either interface.
    fn accept(&mut self, rs: bool, value: u8) {
        if self.is_busy() {
            tracing::debug!(rs, value, remaining = self.busy, "LCD write ignored while busy");
            return;
        }
        if rs {
            self.write_data(value);
        } else {
            self.execute(value);
        }
        self.busy = self.busy_cycles;
    }

    /// Status (RS low) or RAM (RS high) read from either interface.
    fn respond(&mut self, rs: bool) -> u8 {
        if rs {
            let value = self.current_data();
            self.advance();
            value
        } else {
            self.status()
        }
    }

    /// Act on EN edges seen since the previous tick.
    fn clock_pins(&mut self) {
        let (before, now) = (self.clocked, self.pins);
        self.clocked = now;
        if !now.en || !now.rw {
            self.output = None;
        }

        if now.en && !before.en && now.rw {
            self.output = Some(self.respond(now.rs));
        } else if before.en && !now.en && !now.rw {
            if (before.rs, before.rw) != (now.rs, now.rw) {
                tracing::debug!("LCD write ignored: RS/RW changed while EN was high");
                return;
            }
            self.accept(now.rs, now.data);
        }
    }
}

impl Device for Hd44780 {
    fn kind(&self) -> &'static str {
        "lcd"
    }

    fn read(&mut self, offset: u16) -> u8 {
        self.respond(offset & 1 != 0)
    }

    fn write(&mut self, offset: u16, value: u8) {
        self.accept(offset & 1 != 0, value);
    }

    fn peek(&self, offset: u16) -> u8 {
        if offset & 1 == 0 {
            self.status()
        } else {
            self.current_data()
        }
    }

    fn tick(&mut self, elapsed: Ticks) {
        self.busy = self.busy.saturating_sub(elapsed.get());
        self.clock_pins();
    }

    fn ports(&self) -> &'static [PortInfo] {
        &PORTS
    }

    fn drive(&self, port: usize) -> Drive {
        match (port, self.output) {
            (PORT_DATA, Some(value)) => Drive::new(value, 0xFF),
            _ => Drive::FLOATING,
        }
    }

    fn sense(&mut self, port: usize, levels: u8, mask: u8) {
        let line = (mask & 1 != 0).then_some(levels & 1 != 0);
        match (port, line) {
            (PORT_DATA, _) => self.pins.data = (self.pins.data & !mask) | (levels & mask),
            (PORT_RS, Some(level)) => self.pins.rs = level,
            (PORT_RW, Some(level)) => self.pins.rw = level,
            (PORT_EN, Some(level)) => self.pins.en = level,
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

impl Observable for Hd44780 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "address" => Some(self.address_counter().into()),
            "cursor" => Some(self.address.into()),
            "busy" => Some(self.is_busy().into()),
            "display_on" => Some(self.display_on.into()),
            "cursor_on" => Some(self.cursor_on.into()),
            "blink_on" => Some(self.blink_on.into()),
            "two_line" => Some(self.two_line.into()),
            "eight_bit" => Some(self.eight_bit.into()),
            "large_font" => Some(self.large_font.into()),
            "shift" => Some(self.shift.into()),
            "line0" => self.visible_line(0).map(Value::from),
            "line1" => self.visible_line(1).map(Value::from),
            "ddram" => Some(Value::from(&self.ddram[..])),
            "cgram" => Some(Value::from(&self.cgram[..])),
            "pins.data" => Some(self.pins.data.into()),
            "pins.rs" => Some(self.pins.rs.into()),
            "pins.rw" => Some(self.pins.rw.into()),
            "pins.en" => Some(self.pins.en.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "address", "cursor", "busy", "display_on", "cursor_on", "blink_on", "two_line",
            "eight_bit", "large_font", "shift", "line0", "line1", "ddram", "cgram", "pins.data",
            "pins.rs", "pins.rw", "pins.en",
        ]
    }
}
