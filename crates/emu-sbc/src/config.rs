//! Board description.
//!
//! Boards are described in JSON:
//!
//! ```json
//! {
//!   "clock_hz": 1000000,
//!   "illegal_opcodes": "halt",
//!   "devices": [
//!     { "name": "ram", "type": "memory", "kind": "ram", "start": "$0000", "end": "$3FFF" },
//!     { "name": "via", "type": "via", "start": "$6000", "end": "$600F", "irq_line": "irq" },
//!     { "name": "rom", "type": "memory", "kind": "rom", "start": "$8000", "end": "$FFFF",
//!       "image": "rom.bin" }
//!   ]
//! }
//! ```
//!
//! Addresses are integers or strings in decimal, `0x` hex or `$` hex.
//! Image paths are relative to the board file.
//!
//! # Wiring
//!
//! `buses` declares named auxiliary buses, and a device's `connections`
//! tie a field of one of its ports to a field of a bus. The hobby layout
//! with the LCD on VIA port B and EN/RW/RS on PA7-PA5:
//!
//! ```json
//! {
//!   "buses": [ { "name": "lcd_data", "width": 8 }, { "name": "lcd_ctl", "width": 3 } ],
//!   "devices": [
//!     { "name": "via", "type": "via", "start": "$6000", "end": "$600F",
//!       "connections": [
//!         { "port": "PB", "port_mask": "$FF", "bus": "lcd_data", "bus_mask": "$FF" },
//!         { "port": "PA", "port_mask": "$E0", "bus": "lcd_ctl", "bus_mask": "$07" }
//!       ] },
//!     { "name": "lcd", "type": "lcd",
//!       "connections": [
//!         { "port": "DATA", "port_mask": "$FF", "bus": "lcd_data", "bus_mask": "$FF" },
//!         { "port": "RS", "port_mask": 1, "bus": "lcd_ctl", "bus_mask": 1 },
//!         { "port": "RW", "port_mask": 1, "bus": "lcd_ctl", "bus_mask": 2 },
//!         { "port": "EN", "port_mask": 1, "bus": "lcd_ctl", "bus_mask": 4 }
//!       ] }
//!   ]
//! }
//! ```
//!
//! An LCD reached only through its pins needs no address window.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use emu_core::{Device, MasterClock};
use hitachi_hd44780::{DEFAULT_BUSY_CYCLES, Hd44780};
use mos_6502::IllegalOpcodePolicy;
use mos_acia_6551::Acia6551;
use mos_via_6522::Via6522;
use serde::{Deserialize, Deserializer};

use crate::address_map::IrqLine;
use crate::error::ConfigurationError;
use crate::memory::{Memory, MemoryKind};

/// Default CPU clock: 1 MHz.
pub const DEFAULT_CLOCK_HZ: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IllegalOpcodes {
    #[default]
    Halt,
    Emulate,
}

impl From<IllegalOpcodes> for IllegalOpcodePolicy {
    fn from(value: IllegalOpcodes) -> Self {
        match value {
            IllegalOpcodes::Halt => Self::Halt,
            IllegalOpcodes::Emulate => Self::Emulate,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub clock_hz: Option<u64>,
    #[serde(default)]
    pub illegal_opcodes: IllegalOpcodes,
    #[serde(default)]
    pub buses: Vec<BusConfig>,
    pub devices: Vec<DeviceConfig>,
}

/// A named auxiliary bus, up to 64 wires.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub name: String,
    #[serde(default = "default_bus_width")]
    pub width: u8,
}

/// Ties the bits of `port_mask` on a device port to the bits of
/// `bus_mask` on a bus. Both masks are contiguous and equally wide.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub port: String,
    #[serde(deserialize_with = "deserialize_number")]
    pub port_mask: u64,
    pub bus: String,
    #[serde(deserialize_with = "deserialize_number")]
    pub bus_mask: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub start: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub end: Option<u64>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(flatten)]
    pub kind: DeviceKind,
}

/// Type-specific device parameters, tagged by `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceKind {
    Memory {
        #[serde(default)]
        kind: MemoryKind,
        #[serde(default)]
        image: Option<PathBuf>,
        #[serde(default)]
        fill: Option<u8>,
    },
    Via {
        #[serde(default)]
        irq_line: IrqLine,
        /// Address line carrying RS0.
        #[serde(default)]
        register_shift: u8,
    },
    Lcd {
        #[serde(default = "default_busy_cycles")]
        busy_cycles: u64,
    },
    Acia {
        #[serde(default)]
        irq_line: IrqLine,
    },
}

fn default_busy_cycles() -> u64 {
    DEFAULT_BUSY_CYCLES
}

fn default_bus_width() -> u8 {
    8
}

/// Parse `8000`, `0x8000` or `$8000` style addresses.
pub fn parse_address(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix('$') {
        u64::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| format!("invalid address {text:?}"))
}

fn deserialize_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => parse_address(&text).map_err(serde::de::Error::custom),
    }
}

fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_number(deserializer).map(Some)
}

impl BoardConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a board file. Relative image paths are resolved against the
    /// file's directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&text)?;
        let base = path.parent().unwrap_or(Path::new(""));
        for device in &mut config.devices {
            if let DeviceKind::Memory {
                image: Some(image), ..
            } = &mut device.kind
            {
                if image.is_relative() {
                    *image = base.join(&*image);
                }
            }
        }
        Ok(config)
    }

    #[must_use]
    pub fn clock(&self) -> MasterClock {
        MasterClock::new(self.clock_hz.unwrap_or(DEFAULT_CLOCK_HZ))
    }

    #[must_use]
    pub fn illegal_policy(&self) -> IllegalOpcodePolicy {
        self.illegal_opcodes.into()
    }
}

impl Default for BoardConfig {
    /// The classic breadboard layout: 16K RAM, ACIA, VIA and LCD in the
    /// I/O area, 32K ROM at the top.
    fn default() -> Self {
        let device = |name: &str, start: u64, end: u64, kind: DeviceKind| DeviceConfig {
            name: name.to_string(),
            start: Some(start),
            end: Some(end),
            connections: Vec::new(),
            kind,
        };
        Self {
            clock_hz: None,
            illegal_opcodes: IllegalOpcodes::default(),
            buses: Vec::new(),
            devices: vec![
                device(
                    "ram",
                    0x0000,
                    0x3FFF,
                    DeviceKind::Memory {
                        kind: MemoryKind::Ram,
                        image: None,
                        fill: None,
                    },
                ),
                device("acia", 0x5000, 0x5003, DeviceKind::Acia { irq_line: IrqLine::Irq }),
                device(
                    "via",
                    0x6000,
                    0x600F,
                    DeviceKind::Via {
                        irq_line: IrqLine::Irq,
                        register_shift: 0,
                    },
                ),
                device(
                    "lcd",
                    0x6100,
                    0x6101,
                    DeviceKind::Lcd {
                        busy_cycles: DEFAULT_BUSY_CYCLES,
                    },
                ),
                device(
                    "rom",
                    0x8000,
                    0xFFFF,
                    DeviceKind::Memory {
                        kind: MemoryKind::Rom,
                        image: None,
                        fill: Some(0xEA),
                    },
                ),
            ],
        }
    }
}

impl DeviceConfig {
    /// Validated window for this device, or None for an LCD wired only
    /// through its pins.
    pub fn range(&self) -> Result<Option<RangeInclusive<u16>>, ConfigurationError> {
        let (start, end) = match (self.start, self.end) {
            (Some(start), Some(end)) => (start, end),
            (None, None) if matches!(self.kind, DeviceKind::Lcd { .. }) => return Ok(None),
            (None, None) => return Err(self.invalid("needs an address window")),
            _ => return Err(self.invalid("start and end must be given together")),
        };
        if start > end {
            return Err(ConfigurationError::InvertedRange {
                name: self.name.clone(),
                start,
                end,
            });
        }
        match (u16::try_from(start), u16::try_from(end)) {
            (Ok(start), Ok(end)) => Ok(Some(start..=end)),
            _ => Err(ConfigurationError::OutOfRange {
                name: self.name.clone(),
                start,
                end,
            }),
        }
    }

    /// Window size in bytes, 0 without a window.
    #[must_use]
    pub fn size(&self) -> usize {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end >= start => (end - start + 1) as usize,
            _ => 0,
        }
    }

    #[must_use]
    pub fn irq_line(&self) -> IrqLine {
        match self.kind {
            DeviceKind::Via { irq_line, .. } | DeviceKind::Acia { irq_line } => irq_line,
            DeviceKind::Memory { .. } | DeviceKind::Lcd { .. } => IrqLine::Irq,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::InvalidParameter {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Construct the device, reading its image if it has one.
    pub fn build(&self) -> Result<Box<dyn Device>, ConfigurationError> {
        let device: Box<dyn Device> = match &self.kind {
            DeviceKind::Memory { kind, image, fill } => {
                let fill = fill.unwrap_or(0);
                let contents = match image {
                    Some(path) => fs::read(path).map_err(|source| ConfigurationError::Image {
                        name: self.name.clone(),
                        path: path.clone(),
                        source,
                    })?,
                    None => Vec::new(),
                };
                if contents.len() > self.size() {
                    return Err(self.invalid(format!(
                        "image is {} bytes but the window holds {}",
                        contents.len(),
                        self.size()
                    )));
                }
                let mut memory = Memory::new(*kind, self.size(), fill);
                memory.program(0, &contents);
                Box::new(memory)
            }
            DeviceKind::Via { register_shift, .. } => {
                let shift = *register_shift;
                if shift > 12 {
                    return Err(self.invalid("register_shift leaves no room for RS0-RS3"));
                }
                let needed = 16_usize << shift;
                if self.size() < needed {
                    return Err(self.invalid(format!(
                        "a VIA with register_shift {shift} needs {needed} addresses"
                    )));
                }
                Box::new(Via6522::with_register_shift(shift))
            }
            DeviceKind::Lcd { busy_cycles } => {
                if self.start.is_some() && self.size() < 2 {
                    return Err(self.invalid("an LCD needs two addresses (instruction and data)"));
                }
                Box::new(Hd44780::new(*busy_cycles))
            }
            DeviceKind::Acia { .. } => Box::new(Acia6551::new()),
        };
        Ok(device)
    }
}
