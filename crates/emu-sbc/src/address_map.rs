//! Address decoding and device dispatch.
//!
//! Devices own non-overlapping windows of the 16-bit address space. The
//! windows are kept sorted by start address, so finding the owner of an
//! address is a binary search over the configured devices, independent of
//! the size of the address space. Devices see window-relative offsets.
//!
//! Addresses no window claims read as [`OPEN_BUS`] and swallow writes.
//! Devices reached only through wiring are attached without a window;
//! they tick and raise interrupts like any other device.

use std::ops::RangeInclusive;

use emu_core::{Bus, Device, Observable, Ticks, Value};
use serde::Deserialize;

use crate::error::ConfigurationError;

/// Value read from an address with no device behind it. The data lines
/// float high on a typical breadboard build.
pub const OPEN_BUS: u8 = 0xFF;

/// Handle to a registered device. Stable for the life of the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(usize);

/// CPU input a device's interrupt output is wired to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrqLine {
    #[default]
    Irq,
    Nmi,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: u16,
    end: u16,
    id: DeviceId,
}

struct Slot {
    name: String,
    range: Option<RangeInclusive<u16>>,
    line: IrqLine,
    device: Box<dyn Device>,
}

/// The board's bus: every CPU access lands here and is routed by address.
pub struct AddressMap {
    slots: Vec<Slot>,
    windows: Vec<Window>,
    last_address: u16,
    last_data: u8,
    last_write: bool,
}

impl Default for AddressMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            windows: Vec::new(),
            last_address: 0,
            last_data: 0,
            last_write: false,
        }
    }

    /// Map `device` over `range`. Fails without changing the map if the
    /// range overlaps an existing window or the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        range: RangeInclusive<u16>,
        line: IrqLine,
        device: Box<dyn Device>,
    ) -> Result<DeviceId, ConfigurationError> {
        let name = name.into();
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return Err(ConfigurationError::InvertedRange {
                name,
                start: u64::from(start),
                end: u64::from(end),
            });
        }
        if self.find(&name).is_some() {
            return Err(ConfigurationError::DuplicateName(name));
        }

        let index = self.windows.partition_point(|w| w.start < start);
        let before = index.checked_sub(1).map(|i| self.windows[i]);
        let after = self.windows.get(index).copied();
        let clash = before
            .filter(|w| w.end >= start)
            .or(after.filter(|w| w.start <= end));
        if let Some(existing) = clash {
            return Err(ConfigurationError::Overlap {
                name,
                start,
                end,
                existing: self.slots[existing.id.0].name.clone(),
                existing_start: existing.start,
                existing_end: existing.end,
            });
        }

        let id = DeviceId(self.slots.len());
        tracing::debug!(
            name = %name,
            kind = device.kind(),
            start = format_args!("${start:04X}"),
            end = format_args!("${end:04X}"),
            "device mapped"
        );
        self.slots.push(Slot {
            name,
            range: Some(range),
            line,
            device,
        });
        self.windows.insert(index, Window { start, end, id });
        Ok(id)
    }

    /// Add `device` without an address window.
    pub fn attach(
        &mut self,
        name: impl Into<String>,
        line: IrqLine,
        device: Box<dyn Device>,
    ) -> Result<DeviceId, ConfigurationError> {
        let name = name.into();
        if self.find(&name).is_some() {
            return Err(ConfigurationError::DuplicateName(name));
        }
        tracing::debug!(name = %name, kind = device.kind(), "device attached off the address bus");
        let id = DeviceId(self.slots.len());
        self.slots.push(Slot {
            name,
            range: None,
            line,
            device,
        });
        Ok(id)
    }

    fn window(&self, address: u16) -> Option<Window> {
        let index = self.windows.partition_point(|w| w.start <= address);
        let window = self.windows[..index].last().copied()?;
        (address <= window.end).then_some(window)
    }

    /// Device owning `address` and the offset within its window.
    #[must_use]
    pub fn resolve(&self, address: u16) -> Option<(DeviceId, u16)> {
        self.window(address)
            .map(|w| (w.id, address - w.start))
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<DeviceId> {
        self.slots
            .iter()
            .position(|slot| slot.name == name)
            .map(DeviceId)
    }

    #[must_use]
    pub fn device(&self, id: DeviceId) -> &dyn Device {
        self.slots[id.0].device.as_ref()
    }

    pub fn device_mut(&mut self, id: DeviceId) -> &mut dyn Device {
        self.slots[id.0].device.as_mut()
    }

    #[must_use]
    pub fn name(&self, id: DeviceId) -> &str {
        &self.slots[id.0].name
    }

    /// Address window of `id`, None for attached devices.
    #[must_use]
    pub fn range(&self, id: DeviceId) -> Option<RangeInclusive<u16>> {
        self.slots[id.0].range.clone()
    }

    #[must_use]
    pub fn irq_line(&self, id: DeviceId) -> IrqLine {
        self.slots[id.0].line
    }

    /// Mapped devices in address order, then attached ones.
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        let attached = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.range.is_none())
            .map(|(index, _)| DeviceId(index));
        self.windows.iter().map(|w| w.id).chain(attached)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Advance every device by `elapsed` cycles.
    pub fn tick_devices(&mut self, elapsed: Ticks) {
        for slot in &mut self.slots {
            slot.device.tick(elapsed);
        }
    }

    /// Wired-OR of the device interrupt outputs as (IRQ, NMI).
    #[must_use]
    pub fn interrupt_lines(&self) -> (bool, bool) {
        self.slots
            .iter()
            .filter(|slot| slot.device.irq())
            .fold((false, false), |(irq, nmi), slot| match slot.line {
                IrqLine::Irq => (true, nmi),
                IrqLine::Nmi => (irq, true),
            })
    }

    pub fn reset_devices(&mut self) {
        for slot in &mut self.slots {
            slot.device.reset();
        }
    }

    /// Address on the bus during the most recent access.
    #[must_use]
    pub fn last_address(&self) -> u16 {
        self.last_address
    }

    /// Data on the bus during the most recent access.
    #[must_use]
    pub fn last_data(&self) -> u8 {
        self.last_data
    }

    /// True if the most recent access was a write.
    #[must_use]
    pub fn last_was_write(&self) -> bool {
        self.last_write
    }
}

impl Bus for AddressMap {
    fn read(&mut self, address: u16) -> u8 {
        let value = match self.window(address) {
            Some(w) => self.slots[w.id.0].device.read(address - w.start),
            None => {
                tracing::trace!(address = format_args!("${address:04X}"), "open bus read");
                OPEN_BUS
            }
        };
        self.last_address = address;
        self.last_data = value;
        self.last_write = false;
        value
    }

    fn write(&mut self, address: u16, value: u8) {
        match self.window(address) {
            Some(w) => self.slots[w.id.0].device.write(address - w.start, value),
            None => {
                tracing::trace!(address = format_args!("${address:04X}"), value, "open bus write");
            }
        }
        self.last_address = address;
        self.last_data = value;
        self.last_write = true;
    }

    fn peek(&self, address: u16) -> u8 {
        match self.window(address) {
            Some(w) => self.slots[w.id.0].device.peek(address - w.start),
            None => OPEN_BUS,
        }
    }
}

impl Observable for AddressMap {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "address" => Some(self.last_address.into()),
            "data" => Some(self.last_data.into()),
            "rw" => Some(if self.last_write { "W" } else { "R" }.into()),
            "devices" => Some(Value::Array(
                self.devices().map(|id| self.name(id).into()).collect(),
            )),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["address", "data", "rw", "devices"]
    }
}
