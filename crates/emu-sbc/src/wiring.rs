//! Auxiliary buses between device ports.
//!
//! Besides the system bus a board can run named wire buses between device
//! pins: the LCD data lines on VIA port B, say, and its EN/RW/RS lines on
//! the top of port A. A connection ties a contiguous field of port bits to
//! an equally wide field of bus bits.
//!
//! After every cycle each connected port drives its output bits onto its
//! bus, then every connected port senses its bus. A bus keeps its last
//! level when nothing drives it; where two ports drive the same wire the
//! later connection wins.

use emu_core::Drive;

use crate::address_map::{AddressMap, DeviceId};
use crate::config::{BusConfig, ConnectionConfig, DeviceConfig};
use crate::error::ConfigurationError;

#[derive(Debug, Clone)]
struct WireBus {
    name: String,
    width: u8,
    levels: u64,
}

impl WireBus {
    fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1 << self.width) - 1
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Link {
    device: DeviceId,
    port: usize,
    port_mask: u8,
    bus: usize,
    bus_mask: u64,
}

impl Link {
    /// Port bits to their bus positions.
    fn to_bus(self, levels: u8) -> u64 {
        let field = u64::from((levels & self.port_mask) >> self.port_mask.trailing_zeros());
        (field << self.bus_mask.trailing_zeros()) & self.bus_mask
    }

    /// Bus bits to their port positions.
    fn to_port(self, levels: u64) -> u8 {
        let field = (levels & self.bus_mask) >> self.bus_mask.trailing_zeros();
        (field << self.port_mask.trailing_zeros()) as u8 & self.port_mask
    }

    fn apply(self, drive: Drive, bus: &mut WireBus) {
        let driven = self.to_bus(drive.mask);
        bus.levels = (bus.levels & !driven) | (self.to_bus(drive.levels) & driven);
    }
}

/// The board's auxiliary buses and the port connections onto them.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    buses: Vec<WireBus>,
    links: Vec<Link>,
}

fn is_contiguous(mask: u64) -> bool {
    let field = mask >> mask.trailing_zeros();
    field & field.wrapping_add(1) == 0
}

impl Wiring {
    /// Resolve every connection in `devices` against `buses` and the
    /// devices already placed in `map`.
    pub fn new(
        buses: &[BusConfig],
        devices: &[DeviceConfig],
        map: &AddressMap,
    ) -> Result<Self, ConfigurationError> {
        let mut wiring = Self::default();
        for bus in buses {
            if !(1..=64).contains(&bus.width) {
                return Err(ConfigurationError::InvalidParameter {
                    name: bus.name.clone(),
                    reason: format!("bus width {} is not 1-64", bus.width),
                });
            }
            if wiring.bus_index(&bus.name).is_some() {
                return Err(ConfigurationError::DuplicateName(bus.name.clone()));
            }
            wiring.buses.push(WireBus {
                name: bus.name.clone(),
                width: bus.width,
                levels: 0,
            });
        }

        for device in devices {
            let Some(id) = map.find(&device.name) else {
                continue;
            };
            for connection in &device.connections {
                let link = wiring.link(&device.name, id, connection, map)?;
                tracing::debug!(
                    device = %device.name,
                    port = %connection.port,
                    bus = %connection.bus,
                    "port connected"
                );
                wiring.links.push(link);
            }
        }
        Ok(wiring)
    }

    fn bus_index(&self, name: &str) -> Option<usize> {
        self.buses.iter().position(|bus| bus.name == name)
    }

    fn link(
        &self,
        name: &str,
        id: DeviceId,
        connection: &ConnectionConfig,
        map: &AddressMap,
    ) -> Result<Link, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidParameter {
            name: name.to_string(),
            reason,
        };

        let ports = map.device(id).ports();
        let port = ports
            .iter()
            .position(|port| port.name == connection.port)
            .ok_or_else(|| ConfigurationError::UnknownPort {
                device: name.to_string(),
                port: connection.port.clone(),
            })?;
        let bus = self
            .bus_index(&connection.bus)
            .ok_or_else(|| ConfigurationError::UnknownBus {
                device: name.to_string(),
                bus: connection.bus.clone(),
            })?;

        let (port_mask, bus_mask) = (connection.port_mask, connection.bus_mask);
        if port_mask == 0 || port_mask & !u64::from(ports[port].mask()) != 0 {
            return Err(invalid(format!(
                "port mask ${port_mask:X} does not fit {}",
                connection.port
            )));
        }
        if bus_mask == 0 || bus_mask & !self.buses[bus].mask() != 0 {
            return Err(invalid(format!(
                "bus mask ${bus_mask:X} does not fit {}",
                connection.bus
            )));
        }
        if !is_contiguous(port_mask)
            || !is_contiguous(bus_mask)
            || port_mask.count_ones() != bus_mask.count_ones()
        {
            return Err(invalid(format!(
                "{} ${port_mask:X} and {} ${bus_mask:X} are not matching contiguous fields",
                connection.port, connection.bus
            )));
        }

        Ok(Link {
            device: id,
            port,
            port_mask: port_mask as u8,
            bus,
            bus_mask,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Settle the wires after a cycle: drive, then sense.
    pub fn propagate(&mut self, map: &mut AddressMap) {
        for link in &self.links {
            let drive = map.device(link.device).drive(link.port);
            link.apply(drive, &mut self.buses[link.bus]);
        }
        for link in &self.links {
            let levels = link.to_port(self.buses[link.bus].levels);
            map.device_mut(link.device)
                .sense(link.port, levels, link.port_mask);
        }
    }

    /// Current levels on the bus called `name`.
    #[must_use]
    pub fn bus_levels(&self, name: &str) -> Option<u64> {
        self.bus_index(name).map(|index| self.buses[index].levels)
    }

    /// Bus names in declaration order.
    pub fn bus_names(&self) -> impl Iterator<Item = &str> {
        self.buses.iter().map(|bus| bus.name.as_str())
    }
}
