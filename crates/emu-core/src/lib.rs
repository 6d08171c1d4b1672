//! Shared building blocks for the board crates.
//!
//! Time is counted in bus cycles. On every tick the CPU makes exactly one
//! bus access and then each device advances by that same cycle, so the
//! CPU and the peripherals never drift apart.

mod bus;
mod clock;
mod cpu;
mod device;
mod observable;
mod ticks;

pub use bus::{Bus, SimpleBus};
pub use clock::MasterClock;
pub use cpu::Cpu;
pub use device::{Device, Drive, PortInfo};
pub use observable::{Observable, Value};
pub use ticks::Ticks;
