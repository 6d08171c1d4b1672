//! Cycle-accurate 6502 single-board computer.
//!
//! The classic breadboard build: a 6502, RAM, ROM, a 6522 VIA, an HD44780
//! character LCD and a 6551 ACIA, each mapped at an address window chosen
//! by the board description. The master clock ticks at CPU cycle rate and
//! every device ticks with it.

pub mod address_map;
mod board;
pub mod config;
pub mod debugger;
mod engine;
pub mod error;
pub mod memory;
pub mod program;
mod wiring;

pub use address_map::{AddressMap, DeviceId, IrqLine, OPEN_BUS};
pub use board::{Board, HISTORY_LEN, Snapshot};
pub use config::{BoardConfig, BusConfig, ConnectionConfig, DeviceConfig, DeviceKind};
pub use debugger::{Debugger, Frame, FrameKind};
pub use engine::{ClockEngine, EngineError, RunRate, STEP_OVER_CYCLES, StopReason};
pub use error::{ConfigurationError, ImageLoadError};
pub use memory::{Memory, MemoryKind};
pub use program::{Program, SourceLine};
pub use wiring::Wiring;
