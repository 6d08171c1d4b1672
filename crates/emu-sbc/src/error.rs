//! Board construction and image loading errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The board could not be built as described.
///
/// Raised before any window is installed, so a failed registration never
/// leaves a half-configured address map behind.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(
        "{name} (${start:04X}-${end:04X}) overlaps {existing} (${existing_start:04X}-${existing_end:04X})"
    )]
    Overlap {
        name: String,
        start: u16,
        end: u16,
        existing: String,
        existing_start: u16,
        existing_end: u16,
    },

    #[error("{name}: range ${start:04X}-${end:04X} exceeds the 16-bit address space")]
    OutOfRange { name: String, start: u64, end: u64 },

    #[error("{name}: start ${start:04X} is above end ${end:04X}")]
    InvertedRange { name: String, start: u64, end: u64 },

    #[error("name {0:?} is used twice")]
    DuplicateName(String),

    #[error("{device}: no bus named {bus:?}")]
    UnknownBus { device: String, bus: String },

    #[error("{device}: no port named {port:?}")]
    UnknownPort { device: String, port: String },

    #[error("{name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("{name}: cannot read image {}", path.display())]
    Image {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed board description")]
    Parse(#[from] serde_json::Error),

    #[error("cannot read board file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A program image could not be placed on the bus. Board state is left
/// untouched when this is returned.
#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("{len}-byte image at ${address:04X} runs past $FFFF")]
    OutOfRange { address: u16, len: usize },

    #[error("no device is mapped at ${0:04X}")]
    Unmapped(u16),

    #[error("{device} at ${address:04X} does not accept writes")]
    ReadOnly { device: String, address: u16 },

    #[error("cannot read program {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("listing line {line}: {reason}")]
    Listing { line: usize, reason: String },
}
