//! RAM and ROM blocks.
//!
//! A memory device covers its whole window. ROM ignores bus writes; its
//! contents come from an image or fill byte at construction, or from
//! [`Memory::program`], which stands in for an EEPROM programmer and never
//! runs as part of live bus traffic.

use std::any::Any;

use emu_core::{Device, Observable, Value};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    #[default]
    Ram,
    Rom,
}

impl MemoryKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ram => "ram",
            Self::Rom => "rom",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Memory {
    kind: MemoryKind,
    data: Vec<u8>,
}

impl Memory {
    /// A block of `size` bytes, all set to `fill`.
    #[must_use]
    pub fn new(kind: MemoryKind, size: usize, fill: u8) -> Self {
        Self {
            kind,
            data: vec![fill; size],
        }
    }

    #[must_use]
    pub fn ram(size: usize) -> Self {
        Self::new(MemoryKind::Ram, size, 0)
    }

    /// ROM holding `contents` at offset 0, padded to `size` with `fill`.
    /// Contents longer than `size` are truncated.
    #[must_use]
    pub fn rom(size: usize, contents: &[u8], fill: u8) -> Self {
        let mut memory = Self::new(MemoryKind::Rom, size, fill);
        memory.program(0, contents);
        memory
    }

    #[must_use]
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite bytes from `offset`, bypassing write protection. Returns
    /// how many bytes fit.
    pub fn program(&mut self, offset: u16, bytes: &[u8]) -> usize {
        let start = usize::from(offset).min(self.data.len());
        let count = bytes.len().min(self.data.len() - start);
        self.data[start..start + count].copy_from_slice(&bytes[..count]);
        count
    }
}

impl Device for Memory {
    fn kind(&self) -> &'static str {
        self.kind.name()
    }

    fn read(&mut self, offset: u16) -> u8 {
        self.peek(offset)
    }

    fn write(&mut self, offset: u16, value: u8) {
        match self.kind {
            MemoryKind::Ram => {
                if let Some(cell) = self.data.get_mut(usize::from(offset)) {
                    *cell = value;
                }
            }
            MemoryKind::Rom => {
                tracing::debug!(offset, value, "write to ROM discarded");
            }
        }
    }

    fn peek(&self, offset: u16) -> u8 {
        self.data.get(usize::from(offset)).copied().unwrap_or(0xFF)
    }

    fn is_writable(&self, _offset: u16) -> bool {
        self.kind == MemoryKind::Ram
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Observable for Memory {
    /// Besides the fixed paths, `byte.XXXX` reads the byte at hex offset
    /// `XXXX`.
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(offset) = path.strip_prefix("byte.") {
            let offset = usize::from_str_radix(offset, 16).ok()?;
            return self.data.get(offset).map(|&b| b.into());
        }
        match path {
            "kind" => Some(self.kind.name().into()),
            "size" => Some((self.data.len() as u64).into()),
            "writable" => Some((self.kind == MemoryKind::Ram).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["kind", "size", "writable"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_reads_back_writes() {
        let mut ram = Memory::ram(0x100);
        ram.write(0x10, 0x42);
        assert_eq!(ram.read(0x10), 0x42);
        assert!(ram.is_writable(0x10));
    }

    #[test]
    fn rom_ignores_bus_writes() {
        let mut rom = Memory::rom(4, &[1, 2], 0xEA);
        rom.write(0, 0x99);
        assert_eq!(rom.contents(), &[1, 2, 0xEA, 0xEA]);
        assert!(!rom.is_writable(0));
    }

    #[test]
    fn program_truncates_to_block() {
        let mut rom = Memory::rom(4, &[], 0);
        assert_eq!(rom.program(2, &[7, 8, 9]), 2);
        assert_eq!(rom.contents(), &[0, 0, 7, 8]);
        assert_eq!(rom.program(9, &[1]), 0);
    }

    #[test]
    fn byte_query_uses_hex_offset() {
        let rom = Memory::rom(0x20, &[0; 0x1F], 0x5A);
        assert_eq!(rom.query("byte.1F"), Some(Value::U8(0x5A)));
        assert_eq!(rom.query("byte.20"), None);
        assert_eq!(rom.query("kind"), Some(Value::from("rom")));
    }
}
