//! Program images: raw binaries and vasm listings.
//!
//! A listing (`vasm6502_oldstyle -L prog.lst`) carries both the assembled
//! bytes and the source they came from:
//!
//! ```text
//! Sections:
//! 00: "seg8000" (8000-8005)
//!
//! Source: "prog.s"
//!                         	     1:   .org $8000
//! 00:8000 A9FF            	     2:   lda #$ff
//! 00:8002 8D0260          	     3:   sta $6002
//! ```
//!
//! The lowest section start is the image origin. Each source line may
//! carry an address and data bytes before the tab and a line number,
//! marker and text after it.

use std::fs;
use std::path::Path;

use crate::error::ImageLoadError;

/// A line of assembler source tied to the address it assembled to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub line: u32,
    /// None for lines that produced no bytes.
    pub address: Option<u16>,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    origin: Option<u16>,
    bytes: Vec<u8>,
    source: Vec<SourceLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Sections,
    Source,
    Symbols,
}

impl Program {
    /// A raw image with no origin of its own.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            origin: None,
            bytes,
            source: Vec::new(),
        }
    }

    /// Load a `.lst` listing or, for any other extension, a raw binary.
    pub fn from_path(path: &Path) -> Result<Self, ImageLoadError> {
        let io_error = |source| ImageLoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let is_listing = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("lst"));
        if is_listing {
            let text = fs::read_to_string(path).map_err(io_error)?;
            Self::parse_listing(&text)
        } else {
            fs::read(path).map(Self::from_bytes).map_err(io_error)
        }
    }

    pub fn parse_listing(text: &str) -> Result<Self, ImageLoadError> {
        let origin = listing_origin(text)?;
        let mut bytes = Vec::new();
        let mut source = Vec::new();
        let mut section = Section::None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            if let Some(next) = section_header(raw) {
                section = next;
                continue;
            }
            if section != Section::Source || raw.trim().is_empty() {
                continue;
            }

            let (data_part, source_part) = raw.split_once('\t').unwrap_or((raw, ""));
            let address = match parse_data(data_part, line_no)? {
                Some((address, data)) => {
                    let Some(origin) = origin else {
                        return Err(ImageLoadError::Listing {
                            line: line_no,
                            reason: "bytes before any section was declared".into(),
                        });
                    };
                    let Some(offset) = address.checked_sub(origin) else {
                        return Err(ImageLoadError::Listing {
                            line: line_no,
                            reason: format!("${address:04X} lies below the origin ${origin:04X}"),
                        });
                    };
                    let offset = usize::from(offset);
                    if bytes.len() < offset + data.len() {
                        bytes.resize(offset + data.len(), 0);
                    }
                    bytes[offset..offset + data.len()].copy_from_slice(&data);
                    Some(address)
                }
                None => None,
            };

            if let Some((line, text)) = parse_source(source_part) {
                source.push(SourceLine {
                    line,
                    address,
                    text,
                });
            }
        }

        Ok(Self {
            origin,
            bytes,
            source,
        })
    }

    /// Load address recorded in the image, if it has one.
    #[must_use]
    pub fn origin(&self) -> Option<u16> {
        self.origin
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn source(&self) -> &[SourceLine] {
        &self.source
    }

    /// Source line that assembled to `address`.
    #[must_use]
    pub fn source_at(&self, address: u16) -> Option<&SourceLine> {
        self.source.iter().find(|line| line.address == Some(address))
    }
}

fn section_header(line: &str) -> Option<Section> {
    if line.starts_with("Sections:") {
        Some(Section::Sections)
    } else if line.starts_with("Source:") {
        Some(Section::Source)
    } else if line.starts_with("Symbols by") {
        Some(Section::Symbols)
    } else {
        None
    }
}

/// Lowest section start. Sections may be listed after the source, so this
/// is a separate pass.
fn listing_origin(text: &str) -> Result<Option<u16>, ImageLoadError> {
    let mut section = Section::None;
    let mut origin: Option<u16> = None;
    for (index, line) in text.lines().enumerate() {
        if let Some(next) = section_header(line) {
            section = next;
            continue;
        }
        if section != Section::Sections || line.trim().is_empty() {
            continue;
        }
        // 00: "seg8000" (8000-8005)
        let start = line
            .split_once(':')
            .and_then(|(_, rest)| rest.split_once('('))
            .map(|(_, range)| range.split(['-', ')']).next().unwrap_or(""))
            .and_then(|hex| u16::from_str_radix(hex.trim(), 16).ok())
            .ok_or_else(|| ImageLoadError::Listing {
                line: index + 1,
                reason: format!("malformed section {:?}", line.trim()),
            })?;
        origin = Some(origin.map_or(start, |o| o.min(start)));
    }
    Ok(origin)
}

/// `00:8002 8D0260` -> (0x8002, [0x8D, 0x02, 0x60]). Blank prefixes carry
/// no data.
fn parse_data(part: &str, line: usize) -> Result<Option<(u16, Vec<u8>)>, ImageLoadError> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(None);
    }
    let malformed = |reason: String| ImageLoadError::Listing { line, reason };

    let (_, rest) = part
        .split_once(':')
        .ok_or_else(|| malformed(format!("expected section:address in {part:?}")))?;
    let mut fields = rest.split_whitespace();
    let address = fields
        .next()
        .and_then(|a| u16::from_str_radix(a, 16).ok())
        .ok_or_else(|| malformed(format!("bad address in {part:?}")))?;
    let Some(hex) = fields.next() else {
        return Ok(None);
    };
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return Err(malformed(format!("bad hex data {hex:?}")));
    }
    let data = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed(format!("bad hex data {hex:?}")))?;
    Ok(Some((address, data)))
}

/// `     2:   lda #$ff` -> (2, "  lda #$ff"). The character after the
/// line number marks macro or include expansion and is dropped.
fn parse_source(part: &str) -> Option<(u32, String)> {
    let trimmed = part.trim_start();
    let digits = trimmed.find(|c: char| !c.is_ascii_digit())?;
    let line = trimmed[..digits].parse().ok()?;
    let mut rest = trimmed[digits..].chars();
    rest.next()?;
    let rest = rest.as_str();
    let text = rest.strip_prefix([' ', '\t']).unwrap_or(rest);
    Some((line, text.to_string()))
}
