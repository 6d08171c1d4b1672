//! Read-only state inspection.
//!
//! Front ends read CPU registers, device registers and bus lines by path.
//! A query never changes emulation state.

use std::collections::BTreeMap;
use std::fmt;

/// A register, line or memory dump read from a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Flags and signal lines.
    Bool(bool),
    U8(u8),
    /// Addresses and 16-bit counters.
    U16(u16),
    U64(u64),
    /// Mnemonics, LCD rows, device kinds.
    String(String),
    /// RAM contents.
    Bytes(Vec<u8>),
    Array(Vec<Value>),
}

fn write_joined<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    sep: &str,
    item: impl Fn(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        item(f, v)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "${v:02X}"),
            Value::U16(v) => write!(f, "${v:04X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Bytes(bytes) => write_joined(f, bytes, " ", |f, b| write!(f, "{b:02X}")),
            Value::Array(values) => {
                f.write_str("[")?;
                write_joined(f, values, ", ", |f, v| write!(f, "{v}"))?;
                f.write_str("]")
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from!(bool => Bool, u8 => U8, u16 => U16, u64 => U64);

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

/// Something a front end can inspect.
pub trait Observable {
    /// Value at a dotted path such as `flags.z` or `t1.counter`, or `None`
    /// for a path this component does not have.
    fn query(&self, path: &str) -> Option<Value>;

    /// Every path `query` answers.
    fn query_paths(&self) -> &'static [&'static str];

    /// All paths and their current values.
    fn snapshot(&self) -> BTreeMap<String, Value> {
        self.query_paths()
            .iter()
            .filter_map(|path| self.query(path).map(|v| ((*path).to_string(), v)))
            .collect()
    }
}
