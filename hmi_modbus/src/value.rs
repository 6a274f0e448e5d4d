//! Value kinds: how a register's value maps onto device data.
//!
//! Multi-word values are big-endian across words (high word first).

use std::fmt;

use hmi_common::device::Encoding;

use crate::function::{Function, Table};
use crate::request::Payload;

/// How a typed register value is read, written and encoded.
pub trait ValueKind {
    /// Value type seen by the application.
    type Value: Clone + PartialEq + fmt::Debug;

    /// Table the register lives in.
    fn table(&self) -> Table;

    /// Entries occupied (bits for coils, words otherwise).
    fn width(&self) -> u16;

    /// Function writing the register.
    fn write_function(&self) -> Function;

    /// Encode a value for a write.
    fn encode(&self, value: &Self::Value) -> Payload;

    /// Decode the value at `offset` entries into `payload`.
    fn decode(&self, payload: &Payload, offset: usize) -> Option<Self::Value>;

    /// Function reading the register.
    fn read_function(&self) -> Function {
        Function::read(self.table())
    }

    /// `value` as it reads back after a write.
    fn normalize(&self, value: &Self::Value) -> Option<Self::Value> {
        self.decode(&self.encode(value), 0)
    }
}

/// Single coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coil;

impl ValueKind for Coil {
    type Value = bool;

    fn table(&self) -> Table {
        Table::Coils
    }

    fn width(&self) -> u16 {
        1
    }

    fn write_function(&self) -> Function {
        Function::WriteCoil
    }

    fn encode(&self, value: &bool) -> Payload {
        Payload::Bits(vec![*value])
    }

    fn decode(&self, payload: &Payload, offset: usize) -> Option<bool> {
        payload.bit(offset)
    }
}

/// Integer held in one or two holding registers.
///
/// `Int16`/`Uint16` keep the low 16 bits of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRegister {
    encoding: Encoding,
}

impl IntRegister {
    /// Integer kind with `encoding`; `Float32` falls back to `Int32`.
    pub const fn new(encoding: Encoding) -> Self {
        let encoding = match encoding {
            Encoding::Float32 => Encoding::Int32,
            other => other,
        };
        Self { encoding }
    }

    /// Encoding in use.
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl Default for IntRegister {
    fn default() -> Self {
        Self::new(Encoding::Int16)
    }
}

impl ValueKind for IntRegister {
    type Value = i32;

    fn table(&self) -> Table {
        Table::HoldingRegisters
    }

    fn width(&self) -> u16 {
        self.encoding.words()
    }

    fn write_function(&self) -> Function {
        multi_word_write(self.width())
    }

    fn encode(&self, value: &i32) -> Payload {
        let words = match self.encoding {
            Encoding::Int16 | Encoding::Uint16 => vec![*value as u16],
            Encoding::Int32 | Encoding::Float32 => split(*value as u32).to_vec(),
        };
        Payload::Words(words)
    }

    fn decode(&self, payload: &Payload, offset: usize) -> Option<i32> {
        let words = payload.words(offset, usize::from(self.width()))?;
        Some(match self.encoding {
            Encoding::Int16 => i32::from(words[0] as i16),
            Encoding::Uint16 => i32::from(words[0]),
            Encoding::Int32 | Encoding::Float32 => join(words[0], words[1]) as i32,
        })
    }
}

/// Real number held in one or two holding registers.
///
/// `Int16`/`Uint16` round to the nearest integer and saturate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealRegister {
    encoding: Encoding,
}

impl RealRegister {
    /// Real kind with `encoding`; `Int32` falls back to `Float32`.
    pub const fn new(encoding: Encoding) -> Self {
        let encoding = match encoding {
            Encoding::Int32 => Encoding::Float32,
            other => other,
        };
        Self { encoding }
    }

    /// Encoding in use.
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl Default for RealRegister {
    fn default() -> Self {
        Self::new(Encoding::Float32)
    }
}

impl ValueKind for RealRegister {
    type Value = f64;

    fn table(&self) -> Table {
        Table::HoldingRegisters
    }

    fn width(&self) -> u16 {
        self.encoding.words()
    }

    fn write_function(&self) -> Function {
        multi_word_write(self.width())
    }

    fn encode(&self, value: &f64) -> Payload {
        let words = match self.encoding {
            // `as` saturates float to int conversions.
            Encoding::Int16 => vec![value.round() as i16 as u16],
            Encoding::Uint16 => vec![value.round() as u16],
            Encoding::Float32 | Encoding::Int32 => split((*value as f32).to_bits()).to_vec(),
        };
        Payload::Words(words)
    }

    fn decode(&self, payload: &Payload, offset: usize) -> Option<f64> {
        let words = payload.words(offset, usize::from(self.width()))?;
        Some(match self.encoding {
            Encoding::Int16 => f64::from(words[0] as i16),
            Encoding::Uint16 => f64::from(words[0]),
            Encoding::Float32 | Encoding::Int32 => f64::from(f32::from_bits(join(words[0], words[1]))),
        })
    }
}

fn multi_word_write(width: u16) -> Function {
    if width > 1 {
        Function::WriteMultipleHoldingRegisters
    } else {
        Function::WriteHoldingRegister
    }
}

#[inline]
fn split(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

#[inline]
fn join(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}
