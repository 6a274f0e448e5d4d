//! Modbus function codes and the data tables they address.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data table of a field device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    /// Read/write single bits.
    Coils,
    /// Read-only single bits.
    DiscreteInputs,
    /// Read/write 16-bit words.
    HoldingRegisters,
    /// Read-only 16-bit words.
    InputRegisters,
}

impl Table {
    /// Whether entries are single bits.
    #[inline]
    pub const fn is_bits(self) -> bool {
        matches!(self, Self::Coils | Self::DiscreteInputs)
    }

    /// Largest amount a single read may request.
    #[inline]
    pub const fn max_read(self) -> u16 {
        if self.is_bits() { 2000 } else { 125 }
    }
}

/// Modbus function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Function {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteCoil = 0x05,
    WriteHoldingRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleHoldingRegisters = 0x10,
}

impl Function {
    /// Wire code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Function for a wire code.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteCoil,
            0x06 => Self::WriteHoldingRegister,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleHoldingRegisters,
            _ => return None,
        })
    }

    /// Whether the function reads.
    #[inline]
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    /// Whether the function writes.
    #[inline]
    pub const fn is_write(self) -> bool {
        !self.is_read()
    }

    /// Table the function addresses.
    pub const fn table(self) -> Table {
        match self {
            Self::ReadCoils | Self::WriteCoil | Self::WriteMultipleCoils => Table::Coils,
            Self::ReadDiscreteInputs => Table::DiscreteInputs,
            Self::ReadHoldingRegisters
            | Self::WriteHoldingRegister
            | Self::WriteMultipleHoldingRegisters => Table::HoldingRegisters,
            Self::ReadInputRegisters => Table::InputRegisters,
        }
    }

    /// Read function of `table`.
    pub const fn read(table: Table) -> Self {
        match table {
            Table::Coils => Self::ReadCoils,
            Table::DiscreteInputs => Self::ReadDiscreteInputs,
            Table::HoldingRegisters => Self::ReadHoldingRegisters,
            Table::InputRegisters => Self::ReadInputRegisters,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10] {
            assert_eq!(Function::from_code(code).map(Function::code), Some(code));
        }
        assert_eq!(Function::from_code(0x07), None);
    }

    #[test]
    fn read_write_split() {
        assert!(Function::ReadInputRegisters.is_read());
        assert!(Function::WriteMultipleCoils.is_write());
        assert_eq!(Function::WriteCoil.table(), Table::Coils);
        assert_eq!(Function::read(Table::HoldingRegisters), Function::ReadHoldingRegisters);
    }

    #[test]
    fn display_shows_code() {
        assert_eq!(Function::WriteMultipleHoldingRegisters.to_string(), "WriteMultipleHoldingRegisters(0x10)");
    }
}
