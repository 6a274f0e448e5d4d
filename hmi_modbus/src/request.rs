//! Requests, replies and completions exchanged with a device transport.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::function::Function;

/// Identifier of one request, unique per device client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Data carried by a request or a reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Payload {
    /// No data (read requests, failed replies).
    #[default]
    None,
    /// Coil or discrete input values.
    Bits(Vec<bool>),
    /// Register words.
    Words(Vec<u16>),
}

impl Payload {
    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Bits(bits) => bits.len(),
            Self::Words(words) => words.len(),
        }
    }

    /// Whether the payload carries nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit at `offset`.
    pub fn bit(&self, offset: usize) -> Option<bool> {
        match self {
            Self::Bits(bits) => bits.get(offset).copied(),
            _ => None,
        }
    }

    /// `count` words starting at `offset`.
    pub fn words(&self, offset: usize, count: usize) -> Option<&[u16]> {
        match self {
            Self::Words(words) => words.get(offset..offset.checked_add(count)?),
            _ => None,
        }
    }
}

/// A request addressed to a contiguous range of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub function: Function,
    pub address: u16,
    pub amount: u16,
    /// Data to write; `Payload::None` for reads.
    pub payload: Payload,
}

impl Request {
    /// Last address of the range (inclusive).
    #[inline]
    pub fn end_address(&self) -> u32 {
        u32::from(self.address) + u32::from(self.amount.max(1)) - 1
    }

    /// Whether `[address, address + width)` lies inside the request range.
    pub fn covers(&self, address: u16, width: u16) -> bool {
        let last = u32::from(address) + u32::from(width.max(1)) - 1;
        address >= self.address && last <= self.end_address()
    }
}

/// Outcome reported by a transport, exactly once per submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub request_id: RequestId,
    pub success: bool,
    /// Data read; `Payload::None` for writes and failures.
    pub payload: Payload,
}

impl Reply {
    /// Successful reply.
    pub fn ok(request_id: RequestId, payload: Payload) -> Self {
        Self {
            request_id,
            success: true,
            payload,
        }
    }

    /// Failed reply.
    pub fn failed(request_id: RequestId) -> Self {
        Self {
            request_id,
            success: false,
            payload: Payload::None,
        }
    }
}

/// A reply joined with the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub request: Request,
    pub success: bool,
    pub payload: Payload,
}

impl Completion {
    /// Request id.
    #[inline]
    pub fn id(&self) -> RequestId {
        self.request.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(address: u16, amount: u16) -> Request {
        Request {
            id: RequestId(1),
            function: Function::ReadHoldingRegisters,
            address,
            amount,
            payload: Payload::None,
        }
    }

    #[test]
    fn covers_inclusive_range() {
        let r = read(10, 4);
        assert_eq!(r.end_address(), 13);
        assert!(r.covers(10, 1));
        assert!(r.covers(12, 2));
        assert!(!r.covers(13, 2));
        assert!(!r.covers(9, 1));
    }

    #[test]
    fn covers_at_table_end() {
        let r = read(u16::MAX, 1);
        assert!(r.covers(u16::MAX, 1));
        assert!(!r.covers(u16::MAX, 2));
    }

    #[test]
    fn payload_slices() {
        let p = Payload::Words(vec![1, 2, 3]);
        assert_eq!(p.words(1, 2), Some(&[2, 3][..]));
        assert_eq!(p.words(2, 2), None);
        assert_eq!(p.bit(0), None);
        assert_eq!(Payload::Bits(vec![false, true]).bit(1), Some(true));
        assert!(Payload::None.is_empty());
    }

    #[test]
    fn request_id_display() {
        assert_eq!(RequestId(42).to_string(), "#42");
    }
}
