//! FAST wire-level types
//!
//! Sequence numbers, presence maps, template ids, timestamps, the FAST
//! decimal and fixed-capacity ASCII storage shared by the message decoders.
//!
//! Every datagram on a FAST multicast channel is laid out as:
//!   - packet seqnum: u32 little-endian (4 bytes)
//!   - PMap: stop-bit encoded, up to 9 bytes
//!   - template id: stop-bit encoded u32
//!   - fields in template order

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Logical position of an item in a sequenced stream. Valid wire values
/// start at 1; -1 marks an empty reorder slot.
pub type SeqNum = i64;

/// Presence map, MSB-first: logical bit 0 is bit 63 of the word.
pub type PMap = u64;

/// FAST template id.
pub type Tid = u32;

pub const PACKET_PREFIX_LEN: usize = 4;

/// Prices are carried as fixed-point integers with 8 decimal places.
pub const PRICE_EXPONENT: i32 = -8;

/// Receive / handling timestamp, nanoseconds since the Unix epoch.
/// Zero means "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeVal(u64);

impl TimeVal {
    pub const fn from_nanos(nanos: u64) -> Self {
        TimeVal(nanos)
    }

    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        TimeVal(nanos)
    }

    pub const fn nanos(&self) -> u64 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Microseconds elapsed from `earlier` to `self`, 0 if not later.
    pub fn micros_since(&self, earlier: TimeVal) -> u64 {
        self.0.saturating_sub(earlier.0) / 1_000
    }
}

/// FAST decimal: `mantissa * 10^exponent`, with the floating-point value
/// cached.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Decimal {
    pub exponent: i32,
    pub mantissa: i64,
    pub value: f64,
}

impl Decimal {
    pub fn new(exponent: i32, mantissa: i64) -> Self {
        let mut d = Decimal::default();
        d.set(exponent, mantissa);
        d
    }

    pub fn set(&mut self, exponent: i32, mantissa: i64) {
        self.exponent = exponent;
        self.mantissa = mantissa;
        self.value = mantissa as f64 * 10f64.powi(exponent);
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Exact conversion to a fixed-point integer with `exponent` scale
    /// (e.g. [`PRICE_EXPONENT`]). `None` on overflow or lost precision.
    pub fn to_fixed(&self, exponent: i32) -> Option<i64> {
        let shift = self.exponent - exponent;
        if shift >= 0 {
            10i64
                .checked_pow(shift as u32)
                .and_then(|m| self.mantissa.checked_mul(m))
        } else {
            let div = 10i64.checked_pow(shift.unsigned_abs())?;
            (self.mantissa % div == 0).then(|| self.mantissa / div)
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Fixed-capacity, 0-terminated ASCII field. Decoders write straight into
/// the backing array, so reusing a message struct never allocates.
#[derive(Clone, Copy)]
pub struct AsciiBuf<const N: usize>([u8; N]);

impl<const N: usize> AsciiBuf<N> {
    pub const fn new() -> Self {
        AsciiBuf([0; N])
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes up to (not including) the first 0.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..len]
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        N == 0 || self.0[0] == 0
    }

    pub fn clear(&mut self) {
        if N > 0 {
            self.0[0] = 0;
        }
    }

    /// Copy `s` in, truncated to `N - 1` bytes.
    pub fn set(&mut self, s: &str) {
        if N == 0 {
            return;
        }
        let len = s.len().min(N - 1);
        self.0[..len].copy_from_slice(&s.as_bytes()[..len]);
        self.0[len] = 0;
    }

    /// Raw storage, for in-place decoding.
    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl<const N: usize> Default for AsciiBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PartialEq for AsciiBuf<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Eq for AsciiBuf<N> {}

impl<const N: usize> fmt::Debug for AsciiBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<const N: usize> fmt::Display for AsciiBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FORTS template ids
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SecurityDefinition = 3,
    SecurityDefinitionUpdate = 4,
    SecurityStatus = 5,
    HeartBeat = 6,
    SequenceReset = 7,
    TradingSessionStatus = 8,
    News = 9,
    OrdersLogIncrRefresh = 14,
    OrdersLogSnapShot = 15,
}

impl MessageType {
    pub fn from_tid(tid: Tid) -> Option<Self> {
        match tid {
            3 => Some(MessageType::SecurityDefinition),
            4 => Some(MessageType::SecurityDefinitionUpdate),
            5 => Some(MessageType::SecurityStatus),
            6 => Some(MessageType::HeartBeat),
            7 => Some(MessageType::SequenceReset),
            8 => Some(MessageType::TradingSessionStatus),
            9 => Some(MessageType::News),
            14 => Some(MessageType::OrdersLogIncrRefresh),
            15 => Some(MessageType::OrdersLogSnapShot),
            _ => None,
        }
    }

    pub const fn tid(self) -> Tid {
        self as Tid
    }
}

/// FIX tag 279
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MDUpdateAction {
    New,
    Change,
    Delete,
}

impl MDUpdateAction {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(MDUpdateAction::New),
            1 => Some(MDUpdateAction::Change),
            2 => Some(MDUpdateAction::Delete),
            _ => None,
        }
    }
}

/// FIX tag 269 (first character)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MDEntryType {
    Bid,
    Offer,
    Trade,
    EmptyBook,
}

impl MDEntryType {
    pub fn from_bytes(v: &[u8]) -> Option<Self> {
        match v.first() {
            Some(b'0') => Some(MDEntryType::Bid),
            Some(b'1') => Some(MDEntryType::Offer),
            Some(b'2') => Some(MDEntryType::Trade),
            Some(b'J') => Some(MDEntryType::EmptyBook),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_value() {
        let d = Decimal::new(-2, 12345);
        assert!((d.value - 123.45).abs() < 1e-9);
        assert_eq!(d.to_fixed(PRICE_EXPONENT), Some(12_345_000_000));
    }

    #[test]
    fn test_decimal_to_fixed_precision_loss() {
        let d = Decimal::new(-10, 1);
        assert_eq!(d.to_fixed(PRICE_EXPONENT), None);
        let d = Decimal::new(-10, 300);
        assert_eq!(d.to_fixed(PRICE_EXPONENT), Some(3));
    }

    #[test]
    fn test_ascii_buf() {
        let mut s = AsciiBuf::<4>::new();
        assert!(s.is_empty());
        s.set("ABCDEF");
        assert_eq!(s.as_str(), "ABC");
        s.set("0");
        assert_eq!(s.as_str(), "0");
        assert_eq!(s, {
            let mut t = AsciiBuf::<4>::new();
            t.set("0");
            t
        });
    }

    #[test]
    fn test_message_type_round_trip() {
        for tid in [3, 4, 5, 6, 7, 8, 9, 14, 15] {
            assert_eq!(MessageType::from_tid(tid).map(|t| t.tid()), Some(tid));
        }
        assert_eq!(MessageType::from_tid(1), None);
    }
}
