//! Bit-level FAST field decoders
//!
//! FAST packs 7 data bits per byte; the MSB of a byte marks the last byte
//! of a field, and multi-byte values are big-endian in 7-bit groups. The
//! decoders here are stateless, never allocate, and work on a bounds-checked
//! [`Cursor`]. `SKIP = true` advances the cursor and computes the NULL flag
//! without materialising the value.

use crate::protocol::{Decimal, PMap, Tid};
use std::fmt;
use thiserror::Error;

const STOP_BIT: u8 = 0x80;
const DATA_BITS: u8 = 0x7f;
const SIGN_BIT: u8 = 0x40;
const MAX_PMAP_BYTES: usize = 9;

pub const MAX_EXPONENT: i32 = 63;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{field}: end of input")]
    EndOfInput { field: &'static str },

    #[error("{field}: stop bit not found before end of input")]
    Unterminated { field: &'static str },

    #[error("{field}: sign mismatch: negative={negative}, value={value}")]
    SignMismatch {
        field: &'static str,
        negative: bool,
        value: i128,
    },

    #[error("{field}: exponent {exponent} out of range")]
    ExponentOutOfRange { field: &'static str, exponent: i32 },

    #[error("{field}: old-style exponent must be a single byte")]
    MultiByteExponent { field: &'static str },

    #[error("{field}: output buffer too short: capacity {capacity}")]
    OutputTooShort { field: &'static str, capacity: usize },

    #[error("{field}: string too long? capacity {capacity}")]
    StringTooLong { field: &'static str, capacity: usize },

    #[error("{field}: over-long encoding of a 0-prefixed string")]
    OverlongString { field: &'static str },

    #[error("{field}: length {len} goes beyond end of input by {excess} bytes")]
    BeyondEnd {
        field: &'static str,
        len: usize,
        excess: usize,
    },

    #[error("{group}: PMap too large?")]
    PMapTooLarge { group: &'static str },

    #[error("{group}: template id bit not set in PMap")]
    MissingTemplateId { group: &'static str },

    #[error("missing mandatory field: {field}")]
    MissingMandatory { field: &'static str },

    #[error("{field}: too many entries: {count} > {max}")]
    TooManyEntries {
        field: &'static str,
        count: u32,
        max: u32,
    },

    #[error("datagram too short for seqnum prefix: {len} bytes")]
    TruncatedPrefix { len: usize },

    #[error("unexpected template id: {0}")]
    UnexpectedTemplate(Tid),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Read position over an immutable byte buffer.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Unconsumed bytes.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    #[inline]
    fn next_byte(&mut self, field: &'static str) -> DecodeResult<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(DecodeError::EndOfInput { field })?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize, field: &'static str) -> DecodeResult<&'a [u8]> {
        let have = self.remaining();
        if n > have {
            return Err(DecodeError::BeyondEnd {
                field,
                len: n,
                excess: n - have,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }
}

/// Integer types a FAST integer field can decode into.
pub trait FastInt: Copy + Default + PartialEq + fmt::Debug {
    const SIGNED: bool;

    /// Truncating conversion from the 64-bit accumulator.
    fn from_bits(raw: u64) -> Self;
    fn decremented(self) -> Self;
    fn to_i128(self) -> i128;
}

macro_rules! impl_fast_int {
    ($($t:ty => $signed:expr),* $(,)?) => {
        $(
            impl FastInt for $t {
                const SIGNED: bool = $signed;

                #[inline]
                fn from_bits(raw: u64) -> Self {
                    raw as $t
                }

                #[inline]
                fn decremented(self) -> Self {
                    self.wrapping_sub(1)
                }

                #[inline]
                fn to_i128(self) -> i128 {
                    self as i128
                }
            }
        )*
    };
}

impl_fast_int!(i32 => true, i64 => true, u32 => false, u64 => false);

/// Decoded integer plus the flags callers need downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntField<T> {
    pub value: T,
    pub is_null: bool,
    pub is_negative: bool,
}

/// Length and NULL flag of a decoded string or byte vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrField {
    pub len: usize,
    pub is_null: bool,
}

impl StrField {
    const NULL: StrField = StrField {
        len: 0,
        is_null: true,
    };
}

/// Stop-bit integer. Nullable fields use the excess-1 encoding: a single
/// 0 byte is NULL, and any other non-negative value is stored plus one.
#[inline]
pub fn get_integer<const SKIP: bool, T: FastInt>(
    nullable: bool,
    cur: &mut Cursor<'_>,
    field: &'static str,
) -> DecodeResult<IntField<T>> {
    let first = cur.next_byte(field)?;
    let head = first & DATA_BITS;
    let negative = T::SIGNED && head & SIGN_BIT != 0;
    let mut done = first & STOP_BIT != 0;
    let mut raw = head as u64;
    let mut groups = 1u32;

    while !done {
        let b = cur
            .next_byte(field)
            .map_err(|_| DecodeError::Unterminated { field })?;
        done = b & STOP_BIT != 0;
        if !SKIP {
            raw = (raw << 7) | (b & DATA_BITS) as u64;
        }
        groups += 1;
    }

    let is_null = nullable && groups == 1 && head == 0;
    if SKIP || is_null {
        return Ok(IntField {
            value: T::default(),
            is_null,
            is_negative: negative,
        });
    }

    let consumed = 7 * groups;
    if negative && consumed < 64 {
        raw |= u64::MAX << consumed;
    }
    let mut value = T::from_bits(raw);
    if nullable && !negative {
        value = value.decremented();
    }

    let v = value.to_i128();
    if (negative && v > 0) || (T::SIGNED && !negative && v < 0) {
        return Err(DecodeError::SignMismatch {
            field,
            negative,
            value: v,
        });
    }

    Ok(IntField {
        value,
        is_null: false,
        is_negative: negative,
    })
}

fn check_exponent(exponent: i32, field: &'static str) -> DecodeResult<()> {
    if (-MAX_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
        Ok(())
    } else {
        Err(DecodeError::ExponentOutOfRange { field, exponent })
    }
}

/// Two-field decimal: nullable-capable exponent, then a non-nullable i64
/// mantissa. `None` when the exponent is NULL; nothing further is read.
pub fn get_decimal<const SKIP: bool>(
    nullable: bool,
    cur: &mut Cursor<'_>,
    field: &'static str,
) -> DecodeResult<Option<Decimal>> {
    let exp = get_integer::<SKIP, i32>(nullable, cur, field)?;
    if exp.is_null {
        return Ok(None);
    }
    if !SKIP {
        check_exponent(exp.value, field)?;
    }
    let mant = get_integer::<SKIP, i64>(false, cur, field)?;
    if SKIP {
        return Ok(Some(Decimal::default()));
    }
    Ok(Some(Decimal::new(exp.value, mant.value)))
}

/// Old-style decimal: a single-byte exponent carrying its own stop bit,
/// then a non-nullable i64 mantissa.
pub fn get_old_decimal<const SKIP: bool>(
    nullable: bool,
    cur: &mut Cursor<'_>,
    field: &'static str,
) -> DecodeResult<Option<Decimal>> {
    let b = cur.next_byte(field)?;
    if b & STOP_BIT == 0 {
        return Err(DecodeError::MultiByteExponent { field });
    }
    let bits = b & DATA_BITS;
    if nullable && bits == 0 {
        return Ok(None);
    }

    // Propagate bit 6 into bit 7.
    let mut exponent = (((bits << 1) as i8) >> 1) as i32;
    if nullable && exponent >= 1 {
        exponent -= 1;
    }
    if !SKIP {
        check_exponent(exponent, field)?;
    }

    let mant = get_integer::<SKIP, i64>(false, cur, field)?;
    if SKIP {
        return Ok(Some(Decimal::default()));
    }
    Ok(Some(Decimal::new(exponent, mant.value)))
}

/// Stop-bit terminated ASCII string into `out`, 0-terminated.
/// `out.len()` bounds the string: at most `out.len() - 1` characters.
pub fn get_ascii<const SKIP: bool>(
    nullable: bool,
    cur: &mut Cursor<'_>,
    out: &mut [u8],
    field: &'static str,
) -> DecodeResult<StrField> {
    let capacity = out.len();
    if capacity < 2 {
        return Err(DecodeError::OutputTooShort { field, capacity });
    }
    if cur.is_empty() {
        return Err(DecodeError::EndOfInput { field });
    }

    let input = cur.rest();
    let limit = (capacity - 1).min(input.len());
    let n = match input[..limit].iter().position(|b| b & STOP_BIT != 0) {
        Some(i) => i + 1,
        None => return Err(DecodeError::StringTooLong { field, capacity }),
    };
    let bytes = cur.take(n, field)?;

    if bytes[0] & DATA_BITS == 0 {
        if nullable && n == 1 {
            if !SKIP {
                out[0] = 0;
            }
            return Ok(StrField::NULL);
        }
        if bytes[1..].iter().any(|b| b & DATA_BITS != 0) {
            return Err(DecodeError::OverlongString { field });
        }
        if !SKIP {
            out[0] = 0;
        }
        return Ok(StrField::default());
    }

    if !SKIP {
        for (dst, src) in out.iter_mut().zip(bytes) {
            *dst = src & DATA_BITS;
        }
        out[n] = 0;
    }
    Ok(StrField {
        len: n,
        is_null: false,
    })
}

fn c_str_len(buf: &[u8]) -> usize {
    buf.iter().position(|&b| b == 0).unwrap_or(buf.len())
}

/// ASCII delta against the base string already held in `out`.
///
/// A non-negative subtraction length removes characters from the tail and
/// appends the new part; a negative one (excess-1 encoded) removes from the
/// head and prepends.
pub fn get_ascii_delta<const SKIP: bool>(
    nullable: bool,
    cur: &mut Cursor<'_>,
    out: &mut [u8],
    field: &'static str,
) -> DecodeResult<StrField> {
    let sub = get_integer::<false, i32>(nullable, cur, field)?;
    if sub.is_null {
        return Ok(StrField::NULL);
    }

    let capacity = out.len();
    let base_len = c_str_len(out);

    if !sub.is_negative {
        let off = base_len.saturating_sub(sub.value as usize);
        let tail = get_ascii::<SKIP>(false, cur, &mut out[off..], field)?;
        return Ok(StrField {
            len: off + tail.len,
            is_null: false,
        });
    }

    let sub_len = (sub.value + 1).unsigned_abs() as usize;
    let keep = base_len.saturating_sub(sub_len);
    if keep + 2 > capacity {
        return Err(DecodeError::OutputTooShort { field, capacity });
    }
    let head_cap = capacity - keep;

    // Park the kept tail at the end of the buffer while the head is read.
    if !SKIP {
        out.copy_within(base_len - keep..base_len, head_cap);
    }
    let head = get_ascii::<SKIP>(false, cur, &mut out[..head_cap], field)?;
    if !SKIP {
        out.copy_within(head_cap..capacity, head.len);
        out[head.len + keep] = 0;
    }
    Ok(StrField {
        len: head.len + keep,
        is_null: false,
    })
}

/// Length-prefixed byte vector (UTF-8 strings). The copy is 0-terminated,
/// so `out` needs room for `len + 1` bytes.
pub fn get_byte_vec<const SKIP: bool>(
    nullable: bool,
    cur: &mut Cursor<'_>,
    out: &mut [u8],
    field: &'static str,
) -> DecodeResult<StrField> {
    if cur.is_empty() {
        return Err(DecodeError::EndOfInput { field });
    }
    if out.is_empty() {
        return Err(DecodeError::OutputTooShort { field, capacity: 0 });
    }

    let len = get_integer::<false, u32>(nullable, cur, field)?;
    if len.is_null {
        return Ok(StrField::NULL);
    }
    let len = len.value as usize;
    if !SKIP && len + 1 > out.len() {
        return Err(DecodeError::OutputTooShort {
            field,
            capacity: out.len(),
        });
    }

    let body = cur.take(len, field)?;
    if !SKIP {
        out[..len].copy_from_slice(body);
        out[len] = 0;
    }
    Ok(StrField {
        len,
        is_null: false,
    })
}

/// Presence map: up to 9 groups of 7 bits, packed MSB-first.
pub fn get_pmap(cur: &mut Cursor<'_>, group: &'static str) -> DecodeResult<PMap> {
    let mut pmap: PMap = 0;
    for i in 0..MAX_PMAP_BYTES {
        let b = cur
            .next_byte(group)
            .map_err(|_| DecodeError::Unterminated { field: group })?;
        pmap |= ((b & DATA_BITS) as u64) << (57 - 7 * i);
        if b & STOP_BIT != 0 {
            return Ok(pmap);
        }
    }
    Err(DecodeError::PMapTooLarge { group })
}

/// Message header: PMap, then the template id (PMap bit 0 must be set).
pub fn get_msg_header(cur: &mut Cursor<'_>, group: &'static str) -> DecodeResult<(PMap, Tid)> {
    let pmap = get_pmap(cur, group)?;
    if !pmap_bit(pmap, 0) {
        return Err(DecodeError::MissingTemplateId { group });
    }
    let tid = get_integer::<false, u32>(false, cur, group)?;
    Ok((pmap, tid.value))
}

/// Logical bit `n` of a PMap; bits beyond 62 are never set.
#[inline]
pub const fn pmap_bit(pmap: PMap, n: u32) -> bool {
    n <= 62 && pmap & (1u64 << (63 - n)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int<T: FastInt>(nullable: bool, bytes: &[u8]) -> DecodeResult<IntField<T>> {
        get_integer::<false, T>(nullable, &mut Cursor::new(bytes), "test")
    }

    #[test]
    fn test_unsigned_multi_byte() {
        let f = int::<u32>(false, &[0x39, 0x45, 0xa3]).unwrap();
        assert_eq!(f.value, 942_755);
        assert!(!f.is_null);
    }

    #[test]
    fn test_signed_negative() {
        let f = int::<i32>(false, &[0x46, 0x3a, 0xdd]).unwrap();
        assert_eq!(f.value, -942_755);
        assert!(f.is_negative);
        assert_eq!(int::<i64>(false, &[0xff]).unwrap().value, -1);
    }

    #[test]
    fn test_signed_positive_needs_leading_zero_group() {
        assert_eq!(int::<i32>(false, &[0x00, 0xc0]).unwrap().value, 64);
    }

    #[test]
    fn test_nullable() {
        assert!(int::<u32>(true, &[0x80]).unwrap().is_null);
        assert_eq!(int::<u32>(true, &[0x81]).unwrap().value, 0);
        assert_eq!(int::<i32>(true, &[0x81]).unwrap().value, 0);
        // negative values are not excess-1 shifted
        assert_eq!(int::<i32>(true, &[0xff]).unwrap().value, -1);
        assert_eq!(int::<u32>(false, &[0x80]).unwrap().value, 0);
    }

    #[test]
    fn test_unterminated() {
        let r = int::<u64>(false, &[0x01, 0x02]);
        assert!(matches!(r, Err(DecodeError::Unterminated { .. })));
        let r = int::<u64>(false, &[]);
        assert!(matches!(r, Err(DecodeError::EndOfInput { .. })));
    }

    #[test]
    fn test_skip_advances_and_flags_null() {
        let bytes = [0x80, 0x39, 0x45, 0xa3, 0x81];
        let mut cur = Cursor::new(&bytes);
        let f = get_integer::<true, u64>(true, &mut cur, "a").unwrap();
        assert!(f.is_null);
        let f = get_integer::<true, u64>(false, &mut cur, "b").unwrap();
        assert_eq!(f.value, 0);
        assert_eq!(cur.position(), 4);
    }

    #[test]
    fn test_decimal() {
        let bytes = [0x83, 0x39, 0x45, 0xa3];
        let d = get_decimal::<false>(true, &mut Cursor::new(&bytes), "px")
            .unwrap()
            .unwrap();
        assert_eq!(d.exponent, 2);
        assert_eq!(d.mantissa, 942_755);
        assert_eq!(d.value, 94_275_500.0);
    }

    #[test]
    fn test_decimal_null_stops_after_exponent() {
        let bytes = [0x80, 0x81];
        let mut cur = Cursor::new(&bytes);
        assert_eq!(get_decimal::<false>(true, &mut cur, "px").unwrap(), None);
        assert_eq!(cur.position(), 1);
    }

    #[test]
    fn test_decimal_exponent_range() {
        // exponent 64 = 0x00 0xc0
        let bytes = [0x00, 0xc0, 0x81];
        let r = get_decimal::<false>(false, &mut Cursor::new(&bytes), "px");
        assert!(matches!(r, Err(DecodeError::ExponentOutOfRange { exponent: 64, .. })));
    }

    #[test]
    fn test_old_decimal() {
        // -2, 12345 (0x60 0xb9)
        let bytes = [0xfe, 0x00, 0x60, 0xb9];
        let d = get_old_decimal::<false>(true, &mut Cursor::new(&bytes), "px")
            .unwrap()
            .unwrap();
        assert_eq!((d.exponent, d.mantissa), (-2, 12_345));

        // nullable positive exponent is excess-1
        let bytes = [0x83, 0x81];
        let d = get_old_decimal::<false>(true, &mut Cursor::new(&bytes), "px")
            .unwrap()
            .unwrap();
        assert_eq!((d.exponent, d.mantissa), (2, 1));

        let r = get_old_decimal::<false>(true, &mut Cursor::new(&[0x80]), "px").unwrap();
        assert_eq!(r, None);

        let r = get_old_decimal::<false>(false, &mut Cursor::new(&[0x01, 0x81]), "px");
        assert!(matches!(r, Err(DecodeError::MultiByteExponent { .. })));
    }

    #[test]
    fn test_ascii() {
        let mut out = [0xffu8; 8];
        let f = get_ascii::<false>(false, &mut Cursor::new(&[0x41, 0x42, 0xc3]), &mut out, "s")
            .unwrap();
        assert_eq!(f.len, 3);
        assert_eq!(&out[..4], b"ABC\0");
    }

    #[test]
    fn test_ascii_null_and_empty() {
        let mut out = [0u8; 8];
        let f = get_ascii::<false>(true, &mut Cursor::new(&[0x80]), &mut out, "s").unwrap();
        assert!(f.is_null);
        let f = get_ascii::<false>(true, &mut Cursor::new(&[0x00, 0x80]), &mut out, "s").unwrap();
        assert!(!f.is_null);
        assert_eq!(f.len, 0);
        let f = get_ascii::<false>(false, &mut Cursor::new(&[0x80]), &mut out, "s").unwrap();
        assert!(!f.is_null);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn test_ascii_errors() {
        let mut out = [0u8; 3];
        let r = get_ascii::<false>(false, &mut Cursor::new(&[0x41, 0x42, 0xc3]), &mut out, "s");
        assert!(matches!(r, Err(DecodeError::StringTooLong { .. })));

        let mut out = [0u8; 8];
        let r = get_ascii::<false>(true, &mut Cursor::new(&[0x00, 0xc1]), &mut out, "s");
        assert!(matches!(r, Err(DecodeError::OverlongString { .. })));

        let mut out = [0u8; 1];
        let r = get_ascii::<false>(false, &mut Cursor::new(&[0xc1]), &mut out, "s");
        assert!(matches!(r, Err(DecodeError::OutputTooShort { .. })));
    }

    #[test]
    fn test_ascii_delta_tail() {
        let mut out = [0u8; 8];
        out[..5].copy_from_slice(b"ABCD\0");
        // remove 2 from the tail, append "XY"
        let bytes = [0x82, 0x58, 0xd9];
        let f = get_ascii_delta::<false>(false, &mut Cursor::new(&bytes), &mut out, "s").unwrap();
        assert_eq!(f.len, 4);
        assert_eq!(&out[..5], b"ABXY\0");
    }

    #[test]
    fn test_ascii_delta_head() {
        let mut out = [0u8; 8];
        out[..5].copy_from_slice(b"ABCD\0");
        // -2 is excess-1 for "remove 1 from the head"; prepend "Z"
        let bytes = [0xfe, 0xda];
        let f = get_ascii_delta::<false>(false, &mut Cursor::new(&bytes), &mut out, "s").unwrap();
        assert_eq!(f.len, 4);
        assert_eq!(&out[..5], b"ZBCD\0");
    }

    #[test]
    fn test_ascii_delta_null() {
        let mut out = *b"ABC\0";
        let f = get_ascii_delta::<false>(true, &mut Cursor::new(&[0x80]), &mut out, "s").unwrap();
        assert!(f.is_null);
        assert_eq!(&out, b"ABC\0");
    }

    #[test]
    fn test_byte_vec() {
        let mut out = [0u8; 8];
        let bytes = [0x83, b'a', b'b', b'c'];
        let f = get_byte_vec::<false>(false, &mut Cursor::new(&bytes), &mut out, "u").unwrap();
        assert_eq!(f.len, 3);
        assert_eq!(&out[..4], b"abc\0");

        let f = get_byte_vec::<false>(true, &mut Cursor::new(&[0x80]), &mut out, "u").unwrap();
        assert!(f.is_null);

        let r = get_byte_vec::<false>(false, &mut Cursor::new(&[0x85, b'a', b'b']), &mut out, "u");
        assert!(matches!(r, Err(DecodeError::BeyondEnd { excess: 3, .. })));

        let mut small = [0u8; 3];
        let r = get_byte_vec::<false>(false, &mut Cursor::new(&bytes), &mut small, "u");
        assert!(matches!(r, Err(DecodeError::OutputTooShort { .. })));
    }

    #[test]
    fn test_msg_header() {
        let bytes = [0xc0, 0x83, 0x01];
        let mut cur = Cursor::new(&bytes);
        let (pmap, tid) = get_msg_header(&mut cur, "hdr").unwrap();
        assert!(pmap_bit(pmap, 0));
        assert!(!pmap_bit(pmap, 1));
        assert_eq!(tid, 3);
        assert_eq!(cur.remaining(), 1);
    }

    #[test]
    fn test_msg_header_without_tid_bit() {
        let r = get_msg_header(&mut Cursor::new(&[0xa0, 0x83]), "hdr");
        assert!(matches!(r, Err(DecodeError::MissingTemplateId { .. })));
    }

    #[test]
    fn test_pmap_limits() {
        let long = [0x7fu8; 10];
        let r = get_pmap(&mut Cursor::new(&long), "grp");
        assert!(matches!(r, Err(DecodeError::PMapTooLarge { .. })));

        let mut nine = [0x7fu8; 9];
        nine[8] = 0xff;
        let pmap = get_pmap(&mut Cursor::new(&nine), "grp").unwrap();
        assert!(pmap_bit(pmap, 0));
        assert!(pmap_bit(pmap, 62));
        assert!(!pmap_bit(pmap, 63));
    }
}
