//! Field counter and FAST operator rules
//!
//! Each template field is tagged with an operator and an optionality flag.
//! Those two decide whether the field owns a PMap bit and whether its wire
//! encoding is nullable. `FieldCounter` chains field to field in `const`
//! context, so a template's bit layout is fixed at compile time:
//!
//! ```
//! use fast_feed_handler::field_counter::{FieldCounter, Operator};
//!
//! const F1: FieldCounter = FieldCounter::first(FieldCounter::MSG_START, false, Operator::NoOp);
//! const F2: FieldCounter = F1.next(true, Operator::Copy);
//! const F3: FieldCounter = F2.next(true, Operator::Default);
//! assert_eq!(F2.pmap_pos(), Some(1));
//! assert_eq!(F3.pmap_pos(), Some(2));
//! ```

use crate::low_level::{
    get_ascii, get_ascii_delta, get_byte_vec, get_integer, get_old_decimal, pmap_bit, Cursor,
    DecodeError, DecodeResult, FastInt,
};
use crate::protocol::{Decimal, PMap};

/// Room for any string decoded in skip mode.
const SKIP_ASCII_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    NoOp,
    Const,
    Copy,
    Default,
    Delta,
    Increment,
    Tail,
}

pub const fn has_pmap_bit(op: Operator, optional: bool) -> bool {
    match op {
        Operator::NoOp | Operator::Delta => false,
        Operator::Const => optional,
        Operator::Copy | Operator::Default | Operator::Increment | Operator::Tail => true,
    }
}

/// Optional Const fields always have their value, so they are never NULL.
pub const fn is_nullable(op: Operator, optional: bool) -> bool {
    optional && !matches!(op, Operator::Const)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCounter {
    pos: u32,
    op: Operator,
    optional: bool,
    has_bit: bool,
}

impl FieldCounter {
    /// First bit of a top-level message; bit 0 is the template id.
    pub const MSG_START: u32 = 1;
    /// First bit of a sequence entry.
    pub const GROUP_START: u32 = 0;

    pub const fn first(start: u32, optional: bool, op: Operator) -> Self {
        FieldCounter {
            pos: start,
            op,
            optional,
            has_bit: has_pmap_bit(op, optional),
        }
    }

    pub const fn next(self, optional: bool, op: Operator) -> Self {
        let pos = if self.has_bit { self.pos + 1 } else { self.pos };
        FieldCounter::first(pos, optional, op)
    }

    pub const fn pmap_pos(&self) -> Option<u32> {
        if self.has_bit {
            Some(self.pos)
        } else {
            None
        }
    }

    pub const fn has_pmap_bit(&self) -> bool {
        self.has_bit
    }

    pub const fn is_nullable(&self) -> bool {
        is_nullable(self.op, self.optional)
    }

    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    pub const fn operator(&self) -> Operator {
        self.op
    }

    #[inline]
    pub fn is_present(&self, pmap: PMap) -> bool {
        !self.has_bit || pmap_bit(pmap, self.pos)
    }

    fn check_mandatory(&self, is_null: bool, field: &'static str) -> DecodeResult<()> {
        if is_null && !self.optional {
            return Err(DecodeError::MissingMandatory { field });
        }
        Ok(())
    }

    pub fn read_int<T: FastInt>(
        &self,
        cur: &mut Cursor<'_>,
        pmap: PMap,
        field: &'static str,
    ) -> DecodeResult<FieldValue<T>> {
        if !self.is_present(pmap) {
            return Ok(FieldValue::Absent);
        }
        let f = get_integer::<false, T>(self.is_nullable(), cur, field)?;
        self.check_mandatory(f.is_null, field)?;
        Ok(if f.is_null {
            FieldValue::Null
        } else {
            FieldValue::Value(f.value)
        })
    }

    /// Decode and discard.
    pub fn skip_int<T: FastInt>(
        &self,
        cur: &mut Cursor<'_>,
        pmap: PMap,
        field: &'static str,
    ) -> DecodeResult<()> {
        if self.is_present(pmap) {
            let f = get_integer::<true, T>(self.is_nullable(), cur, field)?;
            self.check_mandatory(f.is_null, field)?;
        }
        Ok(())
    }

    /// Old-style (single-byte exponent) decimal.
    pub fn read_decimal(
        &self,
        cur: &mut Cursor<'_>,
        pmap: PMap,
        field: &'static str,
    ) -> DecodeResult<FieldValue<Decimal>> {
        if !self.is_present(pmap) {
            return Ok(FieldValue::Absent);
        }
        let d = get_old_decimal::<false>(self.is_nullable(), cur, field)?;
        self.check_mandatory(d.is_none(), field)?;
        Ok(d.map_or(FieldValue::Null, FieldValue::Value))
    }

    pub fn skip_decimal(
        &self,
        cur: &mut Cursor<'_>,
        pmap: PMap,
        field: &'static str,
    ) -> DecodeResult<()> {
        if self.is_present(pmap) {
            let d = get_old_decimal::<true>(self.is_nullable(), cur, field)?;
            self.check_mandatory(d.is_none(), field)?;
        }
        Ok(())
    }

    /// ASCII into `out`. With the Delta operator `out` must already hold
    /// the base value. Returns the string length.
    pub fn read_ascii(
        &self,
        cur: &mut Cursor<'_>,
        pmap: PMap,
        out: &mut [u8],
        field: &'static str,
    ) -> DecodeResult<FieldValue<usize>> {
        if !self.is_present(pmap) {
            return Ok(FieldValue::Absent);
        }
        let s = if self.op == Operator::Delta {
            get_ascii_delta::<false>(self.is_nullable(), cur, out, field)?
        } else {
            get_ascii::<false>(self.is_nullable(), cur, out, field)?
        };
        self.check_mandatory(s.is_null, field)?;
        Ok(if s.is_null {
            FieldValue::Null
        } else {
            FieldValue::Value(s.len)
        })
    }

    pub fn skip_ascii(
        &self,
        cur: &mut Cursor<'_>,
        pmap: PMap,
        field: &'static str,
    ) -> DecodeResult<()> {
        if self.is_present(pmap) {
            let mut scratch = [0u8; SKIP_ASCII_CAPACITY];
            let s = get_ascii::<true>(self.is_nullable(), cur, &mut scratch, field)?;
            self.check_mandatory(s.is_null, field)?;
        }
        Ok(())
    }

    /// Length-prefixed UTF-8 bytes into `out`.
    pub fn read_byte_vec(
        &self,
        cur: &mut Cursor<'_>,
        pmap: PMap,
        out: &mut [u8],
        field: &'static str,
    ) -> DecodeResult<FieldValue<usize>> {
        if !self.is_present(pmap) {
            return Ok(FieldValue::Absent);
        }
        let s = get_byte_vec::<false>(self.is_nullable(), cur, out, field)?;
        self.check_mandatory(s.is_null, field)?;
        Ok(if s.is_null {
            FieldValue::Null
        } else {
            FieldValue::Value(s.len)
        })
    }
}

/// Outcome of reading one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<T> {
    /// PMap bit clear: nothing on the wire.
    Absent,
    Null,
    Value(T),
}

impl<T> FieldValue<T> {
    pub fn value(self) -> Option<T> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl<T: Default> FieldValue<T> {
    /// NULL and absent fields read as zero.
    pub fn or_zero(self) -> T {
        self.value().unwrap_or_default()
    }

    /// Copy operator: an absent field repeats `prev`.
    pub fn or_copy(self, prev: T) -> T {
        match self {
            FieldValue::Absent => prev,
            FieldValue::Null => T::default(),
            FieldValue::Value(v) => v,
        }
    }
}
