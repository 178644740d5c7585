//! FAST encoder
//!
//! Produces datagrams the decoders accept: the packet seqnum prefix, the
//! PMap/TID header and fields in template order. Optional fields that hold
//! their zero value are written as NULL. Used by tests, benches and the demo
//! feed generator.

use byteorder::{ByteOrder, LittleEndian};

use crate::forts::{
    IncrEntry, OrdersLogIncrRefresh, OrdersLogSnapShot, SecurityDefinition,
    SecurityDefinitionUpdate, SecurityStatus, SnapEntry, TradingSessionStatus,
};
use crate::decoder::FastMessage;
use crate::micex;
use crate::protocol::{AsciiBuf, Decimal, MessageType, Tid, PACKET_PREFIX_LEN};

const STOP_BIT: u8 = 0x80;
const DATA_BITS: u8 = 0x7f;
const SIGN_BIT: u8 = 0x40;

/// Byte-level FAST writer.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder {
            buf: Vec::with_capacity(256),
        }
    }

    /// Start a datagram with its little-endian packet seqnum.
    pub fn with_seq_num(sn: u32) -> Self {
        let mut enc = Self::new();
        let mut prefix = [0u8; PACKET_PREFIX_LEN];
        LittleEndian::write_u32(&mut prefix, sn);
        enc.buf.extend_from_slice(&prefix);
        enc
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    fn put_groups(&mut self, groups: &mut Vec<u8>) {
        groups.reverse();
        if let Some(last) = groups.last_mut() {
            *last |= STOP_BIT;
        }
        self.buf.extend_from_slice(groups);
    }

    fn put_unsigned(&mut self, mut v: u64) {
        let mut groups = Vec::with_capacity(10);
        loop {
            groups.push((v as u8) & DATA_BITS);
            v >>= 7;
            if v == 0 {
                break;
            }
        }
        self.put_groups(&mut groups);
    }

    fn put_signed(&mut self, mut v: i64) {
        let mut groups = Vec::with_capacity(10);
        loop {
            let g = (v as u8) & DATA_BITS;
            groups.push(g);
            v >>= 7;
            if (v == 0 && g & SIGN_BIT == 0) || (v == -1 && g & SIGN_BIT != 0) {
                break;
            }
        }
        self.put_groups(&mut groups);
    }

    /// Presence map from logical bits (bit 0 first).
    pub fn pmap(&mut self, bits: &[bool]) -> &mut Self {
        let mut groups: Vec<u8> = bits
            .chunks(7)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &b)| if b { acc | (SIGN_BIT >> i) } else { acc })
            })
            .collect();
        if groups.is_empty() {
            groups.push(0);
        }
        // trailing all-zero groups carry no information
        while groups.len() > 1 && groups.last() == Some(&0) {
            groups.pop();
        }
        if let Some(last) = groups.last_mut() {
            *last |= STOP_BIT;
        }
        self.buf.extend_from_slice(&groups);
        self
    }

    /// Message header: PMap with the TID bit set, then the TID.
    pub fn header(&mut self, field_bits: &[bool], tid: Tid) -> &mut Self {
        let mut bits = Vec::with_capacity(field_bits.len() + 1);
        bits.push(true);
        bits.extend_from_slice(field_bits);
        self.pmap(&bits);
        self.put_unsigned(tid as u64);
        self
    }

    pub fn uint(&mut self, v: u64) -> &mut Self {
        self.put_unsigned(v);
        self
    }

    /// Nullable unsigned: excess-1, `None` is NULL.
    pub fn uint_opt(&mut self, v: Option<u64>) -> &mut Self {
        match v {
            None => self.buf.push(STOP_BIT),
            Some(v) => self.put_unsigned(v.wrapping_add(1)),
        }
        self
    }

    pub fn int(&mut self, v: i64) -> &mut Self {
        self.put_signed(v);
        self
    }

    /// Nullable signed: non-negative values are stored plus one.
    pub fn int_opt(&mut self, v: Option<i64>) -> &mut Self {
        match v {
            None => self.buf.push(STOP_BIT),
            Some(v) if v >= 0 => self.put_signed(v.wrapping_add(1)),
            Some(v) => self.put_signed(v),
        }
        self
    }

    /// Two-field decimal: exponent then mantissa.
    pub fn decimal(&mut self, d: Decimal) -> &mut Self {
        self.put_signed(d.exponent as i64);
        self.put_signed(d.mantissa);
        self
    }

    pub fn decimal_opt(&mut self, d: Option<Decimal>) -> &mut Self {
        match d {
            None => self.buf.push(STOP_BIT),
            Some(d) => {
                self.int_opt(Some(d.exponent as i64));
                self.put_signed(d.mantissa);
            }
        }
        self
    }

    fn put_old_exponent(&mut self, exponent: i32) {
        self.buf.push(STOP_BIT | ((exponent as u8) & DATA_BITS));
    }

    /// Old-style decimal: single exponent byte, then mantissa.
    pub fn old_decimal(&mut self, d: Decimal) -> &mut Self {
        self.put_old_exponent(d.exponent);
        self.put_signed(d.mantissa);
        self
    }

    pub fn old_decimal_opt(&mut self, d: Option<Decimal>) -> &mut Self {
        match d {
            None => self.buf.push(STOP_BIT),
            Some(d) => {
                let e = if d.exponent >= 0 { d.exponent + 1 } else { d.exponent };
                self.put_old_exponent(e);
                self.put_signed(d.mantissa);
            }
        }
        self
    }

    pub fn ascii(&mut self, s: &str) -> &mut Self {
        let bytes = s.as_bytes();
        match bytes.split_last() {
            None => self.buf.push(STOP_BIT),
            Some((last, init)) => {
                self.buf.extend(init.iter().map(|b| b & DATA_BITS));
                self.buf.push((last & DATA_BITS) | STOP_BIT);
            }
        }
        self
    }

    /// Nullable ASCII: NULL is a lone stop byte, empty is `0x00 0x80`.
    pub fn ascii_opt(&mut self, s: Option<&str>) -> &mut Self {
        match s {
            None => self.buf.push(STOP_BIT),
            Some("") => self.buf.extend_from_slice(&[0x00, STOP_BIT]),
            Some(s) => {
                self.ascii(s);
            }
        }
        self
    }

    pub fn byte_vec(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_unsigned(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn byte_vec_opt(&mut self, bytes: Option<&[u8]>) -> &mut Self {
        match bytes {
            None => self.buf.push(STOP_BIT),
            Some(b) => {
                self.put_unsigned(b.len() as u64 + 1);
                self.buf.extend_from_slice(b);
            }
        }
        self
    }

    // Optional-field shorthands: zero is written as NULL.

    fn u_opt<T: Into<u64>>(&mut self, v: T) -> &mut Self {
        let v = v.into();
        self.uint_opt((v != 0).then_some(v))
    }

    fn i_opt<T: Into<i64>>(&mut self, v: T) -> &mut Self {
        let v = v.into();
        self.int_opt((v != 0).then_some(v))
    }

    fn dec_opt(&mut self, d: Decimal) -> &mut Self {
        self.old_decimal_opt((d != Decimal::default()).then_some(d))
    }

    fn str_opt<const N: usize>(&mut self, s: &AsciiBuf<N>) -> &mut Self {
        self.ascii_opt((!s.is_empty()).then(|| s.as_str()))
    }
}

fn forts_header(sn: u32, msg_type: MessageType) -> Encoder {
    let mut enc = Encoder::with_seq_num(sn);
    // FORTS templates have no PMap bits besides the TID
    enc.header(&[], msg_type.tid());
    enc
}

/// FORTS HeartBeat with a zero SendingTime.
pub fn heartbeat(sn: u32) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::HeartBeat);
    enc.uint(sn as u64).uint(0);
    enc.finish()
}

pub fn sequence_reset(sn: u32, new_seq_no: u32) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::SequenceReset);
    enc.uint(sn as u64).uint(0).uint(new_seq_no as u64);
    enc.finish()
}

pub fn trading_session_status(sn: u32, m: &TradingSessionStatus) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::TradingSessionStatus);
    enc.uint(m.msg_seq_num as u64)
        .uint(0)
        .uint(m.trad_ses_open_time)
        .uint(m.trad_ses_close_time)
        .u_opt(m.trad_ses_interm_clearing_start_time)
        .u_opt(m.trad_ses_interm_clearing_end_time)
        .uint(m.trading_session_id as u64)
        .u_opt(m.exchange_trading_session_id)
        .uint(m.trad_ses_status as u64)
        .ascii(m.market_segment_id.as_str())
        .i_opt(m.trad_ses_event);
    enc.finish()
}

pub fn security_status(sn: u32, m: &SecurityStatus) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::SecurityStatus);
    enc.uint(m.msg_seq_num as u64)
        .uint(0)
        .uint(m.security_id)
        .ascii(m.symbol.as_str())
        .u_opt(m.security_trading_status)
        .dec_opt(m.high_limit_px)
        .dec_opt(m.low_limit_px)
        .dec_opt(m.initial_margin_on_buy)
        .dec_opt(m.initial_margin_on_sell)
        .dec_opt(m.initial_margin_synthetic);
    enc.finish()
}

pub fn security_definition_update(sn: u32, m: &SecurityDefinitionUpdate) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::SecurityDefinitionUpdate);
    enc.uint(m.msg_seq_num as u64)
        .uint(0)
        .uint(m.security_id)
        .dec_opt(m.volatility)
        .dec_opt(m.theor_price)
        .dec_opt(m.theor_price_limit);
    enc.finish()
}

pub fn security_definition(sn: u32, m: &SecurityDefinition) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::SecurityDefinition);
    enc.uint(m.msg_seq_num as u64)
        .uint(0)
        .uint(m.tot_num_reports as u64)
        .ascii(m.symbol.as_str())
        .byte_vec_opt((!m.security_desc.is_empty()).then(|| m.security_desc.as_bytes()))
        .uint(m.security_id)
        .str_opt(&m.security_alt_id)
        .str_opt(&m.security_alt_id_source)
        .str_opt(&m.security_type)
        .str_opt(&m.cfi_code)
        .dec_opt(m.strike_price)
        .dec_opt(m.contract_multiplier)
        .u_opt(m.security_trading_status)
        .str_opt(&m.currency)
        .ascii(m.market_segment_id.as_str())
        .u_opt(m.trading_session_id)
        .u_opt(m.exchange_trading_session_id)
        .dec_opt(m.volatility);

    enc.uint(m.md_feed_types.len() as u64);
    for e in &m.md_feed_types {
        enc.ascii(e.md_feed_type.as_str())
            .u_opt(e.market_depth)
            .u_opt(e.md_book_type);
    }
    enc.uint_opt(Some(m.underlyings.len() as u64));
    for e in &m.underlyings {
        enc.ascii(e.symbol.as_str()).u_opt(e.security_id);
    }

    enc.dec_opt(m.high_limit_px)
        .dec_opt(m.low_limit_px)
        .dec_opt(m.min_price_increment)
        .dec_opt(m.min_price_increment_amount)
        .dec_opt(m.initial_margin_on_buy)
        .dec_opt(m.initial_margin_on_sell)
        .dec_opt(m.initial_margin_synthetic)
        .str_opt(&m.quotation_list)
        .dec_opt(m.theor_price)
        .dec_opt(m.theor_price_limit);

    enc.uint_opt(Some(m.legs.len() as u64));
    for e in &m.legs {
        enc.ascii(e.symbol.as_str())
            .uint(e.security_id)
            .old_decimal(e.ratio_qty);
    }
    enc.uint_opt(Some(m.instr_attribs.len() as u64));
    for e in &m.instr_attribs {
        enc.int(e.attrib_type as i64).ascii(e.value.as_str());
    }

    enc.dec_opt(m.underlying_qty).str_opt(&m.underlying_currency);

    enc.uint_opt(Some(m.events.len() as u64));
    for e in &m.events {
        enc.int(e.event_type as i64)
            .uint(e.event_date as u64)
            .uint(e.event_time);
    }
    enc.u_opt(m.maturity_date).u_opt(m.maturity_time);
    enc.finish()
}

fn incr_entry(enc: &mut Encoder, e: &IncrEntry) {
    enc.uint(e.md_update_action as u64)
        .ascii(e.md_entry_type.as_str())
        .i_opt(e.md_entry_id)
        .u_opt(e.security_id)
        .u_opt(e.rpt_seq)
        .u_opt(e.md_entry_date)
        .uint(e.md_entry_time)
        .dec_opt(e.md_entry_px)
        .i_opt(e.md_entry_size)
        .dec_opt(e.last_px)
        .i_opt(e.last_qty)
        .i_opt(e.trade_id)
        .u_opt(e.exchange_trading_session_id)
        .i_opt(e.md_flags)
        .u_opt(e.revision);
}

/// FORTS OrdersLogIncrRefresh datagram with packet seqnum `sn`.
pub fn orders_log_incr_refresh(sn: u32, m: &OrdersLogIncrRefresh) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::OrdersLogIncrRefresh);
    enc.uint(m.msg_seq_num as u64)
        .uint(0)
        .uint(m.last_fragment as u64)
        .uint(m.entries.len() as u64);
    for e in &m.entries {
        incr_entry(&mut enc, e);
    }
    enc.finish()
}

fn snap_entry(enc: &mut Encoder, e: &SnapEntry) {
    enc.ascii(e.md_entry_type.as_str())
        .i_opt(e.md_entry_id)
        .u_opt(e.md_entry_date)
        .uint(e.md_entry_time)
        .dec_opt(e.md_entry_px)
        .i_opt(e.md_entry_size)
        .i_opt(e.trade_id)
        .i_opt(e.md_flags);
}

/// FORTS OrdersLogSnapShot datagram with packet seqnum `sn`.
pub fn orders_log_snapshot(sn: u32, m: &OrdersLogSnapShot) -> Vec<u8> {
    let mut enc = forts_header(sn, MessageType::OrdersLogSnapShot);
    enc.uint(m.msg_seq_num as u64)
        .uint(0)
        .uint(m.last_msg_seq_num_processed as u64)
        .u_opt(m.rpt_seq)
        .uint(m.last_fragment as u64)
        .uint(m.route_first as u64)
        .uint(m.exchange_trading_session_id as u64)
        .u_opt(m.security_id)
        .uint(m.entries.len() as u64);
    for e in &m.entries {
        snap_entry(&mut enc, e);
    }
    enc.finish()
}

/// Copy-operator bookkeeping for one group entry: each present field sets
/// its PMap bit and appends its bytes.
struct CopyEntry {
    bits: Vec<bool>,
    body: Encoder,
}

impl CopyEntry {
    fn new() -> Self {
        CopyEntry {
            bits: Vec::with_capacity(16),
            body: Encoder::new(),
        }
    }

    /// Field is written unless it repeats the previous entry (or, for the
    /// first entry, the default).
    fn copy<T: PartialEq + Default>(
        &mut self,
        value: T,
        prev: Option<T>,
        write: impl FnOnce(&mut Encoder, T),
    ) {
        let same = match prev {
            Some(p) => p == value,
            None => value == T::default(),
        };
        self.bits.push(!same);
        if !same {
            write(&mut self.body, value);
        }
    }

    fn absent(&mut self) {
        self.bits.push(false);
    }

    fn finish(self, enc: &mut Encoder) {
        enc.pmap(&self.bits);
        enc.raw(self.body.as_bytes());
    }
}

fn nullable_str(enc: &mut Encoder, s: &str) {
    enc.ascii_opt(Some(s));
}

/// MICEX FX IncrementalRefresh (TID 3610) with Copy-compressed entries.
pub fn micex_incremental_refresh(sn: u32, m: &micex::IncrementalRefresh) -> Vec<u8> {
    let mut enc = Encoder::with_seq_num(sn);
    enc.header(&[], micex::IncrementalRefresh::TID)
        .uint(m.msg_seq_num as u64)
        .uint(0)
        .uint(m.entries.len() as u64);

    let mut prev: Option<&micex::IncrEntry> = None;
    for e in &m.entries {
        let mut ce = CopyEntry::new();
        ce.copy(e.md_update_action, prev.map(|p| p.md_update_action), |w, v| {
            w.uint_opt(Some(v as u64));
        });
        ce.copy(e.md_entry_type.as_str(), prev.map(|p| p.md_entry_type.as_str()), nullable_str);
        ce.body.str_opt(&e.md_entry_id);
        ce.copy(e.symbol.as_str(), prev.map(|p| p.symbol.as_str()), nullable_str);
        ce.body.i_opt(e.rpt_seq);
        ce.copy(e.md_entry_date, prev.map(|p| p.md_entry_date), |w, v| {
            w.uint_opt(Some(v as u64));
        });
        ce.copy(e.md_entry_time, prev.map(|p| p.md_entry_time), |w, v| {
            w.uint_opt(Some(v as u64));
        });
        ce.copy(e.orig_time, prev.map(|p| p.orig_time), |w, v| {
            w.uint_opt(Some(v as u64));
        });
        ce.copy(e.md_entry_px, prev.map(|p| p.md_entry_px), |w, v| {
            w.old_decimal_opt(Some(v));
        });
        ce.copy(e.md_entry_size, prev.map(|p| p.md_entry_size), |w, v| {
            w.old_decimal_opt(Some(v));
        });
        ce.absent(); // OrderStatus
        ce.copy(
            e.trading_session_id.as_str(),
            prev.map(|p| p.trading_session_id.as_str()),
            nullable_str,
        );
        ce.absent(); // TradingSessionSubID
        ce.finish(&mut enc);
        prev = Some(e);
    }
    enc.finish()
}

/// MICEX FX SnapShot (TID 3600) with Copy-compressed entries.
pub fn micex_snapshot(sn: u32, m: &micex::SnapShot) -> Vec<u8> {
    let mut enc = Encoder::with_seq_num(sn);
    enc.header(&[], micex::SnapShot::TID)
        .uint(m.msg_seq_num as u64)
        .uint(0)
        .u_opt(m.last_msg_seq_num_processed)
        .int(m.rpt_seq as i64)
        .u_opt(m.last_fragment)
        .uint_opt(None)
        .int_opt(None)
        .str_opt(&m.trading_session_id)
        .ascii(m.symbol.as_str())
        .int_opt(None)
        .uint(m.entries.len() as u64);

    let mut prev: Option<&micex::SnapEntry> = None;
    for e in &m.entries {
        let mut ce = CopyEntry::new();
        ce.copy(e.md_entry_type.as_str(), prev.map(|p| p.md_entry_type.as_str()), nullable_str);
        ce.body.str_opt(&e.md_entry_id);
        ce.copy(e.md_entry_date, prev.map(|p| p.md_entry_date), |w, v| {
            w.uint_opt(Some(v as u64));
        });
        ce.copy(e.md_entry_time, prev.map(|p| p.md_entry_time), |w, v| {
            w.uint_opt(Some(v as u64));
        });
        ce.copy(e.orig_time, prev.map(|p| p.orig_time), |w, v| {
            w.uint_opt(Some(v as u64));
        });
        ce.copy(e.md_entry_px, prev.map(|p| p.md_entry_px), |w, v| {
            w.old_decimal_opt(Some(v));
        });
        ce.copy(e.md_entry_size, prev.map(|p| p.md_entry_size), |w, v| {
            w.old_decimal_opt(Some(v));
        });
        ce.absent(); // OrderStatus
        ce.absent(); // TradingSessionSubID
        ce.finish(&mut enc);
        prev = Some(e);
    }
    enc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned() {
        assert_eq!(Encoder::new().uint(0).as_bytes(), &[0x80]);
        assert_eq!(Encoder::new().uint(942755).as_bytes(), &[0x39, 0x45, 0xa3]);
        assert_eq!(Encoder::new().uint_opt(None).as_bytes(), &[0x80]);
        assert_eq!(Encoder::new().uint_opt(Some(0)).as_bytes(), &[0x81]);
    }

    #[test]
    fn test_signed() {
        assert_eq!(Encoder::new().int(-1).as_bytes(), &[0xff]);
        assert_eq!(Encoder::new().int(64).as_bytes(), &[0x00, 0xc0]);
        assert_eq!(Encoder::new().int(-942755).as_bytes(), &[0x46, 0x3a, 0xdd]);
        assert_eq!(Encoder::new().int_opt(Some(-1)).as_bytes(), &[0xff]);
        assert_eq!(Encoder::new().int_opt(Some(0)).as_bytes(), &[0x81]);
    }

    #[test]
    fn test_pmap() {
        assert_eq!(Encoder::new().pmap(&[true]).as_bytes(), &[0xc0]);
        assert_eq!(Encoder::new().pmap(&[]).as_bytes(), &[0x80]);
        let mut bits = [false; 8];
        bits[7] = true;
        assert_eq!(Encoder::new().pmap(&bits).as_bytes(), &[0x00, 0xc0]);
        assert_eq!(Encoder::new().pmap(&[true, false, false]).as_bytes(), &[0xc0]);
    }

    #[test]
    fn test_ascii() {
        assert_eq!(Encoder::new().ascii("ABC").as_bytes(), &[0x41, 0x42, 0xc3]);
        assert_eq!(Encoder::new().ascii("").as_bytes(), &[0x80]);
        assert_eq!(Encoder::new().ascii_opt(Some("")).as_bytes(), &[0x00, 0x80]);
    }

    #[test]
    fn test_old_decimal() {
        let d = Decimal::new(-2, 94275500);
        let mut enc = Encoder::new();
        enc.old_decimal(d);
        let bytes = enc.finish();
        assert_eq!(bytes[0], 0xfe);

        let mut enc = Encoder::new();
        enc.old_decimal_opt(Some(Decimal::new(0, 5)))
            .old_decimal_opt(None);
        assert_eq!(enc.finish(), vec![0x81, 0x85, 0x80]);
    }

    #[test]
    fn test_prefix() {
        let enc = Encoder::with_seq_num(0x0102_0304);
        assert_eq!(enc.as_bytes(), &[4, 3, 2, 1]);
    }
}
