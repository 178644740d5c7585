//! MICEX currency (FX) orders-log messages
//!
//! Unlike FORTS, every MICEX sequence entry opens with its own PMap, and
//! most entry fields use the Copy operator: a field whose PMap bit is clear
//! repeats the value from the previous entry of the same message. The first
//! entry has nothing to copy from and keeps the zero value.

use crate::decoder::{FastMessage, IncrementalMessage};
use crate::field_counter::{
    FieldCounter, FieldValue,
    Operator::{Copy, NoOp},
};
use crate::low_level::{get_pmap, Cursor, DecodeError, DecodeResult};
use crate::protocol::{AsciiBuf, Decimal, MDEntryType, MDUpdateAction, PMap, Tid};

pub const INCREMENTAL_REFRESH_TID: Tid = 3610;
pub const SNAPSHOT_TID: Tid = 3600;
pub const TRADING_SESSION_STATUS_TID: Tid = 2107;
pub const HEARTBEAT_TID: Tid = 2108;

pub const MAX_MD_ENTRIES: u32 = 128;

const MSG: u32 = FieldCounter::MSG_START;
const GRP: u32 = FieldCounter::GROUP_START;

fn entry_count(n: u32) -> DecodeResult<usize> {
    if n > MAX_MD_ENTRIES {
        return Err(DecodeError::TooManyEntries {
            field: "MDEntries",
            count: n,
            max: MAX_MD_ENTRIES,
        });
    }
    Ok(n as usize)
}

/// Copy operator for a string read in place: when absent, take `prev`'s.
fn copy_ascii<const N: usize>(
    read: FieldValue<usize>,
    out: &mut AsciiBuf<N>,
    prev: Option<&AsciiBuf<N>>,
) {
    if let (FieldValue::Absent, Some(p)) = (read, prev) {
        *out = *p;
    }
}

/// Copy operator for scalars: absent on the first entry keeps the default.
fn copy_value<T: Default + std::marker::Copy>(read: FieldValue<T>, prev: Option<T>) -> T {
    match prev {
        Some(p) => read.or_copy(p),
        None => read.or_zero(),
    }
}

#[derive(Debug, Clone, std::marker::Copy, Default, PartialEq)]
pub struct IncrEntry {
    pub md_update_action: u32,
    pub md_entry_type: AsciiBuf<4>,
    pub md_entry_id: AsciiBuf<16>,
    pub symbol: AsciiBuf<16>,
    pub rpt_seq: i32,
    pub md_entry_date: u32,
    pub md_entry_time: u32,
    pub orig_time: u32,
    pub md_entry_px: Decimal,
    pub md_entry_size: Decimal,
    pub trading_session_id: AsciiBuf<16>,
}

impl IncrEntry {
    pub fn update_action(&self) -> Option<MDUpdateAction> {
        MDUpdateAction::from_u32(self.md_update_action)
    }

    pub fn entry_type(&self) -> Option<MDEntryType> {
        MDEntryType::from_bytes(self.md_entry_type.as_bytes())
    }

    fn decode(&mut self, cur: &mut Cursor<'_>, prev: Option<&IncrEntry>) -> DecodeResult<()> {
        const S0: FieldCounter = FieldCounter::first(GRP, true, Copy);
        const S1: FieldCounter = S0.next(true, Copy);
        const S2: FieldCounter = S1.next(true, NoOp);
        const S3: FieldCounter = S2.next(true, Copy);
        const S4: FieldCounter = S3.next(true, NoOp);
        const S5: FieldCounter = S4.next(true, Copy);
        const S6: FieldCounter = S5.next(true, Copy);
        const S7: FieldCounter = S6.next(true, Copy);
        const S8: FieldCounter = S7.next(true, Copy);
        const S9: FieldCounter = S8.next(true, Copy);
        const S10: FieldCounter = S9.next(true, Copy);
        const S11: FieldCounter = S10.next(true, Copy);
        const S12: FieldCounter = S11.next(true, Copy);

        let pmap: PMap = get_pmap(cur, "3610")?;

        self.md_update_action = copy_value(
            S0.read_int(cur, pmap, "MDUpdateAction")?,
            prev.map(|p| p.md_update_action),
        );
        let v = S1.read_ascii(cur, pmap, self.md_entry_type.buf_mut(), "MDEntryType")?;
        copy_ascii(v, &mut self.md_entry_type, prev.map(|p| &p.md_entry_type));
        S2.read_ascii(cur, pmap, self.md_entry_id.buf_mut(), "MDEntryID")?;
        let v = S3.read_ascii(cur, pmap, self.symbol.buf_mut(), "Symbol")?;
        copy_ascii(v, &mut self.symbol, prev.map(|p| &p.symbol));
        self.rpt_seq = S4.read_int(cur, pmap, "RptSeq")?.or_zero();
        self.md_entry_date = copy_value(
            S5.read_int(cur, pmap, "MDEntryDate")?,
            prev.map(|p| p.md_entry_date),
        );
        self.md_entry_time = copy_value(
            S6.read_int(cur, pmap, "MDEntryTime")?,
            prev.map(|p| p.md_entry_time),
        );
        self.orig_time = copy_value(
            S7.read_int(cur, pmap, "OrigTime")?,
            prev.map(|p| p.orig_time),
        );
        self.md_entry_px = copy_value(
            S8.read_decimal(cur, pmap, "MDEntryPx")?,
            prev.map(|p| p.md_entry_px),
        );
        self.md_entry_size = copy_value(
            S9.read_decimal(cur, pmap, "MDEntrySize")?,
            prev.map(|p| p.md_entry_size),
        );
        S10.skip_ascii(cur, pmap, "OrderStatus")?;
        let v = S11.read_ascii(cur, pmap, self.trading_session_id.buf_mut(), "TradingSessionID")?;
        copy_ascii(v, &mut self.trading_session_id, prev.map(|p| &p.trading_session_id));
        S12.skip_ascii(cur, pmap, "TradingSessionSubID")?;
        Ok(())
    }
}

/// Orders-log incremental refresh, TID 3610
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncrementalRefresh {
    pub msg_seq_num: u32,
    pub entries: Vec<IncrEntry>,
}

impl FastMessage for IncrementalRefresh {
    const TID: Tid = INCREMENTAL_REFRESH_TID;

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);

        self.entries.clear();
        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        let n = F3.read_int::<u32>(cur, pmap, "NoMDEntries")?.or_zero();

        for _ in 0..entry_count(n)? {
            let prev = self.entries.last().copied();
            let mut e = IncrEntry::default();
            e.decode(cur, prev.as_ref())?;
            self.entries.push(e);
        }
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

impl IncrementalMessage for IncrementalRefresh {
    const NAME: &'static str = "IncrementalRefresh";

    fn is_service_tid(tid: Tid) -> bool {
        tid == HEARTBEAT_TID || tid == TRADING_SESSION_STATUS_TID
    }

    fn set_empty(&mut self, msg_seq_num: u32) {
        self.msg_seq_num = msg_seq_num;
        self.entries.clear();
    }

    fn set_msg_seq_num(&mut self, msg_seq_num: u32) {
        self.msg_seq_num = msg_seq_num;
    }
}

#[derive(Debug, Clone, std::marker::Copy, Default, PartialEq)]
pub struct SnapEntry {
    pub md_entry_type: AsciiBuf<4>,
    pub md_entry_id: AsciiBuf<16>,
    pub md_entry_date: u32,
    pub md_entry_time: u32,
    pub orig_time: u32,
    pub md_entry_px: Decimal,
    pub md_entry_size: Decimal,
}

impl SnapEntry {
    pub fn entry_type(&self) -> Option<MDEntryType> {
        MDEntryType::from_bytes(self.md_entry_type.as_bytes())
    }

    fn decode(&mut self, cur: &mut Cursor<'_>, prev: Option<&SnapEntry>) -> DecodeResult<()> {
        const S0: FieldCounter = FieldCounter::first(GRP, true, Copy);
        const S1: FieldCounter = S0.next(true, NoOp);
        const S2: FieldCounter = S1.next(true, Copy);
        const S3: FieldCounter = S2.next(true, Copy);
        const S4: FieldCounter = S3.next(true, Copy);
        const S5: FieldCounter = S4.next(true, Copy);
        const S6: FieldCounter = S5.next(true, Copy);
        const S7: FieldCounter = S6.next(true, Copy);
        const S8: FieldCounter = S7.next(true, Copy);

        let pmap: PMap = get_pmap(cur, "3600")?;

        let v = S0.read_ascii(cur, pmap, self.md_entry_type.buf_mut(), "MDEntryType")?;
        copy_ascii(v, &mut self.md_entry_type, prev.map(|p| &p.md_entry_type));
        S1.read_ascii(cur, pmap, self.md_entry_id.buf_mut(), "MDEntryID")?;
        self.md_entry_date = copy_value(
            S2.read_int(cur, pmap, "MDEntryDate")?,
            prev.map(|p| p.md_entry_date),
        );
        self.md_entry_time = copy_value(
            S3.read_int(cur, pmap, "MDEntryTime")?,
            prev.map(|p| p.md_entry_time),
        );
        self.orig_time = copy_value(
            S4.read_int(cur, pmap, "OrigTime")?,
            prev.map(|p| p.orig_time),
        );
        self.md_entry_px = copy_value(
            S5.read_decimal(cur, pmap, "MDEntryPx")?,
            prev.map(|p| p.md_entry_px),
        );
        self.md_entry_size = copy_value(
            S6.read_decimal(cur, pmap, "MDEntrySize")?,
            prev.map(|p| p.md_entry_size),
        );
        S7.skip_ascii(cur, pmap, "OrderStatus")?;
        S8.skip_ascii(cur, pmap, "TradingSessionSubID")?;
        Ok(())
    }
}

/// Orders-log snapshot of one symbol, TID 3600
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapShot {
    pub msg_seq_num: u32,
    pub last_msg_seq_num_processed: u32,
    pub rpt_seq: i32,
    pub last_fragment: u32,
    pub trading_session_id: AsciiBuf<16>,
    pub symbol: AsciiBuf<16>,
    pub entries: Vec<SnapEntry>,
}

impl FastMessage for SnapShot {
    const TID: Tid = SNAPSHOT_TID;

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(true, NoOp);
        const F4: FieldCounter = F3.next(false, NoOp);
        const F5: FieldCounter = F4.next(true, NoOp);
        const F6: FieldCounter = F5.next(true, NoOp);
        const F7: FieldCounter = F6.next(true, NoOp);
        const F8: FieldCounter = F7.next(true, NoOp);
        const F9: FieldCounter = F8.next(false, NoOp);
        const F10: FieldCounter = F9.next(true, NoOp);
        const F11: FieldCounter = F10.next(false, NoOp);

        self.entries.clear();
        self.trading_session_id.clear();
        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.last_msg_seq_num_processed =
            F3.read_int(cur, pmap, "LastMsgSeqNumProcessed")?.or_zero();
        self.rpt_seq = F4.read_int(cur, pmap, "RptSeq")?.or_zero();
        self.last_fragment = F5.read_int(cur, pmap, "LastFragment")?.or_zero();
        F6.skip_int::<u32>(cur, pmap, "RouteFirst")?;
        F7.skip_int::<i32>(cur, pmap, "TradSesStatus")?;
        F8.read_ascii(cur, pmap, self.trading_session_id.buf_mut(), "TradingSessionID")?;
        F9.read_ascii(cur, pmap, self.symbol.buf_mut(), "Symbol")?;
        F10.skip_int::<i32>(cur, pmap, "MDSecurityTradingStatus")?;
        let n = F11.read_int::<u32>(cur, pmap, "NoMDEntries")?.or_zero();

        for _ in 0..entry_count(n)? {
            let prev = self.entries.last().copied();
            let mut e = SnapEntry::default();
            e.decode(cur, prev.as_ref())?;
            self.entries.push(e);
        }
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_value() {
        assert_eq!(copy_value(FieldValue::<u32>::Absent, None), 0);
        assert_eq!(copy_value(FieldValue::<u32>::Absent, Some(9)), 9);
        assert_eq!(copy_value(FieldValue::Value(3u32), Some(9)), 3);
        assert_eq!(copy_value(FieldValue::<u32>::Null, Some(9)), 0);
    }

    #[test]
    fn test_copy_ascii() {
        let mut prev = AsciiBuf::<16>::new();
        prev.set("EUR_RUB__TOM");
        let mut out = AsciiBuf::<16>::new();
        copy_ascii(FieldValue::Absent, &mut out, Some(&prev));
        assert_eq!(out.as_str(), "EUR_RUB__TOM");

        let mut out = AsciiBuf::<16>::new();
        out.set("USD000UTSTOM");
        copy_ascii(FieldValue::Value(12), &mut out, Some(&prev));
        assert_eq!(out.as_str(), "USD000UTSTOM");
    }

    #[test]
    fn test_entry_count_limit() {
        assert_eq!(entry_count(0).unwrap(), 0);
        assert!(entry_count(MAX_MD_ENTRIES + 1).is_err());
    }
}
