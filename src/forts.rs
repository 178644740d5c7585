//! FORTS market-data messages
//!
//! Fixed-layout structs for the FORTS "Curr" FAST templates and their
//! decoders. Every FORTS field uses the NoOp operator, so sequence entries
//! carry no PMap of their own. Decimals are old-style. SendingTime is
//! decoded in skip mode and dropped.

use crate::decoder::{FastMessage, IncrementalMessage};
use crate::field_counter::{FieldCounter, Operator::NoOp};
use crate::low_level::{Cursor, DecodeError, DecodeResult};
use crate::protocol::{AsciiBuf, Decimal, MDEntryType, MDUpdateAction, MessageType, PMap, Tid};

pub const MAX_MD_ENTRIES: u32 = 128;
pub const MAX_SEQ_ENTRIES: u32 = 8;

/// MDFlags bits for entries that never reach the order book: IOC, OTC,
/// position transfer, exercise, expiration, REPO, multi-trade, FOK and
/// similar non-book events.
pub const INAPPROPRIATE_OB_MASK: i64 = 0x2
    | 0x4
    | 0x8
    | 0x20
    | 0x80
    | 0x20000
    | 0x40000
    | 0x80000
    | 0x800000
    | 0x2000000
    | 0x4000000
    | 0x8000000
    | 0x10000000
    | 0x40000000;

/// MDFlags bit marking the last entry of an exchange transaction.
pub const END_OF_TRANSACTION: i64 = 0x1000;

const MSG: u32 = FieldCounter::MSG_START;
const GRP: u32 = FieldCounter::GROUP_START;

fn check_count(count: u32, max: u32, field: &'static str) -> DecodeResult<usize> {
    if count > max {
        return Err(DecodeError::TooManyEntries { field, count, max });
    }
    Ok(count as usize)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MDFeedType {
    pub md_feed_type: AsciiBuf<64>,
    pub market_depth: u32,
    pub md_book_type: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Underlying {
    pub symbol: AsciiBuf<16>,
    pub security_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Leg {
    pub symbol: AsciiBuf<64>,
    pub security_id: u64,
    pub ratio_qty: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstrAttrib {
    pub attrib_type: i32,
    pub value: AsciiBuf<64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Event {
    pub event_type: i32,
    pub event_date: u32,
    pub event_time: u64,
}

/// Instrument definition (TID 3)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityDefinition {
    pub msg_seq_num: u32,
    pub tot_num_reports: u32,
    pub symbol: AsciiBuf<16>,
    pub security_desc: AsciiBuf<256>,
    pub security_id: u64,
    pub security_alt_id: AsciiBuf<64>,
    pub security_alt_id_source: AsciiBuf<4>,
    pub security_type: AsciiBuf<16>,
    pub cfi_code: AsciiBuf<16>,
    pub strike_price: Decimal,
    pub contract_multiplier: Decimal,
    pub security_trading_status: u32,
    pub currency: AsciiBuf<4>,
    pub market_segment_id: AsciiBuf<4>,
    pub trading_session_id: u32,
    pub exchange_trading_session_id: u32,
    pub volatility: Decimal,
    pub md_feed_types: Vec<MDFeedType>,
    pub underlyings: Vec<Underlying>,
    pub high_limit_px: Decimal,
    pub low_limit_px: Decimal,
    pub min_price_increment: Decimal,
    pub min_price_increment_amount: Decimal,
    pub initial_margin_on_buy: Decimal,
    pub initial_margin_on_sell: Decimal,
    pub initial_margin_synthetic: Decimal,
    pub quotation_list: AsciiBuf<64>,
    pub theor_price: Decimal,
    pub theor_price_limit: Decimal,
    pub legs: Vec<Leg>,
    pub instr_attribs: Vec<InstrAttrib>,
    pub underlying_qty: Decimal,
    pub underlying_currency: AsciiBuf<4>,
    pub events: Vec<Event>,
    pub maturity_date: u32,
    pub maturity_time: u32,
}

impl SecurityDefinition {
    /// Reset scalar fields, keep sequence capacity.
    fn reset(&mut self) {
        let mut md_feed_types = std::mem::take(&mut self.md_feed_types);
        let mut underlyings = std::mem::take(&mut self.underlyings);
        let mut legs = std::mem::take(&mut self.legs);
        let mut instr_attribs = std::mem::take(&mut self.instr_attribs);
        let mut events = std::mem::take(&mut self.events);
        md_feed_types.clear();
        underlyings.clear();
        legs.clear();
        instr_attribs.clear();
        events.clear();
        *self = SecurityDefinition {
            md_feed_types,
            underlyings,
            legs,
            instr_attribs,
            events,
            ..Default::default()
        };
    }
}

impl FastMessage for SecurityDefinition {
    const TID: Tid = MessageType::SecurityDefinition.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);
        const F4: FieldCounter = F3.next(false, NoOp);
        const F5: FieldCounter = F4.next(true, NoOp);
        const F6: FieldCounter = F5.next(false, NoOp);
        const F7: FieldCounter = F6.next(true, NoOp);
        const F8: FieldCounter = F7.next(true, NoOp);
        const F9: FieldCounter = F8.next(true, NoOp);
        const F10: FieldCounter = F9.next(true, NoOp);
        const F11: FieldCounter = F10.next(true, NoOp);
        const F12: FieldCounter = F11.next(true, NoOp);
        const F13: FieldCounter = F12.next(true, NoOp);
        const F14: FieldCounter = F13.next(true, NoOp);
        const F15: FieldCounter = F14.next(false, NoOp);
        const F16: FieldCounter = F15.next(true, NoOp);
        const F17: FieldCounter = F16.next(true, NoOp);
        const F18: FieldCounter = F17.next(true, NoOp);
        const F19: FieldCounter = F18.next(false, NoOp);
        const F20: FieldCounter = F19.next(true, NoOp);
        const F21: FieldCounter = F20.next(true, NoOp);
        const F22: FieldCounter = F21.next(true, NoOp);
        const F23: FieldCounter = F22.next(true, NoOp);
        const F24: FieldCounter = F23.next(true, NoOp);
        const F25: FieldCounter = F24.next(true, NoOp);
        const F26: FieldCounter = F25.next(true, NoOp);
        const F27: FieldCounter = F26.next(true, NoOp);
        const F28: FieldCounter = F27.next(true, NoOp);
        const F29: FieldCounter = F28.next(true, NoOp);
        const F30: FieldCounter = F29.next(true, NoOp);
        const F31: FieldCounter = F30.next(true, NoOp);
        const F32: FieldCounter = F31.next(true, NoOp);
        const F33: FieldCounter = F32.next(true, NoOp);
        const F34: FieldCounter = F33.next(true, NoOp);
        const F35: FieldCounter = F34.next(true, NoOp);
        const F36: FieldCounter = F35.next(true, NoOp);
        const F37: FieldCounter = F36.next(true, NoOp);

        self.reset();

        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.tot_num_reports = F3.read_int(cur, pmap, "TotNumReports")?.or_zero();
        F4.read_ascii(cur, pmap, self.symbol.buf_mut(), "Symbol")?;
        F5.read_byte_vec(cur, pmap, self.security_desc.buf_mut(), "SecurityDesc")?;
        self.security_id = F6.read_int(cur, pmap, "SecurityID")?.or_zero();
        F7.read_ascii(cur, pmap, self.security_alt_id.buf_mut(), "SecurityAltID")?;
        F8.read_ascii(cur, pmap, self.security_alt_id_source.buf_mut(), "SecurityAltIDSource")?;
        F9.read_ascii(cur, pmap, self.security_type.buf_mut(), "SecurityType")?;
        F10.read_ascii(cur, pmap, self.cfi_code.buf_mut(), "CFICode")?;
        self.strike_price = F11.read_decimal(cur, pmap, "StrikePrice")?.or_zero();
        self.contract_multiplier = F12.read_decimal(cur, pmap, "ContractMultiplier")?.or_zero();
        self.security_trading_status = F13.read_int(cur, pmap, "SecurityTradingStatus")?.or_zero();
        F14.read_ascii(cur, pmap, self.currency.buf_mut(), "Currency")?;
        F15.read_ascii(cur, pmap, self.market_segment_id.buf_mut(), "MarketSegmentID")?;
        self.trading_session_id = F16.read_int(cur, pmap, "TradingSessionID")?.or_zero();
        self.exchange_trading_session_id =
            F17.read_int(cur, pmap, "ExchangeTradingSessionID")?.or_zero();
        self.volatility = F18.read_decimal(cur, pmap, "Volatility")?.or_zero();

        let n = F19.read_int::<u32>(cur, pmap, "NoMDFeedTypes")?.or_zero();
        for _ in 0..check_count(n, MAX_SEQ_ENTRIES, "MDFeedTypes")? {
            const S0: FieldCounter = FieldCounter::first(GRP, false, NoOp);
            const S1: FieldCounter = S0.next(true, NoOp);
            const S2: FieldCounter = S1.next(true, NoOp);
            let mut e = MDFeedType::default();
            S0.read_ascii(cur, pmap, e.md_feed_type.buf_mut(), "MDFeedType")?;
            e.market_depth = S1.read_int(cur, pmap, "MarketDepth")?.or_zero();
            e.md_book_type = S2.read_int(cur, pmap, "MDBookType")?.or_zero();
            self.md_feed_types.push(e);
        }

        let n = F20.read_int::<u32>(cur, pmap, "NoUnderlyings")?.or_zero();
        for _ in 0..check_count(n, MAX_SEQ_ENTRIES, "Underlyings")? {
            const S0: FieldCounter = FieldCounter::first(GRP, false, NoOp);
            const S1: FieldCounter = S0.next(true, NoOp);
            let mut e = Underlying::default();
            S0.read_ascii(cur, pmap, e.symbol.buf_mut(), "UnderlyingSymbol")?;
            e.security_id = S1.read_int(cur, pmap, "UnderlyingSecurityID")?.or_zero();
            self.underlyings.push(e);
        }

        self.high_limit_px = F21.read_decimal(cur, pmap, "HighLimitPx")?.or_zero();
        self.low_limit_px = F22.read_decimal(cur, pmap, "LowLimitPx")?.or_zero();
        self.min_price_increment = F23.read_decimal(cur, pmap, "MinPriceIncrement")?.or_zero();
        self.min_price_increment_amount =
            F24.read_decimal(cur, pmap, "MinPriceIncrementAmount")?.or_zero();
        self.initial_margin_on_buy = F25.read_decimal(cur, pmap, "InitialMarginOnBuy")?.or_zero();
        self.initial_margin_on_sell = F26.read_decimal(cur, pmap, "InitialMarginOnSell")?.or_zero();
        self.initial_margin_synthetic =
            F27.read_decimal(cur, pmap, "InitialMarginSyntetic")?.or_zero();
        F28.read_ascii(cur, pmap, self.quotation_list.buf_mut(), "QuotationList")?;
        self.theor_price = F29.read_decimal(cur, pmap, "TheorPrice")?.or_zero();
        self.theor_price_limit = F30.read_decimal(cur, pmap, "TheorPriceLimit")?.or_zero();

        let n = F31.read_int::<u32>(cur, pmap, "NoLegs")?.or_zero();
        for _ in 0..check_count(n, MAX_SEQ_ENTRIES, "Legs")? {
            const S0: FieldCounter = FieldCounter::first(GRP, false, NoOp);
            const S1: FieldCounter = S0.next(false, NoOp);
            const S2: FieldCounter = S1.next(false, NoOp);
            let mut e = Leg::default();
            S0.read_ascii(cur, pmap, e.symbol.buf_mut(), "LegSymbol")?;
            e.security_id = S1.read_int(cur, pmap, "LegSecurityID")?.or_zero();
            e.ratio_qty = S2.read_decimal(cur, pmap, "LegRatioQty")?.or_zero();
            self.legs.push(e);
        }

        let n = F32.read_int::<u32>(cur, pmap, "NoInstrAttribs")?.or_zero();
        for _ in 0..check_count(n, MAX_SEQ_ENTRIES, "InstrAttribs")? {
            const S0: FieldCounter = FieldCounter::first(GRP, false, NoOp);
            const S1: FieldCounter = S0.next(false, NoOp);
            let mut e = InstrAttrib::default();
            e.attrib_type = S0.read_int(cur, pmap, "InstrAttribType")?.or_zero();
            S1.read_ascii(cur, pmap, e.value.buf_mut(), "InstrAttribValue")?;
            self.instr_attribs.push(e);
        }

        self.underlying_qty = F33.read_decimal(cur, pmap, "UnderlyingQty")?.or_zero();
        F34.read_ascii(cur, pmap, self.underlying_currency.buf_mut(), "UnderlyingCurrency")?;

        let n = F35.read_int::<u32>(cur, pmap, "NoEvents")?.or_zero();
        for _ in 0..check_count(n, MAX_SEQ_ENTRIES, "Events")? {
            const S0: FieldCounter = FieldCounter::first(GRP, false, NoOp);
            const S1: FieldCounter = S0.next(false, NoOp);
            const S2: FieldCounter = S1.next(false, NoOp);
            let e = Event {
                event_type: S0.read_int(cur, pmap, "EventType")?.or_zero(),
                event_date: S1.read_int(cur, pmap, "EventDate")?.or_zero(),
                event_time: S2.read_int(cur, pmap, "EventTime")?.or_zero(),
            };
            self.events.push(e);
        }

        self.maturity_date = F36.read_int(cur, pmap, "MaturityDate")?.or_zero();
        self.maturity_time = F37.read_int(cur, pmap, "MaturityTime")?.or_zero();
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

/// Volatility and theoretical price update (TID 4)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SecurityDefinitionUpdate {
    pub msg_seq_num: u32,
    pub security_id: u64,
    pub volatility: Decimal,
    pub theor_price: Decimal,
    pub theor_price_limit: Decimal,
}

impl FastMessage for SecurityDefinitionUpdate {
    const TID: Tid = MessageType::SecurityDefinitionUpdate.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);
        const F4: FieldCounter = F3.next(true, NoOp);
        const F5: FieldCounter = F4.next(true, NoOp);
        const F6: FieldCounter = F5.next(true, NoOp);

        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.security_id = F3.read_int(cur, pmap, "SecurityID")?.or_zero();
        self.volatility = F4.read_decimal(cur, pmap, "Volatility")?.or_zero();
        self.theor_price = F5.read_decimal(cur, pmap, "TheorPrice")?.or_zero();
        self.theor_price_limit = F6.read_decimal(cur, pmap, "TheorPriceLimit")?.or_zero();
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

/// Trading status, price limits and margins (TID 5)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SecurityStatus {
    pub msg_seq_num: u32,
    pub security_id: u64,
    pub symbol: AsciiBuf<16>,
    pub security_trading_status: u32,
    pub high_limit_px: Decimal,
    pub low_limit_px: Decimal,
    pub initial_margin_on_buy: Decimal,
    pub initial_margin_on_sell: Decimal,
    pub initial_margin_synthetic: Decimal,
}

impl FastMessage for SecurityStatus {
    const TID: Tid = MessageType::SecurityStatus.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);
        const F4: FieldCounter = F3.next(false, NoOp);
        const F5: FieldCounter = F4.next(true, NoOp);
        const F6: FieldCounter = F5.next(true, NoOp);
        const F7: FieldCounter = F6.next(true, NoOp);
        const F8: FieldCounter = F7.next(true, NoOp);
        const F9: FieldCounter = F8.next(true, NoOp);
        const F10: FieldCounter = F9.next(true, NoOp);

        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.security_id = F3.read_int(cur, pmap, "SecurityID")?.or_zero();
        F4.read_ascii(cur, pmap, self.symbol.buf_mut(), "Symbol")?;
        self.security_trading_status = F5.read_int(cur, pmap, "SecurityTradingStatus")?.or_zero();
        self.high_limit_px = F6.read_decimal(cur, pmap, "HighLimitPx")?.or_zero();
        self.low_limit_px = F7.read_decimal(cur, pmap, "LowLimitPx")?.or_zero();
        self.initial_margin_on_buy = F8.read_decimal(cur, pmap, "InitialMarginOnBuy")?.or_zero();
        self.initial_margin_on_sell = F9.read_decimal(cur, pmap, "InitialMarginOnSell")?.or_zero();
        self.initial_margin_synthetic =
            F10.read_decimal(cur, pmap, "InitialMarginSyntetic")?.or_zero();
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

/// TID 6
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub msg_seq_num: u32,
}

impl FastMessage for HeartBeat {
    const TID: Tid = MessageType::HeartBeat.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);

        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

/// TID 7
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceReset {
    pub msg_seq_num: u32,
    pub new_seq_no: u32,
}

impl FastMessage for SequenceReset {
    const TID: Tid = MessageType::SequenceReset.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);

        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.new_seq_no = F3.read_int(cur, pmap, "NewSeqNo")?.or_zero();
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

/// Session schedule and state (TID 8)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradingSessionStatus {
    pub msg_seq_num: u32,
    pub trad_ses_open_time: u64,
    pub trad_ses_close_time: u64,
    pub trad_ses_interm_clearing_start_time: u64,
    pub trad_ses_interm_clearing_end_time: u64,
    pub trading_session_id: u32,
    pub exchange_trading_session_id: u32,
    pub trad_ses_status: u32,
    pub market_segment_id: AsciiBuf<16>,
    pub trad_ses_event: i32,
}

impl FastMessage for TradingSessionStatus {
    const TID: Tid = MessageType::TradingSessionStatus.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);
        const F4: FieldCounter = F3.next(false, NoOp);
        const F5: FieldCounter = F4.next(true, NoOp);
        const F6: FieldCounter = F5.next(true, NoOp);
        const F7: FieldCounter = F6.next(false, NoOp);
        const F8: FieldCounter = F7.next(true, NoOp);
        const F9: FieldCounter = F8.next(false, NoOp);
        const F10: FieldCounter = F9.next(false, NoOp);
        const F11: FieldCounter = F10.next(true, NoOp);

        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.trad_ses_open_time = F3.read_int(cur, pmap, "TradSesOpenTime")?.or_zero();
        self.trad_ses_close_time = F4.read_int(cur, pmap, "TradSesCloseTime")?.or_zero();
        self.trad_ses_interm_clearing_start_time =
            F5.read_int(cur, pmap, "TradSesIntermClearingStartTime")?.or_zero();
        self.trad_ses_interm_clearing_end_time =
            F6.read_int(cur, pmap, "TradSesIntermClearingEndTime")?.or_zero();
        self.trading_session_id = F7.read_int(cur, pmap, "TradingSessionID")?.or_zero();
        self.exchange_trading_session_id =
            F8.read_int(cur, pmap, "ExchangeTradingSessionID")?.or_zero();
        self.trad_ses_status = F9.read_int(cur, pmap, "TradSesStatus")?.or_zero();
        F10.read_ascii(cur, pmap, self.market_segment_id.buf_mut(), "MarketSegmentID")?;
        self.trad_ses_event = F11.read_int(cur, pmap, "TradSesEvent")?.or_zero();
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

/// One orders-log event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IncrEntry {
    pub md_update_action: u32,
    pub md_entry_type: AsciiBuf<4>,
    pub md_entry_id: i64,
    pub security_id: u64,
    pub rpt_seq: u32,
    pub md_entry_date: u32,
    pub md_entry_time: u64,
    pub md_entry_px: Decimal,
    pub md_entry_size: i64,
    pub last_px: Decimal,
    pub last_qty: i64,
    pub trade_id: i64,
    pub exchange_trading_session_id: u32,
    pub md_flags: i64,
    pub revision: u64,
}

impl IncrEntry {
    pub fn update_action(&self) -> Option<MDUpdateAction> {
        MDUpdateAction::from_u32(self.md_update_action)
    }

    pub fn entry_type(&self) -> Option<MDEntryType> {
        MDEntryType::from_bytes(self.md_entry_type.as_bytes())
    }

    /// New orders only count once their transaction is complete and they
    /// did not trade on arrival; non-book flags exclude the entry entirely.
    pub fn is_valid_update(&self) -> bool {
        let not_new = self.md_update_action != 0;
        let not_trade = self.trade_id == 0;
        let trans_end = self.md_flags & END_OF_TRANSACTION != 0;
        let appropriate = self.md_flags & INAPPROPRIATE_OB_MASK == 0;
        (not_new || (not_trade && trans_end)) && appropriate
    }

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const S0: FieldCounter = FieldCounter::first(GRP, false, NoOp);
        const S1: FieldCounter = S0.next(false, NoOp);
        const S2: FieldCounter = S1.next(true, NoOp);
        const S3: FieldCounter = S2.next(true, NoOp);
        const S4: FieldCounter = S3.next(true, NoOp);
        const S5: FieldCounter = S4.next(true, NoOp);
        const S6: FieldCounter = S5.next(false, NoOp);
        const S7: FieldCounter = S6.next(true, NoOp);
        const S8: FieldCounter = S7.next(true, NoOp);
        const S9: FieldCounter = S8.next(true, NoOp);
        const S10: FieldCounter = S9.next(true, NoOp);
        const S11: FieldCounter = S10.next(true, NoOp);
        const S12: FieldCounter = S11.next(true, NoOp);
        const S13: FieldCounter = S12.next(true, NoOp);
        const S14: FieldCounter = S13.next(true, NoOp);

        self.md_update_action = S0.read_int(cur, pmap, "MDUpdateAction")?.or_zero();
        S1.read_ascii(cur, pmap, self.md_entry_type.buf_mut(), "MDEntryType")?;
        self.md_entry_id = S2.read_int(cur, pmap, "MDEntryID")?.or_zero();
        self.security_id = S3.read_int(cur, pmap, "SecurityID")?.or_zero();
        self.rpt_seq = S4.read_int(cur, pmap, "RptSeq")?.or_zero();
        self.md_entry_date = S5.read_int(cur, pmap, "MDEntryDate")?.or_zero();
        self.md_entry_time = S6.read_int(cur, pmap, "MDEntryTime")?.or_zero();
        self.md_entry_px = S7.read_decimal(cur, pmap, "MDEntryPx")?.or_zero();
        self.md_entry_size = S8.read_int(cur, pmap, "MDEntrySize")?.or_zero();
        self.last_px = S9.read_decimal(cur, pmap, "LastPx")?.or_zero();
        self.last_qty = S10.read_int(cur, pmap, "LastQty")?.or_zero();
        self.trade_id = S11.read_int(cur, pmap, "TradeID")?.or_zero();
        self.exchange_trading_session_id =
            S12.read_int(cur, pmap, "ExchangeTradingSessionID")?.or_zero();
        self.md_flags = S13.read_int(cur, pmap, "MDFlags")?.or_zero();
        self.revision = S14.read_int(cur, pmap, "Revision")?.or_zero();
        Ok(())
    }
}

/// Orders-log incremental refresh (TID 14)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrdersLogIncrRefresh {
    pub msg_seq_num: u32,
    pub last_fragment: u32,
    pub entries: Vec<IncrEntry>,
}

impl OrdersLogIncrRefresh {
    pub fn new() -> Self {
        OrdersLogIncrRefresh {
            entries: Vec::with_capacity(MAX_MD_ENTRIES as usize),
            ..Default::default()
        }
    }
}

impl IncrementalMessage for OrdersLogIncrRefresh {
    const NAME: &'static str = "OrdersLogIncrRefresh";
    const SESSION_STATUS_TID: Option<Tid> = Some(TradingSessionStatus::TID);

    fn is_service_tid(tid: Tid) -> bool {
        matches!(
            MessageType::from_tid(tid),
            Some(MessageType::HeartBeat | MessageType::TradingSessionStatus)
        )
    }

    fn set_empty(&mut self, msg_seq_num: u32) {
        self.msg_seq_num = msg_seq_num;
        self.last_fragment = 0;
        self.entries.clear();
    }

    fn set_msg_seq_num(&mut self, msg_seq_num: u32) {
        self.msg_seq_num = msg_seq_num;
    }
}

impl FastMessage for OrdersLogIncrRefresh {
    const TID: Tid = MessageType::OrdersLogIncrRefresh.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);
        const F4: FieldCounter = F3.next(false, NoOp);

        self.entries.clear();
        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.last_fragment = F3.read_int(cur, pmap, "LastFragment")?.or_zero();

        let n = F4.read_int::<u32>(cur, pmap, "NoMDEntries")?.or_zero();
        for _ in 0..check_count(n, MAX_MD_ENTRIES, "MDEntries")? {
            let mut e = IncrEntry::default();
            e.decode(cur, pmap)?;
            self.entries.push(e);
        }
        Ok(())
    }

    fn msg_seq_num(&self) -> u32 {
        self.msg_seq_num
    }
}

/// One resting order in an orders-log snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapEntry {
    pub md_entry_type: AsciiBuf<4>,
    pub md_entry_id: i64,
    pub md_entry_date: u32,
    pub md_entry_time: u64,
    pub md_entry_px: Decimal,
    pub md_entry_size: i64,
    pub trade_id: i64,
    pub md_flags: i64,
}

impl SnapEntry {
    pub fn entry_type(&self) -> Option<MDEntryType> {
        MDEntryType::from_bytes(self.md_entry_type.as_bytes())
    }

    pub fn is_valid_update(&self) -> bool {
        self.trade_id == 0 && self.md_flags & INAPPROPRIATE_OB_MASK == 0
    }

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const S0: FieldCounter = FieldCounter::first(GRP, false, NoOp);
        const S1: FieldCounter = S0.next(true, NoOp);
        const S2: FieldCounter = S1.next(true, NoOp);
        const S3: FieldCounter = S2.next(false, NoOp);
        const S4: FieldCounter = S3.next(true, NoOp);
        const S5: FieldCounter = S4.next(true, NoOp);
        const S6: FieldCounter = S5.next(true, NoOp);
        const S7: FieldCounter = S6.next(true, NoOp);

        S0.read_ascii(cur, pmap, self.md_entry_type.buf_mut(), "MDEntryType")?;
        self.md_entry_id = S1.read_int(cur, pmap, "MDEntryID")?.or_zero();
        self.md_entry_date = S2.read_int(cur, pmap, "MDEntryDate")?.or_zero();
        self.md_entry_time = S3.read_int(cur, pmap, "MDEntryTime")?.or_zero();
        self.md_entry_px = S4.read_decimal(cur, pmap, "MDEntryPx")?.or_zero();
        self.md_entry_size = S5.read_int(cur, pmap, "MDEntrySize")?.or_zero();
        self.trade_id = S6.read_int(cur, pmap, "TradeID")?.or_zero();
        self.md_flags = S7.read_int(cur, pmap, "MDFlags")?.or_zero();
        Ok(())
    }
}

/// Orders-log snapshot of one instrument (TID 15)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrdersLogSnapShot {
    pub msg_seq_num: u32,
    pub last_msg_seq_num_processed: u32,
    pub rpt_seq: u32,
    pub last_fragment: u32,
    pub route_first: u32,
    pub exchange_trading_session_id: u32,
    pub security_id: u64,
    pub entries: Vec<SnapEntry>,
}

impl OrdersLogSnapShot {
    pub fn new() -> Self {
        OrdersLogSnapShot {
            entries: Vec::with_capacity(MAX_MD_ENTRIES as usize),
            ..Default::default()
        }
    }
}

impl FastMessage for OrdersLogSnapShot {
    const TID: Tid = MessageType::OrdersLogSnapShot.tid();

    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()> {
        const F1: FieldCounter = FieldCounter::first(MSG, false, NoOp);
        const F2: FieldCounter = F1.next(false, NoOp);
        const F3: FieldCounter = F2.next(false, NoOp);
        const F4: FieldCounter = F3.next(true, NoOp);
        const F5: FieldCounter = F4.next(false, NoOp);
        const F6: FieldCounter = F5.next(false, NoOp);
        const F7: FieldCounter = F6.next(false, NoOp);
        const F8: FieldCounter = F7.next(true, NoOp);
        const F9: FieldCounter = F8.next(false, NoOp);

        self.entries.clear();
        self.msg_seq_num = F1.read_int(cur, pmap, "MsgSeqNum")?.or_zero();
        F2.skip_int::<u64>(cur, pmap, "SendingTime")?;
        self.last_msg_seq_num_processed =
            F3.read_int(cur, pmap, "LastMsgSeqNumProcessed")?.or_zero();
        self.rpt_seq = F4.read_int(cur, pmap, "RptSeq")?.or_zero();
        self.last_fragment = F5.read_int(cur, pmap, "LastFragment")?.or_zero();
        self.route_first = F6.read_int(cur, pmap, "RouteFirst")?.or_zero();
        self.exchange_trading_session_id =
            F7.read_int(cur, pmap, "ExchangeTradingSessionID")?.or_zero();
        self.security_id = F8.read_int(cur, pmap, "SecurityID")?.or_zero();

        let n = F9.read_int::<u32>(cur, pmap, "NoMDEntries")?.or_zero();
        for _ in 0..check_count(n, MAX_MD_ENTRIES, "MDEntries")? {
            let mut e = SnapEntry::default();
            e.decode(cur, pmap)?;
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

    fn entry(action: u32, trade_id: i64, flags: i64) -> IncrEntry {
        IncrEntry {
            md_update_action: action,
            trade_id,
            md_flags: flags,
            ..Default::default()
        }
    }

    #[test]
    fn test_incr_validity() {
        // New needs end-of-transaction and no trade
        assert!(!entry(0, 0, 0).is_valid_update());
        assert!(entry(0, 0, END_OF_TRANSACTION).is_valid_update());
        assert!(!entry(0, 77, END_OF_TRANSACTION).is_valid_update());
        // Change / Delete are taken as they come
        assert!(entry(1, 77, 0).is_valid_update());
        assert!(entry(2, 0, 0).is_valid_update());
        // IOC never reaches the book
        assert!(!entry(2, 0, 0x2).is_valid_update());
    }

    #[test]
    fn test_snap_validity() {
        let e = SnapEntry::default();
        assert!(e.is_valid_update());
        let e = SnapEntry {
            md_flags: 0x80000,
            ..Default::default()
        };
        assert!(!e.is_valid_update());
    }

    #[test]
    fn test_too_many_entries() {
        assert!(check_count(128, MAX_MD_ENTRIES, "x").is_ok());
        assert!(matches!(
            check_count(129, MAX_MD_ENTRIES, "x"),
            Err(DecodeError::TooManyEntries { count: 129, .. })
        ));
    }

    #[test]
    fn test_heartbeat_decode() {
        // MsgSeqNum=5, SendingTime=1
        let bytes = [0x85, 0x81];
        let mut hb = HeartBeat::default();
        let mut cur = Cursor::new(&bytes);
        hb.decode(&mut cur, 0).unwrap();
        assert_eq!(hb.msg_seq_num, 5);
        assert!(cur.is_empty());
    }
}
