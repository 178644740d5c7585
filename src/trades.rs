//! Trades incrementals
//!
//! Trades need no snapshot, so a trades channel runs its reorder buffer
//! with init mode off from the first packet. In-order messages are reduced
//! to [`Trade`] records which the caller drains.

use std::convert::Infallible;

use tracing::debug;

use crate::config::BufferConfig;
use crate::decoder::IncrementalMessage;
use crate::forts::OrdersLogIncrRefresh;
use crate::incrs_channel::IncrementalChannel;
use crate::micex;
use crate::protocol::{AsciiBuf, Decimal, MDEntryType, SeqNum, TimeVal};
use crate::seq_num_buffer::{Processor, SeqNumResult};
use crate::stats::FeedStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    SecurityId(u64),
    Symbol(AsciiBuf<16>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    /// Packet seqnum the trade arrived in.
    pub sn: SeqNum,
    pub instrument: Instrument,
    /// 0 if the venue's id is not numeric.
    pub trade_id: i64,
    pub px: Decimal,
    pub qty: Decimal,
    pub md_entry_time: u64,
    pub recv_ts: TimeVal,
}

/// An incremental template that carries trades.
pub trait TradeSource: IncrementalMessage {
    /// Append the trades in `self` to `out`.
    fn collect_trades(&self, sn: SeqNum, recv_ts: TimeVal, out: &mut Vec<Trade>);
}

impl TradeSource for OrdersLogIncrRefresh {
    /// Fills carry TradeID and LastQty. Both orders of a match report the
    /// same TradeID; the trade is taken once.
    fn collect_trades(&self, sn: SeqNum, recv_ts: TimeVal, out: &mut Vec<Trade>) {
        let first = out.len();
        for e in self.entries.iter().filter(|e| e.trade_id != 0 && e.last_qty > 0) {
            let instrument = Instrument::SecurityId(e.security_id);
            let seen = out[first..]
                .iter()
                .any(|t| t.trade_id == e.trade_id && t.instrument == instrument);
            if seen {
                continue;
            }
            out.push(Trade {
                sn,
                instrument,
                trade_id: e.trade_id,
                px: e.last_px,
                qty: Decimal::new(0, e.last_qty),
                md_entry_time: e.md_entry_time,
                recv_ts,
            });
        }
    }
}

impl TradeSource for micex::IncrementalRefresh {
    fn collect_trades(&self, sn: SeqNum, recv_ts: TimeVal, out: &mut Vec<Trade>) {
        let trades = self
            .entries
            .iter()
            .filter(|e| e.entry_type() == Some(MDEntryType::Trade));
        for e in trades {
            out.push(Trade {
                sn,
                instrument: Instrument::Symbol(e.symbol),
                trade_id: e.md_entry_id.as_str().parse().unwrap_or(0),
                px: e.md_entry_px,
                qty: e.md_entry_size,
                md_entry_time: u64::from(e.md_entry_time),
                recv_ts,
            });
        }
    }
}

/// Collects trades from in-order messages.
#[derive(Debug, Default)]
pub struct TradesProcessor {
    trades: Vec<Trade>,
    pub stats: FeedStats,
}

impl TradesProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trades collected since the last [`take_trades`](Self::take_trades).
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn take_trades(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.trades)
    }
}

impl<M: TradeSource> Processor<M> for TradesProcessor {
    type Error = Infallible;

    fn process(
        &mut self,
        sn: SeqNum,
        msg: &M,
        init_mode: bool,
        recv_ts: TimeVal,
        _handl_ts: TimeVal,
    ) -> Result<(), Infallible> {
        debug_assert!(!init_mode, "trades buffer never runs in init mode");
        let before = self.trades.len();
        msg.collect_trades(sn, recv_ts, &mut self.trades);
        if self.trades.len() > before {
            debug!(sn, count = self.trades.len() - before, "trades");
        }

        let latency = if recv_ts.is_empty() {
            0
        } else {
            TimeVal::now().micros_since(recv_ts)
        };
        self.stats.record_processed(latency);
        Ok(())
    }

    fn on_lost(&mut self, first: SeqNum, last: SeqNum) {
        self.stats.record_lost(first, last);
    }
}

/// Trades channel over any trade-carrying incremental template.
pub type TradesChannel<M> = IncrementalChannel<M, TradesProcessor>;

impl<M: TradeSource> IncrementalChannel<M, TradesProcessor> {
    /// A channel that delivers from the first packet on.
    pub fn trades(config: &BufferConfig) -> SeqNumResult<Self> {
        Self::new("trades", config, false, TradesProcessor::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forts::IncrEntry;

    fn fill(security_id: u64, trade_id: i64, last_qty: i64) -> IncrEntry {
        IncrEntry {
            md_update_action: 1,
            security_id,
            trade_id,
            last_px: Decimal::new(-1, 1005),
            last_qty,
            ..Default::default()
        }
    }

    #[test]
    fn test_forts_fill_taken_once() {
        let msg = OrdersLogIncrRefresh {
            msg_seq_num: 9,
            last_fragment: 1,
            entries: vec![
                fill(42, 700, 3),
                fill(42, 700, 3),
                fill(43, 700, 1),
                fill(42, 0, 0),
            ],
        };
        let mut out = Vec::new();
        msg.collect_trades(9, TimeVal::default(), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].instrument, Instrument::SecurityId(42));
        assert_eq!(out[0].qty, Decimal::new(0, 3));
        assert_eq!(out[1].instrument, Instrument::SecurityId(43));
    }

    #[test]
    fn test_micex_trade_entries_only() {
        let mut trade = micex::IncrEntry::default();
        trade.md_entry_type.set("2");
        trade.md_entry_id.set("123456");
        trade.symbol.set("USD000UTSTOM");
        trade.md_entry_size = Decimal::new(0, 5);
        let mut bid = trade;
        bid.md_entry_type.set("0");

        let msg = micex::IncrementalRefresh {
            msg_seq_num: 4,
            entries: vec![bid, trade],
        };
        let mut out = Vec::new();
        msg.collect_trades(4, TimeVal::default(), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trade_id, 123456);
        let mut symbol = AsciiBuf::new();
        symbol.set("USD000UTSTOM");
        assert_eq!(out[0].instrument, Instrument::Symbol(symbol));
    }
}
