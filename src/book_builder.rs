/// Orders-log order book builder
///
/// Keeps every resting order keyed by MDEntryID, plus bid/ask price levels
/// in BTreeMaps aggregated from those orders. Built from FORTS orders-log
/// snapshots and kept current with incremental New/Change/Delete entries.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::forts::{IncrEntry, SnapEntry};
use crate::protocol::{Decimal, MDEntryType, MDUpdateAction, SeqNum, PRICE_EXPONENT};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    #[error("book {security_id}: duplicate order {order_id}")]
    DuplicateOrder { security_id: u64, order_id: i64 },

    #[error("book {security_id}: order {order_id} changed side")]
    SideFlip { security_id: u64, order_id: i64 },

    #[error("book {security_id}: invalid new order {order_id}: {reason}")]
    InvalidNew {
        security_id: u64,
        order_id: i64,
        reason: &'static str,
    },

    #[error("book {security_id}: price {price} not representable")]
    BadPrice { security_id: u64, price: Decimal },
}

pub type BookResult<T> = Result<T, BookError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn from_entry_type(t: MDEntryType) -> Option<Self> {
        match t {
            MDEntryType::Bid => Some(Side::Bid),
            MDEntryType::Offer => Some(Side::Ask),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub order_id: i64,
    pub price: i64, // fixed-point, PRICE_EXPONENT
    pub quantity: i64,
    pub side: Side,
}

/// One instrument's book.
#[derive(Debug, Clone)]
pub struct OrderBook {
    security_id: u64,

    // price -> total quantity at that price
    bids: BTreeMap<i64, i64>,
    asks: BTreeMap<i64, i64>,

    orders: HashMap<i64, Order>,

    last_seq_num: SeqNum,
    last_rpt_seq: u32,
    initialised: bool,
    // highest seqnum routed here before the book was initialised
    init_sn: SeqNum,
}

impl OrderBook {
    pub fn new(security_id: u64) -> Self {
        OrderBook {
            security_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            last_seq_num: 0,
            last_rpt_seq: 0,
            initialised: false,
            init_sn: 0,
        }
    }

    pub fn security_id(&self) -> u64 {
        self.security_id
    }

    pub fn last_seq_num(&self) -> SeqNum {
        self.last_seq_num
    }

    pub fn last_rpt_seq(&self) -> u32 {
        self.last_rpt_seq
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn set_initialised(&mut self) {
        self.initialised = true;
    }

    /// Remember that the update at `sn` reached this book before it was
    /// initialised.
    pub fn note_init_update(&mut self, sn: SeqNum) {
        self.init_sn = self.init_sn.max(sn);
    }

    pub fn init_sn(&self) -> SeqNum {
        self.init_sn
    }

    /// Whether the installed state is at least as recent as every update
    /// seen before initialisation.
    pub fn covers_init_updates(&self) -> bool {
        self.last_seq_num >= self.init_sn
    }

    /// Drop all orders and sequencing state. The init-mode seqnum survives:
    /// those updates are gone from the reorder buffer.
    pub fn reset(&mut self) {
        self.clear();
        self.last_seq_num = 0;
        self.last_rpt_seq = 0;
        self.initialised = false;
    }

    /// Drop all orders; sequencing state is kept.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.orders.clear();
    }

    /// Whether an entry tagged `(sn, rpt_seq)` is already reflected here.
    pub fn is_stale(&self, sn: SeqNum, rpt_seq: u32) -> bool {
        sn <= self.last_seq_num && rpt_seq <= self.last_rpt_seq
    }

    pub fn set_seq(&mut self, sn: SeqNum, rpt_seq: u32) {
        self.last_seq_num = sn;
        self.last_rpt_seq = rpt_seq;
    }

    pub fn new_order(&mut self, order_id: i64, side: Side, price: i64, quantity: i64) -> BookResult<()> {
        if self.orders.contains_key(&order_id) {
            return Err(BookError::DuplicateOrder {
                security_id: self.security_id,
                order_id,
            });
        }
        if quantity <= 0 {
            return Err(self.invalid_new(order_id, "non-positive quantity"));
        }
        if price == 0 {
            return Err(self.invalid_new(order_id, "no price"));
        }
        self.insert(Order {
            order_id,
            price,
            quantity,
            side,
        });
        Ok(())
    }

    /// Change an order's quantity and possibly its price. `price == None`
    /// keeps the old price. Unknown orders are ignored.
    pub fn change_order(
        &mut self,
        order_id: i64,
        side: Side,
        price: Option<i64>,
        quantity: i64,
    ) -> BookResult<()> {
        let order = match self.orders.get(&order_id) {
            Some(o) => *o,
            None => return Ok(()),
        };
        if order.side != side {
            return Err(BookError::SideFlip {
                security_id: self.security_id,
                order_id,
            });
        }

        let new_price = price.unwrap_or(order.price);
        if quantity <= 0 {
            self.delete_order(order_id);
            return Ok(());
        }
        if new_price == order.price {
            if quantity == order.quantity {
                return Ok(());
            }
            // Partial fill: stays in the queue
            let levels = self.levels_mut(side);
            if let Some(lq) = levels.get_mut(&order.price) {
                *lq += quantity - order.quantity;
            }
            if let Some(o) = self.orders.get_mut(&order_id) {
                o.quantity = quantity;
            }
            return Ok(());
        }

        self.delete_order(order_id);
        self.insert(Order {
            order_id,
            price: new_price,
            quantity,
            side,
        });
        Ok(())
    }

    /// Remove an order. Returns false if it was not in the book.
    pub fn delete_order(&mut self, order_id: i64) -> bool {
        match self.orders.remove(&order_id) {
            Some(order) => {
                self.remove_from_level(&order);
                true
            }
            None => false,
        }
    }

    /// Apply one incremental MDEntry. Validity and staleness are the
    /// caller's concern.
    pub fn apply_incr(&mut self, e: &IncrEntry) -> BookResult<()> {
        let entry_type = e.entry_type();
        if entry_type == Some(MDEntryType::EmptyBook) {
            self.clear();
            return Ok(());
        }
        let side = entry_type.and_then(Side::from_entry_type);

        match e.update_action() {
            Some(MDUpdateAction::New) => {
                let side = side.ok_or_else(|| self.invalid_new(e.md_entry_id, "not bid/offer"))?;
                let price = self.price(&e.md_entry_px)?;
                self.new_order(e.md_entry_id, side, price, e.md_entry_size)
            }
            Some(MDUpdateAction::Change) => match side {
                Some(side) => {
                    let price = if e.md_entry_px.is_zero() {
                        None
                    } else {
                        Some(self.price(&e.md_entry_px)?)
                    };
                    self.change_order(e.md_entry_id, side, price, e.md_entry_size)
                }
                None => Ok(()),
            },
            Some(MDUpdateAction::Delete) => {
                self.delete_order(e.md_entry_id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Install one resting order from a snapshot.
    pub fn apply_snap(&mut self, e: &SnapEntry) -> BookResult<()> {
        let side = e
            .entry_type()
            .and_then(Side::from_entry_type)
            .ok_or_else(|| self.invalid_new(e.md_entry_id, "not bid/offer"))?;
        let price = self.price(&e.md_entry_px)?;
        self.new_order(e.md_entry_id, side, price, e.md_entry_size)
    }

    /// An uncrossed book: best bid below best ask whenever both exist.
    pub fn is_consistent(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid < ask,
            _ => true,
        }
    }

    fn price(&self, px: &Decimal) -> BookResult<i64> {
        px.to_fixed(PRICE_EXPONENT).ok_or(BookError::BadPrice {
            security_id: self.security_id,
            price: *px,
        })
    }

    fn invalid_new(&self, order_id: i64, reason: &'static str) -> BookError {
        BookError::InvalidNew {
            security_id: self.security_id,
            order_id,
            reason,
        }
    }

    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<i64, i64> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn insert(&mut self, order: Order) {
        *self.levels_mut(order.side).entry(order.price).or_insert(0) += order.quantity;
        self.orders.insert(order.order_id, order);
    }

    fn remove_from_level(&mut self, order: &Order) {
        let levels = self.levels_mut(order.side);
        if let Some(qty) = levels.get_mut(&order.price) {
            *qty -= order.quantity;
            if *qty <= 0 {
                levels.remove(&order.price);
            }
        }
    }

    pub fn order(&self, order_id: i64) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Best bid price and quantity
    pub fn best_bid(&self) -> Option<(i64, i64)> {
        self.bids.iter().next_back().map(|(&p, &q)| (p, q))
    }

    /// Best ask price and quantity
    pub fn best_ask(&self) -> Option<(i64, i64)> {
        self.asks.iter().next().map(|(&p, &q)| (p, q))
    }

    /// Best ask minus best bid, in fixed-point units
    pub fn spread(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) if bid < ask => Some(ask - bid),
            _ => None,
        }
    }

    /// Top `n` levels on each side
    pub fn depth(&self, n: usize) -> BookDepth {
        BookDepth {
            bids: self.bids.iter().rev().take(n).map(|(&p, &q)| (p, q)).collect(),
            asks: self.asks.iter().take(n).map(|(&p, &q)| (p, q)).collect(),
        }
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDepth {
    pub bids: Vec<(i64, i64)>,
    pub asks: Vec<(i64, i64)>,
}

/// All books of a feed, keyed by SecurityID.
#[derive(Debug, Clone, Default)]
pub struct OrderBooks {
    books: HashMap<u64, OrderBook>,
}

impl OrderBooks {
    pub fn new(sec_ids: &[u64]) -> Self {
        OrderBooks {
            books: sec_ids.iter().map(|&id| (id, OrderBook::new(id))).collect(),
        }
    }

    pub fn get(&self, security_id: u64) -> Option<&OrderBook> {
        self.books.get(&security_id)
    }

    pub fn get_mut(&mut self, security_id: u64) -> Option<&mut OrderBook> {
        self.books.get_mut(&security_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderBook> {
        self.books.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OrderBook> {
        self.books.values_mut()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn reset_all(&mut self) {
        self.books.values_mut().for_each(OrderBook::reset);
    }

    pub fn all_initialised(&self) -> bool {
        self.books.values().all(OrderBook::is_initialised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PX: i64 = 100_000_000;

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new(1);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), None);
        assert!(book.is_consistent());
    }

    #[test]
    fn test_levels_aggregate() {
        let mut book = OrderBook::new(1);
        book.new_order(1, Side::Bid, 10 * PX, 5).unwrap();
        book.new_order(2, Side::Bid, 10 * PX, 7).unwrap();
        book.new_order(3, Side::Ask, 11 * PX, 1).unwrap();
        assert_eq!(book.best_bid(), Some((10 * PX, 12)));
        assert_eq!(book.spread(), Some(PX));
        assert_eq!(book.depth(5).asks, vec![(11 * PX, 1)]);
    }

    #[test]
    fn test_duplicate_new() {
        let mut book = OrderBook::new(1);
        book.new_order(1, Side::Bid, PX, 5).unwrap();
        assert_eq!(
            book.new_order(1, Side::Bid, PX, 5),
            Err(BookError::DuplicateOrder {
                security_id: 1,
                order_id: 1
            })
        );
    }

    #[test]
    fn test_partial_fill_keeps_price() {
        let mut book = OrderBook::new(1);
        book.new_order(1, Side::Ask, 2 * PX, 10).unwrap();
        book.change_order(1, Side::Ask, None, 4).unwrap();
        assert_eq!(book.best_ask(), Some((2 * PX, 4)));
        assert_eq!(book.order(1).map(|o| o.price), Some(2 * PX));
    }

    #[test]
    fn test_change_unknown_is_noop() {
        let mut book = OrderBook::new(1);
        book.change_order(9, Side::Bid, Some(PX), 3).unwrap();
        assert_eq!(book.order_count(), 0);
        assert!(!book.delete_order(9));
    }

    #[test]
    fn test_side_flip() {
        let mut book = OrderBook::new(1);
        book.new_order(1, Side::Bid, PX, 1).unwrap();
        assert!(matches!(
            book.change_order(1, Side::Ask, None, 2),
            Err(BookError::SideFlip { .. })
        ));
    }

    #[test]
    fn test_crossed_is_inconsistent() {
        let mut book = OrderBook::new(1);
        book.new_order(1, Side::Bid, 3 * PX, 1).unwrap();
        book.new_order(2, Side::Ask, 2 * PX, 1).unwrap();
        assert!(!book.is_consistent());
    }
}
