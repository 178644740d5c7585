/// Orders-log book tests

use fast_feed_handler::book_builder::{BookError, OrderBook, OrderBooks, Side};
use fast_feed_handler::forts::{IncrEntry, SnapEntry, END_OF_TRANSACTION};
use fast_feed_handler::protocol::{AsciiBuf, Decimal};

const PX: i64 = 100_000_000; // 1.0 in fixed point

fn entry(action: u32, side: &str, id: i64, px: i64, qty: i64) -> IncrEntry {
    let mut md_entry_type = AsciiBuf::new();
    md_entry_type.set(side);
    IncrEntry {
        md_update_action: action,
        md_entry_type,
        md_entry_id: id,
        security_id: 1,
        md_entry_px: Decimal::new(0, px),
        md_entry_size: qty,
        md_flags: END_OF_TRANSACTION | 0x1,
        ..Default::default()
    }
}

fn snap(side: &str, id: i64, px: i64, qty: i64) -> SnapEntry {
    let mut md_entry_type = AsciiBuf::new();
    md_entry_type.set(side);
    SnapEntry {
        md_entry_type,
        md_entry_id: id,
        md_entry_px: Decimal::new(0, px),
        md_entry_size: qty,
        ..Default::default()
    }
}

#[test]
fn test_empty_book() {
    let book = OrderBook::new(1);
    assert_eq!(book.best_bid(), None);
    assert_eq!(book.best_ask(), None);
    assert_eq!(book.spread(), None);
    assert_eq!(book.order_count(), 0);
    assert!(!book.is_initialised());
}

#[test]
fn test_new_orders_build_levels() {
    let mut book = OrderBook::new(1);
    book.apply_incr(&entry(0, "0", 1, 100, 10)).unwrap();
    book.apply_incr(&entry(0, "0", 2, 99, 5)).unwrap();
    book.apply_incr(&entry(0, "0", 3, 100, 1)).unwrap();
    book.apply_incr(&entry(0, "1", 4, 101, 7)).unwrap();

    assert_eq!(book.best_bid(), Some((100 * PX, 11)));
    assert_eq!(book.best_ask(), Some((101 * PX, 7)));
    assert_eq!(book.spread(), Some(PX));
    assert_eq!(book.bid_levels(), 2);
    assert_eq!(book.order_count(), 4);

    let depth = book.depth(1);
    assert_eq!(depth.bids, vec![(100 * PX, 11)]);
    assert_eq!(depth.asks, vec![(101 * PX, 7)]);
}

#[test]
fn test_change_price_requeues() {
    let mut book = OrderBook::new(1);
    book.apply_incr(&entry(0, "1", 1, 105, 10)).unwrap();
    book.apply_incr(&entry(1, "1", 1, 104, 10)).unwrap();
    assert_eq!(book.best_ask(), Some((104 * PX, 10)));
    assert_eq!(book.ask_levels(), 1);
}

#[test]
fn test_change_without_price_is_partial_fill() {
    let mut book = OrderBook::new(1);
    book.apply_incr(&entry(0, "0", 1, 50, 10)).unwrap();
    book.apply_incr(&entry(1, "0", 1, 0, 6)).unwrap();
    assert_eq!(book.best_bid(), Some((50 * PX, 6)));
    // same quantity again: nothing to do
    book.apply_incr(&entry(1, "0", 1, 0, 6)).unwrap();
    assert_eq!(book.best_bid(), Some((50 * PX, 6)));
}

#[test]
fn test_delete() {
    let mut book = OrderBook::new(1);
    book.apply_incr(&entry(0, "0", 1, 50, 10)).unwrap();
    book.apply_incr(&entry(2, "0", 1, 0, 0)).unwrap();
    assert_eq!(book.order_count(), 0);
    assert_eq!(book.bid_levels(), 0);
    // unknown order
    book.apply_incr(&entry(2, "0", 99, 0, 0)).unwrap();
}

#[test]
fn test_empty_book_entry_clears() {
    let mut book = OrderBook::new(1);
    book.apply_incr(&entry(0, "0", 1, 50, 10)).unwrap();
    book.apply_incr(&entry(0, "1", 2, 51, 10)).unwrap();
    book.set_seq(10, 4);
    book.apply_incr(&entry(0, "J", 0, 0, 0)).unwrap();
    assert_eq!(book.order_count(), 0);
    assert_eq!(book.last_seq_num(), 10);
}

#[test]
fn test_invalid_new() {
    let mut book = OrderBook::new(1);
    assert!(matches!(
        book.apply_incr(&entry(0, "0", 1, 50, 0)),
        Err(BookError::InvalidNew { .. })
    ));
    assert!(matches!(
        book.apply_incr(&entry(0, "2", 1, 50, 1)),
        Err(BookError::InvalidNew { .. })
    ));
    assert!(matches!(
        book.apply_incr(&entry(0, "0", 1, 0, 1)),
        Err(BookError::InvalidNew { .. })
    ));
}

#[test]
fn test_fractional_price() {
    let mut book = OrderBook::new(1);
    let mut e = entry(0, "0", 1, 0, 3);
    e.md_entry_px = Decimal::new(-3, 12_345);
    book.apply_incr(&e).unwrap();
    assert_eq!(book.best_bid(), Some((1_234_500_000, 3)));
}

#[test]
fn test_stale_check() {
    let mut book = OrderBook::new(1);
    book.set_seq(100, 20);
    assert!(book.is_stale(100, 20));
    assert!(book.is_stale(90, 5));
    assert!(!book.is_stale(101, 20));
    assert!(!book.is_stale(90, 21));
}

#[test]
fn test_init_updates_survive_reset() {
    let mut book = OrderBook::new(1);
    assert!(book.covers_init_updates());
    book.note_init_update(120);
    book.note_init_update(110);
    assert_eq!(book.init_sn(), 120);

    book.set_seq(115, 3);
    assert!(!book.covers_init_updates());
    book.reset();
    assert_eq!(book.init_sn(), 120);
    book.set_seq(120, 4);
    assert!(book.covers_init_updates());
}

#[test]
fn test_snapshot_install() {
    let mut book = OrderBook::new(1);
    book.apply_snap(&snap("0", 1, 10, 1)).unwrap();
    book.apply_snap(&snap("1", 2, 11, 2)).unwrap();
    assert!(book.is_consistent());
    assert_eq!(book.order(2).map(|o| o.side), Some(Side::Ask));

    book.apply_snap(&snap("0", 3, 12, 1)).unwrap();
    assert!(!book.is_consistent());

    book.reset();
    assert_eq!(book.order_count(), 0);
    assert_eq!(book.last_rpt_seq(), 0);
}

#[test]
fn test_books_collection() {
    let mut books = OrderBooks::new(&[1, 2, 3]);
    assert_eq!(books.len(), 3);
    assert!(books.get(4).is_none());

    books.get_mut(2).unwrap().new_order(1, Side::Bid, PX, 1).unwrap();
    books.iter_mut().for_each(|b| b.set_initialised());
    assert!(books.all_initialised());

    books.reset_all();
    assert!(!books.all_initialised());
    assert_eq!(books.get(2).unwrap().order_count(), 0);
}
