/// Order book update latency benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fast_feed_handler::book_builder::{OrderBook, Side};
use fast_feed_handler::forts::{IncrEntry, END_OF_TRANSACTION};
use fast_feed_handler::protocol::{AsciiBuf, Decimal};

const PX: i64 = 100_000_000;

fn populated(levels: i64) -> OrderBook {
    let mut book = OrderBook::new(1);
    for i in 0..levels {
        let _ = book.new_order(2 * i, Side::Bid, (1000 - i) * PX, 100 + i);
        let _ = book.new_order(2 * i + 1, Side::Ask, (1001 + i) * PX, 100 + i);
    }
    book
}

fn bench_new_delete(c: &mut Criterion) {
    c.bench_function("book_new_delete", |b| {
        let mut book = populated(100);
        let mut order_id = 1_000_000i64;
        b.iter(|| {
            let _ = book.new_order(order_id, Side::Bid, (990 + order_id % 10) * PX, 5);
            book.delete_order(order_id);
            order_id += 1;
        });
    });
}

fn bench_change(c: &mut Criterion) {
    c.bench_function("book_change_qty", |b| {
        let mut book = populated(100);
        let mut qty = 1;
        b.iter(|| {
            let _ = book.change_order(10, Side::Bid, None, qty);
            qty = qty % 50 + 1;
        });
    });

    c.bench_function("book_change_price", |b| {
        let mut book = populated(100);
        let mut tick = 0;
        b.iter(|| {
            let _ = book.change_order(10, Side::Bid, Some((900 + tick) * PX), 7);
            tick = (tick + 1) % 20;
        });
    });
}

fn bench_apply_incr(c: &mut Criterion) {
    let mut md_entry_type = AsciiBuf::new();
    md_entry_type.set("1");
    let mut entry = IncrEntry {
        md_update_action: 0,
        md_entry_type,
        security_id: 1,
        md_entry_px: Decimal::new(-2, 105_050),
        md_entry_size: 3,
        md_flags: END_OF_TRANSACTION | 0x1,
        ..Default::default()
    };

    c.bench_function("book_apply_new_then_delete", |b| {
        let mut book = populated(100);
        let mut order_id = 5_000_000i64;
        b.iter(|| {
            entry.md_entry_id = order_id;
            entry.md_update_action = 0;
            let _ = book.apply_incr(black_box(&entry));
            entry.md_update_action = 2;
            let _ = book.apply_incr(black_box(&entry));
            order_id += 1;
        });
    });
}

fn bench_queries(c: &mut Criterion) {
    let book = populated(100);

    c.bench_function("book_best_bid", |b| b.iter(|| black_box(book.best_bid())));
    c.bench_function("book_spread", |b| b.iter(|| black_box(book.spread())));
    c.bench_function("book_depth_10", |b| b.iter(|| black_box(book.depth(10))));
    c.bench_function("book_is_consistent", |b| {
        b.iter(|| black_box(book.is_consistent()))
    });
}

criterion_group!(
    benches,
    bench_new_delete,
    bench_change,
    bench_apply_incr,
    bench_queries
);
criterion_main!(benches);
