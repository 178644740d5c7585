/// Synthetic FORTS orders-log feed generator
///
/// Generates an orders-log session, writes the incremental and snapshot
/// datagrams as they would arrive from A/B multicast feeds (reordered,
/// duplicated, optionally lossy) to a file, then replays the file through
/// the feed connector and prints the resulting books and statistics.
///
/// Usage: feed_generator [path] [messages] [drop_pct] [seed]

use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fast_feed_handler::config::FeedConfig;
use fast_feed_handler::encoder;
use fast_feed_handler::forts::{
    IncrEntry, OrdersLogIncrRefresh, OrdersLogSnapShot, SnapEntry, END_OF_TRANSACTION,
};
use fast_feed_handler::protocol::{AsciiBuf, Decimal, TimeVal};
use fast_feed_handler::{logging, FeedConnector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const SEC_IDS: [u64; 3] = [400_001, 400_002, 400_003];
const CHANNEL_INCR: u8 = 0;
const CHANNEL_SNAP: u8 = 1;
/// Incrementals the connector sees before the snapshot state.
const JOIN_LAG: u32 = 20;

#[derive(Debug, Clone, Copy)]
struct ModelOrder {
    bid: bool,
    px: i64,
    qty: i64,
}

#[derive(Debug, Default)]
struct ModelBook {
    orders: BTreeMap<i64, ModelOrder>,
    rpt_seq: u32,
}

impl ModelBook {
    fn best(&self, bid: bool) -> Option<i64> {
        let prices = self.orders.values().filter(|o| o.bid == bid).map(|o| o.px);
        if bid {
            prices.max()
        } else {
            prices.min()
        }
    }
}

fn entry_type<const N: usize>(s: &str) -> AsciiBuf<N> {
    let mut b = AsciiBuf::new();
    b.set(s);
    b
}

fn side(bid: bool) -> &'static str {
    if bid {
        "0"
    } else {
        "1"
    }
}

/// One incremental with 1..=3 entries against a random book.
fn next_incremental(
    rng: &mut StdRng,
    sn: u32,
    books: &mut BTreeMap<u64, ModelBook>,
    next_id: &mut i64,
) -> Vec<u8> {
    let mut entries = Vec::new();
    for _ in 0..rng.gen_range(1..=3) {
        let sec = SEC_IDS[rng.gen_range(0..SEC_IDS.len())];
        let book = books.entry(sec).or_default();
        book.rpt_seq += 1;

        let existing = if book.orders.is_empty() {
            None
        } else {
            let idx = rng.gen_range(0..book.orders.len());
            book.orders.keys().nth(idx).copied()
        };
        let mut e = IncrEntry {
            security_id: sec,
            rpt_seq: book.rpt_seq,
            md_entry_time: u64::from(sn) * 1_000,
            md_flags: END_OF_TRANSACTION | 0x1,
            ..Default::default()
        };

        match (existing, rng.gen_range(0..10)) {
            (Some(id), 0..=2) => {
                // delete
                if let Some(o) = book.orders.remove(&id) {
                    e.md_update_action = 2;
                    e.md_entry_id = id;
                    e.md_entry_type = entry_type(side(o.bid));
                }
            }
            (Some(id), 3..=4) => {
                // partial fill
                if let Some(o) = book.orders.get_mut(&id) {
                    o.qty = (o.qty - rng.gen_range(1..=o.qty)).max(1);
                    e.md_update_action = 1;
                    e.md_entry_id = id;
                    e.md_entry_type = entry_type(side(o.bid));
                    e.md_entry_px = Decimal::new(0, o.px);
                    e.md_entry_size = o.qty;
                }
            }
            _ => {
                let bid = rng.gen_bool(0.5);
                let px = if bid {
                    rng.gen_range(900..1000)
                } else {
                    rng.gen_range(1001..1100)
                };
                let qty = rng.gen_range(1..100);
                let id = *next_id;
                *next_id += 1;
                book.orders.insert(id, ModelOrder { bid, px, qty });
                e.md_update_action = 0;
                e.md_entry_id = id;
                e.md_entry_type = entry_type(side(bid));
                e.md_entry_px = Decimal::new(0, px);
                e.md_entry_size = qty;
            }
        }
        entries.push(e);
    }

    encoder::orders_log_incr_refresh(
        sn,
        &OrdersLogIncrRefresh {
            msg_seq_num: sn,
            last_fragment: 1,
            entries,
        },
    )
}

/// One full snapshot round, one message per book.
fn snapshot_round(books: &BTreeMap<u64, ModelBook>, isn: u32) -> Vec<Vec<u8>> {
    books
        .iter()
        .enumerate()
        .map(|(i, (&sec, book))| {
            let msg_sn = i as u32 + 1;
            let entries = book
                .orders
                .iter()
                .map(|(&id, o)| SnapEntry {
                    md_entry_type: entry_type(side(o.bid)),
                    md_entry_id: id,
                    md_entry_px: Decimal::new(0, o.px),
                    md_entry_size: o.qty,
                    md_flags: 0x1,
                    ..Default::default()
                })
                .collect();
            encoder::orders_log_snapshot(
                msg_sn,
                &OrdersLogSnapShot {
                    msg_seq_num: msg_sn,
                    last_msg_seq_num_processed: isn,
                    rpt_seq: book.rpt_seq,
                    last_fragment: 1,
                    route_first: 1,
                    security_id: sec,
                    entries,
                    ..Default::default()
                },
            )
        })
        .collect()
}

fn write_record(out: &mut impl Write, channel: u8, bytes: &[u8]) -> std::io::Result<()> {
    out.write_u8(channel)?;
    out.write_u16::<LittleEndian>(bytes.len() as u16)?;
    out.write_all(bytes)
}

fn read_record(input: &mut impl Read) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    let channel = match input.read_u8() {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let len = input.read_u16::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    input.read_exact(&mut bytes)?;
    Ok(Some((channel, bytes)))
}

fn main() -> Result<(), Box<dyn Error>> {
    logging::init("info");

    let args: Vec<String> = env::args().collect();
    let output_path = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "/tmp/fast_feed.bin".to_string());
    let message_count: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let drop_pct: u32 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0);
    let seed: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(7);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut books: BTreeMap<u64, ModelBook> = BTreeMap::new();
    let mut next_id = 1_000i64;

    let cut_over = (message_count / 2).max(JOIN_LAG + 1);
    let message_count = message_count.max(cut_over + 1);
    let incrementals: Vec<Vec<u8>> = (1..=message_count)
        .map(|sn| next_incremental(&mut rng, sn, &mut books, &mut next_id))
        .collect();

    // replaying is cheaper than snapshotting the model at the cut-over
    let mut at_cut_over = BTreeMap::new();
    {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut id = 1_000i64;
        for sn in 1..=cut_over {
            next_incremental(&mut rng, sn, &mut at_cut_over, &mut id);
        }
    }
    let round = snapshot_round(&at_cut_over, cut_over);

    println!(
        "Generating {} incrementals, snapshot at {}, to {}",
        message_count, cut_over, output_path
    );

    let mut out = BufWriter::new(File::create(&output_path)?);
    let mut arrivals: Vec<u32> = Vec::new();
    for sn in (cut_over - JOIN_LAG)..=message_count {
        if rng.gen_range(0..100) < drop_pct {
            continue;
        }
        arrivals.push(sn);
        // B feed
        if rng.gen_bool(0.5) {
            arrivals.push(sn);
        }
    }
    for chunk in arrivals.chunks_mut(4) {
        chunk.shuffle(&mut rng);
    }

    let mut written = 0usize;
    for (i, &sn) in arrivals.iter().enumerate() {
        let bytes = &incrementals[(sn - 1) as usize];
        write_record(&mut out, CHANNEL_INCR, bytes)?;
        written += bytes.len();

        if i == 2 * JOIN_LAG as usize {
            // tail of a round already in progress, two full rounds, then
            // the start of the next one
            for bytes in round.iter().skip(1) {
                write_record(&mut out, CHANNEL_SNAP, bytes)?;
            }
            for _ in 0..2 {
                for bytes in &round {
                    write_record(&mut out, CHANNEL_SNAP, bytes)?;
                }
            }
            if let Some(first) = round.first() {
                write_record(&mut out, CHANNEL_SNAP, first)?;
            }
        }
        if i > 0 && i % 1000 == 0 {
            // end of a receive chunk
            write_record(&mut out, CHANNEL_INCR, &[])?;
        }
    }
    out.flush()?;
    println!("Wrote {} datagrams, {} bytes", arrivals.len(), written);

    let mut config = FeedConfig::load()?;
    if config.books.sec_ids.is_empty() {
        config.books.sec_ids = SEC_IDS.to_vec();
    }
    let mut conn = FeedConnector::new(&config)?;

    let mut input = BufReader::new(File::open(&output_path)?);
    while let Some((channel, bytes)) = read_record(&mut input)? {
        let recv_ts = TimeVal::now();
        match channel {
            CHANNEL_INCR => {
                conn.on_incremental(&bytes, recv_ts);
            }
            CHANNEL_SNAP => {
                conn.on_snapshot(&bytes, recv_ts);
            }
            other => return Err(format!("bad channel {} in {}", other, output_path).into()),
        }
    }

    println!(
        "Connector active: {}, snapshot rounds: {}",
        conn.is_active(),
        conn.snapshot_round()
    );
    for (sec, model) in &books {
        if let Some(book) = conn.books().get(*sec) {
            let px = |p: Option<(i64, i64)>| p.map(|(px, _)| px / 100_000_000);
            let bid = px(book.best_bid());
            let ask = px(book.best_ask());
            let matches = bid == model.best(true) && ask == model.best(false);
            println!(
                "  {}: {} orders, bid {:?} ask {:?}, model {}",
                sec,
                book.order_count(),
                bid,
                ask,
                if matches { "matches" } else { "differs" }
            );
        }
    }
    println!("{}", conn.stats().summary());

    Ok(())
}
