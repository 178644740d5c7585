/// FAST decoder conformance tests

use fast_feed_handler::decoder::{Decoder, FortsMessage, MicexDecoder, MicexMessage};
use fast_feed_handler::encoder::{self, Encoder};
use fast_feed_handler::forts::{
    IncrEntry, OrdersLogIncrRefresh, OrdersLogSnapShot, SnapEntry, TradingSessionStatus,
};
use fast_feed_handler::low_level::{get_ascii, get_integer, get_old_decimal, get_pmap, Cursor};
use fast_feed_handler::micex;
use fast_feed_handler::protocol::{AsciiBuf, Decimal, MessageType};
use fast_feed_handler::DecodeError;

fn ascii<const N: usize>(s: &str) -> AsciiBuf<N> {
    let mut b = AsciiBuf::new();
    b.set(s);
    b
}

fn incr_entry(action: u32, side: &str, id: i64, px: i64, qty: i64) -> IncrEntry {
    IncrEntry {
        md_update_action: action,
        md_entry_type: ascii(side),
        md_entry_id: id,
        security_id: 42,
        rpt_seq: 7,
        md_entry_time: 120_000_000,
        md_entry_px: Decimal::new(-2, px),
        md_entry_size: qty,
        md_flags: 0x1000 | 0x1,
        ..Default::default()
    }
}

#[test]
fn test_integer_stop_bit() {
    let bytes = [0x39, 0x45, 0xa3];
    let mut cur = Cursor::new(&bytes);
    let v = get_integer::<false, u32>(false, &mut cur, "f").unwrap();
    assert_eq!(v.value, 942_755);
    assert!(cur.is_empty());

    let bytes = [0x46, 0x3a, 0xdd];
    let mut cur = Cursor::new(&bytes);
    let v = get_integer::<false, i32>(false, &mut cur, "f").unwrap();
    assert_eq!(v.value, -942_755);
}

#[test]
fn test_nullable_integer() {
    // 0x80 is NULL, 0x81 is 0, 0x82 is 1
    let bytes = [0x80, 0x81, 0x82];
    let mut cur = Cursor::new(&bytes);
    assert!(get_integer::<false, u64>(true, &mut cur, "f").unwrap().is_null);
    assert_eq!(get_integer::<false, u64>(true, &mut cur, "f").unwrap().value, 0);
    assert_eq!(get_integer::<false, u64>(true, &mut cur, "f").unwrap().value, 1);
}

#[test]
fn test_unterminated_integer() {
    let bytes = [0x01, 0x02];
    let mut cur = Cursor::new(&bytes);
    assert_eq!(
        get_integer::<false, u32>(false, &mut cur, "f").unwrap_err(),
        DecodeError::Unterminated { field: "f" }
    );
}

#[test]
fn test_ascii_null_and_empty() {
    let mut out = [0u8; 8];

    let mut cur = Cursor::new(&[0x80]);
    assert!(get_ascii::<false>(true, &mut cur, &mut out, "s").unwrap().is_null);

    let mut cur = Cursor::new(&[0x80]);
    let f = get_ascii::<false>(false, &mut cur, &mut out, "s").unwrap();
    assert!(!f.is_null);
    assert_eq!(f.len, 0);

    let mut cur = Cursor::new(&[0x00, 0x80]);
    let f = get_ascii::<false>(true, &mut cur, &mut out, "s").unwrap();
    assert!(!f.is_null);
    assert_eq!(f.len, 0);

    let mut cur = Cursor::new(b"AB\xc3");
    let f = get_ascii::<false>(false, &mut cur, &mut out, "s").unwrap();
    assert_eq!(&out[..f.len], b"ABC");
}

#[test]
fn test_ascii_too_long() {
    let mut out = [0u8; 3];
    let mut cur = Cursor::new(b"ABC\xc4");
    assert!(matches!(
        get_ascii::<false>(false, &mut cur, &mut out, "s"),
        Err(DecodeError::StringTooLong { .. })
    ));
}

#[test]
fn test_old_decimal() {
    // exponent -2, mantissa 12345
    let mut enc = Encoder::new();
    enc.old_decimal(Decimal::new(-2, 12345));
    let bytes = enc.finish();
    assert_eq!(bytes[0], 0xfe);

    let mut cur = Cursor::new(&bytes);
    let d = get_old_decimal::<false>(false, &mut cur, "px").unwrap().unwrap();
    assert_eq!((d.exponent, d.mantissa), (-2, 12345));
}

#[test]
fn test_pmap_bits() {
    let mut cur = Cursor::new(&[0x40, 0x81]);
    let pmap = get_pmap(&mut cur, "g").unwrap();
    assert_eq!(pmap, (1u64 << 63) | (1u64 << 50));
}

#[test]
fn test_decode_orders_log_incremental() {
    let msg = OrdersLogIncrRefresh {
        msg_seq_num: 501,
        last_fragment: 1,
        entries: vec![
            incr_entry(0, "0", 1001, 12345, 10),
            incr_entry(2, "1", 1002, 12350, 3),
        ],
    };
    let bytes = encoder::orders_log_incr_refresh(501, &msg);

    let mut dec = Decoder::new();
    let d = dec.decode(&bytes).unwrap();
    assert_eq!(d.seq_num, 501);
    assert_eq!(d.trailing, 0);
    match d.message {
        FortsMessage::OrdersLogIncrRefresh(m) => assert_eq!(m, &msg),
        other => panic!("unexpected {:?}", other.message_type()),
    }
}

#[test]
fn test_decode_orders_log_snapshot() {
    let msg = OrdersLogSnapShot {
        msg_seq_num: 3,
        last_msg_seq_num_processed: 900,
        rpt_seq: 55,
        last_fragment: 1,
        route_first: 1,
        exchange_trading_session_id: 4242,
        security_id: 42,
        entries: vec![SnapEntry {
            md_entry_type: ascii("1"),
            md_entry_id: 77,
            md_entry_time: 1,
            md_entry_px: Decimal::new(0, 101),
            md_entry_size: 5,
            md_flags: 0x1,
            ..Default::default()
        }],
    };
    let bytes = encoder::orders_log_snapshot(3, &msg);

    let mut dec = Decoder::new();
    let d = dec.decode(&bytes).unwrap();
    assert_eq!(d.message.message_type(), MessageType::OrdersLogSnapShot);
    match d.message {
        FortsMessage::OrdersLogSnapShot(m) => assert_eq!(m, &msg),
        other => panic!("unexpected {:?}", other.message_type()),
    }
}

#[test]
fn test_decode_session_status() {
    let msg = TradingSessionStatus {
        msg_seq_num: 9,
        trad_ses_open_time: 1_700_000_000,
        trading_session_id: 3,
        trad_ses_status: 2,
        market_segment_id: ascii("F"),
        trad_ses_event: 101,
        ..Default::default()
    };
    let bytes = encoder::trading_session_status(9, &msg);
    let mut dec = Decoder::new();
    match dec.decode(&bytes).unwrap().message {
        FortsMessage::TradingSessionStatus(m) => assert_eq!(m, &msg),
        other => panic!("unexpected {:?}", other.message_type()),
    }
}

#[test]
fn test_decode_sequence_reset() {
    let bytes = encoder::sequence_reset(12, 1000);
    let mut dec = Decoder::new();
    match dec.decode(&bytes).unwrap().message {
        FortsMessage::SequenceReset(m) => {
            assert_eq!(m.msg_seq_num, 12);
            assert_eq!(m.new_seq_no, 1000);
        }
        other => panic!("unexpected {:?}", other.message_type()),
    }
}

#[test]
fn test_too_many_entries() {
    let mut enc = Encoder::with_seq_num(1);
    enc.header(&[], MessageType::OrdersLogIncrRefresh.tid())
        .uint(1)
        .uint(0)
        .uint(0)
        .uint(129);
    let mut dec = Decoder::new();
    assert!(matches!(
        dec.decode(&enc.finish()),
        Err(DecodeError::TooManyEntries { count: 129, .. })
    ));
}

#[test]
fn test_truncated_message() {
    let msg = OrdersLogIncrRefresh {
        msg_seq_num: 1,
        last_fragment: 1,
        entries: vec![incr_entry(0, "0", 1, 100, 1)],
    };
    let mut bytes = encoder::orders_log_incr_refresh(1, &msg);
    bytes.truncate(bytes.len() - 2);
    let mut dec = Decoder::new();
    assert!(dec.decode(&bytes).is_err());
}

#[test]
fn test_decoder_reuses_scratch() {
    let mut dec = Decoder::new();
    let big = OrdersLogIncrRefresh {
        msg_seq_num: 1,
        last_fragment: 1,
        entries: vec![incr_entry(0, "0", 1, 100, 1); 5],
    };
    dec.decode(&encoder::orders_log_incr_refresh(1, &big)).unwrap();

    let small = OrdersLogIncrRefresh {
        msg_seq_num: 2,
        last_fragment: 1,
        entries: vec![incr_entry(1, "1", 2, 200, 2)],
    };
    match dec.decode(&encoder::orders_log_incr_refresh(2, &small)).unwrap().message {
        FortsMessage::OrdersLogIncrRefresh(m) => assert_eq!(m.entries.len(), 1),
        other => panic!("unexpected {:?}", other.message_type()),
    }
}

fn micex_entry(id: &str, symbol: &str, px: i64, size: i64) -> micex::IncrEntry {
    micex::IncrEntry {
        md_update_action: 0,
        md_entry_type: ascii("0"),
        md_entry_id: ascii(id),
        symbol: ascii(symbol),
        rpt_seq: 11,
        md_entry_date: 20240105,
        md_entry_time: 101500,
        md_entry_px: Decimal::new(-4, px),
        md_entry_size: Decimal::new(0, size),
        trading_session_id: ascii("CETS"),
        ..Default::default()
    }
}

#[test]
fn test_micex_copy_fields() {
    let msg = micex::IncrementalRefresh {
        msg_seq_num: 77,
        entries: vec![
            micex_entry("A1", "USD000UTSTOM", 735_000, 10),
            // same symbol and size: copied from the entry before
            micex_entry("A2", "USD000UTSTOM", 735_100, 10),
            micex_entry("A3", "EUR_RUB__TOM", 801_000, 5),
        ],
    };
    let bytes = encoder::micex_incremental_refresh(77, &msg);

    let mut dec = MicexDecoder::new();
    let d = dec.decode(&bytes).unwrap();
    assert_eq!(d.seq_num, 77);
    match d.message {
        MicexMessage::IncrementalRefresh(m) => {
            assert_eq!(m.msg_seq_num, 77);
            assert_eq!(m.entries.len(), 3);
            assert_eq!(m.entries[1].symbol.as_str(), "USD000UTSTOM");
            assert_eq!(m.entries[1].md_entry_size, Decimal::new(0, 10));
            assert_eq!(m.entries[2].symbol.as_str(), "EUR_RUB__TOM");
            assert_eq!(m.entries, msg.entries);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_micex_unknown_template() {
    let mut enc = Encoder::with_seq_num(1);
    enc.header(&[], 3611);
    let mut dec = MicexDecoder::new();
    assert_eq!(
        dec.decode(&enc.finish()).unwrap_err(),
        DecodeError::UnexpectedTemplate(3611)
    );
}
