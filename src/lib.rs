/// FAST Feed Handler - FORTS/MICEX market data core
///
/// Decodes FAST-encoded exchange datagrams into typed messages, restores
/// sequence order across duplicated and lossy A/B multicast feeds, and
/// builds orders-log books from a snapshot bootstrap plus incrementals:
/// - Bit-level FAST decoders and a template field-operator framework
/// - FORTS and MICEX FX message decoders, and a FAST encoder
/// - Reorder buffer with bounded gap waiting and init mode
/// - Incremental, trades and snapshot channels, orders-log books
/// - Feed statistics, TOML configuration, tracing setup

pub mod protocol;
pub mod low_level;
pub mod field_counter;
pub mod forts;
pub mod micex;
pub mod decoder;
pub mod encoder;
pub mod seq_num_buffer;
pub mod book_builder;
pub mod incrs_channel;
pub mod snapshots_channel;
pub mod trades;
pub mod connector;
pub mod stats;
pub mod config;
pub mod logging;

pub use protocol::{Decimal, MessageType, SeqNum, TimeVal};
pub use low_level::{DecodeError, DecodeResult};
pub use decoder::{
    Decoder, FastMessage, FortsMessage, IncrementalMessage, MicexDecoder, MicexMessage, Packet,
};
pub use seq_num_buffer::{Processor, SeqNumBuffer, SeqNumError};
pub use book_builder::{BookDepth, BookError, Order, OrderBook, OrderBooks, Side};
pub use incrs_channel::{IncrOutcome, IncrementalChannel};
pub use snapshots_channel::{SnapshotChannel, SnapshotStatus};
pub use trades::{Instrument, Trade, TradeSource, TradesChannel, TradesProcessor};
pub use connector::{BookProcessor, FeedConnector};
pub use stats::{FeedStats, LatencyStats};
pub use config::{ConfigError, FeedConfig};
