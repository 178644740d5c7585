//! FORTS orders-log feed connector
//!
//! Wires the incremental and snapshot channels to one set of order books.
//! The connector starts inactive, with incrementals held back in the
//! reorder buffer, and turns active once the snapshot bootstrap hands over.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::book_builder::{BookError, OrderBooks};
use crate::config::FeedConfig;
use crate::forts::OrdersLogIncrRefresh;
use crate::incrs_channel::{IncrOutcome, IncrementalChannel};
use crate::protocol::{SeqNum, TimeVal};
use crate::seq_num_buffer::{Processor, SeqNumResult};
use crate::snapshots_channel::{SnapshotChannel, SnapshotStatus};
use crate::stats::FeedStats;

/// Applies in-order incrementals to the books.
#[derive(Debug)]
pub struct BookProcessor {
    pub books: OrderBooks,
    pub stats: FeedStats,
    debug_level: u8,
}

impl BookProcessor {
    pub fn new(books: OrderBooks, debug_level: u8) -> Self {
        BookProcessor {
            books,
            stats: FeedStats::new(),
            debug_level,
        }
    }
}

impl Processor<OrdersLogIncrRefresh> for BookProcessor {
    type Error = BookError;

    fn process(
        &mut self,
        sn: SeqNum,
        msg: &OrdersLogIncrRefresh,
        init_mode: bool,
        recv_ts: TimeVal,
        _handl_ts: TimeVal,
    ) -> Result<(), BookError> {
        if msg.entries.is_empty() {
            return Ok(());
        }

        let mut first_err = None;
        for e in &msg.entries {
            let book = match self.books.get_mut(e.security_id) {
                Some(book) => book,
                None => continue,
            };
            if !e.is_valid_update() {
                continue;
            }
            if init_mode && !book.is_initialised() {
                book.note_init_update(sn);
                // only a snapshot installed in the current round can take it
                if book.last_seq_num() == 0 {
                    if self.debug_level >= 2 {
                        debug!(sn, security_id = e.security_id, "update before snapshot, held back");
                    }
                    continue;
                }
            }
            if book.is_stale(sn, e.rpt_seq) {
                continue;
            }
            if let Err(err) = book.apply_incr(e) {
                if self.debug_level >= 1 {
                    warn!(sn, rpt_seq = e.rpt_seq, "{}", err);
                }
                first_err.get_or_insert(err);
            }
            book.set_seq(sn, e.rpt_seq);
        }

        let latency = if recv_ts.is_empty() {
            0
        } else {
            TimeVal::now().micros_since(recv_ts)
        };
        self.stats.record_processed(latency);
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn on_lost(&mut self, first: SeqNum, last: SeqNum) {
        self.stats.record_lost(first, last);
    }
}

pub struct FeedConnector {
    incrs: IncrementalChannel<OrdersLogIncrRefresh, BookProcessor>,
    snaps: SnapshotChannel,
    active: bool,
    stopped: bool,
}

impl FeedConnector {
    pub fn new(config: &FeedConfig) -> SeqNumResult<Self> {
        let books = OrderBooks::new(&config.books.sec_ids);
        let debug_level = config.buffer.debug_level;
        Ok(FeedConnector {
            incrs: IncrementalChannel::new(
                "incrs",
                &config.buffer,
                true,
                BookProcessor::new(books, debug_level),
            )?,
            snaps: SnapshotChannel::new(&config.snapshots, debug_level),
            active: false,
            stopped: false,
        })
    }

    /// Handle one incremental datagram. False once the connector stopped.
    pub fn on_incremental(&mut self, bytes: &[u8], recv_ts: TimeVal) -> bool {
        if self.stopped {
            return false;
        }
        let started = Instant::now();
        let outcome = self.incrs.on_datagram(bytes, recv_ts);

        let stats = &mut self.incrs.processor_mut().stats;
        if outcome != IncrOutcome::EndOfChunk {
            stats.record_incr_datagram(bytes.len());
            stats.record_decode_latency(started.elapsed().as_micros() as u64);
        }
        if let IncrOutcome::DecodeFailed(_) = outcome {
            stats.record_decode_error();
        }
        true
    }

    /// Handle one snapshot datagram. False once the snapshot channel has no
    /// further use for data.
    pub fn on_snapshot(&mut self, bytes: &[u8], recv_ts: TimeVal) -> bool {
        if self.stopped {
            return false;
        }
        let proc = self.incrs.processor_mut();
        let status = self.snaps.on_datagram(bytes, recv_ts, &mut proc.books);
        if !bytes.is_empty() && status != SnapshotStatus::Stopped {
            proc.stats.record_snap_datagram(bytes.len());
        }

        match status {
            SnapshotStatus::Running | SnapshotStatus::Ignored => true,
            SnapshotStatus::DecodeFailed(_) => {
                proc.stats.record_decode_error();
                true
            }
            SnapshotStatus::Completed { cut_over } => {
                match self.incrs.close_init_mode(cut_over) {
                    Ok(()) => {
                        self.active = true;
                        info!(
                            cut_over,
                            xsn = self.incrs.expected_seq_num(),
                            "connector active"
                        );
                    }
                    Err(e) => {
                        error!(cut_over, "cannot leave init mode: {}", e);
                        self.stop();
                    }
                }
                false
            }
            SnapshotStatus::Failed => {
                self.stop();
                false
            }
            SnapshotStatus::Stopped => false,
        }
    }

    /// Stop both channels. Later datagrams are ignored.
    pub fn stop(&mut self) {
        if !self.stopped {
            warn!(active = self.active, "connector stopped");
        }
        self.snaps.stop();
        self.stopped = true;
        self.active = false;
    }

    /// Books are initialised and incrementals flow into them.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn books(&self) -> &OrderBooks {
        &self.incrs.processor().books
    }

    pub fn stats(&self) -> &FeedStats {
        &self.incrs.processor().stats
    }

    pub fn incrs(&self) -> &IncrementalChannel<OrdersLogIncrRefresh, BookProcessor> {
        &self.incrs
    }

    pub fn snapshot_round(&self) -> u32 {
        self.snaps.round()
    }
}
