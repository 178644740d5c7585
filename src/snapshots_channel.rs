/// Snapshot bootstrap channel
///
/// The snapshot feed loops over all instruments, numbering its messages from
/// 1 in every round. Books are built from one complete, gap-free round; the
/// lowest LastMsgSeqNumProcessed over all books then tells the incremental
/// channel where to pick up.
///
/// Joining mid-round, the rest of that round is skipped. A seqnum mismatch
/// inside a round also skips the rest of it. Every round starts over with
/// empty books.

use tracing::{debug, error, info, warn};

use crate::book_builder::OrderBooks;
use crate::config::SnapshotsConfig;
use crate::decoder::Packet;
use crate::forts::{OrdersLogSnapShot, TradingSessionStatus};
use crate::incrs_channel::report_session_status;
use crate::low_level::DecodeError;
use crate::protocol::{MessageType, SeqNum, TimeVal};

/// Channel state after one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Still collecting.
    Running,
    /// Not a snapshot; nothing changed.
    Ignored,
    DecodeFailed(DecodeError),
    /// All books are installed. Incrementals after `cut_over` apply.
    Completed { cut_over: SeqNum },
    /// Ran out of rounds.
    Failed,
    /// The channel already finished; the datagram was not looked at.
    Stopped,
}

#[derive(Debug)]
pub struct SnapshotChannel {
    snap: OrdersLogSnapShot,
    session_status: TradingSessionStatus,
    max_init_rounds: u32,
    debug_level: u8,

    round: u32,
    skip: bool,
    next_sn: SeqNum,
    done: bool,
}

impl SnapshotChannel {
    pub fn new(config: &SnapshotsConfig, debug_level: u8) -> Self {
        SnapshotChannel {
            snap: OrdersLogSnapShot::new(),
            session_status: TradingSessionStatus::default(),
            max_init_rounds: config.max_init_rounds.max(1),
            debug_level,
            round: 0,
            skip: true,
            next_sn: 0,
            done: false,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn stop(&mut self) {
        self.done = true;
    }

    pub fn on_datagram(
        &mut self,
        bytes: &[u8],
        _recv_ts: TimeVal,
        books: &mut OrderBooks,
    ) -> SnapshotStatus {
        if self.done {
            return SnapshotStatus::Stopped;
        }
        if bytes.is_empty() {
            if self.debug_level >= 2 {
                debug!(round = self.round, "snapshots: end of chunk");
            }
            return SnapshotStatus::Running;
        }

        let pkt = match Packet::parse(bytes, "OrdersLogSnapShot") {
            Ok(pkt) => pkt,
            Err(e) => {
                warn!(len = bytes.len(), "snapshots: bad packet: {}", e);
                return SnapshotStatus::DecodeFailed(e);
            }
        };

        match MessageType::from_tid(pkt.tid) {
            Some(MessageType::OrdersLogSnapShot) => {}
            Some(MessageType::TradingSessionStatus) => {
                return match pkt.decode_into(&mut self.session_status) {
                    Ok(_) => {
                        report_session_status(&self.session_status);
                        SnapshotStatus::Ignored
                    }
                    Err(e) => {
                        warn!(sn = pkt.seq_num, "snapshots: bad TradingSessionStatus: {}", e);
                        SnapshotStatus::DecodeFailed(e)
                    }
                };
            }
            Some(MessageType::HeartBeat) => return SnapshotStatus::Ignored,
            _ => {
                if self.debug_level >= 2 {
                    warn!(sn = pkt.seq_num, tid = pkt.tid, "snapshots: unexpected message ignored");
                }
                return SnapshotStatus::Ignored;
            }
        }

        match pkt.decode_into(&mut self.snap) {
            Ok(trailing) => {
                if trailing > 0 {
                    warn!(sn = pkt.seq_num, trailing, "snapshots: bytes after message");
                }
            }
            Err(e) => {
                warn!(sn = pkt.seq_num, "snapshots: {}", e);
                return SnapshotStatus::DecodeFailed(e);
            }
        }

        self.process(pkt.seq_num, books)
    }

    fn process(&mut self, pkt_sn: SeqNum, books: &mut OrderBooks) -> SnapshotStatus {
        let msg_sn = SeqNum::from(self.snap.msg_seq_num);

        if msg_sn == 1 {
            if let Some(status) = self.begin_round(books) {
                return status;
            }
        }
        if self.skip {
            return SnapshotStatus::Running;
        }

        if pkt_sn != msg_sn || pkt_sn != self.next_sn {
            error!(
                round = self.round,
                pkt_sn,
                msg_sn,
                expected = self.next_sn,
                "snapshots: seqnum mismatch, skipping rest of round"
            );
            self.skip = true;
            return SnapshotStatus::Running;
        }
        self.next_sn += 1;

        let isn = self.snap.last_msg_seq_num_processed;
        if isn == 0 {
            if self.debug_level >= 1 {
                warn!(
                    security_id = self.snap.security_id,
                    "snapshots: LastMsgSeqNumProcessed=0, ignored"
                );
            }
            return SnapshotStatus::Running;
        }

        let book = match books.get_mut(self.snap.security_id) {
            Some(book) => book,
            None => return SnapshotStatus::Running,
        };
        for e in self.snap.entries.iter().filter(|e| e.is_valid_update()) {
            if let Err(e) = book.apply_snap(e) {
                error!(round = self.round, "snapshots: {}, skipping rest of round", e);
                self.skip = true;
                break;
            }
        }
        book.set_seq(SeqNum::from(isn), self.snap.rpt_seq);
        SnapshotStatus::Running
    }

    /// A message with MsgSeqNum 1 starts a round. If the previous round was
    /// clean the bootstrap is complete.
    fn begin_round(&mut self, books: &mut OrderBooks) -> Option<SnapshotStatus> {
        self.round += 1;

        if self.round >= 2 && !self.skip {
            if let Some(cut_over) = self.cut_over(books) {
                books.iter_mut().for_each(|b| b.set_initialised());
                info!(round = self.round - 1, cut_over, books = books.len(), "snapshots: books installed");
                self.next_sn = 1;
                self.skip = true;
                self.done = true;
                return Some(SnapshotStatus::Completed { cut_over });
            }
        }

        if self.round > self.max_init_rounds {
            error!(
                rounds = self.max_init_rounds,
                "snapshots: no consistent round, giving up"
            );
            self.done = true;
            return Some(SnapshotStatus::Failed);
        }

        self.next_sn = 1;
        self.skip = false;
        books.reset_all();
        if self.debug_level >= 1 {
            debug!(round = self.round, "snapshots: round started");
        }
        None
    }

    /// Lowest LastMsgSeqNumProcessed over the installed books, or `None`
    /// if any book is crossed, misses updates it was sent before the round,
    /// or no book was installed.
    fn cut_over(&self, books: &OrderBooks) -> Option<SeqNum> {
        let mut min_sn = SeqNum::MAX;
        for book in books.iter() {
            if !book.is_consistent() {
                warn!(security_id = book.security_id(), "snapshots: book inconsistent");
                return None;
            }
            if book.last_seq_num() > 0 && book.last_rpt_seq() > 0 {
                if !book.covers_init_updates() {
                    warn!(
                        security_id = book.security_id(),
                        sn = book.last_seq_num(),
                        init_sn = book.init_sn(),
                        "snapshots: book older than updates already delivered"
                    );
                    return None;
                }
                if self.debug_level >= 1 {
                    debug!(
                        security_id = book.security_id(),
                        sn = book.last_seq_num(),
                        rpt_seq = book.last_rpt_seq(),
                        orders = book.order_count(),
                        "snapshots: book installed"
                    );
                }
                min_sn = min_sn.min(book.last_seq_num());
            }
        }
        (min_sn > 0 && min_sn < SeqNum::MAX).then_some(min_sn)
    }
}
