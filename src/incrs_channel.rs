/// Incremental refresh channel
///
/// Feeds incrementals of one template (FORTS orders log, MICEX 3610) from
/// the A/B multicast pair into a reorder buffer keyed by packet seqnum.
/// Decoding happens in place, inside the buffer slot, and only for seqnums
/// the buffer accepts.

use tracing::{debug, info, warn};

use crate::config::BufferConfig;
use crate::decoder::{IncrementalMessage, Packet};
use crate::forts::TradingSessionStatus;
use crate::low_level::DecodeError;
use crate::protocol::{SeqNum, TimeVal};
use crate::seq_num_buffer::{Processor, SeqNumBuffer, SeqNumError, SeqNumResult};

/// What happened to one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrOutcome {
    /// Empty datagram: the receiver drained its socket.
    EndOfChunk,
    /// Stored in the buffer (and possibly already processed).
    Accepted,
    /// Already seen, or older than the expected seqnum.
    Duplicate,
    /// Unusable bytes. If the packet seqnum was readable the slot still
    /// holds an empty placeholder, so the seqnum is not reported lost.
    DecodeFailed(DecodeError),
    /// Packet seqnum the buffer cannot take (zero, or no successor).
    Rejected(SeqNumError),
}

pub struct IncrementalChannel<M, P> {
    name: &'static str,
    buffer: SeqNumBuffer<M, P>,
    session_status: TradingSessionStatus,
    debug_level: u8,
}

impl<M: IncrementalMessage, P: Processor<M>> IncrementalChannel<M, P> {
    /// `init_mode` holds back delivery until a snapshot bootstrap calls
    /// [`close_init_mode`](Self::close_init_mode).
    pub fn new(
        name: &'static str,
        config: &BufferConfig,
        init_mode: bool,
        processor: P,
    ) -> SeqNumResult<Self> {
        Ok(IncrementalChannel {
            name,
            buffer: SeqNumBuffer::new(name, config, init_mode, processor)?,
            session_status: TradingSessionStatus::default(),
            debug_level: config.debug_level,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn on_datagram(&mut self, bytes: &[u8], recv_ts: TimeVal) -> IncrOutcome {
        let name = self.name;
        if bytes.is_empty() {
            if self.debug_level >= 2 {
                debug!(channel = name, xsn = self.buffer.expected_seq_num(), "end of chunk");
            }
            return IncrOutcome::EndOfChunk;
        }
        let handl_ts = TimeVal::now();

        let pkt = match Packet::parse(bytes, M::NAME) {
            Ok(pkt) => pkt,
            Err(e) => {
                warn!(channel = name, len = bytes.len(), "bad packet: {}", e);
                return IncrOutcome::DecodeFailed(e);
            }
        };
        let sn = pkt.seq_num;

        if M::SESSION_STATUS_TID == Some(pkt.tid) {
            match pkt.decode_into(&mut self.session_status) {
                Ok(_) => report_session_status(&self.session_status),
                Err(e) => warn!(channel = name, sn, "bad TradingSessionStatus: {}", e),
            }
        }

        let debug_level = self.debug_level;
        let mut failure = None;
        let emplacer = |msg: &mut M| -> Result<(), DecodeError> {
            if pkt.tid != M::TID {
                if !M::is_service_tid(pkt.tid) && debug_level >= 1 {
                    warn!(channel = name, sn, tid = pkt.tid, "unexpected message, placeholder stored");
                }
                msg.set_empty(sn as u32);
                return Ok(());
            }
            match pkt.decode_into(msg) {
                Ok(trailing) => {
                    if trailing > 0 {
                        warn!(channel = name, sn, trailing, "bytes after message");
                    }
                    if SeqNum::from(msg.msg_seq_num()) != sn {
                        warn!(channel = name, sn, msg_seq_num = msg.msg_seq_num(), "MsgSeqNum mismatch");
                        msg.set_msg_seq_num(sn as u32);
                    }
                    Ok(())
                }
                Err(e) => {
                    msg.set_empty(sn as u32);
                    failure = Some(e.clone());
                    Err(e)
                }
            }
        };

        let result = self.buffer.put(emplacer, sn, recv_ts, handl_ts);
        if let Some(e) = failure {
            return IncrOutcome::DecodeFailed(e);
        }
        match result {
            Ok(true) => IncrOutcome::Accepted,
            Ok(false) => IncrOutcome::Duplicate,
            Err(e) => {
                warn!(channel = name, sn, "{}", e);
                IncrOutcome::Rejected(e)
            }
        }
    }

    /// Leave init mode at the snapshot cut-over seqnum.
    pub fn close_init_mode(&mut self, sn: SeqNum) -> SeqNumResult<()> {
        self.buffer.close_init_mode(sn)
    }

    pub fn is_init_mode(&self) -> bool {
        self.buffer.is_init_mode()
    }

    pub fn expected_seq_num(&self) -> SeqNum {
        self.buffer.expected_seq_num()
    }

    pub fn pending(&self) -> usize {
        self.buffer.pending()
    }

    pub fn session_status(&self) -> &TradingSessionStatus {
        &self.session_status
    }

    pub fn processor(&self) -> &P {
        self.buffer.processor()
    }

    pub fn processor_mut(&mut self) -> &mut P {
        self.buffer.processor_mut()
    }
}

pub(crate) fn report_session_status(tss: &TradingSessionStatus) {
    info!(
        msg_seq_num = tss.msg_seq_num,
        trading_session_id = tss.trading_session_id,
        exchange_trading_session_id = tss.exchange_trading_session_id,
        status = tss.trad_ses_status,
        event = tss.trad_ses_event,
        segment = %tss.market_segment_id,
        "trading session status"
    );
}
