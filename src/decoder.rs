//! Datagram decoder
//!
//! Each datagram is a 4-byte little-endian packet seqnum followed by one
//! FAST message. `Decoder` keeps one scratch struct per message type and
//! decodes into it in place, so a decoded message is only valid until the
//! next `decode` call on the same decoder.

use byteorder::{ByteOrder, LittleEndian};

use crate::forts::{
    HeartBeat, OrdersLogIncrRefresh, OrdersLogSnapShot, SecurityDefinition,
    SecurityDefinitionUpdate, SecurityStatus, SequenceReset, TradingSessionStatus,
};
use crate::low_level::{get_msg_header, Cursor, DecodeError, DecodeResult};
use crate::micex;
use crate::protocol::{MessageType, PMap, SeqNum, Tid, PACKET_PREFIX_LEN};

/// A FAST template with a fixed field layout.
pub trait FastMessage: Default {
    const TID: Tid;

    /// Decode the fields following the header into `self`, overwriting the
    /// previous contents.
    fn decode(&mut self, cur: &mut Cursor<'_>, pmap: PMap) -> DecodeResult<()>;

    fn msg_seq_num(&self) -> u32;
}

/// An incremental template sequenced through a reorder buffer. Other
/// templates arriving on the same channel still own their packet seqnum,
/// so they are stored as empty placeholders of this type.
pub trait IncrementalMessage: FastMessage {
    /// Template name for packet-level diagnostics.
    const NAME: &'static str;

    /// TID of a session status the channel decodes and reports, if the
    /// venue's status template is supported.
    const SESSION_STATUS_TID: Option<Tid> = None;

    /// Heartbeats and the like: placeholders for these are not worth a
    /// warning.
    fn is_service_tid(tid: Tid) -> bool;

    /// Clear the entries, leaving a placeholder for seqnum `msg_seq_num`.
    fn set_empty(&mut self, msg_seq_num: u32);

    fn set_msg_seq_num(&mut self, msg_seq_num: u32);
}

/// A datagram split into prefix, header and message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub seq_num: SeqNum,
    pub pmap: PMap,
    pub tid: Tid,
    pub body: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Read the packet seqnum and the FAST header.
    pub fn parse(bytes: &'a [u8], group: &'static str) -> DecodeResult<Self> {
        if bytes.len() < PACKET_PREFIX_LEN {
            return Err(DecodeError::TruncatedPrefix { len: bytes.len() });
        }
        let seq_num = LittleEndian::read_u32(&bytes[..PACKET_PREFIX_LEN]) as SeqNum;
        let mut cur = Cursor::new(&bytes[PACKET_PREFIX_LEN..]);
        let (pmap, tid) = get_msg_header(&mut cur, group)?;
        Ok(Packet {
            seq_num,
            pmap,
            tid,
            body: cur.rest(),
        })
    }

    /// Decode the body into `msg`. Returns the number of bytes left over
    /// after the message, which should be 0.
    pub fn decode_into<M: FastMessage>(&self, msg: &mut M) -> DecodeResult<usize> {
        let mut cur = Cursor::new(self.body);
        msg.decode(&mut cur, self.pmap)?;
        Ok(cur.remaining())
    }
}

/// A decoded FORTS message, borrowed from the decoder's scratch space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FortsMessage<'a> {
    SecurityDefinition(&'a SecurityDefinition),
    SecurityDefinitionUpdate(&'a SecurityDefinitionUpdate),
    SecurityStatus(&'a SecurityStatus),
    HeartBeat(&'a HeartBeat),
    SequenceReset(&'a SequenceReset),
    TradingSessionStatus(&'a TradingSessionStatus),
    /// Recognised, not decoded.
    News,
    OrdersLogIncrRefresh(&'a OrdersLogIncrRefresh),
    OrdersLogSnapShot(&'a OrdersLogSnapShot),
}

impl<'a> FortsMessage<'a> {
    pub fn message_type(&self) -> MessageType {
        match self {
            FortsMessage::SecurityDefinition(_) => MessageType::SecurityDefinition,
            FortsMessage::SecurityDefinitionUpdate(_) => MessageType::SecurityDefinitionUpdate,
            FortsMessage::SecurityStatus(_) => MessageType::SecurityStatus,
            FortsMessage::HeartBeat(_) => MessageType::HeartBeat,
            FortsMessage::SequenceReset(_) => MessageType::SequenceReset,
            FortsMessage::TradingSessionStatus(_) => MessageType::TradingSessionStatus,
            FortsMessage::News => MessageType::News,
            FortsMessage::OrdersLogIncrRefresh(_) => MessageType::OrdersLogIncrRefresh,
            FortsMessage::OrdersLogSnapShot(_) => MessageType::OrdersLogSnapShot,
        }
    }

    /// MsgSeqNum carried inside the message, if it was decoded.
    pub fn msg_seq_num(&self) -> Option<u32> {
        match self {
            FortsMessage::SecurityDefinition(m) => Some(m.msg_seq_num),
            FortsMessage::SecurityDefinitionUpdate(m) => Some(m.msg_seq_num),
            FortsMessage::SecurityStatus(m) => Some(m.msg_seq_num),
            FortsMessage::HeartBeat(m) => Some(m.msg_seq_num),
            FortsMessage::SequenceReset(m) => Some(m.msg_seq_num),
            FortsMessage::TradingSessionStatus(m) => Some(m.msg_seq_num),
            FortsMessage::News => None,
            FortsMessage::OrdersLogIncrRefresh(m) => Some(m.msg_seq_num),
            FortsMessage::OrdersLogSnapShot(m) => Some(m.msg_seq_num),
        }
    }
}

/// Result of decoding one datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded<M> {
    pub seq_num: SeqNum,
    pub message: M,
    /// Bytes after the end of the message.
    pub trailing: usize,
}

/// FORTS datagram decoder with reusable scratch messages.
#[derive(Debug, Default)]
pub struct Decoder {
    sec_def: SecurityDefinition,
    sec_def_upd: SecurityDefinitionUpdate,
    sec_status: SecurityStatus,
    heartbeat: HeartBeat,
    seq_reset: SequenceReset,
    sess_status: TradingSessionStatus,
    incr: OrdersLogIncrRefresh,
    snap: OrdersLogSnapShot,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            incr: OrdersLogIncrRefresh::new(),
            snap: OrdersLogSnapShot::new(),
            ..Default::default()
        }
    }

    pub fn decode<'a>(&'a mut self, bytes: &[u8]) -> DecodeResult<Decoded<FortsMessage<'a>>> {
        let pkt = Packet::parse(bytes, "FORTS")?;
        let msg_type =
            MessageType::from_tid(pkt.tid).ok_or(DecodeError::UnexpectedTemplate(pkt.tid))?;

        let (message, trailing) = match msg_type {
            MessageType::SecurityDefinition => {
                let n = pkt.decode_into(&mut self.sec_def)?;
                (FortsMessage::SecurityDefinition(&self.sec_def), n)
            }
            MessageType::SecurityDefinitionUpdate => {
                let n = pkt.decode_into(&mut self.sec_def_upd)?;
                (FortsMessage::SecurityDefinitionUpdate(&self.sec_def_upd), n)
            }
            MessageType::SecurityStatus => {
                let n = pkt.decode_into(&mut self.sec_status)?;
                (FortsMessage::SecurityStatus(&self.sec_status), n)
            }
            MessageType::HeartBeat => {
                let n = pkt.decode_into(&mut self.heartbeat)?;
                (FortsMessage::HeartBeat(&self.heartbeat), n)
            }
            MessageType::SequenceReset => {
                let n = pkt.decode_into(&mut self.seq_reset)?;
                (FortsMessage::SequenceReset(&self.seq_reset), n)
            }
            MessageType::TradingSessionStatus => {
                let n = pkt.decode_into(&mut self.sess_status)?;
                (FortsMessage::TradingSessionStatus(&self.sess_status), n)
            }
            MessageType::News => (FortsMessage::News, 0),
            MessageType::OrdersLogIncrRefresh => {
                let n = pkt.decode_into(&mut self.incr)?;
                (FortsMessage::OrdersLogIncrRefresh(&self.incr), n)
            }
            MessageType::OrdersLogSnapShot => {
                let n = pkt.decode_into(&mut self.snap)?;
                (FortsMessage::OrdersLogSnapShot(&self.snap), n)
            }
        };

        Ok(Decoded {
            seq_num: pkt.seq_num,
            message,
            trailing,
        })
    }
}

/// A decoded MICEX FX message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MicexMessage<'a> {
    IncrementalRefresh(&'a micex::IncrementalRefresh),
    SnapShot(&'a micex::SnapShot),
    HeartBeat,
    TradingSessionStatus,
}

/// MICEX FX datagram decoder.
#[derive(Debug, Default)]
pub struct MicexDecoder {
    incr: micex::IncrementalRefresh,
    snap: micex::SnapShot,
}

impl MicexDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode<'a>(&'a mut self, bytes: &[u8]) -> DecodeResult<Decoded<MicexMessage<'a>>> {
        let pkt = Packet::parse(bytes, "MICEX")?;
        let (message, trailing) = match pkt.tid {
            micex::INCREMENTAL_REFRESH_TID => {
                let n = pkt.decode_into(&mut self.incr)?;
                (MicexMessage::IncrementalRefresh(&self.incr), n)
            }
            micex::SNAPSHOT_TID => {
                let n = pkt.decode_into(&mut self.snap)?;
                (MicexMessage::SnapShot(&self.snap), n)
            }
            micex::HEARTBEAT_TID => (MicexMessage::HeartBeat, 0),
            micex::TRADING_SESSION_STATUS_TID => (MicexMessage::TradingSessionStatus, 0),
            tid => return Err(DecodeError::UnexpectedTemplate(tid)),
        };
        Ok(Decoded {
            seq_num: pkt.seq_num,
            message,
            trailing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_prefix() {
        let err = Packet::parse(&[1, 0, 0], "t").unwrap_err();
        assert_eq!(err, DecodeError::TruncatedPrefix { len: 3 });
    }

    #[test]
    fn test_packet_header() {
        // sn=7, PMap with only the TID bit, TID=6, then MsgSeqNum=7, SendingTime=0
        let bytes = [7, 0, 0, 0, 0xc0, 0x86, 0x87, 0x80];
        let pkt = Packet::parse(&bytes, "t").unwrap();
        assert_eq!(pkt.seq_num, 7);
        assert_eq!(pkt.tid, 6);
        assert_eq!(pkt.body, &[0x87, 0x80]);
    }

    #[test]
    fn test_decode_heartbeat() {
        let bytes = [7, 0, 0, 0, 0xc0, 0x86, 0x87, 0x80];
        let mut dec = Decoder::new();
        let d = dec.decode(&bytes).unwrap();
        assert_eq!(d.seq_num, 7);
        assert_eq!(d.trailing, 0);
        assert_eq!(d.message.message_type(), MessageType::HeartBeat);
        assert_eq!(d.message.msg_seq_num(), Some(7));
    }

    #[test]
    fn test_unknown_template() {
        let bytes = [1, 0, 0, 0, 0xc0, 0xe3];
        let mut dec = Decoder::new();
        assert_eq!(
            dec.decode(&bytes).unwrap_err(),
            DecodeError::UnexpectedTemplate(99)
        );
    }

    #[test]
    fn test_trailing_bytes_reported() {
        let bytes = [7, 0, 0, 0, 0xc0, 0x86, 0x87, 0x80, 0x81];
        let mut dec = Decoder::new();
        assert_eq!(dec.decode(&bytes).unwrap().trailing, 1);
    }
}
