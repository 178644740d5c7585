//! Reorder and gap-recovery buffer
//!
//! `SeqNumBuffer` accepts items tagged with sequence numbers in any order,
//! possibly duplicated (A/B feeds) or lost, and hands them to a
//! [`Processor`] exactly once each, in strictly increasing order.
//!
//! The occupied window is `[bi, ei)` in a fixed-capacity slot array. When
//! non-empty, the window always starts with an empty slot (the expected
//! seqnum `xsn`, not yet arrived) and ends with an occupied one. A jump
//! ahead of more than `max_gap`, or past the end of the array, declares the
//! missing front of the window lost and moves on.
//!
//! In init mode the first arrival opens an artificial one-slot gap in front
//! of itself, so nothing is delivered until [`SeqNumBuffer::close_init_mode`]
//! supplies the cut-over seqnum from a snapshot.

use std::fmt;

use thiserror::Error;
use tracing::{debug, error};

use crate::config::BufferConfig;
use crate::protocol::{SeqNum, TimeVal};

const EMPTY: SeqNum = -1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeqNumError {
    #[error("buffer capacity must be positive")]
    ZeroCapacity,

    #[error("invalid seqnum {0}: must be positive")]
    NonPositive(SeqNum),

    #[error("seqnum {0} has no successor")]
    Overflow(SeqNum),

    #[error("cannot force xsn={xsn}: current xsn={current}, empty={empty}, init_mode={init_mode}")]
    IllegalForcedXsn {
        xsn: SeqNum,
        current: SeqNum,
        empty: bool,
        init_mode: bool,
    },
}

pub type SeqNumResult<T> = Result<T, SeqNumError>;

/// Consumer of in-order items.
pub trait Processor<T> {
    type Error: fmt::Display;

    /// Called exactly once per delivered seqnum, in increasing order. An
    /// error is logged; the item still counts as delivered.
    fn process(
        &mut self,
        sn: SeqNum,
        item: &T,
        init_mode: bool,
        recv_ts: TimeVal,
        handl_ts: TimeVal,
    ) -> Result<(), Self::Error>;

    /// Seqnums `first..=last` will never be delivered.
    fn on_lost(&mut self, _first: SeqNum, _last: SeqNum) {}
}

#[derive(Debug, Clone, Default)]
struct Slot<T> {
    sn: SeqNum,
    recv_ts: TimeVal,
    handl_ts: TimeVal,
    item: T,
}

pub struct SeqNumBuffer<T, P> {
    name: String,
    data: Vec<Slot<T>>,
    max_gap: SeqNum,
    debug_level: u8,
    bi: usize,
    ei: usize,
    /// Next expected seqnum; -1 until the first arrival.
    xsn: SeqNum,
    init_mode: bool,
    processor: P,
}

impl<T: Default, P: Processor<T>> SeqNumBuffer<T, P> {
    pub fn new(
        name: impl Into<String>,
        config: &BufferConfig,
        init_mode: bool,
        processor: P,
    ) -> SeqNumResult<Self> {
        if config.capacity == 0 {
            return Err(SeqNumError::ZeroCapacity);
        }
        let data = (0..config.capacity)
            .map(|_| Slot {
                sn: EMPTY,
                ..Default::default()
            })
            .collect();
        Ok(SeqNumBuffer {
            name: name.into(),
            data,
            max_gap: config.max_gap as SeqNum,
            debug_level: config.debug_level,
            bi: 0,
            ei: 0,
            xsn: EMPTY,
            init_mode,
            processor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// -1 before the first arrival; 0 is possible in init mode.
    pub fn expected_seq_num(&self) -> SeqNum {
        self.xsn
    }

    pub fn is_init_mode(&self) -> bool {
        self.init_mode
    }

    pub fn is_empty(&self) -> bool {
        self.ei == 0
    }

    /// Number of slots between the window start and end, gaps included.
    pub fn window_len(&self) -> usize {
        self.ei - self.bi
    }

    /// Items waiting for a gap to close.
    pub fn pending(&self) -> usize {
        self.data[self.bi..self.ei]
            .iter()
            .filter(|s| s.sn != EMPTY)
            .count()
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Offer item `sn`. `emplacer` builds the item in its slot and runs only
    /// if the seqnum is accepted. Returns whether it was stored.
    pub fn put<F, E>(
        &mut self,
        emplacer: F,
        sn: SeqNum,
        recv_ts: TimeVal,
        handl_ts: TimeVal,
    ) -> SeqNumResult<bool>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: fmt::Display,
    {
        self.put_impl(emplacer, sn, recv_ts, handl_ts, None)
    }

    /// Like [`put`](Self::put), but first moves the expected seqnum to
    /// `xsn`. Only legal on an empty buffer outside init mode, and `xsn`
    /// may not go backwards.
    pub fn put_forced<F, E>(
        &mut self,
        emplacer: F,
        sn: SeqNum,
        recv_ts: TimeVal,
        handl_ts: TimeVal,
        xsn: SeqNum,
    ) -> SeqNumResult<bool>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: fmt::Display,
    {
        self.put_impl(emplacer, sn, recv_ts, handl_ts, Some(xsn))
    }

    fn put_impl<F, E>(
        &mut self,
        emplacer: F,
        sn: SeqNum,
        recv_ts: TimeVal,
        handl_ts: TimeVal,
        forced_xsn: Option<SeqNum>,
    ) -> SeqNumResult<bool>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: fmt::Display,
    {
        if sn <= 0 {
            return Err(SeqNumError::NonPositive(sn));
        }
        // xsn moves one past every delivered seqnum
        if sn.checked_add(1).is_none() {
            return Err(SeqNumError::Overflow(sn));
        }

        if let Some(xsn) = forced_xsn {
            let empty = self.is_empty();
            if xsn <= 0 || !empty || xsn < self.xsn || self.init_mode {
                return Err(SeqNumError::IllegalForcedXsn {
                    xsn,
                    current: self.xsn,
                    empty,
                    init_mode: self.init_mode,
                });
            }
            self.xsn = xsn;
        }

        loop {
            if self.xsn == EMPTY {
                self.xsn = if self.init_mode { sn - 1 } else { sn };
            } else if sn < self.xsn || (self.init_mode && sn == self.xsn) {
                // Normal with redundant feeds
                return Ok(false);
            }

            if sn == self.xsn {
                let pos = self.bi;
                self.safe_emplace(emplacer, sn, recv_ts, handl_ts, pos);
                self.safe_process_contiguous();
                return Ok(true);
            }

            let gap = sn - self.xsn;
            let pos = self.bi.saturating_add(usize::try_from(gap).unwrap_or(usize::MAX));

            if (!self.init_mode && gap > self.max_gap) || pos >= self.data.len() {
                if self.recover(sn, pos) {
                    continue;
                }
                error!(
                    buffer = %self.name,
                    sn,
                    xsn = self.xsn,
                    gap,
                    "no room for item, dropped"
                );
                return Ok(false);
            }

            if pos < self.ei {
                if self.data[pos].sn != EMPTY {
                    if self.debug_level >= 2 {
                        debug!(buffer = %self.name, sn, "duplicate inside window");
                    }
                    return Ok(false);
                }
                self.safe_emplace(emplacer, sn, recv_ts, handl_ts, pos);
            } else {
                self.ei = pos + 1;
                self.safe_emplace(emplacer, sn, recv_ts, handl_ts, pos);
            }

            if self.debug_level >= 2 {
                debug!(
                    buffer = %self.name,
                    sn,
                    xsn = self.xsn,
                    window = self.ei - self.bi,
                    "buffered out of order"
                );
            }
            return Ok(true);
        }
    }

    /// End init mode with the lowest seqnum covered by the snapshots. Items
    /// up to and including `sn` are purged; whatever is contiguous after
    /// that is delivered, still flagged as init mode. Repeated calls are
    /// no-ops.
    pub fn close_init_mode(&mut self, sn: SeqNum) -> SeqNumResult<()> {
        if !self.init_mode {
            return Ok(());
        }
        if sn <= 0 {
            return Err(SeqNumError::NonPositive(sn));
        }

        let next = sn.checked_add(1).ok_or(SeqNumError::Overflow(sn))?;

        if self.ei > 0 {
            let base = self.xsn.max(sn);
            let new_xsn = base.checked_add(1).ok_or(SeqNumError::Overflow(base))?;
            let purge = usize::try_from(new_xsn - self.xsn).unwrap_or(usize::MAX);
            let end = self.bi.saturating_add(purge).min(self.ei);
            let mut purged = 0usize;
            for slot in &mut self.data[self.bi..end] {
                if slot.sn != EMPTY {
                    purged += 1;
                }
                slot.sn = EMPTY;
            }
            self.bi = end;
            self.xsn = new_xsn;
            if self.bi >= self.ei {
                self.bi = 0;
                self.ei = 0;
            } else if self.data[self.bi].sn != EMPTY {
                self.safe_process_contiguous();
            }
            if self.debug_level >= 1 {
                debug!(buffer = %self.name, sn, xsn = self.xsn, purged, "init mode closed");
            }
        } else if self.xsn < next {
            self.xsn = next;
        }

        self.init_mode = false;
        Ok(())
    }

    fn safe_emplace<F, E>(
        &mut self,
        emplacer: F,
        sn: SeqNum,
        recv_ts: TimeVal,
        handl_ts: TimeVal,
        pos: usize,
    ) where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: fmt::Display,
    {
        let slot = &mut self.data[pos];
        // Occupied even if the emplacer fails: never decode twice
        slot.sn = sn;
        slot.recv_ts = recv_ts;
        slot.handl_ts = handl_ts;
        if let Err(e) = emplacer(&mut slot.item) {
            error!(buffer = %self.name, sn, xsn = self.xsn, pos, "emplace failed: {}", e);
        }
        if pos == self.ei {
            self.ei += 1;
        }
    }

    fn safe_process_contiguous(&mut self) {
        while self.bi < self.ei {
            let slot = &mut self.data[self.bi];
            if slot.sn == EMPTY {
                break;
            }
            debug_assert_eq!(slot.sn, self.xsn);
            if let Err(e) = self.processor.process(
                slot.sn,
                &slot.item,
                self.init_mode,
                slot.recv_ts,
                slot.handl_ts,
            ) {
                error!(buffer = %self.name, sn = slot.sn, "processing failed: {}", e);
            }
            self.xsn = slot.sn.saturating_add(1);
            slot.sn = EMPTY;
            self.bi += 1;
        }
        if self.bi >= self.ei {
            self.bi = 0;
            self.ei = 0;
        }
    }

    /// Give up on the missing front of the window so that `sn` fits. On an
    /// empty buffer everything before `sn` is given up. False if nothing
    /// could be freed.
    fn recover(&mut self, sn: SeqNum, pos: usize) -> bool {
        let mut lost = 0;
        while self.bi < self.ei && self.data[self.bi].sn == EMPTY {
            self.bi += 1;
            lost += 1;
        }
        if lost == 0 {
            debug_assert!(self.is_empty());
            // Init mode keeps its one-slot gap in front of `sn`
            let new_xsn = if self.init_mode { sn - 1 } else { sn };
            if new_xsn <= self.xsn {
                return false;
            }
            let (first, last) = (self.xsn, new_xsn - 1);
            self.report_lost(first, last, pos);
            self.xsn = new_xsn;
            self.bi = 0;
            self.ei = 0;
            return true;
        }

        let first = self.xsn;
        let last = self.xsn + lost as SeqNum - 1;
        self.report_lost(first, last, pos);
        self.xsn += lost as SeqNum;

        if self.bi >= self.ei {
            self.bi = 0;
            self.ei = 0;
            return true;
        }

        self.safe_process_contiguous();

        if self.ei != 0 {
            // Compact the remaining window to the front
            let len = self.ei - self.bi;
            for i in 0..len {
                let src = self.bi + i;
                if self.data[src].sn != EMPTY {
                    self.data.swap(i, src);
                }
            }
            self.bi = 0;
            self.ei = len;
        }
        true
    }

    fn report_lost(&mut self, first: SeqNum, last: SeqNum, pos: usize) {
        error!(
            buffer = %self.name,
            first,
            last,
            count = last - first + 1,
            max_gap = self.max_gap,
            pos,
            capacity = self.data.len(),
            "seqnums lost"
        );
        self.processor.on_lost(first, last);
    }
}

impl<T, P: fmt::Debug> fmt::Debug for SeqNumBuffer<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqNumBuffer")
            .field("name", &self.name)
            .field("capacity", &self.data.len())
            .field("max_gap", &self.max_gap)
            .field("bi", &self.bi)
            .field("ei", &self.ei)
            .field("xsn", &self.xsn)
            .field("init_mode", &self.init_mode)
            .field("processor", &self.processor)
            .finish()
    }
}
