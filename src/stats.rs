/// Feed statistics
///
/// Datagram and byte counts, latency windows for decoding and for the
/// receive-to-book path, lost seqnum ranges and decode failures.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

const WINDOW_SIZE: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    fn from_window(window: &VecDeque<u64>) -> Option<Self> {
        if window.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let n = sorted.len();
        Some(LatencyStats {
            min_us: sorted[0],
            max_us: sorted[n - 1],
            mean_us: sorted.iter().sum::<u64>() as f64 / n as f64,
            p50_us: sorted[n / 2],
            p99_us: sorted[(n * 99) / 100],
        })
    }
}

fn push_window(window: &mut VecDeque<u64>, v: u64) {
    if window.len() >= WINDOW_SIZE {
        window.pop_front();
    }
    window.push_back(v);
}

#[derive(Debug, Clone)]
pub struct FeedStats {
    start_time: Option<Instant>,
    incr_datagrams: u64,
    snap_datagrams: u64,
    total_bytes: u64,

    decode_latencies: VecDeque<u64>,
    // receive timestamp to book update
    process_latencies: VecDeque<u64>,

    decode_errors: u64,
    processed: u64,

    lost_total: u64,
    lost_events: u32,
}

impl FeedStats {
    pub fn new() -> Self {
        FeedStats {
            start_time: None,
            incr_datagrams: 0,
            snap_datagrams: 0,
            total_bytes: 0,
            decode_latencies: VecDeque::with_capacity(WINDOW_SIZE),
            process_latencies: VecDeque::with_capacity(WINDOW_SIZE),
            decode_errors: 0,
            processed: 0,
            lost_total: 0,
            lost_events: 0,
        }
    }

    fn touch(&mut self, size: usize) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        self.total_bytes += size as u64;
    }

    pub fn record_incr_datagram(&mut self, size: usize) {
        self.touch(size);
        self.incr_datagrams += 1;
    }

    pub fn record_snap_datagram(&mut self, size: usize) {
        self.touch(size);
        self.snap_datagrams += 1;
    }

    pub fn record_decode_latency(&mut self, micros: u64) {
        push_window(&mut self.decode_latencies, micros);
    }

    /// A message reached the books, `micros` after it was received.
    pub fn record_processed(&mut self, micros: u64) {
        self.processed += 1;
        push_window(&mut self.process_latencies, micros);
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    /// Seqnums `first..=last` were given up on.
    pub fn record_lost(&mut self, first: i64, last: i64) {
        self.lost_total += (last - first + 1).max(0) as u64;
        self.lost_events += 1;
    }

    pub fn datagrams_per_sec(&self) -> f64 {
        self.rate(self.incr_datagrams + self.snap_datagrams)
    }

    pub fn bytes_per_sec(&self) -> f64 {
        self.rate(self.total_bytes)
    }

    fn rate(&self, count: u64) -> f64 {
        match self.elapsed() {
            Some(d) if d.as_secs_f64() > 0.0 => count as f64 / d.as_secs_f64(),
            _ => 0.0,
        }
    }

    pub fn decode_latency_stats(&self) -> Option<LatencyStats> {
        LatencyStats::from_window(&self.decode_latencies)
    }

    pub fn process_latency_stats(&self) -> Option<LatencyStats> {
        LatencyStats::from_window(&self.process_latencies)
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|st| st.elapsed())
    }

    pub fn incr_datagrams(&self) -> u64 {
        self.incr_datagrams
    }

    pub fn snap_datagrams(&self) -> u64 {
        self.snap_datagrams
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn lost_total(&self) -> u64 {
        self.lost_total
    }

    pub fn lost_events(&self) -> u32 {
        self.lost_events
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "=== Feed Statistics ===");
        let _ = writeln!(
            s,
            "Datagrams: {} incremental, {} snapshot",
            self.incr_datagrams, self.snap_datagrams
        );
        let _ = writeln!(s, "Bytes: {}", self.total_bytes);
        let _ = writeln!(s, "Elapsed: {:?}", self.elapsed());
        let _ = writeln!(s, "Datagrams/sec: {:.2}", self.datagrams_per_sec());
        let _ = writeln!(s, "Processed: {}", self.processed);
        let _ = writeln!(s, "Decode errors: {}", self.decode_errors);

        for (name, stats) in [
            ("Decode", self.decode_latency_stats()),
            ("Receive-to-book", self.process_latency_stats()),
        ] {
            if let Some(st) = stats {
                let _ = writeln!(s, "{} latency (us):", name);
                let _ = writeln!(
                    s,
                    "  Min: {}, Max: {}, Mean: {:.2}, P50: {}, P99: {}",
                    st.min_us, st.max_us, st.mean_us, st.p50_us, st.p99_us
                );
            }
        }

        let _ = write!(
            s,
            "Lost: {} seqnums in {} gaps",
            self.lost_total, self.lost_events
        );
        s
    }
}

impl Default for FeedStats {
    fn default() -> Self {
        Self::new()
    }
}
