//! Debounced quadrature pulse counter.
//!
//! One [`EncoderChannel`] exists per wheel for the lifetime of the process.
//! The interrupt handler calls [`EncoderChannel::on_edge`] on every rising
//! edge of channel A; everything else only reads the count. All state is
//! atomic, so the edge path never blocks.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sweepbot_hal::EdgeSink;

/// Marker stored in `last_edge_us` before the first accepted edge.
const NO_EDGE: u64 = u64::MAX;

/// Signed pulse counter for one wheel.
#[derive(Debug)]
pub struct EncoderChannel {
    name: &'static str,
    pulse_count: AtomicI64,
    /// Time of the last accepted edge, µs since `epoch`.
    last_edge_us: AtomicU64,
    /// Instant of the very first edge; timestamps are stored relative to it.
    epoch: OnceLock<Instant>,
    min_interval_us: u64,
}

impl EncoderChannel {
    /// Create a channel that ignores edges closer together than
    /// `min_pulse_interval`.
    pub fn new(name: &'static str, min_pulse_interval: Duration) -> Self {
        Self {
            name,
            pulse_count: AtomicI64::new(0),
            last_edge_us: AtomicU64::new(NO_EDGE),
            epoch: OnceLock::new(),
            min_interval_us: min_pulse_interval.as_micros() as u64,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Net signed pulse count since start-up.
    pub fn count(&self) -> i64 {
        self.pulse_count.load(Ordering::Acquire)
    }

    /// Record a channel-A edge observed at `at`.
    ///
    /// Channel B high means the wheel turns backwards (−1), low means
    /// forwards (+1). Edges arriving within the debounce interval of the
    /// previous accepted edge are dropped.
    pub fn on_edge(&self, level_b: bool, at: Instant) {
        let epoch = *self.epoch.get_or_init(|| at);
        let now_us = at.saturating_duration_since(epoch).as_micros() as u64;

        let accepted = self
            .last_edge_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                if last == NO_EDGE || now_us.saturating_sub(last) >= self.min_interval_us {
                    Some(now_us)
                } else {
                    None
                }
            })
            .is_ok();

        if accepted {
            let delta = if level_b { -1 } else { 1 };
            self.pulse_count.fetch_add(delta, Ordering::AcqRel);
        }
    }
}

impl EdgeSink for EncoderChannel {
    fn on_edge(&self, level_b: bool, at: Instant) {
        EncoderChannel::on_edge(self, level_b, at);
    }
}
