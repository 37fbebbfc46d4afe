//! Receiver side of the wheel-encoder interrupt lines.

use std::time::Instant;

/// Something that accepts channel-A edges of a quadrature encoder.
///
/// Implementations run in interrupt context: they must return quickly and
/// must not block.
pub trait EdgeSink: Send + Sync {
    /// Record one channel-A edge. `level_b` is the level of channel B at the
    /// moment of the edge and selects the direction of travel.
    fn on_edge(&self, level_b: bool, at: Instant);
}
