//! [`HeadingTracker`] – serialised access to the heading filter.
//!
//! Both the navigation controller and the correction loop need fresh heading
//! estimates. Each call to [`HeadingTracker::sample`] reads the gyro and
//! runs one integration step under a single mutex, and the step always
//! integrates from the filter's own last sample time. Two callers therefore
//! never integrate the same interval twice.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use sweepbot_hal::RateSource;
use sweepbot_perception::heading::{HeadingFilter, angle_diff, normalize_deg};
use tracing::trace;

struct TrackerState {
    filter: HeadingFilter,
    source: Box<dyn RateSource>,
    reference_deg: f32,
}

/// Heading estimate shared across tasks, plus the reference heading the
/// robot is meant to hold.
pub struct HeadingTracker {
    state: Mutex<TrackerState>,
}

impl HeadingTracker {
    pub fn new(filter: HeadingFilter, source: Box<dyn RateSource>) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                filter,
                source,
                reference_deg: 0.0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the gyro and integrate up to `now`. Returns the new heading.
    pub fn sample(&self, now: Instant) -> f32 {
        let mut s = self.lock();
        let rate = s.source.read_rate().map(|r| r.z);
        let heading = s.filter.update(rate, now);
        trace!(rate = ?rate, heading, "heading sample");
        heading
    }

    /// Last integrated heading, without sampling.
    pub fn heading(&self) -> f32 {
        self.lock().filter.angle()
    }

    pub fn reference(&self) -> f32 {
        self.lock().reference_deg
    }

    pub fn set_reference(&self, deg: f32) {
        self.lock().reference_deg = normalize_deg(deg);
    }

    /// Rotate the reference by `delta_deg`. Called for every intentional
    /// turn so the correction loop does not undo it.
    pub fn shift_reference(&self, delta_deg: f32) {
        let mut s = self.lock();
        s.reference_deg = normalize_deg(s.reference_deg + delta_deg);
    }

    /// Signed offset of the current heading from the reference. Positive
    /// means the robot has drifted counter-clockwise.
    pub fn deviation(&self) -> f32 {
        let s = self.lock();
        angle_diff(s.filter.angle(), s.reference_deg)
    }
}
