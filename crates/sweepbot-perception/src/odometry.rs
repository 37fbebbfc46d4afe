//! Wheel odometry.
//!
//! [`Odometer`] is a pure view over the two [`EncoderChannel`]s: it holds no
//! state of its own beyond the calibration, so any number of readers can
//! share it.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::encoder::EncoderChannel;

/// Physical parameters of the wheel encoders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderCalibration {
    pub wheel_radius_cm: f32,
    /// Channel-A pulses per wheel revolution.
    pub pulses_per_rev: u32,
    /// Edges counted per pulse by the decoder.
    pub decode_factor: u32,
    /// Debounce floor between accepted edges, microseconds.
    pub min_pulse_interval_us: u64,
}

impl Default for EncoderCalibration {
    fn default() -> Self {
        Self {
            wheel_radius_cm: 3.65,
            pulses_per_rev: 12,
            decode_factor: 2,
            min_pulse_interval_us: 1_000,
        }
    }
}

impl EncoderCalibration {
    /// Linear travel represented by one counted pulse.
    pub fn cm_per_pulse(&self) -> f32 {
        let per_rev = (self.pulses_per_rev * self.decode_factor).max(1);
        2.0 * PI * self.wheel_radius_cm / per_rev as f32
    }

    pub fn min_pulse_interval(&self) -> Duration {
        Duration::from_micros(self.min_pulse_interval_us)
    }

    /// Build the left/right channel pair for this calibration.
    pub fn channels(&self) -> (Arc<EncoderChannel>, Arc<EncoderChannel>) {
        (
            Arc::new(EncoderChannel::new("left", self.min_pulse_interval())),
            Arc::new(EncoderChannel::new("right", self.min_pulse_interval())),
        )
    }
}

/// Converts the left/right pulse counts into cumulative signed distance.
#[derive(Debug, Clone)]
pub struct Odometer {
    left: Arc<EncoderChannel>,
    right: Arc<EncoderChannel>,
    cm_per_pulse: f32,
}

impl Odometer {
    pub fn new(
        left: Arc<EncoderChannel>,
        right: Arc<EncoderChannel>,
        calibration: &EncoderCalibration,
    ) -> Self {
        Self {
            left,
            right,
            cm_per_pulse: calibration.cm_per_pulse(),
        }
    }

    /// Raw `(left, right)` pulse counts.
    pub fn counts(&self) -> (i64, i64) {
        (self.left.count(), self.right.count())
    }

    /// Average of both wheels, in centimetres, since start-up.
    pub fn distance_cm(&self) -> f32 {
        let (l, r) = self.counts();
        (l + r) as f32 / 2.0 * self.cm_per_pulse
    }

    pub fn cm_per_pulse(&self) -> f32 {
        self.cm_per_pulse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn default_calibration_matches_hardware() {
        let cal = EncoderCalibration::default();
        // 2π · 3.65 / 24
        assert!((cal.cm_per_pulse() - 0.955_59).abs() < 1e-4);
        assert_eq!(cal.min_pulse_interval(), Duration::from_millis(1));
    }

    #[test]
    fn distance_is_mean_of_both_channels() {
        let cal = EncoderCalibration::default();
        let (left, right) = cal.channels();
        let odo = Odometer::new(left.clone(), right.clone(), &cal);

        let t0 = Instant::now();
        for i in 0..8 {
            left.on_edge(false, t0 + Duration::from_millis(5 * i));
        }
        for i in 0..4 {
            right.on_edge(false, t0 + Duration::from_millis(5 * i));
        }
        assert_eq!(odo.counts(), (8, 4));
        assert_eq!(odo.distance_cm(), 6.0 * cal.cm_per_pulse());
    }

    #[test]
    fn spin_in_place_nets_zero() {
        let cal = EncoderCalibration::default();
        let (left, right) = cal.channels();
        let odo = Odometer::new(left.clone(), right.clone(), &cal);

        let t0 = Instant::now();
        for i in 0..5 {
            left.on_edge(true, t0 + Duration::from_millis(5 * i));
            right.on_edge(false, t0 + Duration::from_millis(5 * i));
        }
        assert_eq!(odo.distance_cm(), 0.0);
    }
}
