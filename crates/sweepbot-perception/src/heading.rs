//! Gyro heading estimation.
//!
//! [`HeadingFilter`] integrates the yaw rate after a first-order low-pass
//! filter and a deadzone:
//!
//! ```text
//! filtered  = α · raw + (1 − α) · filtered
//! filtered  = 0                       if |filtered| < deadzone
//! heading  += filtered · dt
//! ```
//!
//! The deadzone removes the gyro's resting bias so a stationary robot does
//! not drift. Headings, session deltas and object bearings all share the
//! `(−180°, 180°]` range produced by [`normalize_deg`].
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use sweepbot_perception::heading::{HeadingFilter, HeadingFilterConfig};
//!
//! let mut filter = HeadingFilter::new(HeadingFilterConfig { alpha: 1.0, deadzone: 0.2 });
//! let t0 = Instant::now();
//! filter.update(Some(90.0), t0);
//! filter.update(Some(90.0), t0 + Duration::from_millis(500));
//! assert!((filter.angle() - 45.0).abs() < 1e-3);
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Wrap any angle in degrees into `(−180, 180]`.
pub fn normalize_deg(angle: f32) -> f32 {
    // rem_euclid may round up to exactly 360.0 for tiny negative inputs.
    let r = angle.rem_euclid(360.0);
    if r > 180.0 { r - 360.0 } else { r }
}

/// Signed shortest rotation from `from` to `to`, in `(−180, 180]`.
pub fn angle_diff(to: f32, from: f32) -> f32 {
    normalize_deg(to - from)
}

/// Tunables of the heading filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingFilterConfig {
    /// Low-pass coefficient; 1.0 disables filtering.
    pub alpha: f32,
    /// Filtered rates below this magnitude (deg/s) are treated as zero.
    pub deadzone: f32,
}

impl Default for HeadingFilterConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            deadzone: 0.2,
        }
    }
}

/// Low-pass, deadzoned yaw-rate integrator.
#[derive(Debug, Clone)]
pub struct HeadingFilter {
    config: HeadingFilterConfig,
    filtered_rate: f32,
    integrated_angle: f32,
    last_sample: Option<Instant>,
}

impl HeadingFilter {
    pub fn new(config: HeadingFilterConfig) -> Self {
        Self {
            config,
            filtered_rate: 0.0,
            integrated_angle: 0.0,
            last_sample: None,
        }
    }

    /// Feed one yaw-rate sample (deg/s, positive counter-clockwise) taken at
    /// `now`, and return the updated heading.
    ///
    /// `None` is a dropout: nothing changes, including the sample clock, so
    /// the next real sample integrates over the whole gap. The first sample
    /// only seeds the clock and the filter. A sample stamped at or before
    /// the last one is stale and ignored, so no interval is integrated twice.
    pub fn update(&mut self, rate: Option<f32>, now: Instant) -> f32 {
        let Some(raw) = rate else {
            return self.integrated_angle;
        };
        if self.last_sample.is_some_and(|last| now <= last) {
            return self.integrated_angle;
        }

        let alpha = self.config.alpha;
        self.filtered_rate = alpha * raw + (1.0 - alpha) * self.filtered_rate;
        if self.filtered_rate.abs() < self.config.deadzone {
            self.filtered_rate = 0.0;
        }

        if let Some(last) = self.last_sample {
            let dt = now.duration_since(last).as_secs_f32();
            self.integrated_angle = normalize_deg(self.integrated_angle + self.filtered_rate * dt);
        }
        self.last_sample = Some(now);
        self.integrated_angle
    }

    /// Current heading in `(−180, 180]`.
    pub fn angle(&self) -> f32 {
        self.integrated_angle
    }

    pub fn filtered_rate(&self) -> f32 {
        self.filtered_rate
    }

    pub fn last_sample(&self) -> Option<Instant> {
        self.last_sample
    }
}

impl Default for HeadingFilter {
    fn default() -> Self {
        Self::new(HeadingFilterConfig::default())
    }
}
