//! Generic `RateSource` trait for gyroscopes.

use sweepbot_types::AngularRate;

/// An inertial sensor that reports angular velocity.
pub trait RateSource: Send {
    /// Return the latest 3-axis angular rate in degrees per second, or
    /// `None` when no new sample is available.
    fn read_rate(&mut self) -> Option<AngularRate>;
}
