//! `sweepbot-perception` – dead reckoning and object detection.
//!
//! Turns raw encoder edges, gyroscope rates and rangefinder samples into the
//! quantities the navigation layer steers by: distance travelled, heading,
//! and the nearest object ahead.
//!
//! # Modules
//!
//! - [`encoder`] – [`EncoderChannel`][encoder::EncoderChannel]: lock-free,
//!   debounced pulse counter fed from the encoder interrupt.
//! - [`odometry`] – [`Odometer`][odometry::Odometer]: converts both channels'
//!   counts into signed distance using an
//!   [`EncoderCalibration`][odometry::EncoderCalibration].
//! - [`heading`] – [`HeadingFilter`][heading::HeadingFilter]: low-pass,
//!   deadzoned gyro integration, and the single angle convention
//!   ([`normalize_deg`][heading::normalize_deg]) used across the workspace.
//! - [`scan`] – [`ScanClusterer`][scan::ScanClusterer]: revolution batching,
//!   clustering, merging and de-duplication of rangefinder samples into
//!   [`DetectedObject`][sweepbot_types::DetectedObject]s.

pub mod encoder;
pub mod heading;
pub mod odometry;
pub mod scan;
