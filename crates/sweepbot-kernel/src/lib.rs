//! `sweepbot-kernel` – shared-state arbitration.
//!
//! The odometer, the heading filter and the drive base are each shared by
//! the navigation controller and the heading-correction loop. This crate
//! owns the rules for that sharing; it does not decide where to drive.
//!
//! # Modules
//!
//! - [`tracker`] – [`HeadingTracker`][tracker::HeadingTracker]: one mutex
//!   around the heading filter and its gyro, so integration steps never
//!   overlap, plus the reference heading the correction loop steers to.
//! - [`session`] – [`MeasurementSessions`][session::MeasurementSessions]:
//!   the session table multiplexing odometry and heading across path and
//!   object tracking.
//! - [`gate`] – [`ActuationGate`][gate::ActuationGate]: the single owner of
//!   the drive base. Motion happens only while holding a
//!   [`MotionLease`][gate::MotionLease].
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: heartbeat deadlines for
//!   background tasks so a supervisor can restart a frozen one.

pub mod gate;
pub mod session;
pub mod tracker;
pub mod watchdog;

pub use gate::{ActuationGate, MotionLease};
pub use session::{MeasurementSessions, SessionDelta};
pub use tracker::HeadingTracker;
pub use watchdog::{ComponentHealth, Watchdog};
