//! `sweepbot-hal` – Hardware Abstraction Layer
//!
//! The core never talks to GPIO pins, I²C registers or serial ports directly.
//! Every piece of hardware is reached through one of the traits below, so
//! real drivers and the in-process simulator are interchangeable.
//!
//! # Modules
//!
//! - [`drive`] – [`DriveActuator`][drive::DriveActuator]: the seven-state
//!   motor controller (move, turn, stop, collect).
//! - [`encoder`] – [`EdgeSink`][encoder::EdgeSink]: receiver of quadrature
//!   channel-A edges from the wheel encoders.
//! - [`imu`] – [`RateSource`][imu::RateSource]: gyroscope angular-rate
//!   samples.
//! - [`ranging`] – [`RangeSource`][ranging::RangeSource] and the scoped
//!   [`ScanGuard`][ranging::ScanGuard] that always stops the rangefinder.
//! - [`camera`] / [`classifier`] – image capture, the garbage classifier and
//!   the tall-object corroboration check.
//! - [`peripherals`] – [`Peripherals`][peripherals::Peripherals]: the bundle
//!   of perception drivers handed to the navigation controller.
//! - [`sim`] – [`SimRobot`][sim::SimRobot]: kinematic simulator for tests
//!   and headless runs.

pub mod camera;
pub mod classifier;
pub mod drive;
pub mod encoder;
pub mod imu;
pub mod peripherals;
pub mod ranging;
pub mod sim;

pub use camera::{Camera, CameraFrame};
pub use classifier::{Classification, GarbageClassifier, TallObjectCheck};
pub use drive::DriveActuator;
pub use encoder::EdgeSink;
pub use imu::RateSource;
pub use peripherals::Peripherals;
pub use ranging::{RangeSource, ScanGuard};
