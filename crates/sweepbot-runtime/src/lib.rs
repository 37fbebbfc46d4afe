//! `sweepbot-runtime` – the sweep engine.
//!
//! Drives the robot: closed-loop motion primitives, the coverage state
//! machine, and the background heading hold that runs beside it.
//!
//! # Modules
//!
//! - [`motion`] – [`MotionExecutor`][motion::MotionExecutor]: "move until" /
//!   "turn until" against a measurement session, bounded by a timeout and a
//!   cooperative stop flag.
//! - [`navigation`] – [`NavigationController`][navigation::NavigationController]:
//!   boustrophedon sweep, object approach / collection / detour, lane turns.
//! - [`heading_correction`] –
//!   [`HeadingCorrectionLoop`][heading_correction::HeadingCorrectionLoop] and
//!   [`spawn_supervised`][heading_correction::spawn_supervised]: keeps the
//!   heading on its reference and restarts itself on failure.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.

pub mod heading_correction;
pub mod motion;
pub mod navigation;
pub mod telemetry;

#[cfg(test)]
mod testkit;

pub use heading_correction::{CorrectionConfig, HeadingCorrectionLoop, Supervised, spawn_supervised};
pub use motion::{Motion, MotionConfig, MotionExecutor, Tracking};
pub use navigation::{CycleReport, Handling, NavigationConfig, NavigationController, NavigationState, Phase};
pub use telemetry::{TracerProviderGuard, init_tracing};
