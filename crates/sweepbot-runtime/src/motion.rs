//! [`MotionExecutor`] – closed-loop "move until" / "turn until".
//!
//! Every drive primitive follows the same shape: take a reading, start the
//! motor, poll the reading at a fixed period until the requested distance or
//! angle has been covered, then stop. The reading comes from a measurement
//! session ([`Tracking::Path`], [`Tracking::Object`]) or straight from the
//! odometer and heading tracker ([`Tracking::Direct`]).
//!
//! Each call is bounded by [`MotionConfig::max_duration_ms`]. A robot that
//! cannot make progress (stalled wheels, dead encoder) yields
//! [`RoverError::MotionTimeout`] carrying how far it did get, so the caller
//! can retry the remainder.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sweepbot_kernel::{ActuationGate, HeadingTracker, MeasurementSessions, MotionLease};
use sweepbot_perception::heading::angle_diff;
use sweepbot_types::{Axis, DriveCommand, RoverError, SessionMode};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Current time on the runtime clock, as a std instant for the sensor
/// layers.
pub(crate) fn clock_now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Polling and timeout parameters shared by every move and turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub poll_period_ms: u64,
    /// Upper bound on one move or turn before it is abandoned.
    pub max_duration_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: 100,
            max_duration_ms: 30_000,
        }
    }
}

impl MotionConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms.max(1))
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

/// One drive primitive. Distances in cm, angles in degrees; the amount is
/// always a magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Forward(f32),
    Backward(f32),
    TurnLeft(f32),
    TurnRight(f32),
}

impl Motion {
    /// Turn by a signed angle: positive is counter-clockwise (left).
    pub fn turn(deg: f32) -> Self {
        if deg >= 0.0 {
            Motion::TurnLeft(deg)
        } else {
            Motion::TurnRight(-deg)
        }
    }

    pub fn command(self) -> DriveCommand {
        match self {
            Motion::Forward(_) => DriveCommand::MoveForward,
            Motion::Backward(_) => DriveCommand::MoveBackward,
            Motion::TurnLeft(_) => DriveCommand::TurnLeft,
            Motion::TurnRight(_) => DriveCommand::TurnRight,
        }
    }

    pub fn amount(self) -> f32 {
        match self {
            Motion::Forward(a) | Motion::Backward(a) | Motion::TurnLeft(a) | Motion::TurnRight(a) => a,
        }
    }

    pub fn is_turn(self) -> bool {
        matches!(self, Motion::TurnLeft(_) | Motion::TurnRight(_))
    }

    /// Signed heading change this motion is meant to produce.
    pub fn heading_change(self) -> Option<f32> {
        match self {
            Motion::TurnLeft(a) => Some(a),
            Motion::TurnRight(a) => Some(-a),
            _ => None,
        }
    }

    /// Same motion with `achieved` already covered.
    pub fn remaining(self, achieved: f32) -> Self {
        let rest = (self.amount() - achieved).max(0.0);
        match self {
            Motion::Forward(_) => Motion::Forward(rest),
            Motion::Backward(_) => Motion::Backward(rest),
            Motion::TurnLeft(_) => Motion::TurnLeft(rest),
            Motion::TurnRight(_) => Motion::TurnRight(rest),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Motion::Forward(_) => "move_forward",
            Motion::Backward(_) => "move_backward",
            Motion::TurnLeft(_) => "turn_left",
            Motion::TurnRight(_) => "turn_right",
        }
    }
}

/// Where a motion's progress is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    /// The path session for this axis.
    Path(Axis),
    /// The object session.
    Object,
    /// The odometer and heading tracker, bypassing sessions.
    Direct,
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    distance_cm: f32,
    angle_deg: f32,
}

/// Runs closed-loop motions against the shared gate and sessions. Cheap to
/// clone.
#[derive(Clone)]
pub struct MotionExecutor {
    gate: ActuationGate,
    sessions: Arc<MeasurementSessions>,
    config: MotionConfig,
    stop: Arc<AtomicBool>,
}

impl MotionExecutor {
    pub fn new(gate: ActuationGate, sessions: Arc<MeasurementSessions>, config: MotionConfig) -> Self {
        Self {
            gate,
            sessions,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort running motions with [`RoverError::Interrupted`] once `stop` is
    /// set.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn gate(&self) -> &ActuationGate {
        &self.gate
    }

    pub fn sessions(&self) -> &Arc<MeasurementSessions> {
        &self.sessions
    }

    pub fn tracker(&self) -> &Arc<HeadingTracker> {
        self.sessions.tracker()
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Acquire the drive base for `owner` and run `motion`.
    ///
    /// Returns the distance or angle actually covered.
    pub async fn execute(
        &self,
        owner: &'static str,
        motion: Motion,
        tracking: Tracking,
    ) -> Result<f32, RoverError> {
        let mut lease = self.gate.acquire(owner).await;
        self.execute_leased(&mut lease, motion, tracking).await
    }

    /// Run `motion` on an already held lease.
    ///
    /// # Errors
    ///
    /// - [`RoverError::MotionTimeout`] if the target is not reached within
    ///   the configured bound. The motor has been stopped.
    /// - [`RoverError::Interrupted`] if the stop flag was raised.
    /// - [`RoverError::HardwareFault`] from the drive.
    pub async fn execute_leased(
        &self,
        lease: &mut MotionLease,
        motion: Motion,
        tracking: Tracking,
    ) -> Result<f32, RoverError> {
        let target = motion.amount();
        if target <= 0.0 {
            return Ok(0.0);
        }

        let started = Instant::now();
        let origin = self.read(tracking, started);
        lease.start(motion.command())?;
        debug!(motion = motion.name(), target, ?tracking, owner = lease.owner(), "motion started");

        let mut ticker = tokio::time::interval(self.config.poll_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let now = Instant::now();
            let achieved = self.progress(motion, tracking, origin, now);

            if achieved >= target {
                lease.stop()?;
                debug!(motion = motion.name(), target, achieved, "motion complete");
                return Ok(achieved);
            }

            if self.stop_requested() {
                lease.stop()?;
                debug!(motion = motion.name(), achieved, "motion interrupted");
                return Err(RoverError::Interrupted);
            }

            let elapsed = now.duration_since(started);
            if elapsed >= self.config.max_duration() {
                lease.stop()?;
                warn!(motion = motion.name(), target, achieved, elapsed_ms = elapsed.as_millis() as u64, "motion timed out");
                return Err(RoverError::MotionTimeout {
                    motion: motion.name().to_string(),
                    target,
                    achieved,
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
        }
    }

    fn read(&self, tracking: Tracking, at: Instant) -> Reading {
        let now = at.into_std();
        match tracking {
            Tracking::Path(axis) => self.session_reading(axis.session_mode(), now),
            Tracking::Object => self.session_reading(SessionMode::Object, now),
            Tracking::Direct => Reading {
                angle_deg: self.tracker().sample(now),
                distance_cm: self.sessions.odometer().distance_cm(),
            },
        }
    }

    fn session_reading(&self, mode: SessionMode, now: std::time::Instant) -> Reading {
        let delta = self.sessions.update(mode, now);
        Reading {
            distance_cm: delta.distance_cm,
            angle_deg: delta.angle_deg,
        }
    }

    fn progress(&self, motion: Motion, tracking: Tracking, origin: Reading, at: Instant) -> f32 {
        let current = self.read(tracking, at);
        if motion.is_turn() {
            angle_diff(current.angle_deg, origin.angle_deg).abs()
        } else {
            (current.distance_cm - origin.distance_cm).abs()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Rig, rig};
    use std::time::Duration;

    #[test]
    fn turn_sign_selects_direction() {
        assert_eq!(Motion::turn(30.0), Motion::TurnLeft(30.0));
        assert_eq!(Motion::turn(-30.0), Motion::TurnRight(30.0));
        assert_eq!(Motion::TurnRight(30.0).heading_change(), Some(-30.0));
        assert_eq!(Motion::Forward(10.0).heading_change(), None);
        assert_eq!(Motion::Forward(10.0).remaining(4.0), Motion::Forward(6.0));
        assert_eq!(Motion::TurnLeft(10.0).remaining(12.0), Motion::TurnLeft(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn forward_reaches_target_and_stops() {
        let Rig { robot, executor, .. } = rig(MotionConfig::default());

        let achieved = executor
            .execute("test", Motion::Forward(10.0), Tracking::Direct)
            .await
            .unwrap();

        // 5 cm/s polled at 10 Hz overshoots by at most one poll.
        assert!((10.0..10.6).contains(&achieved), "achieved {achieved}");
        assert!((robot.travelled_cm() - achieved).abs() < 0.1);
        assert_eq!(
            robot.commands(),
            vec![DriveCommand::MoveForward, DriveCommand::StopMoving]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn turn_is_measured_by_heading() {
        let Rig { robot, executor, .. } = rig(MotionConfig::default());

        let achieved = executor
            .execute("test", Motion::TurnRight(90.0), Tracking::Direct)
            .await
            .unwrap();

        assert!(achieved >= 90.0);
        assert!((robot.heading_deg() + 90.0).abs() < 6.0);
        assert_eq!(
            robot.commands(),
            vec![DriveCommand::TurnRight, DriveCommand::StopTurning]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_wheels_time_out_within_bound() {
        let Rig { robot, executor, .. } = rig(MotionConfig {
            poll_period_ms: 100,
            max_duration_ms: 2_000,
        });
        robot.stall_wheels(true);

        let started = Instant::now();
        let err = executor
            .execute("test", Motion::Forward(50.0), Tracking::Direct)
            .await
            .unwrap_err();

        match err {
            RoverError::MotionTimeout {
                motion,
                target,
                achieved,
                elapsed_ms,
            } => {
                assert_eq!(motion, "move_forward");
                assert_eq!(target, 50.0);
                assert_eq!(achieved, 0.0);
                assert!((2_000..2_200).contains(&elapsed_ms));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(started.elapsed() <= Duration::from_millis(2_200));
        assert_eq!(
            robot.commands(),
            vec![DriveCommand::MoveForward, DriveCommand::StopMoving]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn path_tracking_measures_session_delta() {
        let Rig {
            executor, sessions, ..
        } = rig(MotionConfig::default());

        sessions
            .start(SessionMode::PathY, clock_now())
            .unwrap();
        executor
            .execute("test", Motion::Forward(5.0), Tracking::Path(Axis::Y))
            .await
            .unwrap();
        executor
            .execute("test", Motion::Forward(5.0), Tracking::Path(Axis::Y))
            .await
            .unwrap();

        let y = sessions.update(SessionMode::PathY, clock_now()).distance_cm;
        assert!((10.0..11.2).contains(&y), "path y {y}");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flag_interrupts_motion() {
        let Rig {
            robot,
            executor,
            stop,
            ..
        } = rig(MotionConfig::default());

        let flag = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            flag.store(true, Ordering::Relaxed);
        });

        let err = executor
            .execute("test", Motion::Forward(100.0), Tracking::Direct)
            .await
            .unwrap_err();
        assert_eq!(err, RoverError::Interrupted);
        assert!(!robot.is_moving());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_target_is_a_no_op() {
        let Rig { robot, executor, .. } = rig(MotionConfig::default());
        let achieved = executor
            .execute("test", Motion::Backward(0.0), Tracking::Direct)
            .await
            .unwrap();
        assert_eq!(achieved, 0.0);
        assert!(robot.commands().is_empty());
    }
}
