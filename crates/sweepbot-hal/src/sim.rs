//! In-process kinematic simulator for CI/CD testing without physical hardware.
//!
//! [`SimRobot`] owns a tiny world model (drive state, true heading, a LiDAR
//! script and a queue of classifier verdicts) and hands out driver handles
//! that implement the HAL traits against it. A physics task advances the
//! model on a fixed step and emits encoder edges into the same
//! [`EdgeSink`]s the real interrupt handlers would feed.
//!
//! Everything runs on tokio time, so tests can use a paused clock and let
//! minutes of driving elapse instantly.
//!
//! # Example
//!
//! ```rust,ignore
//! let robot = SimRobot::new(SimConfig::default(), cm_per_pulse, left, right);
//! robot.push_revolution(arc_points(300.0, 800.0, 15, 4.0));
//! let physics = robot.spawn_physics(stop.clone());
//! let drive = robot.drive();
//! let gyro = robot.gyro();
//! let peripherals = robot.peripherals();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sweepbot_types::{AngularRate, DriveCommand, RoverError, ScanPoint};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::camera::{Camera, CameraFrame};
use crate::classifier::{Classification, GarbageClassifier, TallObjectCheck};
use crate::drive::DriveActuator;
use crate::encoder::EdgeSink;
use crate::imu::RateSource;
use crate::peripherals::Peripherals;
use crate::ranging::RangeSource;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Kinematic parameters of the simulated robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ground speed while moving forward or backward, cm/s.
    pub linear_speed_cm_s: f32,
    /// Spin rate while turning in place, deg/s.
    pub turn_rate_deg_s: f32,
    /// Distance between the two drive wheels, cm.
    pub track_width_cm: f32,
    /// Physics integration step, milliseconds.
    pub physics_step_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            linear_speed_cm_s: 10.0,
            turn_rate_deg_s: 45.0,
            track_width_cm: 15.0,
            physics_step_ms: 5,
        }
    }
}

/// `count` evenly spaced returns at `distance_mm`, spread over
/// `center_deg ± spread_deg`. Handy for scripting LiDAR revolutions.
pub fn arc_points(center_deg: f32, distance_mm: f32, count: usize, spread_deg: f32) -> Vec<ScanPoint> {
    if count == 0 {
        return Vec::new();
    }
    let step = if count > 1 {
        2.0 * spread_deg / (count - 1) as f32
    } else {
        0.0
    };
    (0..count)
        .map(|i| {
            let angle = center_deg - spread_deg + step * i as f32;
            ScanPoint::new(angle.rem_euclid(360.0), distance_mm, 15)
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// World model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SimState {
    motion: Option<DriveCommand>,
    /// Ground-truth heading, degrees, positive counter-clockwise.
    heading_deg: f32,
    /// Ground-truth signed distance driven, cm.
    travelled_cm: f32,
    /// Sub-pulse wheel travel carried between physics steps, cm.
    residual_cm: [f32; 2],
    wheels_stalled: bool,
    gyro_dropout: bool,
    fail_drive: bool,
    commands: Vec<DriveCommand>,
    revolutions: VecDeque<Vec<ScanPoint>>,
    pending: VecDeque<ScanPoint>,
    scanning: bool,
    scans_started: usize,
    verdicts: VecDeque<Option<Classification>>,
    tall_verdicts: VecDeque<Option<bool>>,
}

fn wrap_deg(a: f32) -> f32 {
    let r = a.rem_euclid(360.0);
    if r > 180.0 { r - 360.0 } else { r }
}

/// Shared handle to the simulated robot. Cloning is cheap; all clones see
/// the same world.
#[derive(Clone)]
pub struct SimRobot {
    config: SimConfig,
    cm_per_pulse: f32,
    state: Arc<Mutex<SimState>>,
    left: Arc<dyn EdgeSink>,
    right: Arc<dyn EdgeSink>,
}

impl SimRobot {
    /// Build a simulator whose wheels feed `left` and `right`. `cm_per_pulse`
    /// must match the odometer calibration so simulated travel and measured
    /// travel agree.
    pub fn new(
        config: SimConfig,
        cm_per_pulse: f32,
        left: Arc<dyn EdgeSink>,
        right: Arc<dyn EdgeSink>,
    ) -> Self {
        Self {
            config,
            cm_per_pulse,
            state: Arc::new(Mutex::new(SimState::default())),
            left,
            right,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Driver handles ───────────────────────────────────────────────────

    pub fn drive(&self) -> Box<dyn DriveActuator> {
        Box::new(SimDrive {
            robot: self.clone(),
        })
    }

    pub fn gyro(&self) -> Box<dyn RateSource> {
        Box::new(SimGyro {
            robot: self.clone(),
        })
    }

    /// LiDAR, camera, classifier and tall-object check bundled for the
    /// navigation controller.
    pub fn peripherals(&self) -> Peripherals {
        Peripherals::new(
            Box::new(SimLidar {
                robot: self.clone(),
            }),
            Box::new(SimCamera {
                id: "sim_camera".to_string(),
            }),
            Box::new(SimClassifier {
                robot: self.clone(),
            }),
            Box::new(SimTallCheck {
                robot: self.clone(),
            }),
        )
    }

    // ── Physics ──────────────────────────────────────────────────────────

    /// Spawn the physics task. It advances the world every
    /// `physics_step_ms` until `stop` is set.
    pub fn spawn_physics(&self, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let robot = self.clone();
        let step = Duration::from_millis(self.config.physics_step_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(step);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while !stop.load(Ordering::Relaxed) {
                ticker.tick().await;
                robot.step(step, tokio::time::Instant::now().into_std());
            }
        })
    }

    /// Advance the world by `dt`, ending at `now`, and emit the encoder
    /// edges produced during the step.
    pub fn step(&self, dt: Duration, now: Instant) {
        let (left_pulses, right_pulses) = {
            let mut s = self.lock();
            if s.wheels_stalled {
                return;
            }
            let secs = dt.as_secs_f32();
            let linear = self.config.linear_speed_cm_s * secs;
            let yaw = self.config.turn_rate_deg_s * secs;
            let arc = yaw.to_radians() * self.config.track_width_cm / 2.0;
            let (dl, dr, dyaw) = match s.motion {
                Some(DriveCommand::MoveForward) => (linear, linear, 0.0),
                Some(DriveCommand::MoveBackward) => (-linear, -linear, 0.0),
                Some(DriveCommand::TurnLeft) => (-arc, arc, yaw),
                Some(DriveCommand::TurnRight) => (arc, -arc, -yaw),
                _ => return,
            };
            s.heading_deg = wrap_deg(s.heading_deg + dyaw);
            s.travelled_cm += (dl + dr) / 2.0;
            s.residual_cm[0] += dl;
            s.residual_cm[1] += dr;
            let cpp = self.cm_per_pulse;
            let nl = (s.residual_cm[0] / cpp).trunc() as i64;
            let nr = (s.residual_cm[1] / cpp).trunc() as i64;
            s.residual_cm[0] -= nl as f32 * cpp;
            s.residual_cm[1] -= nr as f32 * cpp;
            (nl, nr)
        };
        emit_edges(&*self.left, left_pulses, dt, now);
        emit_edges(&*self.right, right_pulses, dt, now);
    }

    // ── Scripting ────────────────────────────────────────────────────────

    /// Queue one LiDAR revolution. Revolutions are replayed in order; once
    /// the script is exhausted the LiDAR sees an empty field.
    pub fn push_revolution(&self, mut points: Vec<ScanPoint>) {
        points.sort_by(|a, b| a.angle_deg.total_cmp(&b.angle_deg));
        self.lock().revolutions.push_back(points);
    }

    /// Queue one classifier verdict. Without a scripted verdict the
    /// classifier reports garbage with high confidence.
    pub fn push_verdict(&self, verdict: Option<Classification>) {
        self.lock().verdicts.push_back(verdict);
    }

    /// Queue one tall-object verdict. Without a scripted verdict the check
    /// reports "not tall".
    pub fn push_tall_verdict(&self, verdict: Option<bool>) {
        self.lock().tall_verdicts.push_back(verdict);
    }

    pub fn stall_wheels(&self, stalled: bool) {
        self.lock().wheels_stalled = stalled;
    }

    pub fn set_gyro_dropout(&self, dropout: bool) {
        self.lock().gyro_dropout = dropout;
    }

    /// Make every subsequent drive command fail with a hardware fault.
    pub fn fail_drive(&self, fail: bool) {
        self.lock().fail_drive = fail;
    }

    // ── Observation ──────────────────────────────────────────────────────

    /// Every drive command accepted so far, in order.
    pub fn commands(&self) -> Vec<DriveCommand> {
        self.lock().commands.clone()
    }

    pub fn heading_deg(&self) -> f32 {
        self.lock().heading_deg
    }

    pub fn travelled_cm(&self) -> f32 {
        self.lock().travelled_cm
    }

    pub fn is_moving(&self) -> bool {
        self.lock().motion.is_some()
    }

    pub fn is_scanning(&self) -> bool {
        self.lock().scanning
    }

    pub fn scans_started(&self) -> usize {
        self.lock().scans_started
    }
}

fn emit_edges(sink: &dyn EdgeSink, pulses: i64, dt: Duration, now: Instant) {
    let n = pulses.unsigned_abs();
    if n == 0 {
        return;
    }
    let start = now.checked_sub(dt).unwrap_or(now);
    for i in 1..=n {
        let at = start + dt.mul_f64(i as f64 / n as f64);
        // Channel B leads channel A when the wheel runs backwards.
        sink.on_edge(pulses < 0, at);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Driver handles
// ────────────────────────────────────────────────────────────────────────────

/// Simulated motor controller. Records every command.
pub struct SimDrive {
    robot: SimRobot,
}

impl DriveActuator for SimDrive {
    fn id(&self) -> &str {
        "sim_drive"
    }

    fn command(&mut self, cmd: DriveCommand) -> Result<(), RoverError> {
        let mut s = self.robot.lock();
        if s.fail_drive {
            return Err(RoverError::hardware("sim_drive", "motor lines unavailable"));
        }
        s.commands.push(cmd);
        match cmd {
            DriveCommand::MoveForward
            | DriveCommand::MoveBackward
            | DriveCommand::TurnLeft
            | DriveCommand::TurnRight => s.motion = Some(cmd),
            DriveCommand::StopMoving | DriveCommand::StopTurning => {
                if s.motion.and_then(DriveCommand::stop_command) == Some(cmd) {
                    s.motion = None;
                }
            }
            DriveCommand::Collect => {}
        }
        debug!(command = ?cmd, code = cmd.line_code(), "sim drive");
        Ok(())
    }
}

/// Simulated gyroscope. Reports the commanded spin rate while turning.
pub struct SimGyro {
    robot: SimRobot,
}

impl RateSource for SimGyro {
    fn read_rate(&mut self) -> Option<AngularRate> {
        let s = self.robot.lock();
        if s.gyro_dropout {
            return None;
        }
        let rate = self.robot.config.turn_rate_deg_s;
        let z = match s.motion {
            _ if s.wheels_stalled => 0.0,
            Some(DriveCommand::TurnLeft) => rate,
            Some(DriveCommand::TurnRight) => -rate,
            _ => 0.0,
        };
        Some(AngularRate::yaw(z))
    }
}

/// Simulated LiDAR replaying scripted revolutions.
pub struct SimLidar {
    robot: SimRobot,
}

impl RangeSource for SimLidar {
    fn start_scan(&mut self) -> Result<(), RoverError> {
        let mut s = self.robot.lock();
        s.scanning = true;
        s.scans_started += 1;
        s.pending.clear();
        Ok(())
    }

    fn stop_scan(&mut self) {
        let mut s = self.robot.lock();
        s.scanning = false;
        s.pending.clear();
    }

    fn next_sample(&mut self) -> Option<ScanPoint> {
        let mut s = self.robot.lock();
        if !s.scanning {
            return None;
        }
        if s.pending.is_empty() {
            // Bracket every revolution with no-return samples at both ends so
            // consecutive revolutions are always separated by an angle wrap.
            let rev = s.revolutions.pop_front().unwrap_or_default();
            s.pending.push_back(ScanPoint::new(0.0, 0.0, 0));
            s.pending.extend(rev);
            s.pending.push_back(ScanPoint::new(359.0, 0.0, 0));
        }
        s.pending.pop_front()
    }
}

/// Simulated camera returning a blank 4×4 greyscale frame.
pub struct SimCamera {
    id: String,
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, RoverError> {
        Ok(CameraFrame {
            width: 4,
            height: 4,
            data: vec![0u8; 16],
        })
    }
}

pub struct SimClassifier {
    robot: SimRobot,
}

impl GarbageClassifier for SimClassifier {
    fn classify(&mut self, _frame: &CameraFrame) -> Option<Classification> {
        self.robot.lock().verdicts.pop_front().unwrap_or(Some(Classification {
            garbage: true,
            confidence: 0.9,
        }))
    }
}

pub struct SimTallCheck {
    robot: SimRobot,
}

impl TallObjectCheck for SimTallCheck {
    fn is_tall_object(&mut self, _expected_distance_mm: f32) -> Option<bool> {
        self.robot
            .lock()
            .tall_verdicts
            .pop_front()
            .unwrap_or(Some(false))
    }
}
