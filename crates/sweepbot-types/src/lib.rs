use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sweep axis of the rectangular work area.
///
/// `Y` is the lane direction (the robot drives up and down lanes), `X` is the
/// lane-advance direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// The path-tracking session mode that measures travel along this axis.
    pub fn session_mode(self) -> SessionMode {
        match self {
            Axis::X => SessionMode::PathX,
            Axis::Y => SessionMode::PathY,
        }
    }
}

/// Logical purpose a measurement session is opened for.
///
/// Object sessions take priority: while one is active, path sessions are
/// frozen at their last value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionMode {
    /// Coverage-path bookkeeping along the lane-advance axis.
    PathX,
    /// Coverage-path bookkeeping along the lane axis.
    PathY,
    /// Approach / retreat / detour around a detected object.
    Object,
}

impl SessionMode {
    pub fn is_path(self) -> bool {
        matches!(self, SessionMode::PathX | SessionMode::PathY)
    }
}

/// One discrete state of the drive motor controller.
///
/// The motor driver exposes three digital lines; every command maps to one
/// fixed line pattern (see [`DriveCommand::line_code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveCommand {
    MoveForward,
    MoveBackward,
    StopMoving,
    TurnRight,
    TurnLeft,
    StopTurning,
    Collect,
}

impl DriveCommand {
    /// Three-bit pattern driven on the motor-controller lines
    /// (most significant bit first).
    pub fn line_code(self) -> u8 {
        match self {
            DriveCommand::MoveForward => 0b001,
            DriveCommand::MoveBackward => 0b010,
            DriveCommand::StopMoving => 0b011,
            DriveCommand::TurnRight => 0b100,
            DriveCommand::TurnLeft => 0b101,
            DriveCommand::StopTurning => 0b110,
            DriveCommand::Collect => 0b111,
        }
    }

    /// The command that halts the motion started by `self`, if any.
    pub fn stop_command(self) -> Option<DriveCommand> {
        match self {
            DriveCommand::MoveForward | DriveCommand::MoveBackward => Some(DriveCommand::StopMoving),
            DriveCommand::TurnLeft | DriveCommand::TurnRight => Some(DriveCommand::StopTurning),
            _ => None,
        }
    }
}

/// A single rangefinder sample in the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Bearing in degrees, `[0, 360)`, increasing clockwise. 270° is
    /// straight ahead of the robot.
    pub angle_deg: f32,
    /// Range in millimetres. Zero means "no return".
    pub distance_mm: f32,
    /// Driver-reported signal quality.
    pub quality: u8,
}

impl ScanPoint {
    pub fn new(angle_deg: f32, distance_mm: f32, quality: u8) -> Self {
        Self {
            angle_deg,
            distance_mm,
            quality,
        }
    }
}

/// Coarse size classification of a detected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Big,
}

/// An object estimate produced by the scan clusterer.
///
/// Consumed once by the navigation controller; there is no identity across
/// scans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Estimated chord width in millimetres.
    pub width_mm: f32,
    /// Mean range to the object in millimetres.
    pub distance_mm: f32,
    /// Bearing of the object's center in the sensor frame, `[0, 360)`.
    pub angle_center_deg: f32,
    /// Signed deviation from straight ahead, `(-180, 180]`. Positive values
    /// are clockwise (to the robot's right).
    pub relative_angle_deg: f32,
    pub size_class: SizeClass,
}

impl DetectedObject {
    pub fn distance_cm(&self) -> f32 {
        self.distance_mm / 10.0
    }

    pub fn width_cm(&self) -> f32 {
        self.width_mm / 10.0
    }
}

/// Angular rate sample from the inertial sensor, in degrees per second.
///
/// `z` is the yaw rate; positive values are counter-clockwise (a left turn).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngularRate {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AngularRate {
    pub fn yaw(z: f32) -> Self {
        Self { x: 0.0, y: 0.0, z }
    }
}

/// Global error type spanning hardware faults, motion timeouts, session
/// misuse and navigation faults.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error(
        "Motion timeout: {motion} reached {achieved:.1} of {target:.1} after {elapsed_ms} ms"
    )]
    MotionTimeout {
        motion: String,
        target: f32,
        achieved: f32,
        elapsed_ms: u64,
    },

    #[error("Measurement session {0:?} is already active")]
    SessionActive(SessionMode),

    #[error("Navigation fault: {0}")]
    NavigationFault(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Interrupted by stop request")]
    Interrupted,
}

impl RoverError {
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        RoverError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// `true` for errors the navigation controller may retry once.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RoverError::MotionTimeout { .. })
    }
}
