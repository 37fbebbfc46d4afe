//! Simulated robot wiring shared by the runtime tests.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use sweepbot_hal::sim::{SimConfig, SimRobot};
use sweepbot_kernel::{ActuationGate, HeadingTracker, MeasurementSessions};
use sweepbot_perception::heading::{HeadingFilter, HeadingFilterConfig};
use sweepbot_perception::odometry::{EncoderCalibration, Odometer};
use tokio::task::JoinHandle;

use crate::motion::{MotionConfig, MotionExecutor};

pub(crate) struct Rig {
    pub robot: SimRobot,
    pub executor: MotionExecutor,
    pub sessions: Arc<MeasurementSessions>,
    pub tracker: Arc<HeadingTracker>,
    pub stop: Arc<AtomicBool>,
    #[allow(dead_code)]
    pub physics: JoinHandle<()>,
}

/// Fine-grained encoders (~0.04 cm per pulse), 5 cm/s, unfiltered gyro.
/// Must be called from inside a tokio runtime.
pub(crate) fn rig(motion: MotionConfig) -> Rig {
    let calibration = EncoderCalibration {
        pulses_per_rev: 300,
        ..Default::default()
    };
    let (left, right) = calibration.channels();
    let robot = SimRobot::new(
        SimConfig {
            linear_speed_cm_s: 5.0,
            ..Default::default()
        },
        calibration.cm_per_pulse(),
        left.clone(),
        right.clone(),
    );

    let tracker = Arc::new(HeadingTracker::new(
        HeadingFilter::new(HeadingFilterConfig {
            alpha: 1.0,
            deadzone: 0.2,
        }),
        robot.gyro(),
    ));
    let sessions = Arc::new(MeasurementSessions::new(
        Odometer::new(left, right, &calibration),
        tracker.clone(),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let executor = MotionExecutor::new(ActuationGate::new(robot.drive()), sessions.clone(), motion)
        .with_stop_flag(stop.clone());
    let physics = robot.spawn_physics(stop.clone());

    Rig {
        robot,
        executor,
        sessions,
        tracker,
        stop,
        physics,
    }
}
