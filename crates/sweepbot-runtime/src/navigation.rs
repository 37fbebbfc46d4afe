//! [`NavigationController`] – boustrophedon sweep with object handling.
//!
//! The robot starts in the origin corner of a `perimeter_x × perimeter_y`
//! rectangle facing +Y and sweeps lanes parallel to Y, stepping toward +X
//! after each lane. Each [`cycle`][NavigationController::cycle]:
//!
//! 1. advances `sweep_increment_cm` along the lane (PathY session);
//! 2. scans for the nearest object;
//! 3. handles the object, if any:
//!    - **off path** (`|bearing| > off_path_angle_deg` and farther than
//!      `off_path_distance_cm`): inside an object session, turn toward it,
//!      approach to `collection_offset_cm`, check and collect, back off the
//!      same distance and turn back;
//!    - **on path**: approach along the lane, check and collect; if it
//!      cannot be collected, drive a rectangular detour around it inside an
//!      object session and credit the lane with the detour's long leg;
//! 4. turns into the next lane once the lane is `lane_turn_fraction`
//!    complete;
//! 5. drives back to the first lane once the X extent is covered.
//!
//! Every move and turn is closed-loop and time-bounded. A timeout is retried
//! once for the remaining amount; a second failure moves the controller to
//! [`Phase::Fault`] and the error is returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use sweepbot_hal::{Peripherals, RangeSource};
use sweepbot_kernel::{HeadingTracker, MeasurementSessions};
use sweepbot_perception::heading::angle_diff;
use sweepbot_perception::scan::ScanClusterer;
use sweepbot_types::{Axis, DetectedObject, RoverError, ScanPoint, SessionMode};
use tracing::{debug, error, info, warn};

use crate::motion::{Motion, MotionExecutor, Tracking, clock_now};

const OWNER: &str = "navigation";

// ────────────────────────────────────────────────────────────────────────────
// Configuration & state
// ────────────────────────────────────────────────────────────────────────────

/// Sweep geometry and object-handling thresholds. Distances in cm, angles in
/// degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub perimeter_x_cm: f32,
    pub perimeter_y_cm: f32,
    /// Forward step taken along the lane before each scan.
    pub sweep_increment_cm: f32,
    /// Lateral distance between neighbouring lanes.
    pub lane_spacing_cm: f32,
    /// Fraction of a perimeter side after which the lane (or sweep) counts
    /// as complete.
    pub lane_turn_fraction: f32,
    pub off_path_angle_deg: f32,
    pub off_path_distance_cm: f32,
    /// Distance left between robot and object when it stops to collect.
    pub collection_offset_cm: f32,
    /// Detour rectangle side, as a multiple of the object's width.
    pub detour_width_factor: f32,
    pub classifier_max_retries: u32,
    pub confidence_threshold: f32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            perimeter_x_cm: 20.0,
            perimeter_y_cm: 20.0,
            sweep_increment_cm: 5.0,
            lane_spacing_cm: 7.5,
            lane_turn_fraction: 0.9,
            off_path_angle_deg: 10.0,
            off_path_distance_cm: 20.0,
            collection_offset_cm: 10.0,
            detour_width_factor: 3.0,
            classifier_max_retries: 5,
            confidence_threshold: 0.3,
        }
    }
}

impl NavigationConfig {
    /// Reject geometry the sweep cannot make progress with.
    ///
    /// # Errors
    ///
    /// [`RoverError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), RoverError> {
        let positive = [
            ("perimeter_x_cm", self.perimeter_x_cm),
            ("perimeter_y_cm", self.perimeter_y_cm),
            ("sweep_increment_cm", self.sweep_increment_cm),
            ("lane_spacing_cm", self.lane_spacing_cm),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(*v > 0.0)) {
            return Err(RoverError::Config(format!("{name} must be positive, got {value}")));
        }
        if !(self.lane_turn_fraction > 0.0 && self.lane_turn_fraction <= 1.0) {
            return Err(RoverError::Config(format!(
                "lane_turn_fraction must be in (0, 1], got {}",
                self.lane_turn_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RoverError::Config(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Coverage bookkeeping owned by the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationState {
    pub perimeter_x_cm: f32,
    pub perimeter_y_cm: f32,
    pub facing_up: bool,
    /// Lateral progress toward +X, cm.
    pub path_distance_x: f32,
    /// Progress along the current lane, cm.
    pub path_distance_y: f32,
    pub lanes_completed: u32,
    pub cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sweeping,
    Fault,
}

/// What happened to an object seen during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Handling {
    Collected,
    /// Off-path object that was not collectible; left in place.
    Skipped,
    /// On-path object that was not collectible; driven around.
    Avoided,
}

/// Summary of one [`NavigationController::cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub object: Option<DetectedObject>,
    pub handling: Option<Handling>,
    pub lane_turned: bool,
    pub returned_to_start: bool,
    pub path_distance_y: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

/// Stands in for the range source while a scan holds it on the blocking
/// pool. Only observable if that scan task died.
struct Detached;

impl RangeSource for Detached {
    fn start_scan(&mut self) -> Result<(), RoverError> {
        Err(RoverError::hardware("range", "source lost by a failed scan"))
    }

    fn stop_scan(&mut self) {}

    fn next_sample(&mut self) -> Option<ScanPoint> {
        None
    }
}

/// Top-level sweep state machine.
pub struct NavigationController {
    config: NavigationConfig,
    state: NavigationState,
    phase: Phase,
    executor: MotionExecutor,
    peripherals: Peripherals,
    clusterer: ScanClusterer,
}

impl NavigationController {
    pub fn new(
        config: NavigationConfig,
        executor: MotionExecutor,
        peripherals: Peripherals,
        clusterer: ScanClusterer,
    ) -> Self {
        let state = NavigationState {
            perimeter_x_cm: config.perimeter_x_cm,
            perimeter_y_cm: config.perimeter_y_cm,
            facing_up: true,
            path_distance_x: 0.0,
            path_distance_y: 0.0,
            lanes_completed: 0,
            cycles: 0,
        };
        Self {
            config,
            state,
            phase: Phase::Sweeping,
            executor,
            peripherals,
            clusterer,
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn sessions(&self) -> &Arc<MeasurementSessions> {
        self.executor.sessions()
    }

    fn tracker(&self) -> &Arc<HeadingTracker> {
        self.executor.tracker()
    }

    /// Run cycles until `stop` is set, `max_cycles` is reached, or a fault
    /// occurs. Returns the number of completed cycles.
    ///
    /// # Errors
    ///
    /// [`RoverError::Config`] for an unusable configuration; otherwise the
    /// error that moved the controller into [`Phase::Fault`].
    pub async fn run(&mut self, stop: Arc<AtomicBool>, max_cycles: Option<u64>) -> Result<u64, RoverError> {
        self.config.validate()?;
        info!(
            perimeter_x = self.config.perimeter_x_cm,
            perimeter_y = self.config.perimeter_y_cm,
            "sweep started"
        );
        let mut completed = 0;
        loop {
            if stop.load(Ordering::Relaxed) {
                info!(cycles = completed, "sweep stopped");
                break;
            }
            if max_cycles.is_some_and(|max| completed >= max) {
                info!(cycles = completed, "cycle limit reached");
                break;
            }
            match self.cycle().await {
                Ok(_) => completed += 1,
                Err(RoverError::Interrupted) => {
                    info!(cycles = completed, "sweep interrupted");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(completed)
    }

    /// One step-scan-handle-turn iteration.
    ///
    /// # Errors
    ///
    /// [`RoverError::NavigationFault`] if the controller has already
    /// faulted; otherwise the first unrecoverable motion, session or
    /// hardware error.
    pub async fn cycle(&mut self) -> Result<CycleReport, RoverError> {
        if self.phase == Phase::Fault {
            return Err(RoverError::NavigationFault(
                "controller is in fault state".to_string(),
            ));
        }
        if !self.sessions().is_active(SessionMode::PathY) {
            self.sessions().start(SessionMode::PathY, clock_now())?;
        }

        self.perform(
            Motion::Forward(self.config.sweep_increment_cm),
            Tracking::Path(Axis::Y),
        )
        .await?;

        let object = self.scan().await.inspect_err(|e| self.fault(e))?;

        let handling = match object {
            Some(obj) => Some(self.handle_object(obj).await?),
            None => None,
        };

        self.state.path_distance_y = self
            .sessions()
            .update(SessionMode::PathY, clock_now())
            .distance_cm;
        self.state.cycles += 1;
        debug!(
            cycle = self.state.cycles,
            path_y = self.state.path_distance_y,
            path_x = self.state.path_distance_x,
            "cycle complete"
        );

        let lane_turned = self.state.path_distance_y
            >= self.config.lane_turn_fraction * self.config.perimeter_y_cm;
        if lane_turned {
            self.lane_turn().await?;
        }

        let returned_to_start = self.state.path_distance_x
            >= self.config.lane_turn_fraction * self.config.perimeter_x_cm;
        if returned_to_start {
            self.return_to_first_lane().await?;
        }

        Ok(CycleReport {
            object,
            handling,
            lane_turned,
            returned_to_start,
            path_distance_y: self.state.path_distance_y,
        })
    }

    /// Run one detection on the blocking pool; range reads may block on
    /// the device.
    async fn scan(&mut self) -> Result<Option<DetectedObject>, RoverError> {
        let clusterer = self.clusterer.clone();
        let mut range = std::mem::replace(&mut self.peripherals.range, Box::new(Detached));
        let (range, result) = tokio::task::spawn_blocking(move || {
            let result = clusterer.detect(range.as_mut());
            (range, result)
        })
        .await
        .map_err(|e| RoverError::hardware("range", format!("scan task failed: {e}")))?;
        self.peripherals.range = range;
        result
    }

    // ── Motion with retry ────────────────────────────────────────────────

    fn fault(&mut self, err: &RoverError) {
        if !matches!(err, RoverError::Interrupted) {
            error!(error = %err, "navigation fault");
            self.phase = Phase::Fault;
        }
    }

    /// Run one motion under a single lease. A recoverable failure is
    /// retried once for the remainder. Turns shift the reference heading
    /// before the lease is released: by the intended angle on success, by
    /// the angle actually turned otherwise.
    async fn perform(&mut self, motion: Motion, tracking: Tracking) -> Result<(), RoverError> {
        let mut lease = self.executor.gate().acquire(OWNER).await;
        let start_heading = motion.is_turn().then(|| self.tracker().sample(clock_now()));

        let outcome = match self.executor.execute_leased(&mut lease, motion, tracking).await {
            Err(e) if e.is_recoverable() => {
                let achieved = match e {
                    RoverError::MotionTimeout { achieved, .. } => achieved,
                    _ => 0.0,
                };
                warn!(?motion, achieved, error = %e, "motion failed, retrying remainder");
                self.executor
                    .execute_leased(&mut lease, motion.remaining(achieved), tracking)
                    .await
                    .map(|_| ())
            }
            other => other.map(|_| ()),
        };

        if let Some(intended) = motion.heading_change() {
            let shift = match (&outcome, start_heading) {
                (Err(_), Some(before)) => angle_diff(self.tracker().sample(clock_now()), before),
                _ => intended,
            };
            self.tracker().shift_reference(shift);
        }
        drop(lease);
        outcome.inspect_err(|e| self.fault(e))
    }

    async fn collect(&mut self) -> Result<(), RoverError> {
        let mut lease = self.executor.gate().acquire(OWNER).await;
        lease.collect().inspect_err(|e| self.fault(e))?;
        info!("collect triggered");
        Ok(())
    }

    // ── Object handling ──────────────────────────────────────────────────

    async fn handle_object(&mut self, obj: DetectedObject) -> Result<Handling, RoverError> {
        let off_path = obj.relative_angle_deg.abs() > self.config.off_path_angle_deg
            && obj.distance_cm() > self.config.off_path_distance_cm;

        if off_path {
            info!(
                relative_angle = obj.relative_angle_deg,
                distance_cm = obj.distance_cm(),
                "off-path object"
            );
            self.sessions().start(SessionMode::Object, clock_now())?;
            let result = self.off_path_sequence(&obj).await;
            self.sessions().reset(SessionMode::Object, clock_now());
            result
        } else {
            info!(distance_cm = obj.distance_cm(), "on-path object");
            self.on_path_sequence(&obj).await
        }
    }

    async fn off_path_sequence(&mut self, obj: &DetectedObject) -> Result<Handling, RoverError> {
        // Positive bearings are clockwise; heading changes are counter-clockwise.
        let toward = -obj.relative_angle_deg;
        let approach = self.approach_distance(obj);

        self.perform(Motion::turn(toward), Tracking::Object).await?;
        self.perform(Motion::Forward(approach), Tracking::Object).await?;

        let handling = if self.is_collectible(obj) {
            self.collect().await?;
            Handling::Collected
        } else {
            info!("off-path object not collectible, leaving it");
            Handling::Skipped
        };

        self.perform(Motion::Backward(approach), Tracking::Object).await?;
        self.perform(Motion::turn(-toward), Tracking::Object).await?;
        Ok(handling)
    }

    async fn on_path_sequence(&mut self, obj: &DetectedObject) -> Result<Handling, RoverError> {
        let approach = self.approach_distance(obj);
        self.perform(Motion::Forward(approach), Tracking::Path(Axis::Y))
            .await?;

        if self.is_collectible(obj) {
            self.collect().await?;
            return Ok(Handling::Collected);
        }

        let side = self.config.detour_width_factor * obj.width_cm();
        info!(side_cm = side, "object in the way, detouring");
        self.sessions().start(SessionMode::Object, clock_now())?;
        let result = self.detour(side).await;
        self.sessions().reset(SessionMode::Object, clock_now());
        result?;
        self.sessions().credit_path(Axis::Y, side);
        Ok(Handling::Avoided)
    }

    async fn detour(&mut self, side: f32) -> Result<(), RoverError> {
        let legs = [
            Motion::TurnRight(90.0),
            Motion::Forward(side),
            Motion::TurnLeft(90.0),
            Motion::Forward(side),
            Motion::TurnLeft(90.0),
            Motion::Forward(side),
            Motion::TurnRight(90.0),
        ];
        for leg in legs {
            self.perform(leg, Tracking::Object).await?;
        }
        Ok(())
    }

    fn approach_distance(&self, obj: &DetectedObject) -> f32 {
        (obj.distance_cm() - self.config.collection_offset_cm).max(0.0)
    }

    /// Tall-object check first, then the classifier; each with bounded
    /// retries. Exhausted retries mean "not collectible".
    fn is_collectible(&mut self, obj: &DetectedObject) -> bool {
        let retries = self.config.classifier_max_retries.max(1);
        let expected_mm = obj.distance_cm().min(self.config.collection_offset_cm) * 10.0;

        let tall = (1..=retries).find_map(|attempt| {
            let verdict = self.peripherals.tall_check.is_tall_object(expected_mm);
            if verdict.is_none() {
                debug!(attempt, "tall-object check gave no reading");
            }
            verdict
        });
        match tall {
            Some(false) => {}
            Some(true) => {
                info!("object too tall to collect");
                return false;
            }
            None => {
                warn!(retries, "tall-object check unavailable");
                return false;
            }
        }

        for attempt in 1..=retries {
            let frame = match self.peripherals.camera.capture() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(attempt, error = %e, "capture failed");
                    continue;
                }
            };
            match self.peripherals.classifier.classify(&frame) {
                Some(c) if c.confidence >= self.config.confidence_threshold => {
                    info!(garbage = c.garbage, confidence = c.confidence, "classified");
                    return c.garbage;
                }
                Some(c) => debug!(attempt, confidence = c.confidence, "low confidence"),
                None => debug!(attempt, "classifier gave no result"),
            }
        }
        warn!(retries, "classifier retries exhausted");
        false
    }

    // ── Lane bookkeeping ─────────────────────────────────────────────────

    /// Heading change that points the robot toward +X.
    fn toward_plus_x(&self) -> f32 {
        if self.state.facing_up { -90.0 } else { 90.0 }
    }

    async fn lane_turn(&mut self) -> Result<(), RoverError> {
        let now = clock_now();
        self.sessions().reset(SessionMode::PathY, now);
        self.sessions().start(SessionMode::PathX, now)?;

        let turn = self.toward_plus_x();
        self.perform(Motion::turn(turn), Tracking::Path(Axis::X)).await?;
        self.perform(
            Motion::Forward(self.config.lane_spacing_cm),
            Tracking::Path(Axis::X),
        )
        .await?;
        self.perform(Motion::turn(turn), Tracking::Path(Axis::X)).await?;

        let now = clock_now();
        self.state.path_distance_x += self.sessions().update(SessionMode::PathX, now).distance_cm;
        self.sessions().reset(SessionMode::PathX, now);

        self.state.facing_up = !self.state.facing_up;
        self.state.path_distance_y = 0.0;
        self.state.lanes_completed += 1;
        self.sessions().start(SessionMode::PathY, now)?;

        info!(
            lane = self.state.lanes_completed,
            facing_up = self.state.facing_up,
            path_x = self.state.path_distance_x,
            "lane turn"
        );
        Ok(())
    }

    async fn return_to_first_lane(&mut self) -> Result<(), RoverError> {
        let back = -self.toward_plus_x();
        let distance = self.state.path_distance_x;
        info!(distance_cm = distance, "returning to first lane");

        self.sessions().start(SessionMode::PathX, clock_now())?;
        self.perform(Motion::turn(back), Tracking::Path(Axis::X)).await?;
        self.perform(Motion::Forward(distance), Tracking::Path(Axis::X))
            .await?;
        self.perform(Motion::turn(-back), Tracking::Path(Axis::X))
            .await?;

        let now = clock_now();
        self.sessions().reset(SessionMode::PathX, now);
        self.state.path_distance_x = 0.0;
        self.state.path_distance_y = 0.0;
        self.sessions().reset(SessionMode::PathY, now);
        self.sessions().start(SessionMode::PathY, now)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionConfig;
    use crate::testkit::{Rig, rig};
    use sweepbot_hal::Classification;
    use sweepbot_hal::sim::arc_points;
    use sweepbot_types::DriveCommand;

    fn controller(rig: &Rig, config: NavigationConfig) -> NavigationController {
        NavigationController::new(
            config,
            rig.executor.clone(),
            rig.robot.peripherals(),
            ScanClusterer::default(),
        )
    }

    fn count(commands: &[DriveCommand], cmd: DriveCommand) -> usize {
        commands.iter().filter(|c| **c == cmd).count()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_field_turns_lane_after_four_steps() {
        let rig = rig(MotionConfig::default());
        let mut nav = controller(&rig, NavigationConfig::default());

        let mut steps = 0;
        loop {
            let report = nav.cycle().await.unwrap();
            steps += 1;
            assert!(report.object.is_none());
            if report.lane_turned {
                break;
            }
            assert!(steps < 10, "lane never turned");
        }

        assert_eq!(steps, 4);
        let state = nav.state();
        assert!(!state.facing_up);
        assert_eq!(state.lanes_completed, 1);
        assert!((7.5..8.5).contains(&state.path_distance_x));
        assert_eq!(state.path_distance_y, 0.0);

        let cmds = rig.robot.commands();
        // Facing up, +X is to the right: two right turns.
        assert_eq!(count(&cmds, DriveCommand::TurnRight), 2);
        assert_eq!(count(&cmds, DriveCommand::TurnLeft), 0);
        assert_eq!(count(&cmds, DriveCommand::MoveForward), 5);
        assert!((rig.robot.heading_deg().abs() - 180.0).abs() < 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn covered_width_returns_to_first_lane() {
        let rig = rig(MotionConfig::default());
        let mut nav = controller(
            &rig,
            NavigationConfig {
                perimeter_x_cm: 8.0,
                perimeter_y_cm: 10.0,
                ..Default::default()
            },
        );

        let mut returned = false;
        for _ in 0..4 {
            let report = nav.cycle().await.unwrap();
            if report.returned_to_start {
                assert!(report.lane_turned);
                returned = true;
                break;
            }
        }
        assert!(returned);
        assert_eq!(nav.state().path_distance_x, 0.0);
        assert!(rig.sessions.is_active(SessionMode::PathY));
        assert!(!rig.sessions.is_active(SessionMode::PathX));
    }

    #[tokio::test(start_paused = true)]
    async fn off_path_object_is_collected_without_charging_lane() {
        let rig = rig(MotionConfig::default());
        rig.robot.push_revolution(arc_points(300.0, 800.0, 15, 2.0));
        let mut nav = controller(
            &rig,
            NavigationConfig {
                perimeter_y_cm: 200.0,
                ..Default::default()
            },
        );

        let report = nav.cycle().await.unwrap();
        let obj = report.object.unwrap();
        assert!(obj.relative_angle_deg > 10.0);
        assert_eq!(report.handling, Some(Handling::Collected));
        assert!(!report.lane_turned);

        // Only the 5 cm lane step counts; the 70 cm approach and retreat do not.
        assert!((5.0..6.0).contains(&report.path_distance_y), "path y {}", report.path_distance_y);
        assert!(!rig.sessions.is_active(SessionMode::Object));

        let cmds = rig.robot.commands();
        assert_eq!(count(&cmds, DriveCommand::Collect), 1);
        assert_eq!(count(&cmds, DriveCommand::MoveBackward), 1);
        // Turned right toward the object and left back.
        let first_turn = cmds
            .iter()
            .find(|c| matches!(c, DriveCommand::TurnLeft | DriveCommand::TurnRight));
        assert_eq!(first_turn, Some(&DriveCommand::TurnRight));
        assert!(rig.robot.heading_deg().abs() < 5.0);
        assert!(rig.tracker.reference().abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn tall_off_path_object_is_skipped() {
        let rig = rig(MotionConfig::default());
        rig.robot.push_revolution(arc_points(240.0, 600.0, 15, 2.0));
        rig.robot.push_tall_verdict(Some(true));
        let mut nav = controller(
            &rig,
            NavigationConfig {
                perimeter_y_cm: 200.0,
                ..Default::default()
            },
        );

        let report = nav.cycle().await.unwrap();
        assert_eq!(report.handling, Some(Handling::Skipped));
        assert_eq!(count(&rig.robot.commands(), DriveCommand::Collect), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn on_path_non_garbage_is_avoided_with_detour() {
        let rig = rig(MotionConfig::default());
        rig.robot.push_revolution(arc_points(270.0, 400.0, 15, 3.0));
        for _ in 0..5 {
            rig.robot.push_verdict(Some(Classification {
                garbage: false,
                confidence: 0.9,
            }));
        }
        let mut nav = controller(
            &rig,
            NavigationConfig {
                perimeter_y_cm: 200.0,
                ..Default::default()
            },
        );

        let report = nav.cycle().await.unwrap();
        assert_eq!(report.handling, Some(Handling::Avoided));

        let obj = report.object.unwrap();
        let side = 3.0 * obj.width_cm();
        // Lane step + approach + credited detour leg.
        let expected = 5.0 + (obj.distance_cm() - 10.0) + side;
        assert!(
            (report.path_distance_y - expected).abs() < 1.5,
            "path y {} expected {expected}",
            report.path_distance_y
        );

        let cmds = rig.robot.commands();
        assert_eq!(count(&cmds, DriveCommand::Collect), 0);
        assert_eq!(count(&cmds, DriveCommand::TurnRight), 2);
        assert_eq!(count(&cmds, DriveCommand::TurnLeft), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn low_confidence_exhausts_retries() {
        let rig = rig(MotionConfig::default());
        rig.robot.push_revolution(arc_points(270.0, 300.0, 15, 3.0));
        for _ in 0..5 {
            rig.robot.push_verdict(Some(Classification {
                garbage: true,
                confidence: 0.1,
            }));
        }
        // A sixth, confident verdict is never consulted.
        rig.robot.push_verdict(Some(Classification {
            garbage: true,
            confidence: 0.9,
        }));
        let mut nav = controller(
            &rig,
            NavigationConfig {
                perimeter_y_cm: 200.0,
                ..Default::default()
            },
        );

        let report = nav.cycle().await.unwrap();
        assert_eq!(report.handling, Some(Handling::Avoided));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_timeout_faults_controller() {
        let rig = rig(MotionConfig {
            poll_period_ms: 100,
            max_duration_ms: 1_000,
        });
        rig.robot.stall_wheels(true);
        let mut nav = controller(&rig, NavigationConfig::default());

        let err = nav.cycle().await.unwrap_err();
        assert!(matches!(err, RoverError::MotionTimeout { .. }));
        assert_eq!(nav.phase(), Phase::Fault);
        // Original attempt plus one retry.
        assert_eq!(
            count(&rig.robot.commands(), DriveCommand::MoveForward),
            2
        );

        let err = nav.cycle().await.unwrap_err();
        assert!(matches!(err, RoverError::NavigationFault(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_turn_shifts_reference_by_angle_turned() {
        let rig = rig(MotionConfig::default());
        let mut nav = controller(&rig, NavigationConfig::default());

        let flag = rig.stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(1_000)).await;
            flag.store(true, Ordering::Relaxed);
        });

        let err = nav
            .perform(Motion::TurnLeft(90.0), Tracking::Direct)
            .await
            .unwrap_err();
        assert_eq!(err, RoverError::Interrupted);
        assert_eq!(nav.phase(), Phase::Sweeping);

        let reference = rig.tracker.reference();
        assert!((20.0..80.0).contains(&reference), "reference {reference}");
        assert!((reference - rig.tracker.heading()).abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_turn_shifts_reference_by_intended_angle() {
        let rig = rig(MotionConfig::default());
        let mut nav = controller(&rig, NavigationConfig::default());

        nav.perform(Motion::TurnRight(90.0), Tracking::Direct)
            .await
            .unwrap();
        assert_eq!(rig.tracker.reference(), -90.0);
    }

    #[test]
    fn invalid_geometry_is_a_config_error() {
        assert!(NavigationConfig::default().validate().is_ok());

        let err = NavigationConfig {
            sweep_increment_cm: 0.0,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(&err, RoverError::Config(msg) if msg.contains("sweep_increment_cm")));

        let err = NavigationConfig {
            lane_turn_fraction: 1.5,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, RoverError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn run_rejects_invalid_config_without_moving() {
        let rig = rig(MotionConfig::default());
        let mut nav = controller(
            &rig,
            NavigationConfig {
                perimeter_x_cm: -5.0,
                ..Default::default()
            },
        );

        let stop = Arc::new(AtomicBool::new(false));
        let err = nav.run(stop, Some(3)).await.unwrap_err();
        assert!(matches!(err, RoverError::Config(_)));
        assert!(rig.robot.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_honours_cycle_limit_and_stop_flag() {
        let rig = rig(MotionConfig::default());
        let mut nav = controller(
            &rig,
            NavigationConfig {
                perimeter_y_cm: 200.0,
                ..Default::default()
            },
        );

        let stop = Arc::new(AtomicBool::new(false));
        assert_eq!(nav.run(stop.clone(), Some(2)).await.unwrap(), 2);

        stop.store(true, Ordering::Relaxed);
        assert_eq!(nav.run(stop, None).await.unwrap(), 0);
        assert_eq!(nav.state().cycles, 2);
    }
}
