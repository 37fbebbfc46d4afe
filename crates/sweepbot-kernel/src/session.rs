//! [`MeasurementSessions`] – one odometer and heading, several purposes.
//!
//! Coverage bookkeeping (how far along the lane, how far across lanes) and
//! object handling (how far toward the object) both measure with the same
//! wheels and gyro. Each purpose gets a session keyed by [`SessionMode`] that
//! records a baseline on `start` and reports the signed delta since then.
//!
//! Object sessions take priority. While one is active, every active path
//! session is frozen and keeps reporting the value it had when the object
//! session started. Resetting the object session rebases the path sessions
//! so they resume from that frozen value. Ground covered while approaching,
//! retreating from or detouring around an object is therefore never charged
//! to the lane.
//!
//! # Example
//!
//! ```rust,ignore
//! sessions.start(SessionMode::PathY, now)?;
//! // ... drive ...
//! let along_lane = sessions.update(SessionMode::PathY, now).distance_cm;
//! sessions.reset(SessionMode::PathY, now);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use sweepbot_perception::heading::angle_diff;
use sweepbot_perception::odometry::Odometer;
use sweepbot_types::{Axis, RoverError, SessionMode};
use tracing::{debug, warn};

use crate::tracker::HeadingTracker;

/// Signed change since a session's baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionDelta {
    pub distance_cm: f32,
    /// Heading change in `(−180, 180]`, positive counter-clockwise.
    pub angle_deg: f32,
}

#[derive(Debug, Default)]
struct Session {
    active: bool,
    frozen: bool,
    baseline_distance: f32,
    baseline_angle: f32,
    cached: SessionDelta,
}

/// Session table over a shared [`Odometer`] and [`HeadingTracker`].
pub struct MeasurementSessions {
    odometer: Odometer,
    tracker: Arc<HeadingTracker>,
    table: Mutex<HashMap<SessionMode, Session>>,
}

impl MeasurementSessions {
    pub fn new(odometer: Odometer, tracker: Arc<HeadingTracker>) -> Self {
        Self {
            odometer,
            tracker,
            table: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionMode, Session>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tracker(&self) -> &Arc<HeadingTracker> {
        &self.tracker
    }

    pub fn odometer(&self) -> &Odometer {
        &self.odometer
    }

    /// Begin measuring for `mode` from the current distance and heading.
    ///
    /// Starting [`SessionMode::Object`] freezes every active path session.
    ///
    /// # Errors
    ///
    /// [`RoverError::SessionActive`] if `mode` is already active.
    pub fn start(&self, mode: SessionMode, now: Instant) -> Result<(), RoverError> {
        let mut table = self.lock();
        if table.get(&mode).is_some_and(|s| s.active) {
            return Err(RoverError::SessionActive(mode));
        }

        let heading = self.tracker.sample(now);
        let distance = self.odometer.distance_cm();

        if mode == SessionMode::Object {
            for (m, s) in table.iter_mut() {
                if m.is_path() && s.active && !s.frozen {
                    s.cached = SessionDelta {
                        distance_cm: distance - s.baseline_distance,
                        angle_deg: angle_diff(heading, s.baseline_angle),
                    };
                    s.frozen = true;
                }
            }
        }

        table.insert(
            mode,
            Session {
                active: true,
                frozen: false,
                baseline_distance: distance,
                baseline_angle: heading,
                cached: SessionDelta::default(),
            },
        );
        debug!(?mode, distance, heading, "session started");
        Ok(())
    }

    /// Signed delta of `mode` since its baseline.
    ///
    /// Frozen and inactive sessions return their cached value without
    /// touching the sensors.
    pub fn update(&self, mode: SessionMode, now: Instant) -> SessionDelta {
        let mut table = self.lock();
        let Some(session) = table.get_mut(&mode) else {
            return SessionDelta::default();
        };
        if !session.active || session.frozen {
            return session.cached;
        }

        let heading = self.tracker.sample(now);
        let distance = self.odometer.distance_cm();
        session.cached = SessionDelta {
            distance_cm: distance - session.baseline_distance,
            angle_deg: angle_diff(heading, session.baseline_angle),
        };
        session.cached
    }

    /// End `mode` and zero its cached delta.
    ///
    /// Resetting [`SessionMode::Object`] thaws the path sessions, rebasing
    /// each so its next update continues from its frozen value.
    pub fn reset(&self, mode: SessionMode, now: Instant) {
        let mut table = self.lock();
        if let Some(session) = table.get_mut(&mode) {
            session.active = false;
            session.frozen = false;
            session.cached = SessionDelta::default();
        }

        if mode == SessionMode::Object {
            let heading = self.tracker.sample(now);
            let distance = self.odometer.distance_cm();
            for (m, s) in table.iter_mut() {
                if m.is_path() && s.frozen {
                    s.frozen = false;
                    s.baseline_distance = distance - s.cached.distance_cm;
                    s.baseline_angle = heading - s.cached.angle_deg;
                    debug!(mode = ?m, resume_cm = s.cached.distance_cm, "path session thawed");
                }
            }
        }
        debug!(?mode, "session reset");
    }

    pub fn is_active(&self, mode: SessionMode) -> bool {
        self.lock().get(&mode).is_some_and(|s| s.active)
    }

    pub fn is_frozen(&self, mode: SessionMode) -> bool {
        self.lock().get(&mode).is_some_and(|s| s.frozen)
    }

    /// Add `cm` of along-axis travel to an active path session, e.g. the
    /// longitudinal leg of an obstacle detour that ran under an object
    /// session.
    pub fn credit_path(&self, axis: Axis, cm: f32) {
        let mode = axis.session_mode();
        let mut table = self.lock();
        match table.get_mut(&mode) {
            Some(s) if s.active => {
                s.baseline_distance -= cm;
                s.cached.distance_cm += cm;
                debug!(?mode, cm, "path credited");
            }
            _ => warn!(?mode, cm, "credit for inactive path session ignored"),
        }
    }
}
