//! [`ActuationGate`] – single owner of the drive base.
//!
//! The navigation controller and the heading-correction loop both move the
//! robot. Neither talks to the [`DriveActuator`] directly: each first
//! acquires a [`MotionLease`] from the gate, which is a fair (FIFO) async
//! mutex around the driver. A move or turn holds its lease from the first
//! command to the final stop, so the two tasks can never interleave motor
//! commands.
//!
//! A lease remembers the motion it started. If it is dropped while that
//! motion is still running (task cancelled, early `?` return, panic) it
//! issues the matching stop command on the way out.
//!
//! # Example
//!
//! ```rust,ignore
//! let gate = ActuationGate::new(drive);
//! let mut lease = gate.acquire("navigation").await;
//! lease.start(DriveCommand::MoveForward)?;
//! // ... poll the odometer ...
//! lease.stop()?;
//! ```

use std::sync::Arc;

use sweepbot_hal::DriveActuator;
use sweepbot_types::{DriveCommand, RoverError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Fair arbiter for the drive base. Cloning shares the same driver.
#[derive(Clone)]
pub struct ActuationGate {
    drive: Arc<Mutex<Box<dyn DriveActuator>>>,
}

impl ActuationGate {
    pub fn new(drive: Box<dyn DriveActuator>) -> Self {
        Self {
            drive: Arc::new(Mutex::new(drive)),
        }
    }

    /// Wait for the drive base, queueing behind earlier callers.
    pub async fn acquire(&self, owner: &'static str) -> MotionLease {
        let guard = Arc::clone(&self.drive).lock_owned().await;
        debug!(owner, "actuation lease acquired");
        MotionLease {
            guard,
            owner,
            active: None,
        }
    }

    /// Take the drive base only if nobody holds it.
    pub fn try_acquire(&self, owner: &'static str) -> Option<MotionLease> {
        let guard = Arc::clone(&self.drive).try_lock_owned().ok()?;
        debug!(owner, "actuation lease acquired");
        Some(MotionLease {
            guard,
            owner,
            active: None,
        })
    }
}

/// Exclusive, scoped access to the drive base.
pub struct MotionLease {
    guard: OwnedMutexGuard<Box<dyn DriveActuator>>,
    owner: &'static str,
    active: Option<DriveCommand>,
}

impl MotionLease {
    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// The motion started through this lease and not yet stopped.
    pub fn active(&self) -> Option<DriveCommand> {
        self.active
    }

    /// Send `cmd`, remembering it if it starts a motion.
    ///
    /// # Errors
    ///
    /// Propagates the driver's [`RoverError::HardwareFault`].
    pub fn start(&mut self, cmd: DriveCommand) -> Result<(), RoverError> {
        self.guard.command(cmd)?;
        if cmd.stop_command().is_some() {
            self.active = Some(cmd);
        }
        Ok(())
    }

    /// Stop the running motion, if any.
    ///
    /// # Errors
    ///
    /// Propagates the driver's [`RoverError::HardwareFault`]. The motion is
    /// still considered active, so dropping the lease retries the stop.
    pub fn stop(&mut self) -> Result<(), RoverError> {
        if let Some(stop) = self.active.and_then(DriveCommand::stop_command) {
            self.guard.command(stop)?;
        }
        self.active = None;
        Ok(())
    }

    /// Pulse the collection mechanism.
    pub fn collect(&mut self) -> Result<(), RoverError> {
        self.guard.collect()
    }
}

impl Drop for MotionLease {
    fn drop(&mut self) {
        if let Some(motion) = self.active.take() {
            warn!(owner = self.owner, ?motion, "lease released mid-motion, stopping");
            let result = motion
                .stop_command()
                .map_or(Ok(()), |stop| self.guard.command(stop));
            if let Err(e) = result {
                warn!(owner = self.owner, error = %e, "stop on release failed");
            }
        }
        debug!(owner = self.owner, "actuation lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Log(Arc<StdMutex<Vec<DriveCommand>>>);

    impl Log {
        fn take(&self) -> Vec<DriveCommand> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct LoggingDrive {
        log: Log,
    }

    impl DriveActuator for LoggingDrive {
        fn id(&self) -> &str {
            "logging_drive"
        }

        fn command(&mut self, cmd: DriveCommand) -> Result<(), RoverError> {
            self.log.0.lock().unwrap().push(cmd);
            Ok(())
        }
    }

    fn gate() -> (ActuationGate, Log) {
        let log = Log::default();
        let gate = ActuationGate::new(Box::new(LoggingDrive { log: log.clone() }));
        (gate, log)
    }

    #[tokio::test]
    async fn stop_matches_started_motion() {
        let (gate, log) = gate();
        let mut lease = gate.acquire("test").await;
        lease.start(DriveCommand::TurnLeft).unwrap();
        assert_eq!(lease.active(), Some(DriveCommand::TurnLeft));
        lease.stop().unwrap();
        assert_eq!(lease.active(), None);
        drop(lease);
        assert_eq!(
            log.take(),
            vec![DriveCommand::TurnLeft, DriveCommand::StopTurning]
        );
    }

    #[tokio::test]
    async fn dropping_lease_mid_motion_stops_drive() {
        let (gate, log) = gate();
        {
            let mut lease = gate.acquire("test").await;
            lease.start(DriveCommand::MoveForward).unwrap();
        }
        assert_eq!(
            log.take(),
            vec![DriveCommand::MoveForward, DriveCommand::StopMoving]
        );
    }

    #[tokio::test]
    async fn collect_is_not_tracked_as_motion() {
        let (gate, log) = gate();
        {
            let mut lease = gate.acquire("test").await;
            lease.collect().unwrap();
            assert_eq!(lease.active(), None);
        }
        assert_eq!(log.take(), vec![DriveCommand::Collect]);
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let (gate, _) = gate();
        let lease = gate.acquire("navigation").await;
        assert!(gate.try_acquire("correction").is_none());
        drop(lease);
        let lease = gate.try_acquire("correction").unwrap();
        assert_eq!(lease.owner(), "correction");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_releases_and_stops() {
        let (gate, log) = gate();
        let g = gate.clone();
        let task = tokio::spawn(async move {
            let mut lease = g.acquire("navigation").await;
            lease.start(DriveCommand::TurnRight).unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.abort();
        let _ = task.await;

        let lease = gate.acquire("correction").await;
        assert_eq!(lease.owner(), "correction");
        assert_eq!(
            log.take(),
            vec![DriveCommand::TurnRight, DriveCommand::StopTurning]
        );
    }
}
