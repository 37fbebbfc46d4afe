//! [`HeadingCorrectionLoop`] – background heading hold, and its supervisor.
//!
//! The loop samples the shared [`HeadingTracker`] every `period_ms`. When
//! the heading has drifted more than `threshold_deg` from the reference, it
//! queues for the actuation lease, re-checks the deviation (navigation may
//! have moved the reference meanwhile) and turns back by the deviation.
//!
//! [`spawn_supervised`] runs the loop as a tokio task and restarts it when it
//! returns an error, panics, or stops heartbeating the [`Watchdog`], up to
//! `max_restarts` times. The navigation task is never touched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sweepbot_kernel::{HeadingTracker, Watchdog};
use sweepbot_types::RoverError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::motion::{Motion, MotionExecutor, Tracking, clock_now};

const OWNER: &str = "heading_correction";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub period_ms: u64,
    /// Deviation, in degrees, tolerated before a corrective turn.
    pub threshold_deg: f32,
    /// Missing heartbeats for this long mark the loop frozen.
    pub heartbeat_timeout_ms: u64,
    pub max_restarts: u32,
    /// Pause before a restart.
    pub restart_backoff_ms: u64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            threshold_deg: 10.0,
            heartbeat_timeout_ms: 2_000,
            max_restarts: 3,
            restart_backoff_ms: 500,
        }
    }
}

impl CorrectionConfig {
    fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

/// Keeps the robot pointed at the tracker's reference heading.
pub struct HeadingCorrectionLoop {
    config: CorrectionConfig,
    executor: MotionExecutor,
    watchdog: Arc<Watchdog>,
}

impl HeadingCorrectionLoop {
    pub fn new(config: CorrectionConfig, executor: MotionExecutor, watchdog: Arc<Watchdog>) -> Self {
        Self {
            config,
            executor,
            watchdog,
        }
    }

    fn tracker(&self) -> &Arc<HeadingTracker> {
        self.executor.tracker()
    }

    fn heartbeat(&self) {
        self.watchdog.heartbeat_at(OWNER, clock_now());
    }

    /// One correction step. Returns the signed correction applied, if any.
    ///
    /// # Errors
    ///
    /// Any error from the corrective turn.
    pub async fn tick(&self) -> Result<Option<f32>, RoverError> {
        self.tracker().sample(clock_now());
        if self.tracker().deviation().abs() <= self.config.threshold_deg {
            return Ok(None);
        }

        // Queued behind a long navigation motion.
        let mut lease = self.heartbeating(self.executor.gate().acquire(OWNER)).await;

        self.tracker().sample(clock_now());
        let deviation = self.tracker().deviation();
        if deviation.abs() <= self.config.threshold_deg {
            debug!(deviation, "deviation resolved while waiting for lease");
            return Ok(None);
        }

        let correction = -deviation;
        info!(deviation, correction, "correcting heading");
        self.heartbeating(self.executor.execute_leased(&mut lease, Motion::turn(correction), Tracking::Direct))
            .await?;
        Ok(Some(correction))
    }

    /// Drive `fut` to completion, heartbeating every period meanwhile.
    async fn heartbeating<F: Future>(&self, fut: F) -> F::Output {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return out,
                _ = tokio::time::sleep(self.config.period()) => self.heartbeat(),
            }
        }
    }

    /// Tick every `period_ms` until `stop` is set.
    pub async fn run(&self, stop: Arc<AtomicBool>) -> Result<(), RoverError> {
        let mut ticker = tokio::time::interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !stop.load(Ordering::Relaxed) {
            ticker.tick().await;
            self.heartbeat();
            match self.tick().await {
                Ok(_) => {}
                Err(RoverError::Interrupted) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

enum Exit {
    Finished,
    Failed(String),
    Frozen,
}

/// Handle to a supervised correction loop.
pub struct Supervised {
    pub handle: JoinHandle<u32>,
    restarts: Arc<AtomicU32>,
}

impl Supervised {
    /// Restarts performed so far.
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }
}

/// Spawn `correction` under a restarting supervisor. The supervisor task
/// resolves to the number of restarts once the loop ends cleanly, `stop` is
/// set, or the restart budget is spent.
pub fn spawn_supervised(correction: Arc<HeadingCorrectionLoop>, stop: Arc<AtomicBool>) -> Supervised {
    let restarts = Arc::new(AtomicU32::new(0));
    let counter = restarts.clone();
    let handle = tokio::spawn(async move { supervise(correction, stop, counter).await });
    Supervised { handle, restarts }
}

async fn supervise(correction: Arc<HeadingCorrectionLoop>, stop: Arc<AtomicBool>, restarts: Arc<AtomicU32>) -> u32 {
    let config = correction.config.clone();
    let watchdog = correction.watchdog.clone();
    let timeout = Duration::from_millis(config.heartbeat_timeout_ms);
    // Check at least twice per deadline so a silent loop is caught promptly.
    let check_every = config.period().min(timeout / 2).max(Duration::from_millis(1));

    loop {
        watchdog.register_at(OWNER, timeout, clock_now());
        let mut task = {
            let correction = correction.clone();
            let stop = stop.clone();
            tokio::spawn(async move { correction.run(stop).await })
        };

        let exit = loop {
            tokio::select! {
                joined = &mut task => break match joined {
                    Ok(Ok(())) => Exit::Finished,
                    Ok(Err(e)) => Exit::Failed(e.to_string()),
                    Err(join) if join.is_panic() => Exit::Failed("panicked".to_string()),
                    Err(join) => Exit::Failed(join.to_string()),
                },
                _ = tokio::time::sleep(check_every) => {
                    if watchdog.check_all_at(clock_now()).iter().any(|id| id == OWNER) {
                        task.abort();
                        break Exit::Frozen;
                    }
                }
            }
        };

        match exit {
            Exit::Finished => {
                debug!("heading correction loop finished");
                break;
            }
            Exit::Failed(reason) => warn!(%reason, "heading correction loop failed"),
            Exit::Frozen => warn!("heading correction loop missed its heartbeat"),
        }

        if stop.load(Ordering::Relaxed) {
            break;
        }
        let done = restarts.load(Ordering::Relaxed);
        if done >= config.max_restarts {
            error!(restarts = done, "heading correction restart budget exhausted");
            break;
        }
        restarts.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(config.restart_backoff_ms)).await;
        info!(restart = done + 1, "restarting heading correction loop");
    }

    watchdog.unregister(OWNER);
    restarts.load(Ordering::Relaxed)
}
