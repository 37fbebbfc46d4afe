//! [`Watchdog`] – heartbeat deadlines for background tasks.
//!
//! A background task (the heading-correction loop) calls
//! [`Watchdog::heartbeat`] once per tick. Its supervisor periodically calls
//! [`Watchdog::check_all`]; a component whose last heartbeat is older than
//! its deadline is reported frozen and gets restarted.
//!
//! The watchdog is shared between the task and its supervisor, so all
//! methods take `&self`. The `*_at` variants accept an explicit clock
//! reading for callers running on a virtual clock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health state reported for a single component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    TimedOut,
}

struct ComponentEntry {
    last_heartbeat: Instant,
    timeout: Duration,
}

impl ComponentEntry {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_heartbeat) > self.timeout
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats from registered tasks and detects frozen ones.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sweepbot_kernel::watchdog::{ComponentHealth, Watchdog};
///
/// let wd = Watchdog::new();
/// wd.register("heading_correction", Duration::from_secs(1));
/// wd.heartbeat("heading_correction");
///
/// assert_eq!(wd.health("heading_correction"), ComponentHealth::Healthy);
/// ```
#[derive(Default)]
pub struct Watchdog {
    components: Mutex<HashMap<String, ComponentEntry>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ComponentEntry>> {
        self.components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `component_id` with a maximum heartbeat `timeout`, starting
    /// healthy. Re-registering resets the deadline.
    pub fn register(&self, component_id: &str, timeout: Duration) {
        self.register_at(component_id, timeout, Instant::now());
    }

    pub fn register_at(&self, component_id: &str, timeout: Duration, now: Instant) {
        self.lock().insert(
            component_id.to_string(),
            ComponentEntry {
                last_heartbeat: now,
                timeout,
            },
        );
    }

    pub fn unregister(&self, component_id: &str) {
        self.lock().remove(component_id);
    }

    /// Record a heartbeat for `component_id`. No-op for unknown components.
    pub fn heartbeat(&self, component_id: &str) {
        self.heartbeat_at(component_id, Instant::now());
    }

    pub fn heartbeat_at(&self, component_id: &str, now: Instant) {
        if let Some(entry) = self.lock().get_mut(component_id) {
            entry.last_heartbeat = now;
        }
    }

    /// Unknown components are reported as [`ComponentHealth::TimedOut`].
    pub fn health(&self, component_id: &str) -> ComponentHealth {
        self.health_at(component_id, Instant::now())
    }

    pub fn health_at(&self, component_id: &str, now: Instant) -> ComponentHealth {
        match self.lock().get(component_id) {
            Some(entry) if !entry.expired(now) => ComponentHealth::Healthy,
            _ => ComponentHealth::TimedOut,
        }
    }

    /// IDs of all components past their deadline, in no particular order.
    pub fn check_all(&self) -> Vec<String> {
        self.check_all_at(Instant::now())
    }

    pub fn check_all_at(&self, now: Instant) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.expired(now))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_component_is_healthy() {
        let wd = Watchdog::new();
        wd.register("heading_correction", Duration::from_secs(5));
        assert_eq!(wd.health("heading_correction"), ComponentHealth::Healthy);
    }

    #[test]
    fn heartbeat_resets_deadline() {
        let wd = Watchdog::new();
        wd.register("heading_correction", Duration::from_millis(40));
        thread::sleep(Duration::from_millis(25));
        wd.heartbeat("heading_correction");
        thread::sleep(Duration::from_millis(25));
        assert_eq!(wd.health("heading_correction"), ComponentHealth::Healthy);
    }

    #[test]
    fn component_times_out_when_silent() {
        let wd = Watchdog::new();
        wd.register("heading_correction", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.health("heading_correction"), ComponentHealth::TimedOut);
    }

    #[test]
    fn check_all_returns_frozen_components() {
        let wd = Watchdog::new();
        let t0 = Instant::now();
        wd.register_at("fast", Duration::from_millis(20), t0);
        wd.register_at("slow", Duration::from_secs(60), t0);

        let frozen = wd.check_all_at(t0 + Duration::from_millis(30));
        assert_eq!(frozen, vec!["fast".to_string()]);
    }

    #[test]
    fn explicit_clock_heartbeats() {
        let wd = Watchdog::new();
        let t0 = Instant::now();
        wd.register_at("loop", Duration::from_millis(100), t0);
        wd.heartbeat_at("loop", t0 + Duration::from_millis(90));
        assert_eq!(
            wd.health_at("loop", t0 + Duration::from_millis(150)),
            ComponentHealth::Healthy
        );
        assert_eq!(
            wd.health_at("loop", t0 + Duration::from_millis(250)),
            ComponentHealth::TimedOut
        );
    }

    #[test]
    fn unknown_and_unregistered_components_are_timed_out() {
        let wd = Watchdog::new();
        wd.heartbeat("ghost");
        assert_eq!(wd.health("ghost"), ComponentHealth::TimedOut);

        wd.register("loop", Duration::from_secs(60));
        wd.unregister("loop");
        assert_eq!(wd.health("loop"), ComponentHealth::TimedOut);
        assert!(wd.check_all().is_empty());
    }

    #[test]
    fn reregister_resets_timer() {
        let wd = Watchdog::new();
        wd.register("comp", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.health("comp"), ComponentHealth::TimedOut);
        wd.register("comp", Duration::from_secs(60));
        assert_eq!(wd.health("comp"), ComponentHealth::Healthy);
    }
}
