//! Generic `RangeSource` trait for rotating rangefinders, and the scoped
//! [`ScanGuard`] that owns a running scan.
//!
//! The rangefinder motor must be stopped on every exit path, including early
//! returns and panics while a scan is being processed. [`ScanGuard`] starts
//! the source on construction and stops it on drop.

use std::ops::{Deref, DerefMut};

use sweepbot_types::{RoverError, ScanPoint};
use tracing::debug;

/// A rotating rangefinder producing an effectively infinite sample stream.
pub trait RangeSource: Send {
    /// Spin up the sensor and begin streaming samples.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the device cannot be started.
    fn start_scan(&mut self) -> Result<(), RoverError>;

    /// Stop streaming and spin down. Must be safe to call more than once.
    fn stop_scan(&mut self);

    /// Next sample in time order, or `None` on a dropout. May block on
    /// the device, so async callers drive scans from the blocking pool.
    fn next_sample(&mut self) -> Option<ScanPoint>;
}

/// RAII handle over a started [`RangeSource`].
pub struct ScanGuard<'a, S: RangeSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: RangeSource + ?Sized> ScanGuard<'a, S> {
    /// Start `source` and return a guard that stops it when dropped.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`RangeSource::start_scan`]. The source is
    /// stopped before returning so a half-started device is not left
    /// spinning.
    pub fn start(source: &'a mut S) -> Result<Self, RoverError> {
        if let Err(e) = source.start_scan() {
            source.stop_scan();
            return Err(e);
        }
        debug!("range source started");
        Ok(Self { source })
    }
}

impl<S: RangeSource + ?Sized> Deref for ScanGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: RangeSource + ?Sized> DerefMut for ScanGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: RangeSource + ?Sized> Drop for ScanGuard<'_, S> {
    fn drop(&mut self) {
        self.source.stop_scan();
        debug!("range source stopped");
    }
}
