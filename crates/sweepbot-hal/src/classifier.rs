//! Interfaces to the collectibility checks run in front of an object.
//!
//! Both checks are external collaborators: a pretrained image classifier and
//! an ultrasonic range compared against the LiDAR estimate. The core only
//! sees their verdicts.

use serde::{Deserialize, Serialize};

use crate::camera::CameraFrame;

/// Verdict of the garbage classifier for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// `true` if the object in frame was recognised as garbage.
    pub garbage: bool,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Image classifier deciding whether a photographed object is garbage.
pub trait GarbageClassifier: Send {
    /// Classify `frame`. `None` means the model produced no usable answer.
    fn classify(&mut self, frame: &CameraFrame) -> Option<Classification>;
}

/// Corroborates a LiDAR detection with a second, taller-mounted range
/// sensor: if it also sees something at the expected distance the object is
/// too tall to collect.
pub trait TallObjectCheck: Send {
    /// `Some(true)` if an object is present near `expected_distance_mm`,
    /// `None` if no reading could be taken.
    fn is_tall_object(&mut self, expected_distance_mm: f32) -> Option<bool>;
}
