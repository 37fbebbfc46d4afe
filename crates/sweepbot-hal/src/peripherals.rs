//! [`Peripherals`] – the perception drivers consumed by navigation.
//!
//! The drive base is not part of this bundle: it sits behind the
//! actuation gate so every motion command goes through one place. What
//! remains are the sensors the navigation controller polls directly, each
//! owned exclusively by it.

use crate::camera::Camera;
use crate::classifier::{GarbageClassifier, TallObjectCheck};
use crate::ranging::RangeSource;

/// Owned set of perception drivers.
pub struct Peripherals {
    pub range: Box<dyn RangeSource>,
    pub camera: Box<dyn Camera>,
    pub classifier: Box<dyn GarbageClassifier>,
    pub tall_check: Box<dyn TallObjectCheck>,
}

impl Peripherals {
    pub fn new(
        range: Box<dyn RangeSource>,
        camera: Box<dyn Camera>,
        classifier: Box<dyn GarbageClassifier>,
        tall_check: Box<dyn TallObjectCheck>,
    ) -> Self {
        Self {
            range,
            camera,
            classifier,
            tall_check,
        }
    }
}
