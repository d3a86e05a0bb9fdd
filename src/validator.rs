//! Target-speed bound check shared by both estimators.

use serde::{Deserialize, Serialize};

/// Acceptance interval around the target speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBounds {
    pub lower: f64,
    pub upper: f64,
}

impl SpeedBounds {
    /// `target * (1 ∓ tolerance_pct / 100)`.
    ///
    /// Tolerances above 100 % give a negative lower bound, which is kept as is.
    pub fn new(target_speed: f64, tolerance_pct: f64) -> Self {
        let fraction = tolerance_pct / 100.0;
        Self {
            lower: target_speed * (1.0 - fraction),
            upper: target_speed * (1.0 + fraction),
        }
    }

    /// Inclusive at both ends
    pub fn contains(&self, speed: f64) -> bool {
        self.lower <= speed && speed <= self.upper
    }
}

/// Pass/fail verdict for a computed speed
pub fn validate(speed: f64, target_speed: f64, tolerance_pct: f64) -> bool {
    SpeedBounds::new(target_speed, tolerance_pct).contains(speed)
}
