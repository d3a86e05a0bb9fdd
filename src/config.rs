//! Run configuration.
//!
//! One [`RunConfig`] is built per batch invocation (JSON file and/or CLI
//! flags) and shared read-only by every trial and both estimators.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::types::Axis;
use crate::validator::SpeedBounds;
use crate::windowing::WindowBounds;

/// Capture margin around the gates in meters
pub const DEFAULT_MARGIN: f64 = 0.5;

/// Virtual timing gate setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Gate 1 position along the running axis (m). Entry gate, further along +axis.
    pub gate1_pos: f64,
    /// Gate 2 position along the running axis (m)
    pub gate2_pos: f64,
    /// Target running speed (m/s)
    pub target_speed: f64,
    /// Accepted deviation from the target in percent (+/-)
    pub tolerance_pct: f64,
    /// Marker sampling frequency (Hz)
    pub sampling_rate: f64,
    pub axis: Axis,
    /// Widening of the gate interval for the coarse window (m)
    pub margin: f64,
    pub bounds: WindowBounds,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            gate1_pos: 1.7,
            gate2_pos: -0.5,
            target_speed: 3.5,
            tolerance_pct: 10.0,
            sampling_rate: 200.0,
            axis: Axis::Y,
            margin: DEFAULT_MARGIN,
            bounds: WindowBounds::default(),
        }
    }
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check parameter ranges.
    ///
    /// Gate order is not enforced; reversed gates simply leave the interior empty.
    pub fn validate(&self) -> GateResult<()> {
        if !self.gate1_pos.is_finite() || !self.gate2_pos.is_finite() {
            return Err(GateError::invalid_config("gate positions must be finite"));
        }
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(GateError::invalid_config("sampling_rate must be positive"));
        }
        if !(self.target_speed.is_finite() && self.target_speed > 0.0) {
            return Err(GateError::invalid_config("target_speed must be positive"));
        }
        if !(self.tolerance_pct.is_finite() && self.tolerance_pct >= 0.0) {
            return Err(GateError::invalid_config(
                "tolerance_pct must be non-negative",
            ));
        }
        if !(self.margin.is_finite() && self.margin >= 0.0) {
            return Err(GateError::invalid_config("margin must be non-negative"));
        }
        Ok(())
    }

    /// Gate 1 is expected above gate 2 on the running axis
    pub fn gates_ordered(&self) -> bool {
        self.gate1_pos > self.gate2_pos
    }

    /// Known physical distance between the gates (m)
    pub fn gate_distance(&self) -> f64 {
        (self.gate1_pos - self.gate2_pos).abs()
    }

    pub fn speed_bounds(&self) -> SpeedBounds {
        SpeedBounds::new(self.target_speed, self.tolerance_pct)
    }

    #[must_use]
    pub fn with_gates(mut self, gate1_pos: f64, gate2_pos: f64) -> Self {
        self.gate1_pos = gate1_pos;
        self.gate2_pos = gate2_pos;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target_speed: f64, tolerance_pct: f64) -> Self {
        self.target_speed = target_speed;
        self.tolerance_pct = tolerance_pct;
        self
    }

    #[must_use]
    pub fn with_sampling_rate(mut self, sampling_rate: f64) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    #[must_use]
    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }

    #[must_use]
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: WindowBounds) -> Self {
        self.bounds = bounds;
        self
    }
}

/// Bilateral marker pair whose midpoint is tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPair {
    pub left: String,
    pub right: String,
}

impl Default for MarkerPair {
    fn default() -> Self {
        Self {
            left: "SIPS_left".to_string(),
            right: "SIPS_right".to_string(),
        }
    }
}

/// File-level settings for one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Trial file extension without the dot; `<ext>.gz` is accepted too
    pub extension: String,
    pub markers: MarkerPair,
    /// Multiplier from file units to meters (Qualisys exports millimeters)
    pub unit_scale: f64,
    /// Worker threads (1 = sequential)
    pub jobs: usize,
    /// Write per-trial plot data next to the results
    pub write_diagnostics: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("processed_data"),
            extension: "tsv".to_string(),
            markers: MarkerPair::default(),
            unit_scale: 0.001,
            jobs: 1,
            write_diagnostics: false,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> GateResult<()> {
        if !(self.unit_scale.is_finite() && self.unit_scale > 0.0) {
            return Err(GateError::invalid_config("unit_scale must be positive"));
        }
        if self.jobs == 0 {
            return Err(GateError::invalid_config("jobs must be at least 1"));
        }
        if self.extension.trim().is_empty() {
            return Err(GateError::invalid_config("extension must not be empty"));
        }
        if self.markers.left.is_empty() || self.markers.right.is_empty() {
            return Err(GateError::invalid_config("marker names must not be empty"));
        }
        Ok(())
    }
}

/// Complete configuration of one batch invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub gates: GateConfig,
    pub batch: BatchConfig,
}

impl RunConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> GateResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            GateError::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> GateResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| GateError::invalid_config(format!("config parse error: {}", e)))
    }

    pub fn validate(&self) -> GateResult<()> {
        self.gates.validate()?;
        self.batch.validate()
    }
}
