//! Plot-ready intermediate data for one trial.
//!
//! Nothing here is rendered. The JSON written by the reporter carries the
//! velocity-vs-frame curve, the windowed 3D path and the gate/bound lines
//! so any external plotting tool can redraw the usual trial figures.

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::error::GateResult;
use crate::estimators::{VelocityEstimator, VelocityProfile};
use crate::types::Axis;
use crate::validator::SpeedBounds;
use crate::windowing::WindowedTrajectory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDiagnostics {
    pub filename: String,
    pub axis: Axis,
    pub velocity_profile: VelocityProfile,
    /// Coarse-windowed midpoint path (x, y, z) in meters
    pub coarse_points: Vec<[f64; 3]>,
    /// Source frame number of each coarse point
    pub source_frames: Vec<usize>,
    /// First and last interior index into `coarse_points`
    pub interior_range: (usize, usize),
    pub gate1_pos: f64,
    pub gate2_pos: f64,
    pub bounds: SpeedBounds,
    pub target_speed: f64,
}

impl TrialDiagnostics {
    pub fn build(
        filename: &str,
        windowed: &WindowedTrajectory,
        config: &GateConfig,
    ) -> GateResult<Self> {
        let interior = windowed.interior_for(config)?;
        let velocity_profile = VelocityEstimator::profile(interior.positions.view(), config.sampling_rate)?;

        Ok(Self {
            filename: filename.to_string(),
            axis: windowed.axis,
            velocity_profile,
            coarse_points: windowed.points.iter().map(|p| [p.x, p.y, p.z]).collect(),
            source_frames: windowed.source_indices.clone(),
            interior_range: (interior.first, interior.last),
            gate1_pos: config.gate1_pos,
            gate2_pos: config.gate2_pos,
            bounds: config.speed_bounds(),
            target_speed: config.target_speed,
        })
    }
}
