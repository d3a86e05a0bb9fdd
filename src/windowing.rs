//! Spatial windowing of a trajectory around the timing gates.
//!
//! Two stages:
//! 1. Coarse window: `[gate2 - margin, gate1 + margin]`, inclusive by default.
//! 2. Interior window: `(gate2, gate1)`, exclusive by default, selected from
//!    the coarse-windowed samples.
//!
//! Interior indices are positions inside the coarse-windowed sequence, not
//! inside the raw recording. The distance/time estimator counts elapsed
//! frames with them, so the inclusion rule of each stage changes the result.

use nalgebra::Point3;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult, WindowStage};
use crate::types::{Axis, Trajectory};

/// Whether a window boundary admits samples lying exactly on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    Inclusive,
    Exclusive,
}

impl Inclusion {
    pub fn contains(self, lower: f64, upper: f64, value: f64) -> bool {
        match self {
            Inclusion::Inclusive => value >= lower && value <= upper,
            Inclusion::Exclusive => value > lower && value < upper,
        }
    }
}

/// Boundary rule for each windowing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub coarse: Inclusion,
    pub interior: Inclusion,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            coarse: Inclusion::Inclusive,
            interior: Inclusion::Exclusive,
        }
    }
}

/// Samples kept by the coarse window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedTrajectory {
    pub axis: Axis,
    /// Axis coordinate of each kept sample
    pub positions: Array1<f64>,
    /// Full 3D position of each kept sample
    pub points: Vec<Point3<f64>>,
    /// Frame index of each kept sample in the source trajectory
    pub source_indices: Vec<usize>,
}

/// Samples strictly between the gates
#[derive(Debug, Clone, PartialEq)]
pub struct InteriorWindow {
    /// First interior index into the coarse-windowed sequence
    pub first: usize,
    /// Last interior index into the coarse-windowed sequence
    pub last: usize,
    pub indices: Vec<usize>,
    pub positions: Array1<f64>,
}

impl InteriorWindow {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Frames between first and last interior sample
    pub fn elapsed_samples(&self) -> usize {
        self.last - self.first
    }
}

/// Indices of `positions` inside the gate interval (`gate2_pos`, `gate1_pos`)
pub fn interior_indices<'a>(
    positions: impl IntoIterator<Item = &'a f64>,
    gate1_pos: f64,
    gate2_pos: f64,
    inclusion: Inclusion,
) -> Vec<usize> {
    positions
        .into_iter()
        .enumerate()
        .filter(|(_, p)| inclusion.contains(gate2_pos, gate1_pos, **p))
        .map(|(i, _)| i)
        .collect()
}

/// Restrict `trajectory` to the gate interval widened by `margin`
pub fn window(
    trajectory: &Trajectory,
    axis: Axis,
    gate1_pos: f64,
    gate2_pos: f64,
    margin: f64,
    inclusion: Inclusion,
) -> GateResult<WindowedTrajectory> {
    let lower = gate2_pos - margin;
    let upper = gate1_pos + margin;
    let idx = axis.index();

    let mut positions = Vec::new();
    let mut points = Vec::new();
    let mut source_indices = Vec::new();

    for (i, point) in trajectory.points.iter().enumerate() {
        let p = point[idx];
        if inclusion.contains(lower, upper, p) {
            positions.push(p);
            points.push(*point);
            source_indices.push(i);
        }
    }

    if positions.is_empty() {
        return Err(GateError::EmptyWindow {
            stage: WindowStage::Coarse,
        });
    }

    log::debug!(
        "coarse window [{:.3}, {:.3}] on {}: kept {} of {} samples",
        lower,
        upper,
        axis,
        positions.len(),
        trajectory.len()
    );

    Ok(WindowedTrajectory {
        axis,
        positions: Array1::from(positions),
        points,
        source_indices,
    })
}

/// Coarse window using the gate setup in `config`
pub fn window_for(trajectory: &Trajectory, config: &GateConfig) -> GateResult<WindowedTrajectory> {
    window(
        trajectory,
        config.axis,
        config.gate1_pos,
        config.gate2_pos,
        config.margin,
        config.bounds.coarse,
    )
}

impl WindowedTrajectory {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Select the interior samples between the gates
    pub fn interior(
        &self,
        gate1_pos: f64,
        gate2_pos: f64,
        inclusion: Inclusion,
    ) -> GateResult<InteriorWindow> {
        let indices = interior_indices(&self.positions, gate1_pos, gate2_pos, inclusion);

        let (first, last) = match (indices.first(), indices.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => {
                return Err(GateError::EmptyWindow {
                    stage: WindowStage::Interior,
                })
            }
        };

        let positions = indices.iter().map(|&i| self.positions[i]).collect();

        Ok(InteriorWindow {
            first,
            last,
            indices,
            positions,
        })
    }

    /// Interior window using the gate setup in `config`
    pub fn interior_for(&self, config: &GateConfig) -> GateResult<InteriorWindow> {
        self.interior(config.gate1_pos, config.gate2_pos, config.bounds.interior)
    }
}
