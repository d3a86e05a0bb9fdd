use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::{check_sampling_rate, SpeedEstimator};
use crate::config::GateConfig;
use crate::error::{GateError, GateResult, WindowStage};
use crate::types::{Method, SpeedEstimate};
use crate::validator;
use crate::windowing::WindowedTrajectory;

/// Instantaneous velocity along the running axis inside the gates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityProfile {
    /// One value per interior frame (m/s, signed)
    pub velocity: Vec<f64>,
    /// Signed mean of `velocity`
    pub mean_velocity: f64,
    /// `|mean_velocity|`
    pub mean_speed: f64,
}

/// Differentiates the interior position signal and averages it.
///
/// The signed mean cancels small back-and-forth jitter around the main
/// direction of travel. A subject that reverses inside the gates biases the
/// result without any error being raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityEstimator;

/// First difference scaled by `sampling_rate`, padded to the input length
/// by repeating the last velocity.
///
/// A single position yields a single zero velocity.
pub fn velocity_series(positions: ArrayView1<f64>, sampling_rate: f64) -> GateResult<Array1<f64>> {
    check_sampling_rate(sampling_rate)?;

    let n = positions.len();
    match n {
        0 => Err(GateError::EmptyWindow {
            stage: WindowStage::Interior,
        }),
        1 => Ok(Array1::zeros(1)),
        _ => {
            let diffs = (&positions.slice(s![1..]) - &positions.slice(s![..-1])) * sampling_rate;
            let last = diffs[n - 2];
            let mut velocity = diffs.to_vec();
            velocity.push(last);
            Ok(Array1::from(velocity))
        }
    }
}

impl VelocityEstimator {
    /// Velocity series and its mean for interior positions
    pub fn profile(positions: ArrayView1<f64>, sampling_rate: f64) -> GateResult<VelocityProfile> {
        let velocity = velocity_series(positions, sampling_rate)?;
        let mean_velocity = velocity.mean().ok_or(GateError::EmptyWindow {
            stage: WindowStage::Interior,
        })?;

        Ok(VelocityProfile {
            velocity: velocity.to_vec(),
            mean_velocity,
            mean_speed: mean_velocity.abs(),
        })
    }

    /// Speed from positions already restricted to the gate interior
    pub fn estimate_positions(
        interior_positions: &[f64],
        sampling_rate: f64,
        target_speed: f64,
        tolerance_pct: f64,
    ) -> GateResult<SpeedEstimate> {
        let profile = Self::profile(ArrayView1::from(interior_positions), sampling_rate)?;
        Ok(SpeedEstimate {
            speed_mps: profile.mean_speed,
            is_valid: validator::validate(profile.mean_speed, target_speed, tolerance_pct),
        })
    }

    /// Velocity profile of the interior of a coarse window
    pub fn profile_windowed(
        windowed: &WindowedTrajectory,
        config: &GateConfig,
    ) -> GateResult<VelocityProfile> {
        let interior = windowed.interior_for(config)?;
        Self::profile(interior.positions.view(), config.sampling_rate)
    }
}

impl SpeedEstimator for VelocityEstimator {
    fn method(&self) -> Method {
        Method::Velocity
    }

    fn estimate_windowed(
        &self,
        windowed: &WindowedTrajectory,
        config: &GateConfig,
    ) -> GateResult<SpeedEstimate> {
        let profile = Self::profile_windowed(windowed, config)?;
        Ok(SpeedEstimate {
            speed_mps: profile.mean_speed,
            is_valid: validator::validate(
                profile.mean_speed,
                config.target_speed,
                config.tolerance_pct,
            ),
        })
    }
}
