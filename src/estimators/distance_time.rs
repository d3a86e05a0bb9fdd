use super::{check_sampling_rate, SpeedEstimator};
use crate::config::GateConfig;
use crate::error::{GateError, GateResult, WindowStage};
use crate::types::{Method, SpeedEstimate};
use crate::validator;
use crate::windowing::{interior_indices, Inclusion, WindowedTrajectory};

/// Chord estimate: known gate distance over the frames spent between the gates.
///
/// Elapsed time is `(last - first) / sampling_rate` with `first`/`last` the
/// first and last interior indices of the coarse window. It assumes evenly
/// spaced frames and a straight path along the gate axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceTimeEstimator;

/// `distance / ((last - first) / sampling_rate)`
pub fn chord_speed(first: usize, last: usize, distance: f64, sampling_rate: f64) -> GateResult<f64> {
    check_sampling_rate(sampling_rate)?;
    if last <= first {
        return Err(GateError::DivisionByZero { index: first });
    }
    let elapsed = (last - first) as f64 / sampling_rate;
    Ok(distance / elapsed)
}

impl DistanceTimeEstimator {
    /// Speed from coarse-windowed axis positions, gates exclusive
    pub fn estimate_positions(
        windowed_positions: &[f64],
        sampling_rate: f64,
        gate1_pos: f64,
        gate2_pos: f64,
        target_speed: f64,
        tolerance_pct: f64,
    ) -> GateResult<SpeedEstimate> {
        let indices = interior_indices(
            windowed_positions,
            gate1_pos,
            gate2_pos,
            Inclusion::Exclusive,
        );
        let (first, last) = match (indices.first(), indices.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => {
                return Err(GateError::EmptyWindow {
                    stage: WindowStage::Interior,
                })
            }
        };

        let distance = (gate1_pos - gate2_pos).abs();
        let speed = chord_speed(first, last, distance, sampling_rate)?;
        Ok(SpeedEstimate {
            speed_mps: speed,
            is_valid: validator::validate(speed, target_speed, tolerance_pct),
        })
    }
}

impl SpeedEstimator for DistanceTimeEstimator {
    fn method(&self) -> Method {
        Method::DistanceTime
    }

    fn estimate_windowed(
        &self,
        windowed: &WindowedTrajectory,
        config: &GateConfig,
    ) -> GateResult<SpeedEstimate> {
        let interior = windowed.interior_for(config)?;
        let speed = chord_speed(
            interior.first,
            interior.last,
            config.gate_distance(),
            config.sampling_rate,
        )?;

        log::debug!(
            "distance/time: frames {}..{} ({} interior samples) -> {:.3} m/s",
            interior.first,
            interior.last,
            interior.len(),
            speed
        );

        Ok(SpeedEstimate {
            speed_mps: speed,
            is_valid: validator::validate(speed, config.target_speed, config.tolerance_pct),
        })
    }
}
