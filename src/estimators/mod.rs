pub mod distance_time;
pub mod velocity;

pub use distance_time::DistanceTimeEstimator;
pub use velocity::{VelocityEstimator, VelocityProfile};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::types::{Method, MethodEstimates, SpeedEstimate, Trajectory};
use crate::windowing::{window_for, WindowedTrajectory};

/// Speed estimation from a gate-windowed trajectory.
///
/// Implementations are pure: identical inputs give identical estimates.
pub trait SpeedEstimator: Send + Sync {
    fn method(&self) -> Method;

    /// Estimate from samples that already passed the coarse window
    fn estimate_windowed(
        &self,
        windowed: &WindowedTrajectory,
        config: &GateConfig,
    ) -> GateResult<SpeedEstimate>;

    /// Window `trajectory` with `config` and estimate
    fn estimate(&self, trajectory: &Trajectory, config: &GateConfig) -> GateResult<SpeedEstimate> {
        let windowed = window_for(trajectory, config)?;
        self.estimate_windowed(&windowed, config)
    }
}

pub fn estimator_for(method: Method) -> Box<dyn SpeedEstimator> {
    match method {
        Method::Velocity => Box::new(VelocityEstimator),
        Method::DistanceTime => Box::new(DistanceTimeEstimator),
    }
}

fn run_method(
    method: Method,
    windowed: &WindowedTrajectory,
    config: &GateConfig,
) -> GateResult<SpeedEstimate> {
    estimator_for(method)
        .estimate_windowed(windowed, config)
        .map_err(|e| {
            log::debug!("{} estimator failed: {}", method, e);
            e
        })
}

/// Run both methods on one coarse window.
///
/// Fails with the first method error; a trial never carries a partial result.
pub fn estimate_all(
    windowed: &WindowedTrajectory,
    config: &GateConfig,
) -> GateResult<MethodEstimates> {
    Ok(MethodEstimates {
        velocity: run_method(Method::Velocity, windowed, config)?,
        distance_time: run_method(Method::DistanceTime, windowed, config)?,
    })
}

pub(crate) fn check_sampling_rate(sampling_rate: f64) -> GateResult<()> {
    if sampling_rate.is_finite() && sampling_rate > 0.0 {
        Ok(())
    } else {
        Err(GateError::invalid_config(format!(
            "sampling_rate must be positive, got {}",
            sampling_rate
        )))
    }
}
