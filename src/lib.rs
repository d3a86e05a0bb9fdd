//! Running speed from motion-capture marker trajectories using virtual timing gates.
//!
//! A trial's bilateral marker midpoint is restricted to the region around two
//! gate positions on the running axis, then two independent estimators turn
//! it into a speed: the mean of the differentiated position signal, and the
//! known gate distance over the frames spent between the gates. Each speed is
//! checked against a target with a percentage tolerance.

pub mod agreement;
pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod estimators;
pub mod loader;
pub mod report;
pub mod types;
pub mod validator;
pub mod windowing;

pub use batch::{BatchOutcome, BatchReport, BatchRunner, TrialFailure};
pub use config::{BatchConfig, GateConfig, MarkerPair, RunConfig};
pub use error::{GateError, GateResult, WindowStage};
pub use estimators::{DistanceTimeEstimator, SpeedEstimator, VelocityEstimator};
pub use types::{Axis, Method, MethodEstimates, SpeedEstimate, Trajectory, TrialResult};
pub use validator::{validate, SpeedBounds};
pub use windowing::{window, Inclusion, WindowBounds, WindowedTrajectory};
