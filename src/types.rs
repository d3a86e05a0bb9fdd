use std::fmt;
use std::str::FromStr;

use nalgebra::Point3;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::validator::SpeedBounds;

/// Principal running direction in the lab coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Column of the axis inside an (x, y, z) sample
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }
}

impl FromStr for Axis {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            _ => Err(GateError::InvalidAxis(s.to_string())),
        }
    }
}

impl TryFrom<String> for Axis {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Axis> for String {
    fn from(axis: Axis) -> Self {
        axis.to_string()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
        }
    }
}

/// Marker trajectory sampled at a fixed rate, in meters.
///
/// Sample order is acquisition order; frames are assumed evenly spaced
/// with no gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub points: Vec<Point3<f64>>,
    pub sampling_rate: f64,
}

impl Trajectory {
    pub fn new(points: Vec<Point3<f64>>, sampling_rate: f64) -> Self {
        Self {
            points,
            sampling_rate,
        }
    }

    /// Build from raw (x, y, z) triples
    pub fn from_xyz(samples: &[[f64; 3]], sampling_rate: f64) -> Self {
        let points = samples
            .iter()
            .map(|s| Point3::new(s[0], s[1], s[2]))
            .collect();
        Self::new(points, sampling_rate)
    }

    /// Per-frame midpoint of a bilateral marker pair (e.g. left/right SIPS)
    pub fn midpoint(left: &Trajectory, right: &Trajectory) -> GateResult<Trajectory> {
        if left.len() != right.len() {
            return Err(GateError::LengthMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        if left.sampling_rate != right.sampling_rate {
            return Err(GateError::invalid_config(format!(
                "marker sampling rates differ: {} Hz vs {} Hz",
                left.sampling_rate, right.sampling_rate
            )));
        }

        let points = left
            .points
            .iter()
            .zip(right.points.iter())
            .map(|(l, r)| nalgebra::center(l, r))
            .collect();

        Ok(Trajectory::new(points, left.sampling_rate))
    }

    /// Coordinate series along the running axis
    pub fn axis_positions(&self, axis: Axis) -> Array1<f64> {
        let idx = axis.index();
        self.points.iter().map(|p| p[idx]).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Recording length in seconds
    pub fn duration(&self) -> f64 {
        if self.sampling_rate > 0.0 {
            self.len() as f64 / self.sampling_rate
        } else {
            0.0
        }
    }
}

/// Speed estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Mean of the differentiated position signal
    Velocity,
    /// Gate distance over crossing time
    DistanceTime,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Velocity, Method::DistanceTime];

    pub fn name(self) -> &'static str {
        match self {
            Method::Velocity => "velocity",
            Method::DistanceTime => "distance_time",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar speed and its pass/fail verdict against the target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedEstimate {
    pub speed_mps: f64,
    pub is_valid: bool,
}

/// One estimate per method; serialised as a map keyed by method name
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodEstimates {
    pub velocity: SpeedEstimate,
    pub distance_time: SpeedEstimate,
}

impl MethodEstimates {
    pub fn get(&self, method: Method) -> SpeedEstimate {
        match method {
            Method::Velocity => self.velocity,
            Method::DistanceTime => self.distance_time,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Method, SpeedEstimate)> + '_ {
        Method::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

/// Everything computed for one recorded trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub filename: String,
    pub estimates: MethodEstimates,
    pub bounds: SpeedBounds,
}

impl TrialResult {
    pub fn estimate(&self, method: Method) -> SpeedEstimate {
        self.estimates.get(method)
    }
}
