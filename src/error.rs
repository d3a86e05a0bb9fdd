use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which spatial filter produced no samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStage {
    /// Gate interval widened by the capture margin
    Coarse,
    /// Strictly between the two gates
    Interior,
}

impl fmt::Display for WindowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowStage::Coarse => write!(f, "coarse"),
            WindowStage::Interior => write!(f, "interior"),
        }
    }
}

/// Timing gate error types
#[derive(Error, Debug)]
pub enum GateError {
    #[error("No samples in the {stage} window: trajectory never crossed the gate region")]
    EmptyWindow { stage: WindowStage },

    #[error("Zero elapsed samples between gate crossings (single interior sample at index {index})")]
    DivisionByZero { index: usize },

    #[error("Invalid running axis '{0}': use 'x' or 'y'")]
    InvalidAxis(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Length mismatch: {left} vs {right} samples")]
    LengthMismatch { left: usize, right: usize },

    #[error("Insufficient data: need at least {needed} samples, got {actual}")]
    InsufficientData { needed: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for timing gate operations
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GateError::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        GateError::InvalidConfig(msg.into())
    }

    /// Configuration mistakes apply to every trial and must stop the batch.
    /// Everything else only invalidates the trial that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GateError::InvalidAxis(_) | GateError::InvalidConfig(_))
    }

    /// Short machine-readable label used in batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::EmptyWindow { .. } => "empty_window",
            GateError::DivisionByZero { .. } => "division_by_zero",
            GateError::InvalidAxis(_) => "invalid_axis",
            GateError::InvalidConfig(_) => "invalid_config",
            GateError::Load { .. } => "load",
            GateError::LengthMismatch { .. } => "length_mismatch",
            GateError::InsufficientData { .. } => "insufficient_data",
            GateError::Io(_) => "io",
            GateError::Json(_) => "json",
        }
    }
}
