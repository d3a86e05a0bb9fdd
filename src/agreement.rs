//! Bland-Altman agreement between two speed measurements of the same trials.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::types::{Method, TrialResult};

/// z-value of the 95 % limits of agreement
pub const LOA_Z: f64 = 1.96;

/// One pair plotted on a Bland-Altman chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgreementPoint {
    pub mean: f64,
    pub diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementStats {
    pub n: usize,
    pub points: Vec<AgreementPoint>,
    /// Mean of `a - b`
    pub bias: f64,
    /// Population standard deviation of `a - b`
    pub sd: f64,
    pub lower_loa: f64,
    pub upper_loa: f64,
}

impl AgreementStats {
    pub fn compute(a: &[f64], b: &[f64]) -> GateResult<Self> {
        if a.len() != b.len() {
            return Err(GateError::LengthMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        if a.is_empty() {
            return Err(GateError::InsufficientData {
                needed: 1,
                actual: 0,
            });
        }

        let a = Array1::from(a.to_vec());
        let b = Array1::from(b.to_vec());
        let diff = &a - &b;
        let mean = (&a + &b) / 2.0;

        let bias = diff.mean().unwrap_or(0.0);
        let sd = diff.std(0.0);

        let points = mean
            .iter()
            .zip(diff.iter())
            .map(|(&mean, &diff)| AgreementPoint { mean, diff })
            .collect();

        Ok(Self {
            n: diff.len(),
            points,
            bias,
            sd,
            lower_loa: bias - LOA_Z * sd,
            upper_loa: bias + LOA_Z * sd,
        })
    }

    /// Velocity against distance/time over successful trials
    pub fn between_methods(trials: &[TrialResult]) -> GateResult<Self> {
        let (velocity, distance): (Vec<f64>, Vec<f64>) = trials
            .iter()
            .map(|t| {
                (
                    t.estimate(Method::Velocity).speed_mps,
                    t.estimate(Method::DistanceTime).speed_mps,
                )
            })
            .unzip();
        Self::compute(&velocity, &distance)
    }
}

/// Named numeric columns of a comma-separated table with a header row
#[derive(Debug, Clone, Default)]
pub struct SpeedTable {
    pub columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl SpeedTable {
    pub fn load(path: &Path) -> GateResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GateError::load(path, e.to_string()))?;
        Self::parse(&text).map_err(|reason| GateError::load(path, reason))
    }

    /// Non-numeric or empty cells are kept as missing
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut records = csv_records(text)?.into_iter();
        let header = records.next().ok_or_else(|| "empty file".to_string())?;
        let columns: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();

        let rows = records
            .map(|record| {
                let mut row: Vec<Option<f64>> = record
                    .iter()
                    .map(|cell| cell.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
                    .collect();
                row.resize(columns.len(), None);
                row
            })
            .collect();

        Ok(Self { columns, rows })
    }

    fn column_index(&self, name: &str) -> GateResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| GateError::invalid_config(format!("no column named '{}'", name)))
    }

    /// Value pairs of two columns, skipping rows where either is missing
    pub fn pairs(&self, a: &str, b: &str) -> GateResult<(Vec<f64>, Vec<f64>)> {
        let ia = self.column_index(a)?;
        let ib = self.column_index(b)?;
        let mut skipped = 0;
        let pairs: (Vec<f64>, Vec<f64>) = self
            .rows
            .iter()
            .filter_map(|row| match (row[ia], row[ib]) {
                (Some(x), Some(y)) => Some((x, y)),
                _ => {
                    skipped += 1;
                    None
                }
            })
            .unzip();
        if skipped > 0 {
            log::warn!("{} vs {}: skipped {} incomplete rows", a, b, skipped);
        }
        Ok(pairs)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Split comma-separated text into records of fields.
///
/// Fields may be wrapped in double quotes, in which case they can hold
/// commas, newlines and `""` for a literal quote. Blank lines are skipped.
fn csv_records(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => {
                    if c == '\n' {
                        line += 1;
                    }
                    field.push(c);
                }
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                if record.iter().any(|f| !f.trim().is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(format!("unterminated quoted field before line {}", line));
    }
    record.push(field);
    if record.iter().any(|f| !f.trim().is_empty()) {
        records.push(record);
    }
    Ok(records)
}

/// Agreement of each `methods` column with the `reference` column
pub fn compare_columns(
    table: &SpeedTable,
    reference: &str,
    methods: &[String],
) -> GateResult<BTreeMap<String, AgreementStats>> {
    let mut out = BTreeMap::new();
    for method in methods {
        let (reference_values, method_values) = table.pairs(reference, method)?;
        let stats = AgreementStats::compute(&reference_values, &method_values)?;
        out.insert(method.clone(), stats);
    }
    Ok(out)
}
