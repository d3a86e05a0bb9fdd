//! Qualisys TSV trial loading.
//!
//! Export layout: `KEY<TAB>value...` metadata lines, then a header row naming
//! the columns (`<marker> X`, `<marker> Y`, `<marker> Z`, ...), then one row
//! per frame. Files may be gzip-compressed (`.tsv.gz`).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::config::MarkerPair;
use crate::error::{GateError, GateResult};
use crate::types::Trajectory;

const AXES: [&str; 3] = ["X", "Y", "Z"];

/// Header block of a Qualisys export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QtmMetadata {
    pub frequency: Option<f64>,
    pub no_of_frames: Option<usize>,
    pub marker_names: Vec<String>,
    /// Every other `KEY<TAB>value` line, values re-joined with tabs
    pub fields: BTreeMap<String, String>,
}

impl QtmMetadata {
    fn absorb(&mut self, line: &str) {
        let mut parts = line.split('\t');
        let key = match parts.next() {
            Some(k) if !k.trim().is_empty() => k.trim().to_string(),
            _ => return,
        };
        let values: Vec<&str> = parts.map(str::trim).filter(|v| !v.is_empty()).collect();

        match key.as_str() {
            "FREQUENCY" => self.frequency = values.first().and_then(|v| v.parse().ok()),
            "NO_OF_FRAMES" => self.no_of_frames = values.first().and_then(|v| v.parse().ok()),
            "MARKER_NAMES" => self.marker_names = values.iter().map(|v| v.to_string()).collect(),
            _ => {
                self.fields.insert(key, values.join("\t"));
            }
        }
    }
}

/// Midpoint trajectory of one trial and the file's metadata
#[derive(Debug, Clone)]
pub struct LoadedTrial {
    pub metadata: QtmMetadata,
    pub trajectory: Trajectory,
}

/// Reads marker columns from Qualisys exports and builds the bilateral midpoint
#[derive(Debug, Clone)]
pub struct TrialLoader {
    pub markers: MarkerPair,
    /// File units to meters
    pub unit_scale: f64,
    pub sampling_rate: f64,
}

impl TrialLoader {
    pub fn new(markers: MarkerPair, unit_scale: f64, sampling_rate: f64) -> Self {
        Self {
            markers,
            unit_scale,
            sampling_rate,
        }
    }

    fn column_names(&self) -> [String; 6] {
        let l = &self.markers.left;
        let r = &self.markers.right;
        [
            format!("{} {}", l, AXES[0]),
            format!("{} {}", l, AXES[1]),
            format!("{} {}", l, AXES[2]),
            format!("{} {}", r, AXES[0]),
            format!("{} {}", r, AXES[1]),
            format!("{} {}", r, AXES[2]),
        ]
    }

    /// Load a `.tsv` or `.tsv.gz` file
    pub fn load(&self, path: &Path) -> GateResult<LoadedTrial> {
        let file = File::open(path).map_err(|e| GateError::load(path, e.to_string()))?;
        if is_gzip(path) {
            self.parse(BufReader::new(GzDecoder::new(file)), path)
        } else {
            self.parse(BufReader::new(file), path)
        }
    }

    /// Parse an export from any buffered reader; `source` is only used in errors
    pub fn parse<R: BufRead>(&self, reader: R, source: &Path) -> GateResult<LoadedTrial> {
        let wanted = self.column_names();
        let mut metadata = QtmMetadata::default();
        let mut columns: Option<[usize; 6]> = None;
        let mut left = Vec::new();
        let mut right = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| GateError::load(source, e.to_string()))?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            let cols = match columns {
                Some(cols) => cols,
                None => {
                    columns = find_header(line, &wanted);
                    if columns.is_none() {
                        metadata.absorb(line);
                    }
                    continue;
                }
            };

            let fields: Vec<&str> = line.split('\t').collect();
            let mut values = [0.0; 6];
            for (slot, (&col, name)) in values.iter_mut().zip(cols.iter().zip(wanted.iter())) {
                let cell = fields.get(col).map(|c| c.trim()).unwrap_or("");
                // Occluded frames come out as empty cells; a trial with gaps is rejected
                if cell.is_empty() {
                    return Err(GateError::load(
                        source,
                        format!("line {}: missing value in column '{}'", line_no + 1, name),
                    ));
                }
                *slot = cell.parse::<f64>().map_err(|_| {
                    GateError::load(
                        source,
                        format!("line {}: bad value '{}' in column '{}'", line_no + 1, cell, name),
                    )
                })? * self.unit_scale;
            }
            left.push(Point3::new(values[0], values[1], values[2]));
            right.push(Point3::new(values[3], values[4], values[5]));
        }

        if columns.is_none() {
            let missing = wanted.join("', '");
            return Err(GateError::load(
                source,
                format!("no header row with columns '{}'", missing),
            ));
        }
        if left.is_empty() {
            return Err(GateError::load(source, "no data rows"));
        }

        if let Some(freq) = metadata.frequency {
            if (freq - self.sampling_rate).abs() > f64::EPSILON {
                log::warn!(
                    "{}: file FREQUENCY {} Hz differs from configured {} Hz",
                    source.display(),
                    freq,
                    self.sampling_rate
                );
            }
        }
        if let Some(frames) = metadata.no_of_frames {
            if frames != left.len() {
                log::debug!(
                    "{}: NO_OF_FRAMES {} but {} data rows",
                    source.display(),
                    frames,
                    left.len()
                );
            }
        }

        let left = Trajectory::new(left, self.sampling_rate);
        let right = Trajectory::new(right, self.sampling_rate);
        let trajectory = Trajectory::midpoint(&left, &right)?;

        Ok(LoadedTrial {
            metadata,
            trajectory,
        })
    }
}

/// Column positions of `wanted` if `line` is the header row
fn find_header(line: &str, wanted: &[String; 6]) -> Option<[usize; 6]> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    let mut cols = [0usize; 6];
    for (slot, name) in cols.iter_mut().zip(wanted.iter()) {
        *slot = fields.iter().position(|f| f == name)?;
    }
    Some(cols)
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// True for `<name>.<extension>` and `<name>.<extension>.gz`
pub fn matches_extension(path: &Path, extension: &str) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_ascii_lowercase(),
        None => return false,
    };
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    name.ends_with(&format!(".{}", ext)) || name.ends_with(&format!(".{}.gz", ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    const SAMPLE: &str = "NO_OF_FRAMES\t3\n\
NO_OF_CAMERAS\t8\n\
NO_OF_MARKERS\t2\n\
FREQUENCY\t200\n\
NO_OF_ANALOG\t0\n\
ANALOG_FREQUENCY\t0\n\
DESCRIPTION\t--\n\
TIME_STAMP\t2024-03-01, 10:47:36.627\t94247.45\n\
DATA_INCLUDED\t3D\n\
MARKER_NAMES\tSIPS_left\tSIPS_right\n\
TRAJECTORY_TYPES\tMeasured\tMeasured\n\
Frame\tTime\tSIPS_left X\tSIPS_left Y\tSIPS_left Z\tSIPS_right X\tSIPS_right Y\tSIPS_right Z\n\
1\t0.000\t100.0\t-1000.0\t950.0\t300.0\t-1000.0\t950.0\n\
2\t0.005\t100.0\t-982.0\t951.0\t300.0\t-984.0\t951.0\n\
3\t0.010\t100.0\t-965.0\t952.0\t300.0\t-965.0\t952.0\n";

    fn loader() -> TrialLoader {
        TrialLoader::new(MarkerPair::default(), 0.001, 200.0)
    }

    #[test]
    fn test_parse_qualisys_export() {
        let trial = loader()
            .parse(Cursor::new(SAMPLE), Path::new("run.tsv"))
            .unwrap();

        assert_eq!(trial.metadata.frequency, Some(200.0));
        assert_eq!(trial.metadata.no_of_frames, Some(3));
        assert_eq!(trial.metadata.marker_names, vec!["SIPS_left", "SIPS_right"]);
        assert_eq!(trial.metadata.fields.get("DATA_INCLUDED").map(String::as_str), Some("3D"));

        let traj = &trial.trajectory;
        assert_eq!(traj.len(), 3);
        assert_eq!(traj.sampling_rate, 200.0);
        // midpoint, converted to meters
        assert_abs_diff_eq!(traj.points[0].x, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(traj.points[0].y, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(traj.points[1].y, -0.983, epsilon = 1e-12);
        assert_abs_diff_eq!(traj.points[2].z, 0.952, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_marker_column() {
        let loader = TrialLoader::new(
            MarkerPair {
                left: "LASI".into(),
                right: "RASI".into(),
            },
            0.001,
            200.0,
        );
        let err = loader
            .parse(Cursor::new(SAMPLE), Path::new("run.tsv"))
            .unwrap_err();
        assert!(matches!(err, GateError::Load { .. }));
        assert!(err.to_string().contains("LASI X"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_malformed_cell() {
        let broken = SAMPLE.replace("-982.0", "n/a");
        let err = loader()
            .parse(Cursor::new(broken), Path::new("run.tsv"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 14"), "{}", msg);
        assert!(msg.contains("SIPS_left Y"), "{}", msg);
    }

    #[test]
    fn test_empty_marker_cell_rejects_trial() {
        let occluded = SAMPLE.replace("\t-982.0\t", "\t\t");
        let err = loader()
            .parse(Cursor::new(occluded), Path::new("run.tsv"))
            .unwrap_err();
        assert!(matches!(err, GateError::Load { .. }));
        assert!(!err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("line 14: missing value in column 'SIPS_left Y'"), "{}", msg);

        // Short row: trailing marker columns absent
        let truncated = SAMPLE.replace("\t300.0\t-965.0\t952.0\n", "\n");
        let err = loader()
            .parse(Cursor::new(truncated), Path::new("run.tsv"))
            .unwrap_err();
        assert!(err.to_string().contains("line 15: missing value in column 'SIPS_right X'"));
    }

    #[test]
    fn test_header_mismatch_keeps_configured_rate() {
        let mismatched = SAMPLE
            .replace("FREQUENCY\t200\n", "FREQUENCY\t100\n")
            .replace("NO_OF_FRAMES\t3\n", "NO_OF_FRAMES\t5\n");
        let trial = loader()
            .parse(Cursor::new(mismatched), Path::new("run.tsv"))
            .unwrap();

        assert_eq!(trial.metadata.frequency, Some(100.0));
        assert_eq!(trial.metadata.no_of_frames, Some(5));
        assert_eq!(trial.trajectory.sampling_rate, 200.0);
        assert_eq!(trial.trajectory.len(), 3);
    }

    #[test]
    fn test_header_without_rows() {
        let header_only: String = SAMPLE.lines().take(12).collect::<Vec<_>>().join("\n");
        let err = loader()
            .parse(Cursor::new(header_only), Path::new("run.tsv"))
            .unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }

    #[test]
    fn test_load_gzip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let trial = loader().load(&path).unwrap();
        assert_eq!(trial.trajectory.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = loader().load(Path::new("/nonexistent/run.tsv")).unwrap_err();
        assert!(matches!(err, GateError::Load { .. }));
    }

    #[test]
    fn test_matches_extension() {
        assert!(matches_extension(Path::new("a/Running_FIX 1.tsv"), "tsv"));
        assert!(matches_extension(Path::new("a/run.TSV"), "tsv"));
        assert!(matches_extension(Path::new("a/run.tsv.gz"), ".tsv"));
        assert!(!matches_extension(Path::new("a/run.csv"), "tsv"));
        assert!(!matches_extension(Path::new("a/tsv"), "tsv"));
    }
}
