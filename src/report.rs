//! Evaluation report files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::evaluate::EvaluationSummary;

/// Overall RMSE and mean distance, human readable.
pub const SUMMARY_TEXT_FILE: &str = "average_rmse_error.txt";
/// Mean distance per forecast point.
pub const POINT_ERRORS_CSV_FILE: &str = "average_haversine_distance_errors.csv";
/// Full summary, machine readable.
pub const SUMMARY_JSON_FILE: &str = "evaluation_summary.json";

#[derive(Serialize)]
struct PointErrorRow {
    #[serde(rename = "Point Index")]
    point_index: usize,
    #[serde(rename = "Average Haversine Distance Error (kilometers)")]
    error_km: f64,
}

/// Paths written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// Text summary.
    pub text: PathBuf,
    /// Per-point CSV.
    pub csv: PathBuf,
    /// JSON summary.
    pub json: PathBuf,
}

/// Render the text summary.
pub fn summary_text(summary: &EvaluationSummary) -> String {
    format!(
        "Overall mean RMSE: {:.4} (normalized)\nOverall mean RMSE: {:.4} degrees\nOverall mean haversine distance error: {:.4} kilometers\nWindows evaluated: {}\n",
        summary.mean_rmse, summary.mean_rmse_deg, summary.mean_distance_km, summary.windows
    )
}

/// Write one row per forecast point (1-based index, mean error in km).
pub fn write_point_errors_csv(path: &Path, per_point_km: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (i, &error_km) in per_point_km.iter().enumerate() {
        writer.serialize(PointErrorRow {
            point_index: i + 1,
            error_km,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the text, CSV and JSON reports into `dir`.
pub fn write_reports(dir: &Path, summary: &EvaluationSummary) -> Result<ReportPaths> {
    fs::create_dir_all(dir)?;
    let paths = ReportPaths {
        text: dir.join(SUMMARY_TEXT_FILE),
        csv: dir.join(POINT_ERRORS_CSV_FILE),
        json: dir.join(SUMMARY_JSON_FILE),
    };

    fs::write(&paths.text, summary_text(summary))?;
    write_point_errors_csv(&paths.csv, &summary.per_point_mean_km)?;
    fs::write(&paths.json, serde_json::to_string_pretty(summary)?)?;

    tracing::info!("Wrote evaluation reports to {}", dir.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> EvaluationSummary {
        EvaluationSummary {
            windows: 19,
            horizon: 3,
            mean_rmse: 0.004321,
            mean_rmse_deg: 0.012345,
            mean_distance_km: 1.5,
            per_point_mean_km: vec![0.5, 1.5, 2.5],
        }
    }

    #[test]
    fn test_summary_text() {
        let text = summary_text(&summary());
        assert!(text.starts_with("Overall mean RMSE: 0.0043 (normalized)\n"));
        assert!(text.contains("Overall mean RMSE: 0.0123 degrees"));
        assert!(text.contains("1.5000 kilometers"));
        assert!(text.contains("Windows evaluated: 19"));
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_reports(dir.path(), &summary()).unwrap();

        let csv = fs::read_to_string(&paths.csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Point Index,Average Haversine Distance Error (kilometers)"
        );
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "1,0.5");
        assert_eq!(lines[3], "3,2.5");

        let json: EvaluationSummary =
            serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json, summary());

        assert!(paths.text.is_file());
    }
}
