//! Exports: run JSON and dataset CSV.
//!
//! Run JSON is the portable record of a `fit` invocation:
//! - the prepared series and every fit (trajectory, RMSE, outcome)
//! - the forecasts computed from those fits
//!
//! It can be read back with [`read_run_json`] to reprint the summary without
//! refitting.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::domain::{ModelKind, ResultBundle};
use crate::error::AppError;
use crate::forecast::Forecast;

/// Schema of the run JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub tool: String,
    pub version: String,
    pub horizon: usize,
    pub bundle: ResultBundle,
    pub forecasts: Vec<Forecast>,
}

impl RunFile {
    pub fn new(bundle: ResultBundle, forecasts: Vec<Forecast>, horizon: usize) -> Self {
        Self {
            tool: "epifit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            horizon,
            bundle,
            forecasts,
        }
    }
}

/// Write the run JSON to `path`, or to stdout when `path` is `-`.
pub fn write_run_json(path: &Path, run: &RunFile) -> Result<(), AppError> {
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        serde_json::to_writer_pretty(&mut lock, run)
            .map_err(|e| AppError::new(4, format!("Failed to write run JSON: {e}")))?;
        writeln!(lock).map_err(|e| AppError::new(4, format!("Failed to write run JSON: {e}")))?;
        return Ok(());
    }

    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create run JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, run)
        .map_err(|e| AppError::new(4, format!("Failed to write run JSON: {e}")))?;
    Ok(())
}

/// Read a run JSON file.
pub fn read_run_json(path: &Path) -> Result<RunFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open run JSON '{}': {e}", path.display())))?;
    let run: RunFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid run JSON: {e}")))?;
    check_run(&run).map_err(|e| AppError::new(2, format!("Invalid run JSON: {e}")))?;
    Ok(run)
}

/// Shape checks a hand-edited run file can fail: every per-sample vector has
/// one entry per time point and every state has its model's dimension.
fn check_run(run: &RunFile) -> Result<(), String> {
    let series = &run.bundle.series;
    let n = series.len();
    if series.cases.len() != n || !(series.dates.is_empty() || series.dates.len() == n) {
        return Err(format!(
            "series has {n} time points, {} cases and {} dates",
            series.cases.len(),
            series.dates.len()
        ));
    }

    for kind in [ModelKind::Sir, ModelKind::RossMacdonald] {
        let Some(fit) = run.bundle.get(kind) else {
            continue;
        };
        let key = kind.key();
        if fit.model != kind {
            return Err(format!("`{key}` holds a {} fit", fit.model.display_name()));
        }
        if fit.params().len() != kind.param_names().len() {
            return Err(format!(
                "{key} has {} parameters, expected {}",
                fit.params().len(),
                kind.param_names().len()
            ));
        }
        if fit.trajectory.len() != n || fit.trajectory.times.len() != n {
            return Err(format!(
                "{key} trajectory has {} states for {n} time points",
                fit.trajectory.len()
            ));
        }
        check_states(kind, &fit.trajectory.states)?;
    }

    for fc in &run.forecasts {
        check_states(fc.model, &fc.states)?;
    }
    Ok(())
}

fn check_states(kind: ModelKind, states: &[Vec<f64>]) -> Result<(), String> {
    let dim = kind.compartment_names().len();
    match states.iter().find(|s| s.len() != dim) {
        Some(bad) => Err(format!(
            "{} state has {} compartments, expected {dim}",
            kind.key(),
            bad.len()
        )),
        None => Ok(()),
    }
}

/// Write a dataset as CSV (header + one line per row, missing cells empty).
pub fn write_dataset_csv<W: Write>(writer: W, dataset: &Dataset) -> Result<(), AppError> {
    let mut out = csv::Writer::from_writer(writer);
    let fail = |e: csv::Error| AppError::new(4, format!("Failed to write CSV: {e}"));

    out.write_record(dataset.columns().iter().map(|c| c.name.as_str()))
        .map_err(fail)?;
    for row in 0..dataset.n_rows() {
        out.write_record(dataset.columns().iter().map(|c| c.get(row).unwrap_or("")))
            .map_err(fail)?;
    }
    out.flush()
        .map_err(|e| AppError::new(4, format!("Failed to write CSV: {e}")))?;
    Ok(())
}

/// [`write_dataset_csv`] to a file, or stdout when `path` is `None`.
pub fn write_dataset_csv_to(path: Option<&Path>, dataset: &Dataset) -> Result<(), AppError> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))?;
            write_dataset_csv(file, dataset)
        }
        None => write_dataset_csv(io::stdout().lock(), dataset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, OutbreakSpec, generate_outbreak};
    use crate::domain::{FitOutcome, FitResult, ObservationSeries, Trajectory};
    use crate::io::read_dataset;

    #[test]
    fn dataset_csv_reads_back() {
        let ds = generate_outbreak(&OutbreakSpec {
            days: 12,
            ..OutbreakSpec::default()
        })
        .unwrap();
        let mut buf = Vec::new();
        write_dataset_csv(&mut buf, &ds).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("date,cases\n2024-01-01,"));
        assert_eq!(read_dataset(buf.as_slice()).unwrap(), ds);
    }

    #[test]
    fn missing_cells_are_written_empty() {
        let ds = Dataset::new(vec![
            Column::text("date", &["2024-01-01", ""]),
            Column::int("cases", &[1, 2]),
        ])
        .unwrap();
        let mut buf = Vec::new();
        write_dataset_csv(&mut buf, &ds).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "date,cases\n2024-01-01,1\n,2\n");
    }

    #[test]
    fn run_json_reads_back() {
        let bundle = ResultBundle {
            series: ObservationSeries {
                t: vec![0, 1],
                cases: vec![3.0, 4.0],
                dates: Vec::new(),
                date_col: "date".to_string(),
                case_col: "cases".to_string(),
            },
            sir: None,
            rm: None,
        };
        let run = RunFile::new(bundle, Vec::new(), 7);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        write_run_json(&path, &run).unwrap();
        let back = read_run_json(&path).unwrap();
        assert_eq!(back, run);
        assert_eq!(back.tool, "epifit");
    }

    #[test]
    fn run_json_with_ragged_shapes_is_rejected() {
        let series = ObservationSeries {
            t: vec![0, 1],
            cases: vec![3.0, 4.0],
            dates: Vec::new(),
            date_col: "date".to_string(),
            case_col: "cases".to_string(),
        };
        let sir = FitResult {
            model: ModelKind::Sir,
            trajectory: Trajectory {
                times: vec![0.0, 1.0],
                states: vec![vec![0.9, 0.1, 0.0], vec![0.8, 0.2, 0.0]],
            },
            rmse: 1.0,
            outcome: FitOutcome::Converged {
                params: vec![0.3, 0.1],
                iterations: 4,
            },
        };
        let good = RunFile::new(
            ResultBundle {
                series,
                sir: Some(sir),
                rm: None,
            },
            Vec::new(),
            7,
        );
        assert_eq!(check_run(&good), Ok(()));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        let mut short_cases = good.clone();
        short_cases.bundle.series.cases.truncate(1);
        write_run_json(&path, &short_cases).unwrap();
        let err = read_run_json(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("1 cases"));

        let mut short_state = good.clone();
        if let Some(fit) = short_state.bundle.sir.as_mut() {
            fit.trajectory.states[1].truncate(1);
        }
        assert!(check_run(&short_state).unwrap_err().contains("sir state has 1"));

        let mut short_forecast = good.clone();
        short_forecast.forecasts.push(Forecast {
            model: ModelKind::RossMacdonald,
            origin: 1.0,
            states: vec![vec![1.0, 2.0]],
        });
        assert!(check_run(&short_forecast).is_err());

        let mut swapped = good;
        swapped.bundle.rm = swapped.bundle.sir.take();
        assert!(check_run(&swapped).unwrap_err().contains("`rm` holds"));
    }
}
