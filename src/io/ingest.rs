//! CSV ingest.
//!
//! Reads a case-count CSV into a [`Dataset`] with one inferred type per
//! column. No epidemiological interpretation happens here; column selection
//! and date parsing belong to `data::prepare`.
//!
//! Conventions:
//! - headers are trimmed and stripped of a UTF-8 BOM
//! - short rows are padded with missing cells, long rows are an error
//! - `NA`, `N/A`, `NaN`, `null` and empty cells are missing

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use thiserror::Error;
use tracing::debug;

use crate::data::{Column, Dataset, TableError};

const MISSING_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open CSV '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {got} fields, header has {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("CSV has no header row")]
    MissingHeader,
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Load a CSV file from disk.
pub fn load_dataset(path: &Path) -> Result<Dataset, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset = read_dataset(file)?;
    debug!(
        path = %path.display(),
        rows = dataset.n_rows(),
        cols = dataset.n_cols(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Read a CSV from any reader.
pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_header_name)
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(IngestError::MissingHeader);
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut record = StringRecord::new();
    let mut line = 1usize;
    while reader.read_record(&mut record)? {
        line += 1;
        if record.len() > headers.len() {
            return Err(IngestError::RaggedRow {
                line,
                expected: headers.len(),
                got: record.len(),
            });
        }
        for (idx, column) in cells.iter_mut().enumerate() {
            column.push(record.get(idx).and_then(cell_value));
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, cells)| Column::infer(name, cells))
        .collect();
    Ok(Dataset::new(columns)?)
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn cell_value(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || MISSING_TOKENS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}
