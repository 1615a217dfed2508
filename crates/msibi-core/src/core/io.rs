use crate::core::grid::{GridError, RadialGrid};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableIoError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },

    #[error("Malformed table file '{path}': {message}")]
    Malformed { path: String, message: String },

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl TableIoError {
    pub(crate) fn malformed(path: &Path, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_string_lossy().to_string(),
            message: message.into(),
        }
    }
}

fn csv_error(path: &Path, source: csv::Error) -> TableIoError {
    TableIoError::Csv {
        path: path.to_string_lossy().to_string(),
        source,
    }
}

/// Reads a tabular CSV file into `column_count` numeric columns.
///
/// The first column is always the separation `r`; callers interpret the rest.
/// Rows with fewer columns than requested are rejected, extra columns are
/// ignored so that files carrying auxiliary columns (e.g. a force column next
/// to the potential) stay readable.
pub(crate) fn read_columns(
    path: &Path,
    column_count: usize,
) -> Result<Vec<Vec<f64>>, TableIoError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); column_count];
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| csv_error(path, e))?;
        if record.len() < column_count {
            return Err(TableIoError::malformed(
                path,
                format!(
                    "row {} has {} columns, expected at least {}",
                    row + 2,
                    record.len(),
                    column_count
                ),
            ));
        }
        for (col, slot) in columns.iter_mut().enumerate() {
            let field = &record[col];
            let value: f64 = field.parse().map_err(|_| {
                TableIoError::malformed(
                    path,
                    format!("row {}: '{}' is not a number", row + 2, field),
                )
            })?;
            slot.push(value);
        }
    }

    if columns[0].len() < 2 {
        return Err(TableIoError::malformed(
            path,
            "table needs at least two rows",
        ));
    }
    Ok(columns)
}

/// Writes numeric columns as a headered CSV file.
pub(crate) fn write_columns(
    path: &Path,
    headers: &[&str],
    columns: &[&[f64]],
) -> Result<(), TableIoError> {
    debug_assert_eq!(headers.len(), columns.len());
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(headers)
        .map_err(|e| csv_error(path, e))?;

    let rows = columns.first().map_or(0, |c| c.len());
    let mut fields = Vec::with_capacity(columns.len());
    for row in 0..rows {
        fields.clear();
        for column in columns {
            fields.push(format!("{:.12e}", column[row]));
        }
        writer.write_record(&fields).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| TableIoError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Reconstructs the uniform grid a file's `r` column was sampled on.
pub(crate) fn grid_from_r_column(path: &Path, r: &[f64]) -> Result<RadialGrid, TableIoError> {
    let dr = r[1] - r[0];
    let grid = RadialGrid::new(r[0], r[r.len() - 1], dr)?;
    if grid.len() != r.len() {
        return Err(TableIoError::malformed(
            path,
            "r column is not uniformly spaced",
        ));
    }
    for (i, &ri) in r.iter().enumerate() {
        if (ri - grid.r(i)).abs() > 1e-6 * dr.max(1.0) {
            return Err(TableIoError::malformed(
                path,
                format!("r column deviates from uniform spacing at row {}", i + 2),
            ));
        }
    }
    Ok(grid)
}
