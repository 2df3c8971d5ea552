use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

use super::events::{EventRow, EventTable};
use super::table::MatchTable;
use crate::error::{PipelineError, Result};

/// Raw CSV contents: a header and string records of the same width.
/// Missing cells are empty strings.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvFrame {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl CsvFrame {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require_index(&self, name: &str, source: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "column '{}' not found in {} (headers: {})",
                name,
                source,
                self.headers.join(", ")
            ))
        })
    }

    /// Every column is read as text; numeric parsing happens per table.
    fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let headers: Vec<String> = df.get_column_names().iter().map(|h| h.trim().to_string()).collect();
        let mut columns: Vec<Vec<String>> = Vec::with_capacity(headers.len());
        for series in df.get_columns() {
            let cells = series.str()?;
            columns.push(cells.into_iter().map(|c| c.unwrap_or_default().to_string()).collect());
        }
        let records = (0..df.height())
            .map(|row| columns.iter().map(|column| column[row].clone()).collect())
            .collect();
        Ok(Self { headers, records })
    }
}

fn csv_options() -> CsvReadOptions {
    // no type inference: every column arrives as a string
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
}

/// Read a comma-separated file with a header row.
pub fn read_csv(path: &Path) -> Result<CsvFrame> {
    let file = File::open(path)?;
    let df = csv_options().into_reader_with_file_handle(file).finish()?;
    let frame = CsvFrame::from_dataframe(&df)?;
    debug!("Read {} rows x {} columns from {}", frame.records.len(), frame.headers.len(), path.display());
    Ok(frame)
}

/// Parse in-memory CSV text with a header row.
pub fn parse_csv(text: &str) -> Result<CsvFrame> {
    let df = csv_options()
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()?;
    CsvFrame::from_dataframe(&df)
}

fn parse_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Build the per-match table from the match-info export.
///
/// `required` columns must exist and parse as numbers in every non-empty
/// cell. Other columns are kept when all their non-empty cells are numeric
/// and silently dropped otherwise (league names, team tags, ...).
pub fn load_matches(frame: &CsvFrame, key_column: &str, required: &[String]) -> Result<MatchTable> {
    let key_idx = frame.require_index(key_column, "match table")?;
    for name in required {
        frame.require_index(name, "match table")?;
    }

    let keys = frame
        .records
        .iter()
        .map(|r| r[key_idx].trim().to_string())
        .collect::<Vec<_>>();
    if let Some(pos) = keys.iter().position(|k| k.is_empty()) {
        return Err(PipelineError::Data(format!("match row {} has an empty '{}'", pos + 1, key_column)));
    }
    let mut table = MatchTable::new(keys)?;

    for (idx, name) in frame.headers.iter().enumerate() {
        if idx == key_idx {
            continue;
        }
        let mut values = Vec::with_capacity(frame.records.len());
        let mut bad_cell = None;
        for (row, record) in frame.records.iter().enumerate() {
            let cell = record[idx].trim();
            match parse_number(cell) {
                Some(v) => values.push(Some(v)),
                None if cell.is_empty() => values.push(None),
                None => {
                    bad_cell = Some((row, cell.to_string()));
                    break;
                }
            }
        }

        match bad_cell {
            None => table = table.with_column(name, values)?,
            Some((row, cell)) if required.contains(name) => {
                return Err(PipelineError::Data(format!(
                    "column '{}' has non-numeric value '{}' for match '{}'",
                    name,
                    cell,
                    table.keys()[row]
                )));
            }
            Some(_) => debug!("Skipping non-numeric column '{}'", name),
        }
    }

    info!("Loaded {} matches with {} numeric columns", table.len(), table.column_names().len());
    Ok(table)
}

/// Build an event table. Rows with an empty match key are dropped.
pub fn load_events(
    frame: &CsvFrame,
    key_column: &str,
    team_column: Option<&str>,
    kind_column: Option<&str>,
) -> Result<EventTable> {
    let key_idx = frame.require_index(key_column, "event table")?;
    let team_idx = team_column.map(|c| frame.require_index(c, "event table")).transpose()?;
    let kind_idx = kind_column.map(|c| frame.require_index(c, "event table")).transpose()?;

    let text_cell = |record: &[String], idx: Option<usize>| {
        idx.map(|i| record[i].trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut rows = Vec::with_capacity(frame.records.len());
    let mut dropped = 0;
    for record in &frame.records {
        let address = record[key_idx].trim();
        if address.is_empty() {
            dropped += 1;
            continue;
        }

        let values: BTreeMap<String, f64> = frame
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_idx && Some(*i) != team_idx && Some(*i) != kind_idx)
            .filter_map(|(i, name)| parse_number(&record[i]).map(|v| (name.clone(), v)))
            .collect();

        rows.push(EventRow {
            address: address.to_string(),
            team: text_cell(record, team_idx),
            kind: text_cell(record, kind_idx),
            values,
        });
    }

    if dropped > 0 {
        warn!("Dropped {} event rows without a match address", dropped);
    }
    debug!("Loaded {} event rows", rows.len());
    Ok(EventTable::new(rows))
}
