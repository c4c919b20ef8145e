// src/table/mod.rs
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use tracing::{debug, instrument};

use crate::error::{PipelineError, Result};

pub mod date_parser;
pub mod tabular;
pub mod utils;

pub use tabular::{Cell, CellKind, Tabular};

pub const LOCATION: &str = "location";
pub const DATE: &str = "date";
pub const POPULATION: &str = "population";
pub const ISO_CODE: &str = "iso_code";

/// alternate header → canonical header
static COLUMN_ALIASES: Lazy<Vec<(&'static str, &'static str)>> =
    Lazy::new(|| vec![("country", LOCATION), ("code", ISO_CODE)]);

/// The feed as parsed, one `String` per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Parse CSV bytes with a header row. Ragged rows and non-UTF-8 input are
    /// parse errors; `location` is only used for error context.
    #[instrument(level = "debug", skip(bytes), fields(len = bytes.len()))]
    pub fn from_csv_bytes(location: &str, bytes: &[u8]) -> Result<Self> {
        let parse_err = |reason: String| PipelineError::ParseError {
            location: location.to_string(),
            reason,
        };

        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(bytes);
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| parse_err(format!("reading header row: {}", e)))?
            .iter()
            .map(|h| utils::clean_str(h).to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(parse_err("no header row".into()));
        }

        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| parse_err(format!("record {}: {}", idx, e)))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        debug!(rows = rows.len(), columns = headers.len(), "parsed csv");
        Ok(Self { headers, rows })
    }

    /// Rename known alias headers to their canonical name. An alias is left
    /// alone when the canonical column is already present.
    pub fn normalize_columns(mut self) -> Self {
        for (alias, canonical) in COLUMN_ALIASES.iter() {
            if self.has_column(canonical) {
                continue;
            }
            if let Some(idx) = self.column_index(alias) {
                debug!(from = alias, to = canonical, "renaming alias column");
                self.headers[idx] = canonical.to_string();
            }
        }
        self
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Subset of `cols` the table lacks, in the order asked.
    pub fn missing_columns(&self, cols: &[&str]) -> Vec<String> {
        cols.iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect()
    }

    /// Cell at (`row`, `col`), `None` for null markers or short rows.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .filter(|v| !utils::is_null(v))
            .map(utils::clean_str)
    }

    /// Every cell of column `name`, top to bottom.
    pub fn column_values<'a>(
        &'a self,
        name: &str,
    ) -> Option<impl Iterator<Item = Option<&'a str>> + 'a> {
        let col = self.column_index(name)?;
        Some((0..self.rows.len()).map(move |row| self.cell(row, col)))
    }

    /// Column `name` coerced to numbers.
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column_values(name)
            .map(|vals| vals.map(|v| v.and_then(utils::parse_f64)).collect())
    }

    /// Column `name` coerced to calendar days.
    pub fn date_column(&self, name: &str) -> Option<Vec<Option<chrono::NaiveDate>>> {
        self.column_values(name)
            .map(|vals| vals.map(|v| v.and_then(date_parser::parse_date)).collect())
    }
}
