use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::table::{date_parser, utils, Cell, CellKind, RawTable, Tabular, DATE, LOCATION};

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRow {
    pub location: String,
    pub date: NaiveDate,
    /// aligned with `ProcessingTable::value_columns`
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Location,
    Date,
    Value(usize),
}

/// Target-location rows, one per (location, date), projected and coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingTable {
    pub columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub rows: Vec<ProcessedRow>,
    layout: Vec<Slot>,
}

impl ProcessingTable {
    fn new(projection: &[String], rows: Vec<ProcessedRow>) -> Self {
        let mut value_columns = Vec::new();
        let layout = projection
            .iter()
            .map(|c| match c.as_str() {
                LOCATION => Slot::Location,
                DATE => Slot::Date,
                other => {
                    value_columns.push(other.to_string());
                    Slot::Value(value_columns.len() - 1)
                }
            })
            .collect();
        Self {
            columns: projection.to_vec(),
            value_columns,
            rows,
            layout,
        }
    }

    pub fn value_index(&self, name: &str) -> Option<usize> {
        self.value_columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Tabular for ProcessingTable {
    fn schema(&self) -> Vec<(String, CellKind)> {
        self.columns
            .iter()
            .zip(&self.layout)
            .map(|(name, slot)| {
                let kind = match slot {
                    Slot::Location => CellKind::Text,
                    Slot::Date => CellKind::Date,
                    Slot::Value(_) => CellKind::Number,
                };
                (name.clone(), kind)
            })
            .collect()
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, col: usize) -> Cell<'_> {
        let r = &self.rows[row];
        match self.layout[col] {
            Slot::Location => Cell::Text(&r.location),
            Slot::Date => Cell::Date(r.date),
            Slot::Value(i) => Cell::Number(r.values[i]),
        }
    }
}

/// Restrict to `target_locations`, drop rows with a null in any of
/// `required_non_null`, keep the first row per (location, date), project.
///
/// Every referenced column must exist; a missing one is a hard error rather
/// than a check outcome.
#[instrument(level = "info", skip_all, fields(rows_in = raw.num_rows()))]
pub fn clean(
    raw: &RawTable,
    target_locations: &BTreeSet<String>,
    required_non_null: &[String],
    projection: &[String],
) -> Result<ProcessingTable> {
    for key in [LOCATION, DATE] {
        if !projection.iter().any(|c| c == key) {
            return Err(PipelineError::Config(format!(
                "projection must include '{}'",
                key
            )));
        }
    }

    let mut referenced: Vec<&str> = vec![LOCATION, DATE];
    for c in required_non_null.iter().chain(projection) {
        if !referenced.contains(&c.as_str()) {
            referenced.push(c.as_str());
        }
    }
    let missing = raw.missing_columns(&referenced);
    if !missing.is_empty() {
        return Err(PipelineError::MissingColumns {
            stage: "clean".into(),
            columns: missing,
        });
    }

    let idx = |name: &str| raw.column_index(name).ok_or_else(|| PipelineError::MissingColumns {
        stage: "clean".into(),
        columns: vec![name.to_string()],
    });
    let loc_idx = idx(LOCATION)?;
    let date_idx = idx(DATE)?;
    let required_idx = required_non_null
        .iter()
        .map(|c| idx(c.as_str()))
        .collect::<Result<Vec<_>>>()?;
    let value_cols: Vec<&String> = projection
        .iter()
        .filter(|c| c.as_str() != LOCATION && c.as_str() != DATE)
        .collect();
    let value_idx = value_cols
        .iter()
        .map(|c| idx(c.as_str()))
        .collect::<Result<Vec<_>>>()?;

    let mut in_targets = 0usize;
    let mut with_required = 0usize;
    let mut bad_dates = 0usize;
    let mut duplicates = 0usize;
    let mut seen: HashSet<(&str, NaiveDate)> = HashSet::new();
    let mut rows = Vec::new();

    for r in 0..raw.num_rows() {
        let Some(location) = raw.cell(r, loc_idx) else {
            continue;
        };
        if !target_locations.contains(location) {
            continue;
        }
        in_targets += 1;

        if required_idx.iter().any(|&c| raw.cell(r, c).is_none()) {
            continue;
        }
        with_required += 1;

        let Some(date) = raw.cell(r, date_idx).and_then(date_parser::parse_date) else {
            bad_dates += 1;
            continue;
        };
        if !seen.insert((location, date)) {
            duplicates += 1;
            continue;
        }

        rows.push(ProcessedRow {
            location: location.to_string(),
            date,
            values: value_idx
                .iter()
                .map(|&c| raw.cell(r, c).and_then(utils::parse_f64))
                .collect(),
        });
    }

    debug!(in_targets, with_required, bad_dates, "filter counts");
    info!(
        rows = rows.len(),
        removed_duplicates = duplicates,
        "rows after cleaning"
    );
    Ok(ProcessingTable::new(projection, rows))
}
