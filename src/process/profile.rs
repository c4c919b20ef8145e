use std::collections::BTreeSet;
use tracing::{debug, instrument};

use crate::error::{PipelineError, Result};
use crate::table::{date_parser, utils, Cell, CellKind, RawTable, Tabular, DATE, LOCATION};

pub const SECTION_COLUMN_TYPES: &str = "columnas_tipos";
pub const SECTION_SUMMARY: &str = "resumen";

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub section: String,
    pub metric: String,
    pub value: String,
    pub notes: String,
}

impl ProfileRow {
    fn new(section: &str, metric: impl Into<String>, value: impl Into<String>, notes: &str) -> Self {
        Self {
            section: section.to_string(),
            metric: metric.into(),
            value: value.into(),
            notes: notes.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileTable {
    pub rows: Vec<ProfileRow>,
}

impl ProfileTable {
    pub fn get(&self, section: &str, metric: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.section == section && r.metric == metric)
            .map(|r| r.value.as_str())
    }
}

impl Tabular for ProfileTable {
    fn schema(&self) -> Vec<(String, CellKind)> {
        ["seccion", "metro", "valor", "notas"]
            .iter()
            .map(|c| (c.to_string(), CellKind::Text))
            .collect()
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, col: usize) -> Cell<'_> {
        let r = &self.rows[row];
        Cell::Text(match col {
            0 => &r.section,
            1 => &r.metric,
            2 => &r.value,
            _ => &r.notes,
        })
    }
}

/// Storage type a dataframe reader would infer for a column of text cells.
fn infer_type<'a>(values: impl Iterator<Item = Option<&'a str>>) -> &'static str {
    let mut has_null = false;
    let mut all_int = true;
    for v in values {
        match v {
            None => has_null = true,
            Some(s) if s.parse::<i64>().is_ok() => {}
            Some(s) if utils::parse_f64(s).is_some() => all_int = false,
            Some(_) => return "object",
        }
    }
    if all_int && !has_null {
        "int64"
    } else {
        "float64"
    }
}

fn fmt_opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Profile the rows of `targets`: one type row per column, then min/max of
/// `observation`, percent missing per `missing_of` column and the date range.
#[instrument(level = "info", skip_all, fields(rows_in = raw.num_rows()))]
pub fn profile(
    raw: &RawTable,
    targets: &BTreeSet<String>,
    observation: &str,
    missing_of: &[String],
) -> Result<ProfileTable> {
    let loc = raw.column_index(LOCATION).ok_or_else(|| PipelineError::MissingColumns {
        stage: "profile".into(),
        columns: vec![LOCATION.to_string()],
    })?;
    let selected: Vec<usize> = (0..raw.num_rows())
        .filter(|&r| raw.cell(r, loc).is_some_and(|l| targets.contains(l)))
        .collect();
    let column = |name: &str| -> Vec<Option<&str>> {
        match raw.column_index(name) {
            Some(c) => selected.iter().map(|&r| raw.cell(r, c)).collect(),
            None => Vec::new(),
        }
    };

    let mut rows: Vec<ProfileRow> = raw
        .headers
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let kind = infer_type(selected.iter().map(|&r| raw.cell(r, c)));
            ProfileRow::new(SECTION_COLUMN_TYPES, name.clone(), kind, "")
        })
        .collect();

    let numbers: Vec<f64> = column(observation)
        .into_iter()
        .filter_map(|v| v.and_then(utils::parse_f64))
        .collect();
    let min = numbers.iter().copied().reduce(f64::min);
    let max = numbers.iter().copied().reduce(f64::max);
    rows.push(ProfileRow::new(SECTION_SUMMARY, format!("min_{}", observation), fmt_opt(min), ""));
    rows.push(ProfileRow::new(SECTION_SUMMARY, format!("max_{}", observation), fmt_opt(max), ""));

    for name in missing_of {
        let pct = if raw.has_column(name) && !selected.is_empty() {
            let nulls = column(name).iter().filter(|v| v.is_none()).count();
            Some(nulls as f64 / selected.len() as f64 * 100.0)
        } else {
            None
        };
        rows.push(ProfileRow::new(SECTION_SUMMARY, format!("pct_missing_{}", name), fmt_opt(pct), "%"));
    }

    let dates: Vec<_> = column(DATE)
        .into_iter()
        .filter_map(|v| v.and_then(date_parser::parse_date))
        .collect();
    rows.push(ProfileRow::new(SECTION_SUMMARY, "min_date", fmt_opt(dates.iter().min()), ""));
    rows.push(ProfileRow::new(SECTION_SUMMARY, "max_date", fmt_opt(dates.iter().max()), ""));

    debug!(selected = selected.len(), rows = rows.len(), "profile built");
    Ok(ProfileTable { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::table::tests::table;

    fn sample() -> RawTable {
        table(
            &["location", "date", "new_cases", "people_vaccinated", "tests_units"],
            &[
                &["Peru", "2021-01-03", "5", "", "people tested"],
                &["Peru", "2021-01-01", "-2", "10", ""],
                &["Ecuador", "2021-01-02", "", "", "units"],
                &["Chile", "2019-01-01", "9999", "1", "x"],
            ],
        )
    }

    #[test]
    fn summarizes_target_rows_only() {
        let cfg = PipelineConfig::default();
        let p = profile(&sample(), &cfg.target_locations, "new_cases", &cfg.required_non_null).unwrap();

        assert_eq!(p.get(SECTION_SUMMARY, "min_new_cases"), Some("-2"));
        assert_eq!(p.get(SECTION_SUMMARY, "max_new_cases"), Some("5"));
        assert_eq!(p.get(SECTION_SUMMARY, "min_date"), Some("2021-01-01"));
        assert_eq!(p.get(SECTION_SUMMARY, "max_date"), Some("2021-01-03"));

        let pct: f64 = p
            .get(SECTION_SUMMARY, "pct_missing_people_vaccinated")
            .unwrap()
            .parse()
            .unwrap();
        assert!((pct - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn column_types_follow_contents() {
        let cfg = PipelineConfig::default();
        let p = profile(&sample(), &cfg.target_locations, "new_cases", &[]).unwrap();
        assert_eq!(p.get(SECTION_COLUMN_TYPES, "location"), Some("object"));
        assert_eq!(p.get(SECTION_COLUMN_TYPES, "new_cases"), Some("float64"));
        assert_eq!(p.get(SECTION_COLUMN_TYPES, "tests_units"), Some("object"));
    }

    #[test]
    fn no_target_rows_leaves_values_empty() {
        let targets: BTreeSet<String> = ["Bolivia".to_string()].into_iter().collect();
        let p = profile(&sample(), &targets, "new_cases", &["new_cases".to_string()]).unwrap();
        assert_eq!(p.get(SECTION_SUMMARY, "min_new_cases"), Some(""));
        assert_eq!(p.get(SECTION_SUMMARY, "pct_missing_new_cases"), Some(""));
        assert_eq!(p.get(SECTION_SUMMARY, "min_date"), Some(""));
    }
}
