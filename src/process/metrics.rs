use chrono::NaiveDate;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, instrument};

use super::clean::ProcessingTable;
use crate::error::{PipelineError, Result};
use crate::table::{Cell, CellKind, Tabular};

pub const WINDOW: usize = 7;
pub const PER_100K: f64 = 100_000.0;

pub const PERIOD_END_DATE: &str = "period end date";
pub const WEEK_END_DATE: &str = "week end date";
pub const COUNTRY: &str = "country";
pub const INCIDENCE_7D: &str = "incidence_7d";
pub const WEEKLY_CASE_SUM: &str = "weekly_case_sum";
pub const GROWTH_FACTOR_7D: &str = "growth_factor_7d";

#[derive(Debug, Clone, PartialEq)]
pub struct IncidenceRow {
    pub period_end: NaiveDate,
    pub country: String,
    pub incidence_7d: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidenceTable {
    pub rows: Vec<IncidenceRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthRow {
    pub week_end: NaiveDate,
    pub country: String,
    pub weekly_case_sum: f64,
    pub growth_factor_7d: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrowthTable {
    pub rows: Vec<GrowthRow>,
}

/// Fixed-size trailing window; a sum exists only once `size` present values
/// are buffered.
struct Window {
    size: usize,
    buf: VecDeque<Option<f64>>,
}

impl Window {
    fn new(size: usize) -> Self {
        Self {
            size,
            buf: VecDeque::with_capacity(size),
        }
    }

    fn push(&mut self, v: Option<f64>) -> Option<f64> {
        if self.buf.len() == self.size {
            self.buf.pop_front();
        }
        self.buf.push_back(v);
        if self.buf.len() < self.size {
            return None;
        }
        self.buf.iter().copied().sum::<Option<f64>>()
    }
}

/// Trailing `window`-row sums; `None` until `window` rows are seen and
/// whenever any value inside the window is missing.
pub fn trailing_sums(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut w = Window::new(window);
    values.iter().map(|v| w.push(*v)).collect()
}

/// Same sums, but for the window ending `lag` rows earlier.
pub fn lagged(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(lag).and_then(|j| values[j]))
        .collect()
}

/// `week / prev`; no signal when the baseline week is zero.
pub fn growth_factor(week: f64, prev: f64) -> Option<f64> {
    if prev == 0.0 {
        return None;
    }
    Some(week / prev).filter(|g| g.is_finite())
}

/// Row indices per location, each group ordered by date. The sort is stable,
/// so equal dates keep input order.
fn partition_by_location(table: &ProcessingTable) -> BTreeMap<&str, Vec<usize>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        groups.entry(row.location.as_str()).or_default().push(i);
    }
    for idxs in groups.values_mut() {
        idxs.sort_by_key(|&i| table.rows[i].date);
    }
    groups
}

fn value_column(table: &ProcessingTable, stage: &str, name: &str) -> Result<usize> {
    table
        .value_index(name)
        .ok_or_else(|| PipelineError::MissingColumns {
            stage: stage.to_string(),
            columns: vec![name.to_string()],
        })
}

/// 7-day mean of daily cases per 100k inhabitants.
#[instrument(level = "info", skip(table), fields(rows_in = table.rows.len()))]
pub fn compute_incidence(
    table: &ProcessingTable,
    observation: &str,
    population: &str,
) -> Result<IncidenceTable> {
    let obs = value_column(table, "incidence", observation)?;
    let pop = value_column(table, "incidence", population)?;

    let mut rows = Vec::new();
    for (location, idxs) in partition_by_location(table) {
        let daily: Vec<Option<f64>> = idxs
            .iter()
            .map(|&i| {
                let r = &table.rows[i];
                match (r.values[obs], r.values[pop]) {
                    (Some(cases), Some(people)) => {
                        Some(cases / people * PER_100K).filter(|v| v.is_finite())
                    }
                    _ => None,
                }
            })
            .collect();

        for (k, sum) in trailing_sums(&daily, WINDOW).into_iter().enumerate() {
            if let Some(sum) = sum {
                rows.push(IncidenceRow {
                    period_end: table.rows[idxs[k]].date,
                    country: location.to_string(),
                    incidence_7d: sum / WINDOW as f64,
                });
            }
        }
    }
    debug!(rows = rows.len(), "incidence computed");
    Ok(IncidenceTable { rows })
}

/// Weekly case sum over the prior, non-overlapping week.
#[instrument(level = "info", skip(table), fields(rows_in = table.rows.len()))]
pub fn compute_growth_factor(table: &ProcessingTable, observation: &str) -> Result<GrowthTable> {
    let obs = value_column(table, "growth_factor", observation)?;

    let mut rows = Vec::new();
    let mut zero_baseline = 0usize;
    for (location, idxs) in partition_by_location(table) {
        let cases: Vec<Option<f64>> = idxs.iter().map(|&i| table.rows[i].values[obs]).collect();
        let week = trailing_sums(&cases, WINDOW);
        let prev = lagged(&week, WINDOW);

        for (k, (w, p)) in week.iter().zip(&prev).enumerate() {
            let (Some(w), Some(p)) = (*w, *p) else {
                continue;
            };
            let Some(g) = growth_factor(w, p) else {
                zero_baseline += 1;
                continue;
            };
            rows.push(GrowthRow {
                week_end: table.rows[idxs[k]].date,
                country: location.to_string(),
                weekly_case_sum: w,
                growth_factor_7d: g,
            });
        }
    }
    debug!(rows = rows.len(), zero_baseline, "growth factor computed");
    Ok(GrowthTable { rows })
}

impl Tabular for IncidenceTable {
    fn schema(&self) -> Vec<(String, CellKind)> {
        vec![
            (PERIOD_END_DATE.into(), CellKind::Date),
            (COUNTRY.into(), CellKind::Text),
            (INCIDENCE_7D.into(), CellKind::Number),
        ]
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, col: usize) -> Cell<'_> {
        let r = &self.rows[row];
        match col {
            0 => Cell::Date(r.period_end),
            1 => Cell::Text(&r.country),
            _ => Cell::Number(Some(r.incidence_7d)),
        }
    }
}

impl Tabular for GrowthTable {
    fn schema(&self) -> Vec<(String, CellKind)> {
        vec![
            (WEEK_END_DATE.into(), CellKind::Date),
            (COUNTRY.into(), CellKind::Text),
            (WEEKLY_CASE_SUM.into(), CellKind::Number),
            (GROWTH_FACTOR_7D.into(), CellKind::Number),
        ]
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, col: usize) -> Cell<'_> {
        let r = &self.rows[row];
        match col {
            0 => Cell::Date(r.week_end),
            1 => Cell::Text(&r.country),
            2 => Cell::Number(Some(r.weekly_case_sum)),
            _ => Cell::Number(Some(r.growth_factor_7d)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::process::clean::clean;
    use crate::table::RawTable;
    use chrono::Duration;

    /// `days` consecutive rows per location, `cases(location_idx, day)`.
    fn processing(
        locations: &[&str],
        days: usize,
        cases: impl Fn(usize, usize) -> Option<f64>,
    ) -> ProcessingTable {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let headers = ["location", "date", "new_cases", "people_vaccinated", "population"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut rows = Vec::new();
        for (li, loc) in locations.iter().enumerate() {
            for d in 0..days {
                rows.push(vec![
                    loc.to_string(),
                    (start + Duration::days(d as i64)).to_string(),
                    cases(li, d).map(|c| c.to_string()).unwrap_or_else(|| "x".into()),
                    "1".into(),
                    "100000".into(),
                ]);
            }
        }
        let cfg = PipelineConfig::default();
        clean(
            &RawTable::new(headers, rows),
            &cfg.target_locations,
            &cfg.required_non_null,
            &cfg.projection,
        )
        .unwrap()
    }

    #[test]
    fn trailing_sums_need_full_windows() {
        let v = vec![Some(1.0), Some(2.0), Some(3.0), None, Some(5.0), Some(6.0), Some(7.0)];
        assert_eq!(
            trailing_sums(&v, 3),
            vec![None, None, Some(6.0), None, None, None, Some(18.0)]
        );
    }

    #[test]
    fn lag_shifts_forward() {
        let v = vec![Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(lagged(&v, 2), vec![None, None, Some(1.0)]);
    }

    #[test]
    fn zero_baseline_is_no_signal() {
        assert_eq!(growth_factor(10.0, 0.0), None);
        assert_eq!(growth_factor(10.0, 5.0), Some(2.0));
        assert_eq!(growth_factor(0.0, 5.0), Some(0.0));
    }

    #[test]
    fn incidence_only_on_full_windows() {
        let t = processing(&["Peru", "Ecuador"], 20, |_, d| Some(d as f64));
        let inc = compute_incidence(&t, "new_cases", "population").unwrap();
        assert_eq!(inc.rows.len(), (20 - 6) * 2);

        // Ecuador sorts first; day index 6 closes the first window: mean(0..=6) = 3
        let first = &inc.rows[0];
        assert_eq!(first.country, "Ecuador");
        assert_eq!(first.period_end, NaiveDate::from_ymd_opt(2021, 1, 7).unwrap());
        assert!((first.incidence_7d - 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_value_breaks_every_window_it_touches() {
        let t = processing(&["Peru"], 20, |_, d| if d == 10 { None } else { Some(1.0) });
        let inc = compute_incidence(&t, "new_cases", "population").unwrap();
        // windows ending on days 6..=9 and 17..=19
        assert_eq!(inc.rows.len(), 7);
        assert!(inc
            .rows
            .iter()
            .all(|r| r.period_end < NaiveDate::from_ymd_opt(2021, 1, 11).unwrap()
                || r.period_end > NaiveDate::from_ymd_opt(2021, 1, 17).unwrap()));
    }

    #[test]
    fn growth_factor_starts_on_day_fourteen() {
        let t = processing(&["Peru", "Ecuador"], 20, |li, d| Some((li + 1) as f64 * (d + 1) as f64));
        let g = compute_growth_factor(&t, "new_cases").unwrap();
        assert_eq!(g.rows.len(), 7 * 2);
        let day14 = NaiveDate::from_ymd_opt(2021, 1, 14).unwrap();
        assert!(g.rows.iter().all(|r| r.week_end >= day14));

        // Peru, day 14: (8..=14) / (1..=7) = 77 / 28
        let peru = g.rows.iter().find(|r| r.country == "Peru").unwrap();
        assert_eq!(peru.week_end, day14);
        assert_eq!(peru.weekly_case_sum, 77.0);
        assert!((peru.growth_factor_7d - 77.0 / 28.0).abs() < 1e-12);
    }

    #[test]
    fn zero_prior_week_rows_are_absent() {
        let t = processing(&["Peru"], 21, |_, d| Some(if d < 7 { 0.0 } else { 3.0 }));
        let g = compute_growth_factor(&t, "new_cases").unwrap();
        // day 14 has a zero baseline; days 15..=21 do not
        assert_eq!(g.rows.len(), 7);
        assert!(g.rows.iter().all(|r| r.growth_factor_7d.is_finite()));
        assert_eq!(g.rows[0].week_end, NaiveDate::from_ymd_opt(2021, 1, 15).unwrap());
    }

    #[test]
    fn unknown_observation_column_is_missing_columns() {
        let t = processing(&["Peru"], 3, |_, _| Some(1.0));
        let err = compute_growth_factor(&t, "new_deaths").unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumns { .. }));
    }
}
