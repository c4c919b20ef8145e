//! Data-quality checks. Structural and temporal integrity (future dates,
//! required fields, uniqueness) can fail with `Severity::Error`; the
//! plausibility checks only ever warn, because the feed is revised after
//! publication and legitimately carries negative corrections and outliers.

use chrono::NaiveDate;
use std::collections::HashSet;

use super::{CheckOutcome, Severity};
use crate::table::{RawTable, Tabular, DATE, LOCATION, POPULATION};

pub const INCIDENCE_RANGE: (f64, f64) = (0.0, 2000.0);

/// Rows dated strictly after `today` (UTC calendar day).
pub fn check_no_future_dates(target: &str, table: &RawTable, today: NaiveDate) -> CheckOutcome {
    let Some(dates) = table.date_column(DATE) else {
        return CheckOutcome::new(target, false, Severity::Error)
            .with("error", format!("Falta columna '{}'", DATE));
    };
    let affected = dates.iter().flatten().filter(|d| **d > today).count();
    let passed = affected == 0;
    CheckOutcome::new(
        target,
        passed,
        if passed { Severity::None } else { Severity::Error },
    )
    .with("filas_afectadas", affected)
    .with("hoy", today.to_string())
}

/// Key columns present and non-null, (location, date) unique, population > 0.
pub fn check_required_fields_and_uniqueness(target: &str, table: &RawTable) -> CheckOutcome {
    let (Some(locations), Some(dates), Some(populations)) = (
        table.column_values(LOCATION),
        table.date_column(DATE),
        table.column_values(POPULATION),
    ) else {
        let missing = table.missing_columns(&[LOCATION, DATE, POPULATION]);
        return CheckOutcome::new(target, false, Severity::Error)
            .with("faltan_columnas", missing.join(", "));
    };
    let locations: Vec<Option<&str>> = locations.collect();
    let populations: Vec<Option<&str>> = populations.collect();

    let null_location = locations.iter().filter(|v| v.is_none()).count();
    let null_date = dates.iter().filter(|v| v.is_none()).count();
    let null_population = populations.iter().filter(|v| v.is_none()).count();

    // unparseable dates share the `None` key, so two null-dated rows of one
    // location count as a duplicate
    let mut seen: HashSet<(Option<&str>, Option<NaiveDate>)> = HashSet::new();
    let duplicates = locations
        .iter()
        .zip(dates.iter())
        .filter(|(loc, date)| !seen.insert((**loc, **date)))
        .count();

    let population_le_0 = populations
        .iter()
        .filter_map(|v| v.and_then(crate::table::utils::parse_f64))
        .filter(|p| *p <= 0.0)
        .count();

    let passed = null_location == 0
        && null_date == 0
        && null_population == 0
        && duplicates == 0
        && population_le_0 == 0;

    CheckOutcome::new(
        target,
        passed,
        if passed { Severity::None } else { Severity::Error },
    )
    .with("null_location", null_location)
    .with("null_date", null_date)
    .with("null_population", null_population)
    .with("duplicados_location_date", duplicates)
    .with("population_le_0", population_le_0)
}

/// Counts negative observations. Always passes with a warning.
pub fn check_new_cases_non_negative(target: &str, table: &RawTable, column: &str) -> CheckOutcome {
    let Some(values) = table.numeric_column(column) else {
        return CheckOutcome::new(target, true, Severity::Warning)
            .with("nota", format!("Falta columna '{}' para el check", column));
    };
    let negatives = values.iter().flatten().filter(|v| **v < 0.0).count();
    CheckOutcome::new(target, true, Severity::Warning)
        .with(&format!("{}_negativos", column), negatives)
        .with("nota", "OWID puede tener revisiones negativas puntuales.")
}

/// Counts incidence values outside `INCIDENCE_RANGE`. Always passes with a warning.
pub fn check_incidence_range(target: &str, table: &dyn Tabular, column: &str) -> CheckOutcome {
    let Some(values) = table.numbers(column) else {
        return CheckOutcome::new(target, true, Severity::Warning)
            .with("nota", format!("Falta '{}' para el check", column));
    };
    let (lo, hi) = INCIDENCE_RANGE;
    let outside = values
        .iter()
        .flatten()
        .filter(|v| **v < lo || **v > hi)
        .count();
    CheckOutcome::new(target, true, Severity::Warning)
        .with("valores_fuera_de_rango", outside)
        .with("rango_referencia", format!("[{},{}]", lo, hi))
}
