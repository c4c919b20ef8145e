// src/pipeline/assets.rs
use std::{fs, sync::Arc};
use tracing::info;

use super::graph::{Artifact, Check, Phase, RunContext, Stage, StageGraph};
use crate::error::{PipelineError, Result};
use crate::export::{self, write_err, PROFILE_FILE, SHEET_GROWTH, SHEET_INCIDENCE};
use crate::fetch::fetch_and_parse;
use crate::process::{self, metrics::INCIDENCE_7D, IncidenceTable};
use crate::table::Tabular;
use crate::validate::{self, CheckOutcome};

pub const RAW_DATA: &str = "raw_data";
pub const PROCESSED_DATA: &str = "processed_data";
pub const INCIDENCE: &str = "incidence_7d";
pub const GROWTH_FACTOR: &str = "growth_factor_7d";
pub const REPORT: &str = "report";
pub const PROFILE: &str = "profile";

fn expect_raw<'a>(artifact: &'a Artifact, check: &str) -> Result<&'a crate::table::RawTable> {
    artifact.as_raw().ok_or_else(|| {
        PipelineError::Graph(format!("{} needs a raw table, got a {}", check, artifact.kind()))
    })
}

fn raw_checks() -> Vec<Check> {
    vec![
        Check::new("no_future_dates", |a: &Artifact, ctx: &RunContext<'_>| {
            Ok(validate::check_no_future_dates(RAW_DATA, expect_raw(a, "no_future_dates")?, ctx.today))
        }),
        Check::new("required_fields_and_uniqueness", |a: &Artifact, _: &RunContext<'_>| {
            Ok(validate::check_required_fields_and_uniqueness(
                RAW_DATA,
                expect_raw(a, "required_fields_and_uniqueness")?,
            ))
        }),
        Check::new("new_cases_non_negative", |a: &Artifact, ctx: &RunContext<'_>| {
            Ok(validate::check_new_cases_non_negative(
                RAW_DATA,
                expect_raw(a, "new_cases_non_negative")?,
                &ctx.config.observation_column,
            ))
        }),
    ]
}

fn incidence_range_check() -> Check {
    Check::new("incidence_range", |a: &Artifact, _: &RunContext<'_>| -> Result<CheckOutcome> {
        let table = a.as_tabular().ok_or_else(|| {
            PipelineError::Graph(format!("incidence_range needs a table, got a {}", a.kind()))
        })?;
        Ok(validate::check_incidence_range(INCIDENCE, table, INCIDENCE_7D))
    })
}

/// Latest 7-day incidence per country next to the comparison country's.
fn log_against_baseline(table: &IncidenceTable, baseline: &str) {
    let latest = |country: &str| {
        table
            .rows
            .iter()
            .filter(|r| r.country == country)
            .max_by_key(|r| r.period_end)
    };
    let Some(base) = latest(baseline) else {
        return;
    };
    let countries: std::collections::BTreeSet<&str> =
        table.rows.iter().map(|r| r.country.as_str()).collect();
    for country in countries.into_iter().filter(|c| *c != baseline) {
        if let Some(row) = latest(country) {
            info!(
                country,
                period_end = %row.period_end,
                incidence_7d = row.incidence_7d,
                baseline,
                baseline_incidence_7d = base.incidence_7d,
                "latest incidence against baseline"
            );
        }
    }
}

/// raw_data → processed_data → {incidence_7d, growth_factor_7d} → report,
/// plus the profile hanging off raw_data.
pub fn covid_graph() -> Result<StageGraph> {
    let mut raw = Stage::new(RAW_DATA, Phase::Fetching, |ctx, _| {
        let table = fetch_and_parse(ctx.source, &ctx.config.source_location)?;
        Ok(Artifact::Raw(Arc::new(table)))
    });
    for check in raw_checks() {
        raw = raw.check(check);
    }

    let processed = Stage::new(PROCESSED_DATA, Phase::Cleaning, |ctx, inputs| {
        let raw = inputs.raw(RAW_DATA)?;
        let cfg = ctx.config;
        let table = process::clean(
            &raw,
            &cfg.target_locations,
            &cfg.required_non_null,
            &cfg.projection,
        )?;
        Ok(Artifact::Processed(Arc::new(table)))
    })
    .after(&[RAW_DATA]);

    let incidence = Stage::new(INCIDENCE, Phase::Computing, |ctx, inputs| {
        let processed = inputs.processed(PROCESSED_DATA)?;
        let cfg = ctx.config;
        let table = process::compute_incidence(
            &processed,
            &cfg.observation_column,
            &cfg.population_column,
        )?;
        log_against_baseline(&table, &cfg.comparison_location);
        Ok(Artifact::Incidence(Arc::new(table)))
    })
    .after(&[PROCESSED_DATA])
    .check(incidence_range_check());

    let growth = Stage::new(GROWTH_FACTOR, Phase::Computing, |ctx, inputs| {
        let processed = inputs.processed(PROCESSED_DATA)?;
        let table = process::compute_growth_factor(&processed, &ctx.config.observation_column)?;
        Ok(Artifact::Growth(Arc::new(table)))
    })
    .after(&[PROCESSED_DATA]);

    let report = Stage::new(REPORT, Phase::Exporting, |ctx, inputs| {
        let processed = inputs.processed(PROCESSED_DATA)?;
        let incidence = inputs.incidence(INCIDENCE)?;
        let growth = inputs.growth(GROWTH_FACTOR)?;
        let metrics: [(&str, &dyn Tabular); 2] = [
            (SHEET_INCIDENCE, &*incidence),
            (SHEET_GROWTH, &*growth),
        ];
        let descriptor = export::export(&*processed, &metrics, &ctx.config.output_root)?;
        Ok(Artifact::Exported(descriptor))
    })
    .after(&[PROCESSED_DATA, INCIDENCE, GROWTH_FACTOR]);

    let profile = Stage::new(PROFILE, Phase::Exporting, |ctx, inputs| {
        let raw = inputs.raw(RAW_DATA)?;
        let cfg = ctx.config;
        let table = process::profile(
            &raw,
            &cfg.target_locations,
            &cfg.observation_column,
            &cfg.required_non_null,
        )?;
        fs::create_dir_all(&cfg.output_root).map_err(|e| write_err(&cfg.output_root, e))?;
        let path = cfg.output_root.join(PROFILE_FILE);
        export::write_csv(&table, &path)?;
        Ok(Artifact::Files(vec![path]))
    })
    .after(&[RAW_DATA]);

    StageGraph::builder()
        .stage(raw)
        .stage(processed)
        .stage(incidence)
        .stage(growth)
        .stage(report)
        .stage(profile)
        .build()
}
