// src/pipeline/mod.rs
use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fetch::{source_for, TableSource};

pub mod assets;
pub mod graph;
pub mod report;
pub mod run;

pub use graph::{Artifact, Check, Inputs, Phase, RunContext, Stage, StageGraph};
pub use report::{HaltReason, RunReport, RunState, ValidationPoint};
pub use run::{HaltAction, Orchestrator, SeverityPolicy};

/// Run the COVID graph against an explicit source and calendar day.
pub fn run_with(
    config: &PipelineConfig,
    source: &dyn TableSource,
    today: NaiveDate,
) -> Result<RunReport> {
    config.validate()?;
    let orchestrator = Orchestrator::new(assets::covid_graph()?);
    info!(plan = ?orchestrator.graph().plan(), "stage plan");
    let ctx = RunContext {
        config,
        source,
        today,
    };
    Ok(orchestrator.run(&ctx))
}

/// Run the COVID graph against the configured source, treating today's UTC
/// date as "now". A halted run is still `Ok`; inspect `RunReport::halt`.
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunReport> {
    let source = source_for(&config.source_location, config.fetch_timeout())?;
    run_with(config, source.as_ref(), Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::export::{PROFILE_FILE, SHEET_GROWTH, SHEET_INCIDENCE, SHEET_PROCESSED, WORKBOOK_FILE};
    use crate::fetch::FileSource;
    use crate::validate::Severity;
    use chrono::Duration;
    use std::{fmt::Write as _, fs, path::Path};
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_tracing() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()
    }

    /// Two target countries plus one other, `days` consecutive days each.
    fn feed(days: i64, tweak: impl Fn(&str, i64, &mut [String])) -> String {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let mut out = String::from("iso_code,location,date,new_cases,people_vaccinated,population\n");
        for (code, loc) in [("ECU", "Ecuador"), ("PER", "Peru"), ("CHL", "Chile")] {
            for d in 0..days {
                let mut row = vec![
                    code.to_string(),
                    loc.to_string(),
                    (start + Duration::days(d)).to_string(),
                    (10 + d).to_string(),
                    (100 * d).to_string(),
                    "1000000".to_string(),
                ];
                tweak(loc, d, &mut row);
                let _ = writeln!(out, "{}", row.join(","));
            }
        }
        out
    }

    fn setup(csv: &str) -> anyhow::Result<(TempDir, PipelineConfig)> {
        init_tracing();
        let dir = tempdir()?;
        let source = dir.path().join("owid.csv");
        fs::write(&source, csv)?;
        let config = PipelineConfig {
            source_location: source.display().to_string(),
            output_root: dir.path().join("reports"),
            ..PipelineConfig::default()
        };
        Ok((dir, config))
    }

    fn csv_rows(path: &Path) -> anyhow::Result<usize> {
        Ok(fs::read_to_string(path)?.lines().count() - 1)
    }

    #[test]
    fn end_to_end_two_countries_twenty_days() -> anyhow::Result<()> {
        let (_dir, config) = setup(&feed(20, |_, _, _| {}))?;
        let report = run_with(&config, &FileSource, today())?;

        assert!(report.succeeded(), "{:?}", report.describe_halt());
        assert_eq!(
            report.states,
            vec![
                RunState::Pending,
                RunState::Fetching,
                RunState::Validating(ValidationPoint::Input),
                RunState::Cleaning,
                RunState::Computing,
                RunState::Validating(ValidationPoint::Output),
                RunState::Exporting,
                RunState::Done,
            ]
        );

        let root = &config.output_root;
        assert_eq!(csv_rows(&root.join(format!("{}.csv", SHEET_PROCESSED)))?, 40);
        assert_eq!(csv_rows(&root.join(format!("{}.csv", SHEET_INCIDENCE)))?, 28);
        assert_eq!(csv_rows(&root.join(format!("{}.csv", SHEET_GROWTH)))?, 14);
        assert!(root.join(WORKBOOK_FILE).exists());
        assert!(root.join(PROFILE_FILE).exists());
        assert_eq!(report.outputs.len(), 8);

        let growth = fs::read_to_string(root.join(format!("{}.csv", SHEET_GROWTH)))?;
        let first_week_end = growth.lines().nth(1).and_then(|l| l.split(',').next());
        assert_eq!(first_week_end, Some("2021-01-14"));

        assert_eq!(report.checks.len(), 4);
        assert_eq!(
            report.checks_at(Severity::Warning),
            vec!["incidence_range", "new_cases_non_negative"]
        );
        Ok(())
    }

    #[test]
    fn future_date_halts_before_cleaning() -> anyhow::Result<()> {
        let tomorrow = (today() + Duration::days(1)).to_string();
        let csv = feed(20, |loc, d, row| {
            if loc == "Chile" && d == 0 {
                row[2] = tomorrow.clone();
            }
        });
        let (_dir, config) = setup(&csv)?;
        let report = run_with(&config, &FileSource, today())?;

        assert_eq!(report.final_state(), RunState::Halted);
        assert!(!report.states.contains(&RunState::Cleaning));
        assert_eq!(report.checks["no_future_dates"].count("filas_afectadas"), Some(1));
        assert!(!config.output_root.join(WORKBOOK_FILE).exists());
        assert!(matches!(
            report.into_result(),
            Err(PipelineError::CheckFailure { checks }) if checks == vec!["no_future_dates".to_string()]
        ));
        Ok(())
    }

    #[test]
    fn negative_cases_warn_but_do_not_halt() -> anyhow::Result<()> {
        let csv = feed(20, |loc, d, row| {
            if loc == "Peru" && (d == 3 || d == 4) {
                row[3] = "-5".to_string();
            }
        });
        let (_dir, config) = setup(&csv)?;
        let report = run_with(&config, &FileSource, today())?;

        assert!(report.succeeded());
        let outcome = &report.checks["new_cases_non_negative"];
        assert!(outcome.passed);
        assert_eq!(outcome.severity, Severity::Warning);
        assert_eq!(outcome.count("new_cases_negativos"), Some(2));
        Ok(())
    }

    #[test]
    fn missing_projection_column_halts_with_stage_error() -> anyhow::Result<()> {
        let csv = "location,date,new_cases,population\nPeru,2021-01-01,1,100\n";
        let (_dir, config) = setup(csv)?;
        let report = run_with(&config, &FileSource, today())?;

        assert_eq!(report.final_state(), RunState::Halted);
        match &report.halt {
            Some(HaltReason::StageFailed {
                stage,
                error: PipelineError::MissingColumns { columns, .. },
            }) => {
                assert_eq!(stage, assets::PROCESSED_DATA);
                assert_eq!(columns, &vec!["people_vaccinated".to_string()]);
            }
            other => panic!("unexpected halt: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn unreachable_source_halts_in_fetching() -> anyhow::Result<()> {
        let (dir, mut config) = setup("")?;
        config.source_location = dir.path().join("absent.csv").display().to_string();
        let report = run_with(&config, &FileSource, today())?;
        assert_eq!(
            report.states,
            vec![RunState::Pending, RunState::Fetching, RunState::Halted]
        );
        assert!(matches!(
            report.into_result(),
            Err(PipelineError::SourceUnavailable { .. })
        ));
        Ok(())
    }

    #[test]
    fn run_pipeline_picks_file_source_from_path() -> anyhow::Result<()> {
        // dated in the past, so the real clock never trips the future check
        let (_dir, config) = setup(&feed(10, |_, _, _| {}))?;
        let report = run_pipeline(&config)?;
        assert!(report.succeeded(), "{:?}", report.describe_halt());
        Ok(())
    }
}
