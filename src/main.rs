use anyhow::{bail, Context, Result};
use covid_indicators::{pipeline::RunState, run_pipeline, PipelineConfig};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let config = PipelineConfig::from_env().context("loading pipeline configuration")?;
    info!(
        source = %config.source_location,
        targets = ?config.target_locations,
        output = %config.output_root.display(),
        "configured"
    );

    // ─── 3) run the graph ────────────────────────────────────────────
    let start = Instant::now();
    let report = run_pipeline(&config).context("starting pipeline run")?;
    info!(elapsed = ?start.elapsed(), states = ?report.states, "run finished");

    for (name, outcome) in &report.checks {
        if !outcome.passed {
            warn!(check = %name, target = %outcome.target, "check did not pass");
        }
    }
    match report.to_json() {
        Ok(json) => info!(report = %json, "run report"),
        Err(e) => warn!(error = %e, "could not serialize run report"),
    }

    // ─── 4) exit status ──────────────────────────────────────────────
    if report.final_state() != RunState::Done {
        let reason = report
            .describe_halt()
            .unwrap_or_else(|| "run did not complete".to_string());
        error!(%reason, "run halted");
        report.into_result().context("pipeline halted")?;
        bail!("pipeline halted: {}", reason);
    }

    for path in &report.outputs {
        info!(path = %path.display(), "wrote");
    }
    info!("all done");
    Ok(())
}
