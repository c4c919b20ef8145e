// src/pipeline/run.rs
use rayon::prelude::*;
use std::{collections::BTreeMap, time::Instant};
use tracing::{error, info, instrument, warn};

use super::graph::{Artifact, Check, Inputs, Phase, RunContext, Stage, StageGraph};
use super::report::{HaltReason, RunReport, RunState, ValidationPoint};
use crate::error::{PipelineError, Result};
use crate::validate::{CheckOutcome, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltAction {
    Continue,
    Halt,
}

/// Severity → action. The only place a run decides to stop on data quality.
#[derive(Debug, Clone)]
pub struct SeverityPolicy {
    actions: BTreeMap<Severity, HaltAction>,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            actions: BTreeMap::from([
                (Severity::None, HaltAction::Continue),
                (Severity::Warning, HaltAction::Continue),
                (Severity::Error, HaltAction::Halt),
            ]),
        }
    }
}

impl SeverityPolicy {
    pub fn set(mut self, severity: Severity, action: HaltAction) -> Self {
        self.actions.insert(severity, action);
        self
    }

    pub fn action(&self, severity: Severity) -> HaltAction {
        self.actions
            .get(&severity)
            .copied()
            .unwrap_or(HaltAction::Continue)
    }
}

fn phase_state(phase: Phase) -> RunState {
    match phase {
        Phase::Fetching => RunState::Fetching,
        Phase::Cleaning => RunState::Cleaning,
        Phase::Computing => RunState::Computing,
        Phase::Exporting => RunState::Exporting,
    }
}

fn validation_point(phase: Phase) -> ValidationPoint {
    match phase {
        Phase::Fetching | Phase::Cleaning => ValidationPoint::Input,
        Phase::Computing | Phase::Exporting => ValidationPoint::Output,
    }
}

/// Interprets a `StageGraph`: batches in plan order, stages of a batch in
/// parallel, then the batch's checks in parallel.
pub struct Orchestrator {
    graph: StageGraph,
    policy: SeverityPolicy,
}

impl Orchestrator {
    pub fn new(graph: StageGraph) -> Self {
        Self {
            graph,
            policy: SeverityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SeverityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    fn inputs_for(stage: &Stage, artifacts: &BTreeMap<String, Artifact>) -> Result<Inputs> {
        let mut inputs = Inputs::default();
        for dep in &stage.depends_on {
            let artifact = artifacts.get(dep).ok_or_else(|| {
                PipelineError::Graph(format!("'{}' ran before its input '{}'", stage.name, dep))
            })?;
            inputs.insert(dep.clone(), artifact.clone());
        }
        Ok(inputs)
    }

    #[instrument(level = "info", skip_all, fields(today = %ctx.today))]
    pub fn run(&self, ctx: &RunContext<'_>) -> RunReport {
        let mut report = RunReport::default();
        report.enter(RunState::Pending);
        let mut artifacts: BTreeMap<String, Artifact> = BTreeMap::new();

        for batch in self.graph.batches() {
            let Some(phase) = batch.first().map(|s| s.phase) else {
                continue;
            };
            report.enter(phase_state(phase));

            let results: Vec<(&Stage, Result<Artifact>)> = batch
                .par_iter()
                .map(|stage| {
                    let start = Instant::now();
                    let out = Self::inputs_for(stage, &artifacts)
                        .and_then(|inputs| stage.execute(ctx, &inputs));
                    if out.is_ok() {
                        info!(stage = %stage.name, elapsed = ?start.elapsed(), "stage complete");
                    }
                    (*stage, out)
                })
                .collect();

            for (stage, out) in results {
                match out {
                    Ok(artifact) => {
                        artifacts.insert(stage.name.clone(), artifact);
                    }
                    Err(e) => {
                        error!(stage = %stage.name, error = %e, "stage failed; halting run");
                        report.halt(HaltReason::StageFailed {
                            stage: stage.name.clone(),
                            error: e,
                        });
                        return report;
                    }
                }
            }

            let checks: Vec<(&Stage, &Check)> = batch
                .iter()
                .copied()
                .flat_map(|s| s.checks.iter().map(move |c| (s, c)))
                .collect();
            if checks.is_empty() {
                continue;
            }
            report.enter(RunState::Validating(validation_point(phase)));

            let outcomes: Vec<(&str, &str, Result<CheckOutcome>)> = checks
                .par_iter()
                .map(|(stage, check)| {
                    let out = match artifacts.get(&stage.name) {
                        Some(artifact) => check.evaluate(artifact, ctx),
                        None => Err(PipelineError::Graph(format!(
                            "no output from '{}' to check",
                            stage.name
                        ))),
                    };
                    (stage.name.as_str(), check.name.as_str(), out)
                })
                .collect();

            let mut halting = Vec::new();
            let mut broken = None;
            for (stage, name, out) in outcomes {
                match out {
                    Ok(outcome) => {
                        let metadata = &outcome.metadata;
                        match outcome.severity {
                            Severity::Error => {
                                error!(check = name, target = stage, ?metadata, "check failed")
                            }
                            Severity::Warning => {
                                warn!(check = name, target = stage, ?metadata, "check warning")
                            }
                            Severity::None => info!(check = name, target = stage, "check passed"),
                        }
                        if self.policy.action(outcome.severity) == HaltAction::Halt {
                            halting.push(name.to_string());
                        }
                        report.checks.insert(name.to_string(), outcome);
                    }
                    Err(e) => {
                        error!(check = name, error = %e, "check could not run");
                        if broken.is_none() {
                            broken = Some((stage.to_string(), e));
                        }
                    }
                }
            }

            if let Some((stage, error)) = broken {
                report.halt(HaltReason::StageFailed { stage, error });
                return report;
            }
            if !halting.is_empty() {
                error!(checks = ?halting, "error-severity checks; halting run");
                report.halt(HaltReason::FailedChecks { checks: halting });
                return report;
            }
        }

        report.outputs = artifacts.values().flat_map(Artifact::written_paths).collect();
        report.enter(RunState::Done);
        info!(outputs = report.outputs.len(), "run complete");
        report
    }
}
