// src/pipeline/report.rs
use serde::{Serialize, Serializer};
use std::{collections::BTreeMap, fmt::Display, path::PathBuf};

use crate::error::{PipelineError, Result};
use crate::validate::{CheckOutcome, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPoint {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Fetching,
    Validating(ValidationPoint),
    Cleaning,
    Computing,
    Exporting,
    Done,
    Halted,
}

fn display<T: Display, S: Serializer>(value: &T, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(value)
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    /// Error-severity outcomes, by check name.
    FailedChecks { checks: Vec<String> },
    StageFailed {
        stage: String,
        #[serde(serialize_with = "display")]
        error: PipelineError,
    },
}

/// Everything one run observed: visited states, every check outcome, the
/// files written and, for a halted run, why.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub states: Vec<RunState>,
    pub checks: BTreeMap<String, CheckOutcome>,
    pub outputs: Vec<PathBuf>,
    pub halt: Option<HaltReason>,
}

impl RunReport {
    pub(crate) fn enter(&mut self, state: RunState) {
        if self.states.last() != Some(&state) {
            self.states.push(state);
        }
    }

    pub(crate) fn halt(&mut self, reason: HaltReason) {
        self.halt = Some(reason);
        self.enter(RunState::Halted);
    }

    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Pending)
    }

    pub fn succeeded(&self) -> bool {
        self.final_state() == RunState::Done
    }

    /// Names of checks at `severity`.
    pub fn checks_at(&self, severity: Severity) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, o)| o.severity == severity)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// One line naming the failing checks with their metadata, or the stage
    /// and error that stopped the run.
    pub fn describe_halt(&self) -> Option<String> {
        match self.halt.as_ref()? {
            HaltReason::FailedChecks { checks } => {
                let parts: Vec<String> = checks
                    .iter()
                    .map(|name| match self.checks.get(name) {
                        Some(o) => format!(
                            "{} on {} {}",
                            name,
                            o.target,
                            serde_json::to_string(&o.metadata).unwrap_or_default()
                        ),
                        None => name.clone(),
                    })
                    .collect();
                Some(format!("failed checks: {}", parts.join("; ")))
            }
            HaltReason::StageFailed { stage, error } => {
                Some(format!("stage '{}' failed: {}", stage, error))
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("serializing run report: {}", e)))
    }

    /// `Ok(self)` for a completed run, the halt as an error otherwise.
    pub fn into_result(mut self) -> Result<Self> {
        match self.halt.take() {
            None => Ok(self),
            Some(HaltReason::FailedChecks { checks }) => Err(PipelineError::CheckFailure { checks }),
            Some(HaltReason::StageFailed { error, .. }) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_states_are_collapsed() {
        let mut r = RunReport::default();
        r.enter(RunState::Pending);
        r.enter(RunState::Computing);
        r.enter(RunState::Computing);
        assert_eq!(r.states, vec![RunState::Pending, RunState::Computing]);
        assert!(!r.succeeded());
    }

    #[test]
    fn halted_report_serializes_error_text() -> anyhow::Result<()> {
        let mut r = RunReport::default();
        r.enter(RunState::Pending);
        r.halt(HaltReason::StageFailed {
            stage: "clean".into(),
            error: PipelineError::MissingColumns {
                stage: "clean".into(),
                columns: vec!["population".into()],
            },
        });
        let json: serde_json::Value = serde_json::from_str(&r.to_json()?)?;
        assert_eq!(json["halt"]["kind"], "stage_failed");
        assert!(json["halt"]["error"]
            .as_str()
            .unwrap_or_default()
            .contains("population"));
        assert_eq!(json["states"][1], "halted");

        assert!(matches!(
            r.into_result(),
            Err(PipelineError::MissingColumns { .. })
        ));
        Ok(())
    }

    #[test]
    fn failed_checks_name_their_metadata() {
        let mut r = RunReport::default();
        r.checks.insert(
            "no_future_dates".into(),
            CheckOutcome::new("raw_data", false, Severity::Error).with("filas_afectadas", 3),
        );
        r.halt(HaltReason::FailedChecks {
            checks: vec!["no_future_dates".into()],
        });
        let text = r.describe_halt().unwrap();
        assert!(text.contains("no_future_dates on raw_data"));
        assert!(text.contains("\"filas_afectadas\":3"));
        assert_eq!(r.checks_at(Severity::Error), vec!["no_future_dates"]);
    }
}
