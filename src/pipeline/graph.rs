// src/pipeline/graph.rs
use chrono::NaiveDate;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    path::PathBuf,
    sync::Arc,
};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::export::ExportDescriptor;
use crate::fetch::TableSource;
use crate::process::{GrowthTable, IncidenceTable, ProcessingTable, ProfileTable};
use crate::table::{RawTable, Tabular};
use crate::validate::CheckOutcome;

/// Coarse position of a stage in a run. Ready stages run lowest phase first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    Fetching,
    Cleaning,
    Computing,
    Exporting,
}

/// What a stage hands downstream. Tables are shared, never mutated.
#[derive(Debug, Clone)]
pub enum Artifact {
    Raw(Arc<RawTable>),
    Processed(Arc<ProcessingTable>),
    Incidence(Arc<IncidenceTable>),
    Growth(Arc<GrowthTable>),
    Profile(Arc<ProfileTable>),
    Exported(ExportDescriptor),
    Files(Vec<PathBuf>),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Raw(_) => "raw table",
            Artifact::Processed(_) => "processing table",
            Artifact::Incidence(_) => "incidence table",
            Artifact::Growth(_) => "growth table",
            Artifact::Profile(_) => "profile table",
            Artifact::Exported(_) => "export descriptor",
            Artifact::Files(_) => "file list",
        }
    }

    /// Labeled view for artifacts that are tables with a fixed schema.
    pub fn as_tabular(&self) -> Option<&dyn Tabular> {
        match self {
            Artifact::Processed(t) => Some(&**t),
            Artifact::Incidence(t) => Some(&**t),
            Artifact::Growth(t) => Some(&**t),
            Artifact::Profile(t) => Some(&**t),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawTable> {
        match self {
            Artifact::Raw(t) => Some(&**t),
            _ => None,
        }
    }

    /// Files this artifact put on disk.
    pub fn written_paths(&self) -> Vec<PathBuf> {
        match self {
            Artifact::Exported(d) => d.paths(),
            Artifact::Files(f) => f.clone(),
            _ => Vec::new(),
        }
    }
}

fn mismatch(stage: &str, want: &str, got: &Artifact) -> PipelineError {
    PipelineError::Graph(format!(
        "input '{}' is a {}, expected a {}",
        stage,
        got.kind(),
        want
    ))
}

/// Outputs of a stage's declared dependencies, by stage name.
#[derive(Debug, Default, Clone)]
pub struct Inputs {
    artifacts: BTreeMap<String, Artifact>,
}

impl Inputs {
    pub fn insert(&mut self, stage: impl Into<String>, artifact: Artifact) {
        self.artifacts.insert(stage.into(), artifact);
    }

    pub fn get(&self, stage: &str) -> Result<&Artifact> {
        self.artifacts
            .get(stage)
            .ok_or_else(|| PipelineError::Graph(format!("no input named '{}'", stage)))
    }

    pub fn raw(&self, stage: &str) -> Result<Arc<RawTable>> {
        match self.get(stage)? {
            Artifact::Raw(t) => Ok(Arc::clone(t)),
            other => Err(mismatch(stage, "raw table", other)),
        }
    }

    pub fn processed(&self, stage: &str) -> Result<Arc<ProcessingTable>> {
        match self.get(stage)? {
            Artifact::Processed(t) => Ok(Arc::clone(t)),
            other => Err(mismatch(stage, "processing table", other)),
        }
    }

    pub fn incidence(&self, stage: &str) -> Result<Arc<IncidenceTable>> {
        match self.get(stage)? {
            Artifact::Incidence(t) => Ok(Arc::clone(t)),
            other => Err(mismatch(stage, "incidence table", other)),
        }
    }

    pub fn growth(&self, stage: &str) -> Result<Arc<GrowthTable>> {
        match self.get(stage)? {
            Artifact::Growth(t) => Ok(Arc::clone(t)),
            other => Err(mismatch(stage, "growth table", other)),
        }
    }
}

/// Read-only state shared by every stage of one run.
pub struct RunContext<'a> {
    pub config: &'a PipelineConfig,
    pub source: &'a dyn TableSource,
    /// Calendar day the run treats as "now".
    pub today: NaiveDate,
}

type StageFn = dyn Fn(&RunContext<'_>, &Inputs) -> Result<Artifact> + Send + Sync;
type CheckFn = dyn Fn(&Artifact, &RunContext<'_>) -> Result<CheckOutcome> + Send + Sync;

/// A named data-quality check attached to one stage's output.
pub struct Check {
    pub name: String,
    run: Box<CheckFn>,
}

impl Check {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Artifact, &RunContext<'_>) -> Result<CheckOutcome> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn evaluate(&self, artifact: &Artifact, ctx: &RunContext<'_>) -> Result<CheckOutcome> {
        (self.run)(artifact, ctx)
    }
}

pub struct Stage {
    pub name: String,
    pub phase: Phase,
    pub depends_on: Vec<String>,
    pub checks: Vec<Check>,
    run: Box<StageFn>,
}

impl Stage {
    pub fn new<F>(name: impl Into<String>, phase: Phase, run: F) -> Self
    where
        F: Fn(&RunContext<'_>, &Inputs) -> Result<Artifact> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            phase,
            depends_on: Vec::new(),
            checks: Vec::new(),
            run: Box::new(run),
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.depends_on.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn execute(&self, ctx: &RunContext<'_>, inputs: &Inputs) -> Result<Artifact> {
        (self.run)(ctx, inputs)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("depends_on", &self.depends_on)
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Validated stage graph plus its execution plan.
#[derive(Debug)]
pub struct StageGraph {
    stages: Vec<Stage>,
    /// indices into `stages`; each batch only depends on earlier batches
    batches: Vec<Vec<usize>>,
}

#[derive(Default)]
pub struct GraphBuilder {
    stages: Vec<Stage>,
}

impl GraphBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Rejects duplicate names, unknown dependencies and cycles, then plans
    /// batches: repeatedly take every ready stage of the lowest ready phase.
    pub fn build(self) -> Result<StageGraph> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, s) in self.stages.iter().enumerate() {
            if index.insert(s.name.as_str(), i).is_some() {
                return Err(PipelineError::Graph(format!("duplicate stage '{}'", s.name)));
            }
        }
        let mut check_names = HashSet::new();
        for c in self.stages.iter().flat_map(|s| &s.checks) {
            if !check_names.insert(c.name.as_str()) {
                return Err(PipelineError::Graph(format!("duplicate check '{}'", c.name)));
            }
        }

        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(self.stages.len());
        for s in &self.stages {
            let mut d = Vec::with_capacity(s.depends_on.len());
            for name in &s.depends_on {
                match index.get(name.as_str()) {
                    Some(&j) => d.push(j),
                    None => {
                        return Err(PipelineError::Graph(format!(
                            "stage '{}' depends on unknown stage '{}'",
                            s.name, name
                        )))
                    }
                }
            }
            deps.push(d);
        }

        let mut done = vec![false; self.stages.len()];
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut remaining = self.stages.len();
        while remaining > 0 {
            let ready: Vec<usize> = (0..self.stages.len())
                .filter(|&i| !done[i] && deps[i].iter().all(|&j| done[j]))
                .collect();
            let Some(phase) = ready.iter().map(|&i| self.stages[i].phase).min() else {
                let stuck: Vec<&str> = (0..self.stages.len())
                    .filter(|&i| !done[i])
                    .map(|i| self.stages[i].name.as_str())
                    .collect();
                return Err(PipelineError::Graph(format!(
                    "dependency cycle among: {}",
                    stuck.join(", ")
                )));
            };
            let batch: Vec<usize> = ready
                .into_iter()
                .filter(|&i| self.stages[i].phase == phase)
                .collect();
            for &i in &batch {
                done[i] = true;
            }
            remaining -= batch.len();
            batches.push(batch);
        }

        Ok(StageGraph {
            stages: self.stages,
            batches,
        })
    }
}

impl StageGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn batches(&self) -> impl Iterator<Item = Vec<&Stage>> + '_ {
        self.batches
            .iter()
            .map(move |b| b.iter().map(|&i| &self.stages[i]).collect())
    }

    /// Stage names per batch, in execution order.
    pub fn plan(&self) -> Vec<Vec<&str>> {
        self.batches()
            .map(|b| b.into_iter().map(|s| s.name.as_str()).collect())
            .collect()
    }
}
