// src/config.rs

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::table::{DATE, LOCATION};

/// Published compact OWID feed.
pub const DEFAULT_SOURCE_URL: &str =
    "https://catalog.ourworldindata.org/garden/covid/latest/compact/compact.csv";

pub const CONFIG_PATH_ENV: &str = "COVID_PIPELINE_CONFIG";
pub const SOURCE_URL_ENV: &str = "COVID_SOURCE_URL";
pub const OUTPUT_DIR_ENV: &str = "COVID_OUTPUT_DIR";

/// Everything a run consumes from the outside world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_location: String,
    pub target_locations: BTreeSet<String>,
    pub comparison_location: String,
    pub required_non_null: Vec<String>,
    pub projection: Vec<String>,
    pub observation_column: String,
    pub population_column: String,
    pub output_root: PathBuf,
    pub fetch_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let comparison_location = "Peru".to_string();
        Self {
            source_location: DEFAULT_SOURCE_URL.to_string(),
            target_locations: ["Ecuador".to_string(), comparison_location.clone()]
                .into_iter()
                .collect(),
            comparison_location,
            required_non_null: vec!["new_cases".into(), "people_vaccinated".into()],
            projection: vec![
                LOCATION.into(),
                DATE.into(),
                "new_cases".into(),
                "people_vaccinated".into(),
                "population".into(),
            ],
            observation_column: "new_cases".into(),
            population_column: "population".into(),
            output_root: PathBuf::from("reports"),
            fetch_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    /// Read a YAML config; missing keys fall back to the defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Self =
            serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, then the file named by `COVID_PIPELINE_CONFIG`, then the
    /// single-value env overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                info!(%path, "loading pipeline config");
                Self::from_yaml_file(path)?
            }
            Err(_) => Self::default(),
        };
        if let Ok(url) = env::var(SOURCE_URL_ENV) {
            debug!(%url, "source location overridden from env");
            cfg.source_location = url;
        }
        if let Ok(dir) = env::var(OUTPUT_DIR_ENV) {
            debug!(%dir, "output root overridden from env");
            cfg.output_root = PathBuf::from(dir);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_locations.is_empty() {
            return Err(PipelineError::Config("target_locations is empty".into()));
        }
        if !self.target_locations.contains(&self.comparison_location) {
            return Err(PipelineError::Config(format!(
                "comparison location '{}' is not one of the target locations",
                self.comparison_location
            )));
        }
        for key in [LOCATION, DATE] {
            if !self.projection.iter().any(|c| c == key) {
                return Err(PipelineError::Config(format!(
                    "projection must include '{}'",
                    key
                )));
            }
        }
        for col in [&self.observation_column, &self.population_column] {
            if !self.projection.contains(col) {
                return Err(PipelineError::Config(format!(
                    "projection must include metric input '{}'",
                    col
                )));
            }
        }
        if self.fetch_timeout_secs == 0 {
            return Err(PipelineError::Config("fetch_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert!(cfg.target_locations.contains("Ecuador"));
        assert!(cfg.target_locations.contains("Peru"));
        assert_eq!(cfg.comparison_location, "Peru");
    }

    #[test]
    fn yaml_overrides_only_named_keys() {
        let yaml = r#"
source_location: "file:///tmp/feed.csv"
output_root: "out"
"#;
        let cfg = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.source_location, "file:///tmp/feed.csv");
        assert_eq!(cfg.output_root, PathBuf::from("out"));
        assert_eq!(cfg.required_non_null, vec!["new_cases", "people_vaccinated"]);
    }

    #[test]
    fn baseline_outside_targets_is_rejected() {
        let yaml = r#"
target_locations: ["Ecuador", "Chile"]
comparison_location: "Peru"
"#;
        let err = PipelineConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn projection_without_keys_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.projection.retain(|c| c != "date");
        assert!(cfg.validate().is_err());
    }
}
