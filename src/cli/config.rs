use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::guard::PathGuard;
use crate::roadmap::types::ProjectContext;
use crate::roadmap::{Scorer, ScoringWeights};
use crate::state::json_store::StoreOptions;

/// Configuration loaded from `gearflow.yaml`.
/// All fields are optional; missing fields fall back to defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GearflowConfig {
    /// Directory that every `--dir` argument must stay inside (default: cwd).
    pub allowed_root: Option<String>,
    /// File name of the state document inside the project directory.
    pub state_file: Option<String>,
    pub max_backups: Option<usize>,
    pub max_state_bytes: Option<u64>,
    /// Custom scoring weights; must sum to 1.0.
    pub weights: Option<ScoringWeights>,
    /// Project facts used when scoring the roadmap.
    pub project: Option<ProjectContext>,
}

impl GearflowConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `gearflow.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("gearflow.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: GearflowConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        if let Some(weights) = &config.weights {
            weights
                .validate()
                .with_context(|| format!("Invalid weights in {}", file_path.display()))?;
        }

        Ok(config)
    }

    pub fn store_options(&self) -> StoreOptions {
        let defaults = StoreOptions::default();
        StoreOptions {
            file_name: self.state_file.clone().unwrap_or(defaults.file_name),
            max_backups: self.max_backups.unwrap_or(defaults.max_backups),
            max_bytes: self.max_state_bytes.unwrap_or(defaults.max_bytes),
        }
    }

    pub fn scorer(&self) -> Result<Scorer> {
        match self.weights {
            Some(weights) => Ok(Scorer::with_weights(weights)?),
            None => Ok(Scorer::new()),
        }
    }

    pub fn path_guard(&self) -> Result<PathGuard> {
        let guard = match &self.allowed_root {
            Some(root) => PathGuard::new(root)?,
            None => PathGuard::from_current_dir()?,
        };
        Ok(guard)
    }
}
