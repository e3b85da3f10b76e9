pub mod executor;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::state::transitions::StageOutput;
use crate::state::types::{Stage, WorkflowState};

pub use executor::{Pipeline, StageReport};

/// A stage collaborator. Receives a read-only snapshot of the workflow
/// state and reports what it produced.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// The gear this runner implements.
    fn stage(&self) -> Stage;

    /// Human-readable description.
    fn description(&self) -> &str;

    async fn run(&self, state: &WorkflowState) -> Result<StageOutput>;
}

/// Registry of stage runners, one per gear.
pub struct StageRegistry {
    runners: BTreeMap<Stage, Arc<dyn StageRunner>>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            runners: BTreeMap::new(),
        }
    }

    /// Register a runner, replacing any earlier one for the same gear.
    pub fn register(&mut self, runner: Arc<dyn StageRunner>) {
        self.runners.insert(runner.stage(), runner);
    }

    pub fn get(&self, stage: Stage) -> Option<Arc<dyn StageRunner>> {
        self.runners.get(&stage).cloned()
    }

    /// Registered gears with descriptions, in gear order.
    pub fn list(&self) -> Vec<(Stage, &str)> {
        self.runners
            .iter()
            .map(|(stage, runner)| (*stage, runner.description()))
            .collect()
    }
}
