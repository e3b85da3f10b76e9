use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::error::{GearError, Result};
use crate::pipeline::StageRegistry;
use crate::roadmap::{ExecutionPlan, Prioritizer};
use crate::state::types::{Stage, StageStatus, WorkflowState};
use crate::state::{StateStore, load_or_new, transitions};

/// Outcome of one stage run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub artifacts: Vec<String>,
    pub revision: u64,
}

/// Thin orchestration over the state store: find the next gear, run its
/// collaborator, record the outcome.
pub struct Pipeline {
    registry: Arc<StageRegistry>,
    store: Arc<dyn StateStore>,
}

impl Pipeline {
    pub fn new(registry: Arc<StageRegistry>, store: Arc<dyn StateStore>) -> Self {
        Self { registry, store }
    }

    /// Current state, or the zero-value document if none exists yet.
    pub async fn status(&self) -> Result<WorkflowState> {
        load_or_new(self.store.as_ref()).await
    }

    /// Run the next gear. Returns `None` once every gear is complete.
    pub async fn run_next(&self) -> Result<Option<StageReport>> {
        let state = self.status().await?;
        let Some(stage) = state.next_stage() else {
            return Ok(None);
        };

        let runner = self.registry.get(stage).ok_or_else(|| {
            GearError::transition(format!("no runner registered for stage '{}'", stage))
        })?;

        let started = self
            .store
            .update(Box::new(move |s| {
                transitions::start_stage(s, stage, Utc::now())
            }))
            .await?;

        info!(stage = %stage, revision = started.revision, "Running stage");

        match runner.run(&started).await {
            Ok(output) => {
                let artifacts = output.artifacts.clone();
                let state = self
                    .store
                    .update(Box::new(move |s| {
                        transitions::complete_stage(s, stage, output, Utc::now())
                    }))
                    .await?;

                info!(stage = %stage, next = %state.current_stage, "Stage completed");
                Ok(Some(StageReport {
                    stage,
                    status: StageStatus::Completed,
                    artifacts,
                    revision: state.revision,
                }))
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(stage = %stage, error = %message, "Stage failed");

                let recorded = message.clone();
                self.store
                    .update(Box::new(move |s| {
                        transitions::fail_stage(s, stage, &recorded, Utc::now())
                    }))
                    .await?;

                Err(GearError::StageFailed {
                    stage: stage.to_string(),
                    message,
                })
            }
        }
    }

    /// Run gears back to back while auto mode stays enabled.
    pub async fn run_auto(&self) -> Result<Vec<StageReport>> {
        if !self.status().await?.auto_mode.enabled {
            return Err(GearError::transition("auto mode is not enabled"));
        }

        let mut reports = Vec::new();
        loop {
            if !self.status().await?.auto_mode.enabled {
                info!("Auto mode disabled; stopping");
                break;
            }
            match self.run_next().await? {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        Ok(reports)
    }

    /// Plan the roadmap recorded in state.
    pub async fn plan(&self, prioritizer: &Prioritizer) -> Result<ExecutionPlan> {
        let state = self.status().await?;
        Ok(prioritizer.plan(&state.roadmap))
    }
}
