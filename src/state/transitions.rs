//! Pure state transitions. Each takes the current document by value and
//! returns the next one, so they plug straight into `StateStore::update`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GearError, Result};
use crate::guard;
use crate::roadmap::types::RoadmapItem;
use crate::state::types::*;

/// What a stage collaborator hands back when it finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageOutput {
    pub artifacts: Vec<String>,
    pub metadata: Metadata,
    pub route: Option<Route>,
    pub roadmap: Option<Vec<RoadmapItem>>,
}

fn expect_next(state: &WorkflowState, stage: Stage) -> Result<()> {
    match state.next_stage() {
        Some(next) if next == stage => Ok(()),
        Some(next) => Err(GearError::transition(format!(
            "stage '{}' cannot run now; next stage is '{}'",
            stage, next
        ))),
        None => Err(GearError::transition(format!(
            "stage '{}' cannot run; every stage is complete",
            stage
        ))),
    }
}

/// Mark `stage` as in progress. Restarting a failed or in-progress stage is
/// allowed; it clears the error but keeps recorded metadata.
pub fn start_stage(mut state: WorkflowState, stage: Stage, now: DateTime<Utc>) -> Result<WorkflowState> {
    expect_next(&state, stage)?;
    let detail = state
        .stage_details
        .entry(stage)
        .or_insert_with(|| StageDetail::started(now));
    detail.status = StageStatus::InProgress;
    detail.started_at = now;
    detail.completed_at = None;
    detail.error = None;
    state.current_stage = stage;
    Ok(state)
}

/// Mark `stage` as completed and advance to the following gear.
pub fn complete_stage(
    mut state: WorkflowState,
    stage: Stage,
    output: StageOutput,
    now: DateTime<Utc>,
) -> Result<WorkflowState> {
    expect_next(&state, stage)?;

    if let Some(route) = output.route {
        state = set_route(state, route)?;
    }
    if let Some(items) = output.roadmap {
        state = record_roadmap(state, items)?;
    }

    let detail = state
        .stage_details
        .entry(stage)
        .or_insert_with(|| StageDetail::started(now));
    detail.status = StageStatus::Completed;
    detail.completed_at = Some(now);
    detail.error = None;
    for artifact in output.artifacts {
        if !detail.artifacts.contains(&artifact) {
            detail.artifacts.push(artifact);
        }
    }
    detail.metadata.extend(output.metadata);

    state.completed_stages.push(stage);
    state.current_stage = state.next_stage().unwrap_or(Stage::Done);
    Ok(state)
}

/// Record a failure. The stage stays current and can be started again.
pub fn fail_stage(
    mut state: WorkflowState,
    stage: Stage,
    error: &str,
    now: DateTime<Utc>,
) -> Result<WorkflowState> {
    expect_next(&state, stage)?;
    let detail = state
        .stage_details
        .entry(stage)
        .or_insert_with(|| StageDetail::started(now));
    detail.status = StageStatus::Failed;
    detail.completed_at = None;
    detail.error = Some(error.to_string());
    state.current_stage = stage;
    Ok(state)
}

/// Set the route. Setting the same route again is a no-op.
pub fn set_route(mut state: WorkflowState, route: Route) -> Result<WorkflowState> {
    match state.route {
        Some(existing) if existing != route => Err(GearError::transition(format!(
            "route is already set to '{}' and cannot change to '{}'",
            existing, route
        ))),
        _ => {
            state.route = Some(route);
            Ok(state)
        }
    }
}

pub fn configure_auto_mode(mut state: WorkflowState, auto_mode: AutoMode) -> Result<WorkflowState> {
    state.auto_mode = auto_mode;
    Ok(state)
}

/// Administrative jump to `target`. Every earlier gear that is not complete
/// is recorded as skipped. Moving backwards is refused; use reset instead.
pub fn override_stage(mut state: WorkflowState, target: Stage, now: DateTime<Utc>) -> Result<WorkflowState> {
    let target_index = match target {
        Stage::None => {
            return Err(GearError::transition(
                "cannot override back to 'none'; use reset instead",
            ));
        }
        Stage::Done => Stage::GEARS.len(),
        gear => gear.gear_index().unwrap_or(0),
    };
    if target_index < state.completed_stages.len() {
        return Err(GearError::transition(format!(
            "stage '{}' is already complete; overrides only move forward",
            target
        )));
    }

    for gear in &Stage::GEARS[state.completed_stages.len()..target_index] {
        let detail = state
            .stage_details
            .entry(*gear)
            .or_insert_with(|| StageDetail::started(now));
        detail.status = StageStatus::Skipped;
        detail.completed_at = Some(now);
        detail.error = None;
        state.completed_stages.push(*gear);
    }
    state.current_stage = target;
    Ok(state)
}

/// Replace the recorded roadmap. Derived scores are stripped.
pub fn record_roadmap(mut state: WorkflowState, items: Vec<RoadmapItem>) -> Result<WorkflowState> {
    validate_roadmap(&items)?;
    state.roadmap = items
        .into_iter()
        .map(|mut item| {
            item.score = None;
            item
        })
        .collect();
    Ok(state)
}

/// Store a validated batch of clarification answers on `stage`. The stage
/// must already be started or complete.
pub fn record_clarifications(
    mut state: WorkflowState,
    stage: Stage,
    answers: Vec<String>,
) -> Result<WorkflowState> {
    guard::validate_clarifications(&answers)?;
    if !stage.is_gear() {
        return Err(GearError::invalid_param(
            "stage",
            format!("'{}' is not a gear", stage),
        ));
    }
    let Some(detail) = state.stage_details.get_mut(&stage) else {
        return Err(GearError::transition(format!(
            "stage '{}' has not started; start it before recording clarifications",
            stage
        )));
    };
    detail
        .metadata
        .insert("clarifications".to_string(), serde_json::json!(answers));
    Ok(state)
}
