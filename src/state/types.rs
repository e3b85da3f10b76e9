use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GearError, Result};
use crate::roadmap::types::RoadmapItem;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Arbitrary collaborator-supplied metadata recorded against a stage.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Position in the fixed gear sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    None,
    Analyze,
    ReverseEngineer,
    CreateSpecs,
    GapAnalysis,
    CompleteSpec,
    Implement,
    Done,
}

impl Stage {
    /// The six gears, in execution order.
    pub const GEARS: [Stage; 6] = [
        Stage::Analyze,
        Stage::ReverseEngineer,
        Stage::CreateSpecs,
        Stage::GapAnalysis,
        Stage::CompleteSpec,
        Stage::Implement,
    ];

    pub const NAMES: [&'static str; 8] = [
        "none",
        "analyze",
        "reverse-engineer",
        "create-specs",
        "gap-analysis",
        "complete-spec",
        "implement",
        "done",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::None => "none",
            Stage::Analyze => "analyze",
            Stage::ReverseEngineer => "reverse-engineer",
            Stage::CreateSpecs => "create-specs",
            Stage::GapAnalysis => "gap-analysis",
            Stage::CompleteSpec => "complete-spec",
            Stage::Implement => "implement",
            Stage::Done => "done",
        }
    }

    /// Index within [`Stage::GEARS`], or `None` for the `none`/`done` markers.
    pub fn gear_index(&self) -> Option<usize> {
        Stage::GEARS.iter().position(|g| g == self)
    }

    pub fn is_gear(&self) -> bool {
        self.gear_index().is_some()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = GearError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Stage::None),
            "analyze" => Ok(Stage::Analyze),
            "reverse-engineer" => Ok(Stage::ReverseEngineer),
            "create-specs" => Ok(Stage::CreateSpecs),
            "gap-analysis" => Ok(Stage::GapAnalysis),
            "complete-spec" => Ok(Stage::CompleteSpec),
            "implement" => Ok(Stage::Implement),
            "done" => Ok(Stage::Done),
            other => Err(GearError::invalid_param(
                "stage",
                format!("'{}' is not one of: {}", other, Stage::NAMES.join(", ")),
            )),
        }
    }
}

/// Whether the project starts from scratch or extends an existing codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Greenfield,
    Brownfield,
}

impl Route {
    pub const NAMES: [&'static str; 2] = ["greenfield", "brownfield"];
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Greenfield => write!(f, "greenfield"),
            Route::Brownfield => write!(f, "brownfield"),
        }
    }
}

impl FromStr for Route {
    type Err = GearError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greenfield" => Ok(Route::Greenfield),
            "brownfield" => Ok(Route::Brownfield),
            other => Err(GearError::invalid_param(
                "route",
                format!("'{}' is not one of: {}", other, Route::NAMES.join(", ")),
            )),
        }
    }
}

/// How open questions are handled when running unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClarificationStrategy {
    #[default]
    Defer,
    Prompt,
    Skip,
}

impl FromStr for ClarificationStrategy {
    type Err = GearError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "defer" => Ok(Self::Defer),
            "prompt" => Ok(Self::Prompt),
            "skip" => Ok(Self::Skip),
            other => Err(GearError::invalid_param(
                "clarifications",
                format!("'{}' is not one of: defer, prompt, skip", other),
            )),
        }
    }
}

/// Which priority tiers the implement gear covers in auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationScope {
    #[default]
    None,
    P0,
    P0P1,
    All,
}

impl FromStr for ImplementationScope {
    type Err = GearError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "p0" => Ok(Self::P0),
            "p0_p1" => Ok(Self::P0P1),
            "all" => Ok(Self::All),
            other => Err(GearError::invalid_param(
                "implementation_scope",
                format!("'{}' is not one of: none, p0, p0_p1, all", other),
            )),
        }
    }
}

/// Unattended-run settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoMode {
    pub enabled: bool,
    pub clarifications: ClarificationStrategy,
    pub implementation_scope: ImplementationScope,
}

/// Status of a single gear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::InProgress => write!(f, "in-progress"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Bookkeeping for one gear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDetail {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageDetail {
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            completed_at: None,
            status: StageStatus::InProgress,
            artifacts: Vec::new(),
            metadata: Metadata::new(),
            error: None,
        }
    }
}

/// The persisted workflow record for one project directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub schema_version: u32,
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_stage: Stage,
    pub completed_stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default)]
    pub auto_mode: AutoMode,
    pub stage_details: BTreeMap<Stage, StageDetail>,
    #[serde(default)]
    pub roadmap: Vec<RoadmapItem>,
}

impl WorkflowState {
    /// The zero-value document used when no state exists yet.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            revision: 0,
            created_at: now,
            updated_at: now,
            current_stage: Stage::None,
            completed_stages: Vec::new(),
            route: None,
            auto_mode: AutoMode::default(),
            stage_details: BTreeMap::new(),
            roadmap: Vec::new(),
        }
    }

    /// The first gear not yet completed, or `None` once every gear is done.
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::GEARS.get(self.completed_stages.len()).copied()
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    pub fn is_done(&self) -> bool {
        self.current_stage == Stage::Done
    }

    /// Check the document against every schema invariant.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version == 0 || self.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(GearError::transition(format!(
                "unsupported schema version {}",
                self.schema_version
            )));
        }
        if self.updated_at < self.created_at {
            return Err(GearError::transition("updatedAt precedes createdAt"));
        }

        for (index, stage) in self.completed_stages.iter().enumerate() {
            if Stage::GEARS.get(index) != Some(stage) {
                return Err(GearError::transition(format!(
                    "completed stages must follow the gear order; found '{}' at position {}",
                    stage,
                    index + 1
                )));
            }
        }

        let expected = match self.next_stage() {
            None => Stage::Done,
            Some(next) => next,
        };
        let current_ok = match self.current_stage {
            Stage::None => self.completed_stages.is_empty(),
            stage => stage == expected,
        };
        if !current_ok {
            return Err(GearError::transition(format!(
                "current stage '{}' does not match progress (expected '{}')",
                self.current_stage, expected
            )));
        }

        for (stage, detail) in &self.stage_details {
            if !stage.is_gear() {
                return Err(GearError::transition(format!(
                    "stage details recorded for non-gear '{}'",
                    stage
                )));
            }
            let finished = matches!(detail.status, StageStatus::Completed | StageStatus::Skipped);
            if finished != self.is_complete(*stage) {
                return Err(GearError::transition(format!(
                    "stage '{}' is {} but {} in completed stages",
                    stage,
                    detail.status,
                    if finished { "missing" } else { "listed" }
                )));
            }
            if !finished && Some(*stage) != self.next_stage() {
                return Err(GearError::transition(format!(
                    "stage '{}' is {} but is not the next stage",
                    stage, detail.status
                )));
            }
            if finished && detail.completed_at.is_none() {
                return Err(GearError::transition(format!(
                    "stage '{}' is {} without a completion time",
                    stage, detail.status
                )));
            }
        }
        for stage in &self.completed_stages {
            if !self.stage_details.contains_key(stage) {
                return Err(GearError::transition(format!(
                    "completed stage '{}' has no details",
                    stage
                )));
            }
        }

        validate_roadmap(&self.roadmap)
    }

    /// Check the rules that relate a document to the one it replaces.
    pub fn validate_transition(&self, prior: &WorkflowState) -> Result<()> {
        if self.schema_version < prior.schema_version {
            return Err(GearError::transition("schema version cannot decrease"));
        }
        if self.created_at != prior.created_at {
            return Err(GearError::transition("createdAt is immutable"));
        }
        if !self.completed_stages.starts_with(&prior.completed_stages) {
            return Err(GearError::transition(
                "completed stages are append-only; use reset to start over",
            ));
        }
        let added = &self.completed_stages[prior.completed_stages.len()..];
        let finished_here = added
            .iter()
            .filter(|stage| {
                self.stage_details
                    .get(stage)
                    .is_some_and(|d| d.status != StageStatus::Skipped)
            })
            .count();
        if finished_here > 1 {
            return Err(GearError::transition(
                "only one stage can complete per update; skip stages with override",
            ));
        }
        if let Some(route) = prior.route
            && self.route != Some(route)
        {
            return Err(GearError::transition(format!(
                "route is already set to '{}' and cannot change",
                route
            )));
        }
        Ok(())
    }
}

/// Ids must be present and unique; phases start at 1.
pub(crate) fn validate_roadmap(items: &[RoadmapItem]) -> Result<()> {
    let mut seen = HashSet::new();
    for item in items {
        if item.id.trim().is_empty() {
            return Err(GearError::invalid_param("roadmap", "item id is empty"));
        }
        if !seen.insert(item.id.as_str()) {
            return Err(GearError::invalid_param(
                "roadmap",
                format!("duplicate item id '{}'", item.id),
            ));
        }
        if item.phase == 0 {
            return Err(GearError::invalid_param(
                "roadmap",
                format!("item '{}' has phase 0; phases start at 1", item.id),
            ));
        }
    }
    Ok(())
}
