use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a roadmap item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    #[default]
    Feature,
    BugFix,
    Security,
    Performance,
    TechDebt,
    Infrastructure,
    Testing,
    Documentation,
    Ux,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Feature => "feature",
            ItemKind::BugFix => "bug-fix",
            ItemKind::Security => "security",
            ItemKind::Performance => "performance",
            ItemKind::TechDebt => "tech-debt",
            ItemKind::Infrastructure => "infrastructure",
            ItemKind::Testing => "testing",
            ItemKind::Documentation => "documentation",
            ItemKind::Ux => "ux",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
    Blocked,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::NotStarted => write!(f, "not-started"),
            ItemStatus::InProgress => write!(f, "in-progress"),
            ItemStatus::Done => write!(f, "done"),
            ItemStatus::Blocked => write!(f, "blocked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateSource {
    Human,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffortEstimate {
    pub hours: f64,
    pub confidence: Confidence,
    pub source: EstimateSource,
}

/// Priority tier. Orders P0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::P0, Priority::P1, Priority::P2, Priority::P3];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::P0 => f.pad("P0"),
            Priority::P1 => f.pad("P1"),
            Priority::P2 => f.pad("P2"),
            Priority::P3 => f.pad("P3"),
        }
    }
}

/// Scoring dimension a signal contributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    Impact,
    Effort,
    Strategic,
    Risk,
}

/// One scoring rule that matched, kept for explanation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredSignal {
    pub dimension: Dimension,
    pub label: String,
    pub weight: i32,
}

/// Derived scores for one item. Always recomputable from the item and the
/// project context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemScore {
    pub impact: u8,
    pub effort: u8,
    pub roi: f64,
    pub strategic_value: u8,
    pub risk_score: u8,
    pub priority_score: f64,
    pub priority: Priority,
    pub effort_hours: u32,
    #[serde(default)]
    pub signals: Vec<FiredSignal>,
}

fn default_phase() -> u32 {
    1
}

/// A candidate unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default = "default_phase")]
    pub phase: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub strategic_tags: Vec<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort_estimate: Option<EffortEstimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ItemScore>,
}

impl RoadmapItem {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            kind: ItemKind::default(),
            phase: 1,
            dependencies: Vec::new(),
            strategic_tags: Vec::new(),
            status: ItemStatus::default(),
            effort_estimate: None,
            score: None,
        }
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(&self) -> Option<Priority> {
        self.score.as_ref().map(|s| s.priority)
    }

    pub fn priority_score(&self) -> f64 {
        self.score.as_ref().map_or(0.0, |s| s.priority_score)
    }
}

/// Read-only facts about the project, supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectContext {
    pub language: Option<String>,
    pub frameworks: Vec<String>,
    pub lines_of_code: u64,
    pub existing_features: Vec<String>,
}
