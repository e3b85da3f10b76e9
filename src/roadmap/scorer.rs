//! Deterministic multi-dimensional scoring of roadmap items.
//!
//! Every adjustment comes from an explicit `(pattern, weight)` table so the
//! result can be audited signal by signal. Patterns are matched against the
//! lowercased title and description split into alphanumeric tokens; a
//! pattern made of several tokens must match a contiguous run, and a trailing
//! `*` on a pattern token matches any token with that prefix.

use serde::{Deserialize, Serialize};

use crate::error::{GearError, Result};
use crate::roadmap::types::*;

/// A keyword rule and the points it contributes.
#[derive(Debug, Clone, Copy)]
pub struct Signal {
    pub pattern: &'static str,
    pub weight: i32,
}

const fn sig(pattern: &'static str, weight: i32) -> Signal {
    Signal { pattern, weight }
}

const IMPACT_BASE: i32 = 5;
const EFFORT_BASE: i32 = 5;
const STRATEGIC_BASE: i32 = 5;
const RISK_BASE: i32 = 3;

/// Security and data-loss signals raise impact, together by at most +3.
pub const SECURITY_IMPACT: &[Signal] = &[
    sig("security", 2),
    sig("vulnerab*", 3),
    sig("exploit*", 3),
    sig("breach*", 3),
    sig("data loss", 3),
    sig("corrupt*", 2),
    sig("injection", 2),
    sig("xss", 2),
    sig("privacy", 1),
    sig("backup*", 1),
];
const SECURITY_IMPACT_CAP: i32 = 3;

/// Direct user-value signals, together by at most +2.
pub const USER_VALUE_IMPACT: &[Signal] = &[
    sig("ai", 1),
    sig("automat*", 1),
    sig("recommendation*", 1),
    sig("personaliz*", 1),
    sig("onboarding", 1),
    sig("search", 1),
    sig("dashboard", 1),
];
const USER_VALUE_CAP: i32 = 2;

const ALIGNMENT_IMPACT_CAP: i32 = 2;

/// Each complexity keyword adds +1..+3; the combination is capped at +4.
pub const COMPLEXITY_EFFORT: &[Signal] = &[
    sig("ai", 2),
    sig("machine learning", 3),
    sig("ml", 2),
    sig("real-time", 2),
    sig("realtime", 2),
    sig("streaming", 2),
    sig("distributed", 3),
    sig("rewrite", 3),
    sig("migrat*", 2),
    sig("multi-tenant", 2),
    sig("encrypt*", 2),
    sig("architecture", 2),
    sig("refactor*", 1),
    sig("integrat*", 1),
];
const COMPLEXITY_CAP: i32 = 4;

/// Each simplicity keyword takes off 1..2; the combination is floored at -3.
pub const SIMPLICITY_EFFORT: &[Signal] = &[
    sig("typo", -2),
    sig("readme", -2),
    sig("rename", -1),
    sig("simple", -1),
    sig("minor", -1),
    sig("tweak", -1),
    sig("small", -1),
    sig("docs", -1),
];
const SIMPLICITY_FLOOR: i32 = -3;

const FAMILIARITY_DISCOUNT: i32 = -1;
const LARGE_CODEBASE_LOC: u64 = 100_000;
const LARGE_CODEBASE_PENALTY: i32 = 1;

/// Trend keywords raise strategic value (uncapped; the result is clamped).
pub const TREND_STRATEGIC: &[Signal] = &[
    sig("ai", 2),
    sig("machine learning", 2),
    sig("llm", 2),
    sig("automat*", 1),
    sig("real-time", 1),
    sig("realtime", 1),
    sig("streaming", 1),
    sig("cloud", 1),
    sig("mobile", 1),
    sig("api", 1),
    sig("observability", 1),
];
const TAG_STRATEGIC_CAP: i32 = 3;
const OVERLAP_PENALTY: i32 = -1;

/// Breaking-change, security-change, schema, auth and payment signals.
pub const RISK_SIGNALS: &[Signal] = &[
    sig("breaking", 3),
    sig("deprecat*", 1),
    sig("security", 2),
    sig("encrypt*", 2),
    sig("permission*", 1),
    sig("schema", 2),
    sig("migrat*", 2),
    sig("database", 1),
    sig("auth", 3),
    sig("authentication", 3),
    sig("authorization", 3),
    sig("oauth", 3),
    sig("login", 2),
    sig("payment*", 3),
    sig("billing", 3),
    sig("checkout", 2),
];

/// Category contribution to impact.
pub fn category_impact(kind: ItemKind) -> i32 {
    match kind {
        ItemKind::Security => 3,
        ItemKind::BugFix | ItemKind::Feature | ItemKind::Performance | ItemKind::Ux => 2,
        ItemKind::Infrastructure
        | ItemKind::TechDebt
        | ItemKind::Testing
        | ItemKind::Documentation => 1,
    }
}

/// Hours implied by an effort score.
pub fn effort_hours(effort: u8) -> u32 {
    match effort {
        1 => 4,
        2 => 8,
        3 => 12,
        4 => 16,
        5 => 24,
        6 => 32,
        7 => 40,
        8 => 60,
        9 => 80,
        10 => 120,
        _ => 24,
    }
}

/// Tier from impact and composite score. Rules are checked in order and the
/// first match wins.
pub fn tier(impact: u8, priority_score: f64) -> Priority {
    if impact >= 8 && priority_score >= 7.0 {
        Priority::P0
    } else if impact >= 7 || priority_score >= 6.0 {
        Priority::P1
    } else if impact >= 5 || priority_score >= 4.0 {
        Priority::P2
    } else {
        Priority::P3
    }
}

/// Weights of the composite priority score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub impact: f64,
    pub effort: f64,
    pub strategic: f64,
    pub risk: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            impact: 0.4,
            effort: 0.3,
            strategic: 0.2,
            risk: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        let parts = [self.impact, self.effort, self.strategic, self.risk];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(GearError::Configuration(format!(
                "scoring weights must be finite and non-negative: {:?}",
                self
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(GearError::Configuration(format!(
                "scoring weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Lowercased alphanumeric tokens of a piece of text.
struct Tokens(Vec<String>);

impl Tokens {
    fn of(text: &str) -> Self {
        Self(
            text.to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    fn contains(&self, pattern: &str) -> bool {
        let wanted: Vec<&str> = pattern
            .split(|c: char| !(c.is_alphanumeric() || c == '*'))
            .filter(|t| !t.is_empty())
            .collect();
        if wanted.is_empty() || wanted.len() > self.0.len() {
            return false;
        }
        self.0.windows(wanted.len()).any(|window| {
            window.iter().zip(&wanted).all(|(token, want)| match want.strip_suffix('*') {
                Some(prefix) => token.starts_with(prefix),
                None => token == want,
            })
        })
    }
}

/// Pure scorer. Holds only its weights, so it can be shared freely.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom weights. Fails with `Configuration` unless they sum to 1.0.
    pub fn with_weights(weights: ScoringWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score one item against the project context.
    pub fn score(&self, item: &RoadmapItem, ctx: &ProjectContext) -> ItemScore {
        let tokens = Tokens::of(&format!("{} {}", item.title, item.description));
        let mut fired = Vec::new();

        // Impact
        let mut impact = IMPACT_BASE;
        impact += apply(SECURITY_IMPACT, &tokens, Dimension::Impact, &mut fired)
            .min(SECURITY_IMPACT_CAP);
        let category = category_impact(item.kind);
        fired.push(FiredSignal {
            dimension: Dimension::Impact,
            label: format!("category:{}", item.kind),
            weight: category,
        });
        impact += category;
        let alignment = (item.strategic_tags.len() as i32).min(ALIGNMENT_IMPACT_CAP);
        if alignment > 0 {
            fired.push(FiredSignal {
                dimension: Dimension::Impact,
                label: "strategic-alignment".to_string(),
                weight: alignment,
            });
            impact += alignment;
        }
        impact += apply(USER_VALUE_IMPACT, &tokens, Dimension::Impact, &mut fired).min(USER_VALUE_CAP);
        let impact = clamp_score(impact);

        // Effort
        let mut effort = EFFORT_BASE;
        effort += apply(COMPLEXITY_EFFORT, &tokens, Dimension::Effort, &mut fired).min(COMPLEXITY_CAP);
        effort += apply(SIMPLICITY_EFFORT, &tokens, Dimension::Effort, &mut fired).max(SIMPLICITY_FLOOR);
        if let Some(stack) = familiar_stack(ctx, &tokens) {
            fired.push(FiredSignal {
                dimension: Dimension::Effort,
                label: format!("familiar:{}", stack),
                weight: FAMILIARITY_DISCOUNT,
            });
            effort += FAMILIARITY_DISCOUNT;
        }
        if ctx.lines_of_code > LARGE_CODEBASE_LOC {
            fired.push(FiredSignal {
                dimension: Dimension::Effort,
                label: "large-codebase".to_string(),
                weight: LARGE_CODEBASE_PENALTY,
            });
            effort += LARGE_CODEBASE_PENALTY;
        }
        let effort = clamp_score(effort);

        // Strategic value
        let mut strategic = STRATEGIC_BASE;
        let tags = (item.strategic_tags.len() as i32).min(TAG_STRATEGIC_CAP);
        if tags > 0 {
            fired.push(FiredSignal {
                dimension: Dimension::Strategic,
                label: "strategic-tags".to_string(),
                weight: tags,
            });
            strategic += tags;
        }
        strategic += apply(TREND_STRATEGIC, &tokens, Dimension::Strategic, &mut fired);
        if duplicates_existing(item, ctx) {
            fired.push(FiredSignal {
                dimension: Dimension::Strategic,
                label: "overlaps-existing-feature".to_string(),
                weight: OVERLAP_PENALTY,
            });
            strategic += OVERLAP_PENALTY;
        }
        let strategic_value = clamp_score(strategic);

        // Risk
        let risk_score = clamp_score(RISK_BASE + apply(RISK_SIGNALS, &tokens, Dimension::Risk, &mut fired));

        let roi = if effort == 0 {
            f64::from(impact) * 10.0
        } else {
            f64::from(impact) / f64::from(effort)
        };

        let w = &self.weights;
        let priority_score = round2(
            f64::from(impact) * w.impact
                + f64::from(10 - effort) * w.effort
                + f64::from(strategic_value) * w.strategic
                + f64::from(10 - risk_score) * w.risk,
        );

        ItemScore {
            impact,
            effort,
            roi: round2(roi),
            strategic_value,
            risk_score,
            priority_score,
            priority: tier(impact, priority_score),
            effort_hours: effort_hours(effort),
            signals: fired,
        }
    }

    /// Return a copy of `item` with its score filled in. A missing effort
    /// estimate is replaced by an AI estimate; a human estimate is kept.
    pub fn score_item(&self, item: &RoadmapItem, ctx: &ProjectContext) -> RoadmapItem {
        let score = self.score(item, ctx);
        let mut scored = item.clone();
        if scored.effort_estimate.is_none() {
            let any_effort_signal = score.signals.iter().any(|s| s.dimension == Dimension::Effort);
            scored.effort_estimate = Some(EffortEstimate {
                hours: f64::from(score.effort_hours),
                confidence: if any_effort_signal {
                    Confidence::Medium
                } else {
                    Confidence::Low
                },
                source: EstimateSource::Ai,
            });
        }
        scored.score = Some(score);
        scored
    }
}

/// Sum the weights of every matching signal, recording each one.
fn apply(table: &[Signal], tokens: &Tokens, dimension: Dimension, fired: &mut Vec<FiredSignal>) -> i32 {
    let mut total = 0;
    for signal in table {
        if tokens.contains(signal.pattern) {
            fired.push(FiredSignal {
                dimension,
                label: signal.pattern.to_string(),
                weight: signal.weight,
            });
            total += signal.weight;
        }
    }
    total
}

/// The declared language or framework mentioned by the item, if any.
fn familiar_stack<'a>(ctx: &'a ProjectContext, tokens: &Tokens) -> Option<&'a str> {
    ctx.language
        .iter()
        .chain(ctx.frameworks.iter())
        .map(String::as_str)
        .find(|name| !name.trim().is_empty() && tokens.contains(name))
}

fn duplicates_existing(item: &RoadmapItem, ctx: &ProjectContext) -> bool {
    let title = item.title.trim().to_lowercase();
    ctx.existing_features
        .iter()
        .any(|f| f.trim().to_lowercase() == title)
}

fn clamp_score(value: i32) -> u8 {
    value.clamp(1, 10) as u8
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
