use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::roadmap::graph::{self, adjacency};
use crate::roadmap::scorer::Scorer;
use crate::roadmap::types::*;

/// Everything a caller needs to act on a roadmap.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Scored items, highest priority score first.
    pub ranked: Vec<RoadmapItem>,
    /// Dependency-respecting order covering every item once.
    pub order: Vec<RoadmapItem>,
    /// Ids of unfinished items whose dependencies are all done, in `order`.
    pub ready: Vec<String>,
    /// Item ids per tier, empty tiers omitted.
    pub groups: BTreeMap<Priority, Vec<String>>,
    /// Dependency cycles found. When non-empty, `order` is best effort.
    pub cycles: Vec<Vec<String>>,
}

/// Scores and orders roadmap items for one project.
#[derive(Debug, Clone, Default)]
pub struct Prioritizer {
    scorer: Scorer,
    context: ProjectContext,
}

impl Prioritizer {
    pub fn new(scorer: Scorer, context: ProjectContext) -> Self {
        Self { scorer, context }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    /// Copies of `items`, scoring any that arrive without a score.
    pub fn score_all(&self, items: &[RoadmapItem]) -> Vec<RoadmapItem> {
        items
            .iter()
            .map(|item| match item.score {
                Some(_) => item.clone(),
                None => self.scorer.score_item(item, &self.context),
            })
            .collect()
    }

    /// Items sorted by priority score, highest first. Ties fall back to tier,
    /// then id.
    pub fn prioritize(&self, items: &[RoadmapItem]) -> Vec<RoadmapItem> {
        let mut scored = self.score_all(items);
        scored.sort_by(|a, b| {
            b.priority_score()
                .total_cmp(&a.priority_score())
                .then_with(|| a.priority().cmp(&b.priority()))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored
    }

    /// Items bucketed by tier, each bucket in `prioritize` order.
    pub fn group_by_priority(&self, items: &[RoadmapItem]) -> BTreeMap<Priority, Vec<RoadmapItem>> {
        let mut groups: BTreeMap<Priority, Vec<RoadmapItem>> = BTreeMap::new();
        for item in self.prioritize(items) {
            let tier = item.priority().unwrap_or(Priority::P3);
            groups.entry(tier).or_default().push(item);
        }
        groups
    }

    /// Topological order (Kahn's algorithm). Among items that are free to go,
    /// the higher tier goes first, then the smaller id.
    ///
    /// With cycles present the order is best effort: when no item is free,
    /// the remaining item with the fewest unmet dependencies (then tier, then
    /// id) is emitted anyway. Every item still appears exactly once.
    pub fn resolve_dependencies(&self, items: &[RoadmapItem]) -> Vec<RoadmapItem> {
        let scored = self.score_all(items);
        let n = scored.len();
        let deps = adjacency(&scored);

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut unmet = vec![0usize; n];
        for (i, item_deps) in deps.iter().enumerate() {
            for &dep in item_deps {
                dependents[dep].push(i);
                unmet[i] += 1;
            }
        }

        let key = |i: usize| {
            (
                scored[i].priority().unwrap_or(Priority::P3),
                scored[i].id.clone(),
                i,
            )
        };

        let mut free: BTreeSet<(Priority, String, usize)> =
            (0..n).filter(|&i| unmet[i] == 0).map(key).collect();
        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            let next = match free.pop_first() {
                Some((_, _, i)) => i,
                None => {
                    let Some(i) = (0..n)
                        .filter(|&i| !emitted[i])
                        .min_by_key(|&i| (unmet[i], key(i)))
                    else {
                        break;
                    };
                    warn!(item = %scored[i].id, unmet = unmet[i], "Dependency cycle; forcing item into order");
                    i
                }
            };

            emitted[next] = true;
            order.push(next);
            for &d in &dependents[next] {
                unmet[d] = unmet[d].saturating_sub(1);
                if unmet[d] == 0 && !emitted[d] {
                    free.insert(key(d));
                }
            }
        }

        order.into_iter().map(|i| scored[i].clone()).collect()
    }

    /// Score, rank, order and find the frontier in one pass.
    pub fn plan(&self, items: &[RoadmapItem]) -> ExecutionPlan {
        let cycles = graph::detect_cycles(items);
        let order = self.resolve_dependencies(items);
        let ranked = self.prioritize(items);

        let done: HashSet<String> = items
            .iter()
            .filter(|i| i.status == ItemStatus::Done)
            .map(|i| i.id.clone())
            .collect();
        let ready = graph::find_ready_items(&order, &done)
            .into_iter()
            .filter(|i| i.status != ItemStatus::Done)
            .map(|i| i.id.clone())
            .collect();

        let groups = self
            .group_by_priority(items)
            .into_iter()
            .map(|(tier, members)| (tier, members.into_iter().map(|i| i.id).collect()))
            .collect();

        debug!(
            items = items.len(),
            cycles = cycles.len(),
            "Roadmap plan computed"
        );

        ExecutionPlan {
            ranked,
            order,
            ready,
            groups,
            cycles,
        }
    }
}
