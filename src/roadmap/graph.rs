//! Dependency graph over roadmap items.
//!
//! Edges run from an item to the items it depends on. Dependency ids that do
//! not name an item in the set are left out of the graph; for readiness they
//! count as permanently unsatisfied.

use std::collections::{HashMap, HashSet};

use crate::error::{GearError, Result};
use crate::roadmap::types::RoadmapItem;

/// Map each id to the position of its first occurrence.
fn index_by_id(items: &[RoadmapItem]) -> HashMap<&str, usize> {
    let mut index = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        index.entry(item.id.as_str()).or_insert(i);
    }
    index
}

/// Per item, the positions of its existing dependencies, deduplicated and in
/// declaration order.
pub(crate) fn adjacency(items: &[RoadmapItem]) -> Vec<Vec<usize>> {
    let index = index_by_id(items);
    items
        .iter()
        .map(|item| {
            let mut deps: Vec<usize> = Vec::new();
            for dep in &item.dependencies {
                if let Some(&target) = index.get(dep.as_str())
                    && !deps.contains(&target)
                {
                    deps.push(target);
                }
            }
            deps
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Finished,
}

/// Find dependency cycles. Each cycle is the ordered list of ids along it,
/// starting from the node the back-edge returns to; a self-dependency is a
/// one-element cycle. Traversal uses an explicit stack, so arbitrarily deep
/// graphs cannot overflow the call stack.
pub fn detect_cycles(items: &[RoadmapItem]) -> Vec<Vec<String>> {
    let adjacency = adjacency(items);
    let mut marks = vec![Mark::Unvisited; items.len()];
    let mut cycles = Vec::new();

    for start in 0..items.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        // (node, next edge to follow)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        marks[start] = Mark::OnStack;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&next) = adjacency[node].get(frame.1) else {
                marks[node] = Mark::Finished;
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[next] {
                Mark::Unvisited => {
                    marks[next] = Mark::OnStack;
                    stack.push((next, 0));
                }
                Mark::OnStack => {
                    let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                    cycles.push(
                        stack[from..]
                            .iter()
                            .map(|(n, _)| items[*n].id.clone())
                            .collect(),
                    );
                }
                Mark::Finished => {}
            }
        }
    }

    cycles
}

/// Fail with `CycleDetected` if the items contain any cycle.
pub fn ensure_acyclic(items: &[RoadmapItem]) -> Result<()> {
    let cycles = detect_cycles(items);
    if cycles.is_empty() {
        Ok(())
    } else {
        Err(GearError::CycleDetected(cycles))
    }
}

/// Items whose every dependency is a known item listed in `completed_ids`.
/// Items with no dependencies are always ready; a dependency on an unknown
/// id is never satisfied.
pub fn find_ready_items<'a>(
    items: &'a [RoadmapItem],
    completed_ids: &HashSet<String>,
) -> Vec<&'a RoadmapItem> {
    let known: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
    items
        .iter()
        .filter(|item| {
            item.dependencies
                .iter()
                .all(|dep| known.contains(dep.as_str()) && completed_ids.contains(dep))
        })
        .collect()
}
