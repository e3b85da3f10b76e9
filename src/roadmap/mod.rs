pub mod graph;
pub mod prioritizer;
pub mod scorer;
pub mod types;

pub use graph::{detect_cycles, ensure_acyclic, find_ready_items};
pub use prioritizer::{ExecutionPlan, Prioritizer};
pub use scorer::{Scorer, ScoringWeights};
