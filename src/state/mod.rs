pub mod json_store;
pub mod memory_store;
pub mod transitions;
pub mod types;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{GearError, Result};
use crate::state::types::WorkflowState;

/// A state mutation applied inside `StateStore::update`.
pub type Mutator = Box<dyn FnOnce(WorkflowState) -> Result<WorkflowState> + Send>;

/// Trait for workflow state persistence.
///
/// Implementations own the single state document. A loaded `WorkflowState`
/// is a snapshot; the only way to change the document is `update`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the current document. Returns `NotFound` if none exists yet.
    async fn load(&self) -> Result<WorkflowState>;

    /// Read (or create), mutate, validate and commit the document.
    async fn update(&self, mutator: Mutator) -> Result<WorkflowState>;

    /// Like `update`, but fails with `RevisionConflict` unless the stored
    /// revision equals `expected`. A missing document has revision 0.
    async fn update_if_revision(&self, expected: u64, mutator: Mutator) -> Result<WorkflowState>;

    /// Archive the current document so the next update starts fresh.
    /// Returns where the prior document went, if there was one.
    async fn reset(&self) -> Result<Option<PathBuf>>;
}

/// Load the document, falling back to the zero-value document if absent.
pub async fn load_or_new(store: &dyn StateStore) -> Result<WorkflowState> {
    match store.load().await {
        Ok(state) => Ok(state),
        Err(GearError::NotFound(_)) => Ok(WorkflowState::new(Utc::now())),
        Err(e) => Err(e),
    }
}

/// The update cycle shared by every store: build on `prior` (or a fresh
/// document), run the mutator, stamp bookkeeping fields and validate.
pub(crate) fn apply_update(
    prior: Option<&WorkflowState>,
    expected_revision: Option<u64>,
    mutator: Mutator,
) -> Result<WorkflowState> {
    let now = Utc::now();
    let base = prior.cloned().unwrap_or_else(|| WorkflowState::new(now));
    let base_revision = base.revision;

    if let Some(expected) = expected_revision
        && expected != base_revision
    {
        return Err(GearError::RevisionConflict {
            expected,
            actual: base_revision,
        });
    }

    let mut next = mutator(base.clone())?;
    next.revision = base_revision + 1;
    next.updated_at = now.max(next.created_at);

    next.validate()?;
    next.validate_transition(&base)?;
    Ok(next)
}
