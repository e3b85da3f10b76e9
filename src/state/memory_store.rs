use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{GearError, Result};
use crate::state::types::WorkflowState;
use crate::state::{Mutator, StateStore, apply_update};

/// In-memory state store. Holds the document only for the lifetime of the
/// store instance; validation rules match [`super::json_store::JsonStateStore`].
pub struct MemoryStateStore {
    current: Mutex<Option<WorkflowState>>,
    archived: Mutex<Vec<WorkflowState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            archived: Mutex::new(Vec::new()),
        }
    }

    /// Start from an existing document.
    pub fn with_state(state: WorkflowState) -> Result<Self> {
        state.validate()?;
        Ok(Self {
            current: Mutex::new(Some(state)),
            archived: Mutex::new(Vec::new()),
        })
    }

    /// Documents set aside by `reset`, oldest first.
    pub async fn archived(&self) -> Vec<WorkflowState> {
        self.archived.lock().await.clone()
    }

    async fn update_inner(&self, expected: Option<u64>, mutator: Mutator) -> Result<WorkflowState> {
        let mut current = self.current.lock().await;
        let next = apply_update(current.as_ref(), expected, mutator)?;
        *current = Some(next.clone());
        Ok(next)
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<WorkflowState> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or_else(|| GearError::NotFound(PathBuf::from("<memory>")))
    }

    async fn update(&self, mutator: Mutator) -> Result<WorkflowState> {
        self.update_inner(None, mutator).await
    }

    async fn update_if_revision(&self, expected: u64, mutator: Mutator) -> Result<WorkflowState> {
        self.update_inner(Some(expected), mutator).await
    }

    async fn reset(&self) -> Result<Option<PathBuf>> {
        if let Some(prior) = self.current.lock().await.take() {
            self.archived.lock().await.push(prior);
        }
        Ok(None)
    }
}
