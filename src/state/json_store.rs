use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GearError, Result};
use crate::state::types::*;
use crate::state::{Mutator, StateStore, apply_update};

/// File name of the state document inside the project directory.
pub const DEFAULT_STATE_FILE: &str = ".gearflow-state.json";

/// Number of timestamped backups kept next to the document.
pub const DEFAULT_MAX_BACKUPS: usize = 3;

/// Documents above this size are rejected without being parsed.
pub const DEFAULT_MAX_STATE_BYTES: u64 = 10 * 1024 * 1024;

const BACKUP_KIND: &str = "bak";
const QUARANTINE_KIND: &str = "corrupted";
const ARCHIVE_KIND: &str = "archived";
const TEMP_KIND: &str = "tmp";

static STATE_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    let gears = Stage::GEARS.map(|s| s.as_str());
    serde_json::json!({
        "type": "object",
        "required": [
            "schemaVersion",
            "createdAt",
            "updatedAt",
            "currentStage",
            "completedStages",
            "stageDetails"
        ],
        "properties": {
            "schemaVersion": { "type": "integer", "minimum": 1 },
            "revision": { "type": "integer", "minimum": 0 },
            "createdAt": { "type": "string" },
            "updatedAt": { "type": "string" },
            "currentStage": { "enum": Stage::NAMES },
            "completedStages": {
                "type": "array",
                "items": { "enum": gears },
                "uniqueItems": true
            },
            "route": { "enum": Route::NAMES },
            "autoMode": { "type": "object" },
            "stageDetails": {
                "type": "object",
                "propertyNames": { "enum": gears },
                "additionalProperties": {
                    "type": "object",
                    "required": ["startedAt", "status"]
                }
            },
            "roadmap": {
                "type": "array",
                "items": { "type": "object", "required": ["id", "title"] }
            }
        }
    })
});

/// Tuning for a [`JsonStateStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub file_name: String,
    pub max_backups: usize,
    pub max_bytes: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_STATE_FILE.to_string(),
            max_backups: DEFAULT_MAX_BACKUPS,
            max_bytes: DEFAULT_MAX_STATE_BYTES,
        }
    }
}

/// Why a document on disk could not be used.
enum ReadFailure {
    Missing,
    TooLarge(u64),
    Invalid(String),
    Unsupported(u64),
    Io(std::io::Error),
}

/// File-based JSON state store. One document per project directory,
/// replaced atomically on every update.
pub struct JsonStateStore {
    dir: PathBuf,
    options: StoreOptions,
    lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_options(dir, StoreOptions::default())
    }

    pub fn with_options(dir: impl AsRef<Path>, options: StoreOptions) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            options,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical location of the state document.
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(&self.options.file_name)
    }

    /// Existing backups, oldest first.
    pub async fn backups(&self) -> Result<Vec<PathBuf>> {
        self.siblings(BACKUP_KIND).await
    }

    /// Documents moved aside after failing validation, oldest first.
    pub async fn quarantined(&self) -> Result<Vec<PathBuf>> {
        self.siblings(QUARANTINE_KIND).await
    }

    /// Serialize `state` to a fresh temporary file next to the document.
    /// The canonical document is not touched until [`Self::commit`].
    pub async fn write_temp(&self, state: &WorkflowState) -> Result<PathBuf> {
        let data = serde_json::to_vec_pretty(state)?;
        if data.len() as u64 > self.options.max_bytes {
            return Err(GearError::TooLarge {
                path: self.state_path(),
                size: data.len() as u64,
                limit: self.options.max_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GearError::io(&self.dir, e))?;

        let tmp_path = self.dir.join(format!(
            "{}.{}.{}",
            self.options.file_name,
            TEMP_KIND,
            Uuid::new_v4()
        ));
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| GearError::io(&tmp_path, e))?;
        let written = match file.write_all(&data).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(GearError::io(&tmp_path, e));
        }

        Ok(tmp_path)
    }

    /// Atomically move a temporary file written by [`Self::write_temp`] over
    /// the canonical document.
    pub async fn commit(&self, tmp_path: &Path) -> Result<()> {
        let path = self.state_path();
        if let Err(e) = tokio::fs::rename(tmp_path, &path).await {
            let _ = tokio::fs::remove_file(tmp_path).await;
            return Err(GearError::io(&path, e));
        }
        Ok(())
    }

    async fn load_unlocked(&self) -> Result<WorkflowState> {
        let path = self.state_path();
        match self.read_document(&path).await {
            Ok(state) => Ok(state),
            Err(ReadFailure::Missing) => Err(GearError::NotFound(path)),
            Err(ReadFailure::Io(e)) => Err(GearError::io(path, e)),
            Err(ReadFailure::Unsupported(found)) => Err(GearError::UnsupportedSchema {
                path,
                found,
                supported: CURRENT_SCHEMA_VERSION,
            }),
            Err(failure) => self.recover(failure).await,
        }
    }

    async fn read_document(&self, path: &Path) -> std::result::Result<WorkflowState, ReadFailure> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ReadFailure::Missing),
            Err(e) => return Err(ReadFailure::Io(e)),
        };
        if meta.len() > self.options.max_bytes {
            return Err(ReadFailure::TooLarge(meta.len()));
        }

        let bytes = tokio::fs::read(path).await.map_err(ReadFailure::Io)?;
        if bytes.len() as u64 > self.options.max_bytes {
            return Err(ReadFailure::TooLarge(bytes.len() as u64));
        }

        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| ReadFailure::Invalid(format!("malformed document: {}", e)))?;

        if let Some(version) = value.get("schemaVersion").and_then(|v| v.as_u64())
            && version > u64::from(CURRENT_SCHEMA_VERSION)
        {
            return Err(ReadFailure::Unsupported(version));
        }

        check_schema(&value).map_err(ReadFailure::Invalid)?;

        let state: WorkflowState = serde_json::from_value(value)
            .map_err(|e| ReadFailure::Invalid(format!("unreadable fields: {}", e)))?;
        state
            .validate()
            .map_err(|e| ReadFailure::Invalid(e.to_string()))?;

        Ok(state)
    }

    /// Replace a damaged document with the newest usable backup. The damaged
    /// document is moved aside, never deleted.
    async fn recover(&self, failure: ReadFailure) -> Result<WorkflowState> {
        let path = self.state_path();
        let reason = match &failure {
            ReadFailure::TooLarge(size) => {
                format!("{} bytes exceeds the {} byte limit", size, self.options.max_bytes)
            }
            ReadFailure::Invalid(reason) => reason.clone(),
            ReadFailure::Unsupported(found) => format!("unsupported schema version {}", found),
            ReadFailure::Io(e) => e.to_string(),
            ReadFailure::Missing => "document missing".to_string(),
        };
        warn!(path = %path.display(), reason = %reason, "State document unusable, trying backups");

        for backup in self.backups().await?.iter().rev() {
            match self.read_document(backup).await {
                Ok(state) => {
                    let tmp = self.write_temp(&state).await?;
                    let quarantined = match self.move_aside(QUARANTINE_KIND).await {
                        Ok(quarantined) => quarantined,
                        Err(e) => {
                            let _ = tokio::fs::remove_file(&tmp).await;
                            return Err(e);
                        }
                    };
                    self.commit(&tmp).await?;
                    warn!(
                        backup = %backup.display(),
                        quarantined = %quarantined.display(),
                        revision = state.revision,
                        "Restored state document from backup"
                    );
                    return Ok(state);
                }
                Err(_) => debug!(backup = %backup.display(), "Skipping unusable backup"),
            }
        }

        if let ReadFailure::TooLarge(size) = failure {
            return Err(GearError::TooLarge {
                path,
                size,
                limit: self.options.max_bytes,
            });
        }

        let quarantined = self.move_aside(QUARANTINE_KIND).await?;
        warn!(quarantined = %quarantined.display(), "No usable backup; state document quarantined");
        Err(GearError::Corrupted {
            path,
            reason,
            quarantined,
        })
    }

    /// Copy the current document to a new backup. Returns `None` when there
    /// is no document to copy.
    async fn backup(&self) -> Result<Option<PathBuf>> {
        let path = self.state_path();
        let target = self.unique_sibling(BACKUP_KIND).await?;
        match tokio::fs::copy(&path, &target).await {
            Ok(_) => Ok(Some(target)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                let _ = tokio::fs::remove_file(&target).await;
                Err(GearError::io(&target, e))
            }
        }
    }

    /// Drop the oldest backups beyond `max_backups`.
    async fn prune_backups(&self) -> Result<()> {
        let backups = self.backups().await?;
        let excess = backups.len().saturating_sub(self.options.max_backups);
        for old in &backups[..excess] {
            tokio::fs::remove_file(old)
                .await
                .map_err(|e| GearError::io(old, e))?;
            debug!(backup = %old.display(), "Pruned old backup");
        }
        Ok(())
    }

    async fn move_aside(&self, kind: &str) -> Result<PathBuf> {
        let target = self.unique_sibling(kind).await?;
        tokio::fs::rename(self.state_path(), &target)
            .await
            .map_err(|e| GearError::io(&target, e))?;
        Ok(target)
    }

    /// `<file>.<kind>.<timestamp>`, made unique if the timestamp collides.
    async fn unique_sibling(&self, kind: &str) -> Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let base = format!("{}.{}.{}", self.options.file_name, kind, stamp);
        let mut candidate = self.dir.join(&base);
        let mut n = 1;
        while tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| GearError::io(&candidate, e))?
        {
            candidate = self.dir.join(format!("{}-{}", base, n));
            n += 1;
        }
        Ok(candidate)
    }

    async fn siblings(&self, kind: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}.{}.", self.options.file_name, kind);
        let mut found = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(GearError::io(&self.dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GearError::io(&self.dir, e))?
        {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                found.push(entry.path());
            }
        }

        // Timestamps sort lexically.
        found.sort();
        Ok(found)
    }

    async fn update_inner(&self, expected: Option<u64>, mutator: Mutator) -> Result<WorkflowState> {
        let _lock = self.lock.lock().await;

        let prior = match self.load_unlocked().await {
            Ok(state) => Some(state),
            Err(GearError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let next = apply_update(prior.as_ref(), expected, mutator)?;

        // Nothing on disk changes until the new document is fully written.
        let tmp = self.write_temp(&next).await?;
        let backup = if prior.is_some() {
            match self.backup().await {
                Ok(backup) => backup,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(e);
                }
            }
        } else {
            None
        };
        if let Err(e) = self.commit(&tmp).await {
            if let Some(backup) = backup {
                let _ = tokio::fs::remove_file(backup).await;
            }
            return Err(e);
        }
        if let Err(e) = self.prune_backups().await {
            warn!(error = %e, "Failed to prune old backups");
        }

        info!(
            path = %self.state_path().display(),
            revision = next.revision,
            stage = %next.current_stage,
            "State document updated"
        );
        Ok(next)
    }
}

fn check_schema(value: &serde_json::Value) -> std::result::Result<(), String> {
    let validator = jsonschema::validator_for(&STATE_SCHEMA)
        .map_err(|e| format!("invalid state schema: {}", e))?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("schema violation: {}", errors.join("; ")))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<WorkflowState> {
        let _lock = self.lock.lock().await;
        self.load_unlocked().await
    }

    async fn update(&self, mutator: Mutator) -> Result<WorkflowState> {
        self.update_inner(None, mutator).await
    }

    async fn update_if_revision(&self, expected: u64, mutator: Mutator) -> Result<WorkflowState> {
        self.update_inner(Some(expected), mutator).await
    }

    async fn reset(&self) -> Result<Option<PathBuf>> {
        let _lock = self.lock.lock().await;
        let path = self.state_path();
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| GearError::io(&path, e))?
        {
            return Ok(None);
        }
        let archived = self.move_aside(ARCHIVE_KIND).await?;
        info!(archived = %archived.display(), "State document archived");
        Ok(Some(archived))
    }
}
