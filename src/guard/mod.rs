//! Input validation that runs before anything touches disk.
//!
//! Guards against:
//! - Path traversal (`..` components, percent-encoded and double-encoded variants)
//! - Directories that resolve (through symlinks) outside the allowed root
//! - Unknown enumerated values
//! - Oversized free-text batches and input files

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::{GearError, Result};

/// Maximum number of answers in one clarification batch.
pub const MAX_CLARIFICATIONS: usize = 100;

/// Maximum length, in characters, of a single clarification answer.
pub const MAX_CLARIFICATION_LEN: usize = 5000;

/// How many rounds of percent-decoding are applied when looking for
/// encoded traversal sequences.
const DECODE_ROUNDS: usize = 3;

/// Validates directory arguments against an allowed root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    allowed_root: PathBuf,
}

impl PathGuard {
    /// Create a guard rooted at `root`. The root must exist; it is stored in
    /// canonical form.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let allowed_root = std::fs::canonicalize(root).map_err(|e| GearError::InvalidPath {
            path: root.display().to_string(),
            reason: format!("allowed root cannot be resolved: {}", e),
        })?;
        if !allowed_root.is_dir() {
            return Err(GearError::InvalidPath {
                path: root.display().to_string(),
                reason: "allowed root is not a directory".to_string(),
            });
        }
        Ok(Self { allowed_root })
    }

    /// Create a guard rooted at the process working directory.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| GearError::io(".", e))?;
        Self::new(cwd)
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    /// Resolve `candidate` to an absolute, symlink-free directory inside the
    /// allowed root.
    ///
    /// Relative candidates are resolved against the allowed root. The raw
    /// input is rejected before resolution if it contains a traversal
    /// sequence in any encoding.
    pub fn validate_directory(&self, candidate: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| GearError::InvalidPath {
            path: candidate.to_string(),
            reason: reason.to_string(),
        };

        if candidate.trim().is_empty() {
            return Err(invalid("path is empty"));
        }
        if candidate.contains('\0') {
            return Err(invalid("path contains a NUL byte"));
        }
        if contains_traversal(candidate) {
            return Err(invalid("path contains a traversal sequence"));
        }

        let raw = Path::new(candidate);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.allowed_root.join(raw)
        };

        let resolved = std::fs::canonicalize(&joined)
            .map_err(|e| invalid(&format!("cannot be resolved: {}", e)))?;

        if !resolved.starts_with(&self.allowed_root) {
            return Err(invalid(&format!(
                "resolves outside the allowed root {}",
                self.allowed_root.display()
            )));
        }
        if !resolved.is_dir() {
            return Err(invalid("not a directory"));
        }

        Ok(resolved)
    }
}

/// Accept `value` only if it is one of `allowed`.
pub fn validate_enum<'a>(value: &'a str, allowed: &[&str], param: &str) -> Result<&'a str> {
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(GearError::invalid_param(
            param,
            format!("'{}' is not one of: {}", value, allowed.join(", ")),
        ))
    }
}

/// Accept `value` only if it is at most `max_len` characters long.
pub fn validate_bounded_text<'a>(value: &'a str, max_len: usize, param: &str) -> Result<&'a str> {
    let len = value.chars().count();
    if len > max_len {
        return Err(GearError::invalid_param(
            param,
            format!("{} characters exceeds the limit of {}", len, max_len),
        ));
    }
    Ok(value)
}

/// Accept a batch of at most `max_count` entries, each at most
/// `per_item_max_len` characters long.
pub fn validate_bounded_list<'a, S: AsRef<str>>(
    values: &'a [S],
    max_count: usize,
    per_item_max_len: usize,
    param: &str,
) -> Result<&'a [S]> {
    if values.len() > max_count {
        return Err(GearError::invalid_param(
            param,
            format!("{} entries exceeds the limit of {}", values.len(), max_count),
        ));
    }
    for (index, value) in values.iter().enumerate() {
        validate_bounded_text(value.as_ref(), per_item_max_len, &format!("{}[{}]", param, index))?;
    }
    Ok(values)
}

/// Validate a batch of clarification answers.
pub fn validate_clarifications<S: AsRef<str>>(answers: &[S]) -> Result<&[S]> {
    validate_bounded_list(
        answers,
        MAX_CLARIFICATIONS,
        MAX_CLARIFICATION_LEN,
        "clarifications",
    )
}

/// Read a UTF-8 input file, refusing it if it is larger than `max_bytes`.
/// The size is checked before any content is read.
pub fn read_bounded_file(path: &Path, max_bytes: u64, param: &str) -> Result<String> {
    let size = std::fs::metadata(path)
        .map_err(|e| GearError::io(path, e))?
        .len();
    let too_large = |size: u64| {
        GearError::invalid_param(
            param,
            format!(
                "{} is {} bytes, over the {} byte limit",
                path.display(),
                size,
                max_bytes
            ),
        )
    };
    if size > max_bytes {
        return Err(too_large(size));
    }

    // The file may grow between the size check and the read.
    let file = std::fs::File::open(path).map_err(|e| GearError::io(path, e))?;
    let mut data = String::new();
    file.take(max_bytes + 1)
        .read_to_string(&mut data)
        .map_err(|e| GearError::io(path, e))?;
    if data.len() as u64 > max_bytes {
        return Err(too_large(data.len() as u64));
    }
    Ok(data)
}

/// True if `raw`, or any percent-decoded form of it, has a `..` component.
/// Undecodable input (e.g. overlong UTF-8 such as `%c0%ae`) counts as a
/// traversal attempt.
fn contains_traversal(raw: &str) -> bool {
    let mut current = raw.to_string();
    for _ in 0..=DECODE_ROUNDS {
        if has_parent_component(&current) {
            return true;
        }
        if !current.contains('%') {
            return false;
        }
        match urlencoding::decode(&current) {
            Ok(decoded) if decoded == current => return false,
            Ok(decoded) => current = decoded.into_owned(),
            Err(_) => return true,
        }
    }
    // Still encoded after every round.
    true
}

fn has_parent_component(path: &str) -> bool {
    if path.split(['/', '\\']).any(|segment| segment.trim() == "..") {
        return true;
    }
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}
