//! Secure resolution of the policy file path.
//!
//! The policy path is the only untrusted, filesystem-touching argument this
//! CLI accepts, so it gets the same traversal/injection checks the path
//! deserves: reject dangerous shell metacharacters before ever touching the
//! filesystem, then canonicalize and refuse system directories.

use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_PATH_LENGTH: usize = 4096;

const DANGEROUS_PATTERNS: &[&str] = &["`", ";", "&", "|", ">", "<", "\n", "\r", "\0"];

const PROTECTED_DIRS: &[&str] = &["/etc", "/bin", "/sbin", "/boot", "/sys", "/proc", "/dev"];

#[derive(Debug, Error)]
pub enum PathValidationError {
    #[error("path exceeds maximum length (max {MAX_PATH_LENGTH})")]
    TooLong,

    #[error("dangerous pattern '{pattern}' in path: {path}")]
    DangerousPattern { pattern: String, path: String },

    #[error("path does not exist: {0}")]
    NotFound(String),

    #[error("access to protected system directory denied: {0}")]
    ProtectedDirectory(String),

    #[error("invalid path: {0}")]
    Invalid(String),

    #[error("no policy path given (pass --policy or set PHX_POLICY_FILE)")]
    Missing,
}

/// Resolves the policy path from an explicit CLI value, falling back to
/// `PHX_POLICY_FILE`, then validates and canonicalizes it.
pub fn resolve_policy_path(explicit: Option<&Path>) -> Result<PathBuf, PathValidationError> {
    let raw = explicit
        .map(|p| p.to_path_buf())
        .or_else(|| std::env::var("PHX_POLICY_FILE").ok().map(PathBuf::from))
        .ok_or(PathValidationError::Missing)?;

    validate_path(&raw)
}

fn validate_path(path: &Path) -> Result<PathBuf, PathValidationError> {
    let raw = path.to_string_lossy();

    if raw.len() > MAX_PATH_LENGTH {
        return Err(PathValidationError::TooLong);
    }

    for pattern in DANGEROUS_PATTERNS {
        if raw.contains(pattern) {
            return Err(PathValidationError::DangerousPattern {
                pattern: pattern.to_string(),
                path: raw.to_string(),
            });
        }
    }

    let canonical = path.canonicalize().map_err(|err| {
        if !path.exists() {
            PathValidationError::NotFound(raw.to_string())
        } else {
            PathValidationError::Invalid(format!("{raw}: {err}"))
        }
    })?;

    for protected in PROTECTED_DIRS {
        if canonical.starts_with(protected) {
            return Err(PathValidationError::ProtectedDirectory(canonical.display().to_string()));
        }
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dangerous_patterns_before_touching_filesystem() {
        let result = resolve_policy_path(Some(Path::new("policy.yaml; rm -rf /")));
        assert!(matches!(result, Err(PathValidationError::DangerousPattern { .. })));
    }

    #[test]
    fn rejects_protected_directories() {
        let result = validate_path(Path::new("/etc/passwd"));
        assert!(matches!(
            result,
            Err(PathValidationError::NotFound(_)) | Err(PathValidationError::ProtectedDirectory(_))
        ));
    }

    #[test]
    fn missing_path_without_env_var_is_an_error() {
        std::env::remove_var("PHX_POLICY_FILE");
        let result = resolve_policy_path(None);
        assert!(matches!(result, Err(PathValidationError::Missing)));
    }

    #[test]
    fn accepts_and_canonicalizes_an_existing_file() {
        let dir = std::env::temp_dir();
        let path = dir.join("phoenix_validator_test_policy.yaml");
        std::fs::write(&path, "processor_defaults: {}\n").expect("write scratch file");

        let result = resolve_policy_path(Some(&path));
        assert!(result.is_ok());

        let _ = std::fs::remove_file(&path);
    }
}
