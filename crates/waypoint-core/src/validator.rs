//! Checkpoint validation.
//!
//! Checks run in order and stop at the first failure:
//! 1. the path exists
//! 2. it is a regular file
//! 3. size is at least the configured minimum (guards truncated writes)
//! 4. the container fully decodes
//! 5. the decoded header is a mapping
//! 6. every essential key is present
//!
//! Validation sits inside the resolver's fallback chain, so it never returns
//! an error: every failure mode becomes a [`ValidationFailure`].

use crate::artifact::{decode, ArtifactInfo, FormatError};
use crate::config::CheckpointConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Why an artifact was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("artifact does not exist")]
    Missing,

    #[error("path is not a regular file")]
    NotAFile,

    #[error("artifact cannot be read: {message}")]
    Unreadable { message: String },

    #[error("artifact is {size} bytes, below the {minimum} byte minimum")]
    SizeTooSmall { size: u64, minimum: u64 },

    #[error("artifact failed to deserialize: {message}")]
    Deserialization { message: String },

    #[error("artifact is not a mapping: {message}")]
    StructuralMismatch { message: String },

    #[error("artifact is missing essential keys: {}", .missing.join(", "))]
    MissingEssentialKeys { missing: Vec<String> },
}

impl ValidationFailure {
    /// Failures that indicate a damaged artifact worth quarantining.
    ///
    /// Missing paths, directories and permission problems say nothing
    /// about the artifact bytes and are never quarantined.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ValidationFailure::SizeTooSmall { .. }
                | ValidationFailure::Deserialization { .. }
                | ValidationFailure::StructuralMismatch { .. }
                | ValidationFailure::MissingEssentialKeys { .. }
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::Missing => "missing",
            ValidationFailure::NotAFile => "not_a_file",
            ValidationFailure::Unreadable { .. } => "unreadable",
            ValidationFailure::SizeTooSmall { .. } => "size_too_small",
            ValidationFailure::Deserialization { .. } => "deserialization",
            ValidationFailure::StructuralMismatch { .. } => "structural_mismatch",
            ValidationFailure::MissingEssentialKeys { .. } => "missing_essential_keys",
        }
    }
}

/// Outcome of validating one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub ok: bool,
    pub reason: Option<ValidationFailure>,
    pub info: ArtifactInfo,
}

impl ValidationReport {
    fn failed(info: ArtifactInfo, reason: ValidationFailure) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            info,
        }
    }
}

/// Decides whether an artifact is usable.
#[derive(Debug, Clone)]
pub struct Validator {
    min_valid_size_bytes: u64,
    essential_keys: Vec<String>,
}

impl Validator {
    pub fn new(min_valid_size_bytes: u64, essential_keys: Vec<String>) -> Self {
        Self {
            min_valid_size_bytes,
            essential_keys,
        }
    }

    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self::new(config.min_valid_size_bytes, config.essential_keys.clone())
    }

    pub fn min_valid_size_bytes(&self) -> u64 {
        self.min_valid_size_bytes
    }

    pub fn essential_keys(&self) -> &[String] {
        &self.essential_keys
    }

    /// Validate the artifact at `path`.
    pub fn validate(&self, path: impl AsRef<Path>) -> ValidationReport {
        let path = path.as_ref();
        let report = self.run_checks(path.to_path_buf());
        match &report.reason {
            None => debug!("{} passed validation", path.display()),
            Some(reason) => debug!("{} failed validation: {}", path.display(), reason),
        }
        report
    }

    fn run_checks(&self, path: PathBuf) -> ValidationReport {
        let mut info = ArtifactInfo::unchecked(path);

        let metadata = match std::fs::metadata(&info.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ValidationReport::failed(info, ValidationFailure::Missing);
            }
            Err(e) => {
                return ValidationReport::failed(
                    info,
                    ValidationFailure::Unreadable {
                        message: e.to_string(),
                    },
                );
            }
        };
        info.exists = true;

        if !metadata.is_file() {
            return ValidationReport::failed(info, ValidationFailure::NotAFile);
        }

        info.size_bytes = metadata.len();
        if info.size_bytes < self.min_valid_size_bytes {
            let reason = ValidationFailure::SizeTooSmall {
                size: info.size_bytes,
                minimum: self.min_valid_size_bytes,
            };
            return ValidationReport::failed(info, reason);
        }

        let decoded = match decode(&info.path) {
            Ok(decoded) => decoded,
            Err(FormatError::Io(e)) if is_access_error(&e) => {
                return ValidationReport::failed(
                    info,
                    ValidationFailure::Unreadable {
                        message: e.to_string(),
                    },
                );
            }
            Err(e) => {
                return ValidationReport::failed(
                    info,
                    ValidationFailure::Deserialization {
                        message: e.to_string(),
                    },
                );
            }
        };

        if !decoded.is_mapping() {
            let reason = ValidationFailure::StructuralMismatch {
                message: format!("header is {}", json_kind(&decoded.header)),
            };
            return ValidationReport::failed(info, reason);
        }

        let keys = decoded.top_level_keys();
        info.top_level_key_count = keys.len();

        let missing: Vec<String> = self
            .essential_keys
            .iter()
            .filter(|k| !keys.contains(k.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return ValidationReport::failed(
                info,
                ValidationFailure::MissingEssentialKeys { missing },
            );
        }

        info.has_essential_keys = true;
        info.is_valid = true;
        ValidationReport {
            ok: true,
            reason: None,
            info,
        }
    }
}

fn is_access_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::NotFound
    )
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{write_artifact, ArtifactEntry};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn keys() -> Vec<String> {
        vec!["model".to_string(), "vocab".to_string()]
    }

    fn write_valid(path: &Path) -> u64 {
        write_artifact(
            path,
            &[
                ArtifactEntry::bytes("model.weight", vec![1u8; 64]),
                ArtifactEntry::bytes("vocab", b"<pad> <s> </s>".to_vec()),
            ],
            &BTreeMap::new(),
        )
        .unwrap()
    }

    fn write_raw_header(path: &Path, header: &[u8]) {
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_valid_artifact() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model_last");
        let size = write_valid(&path);

        let report = Validator::new(0, keys()).validate(&path);
        assert!(report.ok);
        assert!(report.reason.is_none());
        assert!(report.info.exists);
        assert!(report.info.is_valid);
        assert!(report.info.has_essential_keys);
        assert_eq!(report.info.size_bytes, size);
        assert_eq!(report.info.top_level_key_count, 2);
    }

    #[test]
    fn test_size_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model_last");
        let size = write_valid(&path);

        assert!(Validator::new(size, keys()).validate(&path).ok);

        let report = Validator::new(size + 1, keys()).validate(&path);
        assert!(!report.ok);
        assert_eq!(
            report.reason,
            Some(ValidationFailure::SizeTooSmall {
                size,
                minimum: size + 1
            })
        );
    }

    #[test]
    fn test_missing_path() {
        let temp = TempDir::new().unwrap();
        let report = Validator::new(0, keys()).validate(temp.path().join("absent"));
        assert_eq!(report.reason, Some(ValidationFailure::Missing));
        assert!(!report.info.exists);
        assert!(!report.reason.unwrap().is_corruption());
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let temp = TempDir::new().unwrap();
        let report = Validator::new(0, keys()).validate(temp.path());
        assert_eq!(report.reason, Some(ValidationFailure::NotAFile));
        assert!(report.info.exists);
    }

    #[test]
    fn test_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let report = Validator::new(0, keys()).validate(&path);
        assert!(matches!(
            report.reason,
            Some(ValidationFailure::Deserialization { .. })
        ));
        assert!(report.reason.unwrap().is_corruption());
    }

    #[test]
    fn test_arbitrary_binary() {
        let temp = TempDir::new().unwrap();
        let validator = Validator::new(0, keys());

        for (i, seed) in [0u8, 7, 0x7b, 0xff].iter().enumerate() {
            let path = temp.path().join(format!("noise_{}", i));
            let bytes: Vec<u8> = (0..257u32)
                .map(|n| (n as u8).wrapping_mul(31).wrapping_add(*seed))
                .collect();
            std::fs::write(&path, bytes).unwrap();

            let report = validator.validate(&path);
            assert!(!report.ok);
            assert!(report.reason.unwrap().is_corruption());
        }
    }

    #[test]
    fn test_invalid_json_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad_json");
        write_raw_header(&path, b"{\"model\": ");

        let report = Validator::new(0, keys()).validate(&path);
        assert!(matches!(
            report.reason,
            Some(ValidationFailure::Deserialization { .. })
        ));
    }

    #[test]
    fn test_non_mapping_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("list");
        write_raw_header(&path, b"[\"model\", \"vocab\"]");

        let report = Validator::new(0, keys()).validate(&path);
        assert_eq!(
            report.reason,
            Some(ValidationFailure::StructuralMismatch {
                message: "header is an array".to_string()
            })
        );
    }

    #[test]
    fn test_missing_essential_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("weights_only");
        write_artifact(
            &path,
            &[ArtifactEntry::bytes("model.weight", vec![0u8; 8])],
            &BTreeMap::new(),
        )
        .unwrap();

        let report = Validator::new(0, keys()).validate(&path);
        assert_eq!(
            report.reason,
            Some(ValidationFailure::MissingEssentialKeys {
                missing: vec!["vocab".to_string()]
            })
        );
        assert_eq!(report.info.top_level_key_count, 1);
        assert!(!report.info.has_essential_keys);
    }

    #[test]
    fn test_failure_messages() {
        let failure = ValidationFailure::MissingEssentialKeys {
            missing: vec!["model".to_string(), "vocab".to_string()],
        };
        assert_eq!(
            failure.to_string(),
            "artifact is missing essential keys: model, vocab"
        );
        assert_eq!(failure.code(), "missing_essential_keys");
    }
}
