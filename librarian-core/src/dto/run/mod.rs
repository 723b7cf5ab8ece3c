//! Run request and response DTOs

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::module::ModuleId;

/// Default segmentation chunk size in megabytes
pub const DEFAULT_MAX_SIZE_MB: f64 = 10.0;

/// Default number of pages per segmentation chunk
pub const DEFAULT_INITIAL_PAGE_COUNT: u32 = 100;

/// Request body for starting a module's job
///
/// Serializes to the flat JSON object the module's run endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RunPayload {
    DuplicateScan(ScanRequest),
    Segmentation(SegmentationRequest),
    Sort(SortRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub target_folder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationRequest {
    pub target_folder: String,
    pub max_size_mb: f64,
    pub initial_page_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequest {
    pub target_folder: String,
}

/// Reasons a run payload is rejected before it reaches the backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("target path must not be empty")]
    EmptyPath,

    #[error("target path '{0}' must not contain '..' or '~'")]
    UnsafePath(String),

    #[error("max size must be a positive number of megabytes, got {0}")]
    InvalidMaxSize(f64),

    #[error("initial page count must be greater than 0")]
    InvalidPageCount,

    #[error("payload is for module {actual}, not {expected}")]
    ModuleMismatch { expected: ModuleId, actual: ModuleId },
}

impl RunPayload {
    pub fn duplicate_scan(target_folder: impl Into<String>) -> Self {
        Self::DuplicateScan(ScanRequest {
            target_folder: target_folder.into(),
        })
    }

    pub fn segmentation(
        target_folder: impl Into<String>,
        max_size_mb: f64,
        initial_page_count: u32,
    ) -> Self {
        Self::Segmentation(SegmentationRequest {
            target_folder: target_folder.into(),
            max_size_mb,
            initial_page_count,
        })
    }

    pub fn sort(target_folder: impl Into<String>) -> Self {
        Self::Sort(SortRequest {
            target_folder: target_folder.into(),
        })
    }

    /// The module this payload starts
    pub fn module(&self) -> ModuleId {
        match self {
            Self::DuplicateScan(_) => ModuleId::DuplicateScan,
            Self::Segmentation(_) => ModuleId::Segmentation,
            Self::Sort(_) => ModuleId::Sort,
        }
    }

    /// The folder the job operates on
    pub fn target_path(&self) -> &str {
        match self {
            Self::DuplicateScan(req) => &req.target_folder,
            Self::Segmentation(req) => &req.target_folder,
            Self::Sort(req) => &req.target_folder,
        }
    }

    /// Validates the payload for the given module
    ///
    /// Paths are rejected when empty or when they contain `..` or `~`.
    pub fn validate_for(&self, module: ModuleId) -> Result<(), PayloadError> {
        if self.module() != module {
            return Err(PayloadError::ModuleMismatch {
                expected: module,
                actual: self.module(),
            });
        }

        let path = self.target_path();
        if path.trim().is_empty() {
            return Err(PayloadError::EmptyPath);
        }
        if path.contains("..") || path.contains('~') {
            return Err(PayloadError::UnsafePath(path.to_string()));
        }

        if let Self::Segmentation(req) = self {
            if !req.max_size_mb.is_finite() || req.max_size_mb <= 0.0 {
                return Err(PayloadError::InvalidMaxSize(req.max_size_mb));
            }
            if req.initial_page_count == 0 {
                return Err(PayloadError::InvalidPageCount);
            }
        }

        Ok(())
    }
}

/// Response of a run endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunResponse {
    pub status: RunStatus,
}

/// Status string returned by a run endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RunStatus {
    /// A new job was launched
    Started,
    /// A job for the module was already running
    Running,
    /// Anything else; treated as a rejection
    Other(String),
}

impl RunStatus {
    /// Whether the backend accepted the run request
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Started | Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Running => f.write_str("running"),
            Self::Other(status) => f.write_str(status),
        }
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "started" => Self::Started,
            "running" => Self::Running,
            _ => Self::Other(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmentation_payload_serializes_flat() {
        let payload = RunPayload::segmentation("/library/pdfs", 12.5, 40);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "target_folder": "/library/pdfs",
                "max_size_mb": 12.5,
                "initial_page_count": 40
            })
        );
    }

    #[test]
    fn test_validate_rejects_unsafe_paths() {
        let payload = RunPayload::sort("/library/../etc");
        assert!(matches!(
            payload.validate_for(ModuleId::Sort),
            Err(PayloadError::UnsafePath(_))
        ));

        let payload = RunPayload::sort("~/books");
        assert!(payload.validate_for(ModuleId::Sort).is_err());

        let payload = RunPayload::sort("   ");
        assert_eq!(payload.validate_for(ModuleId::Sort), Err(PayloadError::EmptyPath));
    }

    #[test]
    fn test_validate_rejects_module_mismatch() {
        let payload = RunPayload::duplicate_scan("/library");
        assert_eq!(
            payload.validate_for(ModuleId::Sort),
            Err(PayloadError::ModuleMismatch {
                expected: ModuleId::Sort,
                actual: ModuleId::DuplicateScan,
            })
        );
    }

    #[test]
    fn test_validate_segmentation_limits() {
        let payload = RunPayload::segmentation("/library", 0.0, 10);
        assert_eq!(
            payload.validate_for(ModuleId::Segmentation),
            Err(PayloadError::InvalidMaxSize(0.0))
        );

        let payload = RunPayload::segmentation("/library", 5.0, 0);
        assert_eq!(
            payload.validate_for(ModuleId::Segmentation),
            Err(PayloadError::InvalidPageCount)
        );

        let payload = RunPayload::segmentation("/library", DEFAULT_MAX_SIZE_MB, DEFAULT_INITIAL_PAGE_COUNT);
        assert!(payload.validate_for(ModuleId::Segmentation).is_ok());
    }

    #[test]
    fn test_run_status_parsing() {
        let started: RunResponse = serde_json::from_str(r#"{"status":"started"}"#).unwrap();
        assert_eq!(started.status, RunStatus::Started);
        assert!(started.status.is_accepted());

        let odd: RunResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(odd.status, RunStatus::Other("queued".to_string()));
        assert!(!odd.status.is_accepted());
    }
}
