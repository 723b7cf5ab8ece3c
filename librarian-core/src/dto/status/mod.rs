//! Status, output and cancel response DTOs

use serde::{Deserialize, Serialize};

/// Response of a status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    #[serde(default)]
    pub files_checked: Option<u64>,
    #[serde(default)]
    pub total_files: Option<u64>,
    /// Path of the log file the backend writes for this run, if any
    #[serde(default)]
    pub log_file_path: Option<String>,
}

/// Response of an output endpoint
///
/// The backend drains its buffer on every read, so each batch only contains
/// lines produced since the previous call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputResponse {
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub files_checked: Option<u64>,
    #[serde(default)]
    pub total_files: Option<u64>,
}

impl OutputResponse {
    /// Whether the batch carries any progress counter
    pub fn has_progress(&self) -> bool {
        self.files_checked.is_some() || self.total_files.is_some()
    }
}

/// Acknowledgement of a cancel request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelAck {
    #[serde(default)]
    pub status: String,
}
