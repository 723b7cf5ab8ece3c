//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of a module's job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    NotStarted,
    Running,
    Finished,
    Error,
    UserCanceled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "Not Started",
            Self::Running => "Running",
            Self::Finished => "Finished",
            Self::Error => "Error",
            Self::UserCanceled => "User Canceled",
        };
        f.write_str(label)
    }
}

/// Terminal status a job can be stopped with
///
/// Kept separate from [`JobStatus`] so a stop can never record `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalStatus {
    #[default]
    Finished,
    Error,
    UserCanceled,
}

impl From<FinalStatus> for JobStatus {
    fn from(status: FinalStatus) -> Self {
        match status {
            FinalStatus::Finished => JobStatus::Finished,
            FinalStatus::Error => JobStatus::Error,
            FinalStatus::UserCanceled => JobStatus::UserCanceled,
        }
    }
}

/// Execution record for one module
///
/// The registry owns one record per module for the lifetime of the process.
/// Everything outside the registry only ever sees clones.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobRecord {
    pub is_running: bool,
    pub status: JobStatus,
    pub target_path: String,
    pub files_checked: u64,
    pub total_files: u64,
    pub consecutive_error_count: u32,
}

impl JobRecord {
    /// Fraction of files checked, when the backend reports a total
    pub fn progress(&self) -> Option<f64> {
        if self.total_files == 0 {
            return None;
        }
        Some(self.files_checked as f64 / self.total_files as f64)
    }
}
