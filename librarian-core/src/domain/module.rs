//! Module domain types
//!
//! A module is one kind of background job the backend knows how to run.
//! Every module exposes the same four operations, each mapped to an HTTP
//! path. A module that cannot be cancelled has no cancel endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Background job type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleId {
    /// Duplicate-file scan ("weeding")
    DuplicateScan,
    /// PDF document segmentation
    Segmentation,
    /// File sorting
    Sort,
}

impl ModuleId {
    /// Every known module, in display order
    pub const ALL: [ModuleId; 3] = [Self::DuplicateScan, Self::Segmentation, Self::Sort];

    /// Stable snake_case name used on the wire and in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateScan => "duplicate_scan",
            Self::Segmentation => "segmentation",
            Self::Sort => "sort",
        }
    }

    /// Endpoint map for this module
    pub fn endpoints(self) -> Endpoints {
        match self {
            Self::DuplicateScan => Endpoints {
                status: "/check_status",
                output: "/get_output",
                run: "/run_script",
                cancel: Some("/cancel_script"),
            },
            Self::Segmentation => Endpoints {
                status: "/check_pdf_status",
                output: "/get_pdf_output",
                run: "/run_pdf_splitter",
                cancel: None,
            },
            Self::Sort => Endpoints {
                status: "/check_sorter_status",
                output: "/get_sorter_output",
                run: "/run_sorter",
                cancel: None,
            },
        }
    }

    /// Whether the backend exposes a cancel endpoint for this module
    pub fn supports_cancel(self) -> bool {
        self.endpoints().cancel.is_some()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unrecognised module name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown module '{0}' (expected one of: duplicate_scan, segmentation, sort)")]
pub struct UnknownModule(pub String);

impl FromStr for ModuleId {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "duplicate_scan" | "weeding" => Ok(Self::DuplicateScan),
            "segmentation" | "pdf" => Ok(Self::Segmentation),
            "sort" | "sorter" => Ok(Self::Sort),
            _ => Err(UnknownModule(s.to_string())),
        }
    }
}

/// One of the four operations every module exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Status,
    Output,
    Run,
    Cancel,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Status => "status",
            Self::Output => "output",
            Self::Run => "run",
            Self::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Per-module endpoint capability record
///
/// Paths are relative to the backend base URL. `cancel` is `None` for
/// modules whose backend job cannot be interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub status: &'static str,
    pub output: &'static str,
    pub run: &'static str,
    pub cancel: Option<&'static str>,
}

impl Endpoints {
    /// Path for an operation, or `None` when the capability is absent
    pub fn path(&self, operation: Operation) -> Option<&'static str> {
        match operation {
            Operation::Status => Some(self.status),
            Operation::Output => Some(self.output),
            Operation::Run => Some(self.run),
            Operation::Cancel => self.cancel,
        }
    }
}
