//! Log domain types

use serde::{Deserialize, Serialize};

use super::module::ModuleId;

/// A single line of job output delivered to registry subscribers
///
/// Log events are never stored; observers that need history keep their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub module: ModuleId,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl LogEvent {
    /// Creates a log event stamped with the current time
    pub fn now(module: ModuleId, message: impl Into<String>) -> Self {
        Self {
            module,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
