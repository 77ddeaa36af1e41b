//! File change events emitted by schema file monitors

use serde::{Deserialize, Serialize};

/// Identifier of the monitor that watches SDL sources of configured endpoints.
///
/// Consumers only act on events carrying this identifier; other monitors in
/// the same process may share the event channel.
pub const SCHEMA_FILE_MONITOR: &str = "sdlbind_schema_files";

/// A batch of paths reported as changed by one monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// Identifier of the monitor that produced the event
    pub monitor_id: String,
    /// Changed paths, as they were registered with the monitor
    pub paths: Vec<String>,
}

impl FileChangeEvent {
    /// Create a new change event
    pub fn new(monitor_id: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            paths,
        }
    }

    /// Create a change event from the schema file monitor
    pub fn schema_files(paths: Vec<String>) -> Self {
        Self::new(SCHEMA_FILE_MONITOR, paths)
    }

    /// Whether this event was emitted by the given monitor
    pub fn is_from(&self, monitor_id: &str) -> bool {
        self.monitor_id == monitor_id
    }
}
