use crate::path::RemotePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier of one tracked file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of one `upload` batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
}

/// Byte counters of a single transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes sent so far
    pub sent: u64,
    /// Expected byte count, 0 while unknown
    pub total: u64,
}

impl UploadProgress {
    pub fn new(sent: u64, total: u64) -> Self {
        Self { sent, total }
    }

    /// Fraction in [0, 1]; 0 while the total is unknown
    pub fn fraction(&self) -> f64 {
        if self.total > 0 {
            (self.sent as f64 / self.total as f64).min(1.0)
        } else {
            0.0
        }
    }

    pub(crate) fn accumulate(self, other: UploadProgress) -> Self {
        Self {
            sent: self.sent + other.sent,
            total: self.total + other.total,
        }
    }
}

/// A local file bound to its remote target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadingFile {
    /// Destination-relative remote path
    pub target: RemotePath,
    /// Local source of the bytes
    pub content: PathBuf,
}

impl UploadingFile {
    pub fn new(target: RemotePath, content: impl Into<PathBuf>) -> Self {
        Self {
            target,
            content: content.into(),
        }
    }
}

/// A listing entry, either reported by the server or synthesized from
/// an upload that the server has not confirmed yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            modified: None,
        }
    }

    /// Placeholder for a file that is still being uploaded
    pub fn provisional(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }

    pub fn modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }
}

/// Snapshot of the scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks waiting for admission
    pub pending: usize,
    /// Tasks currently transferring
    pub running: usize,
    /// Declared bytes of all running tasks
    pub uploading_bytes: u64,
    /// Leaves currently in the trie, including completed ones awaiting eviction
    pub tracked: usize,
}
