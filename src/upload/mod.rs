//! Upload scheduling for Hub storage
//!
//! This module provides the upload manager: it expands local inputs into
//! tracked tasks, admits them under a byte budget, aggregates their progress
//! by remote path prefix, and merges pending uploads into server listings.

pub mod config;
pub mod manager;
pub mod session;
pub mod types;

mod expand;
mod listing;
mod scheduler;

pub use config::UploadConfig;
pub use manager::UploadManager;
pub use session::UploadSession;
pub use types::{
    FileInfo, SchedulerStats, SessionId, TaskId, TaskState, UploadProgress, UploadingFile,
};
