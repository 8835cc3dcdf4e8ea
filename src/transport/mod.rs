//! Contract with the Hub transport client
//!
//! The upload manager never talks to the network itself. It asks a
//! `Transport` for write locations, hands it local files to PUT, and tells it
//! when the remote listing changed. `http::put_file` is a ready-made streaming
//! PUT that implementations can delegate `put` to.

pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use reqwest::Url;

/// Receives `(sent, total)` byte counts while a file is being uploaded
#[derive(Clone)]
pub struct ProgressSink {
    callback: Arc<dyn Fn(u64, u64) + Send + Sync>,
}

impl ProgressSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A sink that drops every report
    pub fn discard() -> Self {
        Self::new(|_, _| {})
    }

    pub fn report(&self, sent: u64, total: u64) {
        (self.callback)(sent, total);
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Obtain a destination to PUT the bytes of `path` to
    async fn request_write_location(&self, path: &str) -> Result<Url>;

    /// Obtain a URL to download `path` from
    async fn request_read_location(&self, path: &str) -> Result<Url>;

    /// Tell the remote side its listing changed
    async fn notify_changed(&self) -> Result<()>;

    /// Remove a remote object
    async fn delete(&self, path: &str) -> Result<()>;

    /// Upload the local file to `destination`, reporting progress to `progress`
    async fn put(&self, local: &Path, destination: &Url, progress: ProgressSink) -> Result<()>;
}
