//! Streaming HTTP PUT of a local file

use crate::error::{Result, UploadError};
use crate::transport::{ProgressSink, Url};
use futures::StreamExt;
use log::debug;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client};
use std::path::Path;
use tokio_util::io::ReaderStream;

/// PUT the contents of `local` to `url`
///
/// The body is streamed from disk with an explicit `Content-Length`. Progress
/// is reported once before the first byte and after every chunk read. A
/// non-success status is returned as an error.
pub async fn put_file(client: &Client, local: &Path, url: &Url, progress: ProgressSink) -> Result<()> {
    let file = tokio::fs::File::open(local).await?;
    let total = file.metadata().await?.len();
    progress.report(0, total);

    let mut sent = 0u64;
    let reporter = progress.clone();
    let stream = ReaderStream::new(file).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as u64;
            reporter.report(sent, total);
        }
        chunk
    });

    debug!("PUT {} ({} bytes) -> {}", local.display(), total, url);
    let response = client
        .put(url.clone())
        .header(CONTENT_LENGTH, total)
        .body(Body::wrap_stream(stream))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(UploadError::transport_error(
            "put",
            format!("{} responded with {}", url, status),
        ));
    }
    Ok(())
}
