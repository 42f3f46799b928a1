//! Remote archive access.
//!
//! The fetcher only needs to know where a file lives and how to copy it to
//! a local path; [`RemoteArchive`] is that seam. [`HttpArchive`] implements
//! it over HTTP(S) with a whole-transfer timeout and a Content-Length check.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use geosfp_common::{CalendarUnit, FileTemplate};
use reqwest::{header, Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::config::RemoteConfig;
use crate::error::{PipelineError, Result};

/// One file of one day in the remote archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteFile {
    pub day: CalendarUnit,
    pub collection: String,
    pub hour: u32,
    /// File name, identical in the archive and in the local tree.
    pub name: String,
}

impl RemoteFile {
    /// Render the file of `collection` at `hour` on `day`.
    pub fn new(day: CalendarUnit, collection: &str, hour: u32, template: &FileTemplate) -> Self {
        let hh = format!("{:02}", hour);
        let name = template.render(&day, &[("collection", collection), ("hh", &hh)]);
        Self {
            day,
            collection: collection.to_string(),
            hour,
            name,
        }
    }
}

/// Source of raw files.
#[async_trait]
pub trait RemoteArchive: Send + Sync {
    /// Location of `file` in the archive.
    fn url_for(&self, file: &RemoteFile) -> String;

    /// Copy `url` into `destination` (truncating it), returning the number
    /// of bytes written.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// HTTP(S) archive such as the GMAO GEOS-FP data portal.
pub struct HttpArchive {
    client: Client,
    base_url: FileTemplate,
}

impl HttpArchive {
    /// Create an archive client with the configured timeouts.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.max_concurrent)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl RemoteArchive for HttpArchive {
    fn url_for(&self, file: &RemoteFile) -> String {
        let base = self.base_url.render(&file.day, &[("collection", &file.collection)]);
        format!("{}/{}", base.trim_end_matches('/'), file.name)
    }

    #[instrument(skip(self, destination), fields(url = %url))]
    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::remote(url, format!("request failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(PipelineError::remote(url, "not found (HTTP 404)"));
            }
            status => {
                return Err(PipelineError::remote(url, format!("HTTP error: {}", status)));
            }
        }

        let expected: Option<u64> = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let mut file = File::create(destination)
            .await
            .map_err(|e| PipelineError::write(destination, e))?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| PipelineError::remote(url, format!("error reading response: {}", e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| PipelineError::write(destination, e))?;
            written += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| PipelineError::write(destination, e))?;
        file.sync_all()
            .await
            .map_err(|e| PipelineError::write(destination, e))?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(PipelineError::remote(
                    url,
                    format!("size mismatch: expected {} bytes, got {}", expected, written),
                ));
            }
        }
        if written == 0 {
            return Err(PipelineError::remote(url, "empty response body"));
        }

        debug!(bytes = written, path = %destination.display(), "Transfer complete");
        Ok(written)
    }
}
