//! Idempotent retrieval of raw files into the local tree.
//!
//! Key behaviour:
//! - Units whose files are all present and non-empty are skipped without
//!   touching the network
//! - Files are written to a `.partial` sibling and renamed on completion
//! - Each file gets a bounded number of immediate attempts
//! - Files fetched before a sibling failed are kept, so a rerun resumes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use geosfp_common::{partial_path, resolve_dir, CalendarUnit, FileTemplate};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::config::{CollectionConfig, RemoteConfig};
use crate::error::{PipelineError, Result};
use crate::remote::{RemoteArchive, RemoteFile};
use crate::report::{JobResult, Stage};

/// Retrieves the raw files of calendar units from a remote archive.
pub struct RemoteFetcher {
    archive: Arc<dyn RemoteArchive>,
    collections: Vec<CollectionConfig>,
    file_template: FileTemplate,
    max_attempts: u32,
    max_concurrent: usize,
}

impl RemoteFetcher {
    pub fn new(archive: Arc<dyn RemoteArchive>, config: &RemoteConfig) -> Self {
        Self {
            archive,
            collections: config.collections.clone(),
            file_template: config.file_template.clone(),
            max_attempts: config.max_attempts.max(1),
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    /// Every file expected for one day, across all collections.
    pub fn expected_files(&self, day: CalendarUnit) -> Vec<RemoteFile> {
        self.collections
            .iter()
            .flat_map(|c| self.collection_files(day, c))
            .collect()
    }

    fn collection_files(&self, day: CalendarUnit, collection: &CollectionConfig) -> Vec<RemoteFile> {
        collection
            .hours
            .iter()
            .map(|hour| RemoteFile::new(day, &collection.name, *hour, &self.file_template))
            .collect()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c.name == name)
    }

    /// Local paths of the files of one configured collection on `day`, in
    /// configured hour order. `None` when the collection is not fetched.
    pub fn collection_paths(&self, day: CalendarUnit, name: &str, local_root: &Path) -> Option<Vec<PathBuf>> {
        let collection = self.collections.iter().find(|c| c.name == name)?;
        let dir = resolve_dir(local_root, &day);
        Some(
            self.collection_files(day, collection)
                .into_iter()
                .map(|file| dir.join(file.name))
                .collect(),
        )
    }

    /// Lightweight integrity check: every expected file of every day of the
    /// unit exists with non-zero size.
    pub async fn is_complete(&self, unit: CalendarUnit, local_root: &Path) -> bool {
        for day in unit.days() {
            let dir = resolve_dir(local_root, &day);
            for file in self.expected_files(day) {
                if !is_present(&dir.join(&file.name)).await {
                    return false;
                }
            }
        }
        true
    }

    /// Fetch one unit (a day, or every day of a month).
    ///
    /// Never returns an error: failures are reported in the result.
    #[instrument(skip(self, local_root), fields(unit = %unit))]
    pub async fn fetch(&self, unit: CalendarUnit, local_root: &Path) -> JobResult {
        let mut fetched = 0usize;
        let mut failures: Vec<String> = Vec::new();

        for day in unit.days() {
            match self.fetch_day(day, local_root).await {
                Ok(count) => fetched += count,
                Err(e) => {
                    warn!(day = %day, error = %e, "Fetch failed");
                    failures.push(if unit.is_month() {
                        format!("{}: {}", day, e)
                    } else {
                        e.to_string()
                    });
                }
            }
        }

        let result = if !failures.is_empty() {
            JobResult::failed(unit, Stage::Fetch, failures.join("; "))
        } else if fetched == 0 {
            JobResult::skipped(unit, Stage::Fetch, "all files present")
        } else {
            JobResult::success(unit, Stage::Fetch).with_detail(format!("{} files fetched", fetched))
        };

        metrics::counter!(
            "geosfp_units_total",
            "stage" => Stage::Fetch.as_str(),
            "status" => result.status.as_str()
        )
        .increment(1);
        result
    }

    /// Fetch the missing files of one day. Returns how many were fetched.
    async fn fetch_day(&self, day: CalendarUnit, local_root: &Path) -> Result<usize> {
        let dir = resolve_dir(local_root, &day);
        let mut fetched = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for collection in &self.collections {
            let files = self.collection_files(day, collection);
            let missing = missing_files(&dir, files).await;
            if missing.is_empty() {
                debug!(day = %day, collection = %collection.name, "Collection already present");
                continue;
            }

            match self.fetch_files(&dir, missing).await {
                Ok(paths) => fetched += paths.len(),
                Err((paths, e)) => {
                    fetched += paths.len();
                    errors.push(e.to_string());
                }
            }
        }

        if errors.is_empty() {
            if fetched > 0 {
                info!(day = %day, files = fetched, dir = %dir.display(), "Day fetched");
            }
            Ok(fetched)
        } else {
            Err(PipelineError::remote(
                day.key(),
                format!("{} ({} files fetched before failure)", errors.join("; "), fetched),
            ))
        }
    }

    /// Retrieve every file of `collection_name` for `day` into
    /// `destination`, skipping files already present.
    ///
    /// Returns the paths of all files of the collection on success.
    pub async fn fetch_collection(
        &self,
        day: CalendarUnit,
        collection_name: &str,
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        let collection = self
            .collections
            .iter()
            .find(|c| c.name == collection_name)
            .cloned()
            .unwrap_or_else(|| CollectionConfig::hourly(collection_name));

        let files = self.collection_files(day, &collection);
        let all: Vec<PathBuf> = files.iter().map(|f| destination.join(&f.name)).collect();
        let missing = missing_files(destination, files).await;
        if !missing.is_empty() {
            self.fetch_files(destination, missing).await.map_err(|(_, e)| e)?;
        }
        Ok(all)
    }

    /// Download `files` into `dir` with bounded concurrency.
    ///
    /// On failure returns the paths that did complete alongside the error.
    async fn fetch_files(
        &self,
        dir: &Path,
        files: Vec<RemoteFile>,
    ) -> std::result::Result<Vec<PathBuf>, (Vec<PathBuf>, PipelineError)> {
        if let Err(e) = fs::create_dir_all(dir).await {
            return Err((Vec::new(), PipelineError::write(dir, e)));
        }

        let results: Vec<Result<PathBuf>> = stream::iter(files)
            .map(|file| self.fetch_file(dir, file))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut done = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(path) => done.push(path),
                Err(e) => errors.push(e),
            }
        }
        done.sort();

        match errors.len() {
            0 => Ok(done),
            1 => Err((done, errors.remove(0))),
            n => {
                let first = errors.remove(0);
                let location = match &first {
                    PipelineError::RemoteUnavailable { location, .. } => location.clone(),
                    _ => dir.display().to_string(),
                };
                Err((
                    done,
                    PipelineError::remote(location, format!("{} (and {} more failures)", first, n - 1)),
                ))
            }
        }
    }

    /// Download one file with up to `max_attempts` immediate attempts.
    async fn fetch_file(&self, dir: &Path, file: RemoteFile) -> Result<PathBuf> {
        let url = self.archive.url_for(&file);
        let final_path = dir.join(&file.name);
        let temp_path = partial_path(&final_path);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match self.archive.download(&url, &temp_path).await {
                Ok(bytes) => fs::rename(&temp_path, &final_path)
                    .await
                    .map(|_| bytes)
                    .map_err(|e| PipelineError::write(&final_path, e)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(bytes) => {
                    metrics::counter!("geosfp_bytes_downloaded_total").increment(bytes);
                    debug!(file = %file.name, bytes = bytes, attempt = attempt, "File fetched");
                    return Ok(final_path);
                }
                Err(e) => {
                    fs::remove_file(&temp_path).await.ok();
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    warn!(
                        file = %file.name,
                        error = %e,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        "Fetch attempt failed, retrying"
                    );
                }
            }
        }
    }
}

async fn is_present(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

async fn missing_files(dir: &Path, files: Vec<RemoteFile>) -> Vec<RemoteFile> {
    let mut missing = Vec::new();
    for file in files {
        if !is_present(&dir.join(&file.name)).await {
            missing.push(file);
        }
    }
    missing
}
