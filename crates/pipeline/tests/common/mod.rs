//! Common test utilities for pipeline integration tests.
//!
//! Provides helpers for:
//! - An in-memory remote archive with call counting and injected failures
//! - A small pipeline configuration rooted in a temp dir
//! - Seeding augmentation inputs

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geosfp_common::{resolve_artifact, CalendarUnit, FileTemplate};
use met_dataset::{Dataset, DatasetIo};
use pipeline::{CollectionConfig, PipelineConfig, PipelineError, RemoteArchive, RemoteFile};
use test_utils::{fixtures::collections, fixtures::grid::GridSpec, surface_dataset};

/// Remote archive that serves fixed bytes for every file.
///
/// Files are failed by day key (every file of the day) or by exact file
/// name, or cut off halfway through the body; every download attempt is
/// counted.
#[derive(Default)]
pub struct MemoryArchive {
    failing_days: Mutex<HashSet<String>>,
    failing_files: Mutex<HashSet<String>>,
    truncating_files: Mutex<HashSet<String>>,
    body: Mutex<Option<Vec<u8>>>,
    calls: AtomicUsize,
}

impl MemoryArchive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_day(&self, key: &str) {
        self.failing_days.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_file(&self, name: &str) {
        self.failing_files.lock().unwrap().insert(name.to_string());
    }

    /// Write half of the body of `name`, then fail.
    pub fn truncate_file(&self, name: &str) {
        self.truncating_files.lock().unwrap().insert(name.to_string());
    }

    /// Serve `dataset`, encoded by `io`, as the body of every file.
    pub fn serve_dataset(&self, io: &dyn DatasetIo, dataset: &Dataset) {
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("body.nc");
        io.write_atomic(dataset, &path).unwrap();
        *self.body.lock().unwrap() = Some(std::fs::read(&path).unwrap());
    }

    pub fn heal(&self) {
        self.failing_days.lock().unwrap().clear();
        self.failing_files.lock().unwrap().clear();
        self.truncating_files.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contents(&self, url: &str) -> Vec<u8> {
        match self.body.lock().unwrap().as_ref() {
            Some(body) => body.clone(),
            None => format!("payload of {}", url).into_bytes(),
        }
    }
}

#[async_trait]
impl RemoteArchive for MemoryArchive {
    fn url_for(&self, file: &RemoteFile) -> String {
        format!("mem://{}/{}", file.day.key(), file.name)
    }

    async fn download(&self, url: &str, destination: &Path) -> pipeline::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut parts = url.trim_start_matches("mem://").splitn(2, '/');
        let day = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if self.failing_days.lock().unwrap().contains(day)
            || self.failing_files.lock().unwrap().contains(name)
        {
            return Err(PipelineError::remote(url, "not found (HTTP 404)"));
        }

        let body = self.contents(url);
        if self.truncating_files.lock().unwrap().contains(name) {
            tokio::fs::write(destination, &body[..body.len() / 2])
                .await
                .map_err(|e| PipelineError::write(destination, e))?;
            return Err(PipelineError::remote(url, "connection reset mid-transfer"));
        }

        tokio::fs::write(destination, &body)
            .await
            .map_err(|e| PipelineError::write(destination, e))?;
        Ok(body.len() as u64)
    }
}

/// Two collections, two hours each: four files per day.
pub const FILES_PER_DAY: usize = 4;

/// A configuration rooted in `root` with a small file set; run mode
/// augments the surface collection.
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.raw_root = root.join("ori");
    config.remote.collections = vec![
        CollectionConfig {
            name: collections::LND.to_string(),
            hours: vec![0, 12],
        },
        CollectionConfig {
            name: collections::SLV.to_string(),
            hours: vec![0, 12],
        },
    ];
    config.augment.raw_collection = collections::SLV.to_string();
    config.remote.max_attempts = 2;
    config.augment.input_root = Some(root.join("GEOS_FP"));
    config.augment.output_root = root.join("GEOS_FP_soil_T");
    config.process.scratch_dir = root.join("scratch");
    config
}

/// Write a surface dataset for every day of `units` under `root`.
pub fn seed_inputs(
    io: &dyn DatasetIo,
    root: &Path,
    template: &FileTemplate,
    units: impl IntoIterator<Item = CalendarUnit>,
    grid: GridSpec,
    hours: usize,
) -> Vec<PathBuf> {
    let dataset = surface_dataset(grid, hours);
    units
        .into_iter()
        .map(|day| {
            let path = resolve_artifact(root, &day, template);
            io.write_atomic(&dataset, &path).unwrap();
            path
        })
        .collect()
}

pub fn unit(key: &str) -> CalendarUnit {
    key.parse().unwrap()
}
