//! Path utilities for test data trees.
//!
//! Helpers to create temporary roots, seed the `root/YYYY/MM/` layout with
//! files, and inspect what a test run left behind.

use std::path::{Path, PathBuf};

use geosfp_common::{resolve_dir, CalendarUnit};
use walkdir::WalkDir;

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Writes `names` into the unit's directory under `root`, each with
/// `contents`, and returns their paths.
pub async fn seed_unit_files(
    root: &Path,
    unit: &CalendarUnit,
    names: &[String],
    contents: &[u8],
) -> Vec<PathBuf> {
    let dir = resolve_dir(root, unit);
    tokio::fs::create_dir_all(&dir)
        .await
        .expect("Failed to create unit directory");

    let mut paths = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .expect("Failed to seed test file");
        paths.push(path);
    }
    paths
}

/// Every file below `root`, sorted, as paths relative to `root`.
///
/// A missing root yields an empty list.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// Files below `root` whose name ends in `.partial`.
pub fn find_partial_files(root: &Path) -> Vec<PathBuf> {
    list_files(root)
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "partial"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_unit_files_uses_layout() {
        let dir = temp_test_dir();
        let day = CalendarUnit::day(2014, 8, 20).unwrap();
        let names = vec!["a.nc4".to_string(), "b.nc4".to_string()];
        seed_unit_files(dir.path(), &day, &names, b"data").await;

        assert_eq!(
            list_files(dir.path()),
            vec![PathBuf::from("2014/08/a.nc4"), PathBuf::from("2014/08/b.nc4")]
        );
        assert!(find_partial_files(dir.path()).is_empty());
    }

    #[test]
    fn test_list_files_skips_directories_and_missing_roots() {
        let dir = temp_test_dir();
        std::fs::create_dir_all(dir.path().join("2014/09")).unwrap();
        std::fs::write(dir.path().join("2014/x.nc4.partial"), b"x").unwrap();

        assert_eq!(list_files(dir.path()), vec![PathBuf::from("2014/x.nc4.partial")]);
        assert_eq!(find_partial_files(dir.path()).len(), 1);
        assert!(list_files(&dir.path().join("absent")).is_empty());
    }
}
