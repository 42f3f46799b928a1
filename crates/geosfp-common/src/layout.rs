//! On-disk directory layout.
//!
//! Month artifacts live in `root/YYYY/MM/`, day artifacts in the same
//! directory with the `YYYYMMDD` key in their file name. Downstream model
//! tooling reads this layout directly, so it must not change.
//!
//! Everything here is pure path arithmetic; no function touches the
//! filesystem.

use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calendar::CalendarUnit;

/// Strip `.` components and trailing separators so that `"/data/"`,
/// `"/data"` and `"/data/./"` resolve identically.
fn normalize_root(root: &Path) -> PathBuf {
    root.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Directory holding the unit's artifacts: `root/YYYY/MM`.
pub fn resolve_dir(root: &Path, unit: &CalendarUnit) -> PathBuf {
    normalize_root(root).join(unit.yyyy()).join(unit.mm())
}

/// Canonical location of a unit.
///
/// Month units resolve to `root/YYYY/MM/`; day units to the same directory
/// plus a `YYYYMMDD` component.
pub fn resolve(root: &Path, unit: &CalendarUnit) -> PathBuf {
    let dir = resolve_dir(root, unit);
    if unit.is_day() {
        dir.join(unit.key())
    } else {
        dir
    }
}

/// A file of the unit's directory, named by rendering `template`.
pub fn resolve_artifact(root: &Path, unit: &CalendarUnit, template: &FileTemplate) -> PathBuf {
    resolve_dir(root, unit).join(template.render(unit, &[]))
}

/// Sibling path used while a file is being written; renamed over `path`
/// once complete so readers never observe a truncated artifact.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// A root directory paired with a calendar unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataLocation {
    root: PathBuf,
    unit: CalendarUnit,
}

impl DataLocation {
    pub fn new(root: impl AsRef<Path>, unit: CalendarUnit) -> Self {
        Self {
            root: normalize_root(root.as_ref()),
            unit,
        }
    }

    pub fn unit(&self) -> CalendarUnit {
        self.unit
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> PathBuf {
        resolve(&self.root, &self.unit)
    }

    pub fn dir(&self) -> PathBuf {
        resolve_dir(&self.root, &self.unit)
    }

    pub fn artifact(&self, template: &FileTemplate) -> PathBuf {
        resolve_artifact(&self.root, &self.unit, template)
    }
}

/// A file-name template with calendar placeholders.
///
/// Supported placeholders: `{yyyy}`, `{mm}`, `{dd}`, `{yyyymm}`,
/// `{yyyymmdd}`. Day placeholders are left untouched for month units.
/// Extra `(name, value)` pairs passed to [`FileTemplate::render`] fill
/// caller-specific placeholders such as `{collection}` or `{hh}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTemplate(String);

impl FileTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, unit: &CalendarUnit, extra: &[(&str, &str)]) -> String {
        let month_key = format!("{}{}", unit.yyyy(), unit.mm());
        let mut out = self
            .0
            .replace("{yyyymm}", &month_key)
            .replace("{yyyy}", &unit.yyyy())
            .replace("{mm}", &unit.mm());

        if let Some(dd) = unit.dd() {
            out = out
                .replace("{yyyymmdd}", &unit.key())
                .replace("{dd}", &dd);
        }

        for (name, value) in extra {
            out = out.replace(&format!("{{{}}}", name), value);
        }
        out
    }
}

impl fmt::Display for FileTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileTemplate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
