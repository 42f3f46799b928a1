//! Named output destinations.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

fn default_coarsen() -> u32 {
    1
}

/// One destination of a fan-out write.
///
/// `coarsen` is the block size used to reduce the horizontal resolution
/// before writing; 1 writes the native grid (e.g. 2x2.5), 2 writes a
/// 2x2 block mean (e.g. 4x5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub label: String,
    pub root_dir: PathBuf,
    #[serde(default = "default_coarsen")]
    pub coarsen: u32,
}

impl OutputTarget {
    pub fn new(label: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            root_dir: root_dir.into(),
            coarsen: 1,
        }
    }

    pub fn with_coarsen(mut self, factor: u32) -> Self {
        self.coarsen = factor.max(1);
        self
    }
}

impl FromStr for OutputTarget {
    type Err = CalendarError;

    /// Parse `LABEL=DIR` or `LABEL=DIR:COARSEN`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CalendarError::InvalidTarget(s.to_string());
        let (label, rest) = s.split_once('=').ok_or_else(invalid)?;
        let label = label.trim();
        if label.is_empty() || rest.is_empty() {
            return Err(invalid());
        }

        let (dir, coarsen) = match rest.rsplit_once(':') {
            Some((dir, factor)) if !factor.is_empty() && factor.bytes().all(|b| b.is_ascii_digit()) => {
                let factor: u32 = factor.parse().map_err(|_| invalid())?;
                if factor == 0 {
                    return Err(invalid());
                }
                (dir, factor)
            }
            _ => (rest, 1),
        };

        Ok(Self::new(label, dir).with_coarsen(coarsen))
    }
}

/// Output targets keyed by their unique label.
///
/// Iteration order is by label, so results are reported deterministically
/// regardless of how the targets were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputTargets(BTreeMap<String, OutputTarget>);

impl OutputTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a target, replacing any previous target with the same label.
    pub fn insert(&mut self, target: OutputTarget) -> Option<OutputTarget> {
        self.0.insert(target.label.clone(), target)
    }

    pub fn get(&self, label: &str) -> Option<&OutputTarget> {
        self.0.get(label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputTarget> {
        self.0.values()
    }
}

impl FromIterator<OutputTarget> for OutputTargets {
    fn from_iter<I: IntoIterator<Item = OutputTarget>>(iter: I) -> Self {
        let mut targets = Self::new();
        for target in iter {
            targets.insert(target);
        }
        targets
    }
}
