//! Entity labels kept next to the training configuration.
//!
//! Stored as `{"labels": [...]}` in `labels.json` beside `config.yml`.
//! Training registers these labels in addition to the ones found in the
//! training data.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CompanionError, Result};

pub const LABELS_FILE: &str = "labels.json";

/// Label file belonging to the configuration at `config_path`.
pub fn labels_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(LABELS_FILE)
}

/// Ordered, duplicate-free list of entity labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelList {
    pub labels: Vec<String>,
}

impl LabelList {
    /// Load the list; a missing file is an empty list.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(CompanionError::io(path, e)),
        };
        let mut list = Self::default();
        list.add(serde_json::from_str::<Self>(&raw)?.labels);
        Ok(list)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CompanionError::io(parent, e))?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)
            .map_err(|e| CompanionError::io(path, e))
    }

    /// Append labels not already present. Blank labels are skipped.
    pub fn add(&mut self, labels: impl IntoIterator<Item = String>) {
        for label in labels {
            let label = label.trim();
            if !label.is_empty() && !self.labels.iter().any(|l| l == label) {
                self.labels.push(label.to_string());
            }
        }
    }

    pub fn remove(&mut self, labels: &[String]) {
        self.labels.retain(|l| !labels.contains(l));
    }
}
