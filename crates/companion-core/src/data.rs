//! Annotated training sentences: loading, editing and saving the
//! training-data file.

use std::collections::HashSet;
use std::path::Path;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{CompanionError, Result};

/// One annotated entity inside a data point, offsets in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAnnotation {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

/// A labeled sentence as stored in the training-data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// md5 hex digest of `sentence`, set when the point is added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sentence: String,
    #[serde(default)]
    pub entities: Vec<EntityAnnotation>,
}

/// The whole training-data document: `{"dataPoints": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    #[serde(rename = "dataPoints")]
    pub data_points: Vec<DataPoint>,
}

/// Body of a delete request: `{"ids": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPointIds {
    pub ids: Vec<String>,
}

/// Id of the data point holding `sentence`.
pub fn data_point_id(sentence: &str) -> String {
    format!("{:x}", Md5::digest(sentence.as_bytes()))
}

/// A sentence with its `(start, end, label)` spans, ready for training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingExample {
    pub text: String,
    pub entities: Vec<(usize, usize, String)>,
}

impl TrainingExample {
    pub fn new(text: impl Into<String>, entities: Vec<(usize, usize, String)>) -> Self {
        Self {
            text: text.into(),
            entities,
        }
    }
}

impl TrainingData {
    /// Load a training-data file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CompanionError::io(path, e))?;
        let data: Self = serde_json::from_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            data_points = data.data_points.len(),
            "loaded training data"
        );
        Ok(data)
    }

    /// Like [`TrainingData::from_file`], but a missing file is empty data.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::from_file(&path) {
            Err(CompanionError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Write the document as pretty JSON, creating parent directories.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CompanionError::io(parent, e))?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)
            .map_err(|e| CompanionError::io(path, e))?;
        tracing::debug!(
            path = %path.display(),
            data_points = self.data_points.len(),
            "saved training data"
        );
        Ok(())
    }

    /// Put `points` in front of the stored ones, giving each its id.
    pub fn add(&mut self, points: Vec<DataPoint>) {
        let mut points: Vec<DataPoint> = points
            .into_iter()
            .map(|point| DataPoint {
                id: Some(data_point_id(&point.sentence)),
                ..point
            })
            .collect();
        points.append(&mut self.data_points);
        self.data_points = points;
    }

    /// Drop every point whose id is listed, returning how many went.
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.data_points.len();
        self.data_points
            .retain(|point| !point.id.as_deref().is_some_and(|id| ids.contains(id)));
        before - self.data_points.len()
    }

    /// Convert into training examples, keeping the file order.
    pub fn into_examples(self) -> Vec<TrainingExample> {
        self.data_points
            .into_iter()
            .map(|point| TrainingExample {
                text: point.sentence,
                entities: point
                    .entities
                    .into_iter()
                    .map(|e| (e.start, e.end, e.label))
                    .collect(),
            })
            .collect()
    }
}

/// Load training examples from a file in one step.
pub fn load_examples(path: impl AsRef<Path>) -> Result<Vec<TrainingExample>> {
    Ok(TrainingData::from_file(path)?.into_examples())
}
