//! Shared application state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use companion_core::{Language, labels_path, model_dir};
use tokio::sync::Mutex;

use crate::error::ServiceError;

/// A model ready to serve predictions.
#[derive(Debug)]
pub struct LoadedModel {
    pub version: String,
    pub nlp: Language,
}

/// State shared by every handler.
///
/// The loaded model is swapped as a whole. Handlers clone the `Arc` and
/// release the lock before running the model. Edits of the training-data
/// and label files are serialized by `files`.
#[derive(Debug)]
pub struct AppState {
    config_path: PathBuf,
    model_root: PathBuf,
    model: RwLock<Option<Arc<LoadedModel>>>,
    training: AtomicBool,
    files: Mutex<()>,
}

impl AppState {
    pub fn new(config_path: impl Into<PathBuf>, model_root: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            model_root: model_root.into(),
            model: RwLock::new(None),
            training: AtomicBool::new(false),
            files: Mutex::new(()),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn model_root(&self) -> &Path {
        &self.model_root
    }

    pub fn labels_path(&self) -> PathBuf {
        labels_path(&self.config_path)
    }

    /// Hold while reading-modifying-writing the data or label file.
    pub async fn lock_files(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.files.lock().await
    }

    /// Directory holding the model saved as `version`.
    ///
    /// Versions that would leave the model root are rejected.
    pub fn model_dir(&self, version: &str) -> Result<PathBuf, ServiceError> {
        if version.is_empty() || version.contains(['/', '\\']) || version.contains("..") {
            return Err(ServiceError::InvalidInput(format!(
                "unusable model version {version:?}"
            )));
        }
        Ok(model_dir(&self.model_root, version))
    }

    pub fn current_model(&self) -> Option<Arc<LoadedModel>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the loaded model, returning the previous one.
    pub fn swap_model(&self, model: LoadedModel) -> Option<Arc<LoadedModel>> {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(Arc::new(model))
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Acquire)
    }

    /// Claim the single training slot.
    pub fn begin_training(self: &Arc<Self>) -> Result<TrainingGuard, ServiceError> {
        self.training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ServiceError::TrainingInProgress)?;
        Ok(TrainingGuard {
            state: Arc::clone(self),
        })
    }
}

/// Holds the training slot until dropped.
#[derive(Debug)]
pub struct TrainingGuard {
    state: Arc<AppState>,
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.state.training.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_slot_is_exclusive() {
        let state = Arc::new(AppState::new("config.yml", "/tmp"));
        let guard = state.begin_training().unwrap();
        assert!(state.is_training());
        assert!(matches!(
            state.begin_training(),
            Err(ServiceError::TrainingInProgress)
        ));

        drop(guard);
        assert!(!state.is_training());
        assert!(state.begin_training().is_ok());
    }

    #[test]
    fn swap_replaces_model() {
        let state = AppState::new("config.yml", "/tmp");
        assert!(state.current_model().is_none());

        let first = LoadedModel {
            version: "1".into(),
            nlp: Language::blank("en").unwrap(),
        };
        assert!(state.swap_model(first).is_none());

        let held = state.current_model().unwrap();
        let second = LoadedModel {
            version: "2".into(),
            nlp: Language::blank("en").unwrap(),
        };
        let previous = state.swap_model(second).unwrap();

        assert_eq!(previous.version, "1");
        assert_eq!(held.version, "1");
        assert_eq!(state.current_model().unwrap().version, "2");
    }

    #[test]
    fn labels_live_next_to_config() {
        let state = AppState::new("/mnt/data/config.yml", "/mnt");
        assert_eq!(state.labels_path(), PathBuf::from("/mnt/data/labels.json"));
    }

    #[test]
    fn model_dir_rejects_traversal() {
        let state = AppState::new("config.yml", "/mnt");
        assert_eq!(state.model_dir("3").unwrap(), PathBuf::from("/mnt/model-3"));
        assert!(state.model_dir("../etc").is_err());
        assert!(state.model_dir("a/b").is_err());
        assert!(state.model_dir("").is_err());
    }
}
