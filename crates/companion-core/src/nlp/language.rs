//! # Language
//!
//! A model scoped to one language: the tokenizer, the processing pipeline
//! and the metadata that travels with a saved model directory.
//!
//! ## Layout on disk
//!
//! ```text
//! model-<version>/
//!   meta.json               language, name, version, stage names, labels
//!   ner/cfg.json            entity labels and feature vocabulary
//!   ner/model.safetensors   network weights, once trained
//! ```

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::data::TrainingExample;
use crate::error::{CompanionError, Result};
use crate::ner::EntityRecognizer;
use crate::nlp::doc::Doc;
use crate::nlp::pipeline::{Pipe, Pipeline};
use crate::nlp::tokenizer::Tokenizer;

const META_FILE: &str = "meta.json";

/// Metadata saved next to the pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub lang: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub pipeline: Vec<String>,
    /// Labels per stage name.
    #[serde(default)]
    pub labels: BTreeMap<String, Vec<String>>,
}

/// A language model: tokenizer plus pipeline.
#[derive(Debug)]
pub struct Language {
    tokenizer: Tokenizer,
    pipeline: Pipeline,
    meta: ModelMeta,
}

impl Language {
    /// A blank model with no pipeline stages.
    ///
    /// The language code must be two or three ASCII letters (`en`, `de`,
    /// `xx` for multi-language).
    pub fn blank(lang: &str) -> Result<Self> {
        let code = lang.trim().to_ascii_lowercase();
        if !(2..=3).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(CompanionError::InvalidLanguage(lang.to_string()));
        }

        tracing::info!(lang = %code, "created blank model");
        Ok(Self {
            tokenizer: Tokenizer::new(),
            pipeline: Pipeline::new(),
            meta: ModelMeta {
                lang: code,
                name: "pipeline".into(),
                ..ModelMeta::default()
            },
        })
    }

    pub fn lang(&self) -> &str {
        &self.meta.lang
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut ModelMeta {
        &mut self.meta
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Append a stage to the end of the pipeline.
    pub fn add_pipe(&mut self, pipe: impl Pipe) -> Result<()> {
        self.pipeline.add(Box::new(pipe))
    }

    pub fn pipe_names(&self) -> Vec<&'static str> {
        self.pipeline.names()
    }

    /// Borrow a stage by name as its concrete type.
    pub fn get_pipe<T: Pipe>(&self, name: &str) -> Option<&T> {
        self.pipeline.get(name)?.as_any().downcast_ref()
    }

    /// Mutably borrow a stage by name as its concrete type.
    pub fn get_pipe_mut<T: Pipe>(&mut self, name: &str) -> Option<&mut T> {
        self.pipeline.get_mut(name)?.as_any_mut().downcast_mut()
    }

    /// Keep only the named stages enabled until the guard is dropped.
    pub fn select_pipes(&mut self, enable: &[&str]) -> Result<SelectedPipes<'_>> {
        let disabled = self.pipeline.disable_except(enable)?;
        tracing::debug!(?disabled, "disabled pipeline stages");
        Ok(SelectedPipes {
            nlp: self,
            disabled,
        })
    }

    /// Tokenize without running the pipeline.
    pub fn make_doc(&self, text: &str) -> Doc {
        Doc::new(text, self.tokenizer.tokenize(text))
    }

    /// Tokenize and run every enabled stage.
    pub fn process(&self, text: &str) -> Doc {
        let mut doc = self.make_doc(text);
        self.pipeline.process(&mut doc);
        doc
    }

    /// Initialise every stage for training on `examples`.
    pub fn begin_training(&mut self, examples: &[TrainingExample], rng: &mut StdRng) -> Result<()> {
        let docs: Vec<Doc> = examples.iter().map(|e| self.make_doc(&e.text)).collect();
        self.pipeline.begin_training(&docs, rng)
    }

    /// Update the enabled stages on a single example, adding to `losses`.
    pub fn update(
        &mut self,
        example: &TrainingExample,
        drop: f32,
        losses: &mut BTreeMap<String, f32>,
    ) -> Result<()> {
        let doc = self.make_doc(&example.text);
        self.pipeline.update(&doc, example, drop, losses)
    }

    /// Save the model into `dir`, creating it if needed.
    pub fn to_disk(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| CompanionError::io(dir, e))?;

        let mut meta = self.meta.clone();
        meta.pipeline = self.pipeline.names().iter().map(|n| n.to_string()).collect();
        meta.labels = self
            .pipeline
            .iter()
            .map(|p| (p.name().to_string(), p.labels()))
            .filter(|(_, labels)| !labels.is_empty())
            .collect();

        for pipe in self.pipeline.iter() {
            pipe.to_disk(&dir.join(pipe.name()))?;
        }

        let path = dir.join(META_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&meta)?)
            .map_err(|e| CompanionError::io(&path, e))?;

        tracing::info!(dir = %dir.display(), pipeline = ?meta.pipeline, "saved model");
        Ok(())
    }

    /// Load a model saved with [`Language::to_disk`].
    pub fn from_disk(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(META_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| CompanionError::io(&path, e))?;
        let meta: ModelMeta = serde_json::from_str(&raw)?;

        let mut nlp = Self::blank(&meta.lang)?;
        for name in &meta.pipeline {
            match name.as_str() {
                EntityRecognizer::NAME => {
                    nlp.add_pipe(EntityRecognizer::from_disk(&dir.join(name))?)?
                }
                other => {
                    return Err(CompanionError::ModelLoad(format!(
                        "unknown pipeline stage {other:?} in {}",
                        path.display()
                    )));
                }
            }
        }
        nlp.meta = meta;

        tracing::info!(dir = %dir.display(), name = %nlp.meta.name, "loaded model");
        Ok(nlp)
    }
}

/// Guard returned by [`Language::select_pipes`]; re-enables the stages it
/// switched off when dropped.
pub struct SelectedPipes<'a> {
    nlp: &'a mut Language,
    disabled: Vec<&'static str>,
}

impl Deref for SelectedPipes<'_> {
    type Target = Language;

    fn deref(&self) -> &Language {
        self.nlp
    }
}

impl DerefMut for SelectedPipes<'_> {
    fn deref_mut(&mut self) -> &mut Language {
        self.nlp
    }
}

impl Drop for SelectedPipes<'_> {
    fn drop(&mut self) {
        self.nlp.pipeline.enable(&self.disabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::pipeline::tests::CountingPipe;
    use rand::SeedableRng;

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("companion-lang-{tag}-{}", std::process::id()))
    }

    #[test]
    fn blank_validates_language() {
        assert_eq!(Language::blank("en").unwrap().lang(), "en");
        assert_eq!(Language::blank(" DE ").unwrap().lang(), "de");
        assert!(matches!(
            Language::blank(""),
            Err(CompanionError::InvalidLanguage(_))
        ));
        assert!(Language::blank("english").is_err());
        assert!(Language::blank("e1").is_err());
    }

    #[test]
    fn blank_model_finds_nothing() {
        let nlp = Language::blank("en").unwrap();
        let doc = nlp.process("Paris is nice");
        assert_eq!(doc.len(), 3);
        assert!(doc.ents.is_empty());
    }

    #[test]
    fn get_pipe_downcasts() {
        let mut nlp = Language::blank("en").unwrap();
        nlp.add_pipe(EntityRecognizer::new()).unwrap();

        let ner = nlp.get_pipe_mut::<EntityRecognizer>("ner").unwrap();
        ner.add_label("LOC");

        assert_eq!(nlp.get_pipe::<EntityRecognizer>("ner").unwrap().labels().len(), 1);
        assert!(nlp.get_pipe::<CountingPipe>("ner").is_none());
        assert!(nlp.get_pipe::<EntityRecognizer>("tagger").is_none());
    }

    #[test]
    fn select_pipes_restores_on_drop() {
        let mut nlp = Language::blank("en").unwrap();
        nlp.add_pipe(CountingPipe {
            name: "counter",
            updates: 0,
        })
        .unwrap();
        nlp.add_pipe(EntityRecognizer::new()).unwrap();
        let example = TrainingExample::new("Paris", Vec::new());
        nlp.begin_training(std::slice::from_ref(&example), &mut StdRng::seed_from_u64(3))
            .unwrap();

        {
            let mut selected = nlp.select_pipes(&["ner"]).unwrap();
            assert_eq!(selected.pipeline().enabled_names(), ["ner"]);

            let mut losses = BTreeMap::new();
            selected.update(&example, 0.0, &mut losses).unwrap();
            assert!(losses.contains_key("ner"));
            assert!(!losses.contains_key("counter"));
        }

        assert_eq!(nlp.pipeline().enabled_names(), ["counter", "ner"]);
        assert_eq!(nlp.get_pipe::<CountingPipe>("counter").unwrap().updates, 0);
    }

    #[test]
    fn disk_roundtrip_keeps_meta() {
        let mut nlp = Language::blank("en").unwrap();
        let mut ner = EntityRecognizer::new();
        ner.add_label("LOC");
        nlp.add_pipe(ner).unwrap();
        nlp.meta_mut().name = "companionAI-ner".into();
        nlp.meta_mut().version = Some("3".into());

        let dir = temp_dir("roundtrip");
        nlp.to_disk(&dir).unwrap();
        let loaded = Language::from_disk(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(loaded.lang(), "en");
        assert_eq!(loaded.meta().name, "companionAI-ner");
        assert_eq!(loaded.meta().version.as_deref(), Some("3"));
        assert_eq!(loaded.pipe_names(), ["ner"]);
        assert_eq!(loaded.meta().labels["ner"], ["LOC"]);
    }

    #[test]
    fn from_disk_missing_dir_fails() {
        assert!(matches!(
            Language::from_disk(temp_dir("missing")),
            Err(CompanionError::Io { .. })
        ));
    }

    #[test]
    fn from_disk_rejects_corrupt_meta() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(META_FILE), "{not json").unwrap();

        let result = Language::from_disk(&dir);
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(result, Err(CompanionError::Json(_))));
    }

    #[test]
    fn from_disk_rejects_unknown_stage() {
        let dir = temp_dir("unknown");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(META_FILE),
            r#"{"lang": "en", "name": "x", "pipeline": ["parser"]}"#,
        )
        .unwrap();

        let result = Language::from_disk(&dir);
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(result, Err(CompanionError::ModelLoad(_))));
    }
}
