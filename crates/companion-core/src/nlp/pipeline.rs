//! # Processing Pipeline
//!
//! Named stages applied in order to every [`Doc`]. Stages can be switched
//! off temporarily, which training uses to confine updates to one stage.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use rand::rngs::StdRng;

use crate::data::TrainingExample;
use crate::error::{CompanionError, Result};
use crate::nlp::doc::Doc;

/// A stage of the processing pipeline.
pub trait Pipe: Any + Send + Sync + fmt::Debug {
    /// Stage name; also the name of its directory inside a saved model.
    fn name(&self) -> &'static str;

    /// Annotate a document.
    fn process(&self, doc: &mut Doc);

    /// Size and initialise the stage's weights from the training documents.
    /// Called once, before the first update.
    fn begin_training(&mut self, _docs: &[Doc], _rng: &mut StdRng) -> Result<()> {
        Ok(())
    }

    /// Learn from one annotated example, returning the loss.
    ///
    /// Stages without parameters keep the default, which learns nothing.
    fn update(&mut self, _doc: &Doc, _example: &TrainingExample, _drop: f32) -> Result<f32> {
        Ok(0.0)
    }

    /// Labels this stage predicts, recorded in the model meta.
    fn labels(&self) -> Vec<String> {
        Vec::new()
    }

    /// Persist the stage into `dir`.
    fn to_disk(&self, dir: &Path) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Ordered collection of pipeline stages.
#[derive(Debug, Default)]
pub struct Pipeline {
    pipes: Vec<Box<dyn Pipe>>,
    disabled: HashSet<&'static str>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. Names must be unique.
    pub fn add(&mut self, pipe: Box<dyn Pipe>) -> Result<()> {
        if self.contains(pipe.name()) {
            return Err(CompanionError::DuplicatePipe(pipe.name().to_string()));
        }
        tracing::debug!(pipe = pipe.name(), "added pipeline stage");
        self.pipes.push(pipe);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipes.iter().any(|p| p.name() == name)
    }

    /// Names of all stages, enabled or not, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.pipes.iter().map(|p| p.name()).collect()
    }

    /// Names of the stages that currently run.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.enabled().map(|p| p.name()).collect()
    }

    fn enabled(&self) -> impl Iterator<Item = &Box<dyn Pipe>> {
        self.pipes
            .iter()
            .filter(|p| !self.disabled.contains(p.name()))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Pipe> {
        self.pipes
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Pipe + 'static)> {
        self.pipes
            .iter_mut()
            .find(|p| p.name() == name)
            .map(|p| p.as_mut())
    }

    /// Run every enabled stage over `doc`.
    pub fn process(&self, doc: &mut Doc) {
        for pipe in self.enabled() {
            pipe.process(doc);
        }
    }

    /// Update every enabled stage on one example, adding each loss under the
    /// stage's name.
    pub fn update(
        &mut self,
        doc: &Doc,
        example: &TrainingExample,
        drop: f32,
        losses: &mut BTreeMap<String, f32>,
    ) -> Result<()> {
        for pipe in self.pipes.iter_mut() {
            if self.disabled.contains(pipe.name()) {
                continue;
            }
            let loss = pipe.update(doc, example, drop)?;
            *losses.entry(pipe.name().to_string()).or_insert(0.0) += loss;
        }
        Ok(())
    }

    /// Prepare every stage for training on `docs`.
    pub fn begin_training(&mut self, docs: &[Doc], rng: &mut StdRng) -> Result<()> {
        for pipe in self.pipes.iter_mut() {
            pipe.begin_training(docs, rng)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Pipe> {
        self.pipes.iter().map(|p| p.as_ref())
    }

    /// Disable every stage not named in `enable`, returning the names that
    /// were switched off.
    pub(crate) fn disable_except(&mut self, enable: &[&str]) -> Result<Vec<&'static str>> {
        if let Some(missing) = enable.iter().find(|name| !self.contains(name)) {
            return Err(CompanionError::MissingPipe(missing.to_string()));
        }

        let switched: Vec<&'static str> = self
            .pipes
            .iter()
            .map(|p| p.name())
            .filter(|name| !enable.contains(name) && !self.disabled.contains(name))
            .collect();
        self.disabled.extend(switched.iter().copied());
        Ok(switched)
    }

    pub(crate) fn enable(&mut self, names: &[&'static str]) {
        for name in names {
            self.disabled.remove(name);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::nlp::tokenizer::Tokenizer;

    /// Stage that counts the updates it received.
    #[derive(Debug, Default)]
    pub(crate) struct CountingPipe {
        pub name: &'static str,
        pub updates: usize,
    }

    impl Pipe for CountingPipe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process(&self, _doc: &mut Doc) {}

        fn update(&mut self, _doc: &Doc, _example: &TrainingExample, _drop: f32) -> Result<f32> {
            self.updates += 1;
            Ok(1.0)
        }

        fn to_disk(&self, _dir: &Path) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn counting(name: &'static str) -> Box<dyn Pipe> {
        Box::new(CountingPipe { name, updates: 0 })
    }

    fn updates(pipeline: &Pipeline, name: &str) -> usize {
        pipeline
            .get(name)
            .and_then(|p| p.as_any().downcast_ref::<CountingPipe>())
            .map(|p| p.updates)
            .unwrap_or_default()
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut pipeline = Pipeline::new();
        pipeline.add(counting("a")).unwrap();
        assert!(matches!(
            pipeline.add(counting("a")),
            Err(CompanionError::DuplicatePipe(_))
        ));
        assert_eq!(pipeline.names(), ["a"]);
    }

    #[test]
    fn disabled_stages_are_not_updated() {
        let mut pipeline = Pipeline::new();
        pipeline.add(counting("a")).unwrap();
        pipeline.add(counting("b")).unwrap();

        let switched = pipeline.disable_except(&["b"]).unwrap();
        assert_eq!(switched, ["a"]);
        assert_eq!(pipeline.enabled_names(), ["b"]);

        let text = "x y";
        let doc = Doc::new(text, Tokenizer::new().tokenize(text));
        let example = TrainingExample::new(text, Vec::new());
        let mut losses = BTreeMap::new();
        pipeline.update(&doc, &example, 0.0, &mut losses).unwrap();

        assert_eq!(updates(&pipeline, "a"), 0);
        assert_eq!(updates(&pipeline, "b"), 1);
        assert_eq!(losses.get("b"), Some(&1.0));
        assert!(!losses.contains_key("a"));

        pipeline.enable(&switched);
        assert_eq!(pipeline.enabled_names(), ["a", "b"]);
    }

    #[test]
    fn disabling_unknown_stage_fails() {
        let mut pipeline = Pipeline::new();
        pipeline.add(counting("a")).unwrap();
        assert!(matches!(
            pipeline.disable_except(&["ner"]),
            Err(CompanionError::MissingPipe(_))
        ));
    }
}
