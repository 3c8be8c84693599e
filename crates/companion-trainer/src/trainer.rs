//! Training loop for the entity recognizer.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use companion_core::{
    EntityRecognizer, LabelList, Language, Result, TrainingConfig, TrainingExample, labels_path,
    load_examples,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Name stamped into the meta of every trained model.
pub const MODEL_NAME: &str = "companionAI-ner";

/// Progress report emitted after each pass over the training data.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 1-based pass number
    pub iteration: usize,
    pub total: usize,
    /// Summed loss per pipeline stage for this pass
    pub losses: BTreeMap<String, f32>,
}

impl Progress {
    pub fn is_last(&self) -> bool {
        self.iteration == self.total
    }
}

impl fmt::Display for Progress {
    /// `iterations: 1/2 {'ner': 3.0}`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iterations: {}/{} {{", self.iteration, self.total)?;
        for (i, (name, loss)) in self.losses.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{name}': {loss:?}")?;
        }
        write!(f, "}}")
    }
}

/// Builds training runs from one configuration.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    model_root: PathBuf,
    seed: Option<u64>,
    labels: Vec<String>,
}

impl Trainer {
    /// Trained models are written to `<model_root>/model-<currentVersion>`.
    pub fn new(config: TrainingConfig, model_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            model_root: model_root.into(),
            seed: None,
            labels: Vec::new(),
        }
    }

    /// Labels to register even when no example uses them.
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Fix the seed used for weight initialisation and shuffling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.output_dir(&self.model_root)
    }

    /// Load the examples named by the configuration.
    pub fn load_examples(&self) -> Result<Vec<TrainingExample>> {
        load_examples(&self.config.training_data)
    }

    /// Prepare a blank model for `examples` and return the lazy run.
    ///
    /// Every entity label found in the examples is registered and the
    /// network is sized to the examples' features before the first update.
    /// Nothing is trained until the run is iterated.
    pub fn train(&self, examples: Vec<TrainingExample>) -> Result<TrainingRun> {
        self.config.validate()?;

        let mut nlp = Language::blank(&self.config.model_language)?;
        nlp.add_pipe(EntityRecognizer::new())?;

        if let Some(ner) = nlp.get_pipe_mut::<EntityRecognizer>(EntityRecognizer::NAME) {
            for (_, _, label) in examples.iter().flat_map(|e| &e.entities) {
                ner.add_label(label);
            }
            for label in &self.labels {
                ner.add_label(label);
            }
            tracing::info!(labels = ?ner.labels(), examples = examples.len(), "prepared entity recognizer");
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        nlp.begin_training(&examples, &mut rng)?;

        Ok(TrainingRun {
            nlp,
            examples,
            rng,
            iteration: 0,
            n_iter: self.config.n_iter,
            drop: self.config.drop,
            version: self.config.current_version.clone(),
            output_dir: self.output_dir(),
            done: false,
        })
    }
}

/// A training run in progress.
///
/// Yields one [`Progress`] per pass, `n_iter` in total. The pass that ends
/// the run also writes the model; if that fails the error takes the place
/// of its progress report. Any error ends the run.
pub struct TrainingRun {
    nlp: Language,
    examples: Vec<TrainingExample>,
    rng: StdRng,
    iteration: usize,
    n_iter: usize,
    drop: f32,
    version: String,
    output_dir: PathBuf,
    done: bool,
}

impl TrainingRun {
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn total(&self) -> usize {
        self.n_iter
    }

    fn pass(&mut self) -> Result<BTreeMap<String, f32>> {
        self.examples.shuffle(&mut self.rng);

        let mut losses = BTreeMap::new();
        // Only the recognizer learns.
        let mut nlp = self.nlp.select_pipes(&[EntityRecognizer::NAME])?;
        for (step, example) in self.examples.iter().enumerate() {
            nlp.update(example, self.drop, &mut losses)?;
            tracing::debug!(step, "updated on example");
        }
        Ok(losses)
    }

    fn save(&mut self) -> Result<()> {
        let meta = self.nlp.meta_mut();
        meta.name = MODEL_NAME.to_string();
        meta.version = Some(self.version.clone());
        self.nlp.to_disk(&self.output_dir)
    }
}

impl Iterator for TrainingRun {
    type Item = Result<Progress>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.iteration >= self.n_iter {
            return None;
        }

        let losses = match self.pass() {
            Ok(losses) => losses,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        self.iteration += 1;

        let progress = Progress {
            iteration: self.iteration,
            total: self.n_iter,
            losses,
        };
        tracing::info!(%progress, "finished training pass");

        if progress.is_last() {
            self.done = true;
            if let Err(err) = self.save() {
                return Some(Err(err));
            }
        }

        Some(Ok(progress))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done {
            0
        } else {
            self.n_iter - self.iteration
        };
        (0, Some(remaining))
    }
}

/// Load the configuration and its training data, then train to completion,
/// handing each progress report to `on_progress`.
pub fn run_training(
    config_path: impl AsRef<Path>,
    model_root: impl AsRef<Path>,
    mut on_progress: impl FnMut(&Progress),
) -> anyhow::Result<PathBuf> {
    use anyhow::Context;

    let config_path = config_path.as_ref();
    let config = TrainingConfig::from_file(config_path)
        .with_context(|| format!("reading config {}", config_path.display()))?;
    let labels = LabelList::from_file(labels_path(config_path))
        .with_context(|| format!("reading labels next to {}", config_path.display()))?;
    let trainer = Trainer::new(config, model_root.as_ref()).with_labels(labels.labels);

    let examples = trainer.load_examples().with_context(|| {
        format!(
            "reading training data {}",
            trainer.config().training_data.display()
        )
    })?;

    for progress in trainer.train(examples)? {
        on_progress(&progress?);
    }

    Ok(trainer.output_dir())
}
