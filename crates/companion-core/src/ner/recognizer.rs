//! # Entity Recognizer
//!
//! The trainable `ner` pipeline stage: turns character-offset annotations
//! into BIO tags, trains the candle scoring network on them and decodes new
//! sentences with constrained Viterbi.

use std::any::Any;
use std::path::Path;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::data::TrainingExample;
use crate::error::{CompanionError, Result};
use crate::ner::features::{FeatureVocab, sentence_features};
use crate::ner::model::{HIDDEN_SIZE, NerModel};
use crate::nlp::bio_tags::{BioTag, LabelSet, spans_from_tags};
use crate::nlp::doc::{Doc, Span};
use crate::nlp::pipeline::Pipe;
use crate::nlp::tokenizer::Token;
use crate::nlp::viterbi::ViterbiDecoder;

/// Labels, vocabulary and layer sizes inside the stage directory.
const CONFIG_FILE: &str = "cfg.json";

/// Network weights inside the stage directory.
const WEIGHTS_FILE: &str = "model.safetensors";

/// Named entity recognizer pipeline stage.
///
/// Until [`Pipe::begin_training`] runs (or weights are loaded) there is no
/// network and every token is tagged `O`.
#[derive(Debug)]
pub struct EntityRecognizer {
    labels: LabelSet,
    vocab: FeatureVocab,
    model: Option<NerModel>,
    decoder: ViterbiDecoder,
}

#[derive(Serialize, Deserialize)]
struct RecognizerConfig {
    labels: Vec<String>,
    hidden_size: usize,
    features: FeatureVocab,
}

impl EntityRecognizer {
    pub const NAME: &'static str = "ner";

    pub fn new() -> Self {
        let labels = LabelSet::new();
        Self {
            vocab: FeatureVocab::default(),
            model: None,
            decoder: ViterbiDecoder::new(labels.num_tags()),
            labels,
        }
    }

    /// Register an entity label. Labels must be known before
    /// [`Pipe::begin_training`]; adding one afterwards discards the network.
    pub fn add_label(&mut self, label: &str) -> usize {
        let before = self.labels.len();
        let idx = self.labels.add(label);
        if self.labels.len() != before {
            tracing::debug!(label, "added entity label");
            self.decoder = ViterbiDecoder::new(self.labels.num_tags());
            if self.model.take().is_some() {
                tracing::warn!(label, "label added after training began, network discarded");
            }
        }
        idx
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Whether the stage has a network to score with.
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Gold BIO tags for `tokens` from character-offset annotations.
    ///
    /// Every token overlapping an entity is part of it, so spans that cut a
    /// token in half are widened to whole tokens.
    pub fn gold_tags(
        &self,
        text: &str,
        tokens: &[Token],
        entities: &[(usize, usize, String)],
    ) -> Result<Vec<BioTag>> {
        let len = text.chars().count();
        let mut tags = vec![BioTag::Outside; tokens.len()];
        let mut claimed = vec![false; tokens.len()];

        for (start, end, label) in entities {
            let (start, end) = (*start, *end);
            if start >= end || end > len {
                return Err(CompanionError::InvalidSpan { start, end, len });
            }
            let label_idx = self
                .labels
                .position(label)
                .ok_or_else(|| CompanionError::UnknownLabel(label.clone()))?;

            let mut first = true;
            for token in tokens.iter().filter(|t| t.start < end && t.end > start) {
                if claimed[token.index] {
                    return Err(CompanionError::OverlappingSpans {
                        token: token.index,
                        sentence: text.to_string(),
                    });
                }
                claimed[token.index] = true;
                tags[token.index] = if first {
                    BioTag::Begin(label_idx)
                } else {
                    BioTag::Inside(label_idx)
                };
                first = false;
            }

            if first {
                tracing::warn!(start, end, label = %label, "entity span covers no token");
            }
        }

        Ok(tags)
    }

    /// Most likely tag sequence for `tokens`.
    pub fn predict_tags(&self, tokens: &[Token]) -> Vec<BioTag> {
        let outside = || vec![BioTag::Outside; tokens.len()];
        let Some(model) = self.model.as_ref().filter(|_| !self.labels.is_empty()) else {
            return outside();
        };

        let ids = self.vocab.lookup(&sentence_features(tokens));
        let scores = model
            .emissions(&ids)
            .and_then(|emissions| Ok((emissions, model.transitions()?)));
        match scores {
            Ok((emissions, transitions)) => self.decoder.decode(&emissions, &transitions),
            Err(err) => {
                tracing::error!(error = %err, "entity scoring failed");
                outside()
            }
        }
    }

    /// Restore a recognizer saved with [`Pipe::to_disk`].
    pub fn from_disk(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| CompanionError::io(&path, e))?;
        let config: RecognizerConfig = serde_json::from_str(&raw)?;
        if config.hidden_size != HIDDEN_SIZE {
            return Err(CompanionError::ModelLoad(format!(
                "{} has hidden size {}, expected {HIDDEN_SIZE}",
                path.display(),
                config.hidden_size
            )));
        }

        let labels = LabelSet::from_labels(config.labels);
        let weights = dir.join(WEIGHTS_FILE);
        let model = if weights.exists() {
            let mut model = NerModel::new(config.features.len(), labels.num_tags())?;
            model.load(&weights).map_err(|e| {
                CompanionError::ModelLoad(format!(
                    "{} does not match {}: {e}",
                    weights.display(),
                    path.display()
                ))
            })?;
            Some(model)
        } else {
            None
        };

        Ok(Self {
            decoder: ViterbiDecoder::new(labels.num_tags()),
            labels,
            vocab: config.features,
            model,
        })
    }
}

impl Default for EntityRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for EntityRecognizer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&self, doc: &mut Doc) {
        let tags = self.predict_tags(doc.tokens());
        let ents = spans_from_tags(&tags)
            .into_iter()
            .filter_map(|span| {
                let label = self.labels.name(span.label)?.to_string();
                let tokens = doc.tokens();
                Some(Span {
                    label,
                    text: doc.span_text(span.start_token, span.end_token),
                    start: tokens[span.start_token].start,
                    end: tokens[span.end_token - 1].end,
                    start_token: span.start_token,
                    end_token: span.end_token,
                })
            })
            .collect();
        doc.ents = ents;
    }

    fn begin_training(&mut self, docs: &[Doc], rng: &mut StdRng) -> Result<()> {
        let features: Vec<_> = docs.iter().map(|d| sentence_features(d.tokens())).collect();
        self.vocab = FeatureVocab::build(features.iter().map(Vec::as_slice));

        let mut model = NerModel::new(self.vocab.len(), self.labels.num_tags())?;
        model.init_weights(rng)?;
        tracing::info!(
            features = self.vocab.len(),
            tags = model.num_tags(),
            "initialised entity recognizer"
        );
        self.model = Some(model);
        Ok(())
    }

    fn update(&mut self, doc: &Doc, example: &TrainingExample, drop: f32) -> Result<f32> {
        let gold = self.gold_tags(doc.text(), doc.tokens(), &example.entities)?;
        if gold.is_empty() {
            return Ok(0.0);
        }

        let ids = self.vocab.lookup(&sentence_features(doc.tokens()));
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| CompanionError::NotInitialized(Self::NAME.to_string()))?;

        let gold: Vec<usize> = gold.iter().map(BioTag::index).collect();
        let loss = model.step(&ids, &gold, drop)?;
        tracing::trace!(loss, tokens = gold.len(), "ner update");
        Ok(loss)
    }

    fn labels(&self) -> Vec<String> {
        self.labels.iter().map(str::to_string).collect()
    }

    fn to_disk(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| CompanionError::io(dir, e))?;
        let config = RecognizerConfig {
            labels: Pipe::labels(self),
            hidden_size: HIDDEN_SIZE,
            features: self.vocab.clone(),
        };
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, serde_json::to_vec(&config)?)
            .map_err(|e| CompanionError::io(&path, e))?;

        if let Some(model) = &self.model {
            model.save(&dir.join(WEIGHTS_FILE))?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
