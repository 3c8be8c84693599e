//! # Companion Core
//!
//! The NLP engine behind the companion NER service: a rule-based tokenizer,
//! a [`Language`] object holding a pipeline of named stages, and a trainable
//! [`EntityRecognizer`] stage (a candle network with CRF transitions over
//! BIO tags, decoded with constrained Viterbi). Also loads the YAML training
//! configuration and manages the JSON training data.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use companion_core::{EntityRecognizer, Language, TrainingExample};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut nlp = Language::blank("en").unwrap();
//! nlp.add_pipe(EntityRecognizer::new()).unwrap();
//! nlp.get_pipe_mut::<EntityRecognizer>("ner").unwrap().add_label("LOC");
//!
//! let example = TrainingExample::new("Paris is nice", vec![(0, 5, "LOC".to_string())]);
//! let mut rng = StdRng::seed_from_u64(0);
//! nlp.begin_training(std::slice::from_ref(&example), &mut rng).unwrap();
//! for _ in 0..20 {
//!     let mut losses = BTreeMap::new();
//!     nlp.update(&example, 0.0, &mut losses).unwrap();
//! }
//!
//! let doc = nlp.process("Paris is nice");
//! assert_eq!(doc.entity_map()["LOC"], "Paris");
//! ```
pub mod config;
pub mod data;
pub mod error;
pub mod labels;
pub mod ner;
pub mod nlp;

// Re-export primary API
pub use config::{DEFAULT_CONFIG_PATH, MAX_ITERATIONS, TrainingConfig, model_dir};
pub use data::{
    DataPoint, DataPointIds, EntityAnnotation, TrainingData, TrainingExample, data_point_id,
    load_examples,
};
pub use error::{CompanionError, Result};
pub use labels::{LABELS_FILE, LabelList, labels_path};
pub use ner::{EntityRecognizer, FeatureVocab, NerModel};
pub use nlp::{BioTag, Doc, Language, ModelMeta, Pipe, Span, Tokenizer};
