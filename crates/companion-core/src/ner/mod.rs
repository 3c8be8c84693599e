//! Trainable named entity recognition stage.

pub mod features;
pub mod model;
pub mod recognizer;

pub use features::FeatureVocab;
pub use model::NerModel;
pub use recognizer::EntityRecognizer;
