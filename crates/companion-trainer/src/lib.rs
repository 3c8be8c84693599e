//! # Companion Trainer
//!
//! Trains the entity recognizer from the YAML training configuration and
//! writes the result as a versioned model directory. Training is exposed as
//! a lazy iterator so callers can stream progress while it runs.

pub mod trainer;

pub use trainer::{MODEL_NAME, Progress, Trainer, TrainingRun, run_training};
