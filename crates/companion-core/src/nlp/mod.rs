pub mod bio_tags;
pub mod doc;
pub mod language;
pub mod pipeline;
pub mod tokenizer;
pub mod viterbi;

pub use bio_tags::{BioTag, LabelSet};
pub use doc::{Doc, Span};
pub use language::{Language, ModelMeta, SelectedPipes};
pub use pipeline::{Pipe, Pipeline};
pub use tokenizer::{Token, Tokenizer};
pub use viterbi::ViterbiDecoder;
