//! Token features for the entity recognizer.
//!
//! Each token is described by a bag of string features built from its own
//! form and from its immediate neighbours. A [`FeatureVocab`] fixed before
//! training maps them to embedding rows.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::nlp::tokenizer::Token;

/// Word shape with repeated classes collapsed: `Paris` → `Xx`, `A320` → `Xd`.
pub fn shape(text: &str) -> String {
    let mut shape = String::new();
    for c in text.chars() {
        let class = if c.is_uppercase() {
            'X'
        } else if c.is_lowercase() {
            'x'
        } else if c.is_numeric() {
            'd'
        } else {
            c
        };
        if !shape.ends_with(class) {
            shape.push(class);
        }
    }
    shape
}

fn prefix(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn suffix(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}

fn is_title(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(char::is_uppercase) && chars.all(|c| !c.is_uppercase())
}

/// Features of the token at `i`.
pub fn token_features(tokens: &[Token], i: usize) -> Vec<String> {
    let token = &tokens[i];
    let lower = token.norm();

    let mut features = vec![
        "bias".to_string(),
        format!("w={lower}"),
        format!("pre3={}", prefix(&lower, 3)),
        format!("suf3={}", suffix(&lower, 3)),
        format!("shape={}", shape(&token.text)),
    ];

    if is_title(&token.text) {
        features.push("is_title".into());
    }
    if token.text.chars().any(char::is_alphabetic)
        && token.text.chars().all(|c| !c.is_alphabetic() || c.is_uppercase())
    {
        features.push("is_upper".into());
    }
    if token.text.chars().any(|c| c.is_ascii_digit()) {
        features.push("has_digit".into());
    }
    if i == 0 {
        features.push("first".into());
    }

    // Context features
    match i.checked_sub(1).map(|p| &tokens[p]) {
        Some(prev) => {
            features.push(format!("w-1={}", prev.norm()));
            features.push(format!("shape-1={}", shape(&prev.text)));
        }
        None => features.push("w-1=<s>".into()),
    }
    match tokens.get(i + 1) {
        Some(next) => {
            features.push(format!("w+1={}", next.norm()));
            features.push(format!("shape+1={}", shape(&next.text)));
        }
        None => features.push("w+1=</s>".into()),
    }

    features
}

/// Features for every token of a sentence.
pub fn sentence_features(tokens: &[Token]) -> Vec<Vec<String>> {
    (0..tokens.len()).map(|i| token_features(tokens, i)).collect()
}

/// Feature string to embedding row, in sorted feature order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureVocab {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl FeatureVocab {
    /// Vocabulary of every feature in `sentences`.
    pub fn build<'a, I>(sentences: I) -> Self
    where
        I: IntoIterator<Item = &'a [Vec<String>]>,
    {
        let names: BTreeSet<&str> = sentences
            .into_iter()
            .flatten()
            .flatten()
            .map(String::as_str)
            .collect();
        Self::from(names.into_iter().map(str::to_string).collect::<Vec<_>>())
    }

    pub fn get(&self, feature: &str) -> Option<u32> {
        self.ids.get(feature).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Row ids of the known features of each token. Unknown features are
    /// skipped.
    pub fn lookup(&self, features: &[Vec<String>]) -> Vec<Vec<u32>> {
        features
            .iter()
            .map(|token| token.iter().filter_map(|f| self.get(f)).collect())
            .collect()
    }
}

impl From<Vec<String>> for FeatureVocab {
    fn from(names: Vec<String>) -> Self {
        let ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id as u32))
            .collect();
        Self { names, ids }
    }
}

impl From<FeatureVocab> for Vec<String> {
    fn from(vocab: FeatureVocab) -> Self {
        vocab.names
    }
}
