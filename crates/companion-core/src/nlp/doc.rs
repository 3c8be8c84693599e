//! Processed documents and the entity spans found in them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::nlp::tokenizer::Token;

/// A recognized entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Entity label (e.g. `LOC`)
    pub label: String,
    /// Covered text
    pub text: String,
    /// Start offset in characters
    pub start: usize,
    /// End offset in characters (exclusive)
    pub end: usize,
    pub start_token: usize,
    pub end_token: usize,
}

/// A tokenized sentence plus whatever the pipeline stages attached to it.
#[derive(Debug, Clone)]
pub struct Doc {
    text: String,
    tokens: Vec<Token>,
    /// Entities in token order, filled by the `ner` stage.
    pub ents: Vec<Span>,
}

impl Doc {
    pub fn new(text: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            text: text.into(),
            tokens,
            ents: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Text covered by tokens `start_token..end_token`.
    pub fn span_text(&self, start_token: usize, end_token: usize) -> String {
        let (Some(first), Some(last)) = (
            self.tokens.get(start_token),
            end_token.checked_sub(1).and_then(|i| self.tokens.get(i)),
        ) else {
            return String::new();
        };

        self.text
            .chars()
            .skip(first.start)
            .take(last.end.saturating_sub(first.start))
            .collect()
    }

    /// Label → text mapping of the recognized entities.
    ///
    /// Keys are unique: when several entities share a label, the one that
    /// comes last in the sentence is kept.
    pub fn entity_map(&self) -> BTreeMap<String, String> {
        self.ents
            .iter()
            .map(|span| (span.label.clone(), span.text.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::tokenizer::Tokenizer;

    fn doc(text: &str) -> Doc {
        Doc::new(text, Tokenizer::new().tokenize(text))
    }

    fn span(doc: &Doc, label: &str, start_token: usize, end_token: usize) -> Span {
        let text = doc.span_text(start_token, end_token);
        Span {
            label: label.into(),
            start: doc.tokens()[start_token].start,
            end: doc.tokens()[end_token - 1].end,
            start_token,
            end_token,
            text,
        }
    }

    #[test]
    fn span_text_uses_original_characters() {
        let doc = doc("Sie wohnt in Bad  Tölz, oder?");
        assert_eq!(doc.span_text(3, 5), "Bad  Tölz");
        assert_eq!(doc.span_text(0, 0), "");
        assert_eq!(doc.span_text(5, 99), "");
    }

    #[test]
    fn empty_doc_has_empty_map() {
        let doc = doc("nothing to see");
        assert!(doc.entity_map().is_empty());
    }

    #[test]
    fn duplicate_labels_keep_the_last() {
        let mut doc = doc("Paris and Rome");
        let ents = vec![span(&doc, "LOC", 0, 1), span(&doc, "LOC", 2, 3)];
        doc.ents = ents;

        let map = doc.entity_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["LOC"], "Rome");
    }
}
