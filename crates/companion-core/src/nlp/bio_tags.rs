//! # BIO Tags for Named Entity Recognition
//!
//! Tags are built over a dynamic label set: index `0` is `O`, and label `k`
//! owns `B-<label>` at `2k + 1` and `I-<label>` at `2k + 2`.

/// A BIO tag referring to a label by its position in a [`LabelSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BioTag {
    /// Outside any entity
    Outside,
    /// First token of an entity
    Begin(usize),
    /// Continuation token of an entity
    Inside(usize),
}

impl BioTag {
    /// Number of tags needed for `num_labels` entity labels.
    pub fn num_tags(num_labels: usize) -> usize {
        num_labels * 2 + 1
    }

    /// Get the tag index for the weight tables.
    pub fn index(&self) -> usize {
        match self {
            BioTag::Outside => 0,
            BioTag::Begin(label) => label * 2 + 1,
            BioTag::Inside(label) => label * 2 + 2,
        }
    }

    /// Get tag from index.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => BioTag::Outside,
            i if i % 2 == 1 => BioTag::Begin((i - 1) / 2),
            i => BioTag::Inside((i - 2) / 2),
        }
    }

    /// Check if this is a "Begin" tag.
    pub fn is_begin(&self) -> bool {
        matches!(self, BioTag::Begin(_))
    }

    /// Check if this is an "Inside" tag.
    pub fn is_inside(&self) -> bool {
        matches!(self, BioTag::Inside(_))
    }

    /// Label position this tag belongs to.
    pub fn label(&self) -> Option<usize> {
        match self {
            BioTag::Outside => None,
            BioTag::Begin(label) | BioTag::Inside(label) => Some(*label),
        }
    }

    /// Check if transitioning from `from` tag to `to` tag is valid.
    ///
    /// `I-X` may only follow `B-X` or `I-X`; everything else is allowed.
    pub fn is_valid_transition(from: BioTag, to: BioTag) -> bool {
        match to {
            BioTag::Inside(label) => from.label() == Some(label),
            _ => true,
        }
    }

    /// Whether a sequence may open with this tag.
    pub fn is_valid_start(&self) -> bool {
        !self.is_inside()
    }
}

/// Ordered set of entity labels known to a recognizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for label in labels {
            set.add(label);
        }
        set
    }

    /// Add a label, returning its position. Adding twice is a no-op.
    pub fn add(&mut self, label: impl Into<String>) -> usize {
        let label = label.into();
        match self.position(&label) {
            Some(idx) => idx,
            None => {
                self.labels.push(label);
                self.labels.len() - 1
            }
        }
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_tags(&self) -> usize {
        BioTag::num_tags(self.labels.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// A run of tagged tokens forming one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpan {
    pub label: usize,
    pub start_token: usize,
    pub end_token: usize,
}

/// Group a decoded tag sequence into entity token spans.
///
/// A stray `I-X` that does not continue an `X` entity opens a new one.
pub fn spans_from_tags(tags: &[BioTag]) -> Vec<TagSpan> {
    let mut spans: Vec<TagSpan> = Vec::new();
    let mut open: Option<TagSpan> = None;

    for (i, tag) in tags.iter().enumerate() {
        match *tag {
            BioTag::Inside(label) if open.as_ref().is_some_and(|s| s.label == label) => {
                if let Some(span) = open.as_mut() {
                    span.end_token = i + 1;
                }
            }
            BioTag::Begin(label) | BioTag::Inside(label) => {
                spans.extend(open.take());
                open = Some(TagSpan {
                    label,
                    start_token: i,
                    end_token: i + 1,
                });
            }
            BioTag::Outside => spans.extend(open.take()),
        }
    }
    spans.extend(open);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_index_roundtrip() {
        for idx in 0..BioTag::num_tags(4) {
            assert_eq!(BioTag::from_index(idx).index(), idx);
        }
        assert_eq!(BioTag::Begin(0).index(), 1);
        assert_eq!(BioTag::Inside(0).index(), 2);
        assert_eq!(BioTag::Begin(1).index(), 3);
    }

    #[test]
    fn test_valid_transitions() {
        assert!(BioTag::is_valid_transition(BioTag::Begin(0), BioTag::Inside(0)));
        assert!(BioTag::is_valid_transition(BioTag::Inside(0), BioTag::Inside(0)));
        assert!(BioTag::is_valid_transition(BioTag::Outside, BioTag::Begin(1)));
        assert!(BioTag::is_valid_transition(BioTag::Inside(1), BioTag::Outside));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!BioTag::is_valid_transition(BioTag::Outside, BioTag::Inside(0)));
        assert!(!BioTag::is_valid_transition(BioTag::Begin(0), BioTag::Inside(1)));
        assert!(!BioTag::Inside(0).is_valid_start());
    }

    #[test]
    fn test_label_set() {
        let mut labels = LabelSet::new();
        assert_eq!(labels.add("LOC"), 0);
        assert_eq!(labels.add("PER"), 1);
        assert_eq!(labels.add("LOC"), 0);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.num_tags(), 5);
        assert_eq!(labels.name(1), Some("PER"));
        assert_eq!(labels.name(2), None);
    }

    #[test]
    fn test_spans_from_tags() {
        use BioTag::*;
        let tags = [Begin(0), Inside(0), Outside, Begin(1), Begin(1), Inside(0)];
        let spans = spans_from_tags(&tags);

        assert_eq!(spans.len(), 4);
        assert_eq!((spans[0].start_token, spans[0].end_token), (0, 2));
        assert_eq!((spans[1].label, spans[1].start_token), (1, 3));
        assert_eq!((spans[2].label, spans[2].start_token), (1, 4));
        assert_eq!((spans[3].label, spans[3].start_token), (0, 5));
    }
}
