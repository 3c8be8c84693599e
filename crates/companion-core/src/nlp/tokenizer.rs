//! # Tokenizer
//!
//! Splits sentences into word and punctuation tokens, keeping character
//! offsets so entity spans can be mapped onto tokens and back.

/// A token with its position in the original sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text exactly as it appears in the input
    pub text: String,
    /// Start offset in characters
    pub start: usize,
    /// End offset in characters (exclusive)
    pub end: usize,
    /// Token index in the sequence
    pub index: usize,
}

impl Token {
    /// Lowercased form used for lexical features.
    pub fn norm(&self) -> String {
        self.text.to_lowercase()
    }
}

/// Characters inside a word that do not break it (`O'Neil`, `Baden-Baden`).
const WORD_JOINERS: &[char] = &['\'', '-', '_'];

/// Rule-based tokenizer shared by every language.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self
    }

    /// Tokenize a sentence.
    ///
    /// Whitespace separates tokens and is dropped. Punctuation becomes a
    /// token of its own unless it joins two word characters.
    ///
    /// # Examples
    /// ```
    /// use companion_core::nlp::Tokenizer;
    ///
    /// let tokens = Tokenizer::new().tokenize("Paris, France.");
    /// let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
    /// assert_eq!(texts, ["Paris", ",", "France", "."]);
    /// ```
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let chars: Vec<char> = input.chars().collect();
        let mut tokens = Vec::new();
        let mut current_start: Option<usize> = None;

        let mut push = |tokens: &mut Vec<Token>, start: usize, end: usize| {
            let index = tokens.len();
            tokens.push(Token {
                text: chars[start..end].iter().collect(),
                start,
                end,
                index,
            });
        };

        for (idx, &c) in chars.iter().enumerate() {
            if c.is_whitespace() {
                if let Some(start) = current_start.take() {
                    push(&mut tokens, start, idx);
                }
                continue;
            }

            if c.is_alphanumeric() || self.joins_word(&chars, idx) {
                current_start.get_or_insert(idx);
                continue;
            }

            // Standalone punctuation
            if let Some(start) = current_start.take() {
                push(&mut tokens, start, idx);
            }
            push(&mut tokens, idx, idx + 1);
        }

        if let Some(start) = current_start {
            push(&mut tokens, start, chars.len());
        }

        tokens
    }

    fn joins_word(&self, chars: &[char], idx: usize) -> bool {
        WORD_JOINERS.contains(&chars[idx])
            && idx > 0
            && chars[idx - 1].is_alphanumeric()
            && chars.get(idx + 1).is_some_and(|c| c.is_alphanumeric())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        Tokenizer::new()
            .tokenize(input)
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_tokenize_basic() {
        let tokens = Tokenizer::new().tokenize("Paris is nice");

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "Paris");
        assert_eq!(tokens[0].start, 0);
        assert_eq!(tokens[0].end, 5);
        assert_eq!(tokens[2].start, 9);
        assert_eq!(tokens[2].index, 2);
    }

    #[test]
    fn test_punctuation_is_split() {
        assert_eq!(texts("Hello, world!"), ["Hello", ",", "world", "!"]);
        assert_eq!(texts("(Berlin)"), ["(", "Berlin", ")"]);
    }

    #[test]
    fn test_joiners_stay_inside_words() {
        assert_eq!(texts("O'Neil visited Baden-Baden"), ["O'Neil", "visited", "Baden-Baden"]);
        assert_eq!(texts("a - b"), ["a", "-", "b"]);
    }

    #[test]
    fn test_offsets_are_characters() {
        let tokens = Tokenizer::new().tokenize("Zürich ist schön");
        assert_eq!(tokens[0].end, 6);
        assert_eq!(tokens[1].start, 7);
        assert_eq!(tokens[2].text, "schön");
        assert_eq!(tokens[2].end, 16);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(Tokenizer::new().tokenize("").is_empty());
        assert!(Tokenizer::new().tokenize("   \t\n").is_empty());
    }
}
