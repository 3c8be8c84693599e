use thiserror::Error;

/// Errors that can occur in the companion NLP core.
#[derive(Debug, Error)]
pub enum CompanionError {
    /// The training configuration is missing a value or holds an invalid one.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A file could not be read or written.
    #[error("io error on {path}: {source}")]
    Io {
        /// The path being accessed.
        path: String,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or written.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML document could not be parsed.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The language code given to a blank model is not usable.
    #[error("invalid language code: {0:?}")]
    InvalidLanguage(String),

    /// An entity span does not fit inside its sentence.
    #[error("invalid entity span [{start}, {end}) in sentence of {len} characters")]
    InvalidSpan {
        /// Start character offset.
        start: usize,
        /// End character offset (exclusive).
        end: usize,
        /// Sentence length in characters.
        len: usize,
    },

    /// Two entity spans of one sentence cover the same token.
    #[error("overlapping entity spans at token {token} of {sentence:?}")]
    OverlappingSpans {
        /// Index of the token claimed twice.
        token: usize,
        /// The offending sentence.
        sentence: String,
    },

    /// A training example uses a label the recognizer was never told about.
    #[error("label {0:?} was not added to the entity recognizer")]
    UnknownLabel(String),

    /// A pipeline stage with that name does not exist.
    #[error("no pipeline stage named {0:?}")]
    MissingPipe(String),

    /// A pipeline stage with that name is already registered.
    #[error("pipeline already has a stage named {0:?}")]
    DuplicatePipe(String),

    /// A stage was updated before `begin_training` sized its weights.
    #[error("pipeline stage {0:?} was updated before begin_training")]
    NotInitialized(String),

    /// The model directory could not be turned back into a model.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Candle tensor error.
    #[error("candle error: {0}")]
    CandleError(String),
}

impl CompanionError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<candle_core::Error> for CompanionError {
    fn from(err: candle_core::Error) -> Self {
        Self::CandleError(err.to_string())
    }
}

/// Result type alias for companion core operations.
pub type Result<T> = std::result::Result<T, CompanionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = CompanionError::InvalidSpan {
            start: 4,
            end: 2,
            len: 10,
        };
        assert_eq!(
            err.to_string(),
            "invalid entity span [4, 2) in sentence of 10 characters"
        );

        let err = CompanionError::UnknownLabel("LOC".into());
        assert!(err.to_string().contains("LOC"));
    }

    #[test]
    fn io_error_names_the_path() {
        let err = CompanionError::io(
            "/mnt/data/config.yml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/mnt/data/config.yml"));
    }

    #[test]
    fn candle_errors_convert() {
        let err: CompanionError = candle_core::Error::Msg("shape mismatch".into()).into();
        assert!(matches!(&err, CompanionError::CandleError(msg) if msg.contains("shape mismatch")));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompanionError>();
    }
}
