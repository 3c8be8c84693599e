use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors returned by the HTTP handlers.
///
/// Clients see a fixed plain-text message per variant; the detail is only
/// logged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no model loaded")]
    NotLoaded,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("training already in progress")]
    TrainingInProgress,

    #[error("training data request failed: {0}")]
    Data(String),

    #[error("label request failed: {0}")]
    Labels(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TrainingInProgress => StatusCode::CONFLICT,
            Self::NotLoaded
            | Self::InvalidInput(_)
            | Self::ModelLoad(_)
            | Self::Training(_)
            | Self::Data(_)
            | Self::Labels(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Body sent to the client.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotLoaded => "Could not predict the data. Did you already load the model?",
            Self::InvalidInput(_) => "Could not predict the data. Expected a JSON body with a \"sentence\" string.",
            Self::ModelLoad(_) => "Model could not be loaded. Did you already train?",
            Self::Training(_) => "Did you create some trainings data?",
            Self::TrainingInProgress => "A training run is already in progress.",
            Self::Data(_) => "Trainings data could not be read or saved.",
            Self::Labels(_) => "Labels could not be read or saved.",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, status = %self.status(), "request rejected");
        (self.status(), self.message()).into_response()
    }
}
