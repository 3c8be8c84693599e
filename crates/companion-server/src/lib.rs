//! # Companion Server
//!
//! HTTP front end for the companion entity recognizer:
//!
//! - `POST /predict` runs the loaded model over `{"sentence": ...}`
//! - `GET /load/{version}` loads `model-<version>` from the model root
//! - `GET /train` trains a new model and streams progress as server-sent events
//! - `GET /status` reports the loaded version and whether training runs
//! - `GET|POST|DELETE /data` reads, extends or prunes the training data
//! - `GET|POST|DELETE /labels` reads, extends or prunes the stored labels

pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub use error::ServiceError;
pub use state::{AppState, LoadedModel, TrainingGuard};

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(routes::predict))
        .route("/load/{version}", get(routes::load))
        .route("/train", get(routes::train))
        .route("/status", get(routes::status))
        .route(
            "/data",
            get(routes::get_data)
                .post(routes::add_data)
                .delete(routes::delete_data),
        )
        .route(
            "/labels",
            get(routes::get_labels)
                .post(routes::add_labels)
                .delete(routes::remove_labels),
        )
        .with_state(state)
}
