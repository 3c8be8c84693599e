//! HTTP handlers.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use companion_core::{
    CompanionError, DataPointIds, LabelList, Language, TrainingConfig, TrainingData,
};
use companion_trainer::{Progress, Trainer};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ServiceError;
use crate::state::{AppState, LoadedModel};

/// Progress reports buffered between the training thread and the stream.
const PROGRESS_BUFFER: usize = 16;

/// Data of the `error` event that ends a failed training stream.
pub const TRAINING_FAILED: &str = "Training failed. See the server log for details.";

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub sentence: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub loaded_version: Option<String>,
    pub training: bool,
}

/// `POST /predict`: entity label to matched text.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<BTreeMap<String, String>>, ServiceError> {
    let model = state.current_model().ok_or(ServiceError::NotLoaded)?;
    let request: PredictRequest = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

    let entities = model.nlp.process(&request.sentence).entity_map();
    tracing::debug!(version = %model.version, found = entities.len(), "predicted");
    Ok(Json(entities))
}

/// `GET /load/{version}`: swap in the model saved as `version`.
pub async fn load(
    State(state): State<Arc<AppState>>,
    Path(version): Path<String>,
) -> Result<StatusCode, ServiceError> {
    let dir = state.model_dir(&version)?;

    let nlp = tokio::task::spawn_blocking(move || Language::from_disk(&dir))
        .await
        .map_err(|e| ServiceError::ModelLoad(e.to_string()))?
        .map_err(|e| ServiceError::ModelLoad(e.to_string()))?;

    state.swap_model(LoadedModel {
        version: version.clone(),
        nlp,
    });
    tracing::info!(%version, "model loaded");
    Ok(StatusCode::CREATED)
}

/// `GET /train`: train from the configured data, one event per pass.
///
/// Training runs on a blocking thread and keeps going if the client goes
/// away; the model is saved either way. The loaded model is not touched.
pub async fn train(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let guard = state.begin_training()?;

    let config = TrainingConfig::from_file(state.config_path())
        .map_err(|e| ServiceError::Training(e.to_string()))?;
    let labels = LabelList::from_file(state.labels_path())
        .map_err(|e| ServiceError::Training(e.to_string()))?;
    let trainer = Trainer::new(config, state.model_root()).with_labels(labels.labels);
    let examples = trainer
        .load_examples()
        .map_err(|e| ServiceError::Training(e.to_string()))?;
    let run = trainer
        .train(examples)
        .map_err(|e| ServiceError::Training(e.to_string()))?;

    tracing::info!(passes = run.total(), output = %run.output_dir().display(), "training started");

    let (tx, rx) = mpsc::channel::<Result<Progress, CompanionError>>(PROGRESS_BUFFER);
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        for item in run {
            if let Err(err) = &item {
                tracing::error!(error = %err, "training failed");
            }
            // A closed channel only means the client left.
            let _ = tx.blocking_send(item);
        }
        tracing::info!("training finished");
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        let event = match rx.recv().await? {
            Ok(progress) => Event::default().data(progress.to_string()),
            Err(_) => Event::default().event("error").data(TRAINING_FAILED),
        };
        Some((Ok(event), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `GET /status`
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        loaded_version: state.current_model().map(|m| m.version.clone()),
        training: state.is_training(),
    })
}

fn data_error(err: impl ToString) -> ServiceError {
    ServiceError::Data(err.to_string())
}

fn labels_error(err: impl ToString) -> ServiceError {
    ServiceError::Labels(err.to_string())
}

/// Training-data file named by the configuration.
fn training_data_path(state: &AppState) -> Result<PathBuf, ServiceError> {
    TrainingConfig::from_file(state.config_path())
        .map(|config| config.training_data)
        .map_err(data_error)
}

/// `GET /data`: the stored training data.
pub async fn get_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TrainingData>, ServiceError> {
    let path = training_data_path(&state)?;
    let _files = state.lock_files().await;
    let data = TrainingData::from_file(&path).map_err(data_error)?;
    Ok(Json(data))
}

/// `POST /data`: put `{"dataPoints": [...]}` in front of the stored points.
///
/// Each new point gets the md5 hex of its sentence as id. A missing data
/// file is created.
pub async fn add_data(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<&'static str, ServiceError> {
    let request: TrainingData = serde_json::from_slice(&body).map_err(data_error)?;
    let path = training_data_path(&state)?;

    let _files = state.lock_files().await;
    let mut data = TrainingData::from_file_or_default(&path).map_err(data_error)?;
    let added = request.data_points.len();
    data.add(request.data_points);
    data.to_file(&path).map_err(data_error)?;

    tracing::info!(added, total = data.data_points.len(), "saved data points");
    Ok("Data was saved")
}

/// `DELETE /data`: remove the points listed in `{"ids": [...]}`.
pub async fn delete_data(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<&'static str, ServiceError> {
    let request: DataPointIds = serde_json::from_slice(&body).map_err(data_error)?;
    let path = training_data_path(&state)?;

    let _files = state.lock_files().await;
    let mut data = TrainingData::from_file(&path).map_err(data_error)?;
    let removed = data.remove(&request.ids);
    data.to_file(&path).map_err(data_error)?;

    tracing::info!(removed, total = data.data_points.len(), "deleted data points");
    Ok("Deleted")
}

/// `GET /labels`
pub async fn get_labels(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LabelList>, ServiceError> {
    let _files = state.lock_files().await;
    let labels = LabelList::from_file(state.labels_path()).map_err(labels_error)?;
    Ok(Json(labels))
}

/// `POST /labels`: add `{"labels": [...]}`, answering with the new list.
pub async fn add_labels(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<LabelList>, ServiceError> {
    edit_labels(&state, &body, |list, labels| list.add(labels)).await
}

/// `DELETE /labels`: remove `{"labels": [...]}`, answering with the new list.
pub async fn remove_labels(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<LabelList>, ServiceError> {
    edit_labels(&state, &body, |list, labels| list.remove(&labels)).await
}

async fn edit_labels(
    state: &AppState,
    body: &[u8],
    edit: impl FnOnce(&mut LabelList, Vec<String>),
) -> Result<Json<LabelList>, ServiceError> {
    let request: LabelList = serde_json::from_slice(body).map_err(labels_error)?;
    let path = state.labels_path();

    let _files = state.lock_files().await;
    let mut labels = LabelList::from_file(&path).map_err(labels_error)?;
    edit(&mut labels, request.labels);
    labels.to_file(&path).map_err(labels_error)?;

    tracing::info!(labels = ?labels.labels, "saved labels");
    Ok(Json(labels))
}
