use std::future::Future;
use std::time::Duration;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use forfore_llm::ImageUpload;
use forfore_storage::SessionId;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use crate::chat::{ModelSummary, SessionSettings, SessionSettingsUpdate, SessionView, SubmitOutcome};
use crate::error::ChatResult;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: String,
    pub active_model: Option<String>,
    pub loaded_models: usize,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub backend: String,
    pub default_model: String,
    pub models: Vec<ModelSummary>,
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_id: String,
}

pub(crate) fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::parse(raw).map_err(|error| ApiError::bad_request(error.to_string()))
}

async fn with_timeout<T>(
    timeout: Duration,
    future: impl Future<Output = ChatResult<T>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            format!("request timed out after {}s", timeout.as_secs()),
        )),
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let loader = state.service.loader();
    Ok(Json(HealthResponse {
        status: "healthy",
        backend: loader.backend_id().to_string(),
        active_model: loader
            .active()
            .map(|handle| handle.identifier().to_string()),
        loaded_models: loader.loaded().await.len(),
        sessions: state.service.session_count()?,
    }))
}

pub(crate) async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let view = state.service.create_session()?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub(crate) async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.service.session(session_id)?))
}

pub(crate) async fn update_settings(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(update): Json<SessionSettingsUpdate>,
) -> Result<Json<SessionSettings>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let settings = with_timeout(
        state.request_timeout,
        state.service.update_settings(session_id, update),
    )
    .await?;
    Ok(Json(settings))
}

/// Multipart fields: `text` (required for a turn to be stored) and an optional `image` file.
pub(crate) async fn post_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let (text, image) = read_submission(multipart).await?;
    let outcome = state.service.submit(session_id, text, image).await?;
    Ok(Json(outcome))
}

async fn read_submission(
    mut multipart: Multipart,
) -> Result<(String, Option<ImageUpload>), ApiError> {
    let mut text = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => text = Some(field.text().await?),
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if !bytes.is_empty() {
                    image = Some(ImageUpload::new(bytes.to_vec(), file_name));
                }
            }
            other => tracing::debug!(field = ?other, "ignoring unknown multipart field"),
        }
    }

    Ok((text.unwrap_or_default(), image))
}

pub(crate) async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        backend: state.service.loader().backend_id().to_string(),
        default_model: state.service.defaults().model_id.clone(),
        models: state.service.models().await,
    })
}

pub(crate) async fn load_model(
    State(state): State<AppState>,
    Json(request): Json<LoadModelRequest>,
) -> Result<Json<ModelSummary>, ApiError> {
    let summary = with_timeout(
        state.request_timeout,
        state.service.load_model(&request.model_id),
    )
    .await?;
    Ok(Json(summary))
}
