// HTTP request handlers
use crate::application::polar_store::StoreError;
use crate::domain::performance::LiveData;
use crate::domain::recording::{RecordingError, RecordingMode};
use crate::infrastructure::event_stream::sse_from_receiver;
use crate::infrastructure::live_source::ReadingBatch;
use crate::infrastructure::polar_import::parse_import;
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Maps service failures onto status codes with a JSON `{ error }` body.
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<RecordingError>().is_some() {
            return StatusCode::CONFLICT;
        }
        match self.0.downcast_ref::<StoreError>() {
            Some(StoreError::InvalidFileName(_) | StoreError::InvalidImport(_)) => StatusCode::BAD_REQUEST,
            Some(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            Some(StoreError::Malformed { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.0);
        } else {
            tracing::debug!("Request rejected: {:#}", self.0);
        }
        (status, Json(json!({ "error": format!("{:#}", self.0) }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileQuery {
    pub file_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecording {
    pub polar_file: Option<String>,
}

#[derive(Deserialize)]
pub struct ModeChange {
    pub mode: RecordingMode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFile {
    pub file_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPolar {
    pub file_name: String,
    /// A polar document, or CSV/JSON text.
    pub data: Value,
}

#[derive(Deserialize)]
pub struct CompareQuery {
    pub twa: Option<f64>,
    pub tws: Option<f64>,
    pub stw: Option<f64>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn polar_data(
    Query(query): Query<FileQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let table = state.service.polar_data(query.file_name.as_deref()).await?;
    Ok(Json(table))
}

pub async fn polar_files(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.list_files().await?))
}

pub async fn start_recording(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRecording>>,
) -> ApiResult<impl IntoResponse> {
    let file = body.and_then(|Json(b)| b.polar_file);
    Ok(Json(state.service.set_recording_active(true, file).await?))
}

pub async fn stop_recording(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.set_recording_active(false, None).await?))
}

pub async fn set_recording_mode(
    State(state): State<Arc<AppState>>,
    Json(change): Json<ModeChange>,
) -> impl IntoResponse {
    Json(state.service.set_recording_mode(change.mode).await)
}

pub async fn recording(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.state().await)
}

pub async fn motoring(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let motoring = state.service.state().await.motoring;
    Json(json!({ "motoring": motoring }))
}

pub async fn live_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.live().await)
}

/// Compares the given triplet, or the latest live data when any part is
/// missing from the query.
pub async fn compare_performance(
    Query(query): Query<CompareQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let live = match (query.twa, query.tws, query.stw) {
        (Some(twa_deg), Some(tws_kt), Some(stw_kt)) => Some(LiveData {
            twa_deg,
            tws_kt,
            stw_kt,
        }),
        _ => state.service.live().await,
    };
    let Some(live) = live else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no live data yet; pass twa, tws and stw" })),
        )
            .into_response();
    };
    let comparison = state.service.compare(&live).await;
    Json(json!({ "live": live, "comparison": comparison })).into_response()
}

pub async fn create_polar_file(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateFile>,
) -> ApiResult<impl IntoResponse> {
    state.service.create_file(&body.file_name).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("File {} created.", body.file_name)
    })))
}

pub async fn import_polar(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImportPolar>,
) -> ApiResult<impl IntoResponse> {
    let file_name = if body.file_name.ends_with(".json") {
        body.file_name
    } else {
        format!("{}.json", body.file_name)
    };
    let content = match body.data {
        Value::String(text) => text,
        other => other.to_string(),
    };
    let table = parse_import(&content, Utc::now())?;
    let cells = state.service.import(&file_name, table).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("File {} imported.", file_name),
        "cells": cells
    })))
}

pub async fn push_readings(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<ReadingBatch>,
) -> Response {
    let Some(live_source) = &state.live_source else {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "readings are polled from Signal K; set source.kind = \"push\"" })),
        )
            .into_response();
    };
    let accepted = live_source.ingest(batch.updates).await;
    Json(json!({ "accepted": accepted })).into_response()
}

pub async fn events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    sse_from_receiver(state.events.subscribe(), state.shutdown.clone())
}
