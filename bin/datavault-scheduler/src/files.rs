//! File upload/download HTTP surface.
//!
//! Upload streams the multipart body through the chunker and publishes
//! each chunk to the broker as soon as it fills; nothing here talks to
//! workers. Download walks the recorded placements and reassembles the
//! file chunk by chunk.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use datavault_client::{WorkerPool, WorkerPoolError};
use datavault_common::{chunk_count, Chunker};
use datavault_meta_store::{MetaStore, MetaStoreError, PlacementRecord};
use datavault_queue::{ChunkMessage, ChunkPublisher, QueueError};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub store: Arc<MetaStore>,
    pub publisher: Arc<dyn ChunkPublisher>,
    pub workers: Arc<WorkerPool>,
}

/// Build the file router. Middleware (CORS, tracing, body limits) is
/// layered on by the caller.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/files/uploadFile", post(upload_file))
        .route("/files/getFile", get(get_file))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("multipart upload is missing a 'file' field")]
    MissingFile,

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file {0} is incomplete: {1} of {2} chunks placed")]
    Incomplete(String, usize, u64),

    #[error("chunk {1} of file {0} could not be retrieved")]
    ChunkUnavailable(String, u32),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetaStoreError),

    #[error("broker error: {0}")]
    Queue(#[from] QueueError),

    #[error("worker error: {0}")]
    Worker(#[from] WorkerPoolError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Incomplete(..)
            | Self::ChunkUnavailable(..)
            | Self::Metadata(_)
            | Self::Queue(_)
            | Self::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// `POST /files/uploadFile` — multipart form, field `file`.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<String, ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("unnamed")
            .to_string();
        let file_id = Uuid::new_v4().to_string();
        let uploaded_at = Utc::now();

        // Directory row first: the file resolves by name even while its
        // chunks are still in flight.
        state.store.record_file(&file_id, &filename, 0, uploaded_at)?;

        let mut chunker = Chunker::new();
        let mut size: u64 = 0;
        let mut sent: u32 = 0;
        while let Some(bytes) = field.chunk().await? {
            size += bytes.len() as u64;
            for chunk in chunker.push(&bytes) {
                state
                    .publisher
                    .publish(&ChunkMessage::from_bytes(&file_id, sent, &chunk))
                    .await?;
                sent += 1;
            }
        }
        if let Some(tail) = chunker.finish() {
            state
                .publisher
                .publish(&ChunkMessage::from_bytes(&file_id, sent, &tail))
                .await?;
            sent += 1;
        }

        // Now that the stream length is known, merge the real size in.
        state
            .store
            .record_file(&file_id, &filename, size, uploaded_at)?;

        info!(%file_id, %filename, size, chunks = sent, "upload dispatched");
        return Ok(format!("Upload successful. Total chunks sent: {sent}"));
    }

    Err(ApiError::MissingFile)
}

#[derive(Debug, Deserialize)]
struct GetFileParams {
    name: String,
}

/// `GET /files/getFile?name=<filename>` — reassemble and stream back.
async fn get_file(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GetFileParams>,
) -> Result<Response, ApiError> {
    let head = state
        .store
        .find_by_filename(&params.name)?
        .ok_or_else(|| ApiError::NotFound(params.name.clone()))?;

    let rows = state.store.find_all_by_file_id(&head.file_id)?;
    let size = rows
        .iter()
        .find(|r| r.chunk_id == 0)
        .map_or(head.size, |r| r.size);
    let expected = chunk_count(size);

    let mut placed: Vec<&PlacementRecord> = rows.iter().filter(|r| r.is_assigned()).collect();
    placed.sort_by_key(|r| r.chunk_id);

    if placed.len() as u64 != expected {
        return Err(ApiError::Incomplete(params.name, placed.len(), expected));
    }

    let mut body = Vec::with_capacity(size as usize);
    for (idx, row) in placed.iter().enumerate() {
        if u64::from(row.chunk_id) != idx as u64 {
            // A gap in chunk ids means a chunk was never placed.
            return Err(ApiError::Incomplete(params.name, idx, expected));
        }
        let worker_id = row.worker_id.as_deref().unwrap_or_default();
        let address = row.worker_address.as_deref().unwrap_or_default();
        match state
            .workers
            .retrieve_chunk(address, worker_id, &row.file_id, row.chunk_id)
            .await?
        {
            Some(bytes) => body.extend_from_slice(&bytes),
            None => return Err(ApiError::ChunkUnavailable(head.file_id.clone(), row.chunk_id)),
        }
    }

    let headers = [
        (
            header::CONTENT_TYPE,
            "application/octet-stream".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", params.name),
        ),
    ];
    Ok((headers, body).into_response())
}
