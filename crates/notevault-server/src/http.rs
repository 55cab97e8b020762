//! Note API: read and write the encrypted blob for one vault hash.
//!
//! Bodies are opaque to the server; the handlers only check that the
//! required fields are present before handing off to the coordinator.
//! A successful PUT is what triggers the "updated" fan-out, so storage
//! failures must (and do) short-circuit before any broadcast happens.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use notevault_core::sync::{SyncError, WritePayload};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::AppState;

/// PUT body. Fields default to empty so an absent field and an empty one
/// are rejected the same way.
#[derive(Debug, Deserialize)]
pub struct NoteBody {
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub iv: String,
    #[serde(default)]
    pub ciphertext: String,
}

/// `GET /api/note/{hash}` — fetch the stored blob.
pub async fn get_note(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Response {
    match state.coordinator.read_note(&hash).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found" })),
        )
            .into_response(),
        Err(e) => {
            error!("failed to read note: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "read_failed" })),
            )
                .into_response()
        }
    }
}

/// `PUT /api/note/{hash}` — create or overwrite the stored blob and notify
/// the vault's subscribers.
pub async fn put_note(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Json(body): Json<NoteBody>,
) -> Response {
    let payload = WritePayload {
        salt: body.salt,
        iv: body.iv,
        ciphertext: body.ciphertext,
    };

    match state.coordinator.write_note(&hash, payload).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(SyncError::MissingFields) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "missing_fields" })),
        )
            .into_response(),
        Err(e) => {
            error!("failed to write note: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "write_failed" })),
            )
                .into_response()
        }
    }
}
