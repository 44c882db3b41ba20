use super::{content_length, file_metadata};
use crate::AppState;
use crate::api::error::AppError;
use crate::models::AccessStatus;
use crate::services::orchestrator::IngestOutcome;
use axum::{
    Extension,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use futures::channel::mpsc::{UnboundedSender, unbounded};
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use tokio::task::JoinError;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UploadQuery {
    /// Present to append to the staged write named in the metadata
    pub append: Option<String>,
}

impl UploadQuery {
    fn wants_append(&self) -> bool {
        self.append
            .as_deref()
            .is_some_and(|v| !matches!(v, "false" | "0"))
    }
}

type EventSender = UnboundedSender<Result<Bytes, Infallible>>;

/// Writes one element of the streamed JSON array. The opening element is
/// written by `open_events`, so every later element carries its separator.
fn send_event(tx: &EventSender, event: Value) {
    let chunk = format!(", {}", event);
    // the client may have gone away; the upload still completes
    let _ = tx.unbounded_send(Ok(Bytes::from(chunk)));
}

fn open_events(tx: &EventSender) {
    let _ = tx.unbounded_send(Ok(Bytes::from_static(b"[ {\"status\":\"download\"}")));
}

fn close_events(tx: &EventSender) {
    let _ = tx.unbounded_send(Ok(Bytes::from_static(b" ]")));
}

/// Writes the terminal elements for a finished ingest task and closes the array.
fn finish_events(tx: &EventSender, joined: Result<Result<IngestOutcome, AppError>, JoinError>) {
    match joined {
        Ok(Ok(IngestOutcome::Staged { media_id, token })) => {
            send_event(
                tx,
                json!({
                    "status": "commit_ready",
                    "zone_name": token.zone_name,
                    "commit_uuid": token.commit_uuid,
                }),
            );
            send_event(tx, json!({"status": "OK", "media_id": media_id}));
        }
        Ok(Ok(IngestOutcome::Committed { media_id })) => {
            send_event(tx, json!({"status": "OK", "media_id": media_id}));
        }
        Ok(Err(e)) => send_event(tx, e.to_event()),
        Err(e) => {
            let error = AppError::Internal(format!("upload task failed: {}", e));
            send_event(tx, error.to_event());
        }
    }
    close_events(tx);
}

#[utoipa::path(
    post,
    path = "/post",
    params(
        UploadQuery,
        ("file-metadata" = String, Header, description = "JSON media descriptor")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Streamed JSON array of upload events"),
        (status = 400, description = "Missing or malformed metadata"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Write capability required"),
        (status = 413, description = "Declared size exceeds the limit")
    ),
    security(("bearer_auth" = [])),
    tag = "media"
)]
pub async fn post_media(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let plan = state.orchestrator.prepare_ingest(
        &status,
        file_metadata(&headers),
        content_length(&headers),
        query.wants_append(),
    )?;
    tracing::info!(
        "Upload of {} by {} ({:?}, hint {} bytes)",
        plan.descriptor.media_name,
        status.principal_name(),
        plan.mode,
        plan.size_hint
    );

    let (tx, rx) = unbounded();
    open_events(&tx);
    let progress = tx.clone();
    let orchestrator = state.orchestrator.clone();
    let ingest = tokio::spawn(async move {
        let report: &mut (dyn FnMut(u64) + Send) =
            &mut |size| send_event(&progress, json!({"status": "upload_status", "size": size}));
        orchestrator
            .ingest(plan, &status, body.into_data_stream(), Some(report))
            .await
    });
    tokio::spawn(async move {
        finish_events(&tx, ingest.await);
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(rx))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
