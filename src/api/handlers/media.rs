use super::{access_method, file_metadata, wants_compression};
use crate::AppState;
use crate::api::error::AppError;
use crate::models::AccessStatus;
use crate::services::orchestrator::{AccessMode, Delivery, Retrieval};
use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ConnectorResponse {
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckResponse {
    pub status: String,
    pub hash: String,
    pub previous_hash: Option<String>,
    pub size: u64,
}

fn content_disposition(file_name: &str) -> String {
    let ascii_name = file_name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback = if ascii_name.is_empty() {
        "media"
    } else {
        &ascii_name
    };
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(file_name, NON_ALPHANUMERIC)
    )
}

fn deliver(delivery: Delivery) -> Result<Response, AppError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, delivery.content_type)
        .header(header::CONTENT_LENGTH, delivery.body.len())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&delivery.file_name),
        );
    if let Some(digest) = delivery.digest {
        builder = builder.header("content-digest", digest);
    }
    builder
        .body(Body::from(delivery.body))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

fn respond(retrieval: Retrieval) -> Result<Response, AppError> {
    match retrieval {
        Retrieval::Connector { url } => Ok(Json(ConnectorResponse { url }).into_response()),
        Retrieval::Content(delivery) => deliver(delivery),
        Retrieval::Integrity(report) => Ok(Json(CheckResponse {
            status: "OK".to_string(),
            hash: report.hash,
            previous_hash: report.previous_hash,
            size: report.size,
        })
        .into_response()),
    }
}

async fn retrieve(
    state: &AppState,
    status: &AccessStatus,
    id: &str,
    mode: AccessMode,
    compress: bool,
) -> Result<Response, AppError> {
    respond(state.orchestrator.retrieve(status, id, mode, compress).await?)
}

#[utoipa::path(
    get,
    path = "/",
    params(
        ("file-metadata" = Option<String>, Header, description = "JSON descriptor carrying a media_id"),
        ("media-access-method" = Option<String>, Header, description = "Direct, Check or Indirect (default)")
    ),
    responses(
        (status = 200, description = "Connector, content or integrity report"),
        (status = 400, description = "No metadata provided"),
        (status = 404, description = "Media not found")
    ),
    tag = "media"
)]
pub async fn root(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let retrieval = state
        .orchestrator
        .retrieve_described(
            &status,
            file_metadata(&headers),
            AccessMode::from_header(access_method(&headers)),
            wants_compression(&headers),
        )
        .await?;
    respond(retrieval)
}

#[utoipa::path(
    get,
    path = "/{id}",
    params(
        ("id" = String, Path, description = "Media id"),
        ("media-access-method" = Option<String>, Header, description = "Direct, Check or Indirect (default)"),
        ("media-access-compression" = Option<String>, Header, description = "true to gzip direct content")
    ),
    responses(
        (status = 200, description = "Connector, content or integrity report", body = ConnectorResponse),
        (status = 404, description = "Media not found")
    ),
    tag = "media"
)]
pub async fn media_by_id(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let mode = AccessMode::from_header(access_method(&headers));
    retrieve(&state, &status, &id, mode, wants_compression(&headers)).await
}

#[utoipa::path(
    get,
    path = "/download/{id}",
    params(("id" = String, Path, description = "Media id")),
    responses(
        (status = 200, description = "Media content", content_type = "application/octet-stream"),
        (status = 404, description = "Media not found")
    ),
    tag = "media"
)]
pub async fn download(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    retrieve(&state, &status, &id, AccessMode::Direct, wants_compression(&headers)).await
}

#[utoipa::path(
    get,
    path = "/zdownload/{id}",
    params(("id" = String, Path, description = "Media id")),
    responses(
        (status = 200, description = "Gzip compressed media content", content_type = "application/gzip"),
        (status = 404, description = "Media not found")
    ),
    tag = "media"
)]
pub async fn zdownload(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    retrieve(&state, &status, &id, AccessMode::Direct, true).await
}

#[utoipa::path(
    get,
    path = "/check/{id}",
    params(("id" = String, Path, description = "Media id")),
    responses(
        (status = 200, description = "Recomputed and recorded hashes", body = CheckResponse),
        (status = 404, description = "Media not found")
    ),
    tag = "media"
)]
pub async fn check(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    retrieve(&state, &status, &id, AccessMode::Check, false).await
}

#[utoipa::path(
    get,
    path = "/storage/{handle}",
    params(("handle" = String, Path, description = "Internal handle from a connector url")),
    responses(
        (status = 200, description = "Media content", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown handle")
    ),
    tag = "media"
)]
pub async fn storage_file(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Path(handle): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let delivery = state
        .orchestrator
        .file_content(&status, &handle, wants_compression(&headers))
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("could not get media content".to_string()),
            other => other,
        })?;
    tracing::info!("Full read with connector: {}", handle);
    let mut response = deliver(delivery)?;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=0"),
    );
    Ok(response)
}
