use super::{content_length, media_commit, media_delete};
use crate::AppState;
use crate::api::error::AppError;
use crate::models::AccessStatus;
use crate::services::orchestrator::{StageTokenInput, TargetSources};
use crate::services::storage::ListSummary;
use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
}

impl StatusResponse {
    fn ok(media_id: Option<String>) -> Json<Self> {
        Json(Self {
            status: "OK".to_string(),
            media_id,
        })
    }
}

#[utoipa::path(
    post,
    path = "/commit",
    params(
        ("zone_name" = Option<String>, Query, description = "Zone of the staged write"),
        ("commit_uuid" = Option<String>, Query, description = "Commit id of the staged write"),
        ("media-commit" = Option<String>, Header, description = "JSON stage token")
    ),
    request_body(content = StageTokenInput, description = "Stage token, when not in the query or header"),
    responses(
        (status = 200, description = "Staged write committed", body = StatusResponse),
        (status = 400, description = "Missing or malformed stage token"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Execute capability required"),
        (status = 404, description = "Unknown stage token")
    ),
    security(("bearer_auth" = [])),
    tag = "media"
)]
pub async fn commit_media(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Query(query): Query<StageTokenInput>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<StatusResponse>, AppError> {
    let sources = TargetSources {
        path_id: None,
        query,
        header: media_commit(&headers),
        body: body.into_data_stream(),
        content_length: content_length(&headers),
    };
    let media_id = state.orchestrator.commit(&status, sources).await?;
    Ok(StatusResponse::ok(Some(media_id)))
}

#[utoipa::path(
    post,
    path = "/delete",
    params(
        ("zone_name" = Option<String>, Query, description = "Zone of a staged write to discard"),
        ("commit_uuid" = Option<String>, Query, description = "Commit id of a staged write to discard"),
        ("media-delete" = Option<String>, Header, description = "JSON document {uuid}")
    ),
    request_body(content = crate::services::orchestrator::DeleteDocument, description = "Target, when not in the query or header"),
    responses(
        (status = 200, description = "Media deleted", body = StatusResponse),
        (status = 400, description = "Missing or malformed target"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Write and execute capabilities required"),
        (status = 404, description = "Media not found")
    ),
    security(("bearer_auth" = [])),
    tag = "media"
)]
pub async fn delete_media(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Query(query): Query<StageTokenInput>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<StatusResponse>, AppError> {
    let sources = TargetSources {
        path_id: None,
        query,
        header: media_delete(&headers),
        body: body.into_data_stream(),
        content_length: content_length(&headers),
    };
    state.orchestrator.delete(&status, sources).await?;
    Ok(StatusResponse::ok(None))
}

#[utoipa::path(
    post,
    path = "/delete/{id}",
    params(("id" = String, Path, description = "Media id")),
    responses(
        (status = 200, description = "Media deleted", body = StatusResponse),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Write and execute capabilities required"),
        (status = 404, description = "Media not found")
    ),
    security(("bearer_auth" = [])),
    tag = "media"
)]
pub async fn delete_media_by_id(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let sources = TargetSources {
        path_id: Some(id.as_str()),
        query: StageTokenInput::default(),
        header: None,
        body: Body::empty().into_data_stream(),
        content_length: None,
    };
    state.orchestrator.delete(&status, sources).await?;
    Ok(StatusResponse::ok(Some(id)))
}

#[utoipa::path(
    get,
    path = "/list",
    responses(
        (status = 200, description = "Stored media visible to the caller", body = ListSummary),
        (status = 401, description = "Nothing is visible anonymously")
    ),
    tag = "media"
)]
pub async fn list_media(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
) -> Result<Json<ListSummary>, AppError> {
    Ok(Json(state.orchestrator.list(&status).await?))
}
