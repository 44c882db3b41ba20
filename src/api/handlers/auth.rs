use crate::AppState;
use crate::api::error::AppError;
use crate::models::AccessStatus;
use crate::services::access::AUTH_COOKIE;
use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ForgeResponse {
    pub status: String,
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/jwt/forge",
    request_body = crate::services::orchestrator::ForgeRequest,
    responses(
        (status = 200, description = "Token forged", body = ForgeResponse),
        (status = 400, description = "Malformed user description"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Execute capability required")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn forge_token(
    State(state): State<AppState>,
    Extension(status): Extension<AccessStatus>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let token = state
        .orchestrator
        .forge_token(&status, content_type, &body)?;

    let cookie = HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        AUTH_COOKIE, token
    ))
    .map_err(|e| AppError::Internal(format!("Invalid cookie value: {}", e)))?;

    let mut response = Json(ForgeResponse {
        status: "OK".to_string(),
        token,
    })
    .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}
