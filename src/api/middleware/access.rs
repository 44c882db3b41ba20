use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Resolves the caller's access status once and attaches it to the request.
/// Rejection is left to the operation, which knows its capability mask.
pub async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let status = state.resolver.resolve(req.headers(), req.uri().query());
    tracing::debug!(
        "Access for {} {}: {} [{}]",
        req.method(),
        req.uri().path(),
        status.principal_name(),
        status.capabilities
    );
    req.extensions_mut().insert(status);
    next.run(req).await
}
