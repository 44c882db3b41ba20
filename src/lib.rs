pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::GatewayConfig;
use crate::services::access::AccessResolver;
use crate::services::orchestrator::MediaOrchestrator;
use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::any::Any as PanicPayload;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Prefix every route is also reachable under.
pub const LEGACY_PREFIX: &str = "/media";

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::auth::forge_token,
        api::handlers::upload::post_media,
        api::handlers::manage::commit_media,
        api::handlers::manage::delete_media,
        api::handlers::manage::delete_media_by_id,
        api::handlers::manage::list_media,
        api::handlers::media::root,
        api::handlers::media::media_by_id,
        api::handlers::media::download,
        api::handlers::media::zdownload,
        api::handlers::media::check,
        api::handlers::media::storage_file,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::auth::ForgeResponse,
            api::handlers::manage::StatusResponse,
            api::handlers::media::ConnectorResponse,
            api::handlers::media::CheckResponse,
            services::orchestrator::ForgeRequest,
            services::orchestrator::StageTokenInput,
            services::orchestrator::DeleteDocument,
            services::storage::ListSummary,
            services::storage::ListItem,
            models::MediaDescriptor,
            models::MediaType,
            models::MediaRecord,
            models::StageToken,
            models::Capabilities,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "media", description = "Media ingestion, retrieval and management"),
        (name = "auth", description = "Capability tokens"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<MediaOrchestrator>,
    pub resolver: Arc<dyn AccessResolver>,
    pub config: GatewayConfig,
}

/// Routes of the gateway, mounted once per prefix.
fn media_routes(state: &AppState) -> Router<AppState> {
    use api::handlers::{auth, health, manage, media, upload};

    Router::new()
        .route("/", get(media::root))
        .route("/health", get(health::health_check))
        .route("/jwt/forge", post(auth::forge_token))
        .route("/storage/:handle", get(media::storage_file))
        .route("/post", post(upload::post_media))
        .route("/commit", post(manage::commit_media))
        .route("/delete", post(manage::delete_media))
        .route("/delete/:id", post(manage::delete_media_by_id))
        .route("/list", get(manage::list_media))
        .route("/check/:id", get(media::check))
        .route("/download/:id", get(media::download))
        .route("/zdownload/:id", get(media::zdownload))
        .route("/:id", get(media::media_by_id))
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::access::access_middleware,
        ))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

/// Last-resort handler: a panicking request gets a 500, the process lives on.
fn handle_panic(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Request handler panicked: {}", detail);

    let body = api::error::error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

pub fn create_app(state: AppState) -> Router {
    let prefix = state.config.server_prefix.clone();
    let routes = media_routes(&state);

    let mut app = if prefix == "/" {
        Router::new().merge(routes.clone())
    } else {
        Router::new().nest(&prefix, routes.clone())
    };
    if prefix != LEGACY_PREFIX {
        app = app.nest(LEGACY_PREFIX, routes);
    }

    app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}
