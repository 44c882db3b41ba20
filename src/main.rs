use clap::Parser;
use dotenvy::dotenv;
use media_gateway::config::GatewayConfig;
use media_gateway::infrastructure::storage;
use media_gateway::services::access::JwtAccessResolver;
use media_gateway::services::orchestrator::MediaOrchestrator;
use media_gateway::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP server (overrides LISTEN_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Public base URL used in connector locators (overrides PUBLIC_URL)
    #[arg(short, long)]
    url: Option<String>,

    /// Media root directory (overrides MEDIA_DIR)
    #[arg(short, long)]
    media_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::from_env();
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if let Some(url) = args.url {
        config.public_url = url;
    }
    if let Some(dir) = args.media_dir {
        config.media_dir = dir;
    }

    info!("🚀 Starting media gateway...");
    info!(
        "🛡️  Limits: max object {}MB, chunk {} bytes, anonymous grants [{}]",
        config.max_file_size / 1024 / 1024,
        config.chunk_size,
        config.anonymous_capabilities
    );

    // 2. Store, access resolution, orchestration
    let store = storage::setup_storage(&config).await?;
    let resolver = Arc::new(JwtAccessResolver::new(
        config.jwt_secret.clone(),
        config.anonymous_capabilities,
    ));
    let orchestrator = Arc::new(MediaOrchestrator::new(store, config.clone()));

    let state = AppState {
        orchestrator: orchestrator.clone(),
        resolver,
        config: config.clone(),
    };

    // 3. HTTP server
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr: SocketAddr = format!("{}:{}", config.listen_address, config.listen_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Media gateway listening on: http://{}", addr);
    info!("🔗 Connector base url: {}", config.public_url);
    info!("📖 Swagger UI documentation: http://{}/swagger-ui", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    // 4. Close the store within the deadline
    info!("🛑 Shutting down media gateway...");
    let deadline = Duration::from_secs(config.close_timeout_secs);
    match tokio::time::timeout(deadline, orchestrator.shutdown()).await {
        Ok(Ok(())) => {
            info!("👋 Media gateway exited cleanly.");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("❌ Media store failed to close: {}", e);
            std::process::exit(1);
        }
        Err(_) => {
            error!(
                "❌ Media store did not close within {}s, forcing exit",
                config.close_timeout_secs
            );
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("🛑 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
