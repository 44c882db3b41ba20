use clap::Parser;
use dotenvy::dotenv;
use media_gateway::config::GatewayConfig;
use media_gateway::models::Capabilities;
use media_gateway::utils::auth::{TokenSubject, create_jwt};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mints a capability token signed with JWT_SECRET.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Principal id
    #[arg(long, default_value = "0")]
    user_id: String,

    /// Principal name
    #[arg(long, default_value = "admin")]
    user_name: String,

    /// Optional group
    #[arg(long)]
    group: Option<String>,

    /// Grants, comma separated (read,write,execute)
    #[arg(long, default_value = "read,write,execute")]
    grants: String,

    /// Lifetime in hours (defaults to TOKEN_TTL_HOURS)
    #[arg(long)]
    ttl_hours: Option<i64>,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge_token=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = GatewayConfig::from_env();
    if std::env::var("JWT_SECRET").is_err() {
        error!("❌ JWT_SECRET is not set, the token would be signed with the default secret.");
        std::process::exit(1);
    }

    let capabilities: Capabilities = media_gateway::config::parse_capabilities(&args.grants);
    let subject = TokenSubject {
        user_id: &args.user_id,
        user_name: &args.user_name,
        group_name: args.group.as_deref(),
        capabilities,
    };
    let ttl = args.ttl_hours.unwrap_or(config.token_ttl_hours);
    let token = create_jwt(&subject, &config.jwt_secret, ttl)?;

    info!(
        "🔐 Token for {} [{}] valid {}h",
        args.user_name, capabilities, ttl
    );
    println!("{}", token);
    Ok(())
}
