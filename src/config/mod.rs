use crate::models::{Capabilities, ZoneConfig};
use std::env;
use std::path::PathBuf;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listening address (default: "0.0.0.0")
    pub listen_address: String,

    /// Listening port (default: 3000)
    pub listen_port: u16,

    /// Public base URL used to build connector locators
    pub public_url: String,

    /// Route prefix, normalized to "/" or "/something"
    pub server_prefix: String,

    /// Root directory of the zone store
    pub media_dir: PathBuf,

    /// Storage zones, first one is the default
    pub zones: Vec<ZoneConfig>,

    /// Maximum object size in bytes (default: 500 MB)
    pub max_file_size: u64,

    /// Initial growth increment of the ingest buffer (default: 256 KiB)
    pub chunk_size: usize,

    /// Deadline given to the store to close on shutdown, in seconds (default: 10)
    pub close_timeout_secs: u64,

    /// Secret used to sign and verify capability tokens
    pub jwt_secret: String,

    /// Lifetime of forged tokens in hours (default: 24)
    pub token_ttl_hours: i64,

    /// Capabilities granted to callers without a token (default: none)
    pub anonymous_capabilities: Capabilities,

    /// Allowed CORS origins (comma separated, "*" for any)
    pub allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 3000,
            public_url: "http://localhost:3000".to_string(),
            server_prefix: "/".to_string(),
            media_dir: PathBuf::from("./media"),
            zones: vec![ZoneConfig::direct("zone1"), ZoneConfig::staged("zone_staged")],
            max_file_size: 500_000_000,
            chunk_size: 65536 * 4,
            close_timeout_secs: 10,
            jwt_secret: "secret".to_string(),
            token_ttl_hours: 24,
            anonymous_capabilities: Capabilities::NONE,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            listen_address: env::var("LISTEN_ADDRESS").unwrap_or(default.listen_address),

            listen_port: env::var("LISTEN_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.listen_port),

            public_url: env::var("PUBLIC_URL").unwrap_or(default.public_url),

            server_prefix: crate::utils::url::normalize_prefix(
                &env::var("SERVER_PREFIX").unwrap_or(default.server_prefix),
            ),

            media_dir: env::var("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.media_dir),

            zones: env::var("STORAGE_ZONES")
                .ok()
                .and_then(|v| match parse_zones(&v) {
                    Ok(zones) => Some(zones),
                    Err(e) => {
                        tracing::warn!("STORAGE_ZONES ignored: {}", e);
                        None
                    }
                })
                .unwrap_or(default.zones),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            chunk_size: env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&v: &usize| v > 0)
                .unwrap_or(default.chunk_size),

            close_timeout_secs: env::var("CLOSE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.close_timeout_secs),

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.token_ttl_hours),

            anonymous_capabilities: env::var("ANONYMOUS_CAPABILITIES")
                .map(|v| parse_capabilities(&v))
                .unwrap_or(default.anonymous_capabilities),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development and tests (small buffers, local media dir)
    pub fn development(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
            public_url: "http://localhost:3000".to_string(),
            chunk_size: 4096,
            max_file_size: 16 * 1024 * 1024,
            jwt_secret: "development-secret".to_string(),
            ..Self::default()
        }
    }
}

/// Parses a JSON array of zones, e.g. `[{"name":"zone1"},{"name":"in","staged":true}]`.
pub fn parse_zones(raw: &str) -> anyhow::Result<Vec<ZoneConfig>> {
    let zones: Vec<ZoneConfig> = serde_json::from_str(raw)?;
    if zones.is_empty() {
        anyhow::bail!("at least one zone is required");
    }
    for zone in &zones {
        crate::utils::validation::validate_identifier(&zone.name)
            .map_err(|e| anyhow::anyhow!("invalid zone name '{}': {}", zone.name, e))?;
    }
    Ok(zones)
}

/// Parses a comma separated list of grants: `read,write,execute`.
pub fn parse_capabilities(raw: &str) -> Capabilities {
    let mut capabilities = Capabilities::NONE;
    for grant in raw.split(',').map(|s| s.trim().to_lowercase()) {
        match grant.as_str() {
            "read" => capabilities.read = true,
            "write" => capabilities.write = true,
            "execute" => capabilities.execute = true,
            "" => {}
            other => tracing::warn!("Unknown capability '{}' ignored", other),
        }
    }
    capabilities
}
