use crate::config::GatewayConfig;
use crate::services::storage::MediaStore;
use crate::services::zone_store::ZoneStore;
use std::sync::Arc;
use tracing::info;

/// Opens the zone store under the configured media directory.
pub async fn setup_storage(config: &GatewayConfig) -> anyhow::Result<Arc<dyn MediaStore>> {
    tokio::fs::create_dir_all(&config.media_dir).await?;
    let root = tokio::fs::canonicalize(&config.media_dir).await?;

    info!(
        "🗄️  Media store: {} ({} zones, max object {} bytes)",
        root.display(),
        config.zones.len(),
        config.max_file_size
    );

    let store = ZoneStore::new(root, config.max_file_size);
    store.init(&config.zones).await?;
    Ok(Arc::new(store))
}
