//! Directory-backed [`MediaStore`].
//!
//! Layout under the media root:
//!
//! ```text
//! <zone dir>/<handle>             object bytes
//! <zone dir>/<handle>.json        MediaRecord sidecar
//! <zone dir>/.staged/<commit id>  uncommitted staged write
//! ```
//!
//! Sidecars are reloaded by `init`; staged writes do not survive a restart.

use crate::models::{AccessStatus, MediaDescriptor, MediaRecord, MediaType, StageToken, ZoneConfig};
use crate::services::storage::{
    AddOutcome, DeleteTarget, IntegrityReport, ListItem, ListSummary, MediaContent, MediaStore,
    StoreError, StoreResult, WriteMode,
};
use crate::utils::hash::{calculate_hash, calculate_hash_from_reader};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::validation::{resolve_mime_type, validate_identifier};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use uuid::Uuid;

const STAGED_DIR: &str = ".staged";
const SNIFF_LEN: usize = 8192;

#[derive(Debug, Clone)]
struct StagedEntry {
    zone: String,
    media_id: String,
    media_name: String,
    media_type: MediaType,
    declared_mime: Option<String>,
    owner: Option<String>,
    size: u64,
    created_at: DateTime<Utc>,
}

/// Fields of a record known before the object bytes are hashed.
struct RecordSeed {
    media_id: String,
    media_name: String,
    media_type: MediaType,
    declared_mime: Option<String>,
    owner: Option<String>,
    created_at: DateTime<Utc>,
}

pub struct ZoneStore {
    root: PathBuf,
    max_object_size: u64,
    zones: RwLock<Vec<ZoneConfig>>,
    records: DashMap<String, MediaRecord>,
    handles: DashMap<String, String>,
    staged: DashMap<String, StagedEntry>,
    locks: KeyedMutex,
    closed: AtomicBool,
}

impl ZoneStore {
    pub fn new(root: impl Into<PathBuf>, max_object_size: u64) -> Self {
        Self {
            root: root.into(),
            max_object_size,
            zones: RwLock::new(Vec::new()),
            records: DashMap::new(),
            handles: DashMap::new(),
            staged: DashMap::new(),
            locks: KeyedMutex::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn zone_dir(&self, zone: &ZoneConfig) -> PathBuf {
        self.root.join(zone.directory())
    }

    fn object_path(&self, zone: &ZoneConfig, handle: &str) -> PathBuf {
        self.zone_dir(zone).join(handle)
    }

    fn sidecar_path(&self, zone: &ZoneConfig, handle: &str) -> PathBuf {
        self.zone_dir(zone).join(format!("{}.json", handle))
    }

    fn staged_path(&self, zone: &ZoneConfig, commit_uuid: &str) -> PathBuf {
        self.zone_dir(zone).join(STAGED_DIR).join(commit_uuid)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn check_size(&self, size: u64) -> StoreResult<()> {
        if size > self.max_object_size {
            return Err(StoreError::TooLarge {
                size,
                limit: self.max_object_size,
            });
        }
        Ok(())
    }

    async fn zone(&self, name: Option<&str>) -> StoreResult<ZoneConfig> {
        let zones = self.zones.read().await;
        match name {
            Some(name) => zones
                .iter()
                .find(|z| z.name == name)
                .cloned()
                .ok_or_else(|| StoreError::invalid(format!("unknown zone '{}'", name))),
            None => zones
                .first()
                .cloned()
                .ok_or_else(|| StoreError::invalid("no storage zone configured")),
        }
    }

    /// Reloads the sidecars of one zone into the index.
    async fn load_zone(&self, zone: &ZoneConfig) -> StoreResult<usize> {
        let mut loaded = 0;
        let mut entries = tokio::fs::read_dir(self.zone_dir(zone)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record: MediaRecord = match serde_json::from_slice(&tokio::fs::read(&path).await?)
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping unreadable record {}: {}", path.display(), e);
                    continue;
                }
            };
            if record.zone != zone.name
                || !tokio::fs::try_exists(self.object_path(zone, &record.handle)).await?
            {
                tracing::warn!(
                    "Skipping record {} of media {}: content missing",
                    path.display(),
                    record.media_id
                );
                continue;
            }
            self.handles
                .insert(record.handle.clone(), record.media_id.clone());
            self.records.insert(record.media_id.clone(), record);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Writes the sidecar of an object already in place and indexes it.
    /// A previous object with the same media id is replaced.
    async fn index_object(
        &self,
        zone: &ZoneConfig,
        handle: String,
        seed: RecordSeed,
        hash: String,
        size: u64,
        header: &[u8],
    ) -> StoreResult<MediaRecord> {
        let now = Utc::now();
        let record = MediaRecord {
            mimetype: resolve_mime_type(seed.declared_mime.as_deref(), &seed.media_name, header),
            media_id: seed.media_id,
            handle,
            zone: zone.name.clone(),
            media_name: seed.media_name,
            media_type: seed.media_type,
            size,
            hash,
            owner: seed.owner,
            created_at: seed.created_at,
            updated_at: now,
        };

        tokio::fs::write(
            self.sidecar_path(zone, &record.handle),
            serde_json::to_vec_pretty(&record)?,
        )
        .await?;

        self.handles
            .insert(record.handle.clone(), record.media_id.clone());
        if let Some(previous) = self.records.insert(record.media_id.clone(), record.clone()) {
            tracing::info!(
                "Media {} replaced (previous handle {})",
                previous.media_id,
                previous.handle
            );
            self.handles.remove(&previous.handle);
            // The new record is live; stale files are only logged.
            if let Ok(previous_zone) = self.zone(Some(&previous.zone)).await {
                for path in [
                    self.object_path(&previous_zone, &previous.handle),
                    self.sidecar_path(&previous_zone, &previous.handle),
                ] {
                    if let Err(e) = remove_if_exists(&path).await {
                        tracing::warn!("Failed to remove replaced file {:?}: {}", path, e);
                    }
                }
            }
        }

        Ok(record)
    }

    /// Hashes a committed staged object in place and indexes it.
    async fn promote(
        &self,
        zone: &ZoneConfig,
        handle: String,
        entry: StagedEntry,
        object: &Path,
    ) -> StoreResult<MediaRecord> {
        let (hash, size) = calculate_hash_from_reader(tokio::fs::File::open(object).await?).await?;
        let mut header = Vec::with_capacity(SNIFF_LEN);
        tokio::fs::File::open(object)
            .await?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut header)
            .await?;

        let seed = RecordSeed {
            media_id: entry.media_id,
            media_name: entry.media_name,
            media_type: entry.media_type,
            declared_mime: entry.declared_mime,
            owner: entry.owner,
            created_at: entry.created_at,
        };
        self.index_object(zone, handle, seed, hash, size, &header)
            .await
    }

    async fn append_staged(&self, token: &StageToken, content: &[u8]) -> StoreResult<AddOutcome> {
        let _guard = self.locks.lock(&token.commit_uuid).await;

        let entry = self
            .staged
            .get(&token.commit_uuid)
            .filter(|e| e.zone == token.zone_name)
            .map(|e| e.clone())
            .ok_or_else(|| StoreError::not_found(format!("stage token {}", token)))?;
        let size = entry.size + content.len() as u64;
        self.check_size(size)?;

        let zone = self.zone(Some(&entry.zone)).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(self.staged_path(&zone, &token.commit_uuid))
            .await?;
        file.write_all(content).await?;
        file.flush().await?;

        if let Some(mut staged) = self.staged.get_mut(&token.commit_uuid) {
            staged.size = size;
        }
        tracing::debug!("Appended {} bytes to {} ({} total)", content.len(), token, size);

        Ok(AddOutcome {
            media_id: entry.media_id,
            zone: entry.zone,
            stage: Some(token.clone()),
        })
    }
}

async fn remove_if_exists(path: &Path) -> StoreResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl MediaStore for ZoneStore {
    async fn init(&self, zones: &[ZoneConfig]) -> StoreResult<()> {
        if zones.is_empty() {
            return Err(StoreError::invalid("at least one zone is required"));
        }
        for zone in zones {
            validate_identifier(&zone.name)
                .and_then(|_| validate_identifier(zone.directory()))
                .map_err(|e| StoreError::invalid(format!("zone '{}': {}", zone.name, e)))?;

            let staged_dir = self.zone_dir(zone).join(STAGED_DIR);
            if tokio::fs::try_exists(&staged_dir).await? {
                tokio::fs::remove_dir_all(&staged_dir).await?;
            }
            tokio::fs::create_dir_all(&staged_dir).await?;
        }
        *self.zones.write().await = zones.to_vec();

        for zone in zones {
            let loaded = self.load_zone(zone).await?;
            tracing::info!(
                "Zone '{}' ready at {} ({} objects, staged={})",
                zone.name,
                self.zone_dir(zone).display(),
                loaded,
                zone.staged
            );
        }
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    async fn add_entry(
        &self,
        descriptor: &MediaDescriptor,
        status: &AccessStatus,
        content: Bytes,
        mode: WriteMode,
    ) -> StoreResult<AddOutcome> {
        self.ensure_open()?;

        if mode == WriteMode::Append {
            let token = descriptor.stage_token().ok_or_else(|| {
                StoreError::invalid("append requires zone_name and commit_uuid")
            })?;
            return self.append_staged(&token, &content).await;
        }

        self.check_size(content.len() as u64)?;
        let zone = self.zone(descriptor.zone_name.as_deref()).await?;
        let media_id = descriptor
            .media_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if zone.staged {
            let commit_uuid = Uuid::new_v4().to_string();
            tokio::fs::write(self.staged_path(&zone, &commit_uuid), &content).await?;
            self.staged.insert(
                commit_uuid.clone(),
                StagedEntry {
                    zone: zone.name.clone(),
                    media_id: media_id.clone(),
                    media_name: descriptor.media_name.clone(),
                    media_type: descriptor.media_type,
                    declared_mime: descriptor.file_type.clone(),
                    owner: status.principal.clone(),
                    size: content.len() as u64,
                    created_at: Utc::now(),
                },
            );
            tracing::info!("Staged media {} in zone '{}' as {}", media_id, zone.name, commit_uuid);
            return Ok(AddOutcome {
                media_id,
                zone: zone.name.clone(),
                stage: Some(StageToken::new(zone.name, commit_uuid)),
            });
        }

        let handle = Uuid::new_v4().to_string();
        tokio::fs::write(self.object_path(&zone, &handle), &content).await?;
        let seed = RecordSeed {
            media_id,
            media_name: descriptor.media_name.clone(),
            media_type: descriptor.media_type,
            declared_mime: descriptor.file_type.clone(),
            owner: status.principal.clone(),
            created_at: Utc::now(),
        };
        let header = &content[..content.len().min(SNIFF_LEN)];
        let record = self
            .index_object(
                &zone,
                handle,
                seed,
                calculate_hash(&content),
                content.len() as u64,
                header,
            )
            .await?;
        tracing::info!(
            "Stored media {} in zone '{}' ({} bytes)",
            record.media_id,
            zone.name,
            record.size
        );

        Ok(AddOutcome {
            media_id: record.media_id,
            zone: zone.name,
            stage: None,
        })
    }

    async fn commit(&self, token: &StageToken, status: &AccessStatus) -> StoreResult<String> {
        self.ensure_open()?;
        let _guard = self.locks.lock(&token.commit_uuid).await;

        let entry = self
            .staged
            .get(&token.commit_uuid)
            .filter(|e| e.zone == token.zone_name)
            .map(|e| e.clone())
            .ok_or_else(|| StoreError::not_found(format!("stage token {}", token)))?;
        let zone = self.zone(Some(&entry.zone)).await?;

        let handle = Uuid::new_v4().to_string();
        let staged = self.staged_path(&zone, &token.commit_uuid);
        let object = self.object_path(&zone, &handle);
        tokio::fs::rename(&staged, &object).await?;

        let record = match self.promote(&zone, handle.clone(), entry, &object).await {
            Ok(record) => record,
            Err(e) => {
                // Put the bytes back so the token stays committable.
                if let Err(restore) = tokio::fs::rename(&object, &staged).await {
                    tracing::error!("Failed to restore staged write {}: {}", token, restore);
                }
                let _ = remove_if_exists(&self.sidecar_path(&zone, &handle)).await;
                return Err(e);
            }
        };
        self.staged.remove(&token.commit_uuid);

        tracing::info!(
            "Committed {} as media {} by {}",
            token,
            record.media_id,
            status.principal_name()
        );
        Ok(record.media_id)
    }

    async fn delete(&self, target: &DeleteTarget, status: &AccessStatus) -> StoreResult<()> {
        self.ensure_open()?;
        match target {
            DeleteTarget::Media(media_id) => {
                let (_, record) = self
                    .records
                    .remove(media_id)
                    .ok_or_else(|| StoreError::not_found(format!("media {}", media_id)))?;
                self.handles.remove(&record.handle);
                let zone = self.zone(Some(&record.zone)).await?;
                remove_if_exists(&self.object_path(&zone, &record.handle)).await?;
                remove_if_exists(&self.sidecar_path(&zone, &record.handle)).await?;
                tracing::info!("Deleted media {} by {}", media_id, status.principal_name());
            }
            DeleteTarget::Staged(token) => {
                let _guard = self.locks.lock(&token.commit_uuid).await;
                let (_, entry) = self
                    .staged
                    .remove_if(&token.commit_uuid, |_, e| e.zone == token.zone_name)
                    .ok_or_else(|| StoreError::not_found(format!("stage token {}", token)))?;
                let zone = self.zone(Some(&entry.zone)).await?;
                remove_if_exists(&self.staged_path(&zone, &token.commit_uuid)).await?;
                tracing::info!("Discarded staged write {} by {}", token, status.principal_name());
            }
        }
        Ok(())
    }

    async fn check(&self, media_id: &str, _status: &AccessStatus) -> StoreResult<IntegrityReport> {
        self.ensure_open()?;
        let record = self
            .records
            .get(media_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::not_found(format!("media {}", media_id)))?;
        let zone = self.zone(Some(&record.zone)).await?;

        let file = match tokio::fs::File::open(self.object_path(&zone, &record.handle)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::not_found(format!("content of media {}", media_id)));
            }
            Err(e) => return Err(e.into()),
        };
        let (hash, size) = calculate_hash_from_reader(file).await?;

        Ok(IntegrityReport {
            hash,
            previous_hash: Some(record.hash),
            size,
        })
    }

    async fn get(&self, media_id: &str, _status: &AccessStatus) -> Option<String> {
        if self.ensure_open().is_err() {
            return None;
        }
        self.records.get(media_id).map(|r| r.handle.clone())
    }

    async fn find(&self, handle: &str, _status: &AccessStatus) -> StoreResult<MediaContent> {
        self.ensure_open()?;
        let record = self
            .handles
            .get(handle)
            .and_then(|media_id| self.records.get(media_id.value()).map(|r| r.clone()))
            .ok_or_else(|| StoreError::not_found(format!("handle {}", handle)))?;
        let zone = self.zone(Some(&record.zone)).await?;

        let data = match tokio::fs::read(self.object_path(&zone, handle)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::not_found(format!("content of handle {}", handle)));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(MediaContent {
            size: data.len() as u64,
            data: Bytes::from(data),
            name: record.media_name,
            mimetype: record.mimetype,
            hash: record.hash,
        })
    }

    async fn list(&self, status: &AccessStatus) -> ListSummary {
        let mut records: Vec<MediaRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let items: Vec<ListItem> = records
            .into_iter()
            .map(|record| {
                let owned = status.principal.is_some() && record.owner == status.principal;
                if status.capabilities.read || owned {
                    ListItem::Entry(record)
                } else {
                    ListItem::Error {
                        media_id: record.media_id,
                        error: "access denied".to_string(),
                    }
                }
            })
            .collect();

        ListSummary {
            count: items.len(),
            errors: items
                .iter()
                .filter(|i| matches!(i, ListItem::Error { .. }))
                .count(),
            items,
        }
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(
            "Zone store closed ({} objects, {} staged writes dropped)",
            self.records.len(),
            self.staged.len()
        );
        self.staged.clear();
        Ok(())
    }
}
