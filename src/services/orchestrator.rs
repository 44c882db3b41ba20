//! Request orchestration: every gateway operation runs its capability check
//! first, then drives ingestion and the store, and maps the outcome.

use crate::api::error::AppError;
use crate::config::GatewayConfig;
use crate::models::{AccessStatus, Capabilities, MediaDescriptor, StageToken};
use crate::services::access::{CapabilityGate, CapabilityMask};
use crate::services::ingest::IngestBuffer;
use crate::services::storage::{
    DeleteTarget, IntegrityReport, ListSummary, MediaStore, WriteMode,
};
use crate::utils::auth::{TokenSubject, create_jwt};
use crate::utils::url::path_join;
use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use futures::Stream;
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// Growth increment used to read small JSON bodies.
pub const SMALL_BODY_INCREMENT: usize = 4096;

/// Retrieval mode selected by the `media-access-method` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Indirect,
    Direct,
    Check,
}

impl AccessMode {
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("direct") => AccessMode::Direct,
            Some(v) if v.eq_ignore_ascii_case("check") => AccessMode::Check,
            _ => AccessMode::Indirect,
        }
    }
}

/// Upload accepted for streaming.
#[derive(Debug, Clone)]
pub struct IngestPlan {
    pub descriptor: MediaDescriptor,
    pub mode: WriteMode,
    pub size_hint: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Committed { media_id: String },
    Staged { media_id: String, token: StageToken },
}

impl IngestOutcome {
    pub fn media_id(&self) -> &str {
        match self {
            IngestOutcome::Committed { media_id } | IngestOutcome::Staged { media_id, .. } => {
                media_id
            }
        }
    }
}

/// Content ready to be sent to the caller.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Bytes,
    pub file_name: String,
    pub content_type: String,
    /// Hash of the stored bytes; absent when the body is compressed.
    pub digest: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Retrieval {
    Connector { url: String },
    Content(Delivery),
    Integrity(IntegrityReport),
}

/// Half-filled stage token, as found in a query string or a JSON document.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StageTokenInput {
    pub zone_name: Option<String>,
    pub commit_uuid: Option<String>,
}

impl StageTokenInput {
    fn complete(self) -> Option<StageToken> {
        match (self.zone_name, self.commit_uuid) {
            (Some(zone), Some(commit)) if !zone.is_empty() && !commit.is_empty() => {
                Some(StageToken::new(zone, commit))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteDocument {
    pub uuid: Option<String>,
}

/// Places a commit or delete request may carry its target, in preference order.
pub struct TargetSources<'a, S> {
    pub path_id: Option<&'a str>,
    pub query: StageTokenInput,
    pub header: Option<&'a str>,
    pub body: S,
    pub content_length: Option<u64>,
}

/// Identity a new token is forged for.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgeRequest {
    /// String or number
    #[schema(value_type = Option<String>)]
    pub user_id: Option<serde_json::Value>,
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    pub read: Option<bool>,
    pub write: Option<bool>,
    pub execute: Option<bool>,
}

impl ForgeRequest {
    fn user_id(&self) -> Option<String> {
        match self.user_id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Requested grants; an omitted grant asks for whatever the issuer holds.
    fn requested(&self) -> Capabilities {
        Capabilities {
            read: self.read.unwrap_or(true),
            write: self.write.unwrap_or(true),
            execute: self.execute.unwrap_or(true),
        }
    }
}

pub struct MediaOrchestrator {
    store: Arc<dyn MediaStore>,
    gate: CapabilityGate,
    config: GatewayConfig,
}

impl MediaOrchestrator {
    pub fn new(store: Arc<dyn MediaStore>, config: GatewayConfig) -> Self {
        Self {
            store,
            gate: CapabilityGate,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Everything an upload needs settled before its body is read.
    pub fn prepare_ingest(
        &self,
        status: &AccessStatus,
        raw_metadata: Option<&str>,
        content_length: Option<u64>,
        append: bool,
    ) -> Result<IngestPlan, AppError> {
        self.gate.check(status, CapabilityMask::WRITE)?;

        let raw = raw_metadata.ok_or_else(|| {
            tracing::warn!("Upload without metadata from {}", status.principal_name());
            AppError::BadRequest("no metadata provided in headers".to_string())
        })?;
        let descriptor: MediaDescriptor = serde_json::from_str(raw).map_err(|e| {
            tracing::error!("Malformed metadata {}: {}", raw, e);
            AppError::BadRequest("malformed metadata".to_string())
        })?;
        descriptor
            .validate()
            .map_err(|e| AppError::BadRequest(format!("invalid metadata: {}", e)))?;

        let mode = if append {
            if descriptor.stage_token().is_none() {
                return Err(AppError::BadRequest(
                    "append requires zone_name and commit_uuid in metadata".to_string(),
                ));
            }
            WriteMode::Append
        } else {
            WriteMode::Create
        };

        let hint = descriptor
            .file_size
            .filter(|&size| size > 0)
            .or(content_length.filter(|&size| size > 0))
            .unwrap_or(self.config.chunk_size as u64);
        if hint > self.config.max_file_size {
            tracing::error!(
                "Upload of {} bytes refused for {}",
                hint,
                descriptor.media_name
            );
            return Err(AppError::PayloadTooLarge(format!(
                "file too large ({} bytes, limit {})",
                hint, self.config.max_file_size
            )));
        }
        let size_hint = usize::try_from(hint)
            .map_err(|_| AppError::PayloadTooLarge("file too large".to_string()))?;

        Ok(IngestPlan {
            descriptor,
            mode,
            size_hint,
        })
    }

    /// Streams the body into an ingest buffer and hands the artifact to the store.
    pub async fn ingest<S, B, E>(
        &self,
        plan: IngestPlan,
        status: &AccessStatus,
        body: S,
        on_progress: Option<&mut (dyn FnMut(u64) + Send)>,
    ) -> Result<IngestOutcome, AppError>
    where
        S: Stream<Item = Result<B, E>> + Unpin + Send,
        B: AsRef<[u8]> + Send,
        E: std::fmt::Display,
    {
        let mut buffer = IngestBuffer::new(self.config.chunk_size, plan.size_hint)?
            .with_limit(self.config.max_file_size);
        let size = buffer.consume(body, on_progress).await?;
        tracing::debug!(
            "Received {} bytes for {} ({} growths)",
            size,
            plan.descriptor.media_name,
            buffer.growths()
        );

        let outcome = self
            .store
            .add_entry(&plan.descriptor, status, buffer.finalize(), plan.mode)
            .await?;

        Ok(match outcome.stage {
            Some(token) => {
                tracing::info!("Media {} staged as {}", outcome.media_id, token);
                IngestOutcome::Staged {
                    media_id: outcome.media_id,
                    token,
                }
            }
            None => {
                tracing::info!(
                    "Media {} committed in zone '{}'",
                    outcome.media_id,
                    outcome.zone
                );
                IngestOutcome::Committed {
                    media_id: outcome.media_id,
                }
            }
        })
    }

    pub async fn commit<S, B, E>(
        &self,
        status: &AccessStatus,
        sources: TargetSources<'_, S>,
    ) -> Result<String, AppError>
    where
        S: Stream<Item = Result<B, E>> + Unpin + Send,
        B: AsRef<[u8]> + Send,
        E: std::fmt::Display,
    {
        self.gate.check(status, CapabilityMask::EXECUTE)?;

        let token = match sources.query.complete() {
            Some(token) => token,
            None => {
                let raw = match sources.header {
                    Some(header) => Bytes::copy_from_slice(header.as_bytes()),
                    None => read_small_body(sources.body, sources.content_length).await?,
                };
                let input: StageTokenInput = serde_json::from_slice(&raw).map_err(|e| {
                    tracing::error!("Malformed commit message: {}", e);
                    AppError::BadRequest("malformed metadata".to_string())
                })?;
                let zone_name = input
                    .zone_name
                    .filter(|z| !z.is_empty())
                    .ok_or_else(|| {
                        AppError::BadRequest("zone_name missing in metadata".to_string())
                    })?;
                let commit_uuid = input
                    .commit_uuid
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        AppError::BadRequest("commit_uuid missing in metadata".to_string())
                    })?;
                StageToken::new(zone_name, commit_uuid)
            }
        };

        Ok(self.store.commit(&token, status).await?)
    }

    pub async fn delete<S, B, E>(
        &self,
        status: &AccessStatus,
        sources: TargetSources<'_, S>,
    ) -> Result<(), AppError>
    where
        S: Stream<Item = Result<B, E>> + Unpin + Send,
        B: AsRef<[u8]> + Send,
        E: std::fmt::Display,
    {
        self.gate.check(status, CapabilityMask::WRITE_EXECUTE)?;

        let target = if let Some(id) = sources.path_id {
            DeleteTarget::Media(id.to_string())
        } else if let Some(token) = sources.query.complete() {
            DeleteTarget::Staged(token)
        } else {
            let raw = match sources.header {
                Some(header) => Bytes::copy_from_slice(header.as_bytes()),
                None => read_small_body(sources.body, sources.content_length).await?,
            };
            let document: DeleteDocument = serde_json::from_slice(&raw).map_err(|e| {
                tracing::error!("Malformed delete message: {}", e);
                AppError::BadRequest("malformed metadata".to_string())
            })?;
            let uuid = document
                .uuid
                .filter(|u| !u.is_empty())
                .ok_or_else(|| AppError::BadRequest("uuid missing in metadata".to_string()))?;
            DeleteTarget::Media(uuid)
        };

        self.store.delete(&target, status).await?;
        tracing::info!("Delete of {:?} by {}", target, status.principal_name());
        Ok(())
    }

    pub async fn list(&self, status: &AccessStatus) -> Result<ListSummary, AppError> {
        self.gate.check(status, CapabilityMask::NONE)?;
        let summary = self.store.list(status).await;
        tracing::debug!(
            "Listing for {}: {} items, {} errors",
            status.principal_name(),
            summary.count,
            summary.errors
        );
        if status.is_anonymous() && summary.count == summary.errors {
            return Err(AppError::Unauthorized("access denied".to_string()));
        }
        Ok(summary)
    }

    pub async fn retrieve(
        &self,
        status: &AccessStatus,
        media_id: &str,
        mode: AccessMode,
        compress: bool,
    ) -> Result<Retrieval, AppError> {
        self.gate.check(status, CapabilityMask::NONE)?;

        match mode {
            AccessMode::Indirect => {
                let handle = self.resolve_handle(status, media_id).await?;
                tracing::info!("Connector access to {}", media_id);
                Ok(Retrieval::Connector {
                    url: path_join(
                        &self.config.public_url,
                        &[&self.config.server_prefix, "storage", &handle],
                    ),
                })
            }
            AccessMode::Direct => {
                let handle = self.resolve_handle(status, media_id).await?;
                tracing::info!("Direct access to {}", media_id);
                Ok(Retrieval::Content(
                    self.file_content(status, &handle, compress).await?,
                ))
            }
            AccessMode::Check => {
                let report = self.store.check(media_id, status).await?;
                if !report.is_consistent() {
                    tracing::error!(
                        "Media changed on disk for {} hash={} previously={}",
                        media_id,
                        report.hash,
                        report.previous_hash.as_deref().unwrap_or("-")
                    );
                }
                tracing::info!("Full read of media {}", media_id);
                Ok(Retrieval::Integrity(report))
            }
        }
    }

    /// Retrieval keyed by the `media_id` of a metadata header.
    pub async fn retrieve_described(
        &self,
        status: &AccessStatus,
        raw_metadata: Option<&str>,
        mode: AccessMode,
        compress: bool,
    ) -> Result<Retrieval, AppError> {
        self.gate.check(status, CapabilityMask::NONE)?;
        let raw = raw_metadata.ok_or_else(|| {
            AppError::BadRequest("media storage gateway, access restricted".to_string())
        })?;
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|_| AppError::BadRequest("malformed metadata".to_string()))?;
        let media_id = value
            .get("media_id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("uuid missing in metadata".to_string()))?;
        self.retrieve(status, media_id, mode, compress).await
    }

    /// Content of a committed object by its internal handle.
    pub async fn file_content(
        &self,
        status: &AccessStatus,
        handle: &str,
        compress: bool,
    ) -> Result<Delivery, AppError> {
        self.gate.check(status, CapabilityMask::NONE)?;
        let content = self.store.find(handle, status).await.map_err(|e| {
            tracing::debug!("Content of {} unavailable: {}", handle, e);
            AppError::from(e)
        })?;

        if compress {
            match gzip(content.data.clone()).await {
                Ok(body) => {
                    return Ok(Delivery {
                        body,
                        file_name: format!("{}.gz", content.name),
                        content_type: "application/gzip".to_string(),
                        digest: None,
                    });
                }
                Err(e) => tracing::warn!("Compression of {} failed, sending raw: {}", handle, e),
            }
        }

        Ok(Delivery {
            body: content.data,
            file_name: content.name,
            content_type: content.mimetype,
            digest: Some(content.hash),
        })
    }

    /// Mints a token that never grants more than the issuer holds.
    pub fn forge_token(
        &self,
        status: &AccessStatus,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<String, AppError> {
        self.gate.check(status, CapabilityMask::EXECUTE)?;

        let is_json = content_type
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .is_some_and(|m| m.essence_str() == mime::APPLICATION_JSON.essence_str());
        if !is_json {
            return Err(AppError::BadRequest(
                "application/json Content-Type expected".to_string(),
            ));
        }
        let request: ForgeRequest = serde_json::from_slice(body)
            .map_err(|_| AppError::BadRequest("malformed application/json".to_string()))?;
        let user_id = request
            .user_id()
            .ok_or_else(|| AppError::BadRequest("missing user_id".to_string()))?;
        let user_name = request
            .user_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing user_name".to_string()))?;

        let capabilities = request.requested().intersect(status.capabilities);
        let subject = TokenSubject {
            user_id: &user_id,
            user_name,
            group_name: request.group_name.as_deref(),
            capabilities,
        };
        let token = create_jwt(&subject, &self.config.jwt_secret, self.config.token_ttl_hours)?;
        tracing::info!(
            "Forged token for {}:{} ({}) by {}",
            user_name,
            request.group_name.as_deref().unwrap_or("-"),
            capabilities,
            status.principal_name()
        );
        Ok(token)
    }

    /// Closes the store. Callers bound this with a deadline.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        tracing::info!("Closing media store");
        self.store.close().await?;
        Ok(())
    }

    async fn resolve_handle(&self, status: &AccessStatus, media_id: &str) -> Result<String, AppError> {
        self.store
            .get(media_id, status)
            .await
            .ok_or_else(|| AppError::NotFound("media uuid not found".to_string()))
    }
}

/// Reads a short JSON body through an ingest buffer.
async fn read_small_body<S, B, E>(body: S, content_length: Option<u64>) -> Result<Bytes, AppError>
where
    S: Stream<Item = Result<B, E>> + Unpin + Send,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display,
{
    let initial = content_length
        .and_then(|len| usize::try_from(len).ok())
        .filter(|&len| len > 0 && len <= SMALL_BODY_INCREMENT * 16)
        .unwrap_or(SMALL_BODY_INCREMENT);
    let mut buffer = IngestBuffer::new(SMALL_BODY_INCREMENT, initial)?
        .with_limit((SMALL_BODY_INCREMENT * 16) as u64);
    buffer.consume(body, None).await?;
    Ok(buffer.finalize())
}

async fn gzip(data: Bytes) -> std::io::Result<Bytes> {
    tokio::task::spawn_blocking(move || {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
        encoder.write_all(&data)?;
        encoder.finish().map(Bytes::from)
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZoneConfig;
    use crate::services::zone_store::ZoneStore;
    use flate2::read::GzDecoder;
    use futures::stream;
    use std::convert::Infallible;
    use std::io::Read;

    fn admin() -> AccessStatus {
        AccessStatus::authenticated("admin", Capabilities::ALL)
    }

    fn body(data: &'static [u8]) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin + Send {
        stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    fn no_body() -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin + Send {
        stream::iter(Vec::new())
    }

    async fn orchestrator(dir: &std::path::Path) -> MediaOrchestrator {
        let config = GatewayConfig::development(dir);
        let store = ZoneStore::new(dir, config.max_file_size);
        store
            .init(&[ZoneConfig::direct("main"), ZoneConfig::staged("incoming")])
            .await
            .unwrap();
        MediaOrchestrator::new(Arc::new(store), config)
    }

    #[test]
    fn test_access_mode_from_header() {
        assert_eq!(AccessMode::from_header(None), AccessMode::Indirect);
        assert_eq!(AccessMode::from_header(Some("Direct")), AccessMode::Direct);
        assert_eq!(AccessMode::from_header(Some("Check")), AccessMode::Check);
        assert_eq!(AccessMode::from_header(Some("other")), AccessMode::Indirect);
    }

    #[tokio::test]
    async fn test_size_hint_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let meta = r#"{"media_type":"FILE","media_name":"a.bin"}"#;

        let plan = orch.prepare_ingest(&admin(), Some(meta), Some(100), false).unwrap();
        assert_eq!(plan.size_hint, 100);
        let plan = orch.prepare_ingest(&admin(), Some(meta), None, false).unwrap();
        assert_eq!(plan.size_hint, 4096);

        let sized = r#"{"media_type":"FILE","media_name":"a.bin","file_size":12}"#;
        let plan = orch.prepare_ingest(&admin(), Some(sized), Some(100), false).unwrap();
        assert_eq!(plan.size_hint, 12);

        let huge = r#"{"media_type":"FILE","media_name":"a.bin","file_size":999999999999}"#;
        assert!(matches!(
            orch.prepare_ingest(&admin(), Some(huge), None, false),
            Err(AppError::PayloadTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_rejects_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let meta = r#"{"media_type":"FILE","media_name":"a.bin"}"#;

        let anonymous = AccessStatus::anonymous(Capabilities::NONE);
        assert!(matches!(
            orch.prepare_ingest(&anonymous, Some(meta), None, false),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            orch.prepare_ingest(&admin(), None, None, false),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            orch.prepare_ingest(&admin(), Some("{not json"), None, false),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            orch.prepare_ingest(&admin(), Some(meta), None, true),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_then_retrieve_all_modes() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let meta = r#"{"media_id":null,"media_type":"FILE","media_name":"a.txt","file_size":12}"#;

        let plan = orch.prepare_ingest(&admin(), Some(meta), None, false).unwrap();
        let outcome = orch
            .ingest(plan, &admin(), body(b"hello world!"), None)
            .await
            .unwrap();
        let IngestOutcome::Committed { media_id } = outcome else {
            panic!("expected a committed upload");
        };

        match orch
            .retrieve(&admin(), &media_id, AccessMode::Indirect, false)
            .await
            .unwrap()
        {
            Retrieval::Connector { url } => {
                assert!(url.starts_with("http://localhost:3000/storage/"))
            }
            other => panic!("unexpected {:?}", other),
        }

        match orch
            .retrieve(&admin(), &media_id, AccessMode::Direct, false)
            .await
            .unwrap()
        {
            Retrieval::Content(delivery) => {
                assert_eq!(&delivery.body[..], b"hello world!");
                assert_eq!(delivery.file_name, "a.txt");
                assert!(delivery.digest.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }

        match orch
            .retrieve(&admin(), &media_id, AccessMode::Direct, true)
            .await
            .unwrap()
        {
            Retrieval::Content(delivery) => {
                assert_eq!(delivery.file_name, "a.txt.gz");
                let mut plain = String::new();
                GzDecoder::new(&delivery.body[..])
                    .read_to_string(&mut plain)
                    .unwrap();
                assert_eq!(plain, "hello world!");
            }
            other => panic!("unexpected {:?}", other),
        }

        match orch
            .retrieve(&admin(), &media_id, AccessMode::Check, false)
            .await
            .unwrap()
        {
            Retrieval::Integrity(report) => {
                assert!(report.is_consistent());
                assert_eq!(report.size, 12);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commit_token_sources() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let meta = r#"{"media_type":"FILE","media_name":"s.txt","zone_name":"incoming"}"#;

        let mut tokens = Vec::new();
        for _ in 0..3 {
            let plan = orch.prepare_ingest(&admin(), Some(meta), None, false).unwrap();
            match orch.ingest(plan, &admin(), body(b"staged"), None).await.unwrap() {
                IngestOutcome::Staged { token, .. } => tokens.push(token),
                other => panic!("unexpected {:?}", other),
            }
        }

        let by_query = TargetSources {
            path_id: None,
            query: StageTokenInput {
                zone_name: Some(tokens[0].zone_name.clone()),
                commit_uuid: Some(tokens[0].commit_uuid.clone()),
            },
            header: None,
            body: no_body(),
            content_length: None,
        };
        assert!(orch.commit(&admin(), by_query).await.is_ok());

        let header = serde_json::to_string(&tokens[1]).unwrap();
        let by_header = TargetSources {
            path_id: None,
            query: StageTokenInput::default(),
            header: Some(&header),
            body: no_body(),
            content_length: None,
        };
        assert!(orch.commit(&admin(), by_header).await.is_ok());

        let json = serde_json::to_vec(&tokens[2]).unwrap();
        let by_body = TargetSources {
            path_id: None,
            query: StageTokenInput::default(),
            header: None,
            body: stream::iter(vec![Ok::<_, Infallible>(Bytes::from(json))]),
            content_length: None,
        };
        assert!(orch.commit(&admin(), by_body).await.is_ok());

        let missing = TargetSources {
            path_id: None,
            query: StageTokenInput::default(),
            header: Some(r#"{"zone_name":"incoming"}"#),
            body: no_body(),
            content_length: None,
        };
        assert!(matches!(
            orch.commit(&admin(), missing).await,
            Err(AppError::BadRequest(msg)) if msg.contains("commit_uuid")
        ));
    }

    #[tokio::test]
    async fn test_forge_token_intersects_grants() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let issuer = AccessStatus::authenticated(
            "ops",
            Capabilities {
                read: true,
                write: false,
                execute: true,
            },
        );

        let token = orch
            .forge_token(
                &issuer,
                Some("application/json"),
                br#"{"user_id":42,"user_name":"dave","write":true}"#,
            )
            .unwrap();
        let claims = crate::utils::auth::validate_jwt(&token, "development-secret").unwrap();
        assert_eq!(claims.sub, "42");
        assert!(claims.capabilities.read);
        assert!(!claims.capabilities.write);

        assert!(matches!(
            orch.forge_token(&issuer, Some("text/plain"), b"{}"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            orch.forge_token(&issuer, Some("application/json"), br#"{"user_id":1}"#),
            Err(AppError::BadRequest(msg)) if msg == "missing user_name"
        ));
    }

    #[tokio::test]
    async fn test_list_denies_anonymous_without_visible_items() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let anonymous = AccessStatus::anonymous(Capabilities::NONE);
        assert!(matches!(
            orch.list(&anonymous).await,
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(orch.list(&admin()).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_store() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        orch.shutdown().await.unwrap();
        assert!(matches!(
            orch.retrieve(&admin(), "x", AccessMode::Check, false).await,
            Err(AppError::Engine(_))
        ));
    }
}
