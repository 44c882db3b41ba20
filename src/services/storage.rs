use crate::models::{AccessStatus, MediaDescriptor, MediaRecord, StageToken, ZoneConfig};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Object of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Store is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// How `add_entry` should treat the descriptor's stage token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create a new object (or a new staged write in a staged zone).
    Create,
    /// Append to the staged write named by the descriptor.
    Append,
}

/// Result of a successful `add_entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub media_id: String,
    pub zone: String,
    /// Set when the write is staged and needs a commit.
    pub stage: Option<StageToken>,
}

/// What `delete` should remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Media(String),
    Staged(StageToken),
}

/// Content of a committed object.
#[derive(Debug, Clone)]
pub struct MediaContent {
    pub data: Bytes,
    pub name: String,
    pub mimetype: String,
    pub size: u64,
    pub hash: String,
}

/// Outcome of a full re-read of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct IntegrityReport {
    pub hash: String,
    /// Hash recorded when the object was written, if any.
    pub previous_hash: Option<String>,
    pub size: u64,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.previous_hash
            .as_deref()
            .is_none_or(|previous| previous == self.hash)
    }
}

/// One line of a listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ListItem {
    Entry(MediaRecord),
    Error { media_id: String, error: String },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListSummary {
    pub count: usize,
    pub errors: usize,
    pub items: Vec<ListItem>,
}

/// Durable storage organised into zones.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn init(&self, zones: &[ZoneConfig]) -> StoreResult<()>;

    async fn add_entry(
        &self,
        descriptor: &MediaDescriptor,
        status: &AccessStatus,
        content: Bytes,
        mode: WriteMode,
    ) -> StoreResult<AddOutcome>;

    async fn commit(&self, token: &StageToken, status: &AccessStatus) -> StoreResult<String>;

    async fn delete(&self, target: &DeleteTarget, status: &AccessStatus) -> StoreResult<()>;

    async fn check(&self, media_id: &str, status: &AccessStatus) -> StoreResult<IntegrityReport>;

    /// Resolves an external id to the handle of its committed object.
    async fn get(&self, media_id: &str, status: &AccessStatus) -> Option<String>;

    async fn find(&self, handle: &str, status: &AccessStatus) -> StoreResult<MediaContent>;

    async fn list(&self, status: &AccessStatus) -> ListSummary;

    async fn close(&self) -> StoreResult<()>;
}
