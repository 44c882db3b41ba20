use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Kind of media carried by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    File,
    Stream,
    Indirect,
}

/// Upload metadata sent by the caller in the `file-metadata` header.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct MediaDescriptor {
    /// External identifier; absent on a first upload.
    #[serde(default)]
    #[validate(custom(function = "crate::utils::validation::validate_identifier"))]
    pub media_id: Option<String>,
    pub media_type: MediaType,
    #[validate(
        length(min = 1, max = 255, message = "media_name must be 1 to 255 characters"),
        custom(function = "crate::utils::validation::validate_media_name")
    )]
    pub media_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    /// MIME type declared by the caller.
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub lastmodification_date: Option<String>,
    #[serde(default)]
    pub zone_name: Option<String>,
    #[serde(default)]
    pub commit_uuid: Option<String>,
}

impl MediaDescriptor {
    /// The stage token carried by the descriptor, when both halves are set.
    pub fn stage_token(&self) -> Option<StageToken> {
        match (&self.zone_name, &self.commit_uuid) {
            (Some(zone), Some(commit)) => Some(StageToken::new(zone.clone(), commit.clone())),
            _ => None,
        }
    }
}

/// Capabilities granted to a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub execute: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        read: false,
        write: false,
        execute: false,
    };

    pub const ALL: Self = Self {
        read: true,
        write: true,
        execute: true,
    };

    /// Grants held by both sides.
    pub fn intersect(self, other: Self) -> Self {
        Self {
            read: self.read && other.read,
            write: self.write && other.write,
            execute: self.execute && other.execute,
        }
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' }
        )
    }
}

/// Access status of one request: who is calling and what they may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessStatus {
    pub principal: Option<String>,
    pub group: Option<String>,
    pub capabilities: Capabilities,
}

impl AccessStatus {
    pub fn anonymous(capabilities: Capabilities) -> Self {
        Self {
            principal: None,
            group: None,
            capabilities,
        }
    }

    pub fn authenticated(principal: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            principal: Some(principal.into()),
            group: None,
            capabilities,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }

    pub fn principal_name(&self) -> &str {
        self.principal.as_deref().unwrap_or("-")
    }
}

/// Identifies a staged write that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct StageToken {
    pub zone_name: String,
    pub commit_uuid: String,
}

impl StageToken {
    pub fn new(zone_name: impl Into<String>, commit_uuid: impl Into<String>) -> Self {
        Self {
            zone_name: zone_name.into(),
            commit_uuid: commit_uuid.into(),
        }
    }
}

impl std::fmt::Display for StageToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.zone_name, self.commit_uuid)
    }
}

/// A durable storage partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    /// Directory relative to the media root; defaults to the zone name.
    #[serde(default)]
    pub path: Option<String>,
    /// Writes into a staged zone must be committed before they are visible.
    #[serde(default)]
    pub staged: bool,
}

impl ZoneConfig {
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            staged: false,
        }
    }

    pub fn staged(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            staged: true,
        }
    }

    pub fn directory(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

/// Record kept by the store for each committed object.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MediaRecord {
    pub media_id: String,
    pub handle: String,
    pub zone: String,
    pub media_name: String,
    pub media_type: MediaType,
    pub mimetype: String,
    pub size: u64,
    pub hash: String,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_parsing() {
        let raw = r#"{"media_id":null,"media_type":"FILE","media_name":"a.txt","file_size":12}"#;
        let descriptor: MediaDescriptor = serde_json::from_str(raw).unwrap();
        assert!(descriptor.media_id.is_none());
        assert_eq!(descriptor.media_type, MediaType::File);
        assert_eq!(descriptor.file_size, Some(12));
        assert!(descriptor.stage_token().is_none());
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_descriptor_rejects_unknown_media_type() {
        let raw = r#"{"media_type":"FOLDER","media_name":"a.txt"}"#;
        assert!(serde_json::from_str::<MediaDescriptor>(raw).is_err());
    }

    #[test]
    fn test_descriptor_validation() {
        let raw = r#"{"media_type":"FILE","media_name":"../etc/passwd"}"#;
        let descriptor: MediaDescriptor = serde_json::from_str(raw).unwrap();
        assert!(descriptor.validate().is_err());

        let raw = r#"{"media_type":"FILE","media_name":""}"#;
        let descriptor: MediaDescriptor = serde_json::from_str(raw).unwrap();
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_capabilities_display_and_intersect() {
        let rw = Capabilities {
            read: true,
            write: true,
            execute: false,
        };
        assert_eq!(rw.to_string(), "rw-");
        assert_eq!(Capabilities::ALL.intersect(rw), rw);
        assert_eq!(Capabilities::NONE.to_string(), "---");
    }
}
