use crate::models::{AccessStatus, Capabilities};
use crate::utils::auth::validate_jwt;
use axum::http::{HeaderMap, header};
use serde::Deserialize;

/// Capabilities an operation requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityMask {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl CapabilityMask {
    /// list, retrieval, integrity check and connector access
    pub const NONE: Self = Self::new(false, false, false);
    /// fresh or appended upload
    pub const WRITE: Self = Self::new(false, true, false);
    /// commit and token forging
    pub const EXECUTE: Self = Self::new(false, false, true);
    /// delete
    pub const WRITE_EXECUTE: Self = Self::new(false, true, true);

    const fn new(read: bool, write: bool, execute: bool) -> Self {
        Self {
            read,
            write,
            execute,
        }
    }

    pub fn satisfied_by(&self, granted: &Capabilities) -> bool {
        (!self.read || granted.read)
            && (!self.write || granted.write)
            && (!self.execute || granted.execute)
    }
}

impl std::fmt::Display for CapabilityMask {
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

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// No principal could be established.
    Unauthenticated,
    /// The principal lacks a required capability.
    Insufficient {
        principal: String,
        required: CapabilityMask,
    },
}

/// Enforces per-operation capability masks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityGate;

impl CapabilityGate {
    pub fn check(&self, status: &AccessStatus, mask: CapabilityMask) -> Result<(), Denial> {
        if mask.satisfied_by(&status.capabilities) {
            return Ok(());
        }
        match &status.principal {
            None => Err(Denial::Unauthenticated),
            Some(principal) => Err(Denial::Insufficient {
                principal: principal.clone(),
                required: mask,
            }),
        }
    }
}

/// Establishes who is calling and what they were granted.
pub trait AccessResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap, query: Option<&str>) -> AccessStatus;
}

/// Name of the cookie carrying a capability token.
pub const AUTH_COOKIE: &str = "media.auth";

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Resolves capability tokens signed with the gateway secret.
pub struct JwtAccessResolver {
    secret: String,
    anonymous: Capabilities,
}

impl JwtAccessResolver {
    pub fn new(secret: impl Into<String>, anonymous: Capabilities) -> Self {
        Self {
            secret: secret.into(),
            anonymous,
        }
    }

    fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|s| s.trim().to_string());
        if bearer.is_some() {
            return bearer;
        }

        let storage_cookie = headers
            .get("storage-cookie")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.trim().to_string());
        if storage_cookie.is_some() {
            return storage_cookie;
        }

        let cookie = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|h| h.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == AUTH_COOKIE)
            .map(|(_, value)| value.to_string());
        if cookie.is_some() {
            return cookie;
        }

        query
            .and_then(|q| serde_urlencoded::from_str::<TokenQuery>(q).ok())
            .and_then(|q| q.token)
    }
}

impl AccessResolver for JwtAccessResolver {
    fn resolve(&self, headers: &HeaderMap, query: Option<&str>) -> AccessStatus {
        let Some(token) = Self::extract_token(headers, query) else {
            return AccessStatus::anonymous(self.anonymous);
        };

        match validate_jwt(&token, &self.secret) {
            Ok(claims) => AccessStatus {
                principal: Some(claims.name),
                group: claims.group,
                capabilities: claims.capabilities,
            },
            Err(e) => {
                tracing::warn!("Rejected capability token: {}", e);
                AccessStatus::anonymous(self.anonymous)
            }
        }
    }
}
