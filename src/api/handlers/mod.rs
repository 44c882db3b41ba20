pub mod auth;
pub mod health;
pub mod manage;
pub mod media;
pub mod upload;

use axum::http::{HeaderMap, header};

pub const FILE_METADATA: &str = "file-metadata";
pub const ACCESS_METHOD: &str = "media-access-method";
pub const ACCESS_COMPRESSION: &str = "media-access-compression";
pub const MEDIA_COMMIT: &str = "media-commit";
pub const MEDIA_DELETE: &str = "media-delete";

/// First readable value among the spellings of a header.
fn header_str<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn file_metadata(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, &[FILE_METADATA, "file_metadata"])
}

pub(crate) fn access_method(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, &[ACCESS_METHOD])
}

pub(crate) fn wants_compression(headers: &HeaderMap) -> bool {
    header_str(headers, &[ACCESS_COMPRESSION]).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

pub(crate) fn media_commit(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, &[MEDIA_COMMIT, "media_commit"])
}

pub(crate) fn media_delete(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, &[MEDIA_DELETE, "media_delete"])
}
