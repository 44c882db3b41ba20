use std::borrow::Cow;
use validator::ValidationError;

/// Longest identifier accepted for media ids and commit ids.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Validates an externally assigned identifier.
/// Only ASCII alphanumerics, `-`, `_` and `.` are accepted, and never `..`.
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LEN {
        return Err(error(
            "INVALID_IDENTIFIER",
            format!("identifier must be 1 to {} characters", MAX_IDENTIFIER_LEN),
        ));
    }
    if id.contains("..")
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(error(
            "INVALID_IDENTIFIER",
            format!("identifier '{}' contains forbidden characters", id),
        ));
    }
    Ok(())
}

/// Validates a display name: a plain file name, no path components.
pub fn validate_media_name(name: &str) -> Result<(), ValidationError> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        tracing::warn!("Path traversal attempt detected in media name: {}", name);
        return Err(error(
            "INVALID_MEDIA_NAME",
            "media_name must not contain path separators".to_string(),
        ));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(error(
            "INVALID_MEDIA_NAME",
            "media_name must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

fn error(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Owned(message))
}

/// Resolves the MIME type of an object: the declared type first, then magic
/// bytes, then the file extension, then `application/octet-stream`.
pub fn resolve_mime_type(declared: Option<&str>, name: &str, content: &[u8]) -> String {
    if let Some(declared) = declared {
        let normalized = declared
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if normalized.parse::<mime::Mime>().is_ok() {
            return normalized;
        }
    }

    if let Some(kind) = infer::get(content) {
        return kind.mime_type().to_string();
    }

    let extension = name.rsplit('.').next().unwrap_or("").to_lowercase();
    let by_extension = match extension.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "geojson" => "application/geo+json",
        "xml" => "application/xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => mime::APPLICATION_OCTET_STREAM.as_ref(),
    };
    by_extension.to_string()
}
