/// Joins URL segments with exactly one `/` between each pair.
/// Joining stops at the first empty segment after the base.
pub fn path_join(base: &str, segments: &[&str]) -> String {
    let mut joined = base.to_string();
    for segment in segments {
        if segment.is_empty() {
            break;
        }
        let clean = segment.strip_prefix('/').unwrap_or(segment);
        if !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(clean);
    }
    joined
}

/// Normalizes a route prefix to either `/` or `/something`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
