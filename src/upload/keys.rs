//! Storage key and object URL helpers

use uuid::Uuid;

/// Replace characters outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

/// Build the object key: `{prefix}/{knowledge_base_id}/{id}-{sanitized name}`.
///
/// An empty prefix is omitted.
pub fn storage_key(prefix: &str, knowledge_base_id: &str, name: &str, id: Uuid) -> String {
    let prefix = prefix.trim_matches('/');
    let file = format!("{}-{}", id, sanitize_file_name(name));
    if prefix.is_empty() {
        format!("{}/{}", knowledge_base_id, file)
    } else {
        format!("{}/{}/{}", prefix, knowledge_base_id, file)
    }
}

/// Strip the signature query string from a signed URL.
pub fn object_url(signed_url: &str) -> String {
    signed_url
        .split_once('?')
        .map(|(base, _)| base)
        .unwrap_or(signed_url)
        .to_string()
}
