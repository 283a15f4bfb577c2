//! Interactive API docs rewriting
//!
//! Docs pages served through a tunnel reference their schema at an
//! absolute `/openapi.json`, which would resolve against the broker root.
//! The reference is re-rooted under the tunnel prefix.

use bytes::Bytes;

use apix_core::TunnelId;

/// Whether a response body qualifies for the docs rewrite
pub fn is_docs_page(path: &str, content_type: Option<&str>) -> bool {
    let is_html = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false);
    is_html && path.ends_with("docs")
}

/// Re-root quoted `/openapi.json` references under `/<tunnel_id>`.
///
/// Bodies that are not HTML docs pages, or not valid UTF-8, are returned
/// unchanged.
pub fn rewrite_docs_body(
    tunnel_id: &TunnelId,
    path: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Bytes {
    if !is_docs_page(path, content_type) {
        return body;
    }
    let Ok(text) = std::str::from_utf8(&body) else {
        return body;
    };
    if !text.contains("/openapi.json") {
        return body;
    }

    let rewritten = text
        .replace(
            "\"/openapi.json\"",
            &format!("\"/{}/openapi.json\"", tunnel_id),
        )
        .replace("'/openapi.json'", &format!("'/{}/openapi.json'", tunnel_id));
    Bytes::from(rewritten)
}
