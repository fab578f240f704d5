//! Resource handle arena and intra-document reference rewriting.
//!
//! Every manifest resource is materialized once into a [`ResourceStore`]
//! owned by the book, keyed by its resolved container path. Spine documents
//! are rewritten so that relative references point at the store's opaque
//! `res://` handles; a reference with no matching handle is left untouched
//! (a broken image, not a broken book).

use std::collections::HashMap;
use std::sync::LazyLock;

use memchr::memmem;
use regex::{Captures, Regex};
use tracing::debug;

use crate::util::{is_external, resolve_href, strip_fragment};

const HANDLE_SCHEME: &str = "res://";

/// Arena of materialized resources with stable, revocable handles.
///
/// Handles stay valid until [`ResourceStore::release`], which drops every
/// byte buffer in one pass. Lookups after release return `None`.
#[derive(Debug, Default)]
pub struct ResourceStore {
    entries: HashMap<String, ResourceEntry>,
    released: bool,
}

#[derive(Debug)]
struct ResourceEntry {
    url: String,
    media_type: String,
    data: Vec<u8>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a resource, returning its handle URL.
    ///
    /// Re-inserting an href keeps the original handle.
    pub fn insert(
        &mut self,
        href: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> String {
        let url = format!("{HANDLE_SCHEME}{}", self.entries.len());
        let entry = self
            .entries
            .entry(href.into())
            .or_insert_with(|| ResourceEntry {
                url,
                media_type: media_type.into(),
                data,
            });
        entry.url.clone()
    }

    /// Handle URL for a resolved href.
    pub fn url_for(&self, href: &str) -> Option<&str> {
        if self.released {
            return None;
        }
        self.entries.get(href).map(|e| e.url.as_str())
    }

    /// Raw bytes behind a resolved href.
    pub fn bytes(&self, href: &str) -> Option<&[u8]> {
        if self.released {
            return None;
        }
        self.entries.get(href).map(|e| e.data.as_slice())
    }

    /// Media type of a resolved href.
    pub fn media_type(&self, href: &str) -> Option<&str> {
        if self.released {
            return None;
        }
        self.entries.get(href).map(|e| e.media_type.as_str())
    }

    /// Resolve a handle URL back to its bytes.
    pub fn bytes_for_url(&self, url: &str) -> Option<&[u8]> {
        if self.released {
            return None;
        }
        self.entries
            .values()
            .find(|e| e.url == url)
            .map(|e| e.data.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bulk-release every handle. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            debug!(count = self.entries.len(), "releasing resource handles");
        }
        self.entries.clear();
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

// Attribute-style references: src, href, and cross-namespace link attributes.
static ATTR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<attr>(?:[A-Za-z]+:)?(?:href|src))\s*=\s*(?P<q>["'])(?P<url>[^"']*)["']"#)
        .expect("attribute reference pattern")
});

// Embedded style references: url(...) in inline styles and style blocks.
static URL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?P<q>["']?)(?P<url>[^"')]+)["']?\s*\)"#).expect("url() pattern")
});

/// Rewrite a spine document's references against the store.
///
/// `base_dir` is the directory of the document being rewritten. References
/// that are external, fragment-only, empty, or already rewritten pass through
/// unchanged, as does anything the store has no handle for.
pub fn rewrite_content(content: &str, base_dir: &str, store: &ResourceStore) -> String {
    // Fast path: nothing that could hold a reference.
    let bytes = content.as_bytes();
    if memmem::find(bytes, b"src").is_none()
        && memmem::find(bytes, b"href").is_none()
        && memmem::find(bytes, b"url(").is_none()
    {
        return content.to_string();
    }

    let pass1 = ATTR_REF.replace_all(content, |caps: &Captures<'_>| {
        match lookup(&caps["url"], base_dir, store) {
            Some(url) => format!("{}={q}{url}{q}", &caps["attr"], q = &caps["q"]),
            None => caps[0].to_string(),
        }
    });

    URL_REF
        .replace_all(&pass1, |caps: &Captures<'_>| {
            match lookup(&caps["url"], base_dir, store) {
                Some(url) => format!("url({q}{url}{q})", q = &caps["q"]),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Resolve one raw reference to a handle URL, preserving its fragment.
fn lookup(raw: &str, base_dir: &str, store: &ResourceStore) -> Option<String> {
    if raw.is_empty() || is_external(raw) || raw.starts_with(HANDLE_SCHEME) {
        return None;
    }

    let resolved = resolve_href(base_dir, raw);
    match store.url_for(&resolved) {
        Some(url) => {
            let fragment = &raw[strip_fragment(raw).len()..];
            Some(format!("{url}{fragment}"))
        }
        None => {
            debug!(reference = raw, "no handle for reference, leaving as-is");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> ResourceStore {
        let mut store = ResourceStore::new();
        store.insert("OEBPS/images/fig.png", "image/png", vec![1, 2, 3]);
        store.insert("OEBPS/styles/main.css", "text/css", b"body{}".to_vec());
        store.insert("OEBPS/text/ch2.xhtml", "application/xhtml+xml", vec![]);
        store
    }

    #[test]
    fn test_rewrite_src_and_href() {
        let store = sample_store();
        let html = r#"<img src="../images/fig.png"/><link href="../styles/main.css" rel="stylesheet"/>"#;
        let out = rewrite_content(html, "OEBPS/text", &store);
        assert!(!out.contains("../images/fig.png"), "raw path left behind: {out}");
        assert!(out.contains(r#"src="res://0""#));
        assert!(out.contains(r#"href="res://1""#));
    }

    #[test]
    fn test_rewrite_xlink_href() {
        let store = sample_store();
        let html = r#"<image xlink:href="../images/fig.png"/>"#;
        let out = rewrite_content(html, "OEBPS/text", &store);
        assert!(out.contains(r#"xlink:href="res://0""#));
    }

    #[test]
    fn test_rewrite_style_url() {
        let store = sample_store();
        let html = r#"<div style="background: url('../images/fig.png')"/>"#;
        let out = rewrite_content(html, "OEBPS/text", &store);
        assert!(out.contains("url('res://0')"));
    }

    #[test]
    fn test_fragment_preserved() {
        let store = sample_store();
        let html = r#"<a href="ch2.xhtml#note-4">see note</a>"#;
        let out = rewrite_content(html, "OEBPS/text", &store);
        assert!(out.contains(r#"href="res://2#note-4""#));
    }

    #[test]
    fn test_external_and_fragment_only_untouched() {
        let store = sample_store();
        let html = r##"<a href="https://example.com">x</a><a href="#local">y</a>"##;
        assert_eq!(rewrite_content(html, "OEBPS/text", &store), html);
    }

    #[test]
    fn test_unresolved_left_as_is() {
        let store = sample_store();
        let html = r#"<img src="missing.png"/>"#;
        assert_eq!(rewrite_content(html, "OEBPS/text", &store), html);
    }

    #[test]
    fn test_already_rewritten_stable() {
        let store = sample_store();
        let html = r#"<img src="res://0"/>"#;
        assert_eq!(rewrite_content(html, "OEBPS/text", &store), html);
    }

    #[test]
    fn test_release_revokes_handles() {
        let mut store = sample_store();
        assert!(store.url_for("OEBPS/images/fig.png").is_some());
        store.release();
        assert!(store.url_for("OEBPS/images/fig.png").is_none());
        assert!(store.bytes("OEBPS/images/fig.png").is_none());
        store.release(); // idempotent
        assert!(store.is_released());
    }
}
