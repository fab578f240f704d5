//! Path resolution and text decoding helpers shared across the crate.

use std::borrow::Cow;

/// Resolve a relative `href` against the directory of a referencing document.
///
/// `base_dir` is the directory portion of the referencing document's path
/// within the container (empty for the container root). The fragment/query is
/// stripped, percent-escapes are decoded, and `.`/`..`/empty segments are
/// collapsed, so the result is a stable absolute-within-container path
/// suitable as a lookup key.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = strip_fragment(href);
    let href = percent_decode(href);

    let mut segments: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Strip a `#fragment` or `?query` suffix.
pub fn strip_fragment(href: &str) -> &str {
    let end = href.find(['#', '?']).unwrap_or(href.len());
    &href[..end]
}

/// Percent-decode a path, falling back to the input when the escapes are not
/// valid UTF-8 (seen in malformed containers).
pub fn percent_decode(path: &str) -> Cow<'_, str> {
    percent_encoding::percent_decode_str(path)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(path))
}

/// The directory portion of a container path ("" for root-level entries).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Whether a reference points outside the container and must not be rewritten.
pub fn is_external(href: &str) -> bool {
    href.starts_with("http://")
        || href.starts_with("https://")
        || href.starts_with("mailto:")
        || href.starts_with("data:")
        || href.starts_with("blob:")
        || href.starts_with('#')
}

/// Strip UTF-8 BOM (byte order mark) if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Decode bytes to a string, handling various encodings.
///
/// Tries UTF-8 first (BOM handled by encoding_rs), then falls back to
/// Windows-1252, which is a superset of Latin-1 and common in old ebooks.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);
    if !malformed {
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}
