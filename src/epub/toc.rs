//! Table-of-contents extraction: EPUB 3 navigation documents with a legacy
//! NCX fallback.

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::archive::Archive;
use crate::book::TocEntry;
use crate::epub::parser::{PackageDoc, local_name, resolve_entity};
use crate::util::{parent_dir, resolve_href};

/// Build the TOC forest for a package.
///
/// Prefers the navigation document; falls back to the NCX when the nav is
/// absent or yields nothing. A book with neither source simply has an empty
/// outline — never an error.
pub fn build_toc(archive: &mut Archive, pkg: &PackageDoc) -> Vec<TocEntry> {
    if let Some(href) = pkg.nav_href()
        && let Some(content) = archive.read_text(href)
    {
        let entries = parse_nav(&content, parent_dir(href));
        if !entries.is_empty() {
            return entries;
        }
        debug!(href, "navigation document yielded no outline");
    }

    if let Some(href) = pkg.ncx_href()
        && let Some(content) = archive.read_text(href)
    {
        let entries = parse_ncx(&content, parent_dir(href));
        if !entries.is_empty() {
            debug!(href, "using legacy navigation map");
            return entries;
        }
    }

    debug!("no usable table of contents source");
    Vec::new()
}

/// Parse an EPUB 3 navigation document outline.
///
/// Looks for `<nav epub:type="toc">` first, then falls back to the first nav
/// element that contains an outline at all.
pub fn parse_nav(content: &str, base_dir: &str) -> Vec<TocEntry> {
    let entries = parse_nav_inner(content, base_dir, true);
    if !entries.is_empty() {
        return entries;
    }
    parse_nav_inner(content, base_dir, false)
}

fn parse_nav_inner(content: &str, base_dir: &str, require_toc_type: bool) -> Vec<TocEntry> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    // One list frame per open <ol>, one pending entry per open <li>.
    let mut lists: Vec<Vec<TocEntry>> = Vec::new();
    let mut pending: Vec<TocEntry> = Vec::new();
    let mut in_target_nav = false;
    let mut capturing_label = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"nav" if !in_target_nav => {
                    let is_toc = e.attributes().flatten().any(|attr| {
                        local_name(attr.key.as_ref()) == b"type"
                            && String::from_utf8_lossy(&attr.value).contains("toc")
                    });
                    in_target_nav = is_toc || !require_toc_type;
                }
                b"ol" if in_target_nav => lists.push(Vec::new()),
                b"li" if in_target_nav && !lists.is_empty() => {
                    pending.push(TocEntry::default());
                }
                b"a" if in_target_nav => {
                    if let Some(entry) = pending.last_mut() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" && entry.href.is_empty() {
                                let raw = String::from_utf8_lossy(&attr.value);
                                entry.href = resolve_href(base_dir, &raw);
                            }
                        }
                        capturing_label = true;
                    }
                }
                b"span" if in_target_nav => {
                    // Headings without links still label their subtree
                    if let Some(entry) = pending.last_mut()
                        && entry.label.is_empty()
                    {
                        capturing_label = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if capturing_label && let Some(entry) = pending.last_mut() {
                    entry.label.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if capturing_label && let Some(entry) = pending.last_mut() {
                    entry
                        .label
                        .push_str(resolve_entity(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"a" | b"span" => capturing_label = false,
                b"li" if in_target_nav => {
                    if let Some(mut entry) = pending.pop() {
                        entry.label = entry.label.trim().to_string();
                        if !entry.label.is_empty() || !entry.href.is_empty() {
                            if let Some(list) = lists.last_mut() {
                                list.push(entry);
                            }
                        }
                    }
                }
                b"ol" if in_target_nav => {
                    if let Some(finished) = lists.pop() {
                        if let Some(parent) = pending.last_mut() {
                            parent.children.extend(finished);
                        } else if !finished.is_empty() {
                            // Outermost list of this nav element
                            return finished;
                        }
                    }
                }
                b"nav" => in_target_nav = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    Vec::new()
}

/// Parse a legacy NCX navigation map.
pub fn parse_ncx(content: &str, base_dir: &str) -> Vec<TocEntry> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    // State per navPoint level, saved and restored as nesting opens/closes.
    struct NavPointState {
        children: Vec<TocEntry>,
        label: String,
        src: Option<String>,
    }

    let mut stack: Vec<NavPointState> = vec![NavPointState {
        children: Vec::new(),
        label: String::new(),
        src: None,
    }];
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"navPoint" => stack.push(NavPointState {
                    children: Vec::new(),
                    label: String::new(),
                    src: None,
                }),
                b"text" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"content" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"src"
                            && let Some(state) = stack.last_mut()
                        {
                            let raw = String::from_utf8_lossy(&attr.value);
                            state.src = Some(resolve_href(base_dir, &raw));
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(state) = stack.last_mut() {
                    state.label.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text && let Some(state) = stack.last_mut() {
                    state
                        .label
                        .push_str(resolve_entity(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" => {
                    if let Some(state) = stack.pop()
                        && let Some(src) = state.src
                    {
                        let entry = TocEntry {
                            label: state.label.trim().to_string(),
                            href: src,
                            children: state.children,
                        };
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(entry);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    stack.pop().map(|s| s.children).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAV: &str = r#"<?xml version="1.0"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="toc">
    <ol>
      <li><a href="ch1.xhtml">Chapter 1</a>
        <ol>
          <li><a href="ch1.xhtml#part2">Part Two</a></li>
        </ol>
      </li>
      <li><a href="ch2.xhtml">Chapter &amp; Verse</a></li>
    </ol>
  </nav>
</body>
</html>"#;

    const NCX: &str = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Opening</text></navLabel>
      <content src="ch1.xhtml"/>
      <navPoint id="p2" playOrder="2">
        <navLabel><text>Nested</text></navLabel>
        <content src="ch1.xhtml#nested"/>
      </navPoint>
    </navPoint>
  </navMap>
</ncx>"#;

    #[test]
    fn test_parse_nav_outline() {
        let toc = parse_nav(NAV, "OEBPS");
        assert_eq!(toc.len(), 2);
        assert_eq!(toc[0].label, "Chapter 1");
        assert_eq!(toc[0].href, "OEBPS/ch1.xhtml");
        assert_eq!(toc[0].children.len(), 1);
        // Fragments are stripped during resolution
        assert_eq!(toc[0].children[0].href, "OEBPS/ch1.xhtml");
        assert_eq!(toc[1].label, "Chapter & Verse");
    }

    #[test]
    fn test_parse_nav_without_toc_type() {
        let nav = NAV.replace(r#" epub:type="toc""#, "");
        let toc = parse_nav(&nav, "");
        assert_eq!(toc.len(), 2);
    }

    #[test]
    fn test_parse_nav_garbage() {
        assert!(parse_nav("<<<not xml", "").is_empty());
    }

    #[test]
    fn test_parse_ncx_nested() {
        let toc = parse_ncx(NCX, "OEBPS");
        assert_eq!(toc.len(), 1);
        assert_eq!(toc[0].label, "Opening");
        assert_eq!(toc[0].href, "OEBPS/ch1.xhtml");
        assert_eq!(toc[0].children.len(), 1);
        assert_eq!(toc[0].children[0].label, "Nested");
    }
}
