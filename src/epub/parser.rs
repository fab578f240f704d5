//! Container descriptor and package document parsing.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::book::{ManifestItem, Metadata};
use crate::error::{Error, Result};
use crate::util::resolve_href;

/// Where the container descriptor lives, per OCF.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// NCX media type (EPUB 2 navigation map).
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Parsed package document.
pub struct PackageDoc {
    pub metadata: Metadata,
    /// Maps manifest id -> item, hrefs resolved against the package directory.
    pub manifest: HashMap<String, ManifestItem>,
    pub spine: Vec<SpineRef>,
    /// Manifest id named by the spine's `toc` attribute (NCX reference).
    pub toc_id: Option<String>,
    pub fixed_layout: bool,
}

/// An ordered reference from the spine into the manifest.
pub struct SpineRef {
    pub idref: String,
    pub linear: bool,
}

impl PackageDoc {
    /// Resolved href of the EPUB 3 navigation document, if declared.
    pub fn nav_href(&self) -> Option<&str> {
        self.manifest.values().find_map(|item| {
            item.has_property("nav").then_some(item.href.as_str())
        })
    }

    /// Resolved href of the legacy NCX document: the spine `toc` reference,
    /// or any manifest item with the NCX media type.
    pub fn ncx_href(&self) -> Option<&str> {
        if let Some(id) = &self.toc_id
            && let Some(item) = self.manifest.get(id)
        {
            return Some(&item.href);
        }
        self.manifest.values().find_map(|item| {
            (item.media_type == NCX_MEDIA_TYPE).then_some(item.href.as_str())
        })
    }
}

/// Parse the container descriptor and return the package document path.
pub fn parse_container(content: &str) -> Result<String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return Ok(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::InvalidContainer(format!(
                    "unparsable container descriptor: {e}"
                )));
            }
            _ => {}
        }
    }

    Err(Error::InvalidContainer(
        "no rootfile found in container descriptor".into(),
    ))
}

/// Parse the package document (metadata, manifest, spine, layout flags).
///
/// `base_dir` is the directory of the package document; every manifest href
/// is resolved against it so downstream components deal only in absolute
/// container paths.
pub fn parse_package(content: &str, base_dir: &str) -> Result<PackageDoc> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut metadata = Metadata::default();
    let mut manifest: HashMap<String, ManifestItem> = HashMap::new();
    let mut spine: Vec<SpineRef> = Vec::new();
    let mut toc_id: Option<String> = None;
    let mut fixed_layout = false;
    let mut epub2_cover_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut current_meta_property: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" | b"identifier" | b"publisher"
                    | b"description" | b"date" => {
                        if in_metadata {
                            current_element = Some(String::from_utf8_lossy(local).to_string());
                            buf_text.clear();
                        }
                    }
                    b"meta" => {
                        // EPUB3 refines/property metas carry their value as text
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"property" {
                                current_meta_property =
                                    Some(String::from_utf8_lossy(&attr.value).to_string());
                                buf_text.clear();
                            }
                        }
                    }
                    b"spine" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"toc" {
                                toc_id = Some(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"item" => {
                        if let Some(item) = parse_manifest_item(&e, base_dir)? {
                            manifest.insert(item.id.clone(), item);
                        }
                    }
                    b"itemref" => {
                        let mut idref = String::new();
                        let mut linear = true;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"idref" => idref = String::from_utf8(attr.value.to_vec())?,
                                b"linear" => linear = attr.value.as_ref() != b"no",
                                _ => {}
                            }
                        }
                        if !idref.is_empty() {
                            spine.push(SpineRef { idref, linear });
                        }
                    }
                    b"meta" => {
                        // EPUB2-style metas: <meta name="..." content="..."/>
                        let mut meta_name = Vec::new();
                        let mut meta_content = String::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"name" => meta_name = attr.value.to_vec(),
                                b"content" => {
                                    meta_content = String::from_utf8_lossy(&attr.value).to_string()
                                }
                                _ => {}
                            }
                        }
                        match meta_name.as_slice() {
                            b"cover" if !meta_content.is_empty() => {
                                epub2_cover_id = Some(meta_content);
                            }
                            b"fixed-layout" if meta_content.eq_ignore_ascii_case("true") => {
                                fixed_layout = true;
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if current_element.is_some() || current_meta_property.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current_element.is_some() || current_meta_property.is_some() {
                    buf_text.push_str(resolve_entity(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if local == b"meta" {
                    if let Some(property) = current_meta_property.take()
                        && property == "rendition:layout"
                        && buf_text.trim() == "pre-paginated"
                    {
                        fixed_layout = true;
                    }
                    buf_text.clear();
                }

                if let Some(elem) = current_element.take() {
                    let text = buf_text.trim();
                    match elem.as_str() {
                        "title" if metadata.title.is_empty() => metadata.title = text.into(),
                        "creator" if metadata.creator.is_empty() => metadata.creator = text.into(),
                        "language" if metadata.language.is_empty() => {
                            metadata.language = text.into()
                        }
                        "identifier" if metadata.identifier.is_empty() => {
                            metadata.identifier = text.into()
                        }
                        "publisher" => metadata.publisher = Some(text.into()),
                        "description" => metadata.description = Some(text.into()),
                        "date" => metadata.date = Some(text.into()),
                        _ => {}
                    }
                    buf_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::InvalidContainer(format!(
                    "unparsable package document: {e}"
                )));
            }
            _ => {}
        }
    }

    metadata.apply_defaults();

    // EPUB3 "cover-image" property takes priority over the EPUB2 meta
    let epub3_cover = manifest
        .values()
        .find(|item| item.has_property("cover-image"));
    if let Some(item) = epub3_cover {
        metadata.cover_href = Some(item.href.clone());
    } else if let Some(id) = epub2_cover_id
        && let Some(item) = manifest.get(&id)
    {
        metadata.cover_href = Some(item.href.clone());
    }

    debug!(
        title = %metadata.title,
        manifest = manifest.len(),
        spine = spine.len(),
        fixed_layout,
        "parsed package document"
    );

    Ok(PackageDoc {
        metadata,
        manifest,
        spine,
        toc_id,
        fixed_layout,
    })
}

fn parse_manifest_item(
    e: &quick_xml::events::BytesStart<'_>,
    base_dir: &str,
) -> Result<Option<ManifestItem>> {
    let mut id = String::new();
    let mut href = String::new();
    let mut media_type = String::new();
    let mut properties: Option<String> = None;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"id" => id = String::from_utf8(attr.value.to_vec())?,
            b"href" => href = String::from_utf8(attr.value.to_vec())?,
            b"media-type" => media_type = String::from_utf8(attr.value.to_vec())?,
            b"properties" => properties = Some(String::from_utf8(attr.value.to_vec())?),
            _ => {}
        }
    }

    if id.is_empty() || href.is_empty() {
        return Ok(None);
    }

    Ok(Some(ManifestItem {
        id,
        href: resolve_href(base_dir, &href),
        media_type,
        properties,
    }))
}

/// Extract local name from a potentially namespaced XML name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve the predefined XML entities; anything else becomes empty.
pub(crate) fn resolve_entity(entity: &str) -> &'static str {
    match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        _ => "",
    }
}
