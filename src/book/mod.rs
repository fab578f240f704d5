//! The document model: everything the container yields, aggregated.

mod partition;

pub use partition::{FractionRange, PartitionPolicy, partition, section_for_fraction};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::Archive;
use crate::epub::{CONTAINER_PATH, build_toc, parse_container, parse_package};
use crate::error::{Error, Result};
use crate::resource::{ResourceStore, rewrite_content};
use crate::util::parent_dir;

/// Book metadata, derived once at parse time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub creator: String,
    pub language: String,
    pub identifier: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    /// Resolved href of the cover image, when one is declared.
    pub cover_href: Option<String>,
}

impl Metadata {
    /// Fill the required fields that fall back rather than fail.
    pub(crate) fn apply_defaults(&mut self) {
        if self.title.is_empty() {
            self.title = "Untitled".into();
        }
        if self.creator.is_empty() {
            self.creator = "Unknown".into();
        }
        if self.language.is_empty() {
            self.language = "en".into();
        }
    }
}

/// A resource declared by the package manifest.
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    /// Absolute path within the container.
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == property))
    }
}

/// An entry in the linear reading order.
#[derive(Debug, Clone)]
pub struct SpineItem {
    pub idref: String,
    pub href: String,
    pub media_type: String,
    /// Carried through for the host UI; non-linear entries still paginate.
    pub linear: bool,
    /// Document text with references rewritten to resource handles.
    pub content: String,
    /// This section's share of the global progress axis.
    pub range: FractionRange,
}

/// A table of contents entry (hierarchical).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub label: String,
    /// Absolute path within the container, fragment stripped.
    pub href: String,
    pub children: Vec<TocEntry>,
}

/// Options for [`open_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub partition: PartitionPolicy,
}

/// The aggregate document model for one opened container.
///
/// Owned exclusively by the session that opened it. Resource handles live in
/// the book's [`ResourceStore`] and are released in bulk by [`EpubBook::close`]
/// (or by `Navigator::destroy`).
#[derive(Debug)]
pub struct EpubBook {
    pub metadata: Metadata,
    pub spine: Vec<SpineItem>,
    pub toc: Vec<TocEntry>,
    pub manifest: std::collections::HashMap<String, ManifestItem>,
    pub resources: ResourceStore,
    pub fixed_layout: bool,
}

/// Open a container with default options.
pub fn open(bytes: Vec<u8>) -> Result<EpubBook> {
    open_with(bytes, OpenOptions::default())
}

/// Open a container: decompress, resolve the package, build the TOC,
/// materialize resources, rewrite spine content, partition the progress axis.
///
/// Fails only for the fatal conditions: undecompressable archive, missing
/// container descriptor, missing or unparsable package document.
pub fn open_with(bytes: Vec<u8>, options: OpenOptions) -> Result<EpubBook> {
    let mut archive = Archive::from_bytes(bytes)?;

    let container = archive
        .read_text(CONTAINER_PATH)
        .ok_or_else(|| Error::InvalidContainer("missing container descriptor".into()))?;
    let opf_path = parse_container(&container)?;

    let opf_content = archive.read_text(&opf_path).ok_or_else(|| {
        Error::InvalidContainer(format!("missing package document: {opf_path}"))
    })?;
    let pkg = parse_package(&opf_content, parent_dir(&opf_path))?;

    let toc = build_toc(&mut archive, &pkg);

    let mut resources = ResourceStore::new();
    for item in pkg.manifest.values() {
        match archive.read_bytes(&item.href) {
            Some(data) => {
                resources.insert(item.href.clone(), item.media_type.clone(), data);
            }
            None => debug!(href = %item.href, "manifest entry missing from archive"),
        }
    }

    let mut spine: Vec<SpineItem> = Vec::with_capacity(pkg.spine.len());
    for spine_ref in &pkg.spine {
        let Some(item) = pkg.manifest.get(&spine_ref.idref) else {
            debug!(idref = %spine_ref.idref, "itemref has no manifest entry, skipping");
            continue;
        };
        let raw = archive.read_text(&item.href).unwrap_or_default();
        let content = rewrite_content(&raw, parent_dir(&item.href), &resources);
        spine.push(SpineItem {
            idref: spine_ref.idref.clone(),
            href: item.href.clone(),
            media_type: item.media_type.clone(),
            linear: spine_ref.linear,
            content,
            range: FractionRange { start: 0.0, end: 1.0 },
        });
    }

    let weights: Vec<usize> = spine.iter().map(|item| item.content.len()).collect();
    for (item, range) in spine.iter_mut().zip(partition(options.partition, &weights)) {
        item.range = range;
    }

    Ok(EpubBook {
        metadata: pkg.metadata,
        spine,
        toc,
        manifest: pkg.manifest,
        resources,
        fixed_layout: pkg.fixed_layout,
    })
}

impl EpubBook {
    /// Index of the spine section owning a global fraction.
    pub fn section_for_fraction(&self, fraction: f64) -> Option<usize> {
        let ranges: Vec<FractionRange> = self.spine.iter().map(|s| s.range).collect();
        section_for_fraction(&ranges, fraction)
    }

    /// Find a spine index by manifest idref.
    pub fn spine_index_of(&self, idref: &str) -> Option<usize> {
        self.spine.iter().position(|item| item.idref == idref)
    }

    /// Find a spine index by resolved href (fragment already stripped).
    pub fn spine_index_for_href(&self, href: &str) -> Option<usize> {
        self.spine.iter().position(|item| item.href == href)
    }

    /// Release every resource handle. Idempotent; also used when an open
    /// operation is superseded before the book reaches a navigator.
    pub fn close(&mut self) {
        self.resources.release();
    }
}
