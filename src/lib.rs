//! # lectio
//!
//! A fast, lightweight engine for turning EPUB containers into navigable,
//! paginatable documents with stable, serializable reading positions.
//!
//! ## Features
//!
//! - Parse EPUB 2/3 containers: metadata, manifest, spine, table of contents
//! - Materialize resources into a revocable handle arena and rewrite
//!   intra-document references to point at the handles
//! - Paginate sections through a pluggable [`LayoutSurface`] backend
//! - Emit relocation events with canonical, presentation-independent
//!   position strings that survive font/theme/column changes
//!
//! ## Quick Start
//!
//! ```no_run
//! use lectio::{open, Navigator, Viewport};
//! # use lectio::{LayoutSurface, LayoutOptions, Extent, TextBox};
//! # struct Backend;
//! # impl LayoutSurface for Backend {
//! #     fn render(&mut self, _: &str, _: &LayoutOptions) -> lectio::Result<Extent> {
//! #         Ok(Extent::default())
//! #     }
//! #     fn scroll_to(&mut self, _: f64) {}
//! #     fn text_boxes(&self) -> Vec<TextBox> { Vec::new() }
//! # }
//!
//! let bytes = std::fs::read("book.epub")?;
//! let book = open(bytes)?;
//! println!("Title: {}", book.metadata.title);
//!
//! let mut nav = Navigator::new(book, Backend, Viewport::default());
//! nav.on_relocate(|detail| println!("at {:.1}%", detail.fraction * 100.0));
//! nav.init()?;
//! nav.next()?;
//! let position = nav.cfi();
//! # Ok::<(), lectio::Error>(())
//! ```
//!
//! The [`Navigator`] does not render text itself: it drives any backend
//! implementing [`LayoutSurface`] (render, measure, geometry snapshot,
//! scroll) and keeps only flow/pagination state.

pub mod archive;
pub mod book;
pub mod cfi;
pub mod epub;
pub mod layout;
pub mod navigator;
pub mod resource;

mod error;
pub(crate) mod util;

pub use book::{
    EpubBook, FractionRange, ManifestItem, Metadata, OpenOptions, PartitionPolicy, SpineItem,
    TocEntry, open, open_with,
};
pub use cfi::Cfi;
pub use error::{Error, Result};
pub use layout::{Extent, LayoutOptions, LayoutSurface, NodePath, NodeStep, Rect, TextBox, Viewport};
pub use navigator::{Flow, Navigator, RelocateDetail, SectionProgress};
pub use resource::ResourceStore;
