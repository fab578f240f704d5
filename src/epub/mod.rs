//! EPUB container parsing (container descriptor, package document, TOC).

pub mod parser;
pub mod toc;

pub use parser::{CONTAINER_PATH, PackageDoc, SpineRef, parse_container, parse_package};
pub use toc::build_toc;
