//! Error types for lectio operations.

use thiserror::Error;

/// Errors that can occur while opening a book or driving the navigator.
///
/// Only a handful of conditions are fatal: an archive that cannot be
/// decompressed, a missing container descriptor, or a missing/unparsable
/// package document. All of those surface as [`Error::InvalidContainer`].
/// Everything else (missing TOC, unresolved resources, malformed position
/// strings, out-of-range navigation) degrades silently.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("Layout surface error: {0}")]
    Layout(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
