//! Random-access reader over the compressed container.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::util::{decode_text, percent_decode, strip_bom};

/// Decompressed container with named-entry lookup.
///
/// Entry lookups return `None` rather than failing: a missing entry is a
/// recoverable condition everywhere it can occur. Only construction is
/// fallible — an archive that cannot be decompressed fails the whole open
/// operation.
#[derive(Debug)]
pub struct Archive {
    zip: ZipArchive<Cursor<Vec<u8>>>,
}

impl Archive {
    /// Open an archive over an owned byte buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::InvalidContainer(format!("not a readable archive: {e}")))?;
        Ok(Self { zip })
    }

    /// Read an entry as text, stripping any BOM and decoding legacy encodings.
    pub fn read_text(&mut self, path: &str) -> Option<String> {
        let bytes = self.read_bytes(path)?;
        Some(decode_text(strip_bom(&bytes)).into_owned())
    }

    /// Read an entry as raw bytes.
    ///
    /// Leading separators are normalized away, and a percent-decoded lookup
    /// is attempted when the literal name is absent (handles malformed
    /// containers that store escaped entry names).
    pub fn read_bytes(&mut self, path: &str) -> Option<Vec<u8>> {
        let path = path.trim_start_matches('/');

        if let Some(bytes) = self.entry_bytes(path) {
            return Some(bytes);
        }

        let decoded = percent_decode(path);
        if decoded != path {
            return self.entry_bytes(&decoded);
        }
        None
    }

    /// Whether the archive contains the named entry.
    pub fn contains(&mut self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        self.zip.by_name(path).is_ok()
    }

    fn entry_bytes(&mut self, name: &str) -> Option<Vec<u8>> {
        let mut file = self.zip.by_name(name).ok()?;
        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents).ok()?;
        Some(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn sample_archive() -> Archive {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file("OEBPS/chapter 1.xhtml", options).unwrap();
        zip.write_all(b"<html/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        Archive::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_read_text() {
        let mut archive = sample_archive();
        assert_eq!(
            archive.read_text("mimetype").as_deref(),
            Some("application/epub+zip")
        );
    }

    #[test]
    fn test_leading_separator_normalized() {
        let mut archive = sample_archive();
        assert!(archive.read_bytes("/mimetype").is_some());
    }

    #[test]
    fn test_percent_decoded_fallback() {
        let mut archive = sample_archive();
        assert!(archive.read_bytes("OEBPS/chapter%201.xhtml").is_some());
    }

    #[test]
    fn test_missing_entry_is_none() {
        let mut archive = sample_archive();
        assert!(archive.read_bytes("nope.xhtml").is_none());
    }

    #[test]
    fn test_garbage_bytes_fatal() {
        let err = Archive::from_bytes(b"not a zip at all".to_vec()).unwrap_err();
        assert!(matches!(err, Error::InvalidContainer(_)));
    }
}
