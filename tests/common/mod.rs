//! Shared test support: in-memory EPUB containers and a scriptable layout
//! surface.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{Cursor, Write};
use std::rc::Rc;

use lectio::{Extent, LayoutOptions, LayoutSurface, TextBox};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Assemble an EPUB container in memory from (path, content) pairs.
///
/// The mimetype entry is written first and stored uncompressed, as the
/// format requires.
pub fn build_epub(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();

    for (path, content) in files {
        zip.start_file(*path, deflated).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }

    zip.finish().unwrap().into_inner()
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub const TWO_CHAPTER_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Short Works</dc:title>
    <dc:creator>Epictetus</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="uid">urn:uuid:feed-f00d</dc:identifier>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="styles/main.css" media-type="text/css"/>
    <item id="fig" href="images/fig.png" media-type="image/png"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

pub const NAV_XHTML: &str = r#"<?xml version="1.0"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="toc">
    <ol>
      <li><a href="text/ch1.xhtml">One</a></li>
      <li><a href="text/ch2.xhtml">Two</a></li>
    </ol>
  </nav>
</body>
</html>"#;

pub const CH1_XHTML: &str = r#"<html><head>
<link rel="stylesheet" href="../styles/main.css"/>
</head><body>
<p id="opening">It was a dark and stormy night.</p>
<img src="../images/fig.png"/>
</body></html>"#;

pub const CH2_XHTML: &str = r#"<html><body>
<p id="closing">The end.</p>
</body></html>"#;

/// A complete, well-formed two-chapter book.
pub fn two_chapter_book() -> Vec<u8> {
    build_epub(&[
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", TWO_CHAPTER_OPF),
        ("OEBPS/nav.xhtml", NAV_XHTML),
        ("OEBPS/text/ch1.xhtml", CH1_XHTML),
        ("OEBPS/text/ch2.xhtml", CH2_XHTML),
        ("OEBPS/styles/main.css", "body { margin: 0 }"),
        ("OEBPS/images/fig.png", "not really a png"),
    ])
}

/// Observable state behind a [`StubSurface`].
#[derive(Debug, Default)]
pub struct SurfaceState {
    /// Scroll width to report from the next render.
    pub scroll_width: f64,
    /// Text geometry to report from snapshots.
    pub boxes: Vec<TextBox>,
    pub offset: f64,
    pub renders: usize,
    pub last_document: String,
    pub last_options: Option<LayoutOptions>,
}

/// Scriptable layout surface whose state the test keeps a handle to.
pub struct StubSurface(Rc<RefCell<SurfaceState>>);

impl StubSurface {
    pub fn new(scroll_width: f64) -> (Self, Rc<RefCell<SurfaceState>>) {
        let state = Rc::new(RefCell::new(SurfaceState {
            scroll_width,
            ..SurfaceState::default()
        }));
        (Self(Rc::clone(&state)), state)
    }
}

impl LayoutSurface for StubSurface {
    fn render(&mut self, document: &str, options: &LayoutOptions) -> lectio::Result<Extent> {
        let mut state = self.0.borrow_mut();
        state.renders += 1;
        state.last_document = document.to_string();
        state.last_options = Some(*options);
        Ok(Extent {
            scroll_width: state.scroll_width,
            scroll_height: options.viewport.height,
        })
    }

    fn scroll_to(&mut self, offset: f64) {
        self.0.borrow_mut().offset = offset;
    }

    fn text_boxes(&self) -> Vec<TextBox> {
        self.0.borrow().boxes.clone()
    }
}
