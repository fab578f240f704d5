//! The layout surface contract.
//!
//! The engine never shapes text itself. It hands a self-contained document to
//! a [`LayoutSurface`] backend, which renders it in isolation and reports
//! geometry: total scrollable extent and per-text-node bounding boxes with
//! structural paths. The reference backend is a sandboxed browser context;
//! any column-capable text-layout library can stand in.

use std::time::Duration;

use crate::error::Result;

/// How long a backend may wait for embedded media to settle before measuring.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// The box the document is laid out into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    /// Inter-column gap in paginated flow.
    pub gap: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            gap: 24.0,
        }
    }
}

/// Per-render layout parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutOptions {
    pub viewport: Viewport,
    /// Column count for paginated flow; 0 disables column layout (scrolled).
    pub column_count: u32,
    /// Budget for the backend's media-settle wait; measuring proceeds
    /// without the media once it elapses.
    pub settle_timeout: Duration,
}

/// Scrollable extent reported by the backend after layout settles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extent {
    pub scroll_width: f64,
    pub scroll_height: f64,
}

/// Axis-aligned bounding box in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Whether this box overlaps the horizontal window `[start, end)`.
    pub fn intersects_horizontal(&self, start: f64, end: f64) -> bool {
        self.x < end && self.x + self.width > start
    }
}

/// One step of a structural path from the document's text root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStep {
    /// Position among element siblings.
    Element(usize),
    /// Position of a text node among its siblings' interleaved text slots.
    Text(usize),
}

/// Structural path from the document root down to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath(pub Vec<NodeStep>);

/// Snapshot geometry for one rendered text node.
#[derive(Debug, Clone, Default)]
pub struct TextBox {
    pub rect: Rect,
    pub path: NodePath,
    /// `id` attribute of the nearest ancestor element, when present.
    pub element_id: Option<String>,
    /// Character offset of the first visible character, when the backend
    /// can report one.
    pub char_offset: Option<u32>,
}

/// External rendering backend contract.
///
/// Implementations render a complete markup/style document in isolation,
/// report its scrollable extent, expose a point-in-time text geometry
/// snapshot, and accept a horizontal scroll offset.
pub trait LayoutSurface {
    /// Lay out `document` and report its extent. May block up to
    /// `options.settle_timeout` waiting for embedded media.
    fn render(&mut self, document: &str, options: &LayoutOptions) -> Result<Extent>;

    /// Set the horizontal scroll offset in surface pixels.
    fn scroll_to(&mut self, offset: f64);

    /// Bounding geometry for the rendered text nodes, in document order.
    fn text_boxes(&self) -> Vec<TextBox>;
}
