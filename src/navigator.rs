//! Flow control, pagination measurement, and relocation events.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::book::EpubBook;
use crate::cfi::Cfi;
use crate::error::Result;
use crate::layout::{LayoutOptions, LayoutSurface, SETTLE_TIMEOUT, Viewport};

/// Flow mode: discrete pages via multi-column layout, or continuous scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Paginated,
    Scrolled,
}

/// Where to land within a section once its page count is known.
///
/// `Last` is the tagged replacement for the classic "-1 means last page"
/// sentinel: it stays pending only until the next layout resolves it.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PageTarget {
    First,
    Last,
    Index(usize),
    /// Proportional position within the section, `0..1`.
    Fraction(f64),
}

/// Section counters for a relocation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
    pub current: usize,
    pub total: usize,
}

/// Emitted after every committed render or page move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocateDetail {
    /// Global reading fraction, `0..=1`.
    pub fraction: f64,
    pub section: SectionProgress,
    /// Canonical position string; absent when geometry was unavailable,
    /// never blocking the event itself.
    pub cfi: Option<String>,
}

type RelocateHandler = Box<dyn FnMut(RelocateDetail)>;

/// Drives a [`LayoutSurface`] across the spine of one [`EpubBook`].
///
/// Navigation operations take `&mut self`, so a caller cannot overlap two
/// navigations on the same instance — the non-reentrancy contract is
/// discharged by the borrow checker rather than an internal queue. State is
/// never shared across navigator instances.
pub struct Navigator<S: LayoutSurface> {
    book: EpubBook,
    surface: S,
    viewport: Viewport,
    flow: Flow,
    column_count: u32,
    styles: String,
    current_index: usize,
    page: usize,
    total_pages: usize,
    destroyed: bool,
    on_relocate: Option<RelocateHandler>,
    last_relocation: Option<RelocateDetail>,
}

impl<S: LayoutSurface> Navigator<S> {
    pub fn new(book: EpubBook, surface: S, viewport: Viewport) -> Self {
        Self {
            book,
            surface,
            viewport,
            flow: Flow::Paginated,
            column_count: 1,
            styles: String::new(),
            current_index: 0,
            page: 0,
            total_pages: 1,
            destroyed: false,
            on_relocate: None,
            last_relocation: None,
        }
    }

    /// Start at a requested section instead of the first one. Out-of-range
    /// indices fall back to 0.
    pub fn with_start_section(mut self, index: usize) -> Self {
        if index < self.book.spine.len() {
            self.current_index = index;
        }
        self
    }

    /// Register the external progress collaborator.
    pub fn on_relocate(&mut self, handler: impl FnMut(RelocateDetail) + 'static) {
        self.on_relocate = Some(Box::new(handler));
    }

    pub fn book(&self) -> &EpubBook {
        &self.book
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_page(&self) -> usize {
        self.page
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// The most recently emitted relocation, if any.
    pub fn last_relocation(&self) -> Option<&RelocateDetail> {
        self.last_relocation.as_ref()
    }

    /// Render the starting section.
    pub fn init(&mut self) -> Result<()> {
        if self.destroyed || self.book.spine.is_empty() {
            return Ok(());
        }
        self.render_current(PageTarget::First)
    }

    /// Jump to a spine section. Out-of-range indices are a no-op.
    pub fn go_to(&mut self, index: usize) -> Result<()> {
        if self.destroyed || index >= self.book.spine.len() {
            return Ok(());
        }
        self.current_index = index;
        self.render_current(PageTarget::First)
    }

    /// Advance one page, crossing into the next section only from the last
    /// page. At the end of the book this is a no-op.
    pub fn next(&mut self) -> Result<()> {
        if self.destroyed || self.book.spine.is_empty() {
            return Ok(());
        }
        if self.flow == Flow::Paginated && self.page + 1 < self.total_pages {
            self.page += 1;
            self.commit_page_move();
            return Ok(());
        }
        if self.current_index + 1 < self.book.spine.len() {
            self.current_index += 1;
            return self.render_current(PageTarget::First);
        }
        trace!("next() at end of book, ignoring");
        Ok(())
    }

    /// Step back one page, crossing into the previous section's last page
    /// from the first one. At the start of the book this is a no-op.
    pub fn prev(&mut self) -> Result<()> {
        if self.destroyed || self.book.spine.is_empty() {
            return Ok(());
        }
        if self.flow == Flow::Paginated && self.page > 0 {
            self.page -= 1;
            self.commit_page_move();
            return Ok(());
        }
        if self.current_index > 0 {
            self.current_index -= 1;
            // Page count is unknown until the section lays out
            return self.render_current(PageTarget::Last);
        }
        trace!("prev() at start of book, ignoring");
        Ok(())
    }

    /// Jump to a global reading fraction. The input is clamped to `[0,1]`;
    /// `1.0` resolves to the last page of the last section.
    pub fn go_to_fraction(&mut self, fraction: f64) -> Result<()> {
        if self.destroyed || self.book.spine.is_empty() {
            return Ok(());
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction >= 1.0 {
            self.current_index = self.book.spine.len() - 1;
            return self.render_current(PageTarget::Last);
        }

        let Some(index) = self.book.section_for_fraction(fraction) else {
            return Ok(());
        };
        self.current_index = index;
        let range = self.book.spine[index].range;
        let within = if range.span() > 0.0 {
            (fraction - range.start) / range.span()
        } else {
            0.0
        };
        self.render_current(PageTarget::Fraction(within))
    }

    /// Switch flow mode, preserving the reading position proportionally.
    pub fn set_flow(&mut self, flow: Flow) -> Result<()> {
        if self.destroyed || self.flow == flow {
            return Ok(());
        }
        self.flow = flow;
        self.reflow()
    }

    /// Change the column count (min 1) and re-render, recomputing the page
    /// proportionally under the new layout.
    pub fn set_max_column_count(&mut self, count: u32) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.column_count = count.max(1);
        self.reflow()
    }

    /// Replace the active style sheet text and re-render in place.
    pub fn set_styles(&mut self, css: &str) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.styles = css.to_string();
        self.reflow()
    }

    /// Canonical position string for the current view, or `None` when no
    /// geometry is available.
    pub fn cfi(&self) -> Option<String> {
        if self.destroyed || self.book.spine.is_empty() {
            return None;
        }
        let item = &self.book.spine[self.current_index];
        let window_start = self.page as f64 * self.viewport.width;
        let window_end = window_start + self.viewport.width;

        let boxes = self.surface.text_boxes();
        let anchor = boxes
            .iter()
            .find(|b| b.rect.intersects_horizontal(window_start, window_end))
            .or_else(|| boxes.last());

        Some(Cfi::from_anchor(self.current_index, Some(&item.idref), anchor).to_string())
    }

    /// Navigate to a canonical position string. Malformed input is a no-op.
    pub fn go_to_cfi(&mut self, position: &str) -> Result<()> {
        if self.destroyed || self.book.spine.is_empty() {
            return Ok(());
        }
        let Some(cfi) = Cfi::try_parse(position) else {
            trace!(position, "malformed position string, ignoring");
            return Ok(());
        };
        let Some(mut index) = cfi.spine_index() else {
            return Ok(());
        };

        // Prefer the id assertion when the recovered index disagrees with it
        if let Some(id) = cfi.spine_id()
            && self.book.spine.get(index).is_none_or(|item| item.idref != id)
            && let Some(found) = self.book.spine_index_of(id)
        {
            index = found;
        }
        if index >= self.book.spine.len() {
            return Ok(());
        }
        self.current_index = index;

        if let Some(element_id) = cfi.element_id().map(str::to_string) {
            self.render_current(PageTarget::First)?;
            if let Some(page) = self.page_of_element(&element_id) {
                self.page = page;
                self.commit_page_move();
            }
            return Ok(());
        }

        // No element id: fall back to the step-count page estimate
        self.render_current(PageTarget::Index(cfi.page_hint()))
    }

    /// Release all resource handles owned by the book. Idempotent; the
    /// navigator accepts no further operations afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.book.close();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Re-render the current section after a presentation change, preserving
    /// the intra-section position proportionally.
    fn reflow(&mut self) -> Result<()> {
        let within = if self.total_pages > 1 {
            self.page as f64 / self.total_pages as f64
        } else {
            0.0
        };
        self.render_current(PageTarget::Fraction(within))
    }

    fn render_current(&mut self, target: PageTarget) -> Result<()> {
        let item = &self.book.spine[self.current_index];
        let document = compose_document(&item.content, &self.styles, self.layout_css());
        let options = LayoutOptions {
            viewport: self.viewport,
            column_count: match self.flow {
                Flow::Paginated => self.column_count,
                Flow::Scrolled => 0,
            },
            settle_timeout: SETTLE_TIMEOUT,
        };

        let extent = self.surface.render(&document, &options)?;
        self.total_pages = match self.flow {
            Flow::Paginated => {
                let pages = (extent.scroll_width / self.viewport.width).ceil() as usize;
                pages.max(1)
            }
            Flow::Scrolled => 1,
        };

        self.page = match target {
            PageTarget::First => 0,
            PageTarget::Last => self.total_pages - 1,
            PageTarget::Index(n) => n.min(self.total_pages - 1),
            PageTarget::Fraction(f) => {
                let page = (f.clamp(0.0, 1.0) * self.total_pages as f64).floor() as usize;
                page.min(self.total_pages - 1)
            }
        };

        trace!(
            section = self.current_index,
            page = self.page,
            total_pages = self.total_pages,
            "rendered section"
        );
        self.commit_page_move();
        Ok(())
    }

    fn commit_page_move(&mut self) {
        self.surface
            .scroll_to(self.page as f64 * self.viewport.width);
        self.emit_relocation();
    }

    fn emit_relocation(&mut self) {
        let item = &self.book.spine[self.current_index];
        let within = if self.total_pages > 1 {
            self.page as f64 / self.total_pages as f64
        } else {
            0.0
        };
        let fraction = (item.range.start + within * item.range.span()).clamp(0.0, 1.0);

        let detail = RelocateDetail {
            fraction,
            section: SectionProgress {
                current: self.current_index,
                total: self.book.spine.len(),
            },
            cfi: self.cfi(),
        };

        trace!(fraction = detail.fraction, section = detail.section.current, "relocate");
        self.last_relocation = Some(detail.clone());
        if let Some(handler) = &mut self.on_relocate {
            handler(detail);
        }
    }

    /// First page whose visible window contains the element, by geometry.
    fn page_of_element(&self, element_id: &str) -> Option<usize> {
        let hit = self
            .surface
            .text_boxes()
            .into_iter()
            .find(|b| b.element_id.as_deref() == Some(element_id))?;
        let page = (hit.rect.x / self.viewport.width).floor() as usize;
        Some(page.min(self.total_pages.saturating_sub(1)))
    }

    fn layout_css(&self) -> String {
        match self.flow {
            Flow::Paginated => {
                let columns = self.column_count.max(1) as f64;
                let gap = self.viewport.gap;
                let column_width = (self.viewport.width - gap * (columns - 1.0)) / columns;
                format!(
                    "html {{ height: {height}px; column-width: {column_width}px; \
                     column-gap: {gap}px; column-fill: auto; }}",
                    height = self.viewport.height,
                )
            }
            Flow::Scrolled => "html { overflow-y: auto; }".to_string(),
        }
    }
}

/// Wrap rewritten section content and styles into the self-contained
/// document the layout surface expects.
fn compose_document(content: &str, user_styles: &str, layout_css: String) -> String {
    format!(
        "<!DOCTYPE html><html><head><style>{layout_css}</style>\
         <style>{user_styles}</style></head><body>{content}</body></html>"
    )
}
