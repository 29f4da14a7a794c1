//! Dashboard pages and the current selection.
//!
//! Pages are a closed set of variants built once at startup. Their order
//! is the navigation order and gives each page its digit shortcut.

use ratatui::prelude::*;
use thiserror::Error;

use jtop_core::{BoardInfo, ReaderState, ReaderStats, Snapshot};

/// Selection errors. These are caller mistakes, not runtime faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("page {index} is out of range (have {count} pages)")]
    OutOfRange { index: usize, count: usize },

    #[error("a dashboard needs at least one page")]
    Empty,
}

/// Everything a page may read while drawing. Pages never mutate it.
pub struct PageContext<'a> {
    /// `None` until the first reading arrives.
    pub snapshot: Option<&'a Snapshot>,
    pub board: &'a BoardInfo,
    pub reader_state: ReaderState,
    pub stats: ReaderStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Every metric, CPU cores and memory.
    All,
    /// GPU load, memory controller and thermals.
    Gpu,
    /// Board variables and reader counters.
    Info,
}

impl PageKind {
    /// Default page order.
    pub const STANDARD: [PageKind; 3] = [PageKind::All, PageKind::Gpu, PageKind::Info];

    pub fn name(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Gpu => "GPU",
            Self::Info => "INFO",
        }
    }

    fn render(self, f: &mut Frame, area: Rect, ctx: &PageContext) {
        match self {
            Self::All => super::ui::draw_all_page(f, area, ctx),
            Self::Gpu => super::ui::draw_gpu_page(f, area, ctx),
            Self::Info => super::ui::draw_info_page(f, area, ctx),
        }
    }
}

/// One named, indexed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    name: &'static str,
    index: usize,
    kind: PageKind,
}

impl Page {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ordered pages plus the selected index, always in range.
///
/// Relative moves clamp at both ends; there is no wraparound.
#[derive(Debug, Clone)]
pub struct Pages {
    pages: Vec<Page>,
    current: usize,
}

impl Pages {
    pub fn new(kinds: &[PageKind]) -> Result<Self, PageError> {
        if kinds.is_empty() {
            return Err(PageError::Empty);
        }
        Ok(Self {
            pages: build(kinds),
            current: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Page {
        &self.pages[self.current]
    }

    /// Select by absolute index.
    pub fn set(&mut self, index: usize) -> Result<(), PageError> {
        if index >= self.pages.len() {
            return Err(PageError::OutOfRange {
                index,
                count: self.pages.len(),
            });
        }
        self.current = index;
        Ok(())
    }

    /// Move right; no-op on the last page.
    pub fn next(&mut self) {
        if self.current + 1 < self.pages.len() {
            self.current += 1;
        }
    }

    /// Move left; no-op on the first page.
    pub fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Draw the selected page. Content is recomputed from `ctx` every call.
    pub fn render(&self, f: &mut Frame, area: Rect, ctx: &PageContext) {
        self.current().kind.render(f, area, ctx);
    }
}

fn build(kinds: &[PageKind]) -> Vec<Page> {
    kinds
        .iter()
        .enumerate()
        .map(|(index, &kind)| Page {
            name: kind.name(),
            index,
            kind,
        })
        .collect()
}
