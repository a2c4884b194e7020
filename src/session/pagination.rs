//! Overlapping pages over the image list.
//!
//! Consecutive pages share `overlap` images so the reviewer keeps context when
//! paging forward. Page `p` starts at `p * step` where `step = per_page - overlap`.

use std::ops::Range;

pub const DEFAULT_IMAGES_PER_PAGE: usize = 15;
pub const DEFAULT_PAGE_OVERLAP: usize = 5;

/// Page geometry for a fixed page size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    per_page: usize,
    overlap: usize,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGES_PER_PAGE, DEFAULT_PAGE_OVERLAP)
    }
}

impl Pager {
    /// `per_page` is raised to 1 if zero.
    pub fn new(per_page: usize, overlap: usize) -> Self {
        Self {
            per_page: per_page.max(1),
            overlap,
        }
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between page starts. Falls back to `per_page` when the overlap
    /// leaves no forward progress.
    pub fn step(&self) -> usize {
        match self.per_page.checked_sub(self.overlap) {
            Some(step) if step > 0 => step,
            _ => self.per_page,
        }
    }

    /// At least one page, even for an empty list.
    pub fn total_pages(&self, total: usize) -> usize {
        if total <= self.per_page {
            return 1;
        }
        1 + (total - self.per_page).div_ceil(self.step())
    }

    /// Clamp `page` to `[0, total_pages)`.
    pub fn clamp_page(&self, page: usize, total: usize) -> usize {
        page.min(self.total_pages(total) - 1)
    }

    /// Index range of `page` (clamped) within a list of `total` images.
    pub fn page_range(&self, page: usize, total: usize) -> Range<usize> {
        let page = self.clamp_page(page, total);
        let start = (page * self.step()).min(total);
        let end = (start + self.per_page).min(total);
        start..end
    }
}
