//! Page allocation for container files
//!
//! Pages are handed out from a free set first (lowest page ID wins, which
//! keeps datasets packed toward the front of the file) and otherwise by
//! growing the file. Freed pages at the tail can be trimmed so the file
//! shrinks when datasets are unlinked or truncated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Free-page allocator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAllocator {
    /// Pages in use or free, header page included
    total_pages: u64,

    /// Released pages available for reuse
    free: BTreeSet<u64>,
}

impl Default for PageAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAllocator {
    /// Allocator for a fresh file holding only the header page
    pub fn new() -> Self {
        PageAllocator {
            total_pages: 1,
            free: BTreeSet::new(),
        }
    }

    /// Allocate one page
    pub fn allocate(&mut self) -> u64 {
        if let Some(page) = self.free.pop_first() {
            return page;
        }
        let page = self.total_pages;
        self.total_pages += 1;
        page
    }

    /// Allocate `count` contiguous pages at the tail of the file
    pub fn allocate_tail(&mut self, count: u64) -> u64 {
        let first = self.total_pages;
        self.total_pages += count;
        first
    }

    /// Release pages for reuse
    pub fn free(&mut self, pages: &[u64]) {
        for &page in pages {
            if page != 0 && page < self.total_pages {
                self.free.insert(page);
            }
        }
    }

    /// Release a contiguous run
    pub fn free_run(&mut self, first: u64, count: u64) {
        let pages: Vec<u64> = (first..first + count).collect();
        self.free(&pages);
    }

    /// Drop free pages from the end of the file.
    ///
    /// Returns the new total page count.
    pub fn trim_tail(&mut self) -> u64 {
        while self.total_pages > 1 && self.free.remove(&(self.total_pages - 1)) {
            self.total_pages -= 1;
        }
        self.total_pages
    }

    /// Make sure the allocator accounts for at least `pages` pages
    pub fn ensure_total(&mut self, pages: u64) {
        self.total_pages = self.total_pages.max(pages);
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn free_pages(&self) -> u64 {
        self.free.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_grows_then_reuses() {
        let mut alloc = PageAllocator::new();
        assert_eq!(alloc.allocate(), 1);
        assert_eq!(alloc.allocate(), 2);
        assert_eq!(alloc.allocate(), 3);

        alloc.free(&[2]);
        assert_eq!(alloc.free_pages(), 1);
        assert_eq!(alloc.allocate(), 2);
        assert_eq!(alloc.allocate(), 4);
    }

    #[test]
    fn test_header_page_never_freed() {
        let mut alloc = PageAllocator::new();
        alloc.allocate();
        alloc.free(&[0, 99]);
        assert_eq!(alloc.free_pages(), 0);
    }

    #[test]
    fn test_trim_tail() {
        let mut alloc = PageAllocator::new();
        for _ in 0..5 {
            alloc.allocate();
        }
        alloc.free(&[2, 4, 5]);
        assert_eq!(alloc.trim_tail(), 4);
        assert_eq!(alloc.free_pages(), 1);

        let run = alloc.allocate_tail(3);
        assert_eq!(run, 4);
        alloc.free_run(run, 3);
        assert_eq!(alloc.trim_tail(), 4);
    }

    #[test]
    fn test_ensure_total() {
        let mut alloc = PageAllocator::new();
        alloc.ensure_total(10);
        assert_eq!(alloc.allocate(), 10);
        alloc.ensure_total(3);
        assert_eq!(alloc.total_pages(), 11);
    }
}
