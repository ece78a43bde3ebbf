use crate::api::model::PageNumber;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// A contiguous slice of the page range, processed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_page: PageNumber,
    pub end_page: PageNumber,
}

impl Window {
    pub fn pages(&self) -> RangeInclusive<PageNumber> {
        self.start_page..=self.end_page
    }

    /// Pages of this window missing from `done`, ascending.
    pub fn pending_pages(&self, done: &BTreeSet<PageNumber>) -> Vec<PageNumber> {
        self.pages().filter(|p| !done.contains(p)).collect()
    }
}

/// Splits `[1, total_pages]` into gapless windows of `batch_size` pages, the last one possibly
/// shorter. A zero `batch_size` is treated as one.
pub fn partition(total_pages: PageNumber, batch_size: u32) -> Vec<Window> {
    let size = batch_size.max(1);
    let mut windows = Vec::new();
    let mut start: PageNumber = 1;
    while start <= total_pages {
        let end = start.saturating_add(size - 1).min(total_pages);
        windows.push(Window {
            start_page: start,
            end_page: end,
        });
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    windows
}
