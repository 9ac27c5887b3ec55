/// Admission controller for progressive page loading.
///
/// Only pages with `index < load_limit` may begin fetching. The limit starts
/// at the configured initial count and advances by one batch each time the
/// page at the trailing edge of the window reports completion, so a long
/// chapter never fetches all of its pages at once. The limit never decreases
/// for the lifetime of a chapter view.
#[derive(Debug)]
pub struct ReaderWindow {
    total_pages: usize,
    batch_size: usize,
    load_limit: usize,
    batch_end_index: usize,
}

impl ReaderWindow {
    pub fn new(total_pages: usize, initial_count: usize, batch_size: usize) -> Self {
        let load_limit = total_pages.min(initial_count.max(1));
        Self {
            total_pages,
            batch_size: batch_size.max(1),
            load_limit,
            batch_end_index: load_limit.saturating_sub(1),
        }
    }

    pub fn load_limit(&self) -> usize {
        self.load_limit
    }

    /// A page finished loading (or failed; both count as completion). Only the
    /// page at the trailing edge of the window advances it; completions for
    /// earlier pages, including out-of-order arrivals, are ignored here.
    pub fn on_page_completed(&mut self, index: usize) {
        if self.total_pages == 0 || index != self.batch_end_index {
            return;
        }

        let next_limit = self.total_pages.min(self.load_limit + self.batch_size);
        if next_limit <= self.load_limit {
            return;
        }
        log::debug!(
            "page {index} completed at window edge, raising load limit {} -> {next_limit}",
            self.load_limit
        );
        self.load_limit = next_limit;
        self.batch_end_index = next_limit - 1;
    }

    /// The operator raised the configured initial-visible count. Catch the
    /// window up immediately rather than waiting for a completion event.
    pub fn on_initial_count_raised(&mut self, new_initial: usize) {
        let target = self.total_pages.min(new_initial.max(1));
        if self.total_pages == 0 || target <= self.load_limit {
            return;
        }
        self.load_limit = target;
        self.batch_end_index = target - 1;
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }
}
