use crate::e621::sender::{PageOutcome, PostSource};

/// Default number of posts requested per page.
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default upper bound on scanned pages.
pub(crate) const DEFAULT_MAX_SCAN_PAGES: u32 = 200;

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanEnd {
    /// A page came back empty; the page before it was the last.
    Exhausted,
    /// A page came back with fewer posts than the page size; it is the last page.
    LastPage,
    /// The page cap was hit while the API kept returning full pages.
    CapReached,
    /// A page request failed. Scanning stopped as if the results were exhausted.
    TransportError,
}

/// Estimated size of a query's result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanResult {
    /// The page the scan would have continued to. For a partial last page this is that page.
    /// Callers may scrape up to this many pages.
    pub(crate) total_pages: u32,
    /// Posts seen across all scanned pages.
    pub(crate) total_posts: u64,
    /// Pages that returned posts.
    pub(crate) scanned_pages: u32,
    /// How the scan ended.
    pub(crate) end: ScanEnd,
}

impl ScanResult {
    /// Whether the counts are a lower bound rather than the real size of the result set.
    pub(crate) fn is_estimate(&self) -> bool {
        matches!(self.end, ScanEnd::CapReached | ScanEnd::TransportError)
    }
}

/// Walks the result pages of a query to count posts without downloading anything.
pub(crate) struct PageScanner<'a, S: PostSource> {
    source: &'a S,
    page_size: u32,
    max_pages: u32,
}

impl<'a, S: PostSource> PageScanner<'a, S> {
    pub(crate) fn new(source: &'a S) -> Self {
        PageScanner {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_SCAN_PAGES,
        }
    }

    pub(crate) fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub(crate) fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Scans `query` from page 1 until the results run out, a page is short, or the cap is hit.
    pub(crate) fn scan(&self, query: &str) -> ScanResult {
        let mut page = 1;
        let mut total_posts = 0;

        let end = loop {
            if page > self.max_pages {
                warn!(
                    "Stopped scanning \"{}\" after {} pages; the real result set may be larger.",
                    query, self.max_pages
                );
                break ScanEnd::CapReached;
            }

            let count = match self.source.fetch_page(query, page, self.page_size) {
                PageOutcome::Posts(posts) => posts.len() as u64,
                PageOutcome::Empty => break ScanEnd::Exhausted,
                PageOutcome::Failed(err) => {
                    warn!("Scan of \"{}\" stopped at page {}: {}", query, page, err);
                    break ScanEnd::TransportError;
                }
            };

            total_posts += count;
            trace!("Scanned page {} of \"{}\": {} posts", page, query, count);
            if count < u64::from(self.page_size) {
                break ScanEnd::LastPage;
            }
            page += 1;
        };

        let scanned_pages = match end {
            ScanEnd::LastPage => page,
            ScanEnd::Exhausted | ScanEnd::TransportError => page - 1,
            ScanEnd::CapReached => self.max_pages,
        };

        ScanResult {
            total_pages: page,
            total_posts,
            scanned_pages,
            end,
        }
    }
}
