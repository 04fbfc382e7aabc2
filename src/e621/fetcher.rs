use crate::e621::scanner::{ScanResult, DEFAULT_PAGE_SIZE};
use crate::e621::sender::entries::PostEntry;
use crate::e621::sender::{PageOutcome, PostSource};

/// How many pages to scrape, as chosen by the user against a scan.
///
/// `all` takes every scanned page, a number is clamped to the scanned total and anything
/// unparsable or below one falls back to a single page.
pub(crate) fn pages_to_scrape(input: &str, scan: &ScanResult) -> u32 {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return scan.total_pages;
    }

    match input.parse::<i64>() {
        Ok(pages) if pages >= 1 => pages.min(i64::from(scan.total_pages)) as u32,
        _ => {
            warn!("Invalid page count \"{}\"; defaulting to 1 page.", input);
            1
        }
    }
}

/// Every post on the fetched pages, in page order.
#[derive(Debug, Default)]
pub(crate) struct FetchedPosts {
    /// All posts, downloadable or not.
    pub(crate) posts: Vec<PostEntry>,
    /// Pages that returned posts.
    pub(crate) pages_fetched: u32,
    /// Whether a page request failed before all requested pages were fetched.
    pub(crate) interrupted: bool,
}

impl FetchedPosts {
    /// The posts that carry a file URL.
    pub(crate) fn downloadable(&self) -> impl Iterator<Item = &PostEntry> {
        self.posts.iter().filter(|post| post.is_downloadable())
    }

    /// Advertised size of every downloadable file, in bytes. Saturates instead of overflowing.
    pub(crate) fn expected_bytes(&self) -> u64 {
        self.downloadable()
            .map(PostEntry::file_size)
            .fold(0, u64::saturating_add)
    }
}

/// Re-walks pages `1..=N` of a query to materialize the post list.
pub(crate) struct BulkFetcher<'a, S: PostSource> {
    source: &'a S,
    page_size: u32,
}

impl<'a, S: PostSource> BulkFetcher<'a, S> {
    pub(crate) fn new(source: &'a S) -> Self {
        BulkFetcher {
            source,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub(crate) fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetches pages `1..=pages` of `query`, stopping at the first page without posts.
    pub(crate) fn fetch(&self, query: &str, pages: u32) -> FetchedPosts {
        let mut fetched = FetchedPosts::default();
        for page in 1..=pages {
            match self.source.fetch_page(query, page, self.page_size) {
                PageOutcome::Posts(mut posts) => {
                    trace!("Fetched page {}/{} of \"{}\" ({} posts)", page, pages, query, posts.len());
                    fetched.posts.append(&mut posts);
                    fetched.pages_fetched += 1;
                }
                PageOutcome::Empty => break,
                PageOutcome::Failed(err) => {
                    warn!("Fetching \"{}\" stopped at page {}: {}", query, page, err);
                    fetched.interrupted = true;
                    break;
                }
            }
        }

        info!(
            "Fetched {} posts for {} ({} downloadable, {} bytes) from {} pages.",
            fetched.posts.len(),
            console::style(format!("\"{query}\"")).color256(39).italic(),
            fetched.downloadable().count(),
            fetched.expected_bytes(),
            fetched.pages_fetched
        );
        fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e621::scanner::fake::{FakePage, FakeSource};
    use crate::e621::scanner::{PageScanner, ScanEnd};
    use crate::e621::sender::entries::test_post;

    fn scan(total_pages: u32) -> ScanResult {
        ScanResult {
            total_pages,
            total_posts: 0,
            scanned_pages: total_pages,
            end: ScanEnd::LastPage,
        }
    }

    #[test]
    fn test_pages_to_scrape() {
        assert_eq!(pages_to_scrape("all", &scan(4)), 4);
        assert_eq!(pages_to_scrape(" ALL ", &scan(4)), 4);
        assert_eq!(pages_to_scrape("2", &scan(4)), 2);
        assert_eq!(pages_to_scrape("10", &scan(4)), 4);
        assert_eq!(pages_to_scrape("two", &scan(4)), 1);
        assert_eq!(pages_to_scrape("0", &scan(4)), 1);
        assert_eq!(pages_to_scrape("-3", &scan(4)), 1);
        assert_eq!(pages_to_scrape("", &scan(4)), 1);
    }

    #[test]
    fn test_fetch_concatenates_pages_in_order() {
        let source = FakeSource::with_sizes(&[20, 20, 20, 7]);
        let fetched = BulkFetcher::new(&source).fetch("fox -cub", 2);
        assert_eq!(fetched.posts.len(), 40);
        assert_eq!(fetched.pages_fetched, 2);
        let ids: Vec<i64> = fetched.posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, (1..=40).collect::<Vec<_>>());
        assert_eq!(source.calls(), vec![1, 2]);
    }

    #[test]
    fn test_fetch_stops_on_empty_page() {
        let source = FakeSource::with_sizes(&[20, 20]);
        let result = PageScanner::new(&source).scan("fox");
        let fetched = BulkFetcher::new(&source).fetch("fox", result.total_pages);
        assert_eq!(fetched.posts.len(), 40);
        assert_eq!(fetched.pages_fetched, 2);
        assert!(!fetched.interrupted);
    }

    #[test]
    fn test_fetch_keeps_posts_without_files() {
        let source = FakeSource::new(vec![FakePage::Posts(vec![
            test_post(1, Some("https://example.net/a.png"), 300),
            test_post(2, None, 999),
            test_post(3, Some("https://example.net/b.png"), 200),
        ])]);
        let fetched = BulkFetcher::new(&source).fetch("fox", 1);
        assert_eq!(fetched.posts.len(), 3);
        assert_eq!(fetched.downloadable().count(), 2);
        assert_eq!(fetched.expected_bytes(), 500);
    }

    #[test]
    fn test_expected_bytes_saturates() {
        let fetched = FetchedPosts {
            posts: vec![
                test_post(1, Some("https://example.net/a.png"), u64::MAX),
                test_post(2, Some("https://example.net/b.png"), 1),
            ],
            pages_fetched: 1,
            interrupted: false,
        };
        assert_eq!(fetched.expected_bytes(), u64::MAX);
    }

    #[test]
    fn test_fetch_failure_marks_interrupted() {
        let source = FakeSource::new(vec![
            FakePage::Posts(vec![test_post(1, Some("https://example.net/a.png"), 1)]),
            FakePage::Fail,
        ]);
        let fetched = BulkFetcher::new(&source).fetch("fox", 3);
        assert_eq!(fetched.posts.len(), 1);
        assert!(fetched.interrupted);
        assert_eq!(source.calls(), vec![1, 2]);
    }
}
