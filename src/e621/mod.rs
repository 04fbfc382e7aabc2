use std::path::PathBuf;
use std::time::Duration;

use indicatif::ProgressBar;

use crate::e621::downloader::{DownloadOutcome, DownloadTask, Downloader};
use crate::e621::fetcher::{BulkFetcher, FetchedPosts};
use crate::e621::io::{Config, Credentials};
use crate::e621::pool::DownloadPool;
use crate::e621::progress::ProgressTracker;
use crate::e621::query::{build_tag_query, pool_query};
use crate::e621::rate_limiter::{CancellationToken, FixedDelayLimiter};
use crate::e621::scanner::{PageScanner, ScanResult};
use crate::e621::sender::entries::PostEntry;
use crate::e621::sender::{PageOutcome, PostSource, RequestSender, SenderError};
use crate::e621::session::{Session, SessionError, SessionWriter};

pub(crate) mod downloader;
pub(crate) mod fetcher;
pub(crate) mod io;
pub(crate) mod pool;
pub(crate) mod progress;
pub(crate) mod query;
pub(crate) mod rate_limiter;
pub(crate) mod scanner;
pub(crate) mod sender;
pub(crate) mod session;
pub(crate) mod tui;

/// Whether a scrape targets a tag search or a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScrapeMode {
    Tags,
    Pool,
}

impl ScrapeMode {
    pub(crate) fn title(&self) -> &'static str {
        match self {
            ScrapeMode::Tags => "TAG SCRAPE",
            ScrapeMode::Pool => "POOL SCRAPE",
        }
    }

    /// Pool pages are saved with a running counter in their names.
    pub(crate) fn numbered(&self) -> bool {
        matches!(self, ScrapeMode::Pool)
    }
}

/// Everything a pipeline stage needs to know about the user, passed explicitly.
#[derive(Debug, Clone)]
pub(crate) struct ScrapeContext {
    config: Config,
    credentials: Option<Credentials>,
    user_agent: String,
    cancel: CancellationToken,
}

impl ScrapeContext {
    pub(crate) fn new(config: Config, cancel: CancellationToken) -> Self {
        ScrapeContext {
            credentials: config.credentials(),
            user_agent: config.user_agent(),
            config,
            cancel,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub(crate) fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Totals of a finished (or cancelled) scrape.
#[derive(Debug)]
pub(crate) struct ScrapeReport {
    pub(crate) session_directory: PathBuf,
    /// Every post fetched, including those without a file.
    pub(crate) posts_total: usize,
    pub(crate) files_planned: usize,
    pub(crate) files_saved: usize,
    pub(crate) files_failed: usize,
    pub(crate) files_cancelled: usize,
    pub(crate) bytes_saved: u64,
    /// A page request failed while the post list was materialized.
    pub(crate) fetch_interrupted: bool,
    pub(crate) metadata: Result<PathBuf, SessionError>,
}

/// Builds the download plan: one task per post with a file, numbered by plan position when
/// `numbered` is set.
///
/// Numbers are fixed before any download starts, so a file that fails to download leaves a gap
/// in the sequence instead of handing its number to the next file that succeeds.
pub(crate) fn plan_downloads(fetched: &FetchedPosts, session: &Session, numbered: bool) -> Vec<DownloadTask> {
    fetched
        .downloadable()
        .zip(1u32..)
        .filter_map(|(post, index)| {
            let url = post.file_url()?;
            Some(DownloadTask {
                post_id: post.id,
                url: url.to_string(),
                destination: session.directory().to_path_buf(),
                sequence_index: numbered.then_some(index),
                expected_size: post.file_size(),
            })
        })
        .collect()
}

/// Advertised size of a download plan, saturating at `u64::MAX`.
pub(crate) fn planned_bytes(tasks: &[DownloadTask]) -> u64 {
    tasks
        .iter()
        .map(|task| task.expected_size)
        .fold(0, u64::saturating_add)
}

/// A web connector that manages how the API is called (through the [RequestSender]), how
/// posts are scanned and fetched, and how their files are downloaded into a session.
pub(crate) struct E621WebConnector {
    context: ScrapeContext,
    request_sender: RequestSender,
    downloader: Downloader,
    limiter: FixedDelayLimiter,
}

impl E621WebConnector {
    /// Creates a connector talking to e621 with the context's identity.
    pub(crate) fn new(context: ScrapeContext) -> Result<Self, SenderError> {
        let request_sender = RequestSender::new(context.user_agent(), context.credentials().cloned())?;
        debug!(
            "Requests go out as \"{}\" ({}).",
            request_sender.user_agent(),
            if request_sender.is_authenticated() { "authenticated" } else { "anonymous" }
        );
        Ok(Self::with_sender(context, request_sender))
    }

    pub(crate) fn with_sender(context: ScrapeContext, request_sender: RequestSender) -> Self {
        let limiter = FixedDelayLimiter::new(Duration::from_millis(context.config().download_delay_ms()));
        E621WebConnector {
            downloader: Downloader::new(request_sender.clone()),
            request_sender,
            context,
            limiter,
        }
    }

    pub(crate) fn context(&self) -> &ScrapeContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut ScrapeContext {
        &mut self.context
    }

    /// The query for user tags with the configured blacklist appended.
    pub(crate) fn tag_query(&self, user_tags: &[String]) -> String {
        build_tag_query(user_tags, self.context.config().blacklist())
    }

    pub(crate) fn pool_query(&self, pool_id: &str) -> String {
        pool_query(pool_id)
    }

    /// The first page of results for `query`.
    pub(crate) fn search(&self, query: &str) -> PageOutcome {
        self.request_sender
            .fetch_page(query, 1, self.context.config().page_size())
    }

    /// Estimates how many pages and posts `query` has.
    pub(crate) fn scan(&self, query: &str) -> ScanResult {
        let config = self.context.config();
        let result = PageScanner::new(&self.request_sender)
            .page_size(config.page_size())
            .max_pages(config.max_scan_pages())
            .scan(query);
        info!(
            "Scan of {} found {} posts on {} pages, {} pages available ({:?}).",
            console::style(format!("\"{query}\"")).color256(39).italic(),
            result.total_posts,
            result.scanned_pages, result.total_pages, result.end
        );
        result
    }

    /// Materializes pages `1..=pages` of `query`, downloads every file into `session` and
    /// writes the metadata record once the downloads are done.
    ///
    /// One failed page or file never aborts the scrape. The metadata record lists every
    /// fetched post, downloadable or not, even if the scrape was cancelled.
    pub(crate) fn scrape(
        &self,
        query: &str,
        pages: u32,
        mode: ScrapeMode,
        session: &Session,
        progress_bar: ProgressBar,
    ) -> ScrapeReport {
        let config = self.context.config();
        let fetched = BulkFetcher::new(&self.request_sender)
            .page_size(config.page_size())
            .fetch(query, pages);

        let tasks = plan_downloads(&fetched, session, mode.numbered());
        let tracker = ProgressTracker::new(tasks.len() as u64, planned_bytes(&tasks), progress_bar);

        let cancel = self.context.cancel_token();
        cancel.arm();
        let outcomes = DownloadPool::new(&self.downloader, &self.limiter, cancel)
            .workers(config.download_workers())
            .run(&tasks, &tracker);
        cancel.disarm();
        tracker.finish();

        let stats = self.limiter.stats();
        debug!(
            "Paused {} times between downloads ({:?} each, {:?} total).",
            stats.pauses,
            self.limiter.delay(),
            stats.total_delay
        );

        let metadata = SessionWriter::new(session).write(&fetched.posts);
        self.report(session, &fetched, &tasks, outcomes, metadata)
    }

    fn report(
        &self,
        session: &Session,
        fetched: &FetchedPosts,
        tasks: &[DownloadTask],
        outcomes: Vec<DownloadOutcome>,
        metadata: Result<PathBuf, SessionError>,
    ) -> ScrapeReport {
        let count = |f: fn(&DownloadOutcome) -> bool| outcomes.iter().filter(|o| f(o)).count();
        let report = ScrapeReport {
            session_directory: session.directory().to_path_buf(),
            posts_total: fetched.posts.len(),
            files_planned: tasks.len(),
            files_saved: count(DownloadOutcome::is_saved),
            files_failed: count(|o| matches!(o, DownloadOutcome::Failed(_))),
            files_cancelled: count(|o| matches!(o, DownloadOutcome::Cancelled)),
            bytes_saved: outcomes.into_iter().map(|outcome| outcome.into_parts().1).sum(),
            fetch_interrupted: fetched.interrupted,
            metadata,
        };

        info!(
            "Scrape finished: {}/{} files saved, {} failed, {} cancelled.",
            report.files_saved, report.files_planned, report.files_failed, report.files_cancelled
        );
        report
    }
}

/// Posts of a search page, formatted one per line as `ID | Rating | URL`.
pub(crate) fn describe_posts(posts: &[PostEntry]) -> Vec<String> {
    posts
        .iter()
        .map(|post| {
            format!(
                "ID: {} | Rating: {} | URL: {}",
                post.id,
                post.rating(),
                post.file_url().unwrap_or("N/A")
            )
        })
        .collect()
}
