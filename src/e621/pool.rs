use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::e621::downloader::{DownloadOutcome, DownloadTask, Downloader};
use crate::e621::progress::ProgressTracker;
use crate::e621::rate_limiter::{CancellationToken, RateLimit};

/// Something that turns a [DownloadTask] into a [DownloadOutcome].
pub(crate) trait Fetch: Sync {
    fn fetch(&self, task: &DownloadTask) -> DownloadOutcome;
}

impl Fetch for Downloader {
    fn fetch(&self, task: &DownloadTask) -> DownloadOutcome {
        self.download(task)
    }
}

/// Runs a download plan on a bounded number of worker threads.
///
/// With a single worker the plan runs strictly in order, one file at a time.
pub(crate) struct DownloadPool<'a, F: Fetch, L: RateLimit> {
    fetcher: &'a F,
    limiter: &'a L,
    cancel: &'a CancellationToken,
    workers: usize,
}

impl<'a, F: Fetch, L: RateLimit> DownloadPool<'a, F, L> {
    pub(crate) fn new(fetcher: &'a F, limiter: &'a L, cancel: &'a CancellationToken) -> Self {
        DownloadPool {
            fetcher,
            limiter,
            cancel,
            workers: 1,
        }
    }

    pub(crate) fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Downloads every task, feeding each result to `tracker`. Outcomes come back in plan order.
    ///
    /// Tasks not yet started when the token is cancelled are reported as
    /// [DownloadOutcome::Cancelled].
    pub(crate) fn run(&self, tasks: &[DownloadTask], tracker: &ProgressTracker) -> Vec<DownloadOutcome> {
        let attempt = |task: &DownloadTask| {
            if self.cancel.is_cancelled() {
                return DownloadOutcome::Cancelled;
            }
            let outcome = self.fetcher.fetch(task);
            tracker.record(&outcome);
            self.limiter.pause();
            outcome
        };

        if self.workers == 1 {
            return tasks.iter().map(attempt).collect();
        }

        match ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(|| tasks.par_iter().map(attempt).collect()),
            Err(err) => {
                warn!("Unable to start {} download workers ({}); downloading sequentially.", self.workers, err);
                tasks.iter().map(attempt).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use indicatif::ProgressBar;
    use parking_lot::Mutex;

    use super::*;
    use crate::e621::downloader::DownloadError;
    use crate::e621::rate_limiter::FixedDelayLimiter;

    /// Saves every task with an even post id, fails the others.
    struct FakeFetch {
        seen: Mutex<Vec<i64>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl FakeFetch {
        fn new() -> Self {
            FakeFetch { seen: Mutex::new(Vec::new()), cancel_after: None }
        }
    }

    impl Fetch for FakeFetch {
        fn fetch(&self, task: &DownloadTask) -> DownloadOutcome {
            let mut seen = self.seen.lock();
            seen.push(task.post_id);
            if let Some((limit, token)) = &self.cancel_after {
                if seen.len() >= *limit {
                    token.cancel();
                }
            }
            if task.post_id % 2 == 0 {
                DownloadOutcome::Saved { file_name: format!("{}.png", task.post_id), bytes: 10 }
            } else {
                DownloadOutcome::Failed(DownloadError::InvalidUrl(task.url.clone()))
            }
        }
    }

    fn tasks(count: i64) -> Vec<DownloadTask> {
        (1..=count)
            .map(|id| DownloadTask {
                post_id: id,
                url: format!("https://example.net/{id}.png"),
                destination: PathBuf::from("."),
                sequence_index: None,
                expected_size: 10,
            })
            .collect()
    }

    #[test]
    fn test_sequential_run_keeps_order() {
        let fetch = FakeFetch::new();
        let limiter = FixedDelayLimiter::new(Duration::ZERO);
        let token = CancellationToken::new();
        let tracker = ProgressTracker::new(6, 60, ProgressBar::hidden());

        let outcomes = DownloadPool::new(&fetch, &limiter, &token).run(&tasks(6), &tracker);
        assert_eq!(*fetch.seen.lock(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(outcomes.iter().filter(|o| o.is_saved()).count(), 3);
        assert_eq!(limiter.stats().pauses, 6);
        assert_eq!(tracker.sample().files_completed, 3);
        assert_eq!(tracker.sample().bytes_completed, 30);
        assert_eq!(tracker.files_failed(), 3);
    }

    #[test]
    fn test_parallel_run_aggregates_everything() {
        let fetch = FakeFetch::new();
        let limiter = FixedDelayLimiter::new(Duration::ZERO);
        let token = CancellationToken::new();
        let tracker = ProgressTracker::new(40, 400, ProgressBar::hidden());

        let outcomes = DownloadPool::new(&fetch, &limiter, &token).workers(4).run(&tasks(40), &tracker);
        assert_eq!(outcomes.len(), 40);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.is_saved(), (i + 1) % 2 == 0);
        }
        assert_eq!(fetch.seen.lock().len(), 40);
        assert_eq!(tracker.sample().files_completed, 20);
        assert_eq!(tracker.sample().bytes_completed, 200);
    }

    #[test]
    fn test_cancel_stops_between_downloads() {
        let token = CancellationToken::new();
        let fetch = FakeFetch {
            seen: Mutex::new(Vec::new()),
            cancel_after: Some((2, token.clone())),
        };
        let limiter = FixedDelayLimiter::new(Duration::ZERO);
        let tracker = ProgressTracker::new(5, 50, ProgressBar::hidden());

        let outcomes = DownloadPool::new(&fetch, &limiter, &token).run(&tasks(5), &tracker);
        assert_eq!(fetch.seen.lock().len(), 2);
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes[2..].iter().all(|o| matches!(o, DownloadOutcome::Cancelled)));
    }
}
