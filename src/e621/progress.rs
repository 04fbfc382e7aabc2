use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use parking_lot::Mutex;

use crate::e621::downloader::DownloadOutcome;

/// State of a scrape after a download attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProgressSample {
    pub(crate) files_completed: u64,
    pub(crate) files_total: u64,
    pub(crate) bytes_completed: u64,
    pub(crate) bytes_total: u64,
    pub(crate) elapsed: Duration,
}

impl ProgressSample {
    /// Average throughput since the scrape began, in KB/s.
    pub(crate) fn average_kbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes_completed as f64 / 1024.0) / secs
        } else {
            0.0
        }
    }

    /// Remaining bytes divided by the average rate so far.
    ///
    /// `None` while nothing has completed, or when the estimate does not fit a [Duration].
    pub(crate) fn eta(&self) -> Option<Duration> {
        let secs = self.elapsed.as_secs_f64();
        if self.bytes_completed == 0 || secs <= 0.0 {
            return None;
        }

        let rate = self.bytes_completed as f64 / secs;
        let remaining = self.bytes_total.saturating_sub(self.bytes_completed) as f64;
        Duration::try_from_secs_f64(remaining / rate).ok()
    }

    /// The status line, e.g. `Files: 3/10 | Download Speed: 512.00 KB/s | ETA: 01:05`.
    pub(crate) fn render(&self) -> String {
        let eta = match self.eta() {
            Some(eta) => {
                let secs = eta.as_secs();
                format!("{:02}:{:02}", secs / 60, secs % 60)
            }
            None => String::from("N/A"),
        };
        format!(
            "Files: {}/{} | Download Speed: {:.2} KB/s | ETA: {}",
            self.files_completed,
            self.files_total,
            self.average_kbps(),
            eta
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    files_completed: u64,
    files_failed: u64,
    bytes_completed: u64,
}

/// Aggregates download results and keeps a single status line up to date.
///
/// Every update happens under one lock and the line is redrawn before it is released, so the
/// line always shows a consistent snapshot even with several workers reporting.
pub(crate) struct ProgressTracker {
    files_total: u64,
    bytes_total: u64,
    started: Instant,
    counters: Mutex<Counters>,
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    pub(crate) fn new(files_total: u64, bytes_total: u64, progress_bar: ProgressBar) -> Self {
        let tracker = ProgressTracker {
            files_total,
            bytes_total,
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
            progress_bar,
        };
        tracker.progress_bar.set_length(files_total);
        tracker.progress_bar.set_message(tracker.sample().render());
        tracker
    }

    /// Records one finished attempt and redraws the line.
    pub(crate) fn record(&self, outcome: &DownloadOutcome) {
        let mut counters = self.counters.lock();
        match outcome {
            DownloadOutcome::Saved { file_name, bytes } => {
                trace!("Saved {} ({} bytes)", file_name, bytes);
                counters.files_completed += 1;
                counters.bytes_completed = counters.bytes_completed.saturating_add(*bytes);
            }
            DownloadOutcome::Failed(_) => counters.files_failed += 1,
            DownloadOutcome::Cancelled => return,
        }

        let sample = self.sample_of(&counters);
        self.progress_bar.set_position(counters.files_completed + counters.files_failed);
        self.progress_bar.set_message(sample.render());
    }

    pub(crate) fn sample(&self) -> ProgressSample {
        self.sample_of(&self.counters.lock())
    }

    pub(crate) fn files_failed(&self) -> u64 {
        self.counters.lock().files_failed
    }

    fn sample_of(&self, counters: &Counters) -> ProgressSample {
        ProgressSample {
            files_completed: counters.files_completed,
            files_total: self.files_total,
            bytes_completed: counters.bytes_completed,
            bytes_total: self.bytes_total,
            elapsed: self.started.elapsed(),
        }
    }

    /// Leaves the final line on screen.
    pub(crate) fn finish(&self) {
        let sample = self.sample();
        self.progress_bar.finish_with_message(sample.render());
        debug!(
            "Downloads finished: {}/{} saved, {} failed, {} bytes in {:?}.",
            sample.files_completed,
            sample.files_total,
            self.files_failed(),
            sample.bytes_completed,
            sample.elapsed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e621::downloader::DownloadError;

    fn sample(bytes_completed: u64, bytes_total: u64, elapsed: Duration) -> ProgressSample {
        ProgressSample {
            files_completed: 1,
            files_total: 4,
            bytes_completed,
            bytes_total,
            elapsed,
        }
    }

    #[test]
    fn test_eta_unavailable_without_bytes() {
        for secs in [0, 1, 90, 3600] {
            let s = sample(0, 10_000, Duration::from_secs(secs));
            assert_eq!(s.eta(), None);
            assert!(s.render().ends_with("ETA: N/A"));
        }
    }

    #[test]
    fn test_eta_uses_average_rate() {
        // 1024 bytes in 2s leaves 3072 bytes: 6 more seconds.
        let s = sample(1024, 4096, Duration::from_secs(2));
        assert_eq!(s.eta().unwrap().as_secs(), 6);
        assert!((s.average_kbps() - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.render(), "Files: 1/4 | Download Speed: 0.50 KB/s | ETA: 00:06");
    }

    #[test]
    fn test_eta_never_negative() {
        let s = sample(5000, 4096, Duration::from_secs(1));
        assert_eq!(s.eta(), Some(Duration::ZERO));
    }

    #[test]
    fn test_eta_unavailable_when_too_large() {
        let s = sample(1, u64::MAX, Duration::from_secs(10));
        assert_eq!(s.eta(), None);
        assert!(s.render().ends_with("ETA: N/A"));
    }

    #[test]
    fn test_eta_minutes() {
        let s = sample(1024, 1024 * 126, Duration::from_secs(1));
        assert!(s.render().ends_with("ETA: 02:05"));
    }

    #[test]
    fn test_tracker_counts_outcomes() {
        let tracker = ProgressTracker::new(3, 300, ProgressBar::hidden());
        tracker.record(&DownloadOutcome::Saved { file_name: "a.png".into(), bytes: 120 });
        tracker.record(&DownloadOutcome::Failed(DownloadError::InvalidUrl("x".into())));
        tracker.record(&DownloadOutcome::Cancelled);

        let sample = tracker.sample();
        assert_eq!(sample.files_completed, 1);
        assert_eq!(sample.files_total, 3);
        assert_eq!(sample.bytes_completed, 120);
        assert_eq!(sample.bytes_total, 300);
        assert_eq!(tracker.files_failed(), 1);
    }

    #[test]
    fn test_tracker_bytes_saturate() {
        let tracker = ProgressTracker::new(2, u64::MAX, ProgressBar::hidden());
        tracker.record(&DownloadOutcome::Saved { file_name: "a.png".into(), bytes: u64::MAX });
        tracker.record(&DownloadOutcome::Saved { file_name: "b.png".into(), bytes: 5 });
        assert_eq!(tracker.sample().bytes_completed, u64::MAX);
        assert!(tracker.sample().render().starts_with("Files: 2/2"));
    }
}
