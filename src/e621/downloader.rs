use std::fs::{remove_file, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use reqwest::Url;
use thiserror::Error;

use crate::e621::sender::{RequestSender, SenderError};

/// Errors that make a single download fail. None of them stop a scrape.
#[derive(Error, Debug)]
pub(crate) enum DownloadError {
    #[error(transparent)]
    Sender(#[from] SenderError),

    #[error("cannot derive a file name from \"{0}\"")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadTask {
    /// ID of the post the file belongs to.
    pub(crate) post_id: i64,
    pub(crate) url: String,
    /// Directory the file is written to.
    pub(crate) destination: PathBuf,
    /// Position in a numbered sequence (pool scrapes), appended to the file name.
    pub(crate) sequence_index: Option<u32>,
    /// Advertised size, used for progress only.
    pub(crate) expected_size: u64,
}

/// What happened to a [DownloadTask].
#[derive(Debug)]
pub(crate) enum DownloadOutcome {
    Saved { file_name: String, bytes: u64 },
    Failed(DownloadError),
    /// The scrape was cancelled before the task started.
    Cancelled,
}

impl DownloadOutcome {
    pub(crate) fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved { .. })
    }

    /// The `(file name, bytes written)` pair, `(None, 0)` for anything but a saved file.
    pub(crate) fn into_parts(self) -> (Option<String>, u64) {
        match self {
            DownloadOutcome::Saved { file_name, bytes } => (Some(file_name), bytes),
            _ => (None, 0),
        }
    }
}

/// Derives the local file name from the last path segment of `url`, ignoring any query.
///
/// With a sequence index, a zero padded three digit counter goes before the extension so files
/// sharing a base name do not collide (`image.png` becomes `image_001.png`).
pub(crate) fn file_name_for(url: &str, sequence_index: Option<u32>) -> Result<String, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))?;

    let Some(index) = sequence_index else {
        return Ok(name.to_string());
    };

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    Ok(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{index:03}.{ext}"),
        None => format!("{stem}_{index:03}"),
    })
}

/// Streams single files to disk.
#[derive(Clone, Debug)]
pub(crate) struct Downloader {
    sender: RequestSender,
}

impl Downloader {
    pub(crate) fn new(sender: RequestSender) -> Self {
        Downloader { sender }
    }

    /// Downloads one file. Failures are logged and reported, never raised.
    pub(crate) fn download(&self, task: &DownloadTask) -> DownloadOutcome {
        match self.try_download(task) {
            Ok((file_name, bytes)) => DownloadOutcome::Saved { file_name, bytes },
            Err(err) => {
                error!("Could not download {} for post {}: {}", task.url, task.post_id, err);
                DownloadOutcome::Failed(err)
            }
        }
    }

    fn try_download(&self, task: &DownloadTask) -> Result<(String, u64), DownloadError> {
        let file_name = file_name_for(&task.url, task.sequence_index)?;
        let mut response = self.sender.get_stream(&task.url)?;

        // Nothing touches the disk until the host has answered with a success status.
        let path = task.destination.join(&file_name);
        let mut file = BufWriter::new(File::create(&path)?);
        let written = io::copy(&mut response, &mut file).and_then(|bytes| {
            file.flush()?;
            Ok(bytes)
        });

        match written {
            Ok(bytes) => Ok((file_name, bytes)),
            Err(err) => {
                drop(file);
                if let Err(remove_err) = remove_file(&path) {
                    warn!("Unable to remove partial file {}: {}", path.display(), remove_err);
                }
                Err(err.into())
            }
        }
    }
}
