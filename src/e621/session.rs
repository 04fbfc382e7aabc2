use std::fs::{create_dir, rename, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::e621::sender::entries::PostEntry;

/// Name of the metadata record written into every session directory.
pub(crate) const METADATA_NAME: &str = "posts_metadata.json";

#[derive(Error, Debug)]
pub(crate) enum SessionError {
    #[error("session directory {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unable to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The directory a single scrape writes into, named by the scrape's start time.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    directory: PathBuf,
    started_at: i64,
}

impl Session {
    /// Creates the session directory for a scrape starting now.
    pub(crate) fn create(working_directory: &Path) -> Result<Self, SessionError> {
        Self::create_at(working_directory, Utc::now().timestamp())
    }

    /// Creates `<working_directory>/<timestamp>`. An existing directory is never reused.
    pub(crate) fn create_at(working_directory: &Path, timestamp: i64) -> Result<Self, SessionError> {
        let directory = working_directory.join(timestamp.to_string());
        match create_dir(&directory) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SessionError::AlreadyExists(directory));
            }
            Err(err) => return Err(err.into()),
        }

        info!("Session folder created: {}", directory.display());
        Ok(Session {
            directory,
            started_at: timestamp,
        })
    }

    pub(crate) fn directory(&self) -> &Path {
        &self.directory
    }

    pub(crate) fn started_at(&self) -> i64 {
        self.started_at
    }

    pub(crate) fn metadata_path(&self) -> PathBuf {
        self.directory.join(METADATA_NAME)
    }
}

/// Persists the post list of a finished scrape.
pub(crate) struct SessionWriter<'a> {
    session: &'a Session,
}

impl<'a> SessionWriter<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        SessionWriter { session }
    }

    /// Writes every post, downloadable or not, as pretty printed JSON in one go.
    ///
    /// The record is written beside its final name and renamed into place, so a reader never
    /// sees a half written file.
    pub(crate) fn write(&self, posts: &[PostEntry]) -> Result<PathBuf, SessionError> {
        let path = self.session.metadata_path();
        let staging = path.with_extension("json.tmp");

        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            serde_json::to_writer_pretty(&mut writer, posts)?;
            writer.flush()?;
        }
        rename(&staging, &path)?;

        trace!("Wrote metadata for {} posts to {}", posts.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{read_dir, read_to_string};

    use tempfile::tempdir;

    use super::*;
    use crate::e621::sender::entries::test_post;

    #[test]
    fn test_session_directory_named_by_timestamp() {
        let dir = tempdir().unwrap();
        let session = Session::create_at(dir.path(), 1_700_000_000).unwrap();
        assert_eq!(session.directory(), dir.path().join("1700000000"));
        assert!(session.directory().is_dir());
        assert_eq!(session.started_at(), 1_700_000_000);
    }

    #[test]
    fn test_session_is_never_reused() {
        let dir = tempdir().unwrap();
        Session::create_at(dir.path(), 42).unwrap();
        assert!(matches!(Session::create_at(dir.path(), 42), Err(SessionError::AlreadyExists(_))));
    }

    #[test]
    fn test_missing_working_directory_fails() {
        let dir = tempdir().unwrap();
        let result = Session::create_at(&dir.path().join("missing"), 1);
        assert!(matches!(result, Err(SessionError::Io(_))));
    }

    #[test]
    fn test_writes_all_posts() {
        let dir = tempdir().unwrap();
        let session = Session::create_at(dir.path(), 7).unwrap();
        let posts = vec![
            test_post(1, Some("https://example.net/a.png"), 10),
            test_post(2, None, 0),
        ];

        let path = SessionWriter::new(&session).write(&posts).unwrap();
        assert_eq!(path, session.metadata_path());

        let written: Vec<PostEntry> = serde_json::from_str(&read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, posts);
        assert!(read_to_string(&path).unwrap().contains("\n    "));
        assert_eq!(read_dir(session.directory()).unwrap().count(), 1);
    }
}
