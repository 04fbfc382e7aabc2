use std::fmt;
use std::fs::{create_dir_all, read_to_string, write};
use std::io;
use std::path::{Path, PathBuf};
use std::process::exit;

use dialoguer::{Confirm, Input};
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};
use thiserror::Error;

/// Name of the configuration file.
pub(crate) const CONFIG_NAME: &str = "config.json";

/// Errors raised while reading, writing or validating the configuration.
#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("working directory \"{0}\" does not exist")]
    MissingWorkingDirectory(String),

    #[error("no working directory was given")]
    EmptyWorkingDirectory,
}

/// Config that is used to do general setup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Config {
    /// Name shown in the user agent.
    #[serde(default = "default_nickname")]
    nickname: String,
    /// Directory every scrape session is created in.
    working_directory: String,
    /// Tags excluded from every tag search.
    #[serde(default)]
    blacklist: Vec<String>,
    /// e621 username, empty when browsing anonymously.
    #[serde(default)]
    username: String,
    /// API key from the account settings, empty when browsing anonymously.
    #[serde(default)]
    api_key: String,
    /// Posts requested per page.
    #[serde(default = "default_page_size")]
    page_size: u32,
    /// Upper bound on the pages scanned when estimating a query.
    #[serde(default = "default_max_scan_pages")]
    max_scan_pages: u32,
    /// Pause after every download attempt, in milliseconds.
    #[serde(default = "default_download_delay_ms")]
    download_delay_ms: u64,
    /// Number of download workers; 1 downloads strictly in order.
    #[serde(default = "default_download_workers")]
    download_workers: usize,
}

fn default_nickname() -> String {
    String::from("anonymous")
}

fn default_page_size() -> u32 {
    20
}

fn default_max_scan_pages() -> u32 {
    200
}

fn default_download_delay_ms() -> u64 {
    200
}

fn default_download_workers() -> usize {
    1
}

impl Config {
    pub(crate) fn new(nickname: &str, working_directory: &str, blacklist: Vec<String>) -> Self {
        let nickname = nickname.trim();
        Config {
            nickname: if nickname.is_empty() { default_nickname() } else { nickname.to_string() },
            working_directory: working_directory.to_string(),
            blacklist,
            username: String::new(),
            api_key: String::new(),
            page_size: default_page_size(),
            max_scan_pages: default_max_scan_pages(),
            download_delay_ms: default_download_delay_ms(),
            download_workers: default_download_workers(),
        }
    }

    pub(crate) fn nickname(&self) -> &str {
        &self.nickname
    }

    pub(crate) fn working_directory(&self) -> &Path {
        Path::new(&self.working_directory)
    }

    pub(crate) fn blacklist(&self) -> &[String] {
        &self.blacklist
    }

    pub(crate) fn set_blacklist(&mut self, blacklist: Vec<String>) {
        self.blacklist = blacklist;
    }

    pub(crate) fn page_size(&self) -> u32 {
        self.page_size.max(1)
    }

    pub(crate) fn max_scan_pages(&self) -> u32 {
        self.max_scan_pages.max(1)
    }

    pub(crate) fn download_delay_ms(&self) -> u64 {
        self.download_delay_ms
    }

    pub(crate) fn download_workers(&self) -> usize {
        self.download_workers.max(1)
    }

    /// The credential pair, only when both halves are filled in.
    pub(crate) fn credentials(&self) -> Option<Credentials> {
        if self.username.is_empty() || self.api_key.is_empty() {
            None
        } else {
            Some(Credentials::new(&self.username, &self.api_key))
        }
    }

    /// The user agent that identifies this client to the API.
    pub(crate) fn user_agent(&self) -> String {
        format!("{}/{} (by {})", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), self.nickname())
    }

    /// Loads the config at `path`, `None` when no config has been written yet.
    pub(crate) fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            trace!("{}: does not exist!", path.display());
            return Ok(None);
        }

        let config: Config = from_str(&read_to_string(path)?)?;
        Ok(Some(config))
    }

    /// Writes the config to `path` as pretty printed JSON.
    pub(crate) fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write(path, to_string_pretty(self)?)?;
        trace!("Config written to {}", path.display());
        Ok(())
    }

    /// Makes sure the working directory exists and is a directory.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.working_directory.trim().is_empty() {
            return Err(ConfigError::EmptyWorkingDirectory);
        }
        if !self.working_directory().is_dir() {
            return Err(ConfigError::MissingWorkingDirectory(self.working_directory.clone()));
        }
        Ok(())
    }

    /// Walks the user through creating a config and saves it to `path`.
    ///
    /// Any answer that leaves the scraper without a usable working directory ends the program.
    pub(crate) fn initialize(path: &Path) -> Result<Self, ConfigError> {
        info!("It appears this is your first run.");
        let nickname: String = Input::new()
            .with_prompt("Enter your desired nickname")
            .default(default_nickname())
            .interact_text()
            .unwrap_or_else(|_| default_nickname());

        let working_directory: String = Input::new()
            .with_prompt("Set your working directory (absolute path)")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();
        let working_directory = working_directory.trim().to_string();
        if working_directory.is_empty() {
            emergency_exit("No directory provided.");
        }

        let directory = PathBuf::from(&working_directory);
        if !directory.exists() {
            let create = Confirm::new()
                .with_prompt(format!("Directory \"{working_directory}\" does not exist. Create it?"))
                .default(true)
                .interact()
                .unwrap_or(false);
            if !create {
                emergency_exit("Working directory must exist.");
            }
            if let Err(err) = create_dir_all(&directory) {
                emergency_exit(&format!("Could not create directory: {err}"));
            }
            info!("Directory \"{}\" created.", working_directory);
        }

        let blacklist: String = Input::new()
            .with_prompt("Enter any tags to blacklist (separated by commas), or leave blank")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();

        let config = Config::new(&nickname, &working_directory, split_tags(&blacklist));
        config.save(path)?;
        info!("Configuration saved successfully.");
        info!("Add your username and API key to {} to search with your account.", path.display());

        Ok(config)
    }
}

/// The optional basic credential pair sent with API requests.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Credentials {
    username: String,
    api_key: String,
}

impl Credentials {
    pub(crate) fn new(username: &str, api_key: &str) -> Self {
        Credentials {
            username: username.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_key", &"*".repeat(self.api_key.len()))
            .finish()
    }
}

/// Splits comma separated user input into trimmed, non-empty tags.
pub(crate) fn split_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

/// Exits the program after a message explaining the error and prompting the user to press `ENTER`.
///
/// # Arguments
///
/// * `error`: The error message to print.
pub(crate) fn emergency_exit(error: &str) -> ! {
    error!("{}", error);
    println!("Press ENTER to close the application...");

    let mut line = String::new();
    io::stdin().read_line(&mut line).unwrap_or_default();

    exit(1);
}
