use std::path::Path;
use std::process::exit;

use anyhow::Error;
use dialoguer::console::Term;
use dialoguer::{Confirm, Input, Select};

use crate::e621::fetcher::pages_to_scrape;
use crate::e621::io::{emergency_exit, split_tags, Config, CONFIG_NAME};
use crate::e621::rate_limiter::CancellationToken;
use crate::e621::sender::PageOutcome;
use crate::e621::session::Session;
use crate::e621::tui::{format_file_size, status_line};
use crate::e621::{describe_posts, E621WebConnector, ScrapeContext, ScrapeMode};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

const HEADER: &str = r"
================================================================================
||                                                                            ||
||                     WELCOME TO THE E621 TERMINAL SCRAPER                   ||
||                                                                            ||
================================================================================
";

const MENU_ITEMS: [&str; 5] = [
    "Search Posts",
    "Scrape Posts by Tag",
    "Scrape Posts by Pool",
    "Update Blacklisted Tags",
    "Exit",
];

/// A program class that handles the flow of the scraper user experience and steps of execution.
pub(crate) struct Program {
    term: Term,
}

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Program { term: Term::stdout() }
    }

    /// Runs the scraper program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        self.term.set_title("e621 scraper");
        trace!("Starting e621 scraper...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);

        self.print_header();
        let config = self.load_config();
        let cancel = CancellationToken::new();
        install_interrupt_handler(&cancel);

        let context = ScrapeContext::new(config, cancel);
        match context.credentials() {
            Some(login) => {
                trace!("Login Username: {}", login.username());
                trace!("Login API Key: {}", "*".repeat(login.api_key().len()));
            }
            None => trace!("No login given, searching anonymously..."),
        }
        trace!("User Agent: {}", context.user_agent());

        let mut connector = E621WebConnector::new(context)?;
        loop {
            let _ = self.term.clear_screen();
            self.print_header();

            let selection = Select::new()
                .with_prompt("MAIN MENU")
                .items(&MENU_ITEMS)
                .default(0)
                .interact_on(&self.term);

            match selection {
                Ok(0) => self.search(&connector),
                Ok(1) => self.scrape(&connector, ScrapeMode::Tags),
                Ok(2) => self.scrape(&connector, ScrapeMode::Pool),
                Ok(3) => self.update_blacklist(&mut connector),
                Ok(_) => {
                    info!("Exiting... Have a great day!");
                    return Ok(());
                }
                Err(err) => {
                    error!("Unable to read menu selection: {}", err);
                    return Ok(());
                }
            }
        }
    }

    fn print_header(&self) {
        println!("{HEADER}");
    }

    fn print_section(&self, title: &str) {
        println!("\n==================================");
        println!(" {title}");
        println!("==================================");
    }

    /// Loads the config, running first time setup if there is none. Any problem is fatal.
    fn load_config(&self) -> Config {
        let path = Path::new(CONFIG_NAME);
        let config = match Config::load(path) {
            Ok(Some(config)) => config,
            Ok(None) => Config::initialize(path)
                .unwrap_or_else(|e| emergency_exit(&format!("Unable to write config file: {e}"))),
            Err(e) => emergency_exit(&format!("Could not read config file: {e}")),
        };

        if let Err(e) = config.validate() {
            emergency_exit(&format!("Invalid configuration: {e}"));
        }
        trace!("Config loaded: working directory {}", config.working_directory().display());
        config
    }

    fn prompt(&self, prompt: &str) -> String {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text_on(&self.term)
            .unwrap_or_default()
    }

    fn wait_for_enter(&self) {
        println!("\nPress Enter to return to the main menu...");
        let _ = self.term.read_line();
    }

    fn search(&self, connector: &E621WebConnector) {
        self.print_section("SEARCH MODE: FINDING POSTS");
        let tags = split_tags(&self.prompt("Enter tags to search (separated by commas)"));
        let query = connector.tag_query(&tags);
        println!("\nQuerying e621 with: '{query}' ...");

        match connector.search(&query) {
            PageOutcome::Posts(posts) => {
                println!("\n--- FOUND {} POSTS ON PAGE 1 ---", posts.len());
                for line in describe_posts(&posts) {
                    println!("{line}");
                }
            }
            PageOutcome::Empty => println!("No posts found for your query."),
            PageOutcome::Failed(err) => println!("The search failed: {err}"),
        }
        self.wait_for_enter();
    }

    fn scrape(&self, connector: &E621WebConnector, mode: ScrapeMode) {
        self.print_section(&format!("{}: DOWNLOAD POSTS", mode.title()));
        let query = match mode {
            ScrapeMode::Pool => connector.pool_query(&self.prompt("Enter the pool ID")),
            ScrapeMode::Tags => {
                let tags = split_tags(&self.prompt("Enter tags to scrape (separated by commas)"));
                connector.tag_query(&tags)
            }
        };

        println!("\n[SCAN] Calculating available pages and posts for your query...");
        let scan = connector.scan(&query);
        println!("[SCAN] Found {} posts across {} pages.", scan.total_posts, scan.total_pages);
        if scan.is_estimate() {
            println!("[SCAN] The scan stopped early ({:?}); there may be more posts than shown.", scan.end);
        }
        if scan.total_posts == 0 {
            println!("Nothing to scrape for '{query}'.");
            self.wait_for_enter();
            return;
        }

        let input = self.prompt("Enter the number of pages to scrape (or type 'all' for all pages)");
        let pages = pages_to_scrape(&input, &scan);
        println!("[INFO] Scraping {pages} of {} pages.", scan.total_pages);

        let proceed = Confirm::new()
            .with_prompt("Do you wish to continue with the scrape?")
            .default(true)
            .interact_on(&self.term)
            .unwrap_or(false);
        if !proceed {
            info!("Scrape cancelled by user.");
            self.wait_for_enter();
            return;
        }

        let session = match Session::create(connector.context().config().working_directory()) {
            Ok(session) => {
                trace!("Session {} started in {}", session.started_at(), session.directory().display());
                session
            }
            Err(err) => {
                error!("Unable to create session folder: {}", err);
                self.wait_for_enter();
                return;
            }
        };

        let _ = self.term.clear_screen();
        self.print_header();
        println!("Press Ctrl+C to stop after the current download.\n");

        let report = connector.scrape(&query, pages, mode, &session, status_line());
        println!(
            "\nSaved {} of {} files ({}) into {}.",
            report.files_saved,
            report.files_planned,
            format_file_size(report.bytes_saved),
            report.session_directory.display()
        );
        if report.files_failed > 0 {
            warn!("{} files could not be downloaded and were skipped.", report.files_failed);
        }
        if report.files_cancelled > 0 {
            warn!("Scrape cancelled; {} files were not attempted.", report.files_cancelled);
        }
        if report.fetch_interrupted {
            warn!("A page request failed, so not every requested page was fetched.");
        }
        match &report.metadata {
            Ok(path) => info!("[SUCCESS] Metadata for {} posts saved to {}", report.posts_total, path.display()),
            Err(err) => error!("Could not save metadata: {}", err),
        }
        self.wait_for_enter();
    }

    fn update_blacklist(&self, connector: &mut E621WebConnector) {
        self.print_section("UPDATE BLACKLISTED TAGS");
        let current = connector.context().config().blacklist().join(", ");
        println!("Current blacklisted tags: {}", if current.is_empty() { "None" } else { current.as_str() });

        let blacklist = split_tags(&self.prompt("Enter new blacklist tags (separated by commas)"));
        let config = connector.context_mut().config_mut();
        config.set_blacklist(blacklist);
        match config.save(Path::new(CONFIG_NAME)) {
            Ok(()) => info!("Blacklist updated."),
            Err(err) => error!("Unable to write config file: {}", err),
        }
        self.wait_for_enter();
    }
}

/// Ctrl+C stops a running scrape after its current download, and quits otherwise.
fn install_interrupt_handler(cancel: &CancellationToken) {
    let token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if token.is_armed() {
            token.cancel();
        } else {
            exit(130);
        }
    });

    if let Err(err) = installed {
        warn!("Unable to install interrupt handler; scrapes can only be stopped by closing the program: {}", err);
    }
}
