#[macro_use]
extern crate log;

use std::env::consts::{ARCH, FAMILY, OS};
use std::fs::OpenOptions;

use anyhow::Error;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

use crate::program::Program;

mod e621;
mod program;

/// Name of the log file written beside the program.
const LOG_NAME: &str = "e621_scraper.log";

fn main() -> Result<(), Error> {
    initialize_logger();
    log_system_information();

    let program = Program::new();
    program.run()
}

/// Initializes the terminal logger and, when the log file can be opened, a full trace log.
fn initialize_logger() {
    let mut config = ConfigBuilder::new();
    config.add_filter_allow_str("e621_scraper");

    let file = match OpenOptions::new().create(true).append(true).open(LOG_NAME) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open {}: {}. Logging will only output to terminal.", LOG_NAME, e);
            init_terminal_logger();
            return;
        }
    };

    if let Err(e) = CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::max(), config.build(), file),
    ]) {
        eprintln!("Failed to initialize combined logger: {}. Falling back to terminal-only logging.", e);
        init_terminal_logger();
    }
}

fn init_terminal_logger() {
    let _ = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
