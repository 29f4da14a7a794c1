pub mod monitor;
pub mod server;

use std::path::Path;
use std::time::Duration;

use jtop_core::{
    BOARD_PATTERN, BoardInfo, CancelToken, ReaderConfig, TelemetryReader,
};

use crate::tui::pages::{PageKind, Pages};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
/// 128 + SIGINT, as shells report it.
pub const EXIT_INTERRUPTED: i32 = 130;

pub struct RunConfig<'a> {
    pub refresh: Duration,
    pub page: usize,
    pub server: bool,
    pub port: u16,
    pub tegrastats: &'a str,
    pub variables: &'a Path,
}

/// Wire signals, load board info, start telemetry and hand off to a front end.
pub fn run(config: RunConfig) -> i32 {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        log::warn!("could not install signal handler: {e}");
    }

    let mut pages = match Pages::new(&PageKind::STANDARD) {
        Ok(pages) => pages,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_FAILURE;
        }
    };
    if let Err(e) = pages.set(config.page) {
        eprintln!("Error: --page {}: {e}", config.page);
        return EXIT_USAGE;
    }

    let board = BoardInfo::load(config.variables, BOARD_PATTERN);
    log::info!("board: {} variables from {}", board.len(), config.variables.display());

    let reader = match start_reader(config.tegrastats, config.refresh) {
        Ok(reader) => reader,
        Err(code) => return code,
    };

    let code = if config.server {
        server::run(&reader, config.port, &cancel)
    } else {
        monitor::run(&reader, &board, pages, config.refresh, cancel)
    };

    reader.close();
    let stats = reader.stats();
    log::info!(
        "telemetry closed: {} readings, {} dropped lines",
        stats.published,
        stats.dropped
    );
    code
}

fn start_reader(program: &str, interval: Duration) -> Result<TelemetryReader, i32> {
    let reader = TelemetryReader::new(ReaderConfig::tegrastats(program));
    if let Err(e) = reader.start(interval) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        return Err(EXIT_FAILURE);
    }
    Ok(reader)
}
