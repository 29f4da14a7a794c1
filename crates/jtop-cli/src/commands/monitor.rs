use std::time::Duration;

use jtop_core::{BoardInfo, CancelToken, TelemetryReader};

use super::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_OK};
use crate::tui::app::{App, StopReason, TerminalKeys};
use crate::tui::pages::Pages;
use crate::tui::terminal::TerminalSession;

pub fn run(
    reader: &TelemetryReader,
    board: &BoardInfo,
    pages: Pages,
    refresh: Duration,
    cancel: CancelToken,
) -> i32 {
    let mut session = match TerminalSession::acquire() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("TUI error: {e}");
            return EXIT_FAILURE;
        }
    };

    let mut app = App::new(reader, board, pages, refresh, cancel);
    let result = app.run(session.terminal_mut(), &mut TerminalKeys);
    // Restore the terminal before anything is printed.
    drop(session);

    match result {
        Ok(StopReason::Quit) => EXIT_OK,
        Ok(StopReason::Interrupted) => EXIT_INTERRUPTED,
        Err(e) => {
            eprintln!("TUI error: {e}");
            EXIT_FAILURE
        }
    }
}
