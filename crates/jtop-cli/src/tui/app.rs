//! Render loop state and input handling.
//!
//! One iteration: take the latest reading, draw the selected page, then wait
//! up to the refresh interval for a key. Input is polled in short slices so
//! an interrupt is noticed promptly even with a long refresh interval.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{Terminal, backend::Backend};

use jtop_core::{BoardInfo, CancelToken, Snapshot, TelemetryReader};

use super::pages::{PageContext, Pages};
use super::ui::{self, Header};

/// Longest single wait on the input source.
const INPUT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    Interrupted,
}

/// Where key presses come from.
pub trait KeySource {
    /// Wait at most `timeout` for one key press.
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>>;
}

/// Key presses from the controlling terminal.
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>> {
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            return Ok(Some(key));
        }
        Ok(None)
    }
}

pub struct App<'a> {
    reader: &'a TelemetryReader,
    board: &'a BoardInfo,
    pages: Pages,
    refresh: Duration,
    cancel: CancelToken,
    privileged: bool,
    telemetry_ended: bool,
    state: LoopState,
    stop_reason: Option<StopReason>,
}

impl<'a> App<'a> {
    pub fn new(
        reader: &'a TelemetryReader,
        board: &'a BoardInfo,
        pages: Pages,
        refresh: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            reader,
            board,
            pages,
            refresh,
            cancel,
            privileged: is_privileged(),
            telemetry_ended: false,
            state: LoopState::Running,
            stop_reason: None,
        }
    }

    /// Tick until the user quits or the cancel token fires.
    pub fn run<B: Backend, K: KeySource>(
        &mut self,
        terminal: &mut Terminal<B>,
        keys: &mut K,
    ) -> io::Result<StopReason> {
        while self.tick(terminal, keys)? == LoopState::Running {}
        Ok(self.stop_reason.unwrap_or(StopReason::Quit))
    }

    /// One loop iteration: fetch, draw, wait for input, dispatch.
    pub fn tick<B: Backend, K: KeySource>(
        &mut self,
        terminal: &mut Terminal<B>,
        keys: &mut K,
    ) -> io::Result<LoopState> {
        if self.cancel.is_cancelled() {
            self.stop(StopReason::Interrupted);
            return Ok(self.state);
        }

        let snapshot = self.fetch();
        let ctx = PageContext {
            snapshot: snapshot.as_deref(),
            board: self.board,
            reader_state: self.reader.state(),
            stats: self.reader.stats(),
        };
        let header = Header {
            privileged: self.privileged,
            board: self.board,
            telemetry_ended: self.telemetry_ended,
        };
        let pages = &self.pages;
        terminal.draw(|f| ui::draw(f, &header, pages, &ctx))?;

        if let Some(key) = self.wait_for_key(keys)? {
            self.handle_key(key);
        }
        Ok(self.state)
    }

    fn fetch(&mut self) -> Option<Arc<Snapshot>> {
        match self.reader.latest() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if !self.telemetry_ended {
                    log::warn!("{e}; keeping the last reading on screen");
                    self.telemetry_ended = true;
                }
                self.reader.last_known()
            }
        }
    }

    fn wait_for_key<K: KeySource>(&mut self, keys: &mut K) -> io::Result<Option<KeyEvent>> {
        let deadline = Instant::now() + self.refresh;
        loop {
            if self.cancel.is_cancelled() {
                self.stop(StopReason::Interrupted);
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if let Some(key) = keys.next_key(remaining.min(INPUT_SLICE))? {
                return Ok(Some(key));
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        // Raw mode delivers Ctrl+C as a key instead of SIGINT.
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.stop(StopReason::Interrupted);
            return;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => self.stop(StopReason::Quit),
            KeyCode::Left => self.pages.previous(),
            KeyCode::Right => self.pages.next(),
            KeyCode::Char(c) => {
                if let Some(index) = c.to_digit(10).map(|d| d as usize)
                    && index < self.pages.len()
                {
                    self.select_page(index);
                }
            }
            _ => {}
        }
    }

    /// `index` is already checked against the page count.
    fn select_page(&mut self, index: usize) {
        if let Err(e) = self.pages.set(index) {
            log::warn!("page shortcut {index}: {e}");
        }
    }

    fn stop(&mut self, reason: StopReason) {
        self.state = LoopState::Stopped;
        self.stop_reason.get_or_insert(reason);
    }
}

fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
