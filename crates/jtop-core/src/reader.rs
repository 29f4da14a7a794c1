//! Background tegrastats reader.
//!
//! Design: the reader owns the producer subprocess. A pump thread turns the
//! producer's stdout into lines; a worker thread parses each line and
//! publishes the result by swapping an `Arc<Snapshot>` into a mutex-guarded
//! slot. Readers of [`TelemetryReader::latest`] only ever clone that `Arc`, so
//! they never wait on parsing and never see a half-built reading.
//!
//! ```text
//! producer stdout → pump thread → channel → worker (parse, publish) → slot
//!                                                          latest() ↗
//! ```

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ReaderError;
use crate::snapshot::{Snapshot, SnapshotParser};

/// Default producer binary.
pub const DEFAULT_PROGRAM: &str = "tegrastats";

/// Lines without any output for `interval * DEFAULT_STALL_FACTOR` mean the
/// producer is gone.
pub const DEFAULT_STALL_FACTOR: u32 = 10;

/// Shortest stall window, so very short intervals still tolerate a slow producer.
const MIN_STALL_WINDOW: Duration = Duration::from_secs(1);

/// Upper bound on how long the worker goes without checking the stop flag.
const WORKER_TICK: Duration = Duration::from_millis(50);

/// Grace period between SIGTERM and SIGKILL on close.
const TERMINATE_GRACE: Duration = Duration::from_millis(200);

/// Lines buffered between pump and worker before the pump blocks.
const LINE_BACKLOG: usize = 64;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How to launch and interpret the producer.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Flag the producer takes the emission interval (in ms) with, if any.
    pub interval_flag: Option<String>,
    pub parser: SnapshotParser,
    pub stall_factor: u32,
}

impl ReaderConfig {
    /// Stock tegrastats: `<program> --interval <ms>`.
    pub fn tegrastats(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            interval_flag: Some("--interval".to_string()),
            parser: SnapshotParser::tegrastats(),
            stall_factor: DEFAULT_STALL_FACTOR,
        }
    }

    /// Arbitrary command whose output already follows the line grammar.
    pub fn command<I, S>(program: impl Into<String>, args: I, parser: SnapshotParser) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            interval_flag: None,
            parser,
            stall_factor: DEFAULT_STALL_FACTOR,
        }
    }

    fn stall_window(&self, interval: Duration) -> Duration {
        interval
            .saturating_mul(self.stall_factor.max(1))
            .max(MIN_STALL_WINDOW)
    }

    fn build_command(&self, interval: Duration) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(flag) = &self.interval_flag {
            cmd.arg(flag).arg(interval.as_millis().to_string());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::tegrastats(DEFAULT_PROGRAM)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Externally visible lifecycle of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    NotStarted,
    Running,
    Closed,
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running => write!(f, "running"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Counters describing the reader's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderStats {
    pub published: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Requested,
    Terminated,
    /// Terminated, then closed by the owner.
    Acknowledged,
}

enum Lifecycle {
    NotStarted,
    Running(Running),
    Closed(CloseReason),
}

struct Running {
    child: Child,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    slot: Mutex<Option<Arc<Snapshot>>>,
    stop: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    /// Parse one line and, on success, publish it as the new latest snapshot.
    fn ingest(&self, parser: &SnapshotParser, line: &str) {
        match parser.parse(line) {
            Ok(fields) => {
                let sequence = self.published.load(Ordering::Acquire) + 1;
                let snapshot = Arc::new(Snapshot::new(sequence, fields));
                *lock(&self.slot) = Some(snapshot);
                self.published.store(sequence, Ordering::Release);
            }
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::AcqRel) + 1;
                log::debug!("dropped telemetry line ({dropped} so far): {e}");
            }
        }
    }

    /// Producer went away on its own: close without waiting for ourselves.
    fn terminate(&self) {
        let running = {
            let mut lifecycle = lock(&self.lifecycle);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Closed(CloseReason::Terminated)) {
                Lifecycle::Running(running) => Some(running),
                other => {
                    *lifecycle = other;
                    None
                }
            }
        };
        if let Some(mut running) = running {
            stop_child(&mut running.child);
            // The worker calling this is the thread in `running.worker`; detach it.
            drop(running.worker.take());
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Owns the telemetry producer and the latest published [`Snapshot`].
///
/// All methods take `&self`; the reader can be shared across threads and
/// closed from any of them. Dropping it closes it.
pub struct TelemetryReader {
    config: ReaderConfig,
    shared: Arc<Shared>,
}

impl TelemetryReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle::NotStarted),
                slot: Mutex::new(None),
                stop: AtomicBool::new(false),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Launch the producer and the background loop.
    ///
    /// Fails with [`ReaderError::AlreadyRunning`] on a second call, and never
    /// restarts a closed reader.
    pub fn start(&self, interval: Duration) -> Result<(), ReaderError> {
        let mut lifecycle = lock(&self.shared.lifecycle);
        match &*lifecycle {
            Lifecycle::NotStarted => {}
            Lifecycle::Running(_) => return Err(ReaderError::AlreadyRunning),
            Lifecycle::Closed(CloseReason::Terminated) => return Err(ReaderError::Terminated),
            Lifecycle::Closed(_) => return Err(ReaderError::Closed),
        }

        let mut child = self
            .config
            .build_command(interval)
            .spawn()
            .map_err(|source| ReaderError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            stop_child(&mut child);
            return Err(ReaderError::Spawn {
                program: self.config.program.clone(),
                source: std::io::Error::other("producer stdout was not captured"),
            });
        };

        let (tx, rx) = mpsc::sync_channel(LINE_BACKLOG);
        thread::Builder::new()
            .name("jtop-pump".into())
            .spawn(move || pump_lines(stdout, tx))
            .map_err(|source| {
                stop_child(&mut child);
                ReaderError::Spawn {
                    program: self.config.program.clone(),
                    source,
                }
            })?;

        let shared = Arc::clone(&self.shared);
        let parser = self.config.parser.clone();
        let stall = self.config.stall_window(interval);
        let worker = thread::Builder::new()
            .name("jtop-reader".into())
            .spawn(move || run_worker(&shared, &parser, &rx, stall))
            .map_err(|source| {
                stop_child(&mut child);
                ReaderError::Spawn {
                    program: self.config.program.clone(),
                    source,
                }
            })?;

        log::info!(
            "started {} (pid {}) every {}ms",
            self.config.program,
            child.id(),
            interval.as_millis()
        );
        *lifecycle = Lifecycle::Running(Running {
            child,
            worker: Some(worker),
        });
        Ok(())
    }

    /// Most recently published snapshot, or `None` before the first one.
    ///
    /// Never blocks on the background loop. Once the producer has terminated
    /// on its own this returns [`ReaderError::Terminated`] until [`close`](Self::close)
    /// is called; the frozen reading stays available through
    /// [`last_known`](Self::last_known), and from `latest` again after close.
    pub fn latest(&self) -> Result<Option<Arc<Snapshot>>, ReaderError> {
        if matches!(
            *lock(&self.shared.lifecycle),
            Lifecycle::Closed(CloseReason::Terminated)
        ) {
            return Err(ReaderError::Terminated);
        }
        Ok(self.last_known())
    }

    /// Latest snapshot regardless of how the reader ended.
    pub fn last_known(&self) -> Option<Arc<Snapshot>> {
        lock(&self.shared.slot).clone()
    }

    pub fn state(&self) -> ReaderState {
        match *lock(&self.shared.lifecycle) {
            Lifecycle::NotStarted => ReaderState::NotStarted,
            Lifecycle::Running(_) => ReaderState::Running,
            Lifecycle::Closed(_) => ReaderState::Closed,
        }
    }

    /// Pid of the running producer.
    pub fn producer_pid(&self) -> Option<u32> {
        match &*lock(&self.shared.lifecycle) {
            Lifecycle::Running(running) => Some(running.child.id()),
            _ => None,
        }
    }

    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            published: self.shared.published.load(Ordering::Acquire),
            dropped: self.shared.dropped.load(Ordering::Acquire),
        }
    }

    /// Stop the producer and the background loop. Idempotent.
    ///
    /// The last snapshot is kept and still returned by [`latest`](Self::latest).
    pub fn close(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        let running = {
            let mut lifecycle = lock(&self.shared.lifecycle);
            match &*lifecycle {
                Lifecycle::NotStarted => {
                    *lifecycle = Lifecycle::Closed(CloseReason::Requested);
                    None
                }
                Lifecycle::Running(_) => {
                    match std::mem::replace(
                        &mut *lifecycle,
                        Lifecycle::Closed(CloseReason::Requested),
                    ) {
                        Lifecycle::Running(running) => Some(running),
                        _ => None,
                    }
                }
                Lifecycle::Closed(CloseReason::Terminated) => {
                    *lifecycle = Lifecycle::Closed(CloseReason::Acknowledged);
                    None
                }
                Lifecycle::Closed(_) => None,
            }
        };

        let Some(mut running) = running else {
            return;
        };
        stop_child(&mut running.child);
        if let Some(worker) = running.worker.take()
            && worker.thread().id() != thread::current().id()
        {
            let _ = worker.join();
        }
        log::info!("closed {}", self.config.program);
    }
}

impl Drop for TelemetryReader {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Background threads
// ---------------------------------------------------------------------------

fn pump_lines(stdout: impl Read, tx: SyncSender<String>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::with_capacity(512);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("reading telemetry output failed: {e}");
                break;
            }
        }
    }
}

fn run_worker(shared: &Shared, parser: &SnapshotParser, lines: &Receiver<String>, stall: Duration) {
    let mut last_line = Instant::now();
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        match lines.recv_timeout(WORKER_TICK) {
            Ok(line) => {
                last_line = Instant::now();
                shared.ingest(parser, &line);
            }
            Err(RecvTimeoutError::Timeout) => {
                if last_line.elapsed() >= stall {
                    log::warn!(
                        "telemetry producer silent for {}ms, giving up",
                        stall.as_millis()
                    );
                    shared.terminate();
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if !shared.stop.load(Ordering::SeqCst) {
                    log::warn!("telemetry producer closed its output");
                    shared.terminate();
                }
                break;
            }
        }
    }
    log::debug!("telemetry worker exiting");
}

/// Terminate the producer's process group, escalating to SIGKILL.
///
/// Failures (already exited, already reaped) are swallowed.
fn stop_child(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill() has no memory-safety preconditions; a negative pid
            // addresses the process group created for the producer at spawn.
            unsafe {
                libc::kill(-pid, libc::SIGTERM);
            }
        }

        let deadline = Instant::now() + TERMINATE_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
                _ => {
                    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
                        // SAFETY: as above.
                        unsafe {
                            libc::kill(-pid, libc::SIGKILL);
                        }
                    }
                    break;
                }
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
}
