//! Integration tests for the telemetry reader.
//!
//! Producers are scripted with `sh -c` so the full pipeline runs:
//! subprocess → line pump → parser → published snapshot.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jtop_core::{
    ReaderConfig, ReaderError, ReaderState, SnapshotParser, TelemetryReader,
};

const INTERVAL: Duration = Duration::from_millis(500);

fn sh(script: &str, fields: &[&str]) -> TelemetryReader {
    let parser = SnapshotParser::new(fields.iter().copied());
    TelemetryReader::new(ReaderConfig::command("sh", ["-c", script], parser))
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn latest_cpu(reader: &TelemetryReader) -> Option<f64> {
    reader.latest().ok().flatten().and_then(|s| s.value("cpu"))
}

#[test]
fn bad_line_keeps_previous_snapshot() {
    let reader = sh(
        "printf 'cpu 42\\n'; sleep 0.3; printf 'cpu 4z2\\n'; sleep 0.3; printf 'cpu 50\\n'; sleep 30",
        &["cpu"],
    );
    reader.start(INTERVAL).unwrap();

    assert!(wait_until(Duration::from_secs(5), || latest_cpu(&reader) == Some(42.0)));
    let first = reader.latest().unwrap().unwrap();
    assert_eq!(first.sequence(), 1);

    assert!(wait_until(Duration::from_secs(5), || reader.stats().dropped == 1));
    let unchanged = reader.latest().unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &unchanged));
    assert_eq!(unchanged.value("cpu"), Some(42.0));

    assert!(wait_until(Duration::from_secs(5), || latest_cpu(&reader) == Some(50.0)));
    assert_eq!(reader.latest().unwrap().unwrap().sequence(), 2);
    assert_eq!(reader.state(), ReaderState::Running);
}

#[test]
fn missing_producer_is_spawn_error() {
    let reader = TelemetryReader::new(ReaderConfig::tegrastats("/nonexistent/jtop-producer"));
    match reader.start(INTERVAL) {
        Err(ReaderError::Spawn { program, .. }) => {
            assert_eq!(program, "/nonexistent/jtop-producer");
        }
        other => panic!("expected spawn error, got {other:?}"),
    }
    assert_eq!(reader.state(), ReaderState::NotStarted);
    assert!(reader.latest().unwrap().is_none());
}

#[test]
fn second_start_is_rejected() {
    let reader = sh("while true; do echo cpu 1; sleep 0.1; done", &["cpu"]);
    reader.start(INTERVAL).unwrap();
    assert!(matches!(
        reader.start(INTERVAL),
        Err(ReaderError::AlreadyRunning)
    ));
    assert_eq!(reader.state(), ReaderState::Running);
}

#[test]
fn close_is_idempotent_and_keeps_last_snapshot() {
    let reader = sh("echo cpu 7; sleep 30", &["cpu"]);
    reader.start(INTERVAL).unwrap();
    assert!(wait_until(Duration::from_secs(5), || latest_cpu(&reader).is_some()));
    let pid = reader.producer_pid().unwrap();

    reader.close();
    let after_first = reader.latest().unwrap().unwrap();
    reader.close();
    let after_second = reader.latest().unwrap().unwrap();

    assert!(Arc::ptr_eq(&after_first, &after_second));
    assert_eq!(after_second.value("cpu"), Some(7.0));
    assert_eq!(reader.state(), ReaderState::Closed);
    assert_eq!(reader.producer_pid(), None);
    assert!(matches!(reader.start(INTERVAL), Err(ReaderError::Closed)));

    // The producer was reaped: signalling its pid now fails.
    let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
    assert!(!alive, "producer {pid} still running after close");
}

#[test]
fn close_from_another_thread() {
    let reader = Arc::new(sh("while true; do echo cpu 1; sleep 0.1; done", &["cpu"]));
    reader.start(INTERVAL).unwrap();

    let closer = Arc::clone(&reader);
    thread::spawn(move || closer.close()).join().unwrap();

    assert_eq!(reader.state(), ReaderState::Closed);
    reader.close();
}

#[test]
fn producer_exit_surfaces_terminated() {
    let reader = sh("echo cpu 3", &["cpu"]);
    reader.start(INTERVAL).unwrap();

    assert!(wait_until(Duration::from_secs(5), || matches!(
        reader.latest(),
        Err(ReaderError::Terminated)
    )));
    assert_eq!(reader.state(), ReaderState::Closed);
    assert_eq!(reader.last_known().unwrap().value("cpu"), Some(3.0));
    assert!(matches!(
        reader.start(INTERVAL),
        Err(ReaderError::Terminated)
    ));

    reader.close();
    let last = reader.latest().unwrap().unwrap();
    assert_eq!(last.value("cpu"), Some(3.0));
    assert!(matches!(reader.start(INTERVAL), Err(ReaderError::Closed)));
    reader.close();
    assert_eq!(reader.latest().unwrap().unwrap().sequence(), last.sequence());
}

#[test]
fn silent_producer_is_treated_as_terminated() {
    // Window is floored at one second even though 20ms * 5 is shorter.
    let mut config = ReaderConfig::command(
        "sh",
        ["-c", "echo cpu 1; sleep 30"],
        SnapshotParser::new(["cpu"]),
    );
    config.stall_factor = 5;
    let reader = TelemetryReader::new(config);
    reader.start(Duration::from_millis(20)).unwrap();

    assert!(wait_until(Duration::from_secs(5), || matches!(
        reader.latest(),
        Err(ReaderError::Terminated)
    )));
    assert_eq!(reader.last_known().unwrap().value("cpu"), Some(1.0));
}

#[test]
fn short_interval_tolerates_slower_producer() {
    let reader = sh("while true; do echo cpu 1; sleep 0.2; done", &["cpu"]);
    reader.start(Duration::from_millis(1)).unwrap();

    thread::sleep(Duration::from_millis(700));
    assert!(matches!(reader.latest(), Ok(Some(_))));
    assert_eq!(reader.state(), ReaderState::Running);
}

#[test]
fn concurrent_reads_see_whole_monotonic_snapshots() {
    const LINES: u64 = 300;
    let script = format!(
        "i=0; while [ $i -lt {LINES} ]; do echo \"a $i b $i\"; i=$((i+1)); done; sleep 30"
    );
    let reader = Arc::new(sh(&script, &["a", "b"]));
    reader.start(INTERVAL).unwrap();

    let sampler = {
        let reader = Arc::clone(&reader);
        thread::spawn(move || {
            let mut last_seq = 0;
            let deadline = Instant::now() + Duration::from_secs(10);
            while reader.stats().published < LINES && Instant::now() < deadline {
                if let Ok(Some(s)) = reader.latest() {
                    assert_eq!(s.value("a"), s.value("b"), "torn snapshot {s:?}");
                    assert!(s.sequence() >= last_seq);
                    last_seq = s.sequence();
                }
            }
            last_seq
        })
    };

    let mut last_seq = 0;
    assert!(wait_until(Duration::from_secs(10), || {
        if let Ok(Some(s)) = reader.latest() {
            assert_eq!(s.value("a"), s.value("b"));
            assert!(s.sequence() >= last_seq);
            last_seq = s.sequence();
        }
        reader.stats().published == LINES
    }));
    sampler.join().unwrap();

    let last = reader.latest().unwrap().unwrap();
    assert_eq!(last.sequence(), LINES);
    assert_eq!(last.value("a"), Some((LINES - 1) as f64));
    assert_eq!(reader.stats().dropped, 0);
}

#[test]
fn drop_closes_reader() {
    let reader = sh("while true; do echo cpu 1; sleep 0.1; done", &["cpu"]);
    reader.start(INTERVAL).unwrap();
    let pid = reader.producer_pid().unwrap();
    drop(reader);

    let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
    assert!(!alive, "producer {pid} outlived its reader");
}
