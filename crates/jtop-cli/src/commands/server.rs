//! Headless mode: one JSON snapshot per line on stdout.
//!
//! The port is accepted and logged so scripts written for the network
//! server keep working, but nothing listens on it.

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use jtop_core::{CancelToken, TelemetryReader};

use super::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_OK};

const EMIT_PERIOD: Duration = Duration::from_secs(1);
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Interrupted,
    Terminated,
}

pub fn run(reader: &TelemetryReader, port: u16, cancel: &CancelToken) -> i32 {
    log::info!("server mode on port {port}: writing snapshots to stdout");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match stream(reader, cancel, &mut out, EMIT_PERIOD) {
        Ok(StreamEnd::Interrupted) => EXIT_INTERRUPTED,
        Ok(StreamEnd::Terminated) => {
            eprintln!("Error: telemetry producer terminated");
            EXIT_FAILURE
        }
        // Closed pipe on the consumer side.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => EXIT_OK,
        Err(e) => {
            eprintln!("Error: {e}");
            EXIT_FAILURE
        }
    }
}

/// Write the latest snapshot every `period` until cancelled or the producer ends.
pub fn stream<W: Write>(
    reader: &TelemetryReader,
    cancel: &CancelToken,
    out: &mut W,
    period: Duration,
) -> io::Result<StreamEnd> {
    let mut last_sequence = None;
    loop {
        if cancel.is_cancelled() {
            return Ok(StreamEnd::Interrupted);
        }
        match reader.latest() {
            Ok(Some(snapshot)) => {
                if last_sequence == Some(snapshot.sequence()) {
                    log::debug!("no new reading since #{}", snapshot.sequence());
                }
                last_sequence = Some(snapshot.sequence());
                writeln!(out, "{}", serde_json::to_string(&*snapshot)?)?;
                out.flush()?;
            }
            Ok(None) => log::debug!("waiting for first reading"),
            Err(e) => {
                log::warn!("{e}");
                return Ok(StreamEnd::Terminated);
            }
        }

        let deadline = Instant::now() + period;
        while !cancel.is_cancelled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jtop_core::{ReaderConfig, SnapshotParser};

    fn sh(script: &str) -> TelemetryReader {
        TelemetryReader::new(ReaderConfig::command(
            "sh",
            ["-c", script],
            SnapshotParser::new(["cpu"]),
        ))
    }

    fn wait_for_reading(reader: &TelemetryReader) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !matches!(reader.latest(), Ok(Some(_))) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn writes_json_lines_until_cancelled() {
        let reader = sh("while true; do echo cpu 5; sleep 0.05; done");
        reader.start(Duration::from_millis(50)).unwrap();
        wait_for_reading(&reader);

        let cancel = CancelToken::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                cancel.cancel();
            })
        };

        let mut out = Vec::new();
        let end = stream(&reader, &cancel, &mut out, Duration::from_millis(20)).unwrap();
        canceller.join().unwrap();
        assert_eq!(end, StreamEnd::Interrupted);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(!lines.is_empty());
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value["sequence"].as_u64().unwrap() >= 1);
            assert!(value["fields"].get("cpu").is_some(), "{line}");
        }
    }

    #[test]
    fn stops_when_producer_terminates() {
        let reader = sh("echo cpu 1");
        reader.start(Duration::from_millis(50)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while reader.latest().is_ok() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let mut out = Vec::new();
        let end = stream(&reader, &CancelToken::new(), &mut out, Duration::from_millis(10)).unwrap();
        assert_eq!(end, StreamEnd::Terminated);
        assert!(out.is_empty());
    }

    #[test]
    fn cancelled_before_start_writes_nothing() {
        let reader = TelemetryReader::new(ReaderConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        assert_eq!(
            stream(&reader, &cancel, &mut out, EMIT_PERIOD).unwrap(),
            StreamEnd::Interrupted
        );
        assert!(out.is_empty());
    }
}
