//! # jtop-core
//!
//! Telemetry acquisition for the `jtop` dashboard.
//!
//! `jtop-core` launches the vendor stats producer (`tegrastats` on Jetson
//! boards), parses every line it emits into an immutable [`Snapshot`], and
//! publishes the most recent one for any number of consumers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use jtop_core::{ReaderConfig, TelemetryReader};
//!
//! let reader = TelemetryReader::new(ReaderConfig::default());
//! reader.start(Duration::from_millis(500)).expect("tegrastats not found");
//!
//! std::thread::sleep(Duration::from_secs(1));
//! if let Ok(Some(snapshot)) = reader.latest() {
//!     println!("GPU load: {:?}", snapshot.value("GR3D_FREQ"));
//! }
//! reader.close();
//! ```
//!
//! ## Architecture
//!
//! Producer subprocess → line pump → [`SnapshotParser`] → latest-snapshot slot
//!
//! The reader is pulled, never pushes: consumers call
//! [`TelemetryReader::latest`] whenever they want the current reading.

pub mod board;
pub mod cancel;
pub mod error;
pub mod reader;
pub mod snapshot;

pub use board::{BOARD_PATTERN, BoardInfo, DEFAULT_VARIABLES_FILE};
pub use cancel::CancelToken;
pub use error::{ParseError, ParseErrorKind, ReaderError};
pub use reader::{ReaderConfig, ReaderState, ReaderStats, TelemetryReader};
pub use snapshot::{Fields, Metric, Snapshot, SnapshotParser, Switch, TEGRASTATS_FIELDS, Unit};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
