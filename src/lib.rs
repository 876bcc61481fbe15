//! Incremental training-log parser and metric classifier.
//!
//! A training process appends one JSON object per report to a log file. This
//! crate turns the growing log into named, append-only time series suitable
//! for a live dashboard:
//!
//! - [`record`] normalizes one report into numeric key/value pairs
//! - [`classify`] guesses which keys belong together (loss, accuracy,
//!   micro-averaged ratios, parameter statistics)
//! - [`timeline`] holds the series histories and their state hashes
//! - [`handler`] drives incremental ingestion and detects replaced logs
//! - [`poll`] answers dashboard polls and plot requests

pub mod classify;
pub mod config;
pub mod error;
pub mod handler;
pub mod loader;
pub mod poll;
pub mod record;
pub mod sanitize;
pub mod timeline;
pub mod token;
#[cfg(feature = "watch")]
pub mod watch;

pub use config::BoardConfig;
pub use error::{Error, Result};
pub use handler::{EventSnapshot, TensorSnapshot, TimelineHandler, UpdateReport};
pub use record::{RawRecord, Record};
