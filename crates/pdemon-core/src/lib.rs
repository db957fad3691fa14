//! # pdemon-core - emerge.log Parsing
//!
//! Foundation crate for Portage Demon. Reads Portage's `emerge.log` and
//! recovers the last repository sync and the last world update from it.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Log Access (`line_source`, `scan_window`)
//! - [`line_count()`] - Count the lines of a log file
//! - [`tail()`] - Stream the last N lines of a log, oldest first
//! - [`ScanWindowPlanner`] - Geometric widening of the scanned tail
//! - [`Lookup`] - Found value or a giveup diagnostic ([`Exhausted`])
//!
//! ### Line Grammar (`patterns`)
//! - [`LogEvent`] - A classified emerge.log line
//!
//! ### Sync Lookup (`sync_log`)
//! - [`last_sync_timestamp()`] - Most recent completed sync of the primary repo
//!
//! ### World Updates (`world_update`)
//! - [`last_world_update()`] - Most recent eligible world update
//! - [`UpdateRecord`], [`UpdateState`] - A finalized run and its classification
//! - [`WorldUpdateScanner`] - Runs the state machine over a window
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum; `LogAccess` keeps "cannot read" apart from "not found"
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! ```rust
//! use pdemon_core::prelude::*;
//! ```

pub mod error;
pub mod line_source;
pub mod logging;
pub mod patterns;
pub mod prelude;
pub mod scan_window;
pub mod sync_log;
pub mod timestamp;
pub mod world_update;

pub use error::{Error, Result, ResultExt};
pub use line_source::{line_count, tail, LogLine, TailLines};
pub use patterns::LogEvent;
pub use scan_window::{Exhausted, LogLength, Lookup, ScanWindow, ScanWindowPlanner};
pub use sync_log::{last_sync_timestamp, SyncScanOptions};
pub use world_update::{
    last_world_update, select_latest, FailedPackage, ParsedWindow, RejectReason, Rejection,
    ScanState, Threshold, Thresholds, UpdateRecord, UpdateState, WorldUpdateOptions,
    WorldUpdateScanner,
};
