//! Portage Demon Library
//!
//! Entry points behind the `pdemon` binary: the daemon runner and the
//! one-shot `scan` and `status` reports.

pub mod report;
pub mod runner;

pub use report::{run_scan, run_status, ScanSummary};
pub use runner::run_daemon;
