//! # pdemon-daemon - emerge Process Management
//!
//! Runs `emerge --sync` and `emerge --pretend` under cooperative
//! cancellation, parses dry-run output, and detects emerge runs started by
//! other tools or by hand.
//!
//! Depends on [`pdemon_core`] for error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`EmergeCommand`] - A configured emerge invocation
//! - [`run_emerge()`] - Run a command to completion or cancellation
//! - [`SyncOutcome`] - Success, network error, failure, or cancelled
//!
//! ### Dry Runs
//! - [`parse_pretend_output()`] - Pending package count and Portage upgrade flag
//!
//! ### External Activity
//! - [`ProcessChecker`] - "Is an emerge of this kind running?"
//! - [`SysinfoProcessChecker`] - Process-table implementation
//! - [`classify_cmdline()`] - Classify one command line
//!
//! ### Platform Utilities
//! - [`ToolAvailability`] - Check for emerge and emaint

pub mod commands;
pub mod pretend;
pub mod process;
pub mod running;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tool_availability;

// Public API re-exports
pub use commands::{CommandKind, EmergeCommand, DEFAULT_PRETEND_ARGV, DEFAULT_SYNC_ARGV};
pub use pretend::{parse_pretend_output, PretendReport};
pub use process::{run_emerge, CommandOutput, SyncOutcome, TERMINATE_GRACE};
pub use running::{
    classify_cmdline, ActiveEmerges, EmergeKind, ProcessChecker, SysinfoProcessChecker,
};
pub use tool_availability::ToolAvailability;
