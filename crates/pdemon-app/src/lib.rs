//! pdemon-app - Scheduling, state and orchestration for Portage Demon
//!
//! This crate implements the TEA (The Elm Architecture) loop around the
//! PortageUpdateCoordinator: configuration loading, the typed state store,
//! the log watcher, the status service and the Engine that ties them
//! together.

pub mod actions;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod handler;
pub mod message;
pub mod scan;
pub mod signals;
pub mod state_store;
pub mod status;
pub mod watcher;

// Re-export primary types
pub use config::Settings;
pub use coordinator::PortageUpdateCoordinator;
pub use engine::Engine;
pub use handler::{UpdateAction, UpdateResult};
pub use message::Message;
pub use state_store::{StateKey, StateStore, StateValue};
pub use status::{LocalStatusService, SharedStatusService, StatusService, StatusSnapshot};

// Re-export daemon types for the binary
pub use pdemon_daemon::{SysinfoProcessChecker, ToolAvailability};
