//! Handler module - TEA update function
//!
//! - `update`: message dispatch against the coordinator

pub(crate) mod update;

#[cfg(test)]
mod tests;

use crate::message::Message;

pub use update::update;

/// Actions the engine performs after update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// Run the sync and world update lookups on a blocking worker
    ScanLog,

    /// Start the configured sync command
    RunSync,

    /// Start the configured pretend command
    RunPretend,

    /// Cancel the in-flight pretend command
    CancelPretend,

    /// Query the process table
    CheckProcesses,
}

/// Result of processing a message
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Optional follow-up message to process
    pub message: Option<Message>,
    /// Optional action for the engine to perform
    pub action: Option<UpdateAction>,
}

impl UpdateResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn message(msg: Message) -> Self {
        Self {
            message: Some(msg),
            action: None,
        }
    }

    pub fn action(action: UpdateAction) -> Self {
        Self {
            message: None,
            action: Some(action),
        }
    }
}
