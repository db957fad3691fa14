//! Tool availability checking
//!
//! The daemon needs `emerge` to run syncs and dry runs. `emaint` is optional
//! and only reported.

use std::path::PathBuf;

/// Cached availability of Portage tools
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Path to `emerge` if found on `PATH`
    pub emerge_path: Option<PathBuf>,

    /// Path to `emaint` if found on `PATH`
    pub emaint_path: Option<PathBuf>,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub fn check() -> Self {
        Self {
            emerge_path: Self::locate("emerge"),
            emaint_path: Self::locate("emaint"),
        }
    }

    fn locate(tool: &str) -> Option<PathBuf> {
        which::which(tool)
            .inspect_err(|e| tracing::debug!("{} not found: {}", tool, e))
            .ok()
    }

    pub fn has_emerge(&self) -> bool {
        self.emerge_path.is_some()
    }

    /// Get user-friendly message when emerge is missing
    pub fn emerge_unavailable_message(&self) -> Option<&'static str> {
        if self.has_emerge() {
            None
        } else {
            Some("emerge not found on PATH. Sync and pending-package checks are disabled.")
        }
    }
}
