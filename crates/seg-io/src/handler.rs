//! Error reporting and relocation hook

use std::path::{Path, PathBuf};

/// Receives load/save diagnostics and may relocate missing files
pub trait ErrorHandler {
    /// Non-fatal condition
    fn warning(&mut self, message: &str);

    /// Fatal condition, reported before the error is returned
    fn error(&mut self, message: &str);

    /// `path` is missing; return a replacement to retry once, `None` to give
    /// up. `hint` names what the file is for.
    fn file_not_found(&mut self, path: &Path, hint: &str) -> Option<PathBuf>;
}

/// Logs through `tracing` and never relocates
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn warning(&mut self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&mut self, message: &str) {
        tracing::error!("{message}");
    }

    fn file_not_found(&mut self, path: &Path, hint: &str) -> Option<PathBuf> {
        tracing::error!(path = %path.display(), hint, "file not found");
        None
    }
}
