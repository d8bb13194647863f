//! Collaborator traits implemented by the host
//!
//! The sync engine never talks to an editor, a settings store or a login flow
//! directly. Everything it needs from its environment goes through these traits,
//! one adapter per host.

use crate::{FileHandle, ProjectId, Result};

/// Per-project opt-in required before any content leaves the machine
pub trait ConsentProvider: Send + Sync {
    /// Whether the user agreed to upload this project's files
    fn consent_given(&self, project: &ProjectId) -> bool;
}

/// Source of file text and line geometry
pub trait ContentProvider: Send + Sync {
    /// Read the current text of a file
    fn read_content(&self, file: &FileHandle) -> Result<String>;

    /// Absolute character offset at which the zero-based line starts.
    ///
    /// Returns `None` when the line does not exist in the current text.
    fn line_start_offset(&self, file: &FileHandle, line_index: usize) -> Option<usize>;
}

/// Progress display for long running steps
pub trait ProgressSink: Send + Sync {
    /// Replace the progress text
    fn set_text(&self, text: &str);

    /// Replace the progress fraction, in `[0, 1]`
    fn set_fraction(&self, fraction: f64);

    /// Return `Err(Error::Cancelled)` if the user cancelled the operation
    fn check_cancelled(&self) -> Result<()> {
        Ok(())
    }
}

/// Hook asking the host to start a re-login
pub trait AuthSignal: Send + Sync {
    /// Called when the service rejected the token
    fn on_unauthorized(&self, project: &ProjectId);
}

/// Hook asking the host to rescan a whole project
pub trait RescanSignal: Send + Sync {
    /// Called when the service reports the analysis as failed
    fn request_full_rescan(&self, project: &ProjectId);
}

/// Hook asking the host to redraw whatever shows findings
pub trait UiRefresh: Send + Sync {
    /// Called after every mutating cache operation
    fn refresh(&self, project: &ProjectId);
}

/// Progress sink that shows nothing and never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn set_text(&self, _text: &str) {}

    fn set_fraction(&self, _fraction: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_progress_never_cancels() {
        let progress = SilentProgress;
        progress.set_text("anything");
        progress.set_fraction(0.5);
        assert!(progress.check_cancelled().is_ok());
    }
}
