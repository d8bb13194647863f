//! Progress tracking and cooperative cancellation for sync operations

use codesight_types::{Error, ProgressSink, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Phases of one bundle sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Nothing started yet
    Idle,
    /// Hashing files and flushing oversized batches
    Preparing,
    /// Final create or extend call
    CreatingBundle,
    /// Uploading missing file contents
    UploadingFiles,
    /// Waiting for the analysis to finish
    Polling,
    /// Analysis finished
    Done,
    /// A step failed or the service reported a failed analysis
    Failed,
    /// Polling ran out of budget
    TimedOut,
}

impl SyncPhase {
    /// Whether the sync stopped in this phase
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::TimedOut)
    }

    fn description(self) -> &'static str {
        match self {
            Self::Idle => "Waiting",
            Self::Preparing => "Preparing files for upload",
            Self::CreatingBundle => "Creating bundle",
            Self::UploadingFiles => "Uploading files",
            Self::Polling => "Waiting for analysis",
            Self::Done => "Analysis finished",
            Self::Failed => "Analysis failed",
            Self::TimedOut => "Analysis timed out",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Snapshot of a running sync
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Operation id, shared by every log line of one sync
    pub operation_id: uuid::Uuid,
    /// Current phase
    pub phase: SyncPhase,
    /// Last reported fraction, in `[0, 1]`
    pub fraction: f64,
    /// Start of the operation
    pub start_time: Instant,
}

impl SyncProgress {
    /// Create a new sync progress
    pub fn new(operation_id: uuid::Uuid) -> Self {
        Self {
            operation_id,
            phase: SyncPhase::Idle,
            fraction: 0.0,
            start_time: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed_time(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Forwards progress to the host's [`ProgressSink`] and answers cancellation.
///
/// Cancellation is requested either through the host sink or through the
/// [`CancellationToken`]; [`ProgressReporter::check_cancelled`] honours both.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    token: CancellationToken,
    progress: Arc<Mutex<SyncProgress>>,
}

impl ProgressReporter {
    /// Create a reporter for a new operation
    pub fn new(sink: Arc<dyn ProgressSink>, token: CancellationToken) -> Self {
        Self {
            sink,
            token,
            progress: Arc::new(Mutex::new(SyncProgress::new(uuid::Uuid::new_v4()))),
        }
    }

    /// Reporter with a silent sink and a token nobody cancels
    pub fn silent() -> Self {
        Self::new(
            Arc::new(codesight_types::SilentProgress),
            CancellationToken::new(),
        )
    }

    /// Token cancelling this operation
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Get the current progress
    pub fn get_progress(&self) -> SyncProgress {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Update the current phase and show its description
    pub fn set_phase(&self, phase: SyncPhase) {
        let operation_id = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            progress.phase = phase;
            progress.operation_id
        };
        debug!(%operation_id, ?phase, "Sync phase changed");
        self.sink.set_text(phase.description());
    }

    /// Show free-form progress text
    pub fn set_text(&self, text: &str) {
        self.sink.set_text(text);
    }

    /// Show a completion fraction, clamped to `[0, 1]`
    pub fn set_fraction(&self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fraction = fraction;
        self.sink.set_fraction(fraction);
    }

    /// Return `Err(Error::Cancelled)` once cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.sink.check_cancelled()
    }

    /// Sleep for `duration`, waking early with an error on cancellation
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            () = self.token.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(duration) => self.check_cancelled(),
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("progress", &self.get_progress())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        texts: Mutex<Vec<String>>,
        fractions: Mutex<Vec<f64>>,
        cancelled: AtomicBool,
    }

    impl ProgressSink for RecordingSink {
        fn set_text(&self, text: &str) {
            self.texts.lock().unwrap().push(text.to_string());
        }

        fn set_fraction(&self, fraction: f64) {
            self.fractions.lock().unwrap().push(fraction);
        }

        fn check_cancelled(&self) -> Result<()> {
            if self.cancelled.load(Ordering::SeqCst) {
                Err(Error::Cancelled)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_phase_and_fraction_reach_sink() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone(), CancellationToken::new());

        reporter.set_phase(SyncPhase::UploadingFiles);
        reporter.set_fraction(1.7);
        reporter.set_fraction(f64::NAN);

        assert_eq!(sink.texts.lock().unwrap().as_slice(), ["Uploading files"]);
        assert_eq!(sink.fractions.lock().unwrap().as_slice(), [1.0, 0.0]);
        assert_eq!(reporter.get_progress().phase, SyncPhase::UploadingFiles);
    }

    #[test]
    fn test_cancellation_from_sink_or_token() {
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let reporter = ProgressReporter::new(sink.clone(), token.clone());
        assert!(reporter.check_cancelled().is_ok());

        sink.cancelled.store(true, Ordering::SeqCst);
        assert_eq!(reporter.check_cancelled(), Err(Error::Cancelled));

        sink.cancelled.store(false, Ordering::SeqCst);
        token.cancel();
        assert_eq!(reporter.check_cancelled(), Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_sleep_wakes_on_cancel() {
        let reporter = ProgressReporter::silent();
        let token = reporter.token().clone();
        let sleeper = tokio::spawn({
            let reporter = reporter.clone();
            async move { reporter.sleep(Duration::from_secs(3600)).await }
        });

        token.cancel();
        assert_eq!(sleeper.await.unwrap(), Err(Error::Cancelled));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(SyncPhase::Done.is_terminal());
        assert!(SyncPhase::TimedOut.is_terminal());
        assert!(!SyncPhase::Polling.is_terminal());
    }
}
