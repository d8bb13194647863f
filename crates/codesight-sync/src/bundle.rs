//! Bundle protocol: prepare, create or extend, upload, poll

use crate::{
    content::ContentHashStore,
    progress::{ProgressReporter, SyncPhase},
    projects::ProjectRegistry,
};
use codesight_config::Config;
use codesight_network::{
    AnalysisResponse, AnalysisStatus, ApiClient, BundleFiles, BundleResponse,
    ExtendBundleRequest, FileContent, UploadEntry,
};
use codesight_types::{
    AttemptLimit, FileHandle, PayloadLimit, PollSchedule, ProjectId, RescanSignal, Result,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Limits the bundle protocol runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Ceiling for one create/extend or upload request
    pub max_payload_bytes: PayloadLimit,
    /// Upload passes before giving up on missing files
    pub upload_attempts: AttemptLimit,
    /// Analysis polling budget
    pub poll: PollSchedule,
    /// Files larger than this are never put into a bundle
    pub max_file_size: u64,
    /// Delay between two checks while waiting for a running update
    pub wait_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_payload_bytes: config.sync.max_payload_bytes,
            upload_attempts: config.sync.upload_attempts,
            poll: config.sync.poll,
            max_file_size: config.sync.max_file_size,
            wait_interval: Duration::from_millis(config.sync.wait_interval_ms),
        }
    }
}

/// How a sync ended
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Bundle the analysis ran on, empty when none was created
    pub bundle_id: String,
    /// Terminal phase: `Done`, `Failed` or `TimedOut`
    pub phase: SyncPhase,
    /// Last analysis response received
    pub response: AnalysisResponse,
}

impl SyncOutcome {
    /// Create a new outcome
    pub fn new(bundle_id: &str, phase: SyncPhase, response: AnalysisResponse) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            phase,
            response,
        }
    }

    /// Outcome without any analysis response
    pub fn empty(phase: SyncPhase) -> Self {
        Self {
            bundle_id: String::new(),
            phase,
            response: AnalysisResponse::default(),
        }
    }

    /// Whether the analysis finished and its results can be committed
    pub fn is_done(&self) -> bool {
        self.phase == SyncPhase::Done && self.response.status == AnalysisStatus::Done
    }
}

/// Estimated serialized size of one path→hash entry
pub fn estimate_entry_size(path: &str, hash: &str) -> usize {
    2 * (path.len() + hash.len())
}

/// Accumulates path→hash entries and hands out full batches.
///
/// A batch is released before an entry would push its estimate over the limit,
/// so every released batch stays within the limit unless it holds a single
/// oversized entry.
#[derive(Debug)]
pub struct BatchAccumulator {
    limit: usize,
    estimate: usize,
    files: BTreeMap<String, String>,
}

impl BatchAccumulator {
    /// Create an empty accumulator
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            estimate: 0,
            files: BTreeMap::new(),
        }
    }

    /// Add an entry, returning the previous batch if it had to be flushed first
    pub fn push(&mut self, path: String, hash: String) -> Option<BTreeMap<String, String>> {
        let size = estimate_entry_size(&path, &hash);
        let flushed = if !self.files.is_empty() && self.estimate + size > self.limit {
            Some(self.take())
        } else {
            None
        };
        self.estimate += size;
        self.files.insert(path, hash);
        flushed
    }

    /// Take the remainder
    pub fn take(&mut self) -> BTreeMap<String, String> {
        self.estimate = 0;
        std::mem::take(&mut self.files)
    }

    /// Estimated size of the pending batch
    pub fn estimate(&self) -> usize {
        self.estimate
    }
}

/// Split upload entries into groups whose cumulative size stays within `limit`.
///
/// An entry larger than the limit travels alone; no group is ever empty.
pub fn group_uploads(entries: Vec<UploadEntry>, limit: usize) -> Vec<Vec<UploadEntry>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut size = 0usize;

    for entry in entries {
        let entry_size = entry.file_hash.len() + entry.file_content.len();
        if !current.is_empty() && size + entry_size > limit {
            groups.push(std::mem::take(&mut current));
            size = 0;
        }
        size += entry_size;
        current.push(entry);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Drives the remote bundle protocol for one project at a time
pub struct BundleSyncClient {
    api: Arc<ApiClient>,
    content: Arc<ContentHashStore>,
    projects: Arc<ProjectRegistry>,
    rescan: Arc<dyn RescanSignal>,
    options: SyncOptions,
}

impl BundleSyncClient {
    /// Create a new bundle client
    pub fn new(
        api: Arc<ApiClient>,
        content: Arc<ContentHashStore>,
        projects: Arc<ProjectRegistry>,
        rescan: Arc<dyn RescanSignal>,
        options: SyncOptions,
    ) -> Self {
        Self {
            api,
            content,
            projects,
            rescan,
            options,
        }
    }

    /// Protocol limits in use
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Full sync: upload the bundle, then poll the analysis
    pub async fn sync(
        &self,
        project: &ProjectId,
        files: &[FileHandle],
        removed: &[FileHandle],
        progress: &ProgressReporter,
    ) -> Result<SyncOutcome> {
        info!(%project, files = files.len(), removed = removed.len(), "Starting bundle sync");

        let bundle_id = self.upload_bundle(project, files, removed, progress).await?;
        if bundle_id.is_empty() {
            info!(%project, "No bundle to analyse");
            progress.set_phase(SyncPhase::Done);
            return Ok(SyncOutcome::empty(SyncPhase::Done));
        }

        let outcome = self.poll_analysis(project, &bundle_id, progress).await?;
        info!(
            %project,
            bundle_id,
            phase = %outcome.phase,
            elapsed = ?progress.get_progress().elapsed_time(),
            "Bundle sync finished"
        );
        Ok(outcome)
    }

    /// Prepare, create or extend, and upload. Returns the project's bundle id.
    pub async fn upload_bundle(
        &self,
        project: &ProjectId,
        files: &[FileHandle],
        removed: &[FileHandle],
        progress: &ProgressReporter,
    ) -> Result<String> {
        // Every request of this sync is made against the bundle the project had
        // when it started.
        let parent = self.projects.bundle_id(project);

        // Phase 1: Hash files, flushing batches that outgrow the payload limit
        progress.set_phase(SyncPhase::Preparing);
        let mut batch = BatchAccumulator::new(self.options.max_payload_bytes.get());
        let mut prepared: HashMap<String, FileHandle> = HashMap::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            progress.check_cancelled()?;
            progress.set_fraction(index as f64 / files.len() as f64);

            self.content.invalidate(file);
            let record = match self.content.record(file) {
                Ok(record) => record,
                Err(e) => {
                    warn!(%file, error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            if record.len() as u64 > self.options.max_file_size {
                debug!(%file, size = record.len(), "Skipping file over the size limit");
                continue;
            }

            prepared.insert(file.path().to_string(), file.clone());
            if let Some(full) = batch.push(file.path().to_string(), record.hash.to_string()) {
                info!(%project, files = full.len(), "Payload limit reached, flushing bundle batch");
                // Only the final request's bundle id is kept.
                let flushed = self
                    .create_or_extend(project, &parent, full, Vec::new(), progress)
                    .await?;
                debug!(%project, bundle_id = %flushed.bundle_id, "Discarding intermediate bundle id");
            }
        }

        // Phase 2: Final create or extend with the remainder and the removals
        progress.set_phase(SyncPhase::CreatingBundle);
        let removed_paths: Vec<String> = removed.iter().map(|f| f.path().to_string()).collect();
        let remainder = batch.take();
        if remainder.is_empty() && parent.is_empty() {
            debug!(%project, "Nothing to put into a new bundle");
            return Ok(String::new());
        }
        let response = self
            .create_or_extend(project, &parent, remainder, removed_paths, progress)
            .await?;
        self.projects.set_bundle_id(project, &response.bundle_id);
        let bundle_id = self.projects.bundle_id(project);
        if bundle_id.is_empty() {
            return Ok(bundle_id);
        }

        // Phase 3: Upload missing contents until the service has them all
        progress.set_phase(SyncPhase::UploadingFiles);
        self.upload_until_complete(project, &bundle_id, response.missing_files, &prepared, progress)
            .await?;

        Ok(bundle_id)
    }

    /// Single-file analysis with inline content.
    ///
    /// The bundle created here is not recorded as the project's bundle.
    pub async fn analyze_single(
        &self,
        project: &ProjectId,
        file: &FileHandle,
        progress: &ProgressReporter,
    ) -> Result<SyncOutcome> {
        progress.set_phase(SyncPhase::Preparing);
        progress.check_cancelled()?;

        self.content.invalidate(file);
        let record = self.content.record(file)?;
        if record.len() as u64 > self.options.max_file_size {
            debug!(%file, size = record.len(), "File over the size limit, not analysed");
            return Ok(SyncOutcome::empty(SyncPhase::Failed));
        }

        let mut contents = BTreeMap::new();
        contents.insert(
            file.path().to_string(),
            FileContent {
                hash: record.hash.to_string(),
                content: record.content.to_string(),
            },
        );

        progress.set_phase(SyncPhase::CreatingBundle);
        progress.check_cancelled()?;
        let response = self
            .api
            .create_bundle(project, &BundleFiles::Contents(contents))
            .await?;
        progress.check_cancelled()?;

        if response.bundle_id.is_empty() {
            warn!(%project, %file, "Service returned no bundle for inline content");
            return Ok(SyncOutcome::empty(SyncPhase::Failed));
        }
        debug!(%project, bundle_id = %response.bundle_id, "Created inline bundle");

        self.poll_analysis(project, &response.bundle_id, progress)
            .await
    }

    /// Create a bundle, or extend `parent` when there is one
    async fn create_or_extend(
        &self,
        project: &ProjectId,
        parent: &str,
        files: BTreeMap<String, String>,
        removed_files: Vec<String>,
        progress: &ProgressReporter,
    ) -> Result<BundleResponse> {
        progress.check_cancelled()?;

        let response = if parent.is_empty() {
            if !removed_files.is_empty() {
                debug!(%project, removed = removed_files.len(), "No parent bundle, ignoring removals");
            }
            let response = self
                .api
                .create_bundle(project, &BundleFiles::Hashes(files))
                .await?;
            info!(%project, bundle_id = %response.bundle_id, missing = response.missing_files.len(), "Bundle created");
            response
        } else {
            if files.is_empty() && !removed_files.is_empty() {
                warn!(%project, parent = %parent, removed = removed_files.len(), "Extending bundle with removals only");
            }
            let request = ExtendBundleRequest {
                files,
                removed_files,
            };
            let response = self.api.extend_bundle(project, parent, &request).await?;
            info!(%project, parent = %parent, bundle_id = %response.bundle_id, missing = response.missing_files.len(), "Bundle extended");
            response
        };

        progress.check_cancelled()?;
        Ok(response)
    }

    async fn upload_until_complete(
        &self,
        project: &ProjectId,
        bundle_id: &str,
        mut missing: Vec<String>,
        prepared: &HashMap<String, FileHandle>,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let attempts = self.options.upload_attempts.get();
        let mut attempt = 0;

        while !missing.is_empty() {
            if attempt >= attempts {
                warn!(%project, bundle_id, missing = missing.len(), attempts, "Files still missing after all upload attempts");
                break;
            }
            attempt += 1;
            if attempt > 1 {
                warn!(%project, bundle_id, missing = missing.len(), attempt, "Files still missing, uploading again");
            }

            self.upload_missing(project, bundle_id, &missing, prepared, progress)
                .await?;

            progress.check_cancelled()?;
            missing = match self.api.check_bundle(project, bundle_id).await {
                Ok(response) => response.missing_files,
                Err(e) if e.should_retry() => {
                    warn!(%project, bundle_id, attempt, error = %e, "Bundle check failed, uploading again");
                    missing
                }
                Err(e) => {
                    warn!(%project, bundle_id, kind = ?e.kind(), error = %e, "Bundle check failed, stopping uploads");
                    break;
                }
            };
            progress.check_cancelled()?;
        }

        Ok(())
    }

    async fn upload_missing(
        &self,
        project: &ProjectId,
        bundle_id: &str,
        missing: &[String],
        prepared: &HashMap<String, FileHandle>,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let mut entries = Vec::with_capacity(missing.len());
        for path in missing {
            let Some(file) = prepared.get(path) else {
                debug!(%project, path, "Service asked for a file outside this sync");
                continue;
            };
            match self.content.record(file) {
                Ok(record) => entries.push(UploadEntry {
                    file_hash: record.hash.to_string(),
                    file_content: record.content.to_string(),
                }),
                Err(e) => warn!(%file, error = %e, "Cannot read file for upload"),
            }
        }

        let total = entries.len();
        let mut uploaded = 0usize;
        for group in group_uploads(entries, self.options.max_payload_bytes.get()) {
            progress.check_cancelled()?;
            progress.set_text(&format!("Uploading files ({}/{})", uploaded, total));

            match self.api.upload_files(project, bundle_id, &group).await {
                Ok(()) => debug!(%project, bundle_id, files = group.len(), "Uploaded file group"),
                Err(e) => warn!(%project, bundle_id, files = group.len(), error = %e, "File upload failed"),
            }

            uploaded += group.len();
            progress.set_fraction(uploaded as f64 / total.max(1) as f64);
        }
        progress.check_cancelled()?;

        info!(%project, bundle_id, files = total, "Upload pass finished");
        Ok(())
    }

    /// Poll get-analysis until the status is final or the budget runs out
    async fn poll_analysis(
        &self,
        project: &ProjectId,
        bundle_id: &str,
        progress: &ProgressReporter,
    ) -> Result<SyncOutcome> {
        progress.set_phase(SyncPhase::Polling);
        let budget = self.options.poll.attempt_budget();
        let mut last = AnalysisResponse::default();
        let mut counter = 0u64;

        loop {
            progress.check_cancelled()?;
            let response = match self.api.get_analysis(project, bundle_id).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(%project, bundle_id, error = %e, "Analysis request failed");
                    progress.set_phase(SyncPhase::Failed);
                    return Ok(SyncOutcome::new(bundle_id, SyncPhase::Failed, last));
                }
            };
            progress.check_cancelled()?;
            counter += 1;

            let fraction = if response.progress > 0.0 && response.progress <= 1.0 {
                response.progress
            } else {
                counter as f64 / budget as f64
            };
            progress.set_fraction(fraction);
            debug!(%project, bundle_id, status = %response.status, fraction, "Analysis status");

            if !response.analysis_url.is_empty() {
                self.projects.set_analysis_url(project, &response.analysis_url);
            }

            match response.status {
                AnalysisStatus::Done => {
                    info!(%project, bundle_id, polls = counter, "Analysis done");
                    progress.set_phase(SyncPhase::Done);
                    return Ok(SyncOutcome::new(bundle_id, SyncPhase::Done, response));
                }
                AnalysisStatus::Failed => {
                    warn!(%project, bundle_id, "Analysis failed, requesting a full rescan");
                    self.rescan.request_full_rescan(project);
                    progress.set_phase(SyncPhase::Failed);
                    return Ok(SyncOutcome::new(bundle_id, SyncPhase::Failed, response));
                }
                _ => last = response,
            }

            if counter >= budget {
                warn!(%project, bundle_id, timeout = ?self.options.poll.timeout(), "Analysis timed out");
                progress.set_phase(SyncPhase::TimedOut);
                return Ok(SyncOutcome::new(bundle_id, SyncPhase::TimedOut, last));
            }

            progress.sleep(self.options.poll.interval()).await?;
        }
    }
}

impl std::fmt::Debug for BundleSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleSyncClient")
            .field("api", &self.api)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn upload(hash: &str, content_len: usize) -> UploadEntry {
        UploadEntry {
            file_hash: hash.to_string(),
            file_content: "x".repeat(content_len),
        }
    }

    #[test]
    fn test_sync_options_from_config() {
        let options = SyncOptions::default();
        assert_eq!(options.max_payload_bytes.get(), 4_000_000);
        assert_eq!(options.upload_attempts.get(), 5);
        assert_eq!(options.wait_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_entry_size_estimate() {
        assert_eq!(estimate_entry_size("/a.py", &"f".repeat(64)), 2 * (5 + 64));
    }

    #[test]
    fn test_accumulator_flushes_before_overflow() {
        let mut batch = BatchAccumulator::new(100);
        assert!(batch.push("/a".into(), "h".repeat(40)).is_none());
        assert_eq!(batch.estimate(), 84);

        let flushed = batch.push("/b".into(), "h".repeat(40)).unwrap();
        assert_eq!(flushed.keys().collect::<Vec<_>>(), ["/a"]);
        assert_eq!(batch.estimate(), 84);
        assert_eq!(batch.take().len(), 1);
        assert_eq!(batch.estimate(), 0);
    }

    #[test]
    fn test_upload_groups_respect_limit() {
        let groups = group_uploads(
            vec![upload("a", 40), upload("b", 40), upload("c", 150), upload("d", 10)],
            100,
        );
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert!(group_uploads(Vec::new(), 100).is_empty());
    }

    #[test]
    fn test_outcome_done_requires_done_status() {
        let mut outcome = SyncOutcome::empty(SyncPhase::Done);
        assert!(!outcome.is_done());
        outcome.response.status = AnalysisStatus::Done;
        assert!(outcome.is_done());
    }

    proptest! {
        #[test]
        fn test_batches_stay_within_limit(
            paths in prop::collection::btree_set("/[a-z]{1,40}\\.py", 1..400),
            limit in 500usize..5_000,
        ) {
            let hash = "0".repeat(64);
            let mut batch = BatchAccumulator::new(limit);
            let mut batches = Vec::new();
            let total: usize = paths.iter().map(|p| estimate_entry_size(p, &hash)).sum();

            for path in &paths {
                if let Some(full) = batch.push(path.clone(), hash.clone()) {
                    batches.push(full);
                }
            }
            batches.push(batch.take());

            for files in &batches {
                let estimate: usize = files.keys().map(|p| estimate_entry_size(p, &hash)).sum();
                prop_assert!(estimate <= limit);
            }
            prop_assert_eq!(batches.iter().map(BTreeMap::len).sum::<usize>(), paths.len());
            if total > limit {
                prop_assert!(batches.len() > 1);
            }
        }
    }
}
