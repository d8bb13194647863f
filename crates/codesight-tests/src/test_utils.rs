//! Test doubles shared by the codesight integration tests
//!
//! - [`MockAnalysisService`]: scripted in-memory service with a call log
//! - [`RecordingHost`]: consent, auth, rescan, UI and progress collaborators
//!   that remember every call
//! - [`MemoryFiles`]: in-memory file contents with real line geometry

use crate::concurrency_utils::{InFlightGuard, InFlightMeter};
use async_trait::async_trait;
use codesight_config::Config;
use codesight_network::{
    AnalysisOptions, AnalysisResponse, AnalysisResults, AnalysisStatus, ApiResponse, ApiStatus,
    BundleFiles, BundleResponse, ClientConfig, ExtendBundleRequest, MarkerRange,
    RemoteAnalysisService, SuggestionDefinition, UploadEntry,
};
use codesight_sync::{AnalysisCache, HostServices, SyncOptions};
use codesight_types::{
    AuthSignal, ConsentProvider, ContentProvider, Error, FileHandle, PayloadLimit, PollSchedule,
    ProgressSink, ProjectId, RescanSignal, Result, UiRefresh,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded service call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// create-bundle
    CreateBundle {
        /// Paths in the request
        paths: Vec<String>,
        /// Whether content travelled inline
        inline: bool,
    },
    /// extend-bundle
    ExtendBundle {
        /// Parent bundle id
        parent: String,
        /// Added or changed paths
        paths: Vec<String>,
        /// Removed paths
        removed: Vec<String>,
    },
    /// check-bundle
    CheckBundle {
        /// Checked bundle
        bundle_id: String,
    },
    /// upload-files
    UploadFiles {
        /// Target bundle
        bundle_id: String,
        /// Hashes of the uploaded contents
        hashes: Vec<String>,
    },
    /// get-analysis
    GetAnalysis {
        /// Analysed bundle
        bundle_id: String,
    },
}

impl Call {
    /// Paths a create or extend call carried
    pub fn bundle_paths(&self) -> Option<&[String]> {
        match self {
            Self::CreateBundle { paths, .. } | Self::ExtendBundle { paths, .. } => Some(paths.as_slice()),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Script {
    create: VecDeque<ApiResponse<BundleResponse>>,
    extend: VecDeque<ApiResponse<BundleResponse>>,
    check: VecDeque<ApiResponse<BundleResponse>>,
    upload: VecDeque<ApiResponse<()>>,
    analysis: VecDeque<ApiResponse<AnalysisResponse>>,
    sticky_check: Option<ApiResponse<BundleResponse>>,
    sticky_analysis: Option<ApiResponse<AnalysisResponse>>,
}

/// Scripted remote analysis service.
///
/// Each RPC answers from its queue first. With an empty queue, create and
/// extend succeed and report every hashed path as missing, check reports
/// nothing missing, upload succeeds and get-analysis is `DONE` without findings.
#[derive(Default)]
pub struct MockAnalysisService {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    bundle_counter: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    meter: InFlightMeter,
}

impl MockAnalysisService {
    /// Create a service with default answers
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold every call for `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Queue a create-bundle answer
    pub fn push_create(&self, response: ApiResponse<BundleResponse>) {
        self.script.lock().unwrap().create.push_back(response);
    }

    /// Queue an extend-bundle answer
    pub fn push_extend(&self, response: ApiResponse<BundleResponse>) {
        self.script.lock().unwrap().extend.push_back(response);
    }

    /// Queue a check-bundle answer
    pub fn push_check(&self, response: ApiResponse<BundleResponse>) {
        self.script.lock().unwrap().check.push_back(response);
    }

    /// Queue an upload-files answer
    pub fn push_upload(&self, response: ApiResponse<()>) {
        self.script.lock().unwrap().upload.push_back(response);
    }

    /// Queue a get-analysis answer
    pub fn push_analysis(&self, response: ApiResponse<AnalysisResponse>) {
        self.script.lock().unwrap().analysis.push_back(response);
    }

    /// Answer every unscripted check-bundle with `response`
    pub fn always_check(&self, response: ApiResponse<BundleResponse>) {
        self.script.lock().unwrap().sticky_check = Some(response);
    }

    /// Answer every unscripted get-analysis with `response`
    pub fn always_analysis(&self, response: ApiResponse<AnalysisResponse>) {
        self.script.lock().unwrap().sticky_analysis = Some(response);
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    /// create-bundle and extend-bundle calls, in order
    pub fn bundle_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.bundle_paths().is_some())
            .collect()
    }

    /// Peak number of simultaneous calls
    pub fn max_in_flight(&self) -> usize {
        self.meter.peak()
    }

    fn next_bundle_id(&self) -> String {
        format!("bundle-{}", self.bundle_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn enter(&self, call: Call) -> InFlightGuard {
        let guard = self.meter.enter();
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        guard
    }
}

#[async_trait]
impl RemoteAnalysisService for MockAnalysisService {
    async fn create_bundle(
        &self,
        _token: &str,
        files: &BundleFiles,
    ) -> Result<ApiResponse<BundleResponse>> {
        let (paths, inline): (Vec<String>, bool) = match files {
            BundleFiles::Hashes(map) => (map.keys().cloned().collect(), false),
            BundleFiles::Contents(map) => (map.keys().cloned().collect(), true),
        };
        let _guard = self
            .enter(Call::CreateBundle {
                paths: paths.clone(),
                inline,
            })
            .await;

        if let Some(response) = self.script.lock().unwrap().create.pop_front() {
            return Ok(response);
        }
        Ok(ApiResponse::ok(BundleResponse {
            bundle_id: self.next_bundle_id(),
            missing_files: if inline { Vec::new() } else { paths },
        }))
    }

    async fn extend_bundle(
        &self,
        _token: &str,
        parent_id: &str,
        request: &ExtendBundleRequest,
    ) -> Result<ApiResponse<BundleResponse>> {
        let paths: Vec<String> = request.files.keys().cloned().collect();
        let _guard = self
            .enter(Call::ExtendBundle {
                parent: parent_id.to_string(),
                paths: paths.clone(),
                removed: request.removed_files.clone(),
            })
            .await;

        if let Some(response) = self.script.lock().unwrap().extend.pop_front() {
            return Ok(response);
        }
        Ok(ApiResponse::ok(BundleResponse {
            bundle_id: self.next_bundle_id(),
            missing_files: paths,
        }))
    }

    async fn check_bundle(
        &self,
        _token: &str,
        bundle_id: &str,
    ) -> Result<ApiResponse<BundleResponse>> {
        let _guard = self
            .enter(Call::CheckBundle {
                bundle_id: bundle_id.to_string(),
            })
            .await;

        let mut script = self.script.lock().unwrap();
        if let Some(response) = script.check.pop_front() {
            return Ok(response);
        }
        Ok(script.sticky_check.clone().unwrap_or_else(|| {
            ApiResponse::ok(BundleResponse {
                bundle_id: bundle_id.to_string(),
                missing_files: Vec::new(),
            })
        }))
    }

    async fn upload_files(
        &self,
        _token: &str,
        bundle_id: &str,
        files: &[UploadEntry],
    ) -> Result<ApiResponse<()>> {
        let _guard = self
            .enter(Call::UploadFiles {
                bundle_id: bundle_id.to_string(),
                hashes: files.iter().map(|f| f.file_hash.clone()).collect(),
            })
            .await;

        Ok(self
            .script
            .lock()
            .unwrap()
            .upload
            .pop_front()
            .unwrap_or_else(|| ApiResponse::ok(())))
    }

    async fn get_analysis(
        &self,
        _token: &str,
        bundle_id: &str,
        _options: &AnalysisOptions,
    ) -> Result<ApiResponse<AnalysisResponse>> {
        let _guard = self
            .enter(Call::GetAnalysis {
                bundle_id: bundle_id.to_string(),
            })
            .await;

        let mut script = self.script.lock().unwrap();
        if let Some(response) = script.analysis.pop_front() {
            return Ok(response);
        }
        Ok(script
            .sticky_analysis
            .clone()
            .unwrap_or_else(|| ApiResponse::ok(AnalysisBuilder::done().build())))
    }
}

/// Builds get-analysis answers
#[derive(Debug, Clone)]
pub struct AnalysisBuilder {
    status: AnalysisStatus,
    progress: f64,
    files: BTreeMap<String, BTreeMap<String, Vec<MarkerRange>>>,
    suggestions: Option<BTreeMap<String, SuggestionDefinition>>,
}

impl AnalysisBuilder {
    /// Finished analysis without findings
    pub fn done() -> Self {
        Self::with_status(AnalysisStatus::Done)
    }

    /// Analysis in the given state
    pub fn with_status(status: AnalysisStatus) -> Self {
        Self {
            status,
            progress: 0.0,
            files: BTreeMap::new(),
            suggestions: Some(BTreeMap::new()),
        }
    }

    /// Set the reported progress
    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = progress;
        self
    }

    /// Add a suggestion definition
    pub fn suggestion(mut self, index: &str, id: &str, severity: u8) -> Self {
        self.suggestions.get_or_insert_with(BTreeMap::new).insert(
            index.to_string(),
            SuggestionDefinition {
                id: id.to_string(),
                message: format!("{} found", id),
                severity,
            },
        );
        self
    }

    /// Add a finding of suggestion `index` to `path`
    pub fn finding(mut self, path: &str, index: &str, rows: [usize; 2], cols: [usize; 2]) -> Self {
        self.files
            .entry(path.to_string())
            .or_default()
            .entry(index.to_string())
            .or_default()
            .push(MarkerRange::new(rows, cols));
        self
    }

    /// Drop the suggestions table
    pub fn without_suggestions(mut self) -> Self {
        self.suggestions = None;
        self
    }

    /// Build the response body
    pub fn build(self) -> AnalysisResponse {
        AnalysisResponse {
            status: self.status,
            progress: self.progress,
            analysis_url: "https://example.test/analysis".to_string(),
            analysis_results: Some(AnalysisResults {
                files: self.files,
                suggestions: self.suggestions,
            }),
        }
    }

    /// Build a successful service answer
    pub fn ok(self) -> ApiResponse<AnalysisResponse> {
        ApiResponse::ok(self.build())
    }
}

/// Successful bundle answer
pub fn bundle(bundle_id: &str, missing: &[&str]) -> ApiResponse<BundleResponse> {
    ApiResponse::ok(BundleResponse {
        bundle_id: bundle_id.to_string(),
        missing_files: missing.iter().map(|p| p.to_string()).collect(),
    })
}

/// Failed answer with the given status code
pub fn failure<T: Default>(code: u16) -> ApiResponse<T> {
    let description = if code == ApiStatus::UNAUTHORIZED {
        "Unauthorized"
    } else {
        "Server Error"
    };
    ApiResponse::failure(code, description)
}

/// In-memory file contents
#[derive(Debug, Default)]
pub struct MemoryFiles {
    texts: Mutex<HashMap<FileHandle, String>>,
}

impl MemoryFiles {
    /// Create an empty file set
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create or replace a file, returning its handle
    pub fn write(&self, project: &ProjectId, path: &str, text: &str) -> FileHandle {
        let file = FileHandle::new(project.clone(), path);
        self.texts
            .lock()
            .unwrap()
            .insert(file.clone(), text.to_string());
        file
    }
}

impl ContentProvider for MemoryFiles {
    fn read_content(&self, file: &FileHandle) -> Result<String> {
        self.texts
            .lock()
            .unwrap()
            .get(file)
            .cloned()
            .ok_or_else(|| Error::content(file.path(), "no such file"))
    }

    fn line_start_offset(&self, file: &FileHandle, line_index: usize) -> Option<usize> {
        let texts = self.texts.lock().unwrap();
        let text = texts.get(file)?;
        if line_index == 0 {
            return Some(0);
        }
        text.match_indices('\n')
            .nth(line_index - 1)
            .map(|(index, _)| index + 1)
    }
}

/// Host collaborators that record what they were asked to do
#[derive(Debug)]
pub struct RecordingHost {
    consent: AtomicBool,
    denied: Mutex<HashSet<ProjectId>>,
    unauthorized: Mutex<Vec<ProjectId>>,
    rescans: Mutex<Vec<ProjectId>>,
    refreshes: Mutex<Vec<ProjectId>>,
    texts: Mutex<Vec<String>>,
    cancelled: AtomicBool,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            consent: AtomicBool::new(true),
            denied: Mutex::new(HashSet::new()),
            unauthorized: Mutex::new(Vec::new()),
            rescans: Mutex::new(Vec::new()),
            refreshes: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }
}

impl RecordingHost {
    /// Create a host that consents to everything
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Withdraw consent for one project
    pub fn deny(&self, project: &ProjectId) {
        self.denied.lock().unwrap().insert(project.clone());
    }

    /// Make every progress check report cancellation
    pub fn cancel(&self, cancelled: bool) {
        self.cancelled.store(cancelled, Ordering::SeqCst);
    }

    /// Re-login requests so far
    pub fn unauthorized_calls(&self) -> usize {
        self.unauthorized.lock().unwrap().len()
    }

    /// Full rescan requests so far
    pub fn rescans(&self) -> Vec<ProjectId> {
        self.rescans.lock().unwrap().clone()
    }

    /// UI refreshes so far
    pub fn refreshes(&self) -> Vec<ProjectId> {
        self.refreshes.lock().unwrap().clone()
    }

    /// Progress texts shown so far
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl ConsentProvider for RecordingHost {
    fn consent_given(&self, project: &ProjectId) -> bool {
        self.consent.load(Ordering::SeqCst) && !self.denied.lock().unwrap().contains(project)
    }
}

impl AuthSignal for RecordingHost {
    fn on_unauthorized(&self, project: &ProjectId) {
        self.unauthorized.lock().unwrap().push(project.clone());
    }
}

impl RescanSignal for RecordingHost {
    fn request_full_rescan(&self, project: &ProjectId) {
        self.rescans.lock().unwrap().push(project.clone());
    }
}

impl UiRefresh for RecordingHost {
    fn refresh(&self, project: &ProjectId) {
        self.refreshes.lock().unwrap().push(project.clone());
    }
}

impl ProgressSink for RecordingHost {
    fn set_text(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }

    fn set_fraction(&self, _fraction: f64) {}

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Protocol limits with a fast poll schedule
pub fn fast_options() -> SyncOptions {
    SyncOptions {
        poll: PollSchedule {
            timeout_ms: 50,
            interval_ms: 1,
        },
        wait_interval: Duration::from_millis(2),
        ..SyncOptions::default()
    }
}

/// Protocol limits with a small payload ceiling
pub fn small_payload_options(limit: usize) -> SyncOptions {
    SyncOptions {
        max_payload_bytes: PayloadLimit::unchecked(limit),
        ..fast_options()
    }
}

/// A cache wired to a mock service, recording host and in-memory files
pub struct TestBed {
    /// Cache under test
    pub cache: Arc<AnalysisCache>,
    /// Scripted service behind the cache
    pub service: Arc<MockAnalysisService>,
    /// Recording collaborators
    pub host: Arc<RecordingHost>,
    /// File contents
    pub files: Arc<MemoryFiles>,
}

impl TestBed {
    /// Test bed with [`fast_options`]
    pub fn new() -> Self {
        Self::with_options(fast_options())
    }

    /// Test bed with explicit protocol limits
    pub fn with_options(options: SyncOptions) -> Self {
        let client = ClientConfig {
            token: "test-token".to_string(),
            ..ClientConfig::default()
        };
        Self::build(|service, services| {
            AnalysisCache::with_options(service, services, client, options)
        })
    }

    /// Test bed configured from a loaded [`Config`]
    pub fn from_config(config: &Config) -> Self {
        Self::build(|service, services| AnalysisCache::new(service, services, config))
    }

    fn build(
        make_cache: impl FnOnce(Arc<MockAnalysisService>, HostServices) -> Arc<AnalysisCache>,
    ) -> Self {
        init_test_logging();
        let service = MockAnalysisService::new();
        let host = RecordingHost::new();
        let files = MemoryFiles::new();

        let services = HostServices {
            consent: host.clone(),
            content: files.clone(),
            auth: host.clone(),
            rescan: host.clone(),
            ui: host.clone(),
            progress: host.clone(),
        };
        let cache = make_cache(service.clone(), services);

        Self {
            cache,
            service,
            host,
            files,
        }
    }

    /// Write one small source file per path
    pub fn write_sources(&self, project: &ProjectId, paths: &[&str]) -> Vec<FileHandle> {
        paths
            .iter()
            .map(|path| self.files.write(project, path, &format!("# {}\nprint('hello')\n", path)))
            .collect()
    }

    /// Wait until every background sync has finished
    pub async fn settle_background(&self) {
        for _ in 0..500 {
            if self.cache.background_syncs() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("background syncs did not finish");
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a test log subscriber once; `RUST_LOG` controls the output
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_offsets_follow_newlines() {
        let files = MemoryFiles::new();
        let file = files.write(&ProjectId::new("p"), "/a.py", "ab\ncde\n\nf");
        assert_eq!(files.line_start_offset(&file, 0), Some(0));
        assert_eq!(files.line_start_offset(&file, 1), Some(3));
        assert_eq!(files.line_start_offset(&file, 2), Some(7));
        assert_eq!(files.line_start_offset(&file, 3), Some(8));
        assert_eq!(files.line_start_offset(&file, 4), None);
    }

    #[tokio::test]
    async fn test_mock_defaults_report_hashed_paths_missing() {
        let service = MockAnalysisService::new();
        let mut hashes = BTreeMap::new();
        hashes.insert("/a.py".to_string(), "h".to_string());

        let response = service
            .create_bundle("t", &BundleFiles::Hashes(hashes))
            .await
            .unwrap();
        assert_eq!(response.body.bundle_id, "bundle-1");
        assert_eq!(response.body.missing_files, vec!["/a.py".to_string()]);
        assert_eq!(service.call_count(), 1);
        assert_eq!(service.max_in_flight(), 1);
    }
}
