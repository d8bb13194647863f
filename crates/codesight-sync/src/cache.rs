//! Analysis cache: file → findings, guarded by one process-wide lock
//!
//! Every mutation (committing results, creating or extending bundles,
//! uploading, evicting) runs under a single async mutex owned by the cache.
//! Lookups read the concurrent maps directly and never wait for it; they may
//! see results that are about to be replaced, never half-written ones.

use crate::{
    bundle::{BundleSyncClient, SyncOptions, SyncOutcome},
    content::ContentHashStore,
    ignore::IgnorePatternEngine,
    progress::{ProgressReporter, SyncPhase},
    projects::ProjectRegistry,
    tasks::BackgroundTasks,
    translate::ResponseTranslator,
};
use codesight_config::Config;
use codesight_network::{ApiClient, ClientConfig, RemoteAnalysisService};
use codesight_types::{
    AuthSignal, ConsentProvider, ContentProvider, FileHandle, ProgressSink, ProjectId,
    RescanSignal, Result, SilentProgress, Suggestion, SuggestionMap, UiRefresh,
};
use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the cache needs from the host environment
#[derive(Clone)]
pub struct HostServices {
    /// Per-project upload consent
    pub consent: Arc<dyn ConsentProvider>,
    /// File text and line geometry
    pub content: Arc<dyn ContentProvider>,
    /// Re-login trigger
    pub auth: Arc<dyn AuthSignal>,
    /// Full rescan trigger
    pub rescan: Arc<dyn RescanSignal>,
    /// Redraw trigger
    pub ui: Arc<dyn UiRefresh>,
    /// Progress display for foreground updates
    pub progress: Arc<dyn ProgressSink>,
}

/// Clears the update flag and refreshes the UI before the lock is released
struct UpdateGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    in_progress: &'a AtomicBool,
    ui: &'a dyn UiRefresh,
    project: &'a ProjectId,
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.in_progress.store(false, Ordering::SeqCst);
        self.ui.refresh(self.project);
    }
}

/// Cache of analysis findings and the orchestration that keeps it current
pub struct AnalysisCache {
    results: DashMap<FileHandle, Vec<Suggestion>>,
    projects: Arc<ProjectRegistry>,
    content: Arc<ContentHashStore>,
    ignore: IgnorePatternEngine,
    api: Arc<ApiClient>,
    bundles: BundleSyncClient,
    translator: ResponseTranslator,
    tasks: BackgroundTasks,
    lock: Mutex<()>,
    update_in_progress: AtomicBool,
    consent: Arc<dyn ConsentProvider>,
    ui: Arc<dyn UiRefresh>,
    progress: Arc<dyn ProgressSink>,
    options: SyncOptions,
}

impl AnalysisCache {
    /// Create a cache from the loaded configuration
    pub fn new(
        service: Arc<dyn RemoteAnalysisService>,
        host: HostServices,
        config: &Config,
    ) -> Arc<Self> {
        Self::with_options(
            service,
            host,
            ClientConfig::from(config),
            SyncOptions::from(config),
        )
    }

    /// Create a cache with explicit client and protocol settings
    pub fn with_options(
        service: Arc<dyn RemoteAnalysisService>,
        host: HostServices,
        client: ClientConfig,
        options: SyncOptions,
    ) -> Arc<Self> {
        let api = Arc::new(ApiClient::new(service, host.auth, client));
        let content = Arc::new(ContentHashStore::new(Arc::clone(&host.content)));
        let projects = Arc::new(ProjectRegistry::new());
        let bundles = BundleSyncClient::new(
            Arc::clone(&api),
            Arc::clone(&content),
            Arc::clone(&projects),
            host.rescan,
            options,
        );

        Arc::new(Self {
            results: DashMap::new(),
            projects,
            content,
            ignore: IgnorePatternEngine::new(),
            api,
            bundles,
            translator: ResponseTranslator::new(host.content),
            tasks: BackgroundTasks::new(),
            lock: Mutex::new(()),
            update_in_progress: AtomicBool::new(false),
            consent: host.consent,
            ui: host.ui,
            progress: host.progress,
            options,
        })
    }

    /// Cached findings for the given files.
    ///
    /// Files without an entry are left out of the result.
    pub fn get_analysis(&self, files: &[FileHandle]) -> SuggestionMap {
        let mut found = SuggestionMap::with_capacity(files.len());
        for file in files {
            if let Some(suggestions) = self.results.get(file) {
                found.insert(file.clone(), suggestions.clone());
            }
        }

        let not_found = files.len() - found.len();
        if not_found > 0 {
            debug!(found = found.len(), not_found, "Some files are not analysed yet");
        }
        found
    }

    /// Bring the cache up to date for `files_to_sync` and drop `files_to_remove`
    /// from the project's bundle.
    ///
    /// Files already in the cache are not sent again. A single new file with no
    /// removals takes the fast path: it is analysed on its own with inline
    /// content, and a background task then folds it into the project's bundle.
    /// Service failures leave the affected files out of the cache.
    pub async fn update_cached_results_for_files(
        self: &Arc<Self>,
        project: &ProjectId,
        files_to_sync: &[FileHandle],
        files_to_remove: &[FileHandle],
    ) {
        if files_to_sync.is_empty() && files_to_remove.is_empty() {
            warn!(%project, "Update requested without files to sync or remove");
            return;
        }
        if !self.consent.consent_given(project) {
            info!(%project, "No consent to upload files, skipping update");
            return;
        }

        let _guard = self.begin_update(project).await;

        match self.update_locked(project, files_to_sync, files_to_remove).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => info!(%project, "Update cancelled"),
            Err(e) => warn!(%project, kind = ?e.kind(), severity = ?e.severity(), error = %e, "Update failed"),
        }
    }

    async fn begin_update<'a>(&'a self, project: &'a ProjectId) -> UpdateGuard<'a> {
        let lock = self.lock.lock().await;
        self.update_in_progress.store(true, Ordering::SeqCst);
        UpdateGuard {
            _lock: lock,
            in_progress: &self.update_in_progress,
            ui: self.ui.as_ref(),
            project,
        }
    }

    async fn update_locked(
        self: &Arc<Self>,
        project: &ProjectId,
        files_to_sync: &[FileHandle],
        files_to_remove: &[FileHandle],
    ) -> Result<()> {
        self.reload_ignore_files(files_to_sync, files_to_remove);

        let mut seen = HashSet::new();
        let files_to_proceed: Vec<FileHandle> = files_to_sync
            .iter()
            .filter(|file| seen.insert(*file))
            .filter(|file| !self.results.contains_key(*file))
            .filter(|file| {
                let ignored = self.ignore.is_ignored(file);
                if ignored {
                    debug!(%file, "Skipping ignored file");
                }
                !ignored
            })
            .cloned()
            .collect();

        if files_to_proceed.is_empty() && files_to_remove.is_empty() {
            debug!(%project, files = files_to_sync.len(), "All files already cached");
            return Ok(());
        }

        let progress = ProgressReporter::new(Arc::clone(&self.progress), CancellationToken::new());

        if let ([file], []) = (files_to_proceed.as_slice(), files_to_remove) {
            let outcome = self.bundles.analyze_single(project, file, &progress).await?;
            self.commit(project, &files_to_proceed, &[], &outcome);
            self.schedule_reconcile(project, file);
            return Ok(());
        }

        let outcome = self
            .bundles
            .sync(project, &files_to_proceed, files_to_remove, &progress)
            .await?;
        self.commit(project, &files_to_proceed, files_to_remove, &outcome);
        Ok(())
    }

    fn reload_ignore_files(&self, files_to_sync: &[FileHandle], files_to_remove: &[FileHandle]) {
        for file in files_to_remove.iter().filter(|f| f.is_dcignore()) {
            self.ignore.remove_ignore_file(file);
        }
        for file in files_to_sync.iter().filter(|f| f.is_dcignore()) {
            self.content.invalidate(file);
            match self.content.get_content(file) {
                Ok(text) => {
                    self.ignore.load_ignore_file(file, &text);
                }
                Err(e) => warn!(%file, error = %e, "Cannot read ignore file"),
            }
        }
    }

    fn commit(
        &self,
        project: &ProjectId,
        files: &[FileHandle],
        removed: &[FileHandle],
        outcome: &SyncOutcome,
    ) {
        for file in removed {
            self.results.remove(file);
        }

        let translated = self.translator.translate(files, &outcome.response);
        let with_findings = translated.values().filter(|s| !s.is_empty()).count();
        let committed = translated.len();
        for (file, suggestions) in translated {
            self.results.insert(file, suggestions);
        }

        if outcome.phase == SyncPhase::Done {
            self.projects.touch(project);
        }
        info!(
            %project,
            phase = ?outcome.phase,
            requested = files.len(),
            committed,
            with_findings,
            "Committed analysis results"
        );
    }

    /// Fold a fast-path file into the project's bundle in the background and
    /// analyse the resulting bundle
    fn schedule_reconcile(self: &Arc<Self>, project: &ProjectId, file: &FileHandle) {
        let cache = Arc::clone(self);
        let project = project.clone();
        let target = file.clone();

        self.tasks.spawn(file.clone(), move |token| async move {
            let progress = ProgressReporter::new(Arc::new(SilentProgress), token);
            let _lock = tokio::select! {
                guard = cache.lock.lock() => guard,
                () = progress.token().cancelled() => {
                    debug!(file = %target, "Background sync cancelled before start");
                    return;
                }
            };

            let files = [target];
            match cache.bundles.sync(&project, &files, &[], &progress).await {
                Ok(outcome) => {
                    debug!(%project, bundle_id = %outcome.bundle_id, phase = %outcome.phase, "Background sync finished");
                    // Files evicted while the sync ran stay evicted.
                    if outcome.is_done() && cache.results.contains_key(&files[0]) {
                        cache.commit(&project, &files, &[], &outcome);
                    }
                }
                Err(e) if e.is_cancelled() => debug!(%project, "Background sync cancelled"),
                Err(e) => warn!(%project, kind = ?e.kind(), error = %e, "Background sync failed"),
            }
        });
    }

    /// Evict files from the cache and forget their content
    pub async fn remove_files_from_cache(&self, files: &[FileHandle]) {
        let _lock = self.lock.lock().await;

        let mut removed = 0usize;
        let mut projects = BTreeSet::new();
        for file in files {
            if self.results.remove(file).is_some() {
                removed += 1;
            }
            self.content.invalidate(file);
            if file.is_dcignore() {
                self.ignore.remove_ignore_file(file);
            }
            projects.insert(file.project().clone());
        }

        info!(removed, not_present = files.len() - removed, "Removed files from cache");
        for project in &projects {
            self.ui.refresh(project);
        }
    }

    /// Evict files whose content moved since they were last hashed.
    ///
    /// Uses [`ContentHashStore::has_changed`], which records the new content as
    /// seen; a second call without edits evicts nothing.
    pub async fn remove_changed_files(&self, files: &[FileHandle]) -> Vec<FileHandle> {
        let _lock = self.lock.lock().await;

        let mut evicted = Vec::new();
        let mut projects = BTreeSet::new();
        for file in files {
            match self.content.has_changed(file) {
                Ok(true) => {
                    if self.results.remove(file).is_some() {
                        evicted.push(file.clone());
                        projects.insert(file.project().clone());
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(%file, error = %e, "Cannot check file for changes"),
            }
        }

        debug!(checked = files.len(), evicted = evicted.len(), "Evicted changed files");
        for project in &projects {
            self.ui.refresh(project);
        }
        evicted
    }

    /// Drop everything known about a project
    pub async fn remove_project_from_caches(&self, project: &ProjectId) {
        self.tasks.cancel_project(project);
        let _lock = self.lock.lock().await;

        self.ignore.remove_project(project);
        self.content.invalidate_project(project);
        self.projects.remove(project);

        let before = self.results.len();
        self.results.retain(|file, _| file.project() != project);
        info!(%project, removed = before - self.results.len(), "Removed project from caches");

        self.ui.refresh(project);
    }

    /// True until a result was committed for the project, and while any update runs
    pub fn is_analysis_results_not_available(&self, project: &ProjectId) -> bool {
        !self.projects.contains(project) || self.is_update_in_progress()
    }

    /// Wait until no update is running
    pub async fn wait_for_update_finish(&self) {
        while self.is_update_in_progress() {
            tokio::time::sleep(self.options.wait_interval).await;
        }
    }

    /// Whether an update currently holds the lock
    pub fn is_update_in_progress(&self) -> bool {
        self.update_in_progress.load(Ordering::SeqCst)
    }

    /// Whether a file has an entry in the cache
    pub fn is_file_in_cache(&self, file: &FileHandle) -> bool {
        self.results.contains_key(file)
    }

    /// Files of a project with at least one finding
    pub fn get_all_files_with_suggestions(&self, project: &ProjectId) -> Vec<FileHandle> {
        let mut files: Vec<FileHandle> = self
            .results
            .iter()
            .filter(|entry| entry.key().project() == project && !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        files.sort();
        files
    }

    /// Projects with at least one cached file
    pub fn get_all_cached_projects(&self) -> Vec<ProjectId> {
        let projects: BTreeSet<ProjectId> = self
            .results
            .iter()
            .map(|entry| entry.key().project().clone())
            .collect();
        projects.into_iter().collect()
    }

    /// Current bundle id of a project, empty when none
    pub fn bundle_id(&self, project: &ProjectId) -> String {
        self.projects.bundle_id(project)
    }

    /// Link to the latest analysis of a project, empty when unknown
    pub fn analysis_url(&self, project: &ProjectId) -> String {
        self.projects.analysis_url(project)
    }

    /// Whether the service rejected the token and no call succeeded since
    pub fn login_requested(&self) -> bool {
        self.api.login_requested()
    }

    /// Whether a file is excluded by a tracked ignore file
    pub fn is_ignored(&self, file: &FileHandle) -> bool {
        self.ignore.is_ignored(file)
    }

    /// Ignore rules in use
    pub fn ignore_engine(&self) -> &IgnorePatternEngine {
        &self.ignore
    }

    /// Content and hash store in use
    pub fn content_store(&self) -> &ContentHashStore {
        &self.content
    }

    /// Cancel every pending background sync
    pub fn cancel_background_syncs(&self) {
        self.tasks.cancel_all();
    }

    /// Number of background syncs still registered
    pub fn background_syncs(&self) -> usize {
        self.tasks.len()
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("files", &self.results.len())
            .field("update_in_progress", &self.is_update_in_progress())
            .field("background_syncs", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
