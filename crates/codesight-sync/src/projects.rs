//! Per-project bundle state

use codesight_types::ProjectId;
use dashmap::DashMap;
use tracing::{debug, info};

/// Length of the all-zero segment that marks the empty bundle
const EMPTY_BUNDLE_SEGMENT_LEN: usize = 64;

/// Whether a bundle id is the service's "all files removed" sentinel
pub fn is_empty_bundle_sentinel(bundle_id: &str) -> bool {
    let segment = bundle_id.rsplit('/').next().unwrap_or_default();
    segment.len() == EMPTY_BUNDLE_SEGMENT_LEN && segment.bytes().all(|b| b == b'0')
}

/// What the engine remembers about one project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSyncState {
    /// Most recently confirmed bundle id, empty when there is none
    pub bundle_id: String,
    /// Link to the latest analysis
    pub analysis_url: String,
}

/// Project → bundle state.
///
/// A project is known once a result has been committed for it; until then the
/// cache reports its analysis results as unavailable.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: DashMap<ProjectId, ProjectSyncState>,
}

impl ProjectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bundle id, empty when none was confirmed yet
    pub fn bundle_id(&self, project: &ProjectId) -> String {
        self.projects
            .get(project)
            .map(|state| state.bundle_id.clone())
            .unwrap_or_default()
    }

    /// Record a confirmed bundle id, normalizing the sentinel to empty
    pub fn set_bundle_id(&self, project: &ProjectId, bundle_id: &str) {
        let bundle_id = if is_empty_bundle_sentinel(bundle_id) {
            info!(%project, "Service returned the empty bundle, clearing bundle id");
            ""
        } else {
            bundle_id
        };
        debug!(%project, bundle_id, "Bundle id updated");
        self.projects.entry(project.clone()).or_default().bundle_id = bundle_id.to_string();
    }

    /// Link to the latest analysis, empty when unknown
    pub fn analysis_url(&self, project: &ProjectId) -> String {
        self.projects
            .get(project)
            .map(|state| state.analysis_url.clone())
            .unwrap_or_default()
    }

    /// Record the link to the latest analysis
    pub fn set_analysis_url(&self, project: &ProjectId, url: &str) {
        self.projects.entry(project.clone()).or_default().analysis_url = url.to_string();
    }

    /// Mark a project as cached without changing its state
    pub fn touch(&self, project: &ProjectId) {
        self.projects.entry(project.clone()).or_default();
    }

    /// Whether anything was ever committed for this project
    pub fn contains(&self, project: &ProjectId) -> bool {
        self.projects.contains_key(project)
    }

    /// Forget a project
    pub fn remove(&self, project: &ProjectId) -> Option<ProjectSyncState> {
        self.projects.remove(project).map(|(_, state)| state)
    }
}
