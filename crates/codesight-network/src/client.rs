//! Service client used by the sync engine

use crate::{
    protocol::{
        AnalysisOptions, AnalysisResponse, ApiResponse, ApiStatus, BundleFiles, BundleResponse,
        ExtendBundleRequest, UploadEntry,
    },
    service::RemoteAnalysisService,
};
use codesight_config::Config;
use codesight_types::{AuthSignal, Error, ProjectId, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Client configuration
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// API token sent with every request
    pub token: String,
    /// Options forwarded to get-analysis
    pub analysis: AnalysisOptions,
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            token: config.service.token.clone(),
            analysis: AnalysisOptions {
                severity: config.service.min_severity,
                linters: config.service.use_linter,
            },
        }
    }
}

/// Wraps a [`RemoteAnalysisService`] with the token and the success check.
///
/// Every call goes through [`ApiClient::is_successful`]: a 200 clears the
/// "login already requested" flag, the first 401 of a streak raises the host's
/// [`AuthSignal`], anything else is logged and reported as an error.
pub struct ApiClient {
    service: Arc<dyn RemoteAnalysisService>,
    auth: Arc<dyn AuthSignal>,
    config: ClientConfig,
    login_requested: AtomicBool,
}

impl ApiClient {
    /// Create a new client
    pub fn new(
        service: Arc<dyn RemoteAnalysisService>,
        auth: Arc<dyn AuthSignal>,
        config: ClientConfig,
    ) -> Self {
        Self {
            service,
            auth,
            config,
            login_requested: AtomicBool::new(false),
        }
    }

    /// Whether a re-login was requested and no call succeeded since
    pub fn login_requested(&self) -> bool {
        self.login_requested.load(Ordering::SeqCst)
    }

    /// Classify a response status, raising the auth signal on the first 401
    pub fn is_successful(&self, project: &ProjectId, status: &ApiStatus, operation: &str) -> bool {
        match status.code {
            ApiStatus::OK => {
                self.login_requested.store(false, Ordering::SeqCst);
                true
            }
            ApiStatus::UNAUTHORIZED => {
                warn!(%project, operation, "Service rejected the token");
                if !self.login_requested.swap(true, Ordering::SeqCst) {
                    self.auth.on_unauthorized(project);
                }
                false
            }
            _ => {
                warn!(%project, operation, status = %status, "Service call failed");
                false
            }
        }
    }

    fn settle<T>(
        &self,
        project: &ProjectId,
        operation: &str,
        response: Result<ApiResponse<T>>,
    ) -> Result<T> {
        let response = response.map_err(|e| {
            warn!(%project, operation, error = %e, "No response from service");
            e
        })?;

        if self.is_successful(project, &response.status, operation) {
            debug!(%project, operation, "Service call succeeded");
            Ok(response.body)
        } else if response.status.code == ApiStatus::UNAUTHORIZED {
            Err(Error::Unauthorized)
        } else {
            Err(Error::network(format!("{} returned {}", operation, response.status)))
        }
    }

    /// Create a new bundle
    pub async fn create_bundle(
        &self,
        project: &ProjectId,
        files: &BundleFiles,
    ) -> Result<BundleResponse> {
        let response = self.service.create_bundle(&self.config.token, files).await;
        self.settle(project, "create-bundle", response)
    }

    /// Extend `parent_id` into a new bundle
    pub async fn extend_bundle(
        &self,
        project: &ProjectId,
        parent_id: &str,
        request: &ExtendBundleRequest,
    ) -> Result<BundleResponse> {
        let response = self
            .service
            .extend_bundle(&self.config.token, parent_id, request)
            .await;
        self.settle(project, "extend-bundle", response)
    }

    /// Ask for the files a bundle still lacks
    pub async fn check_bundle(&self, project: &ProjectId, bundle_id: &str) -> Result<BundleResponse> {
        let response = self.service.check_bundle(&self.config.token, bundle_id).await;
        self.settle(project, "check-bundle", response)
    }

    /// Upload one group of file contents
    pub async fn upload_files(
        &self,
        project: &ProjectId,
        bundle_id: &str,
        files: &[UploadEntry],
    ) -> Result<()> {
        let response = self
            .service
            .upload_files(&self.config.token, bundle_id, files)
            .await;
        self.settle(project, "upload-files", response)
    }

    /// Fetch the analysis state of a bundle
    pub async fn get_analysis(
        &self,
        project: &ProjectId,
        bundle_id: &str,
    ) -> Result<AnalysisResponse> {
        let response = self
            .service
            .get_analysis(&self.config.token, bundle_id, &self.config.analysis)
            .await;
        self.settle(project, "get-analysis", response)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("analysis", &self.config.analysis)
            .field("login_requested", &self.login_requested())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct CountingAuth {
        calls: AtomicUsize,
    }

    impl AuthSignal for CountingAuth {
        fn on_unauthorized(&self, _project: &ProjectId) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Answers check-bundle with queued status codes
    struct ScriptedStatus {
        codes: Mutex<Vec<u16>>,
        tokens: Mutex<Vec<String>>,
    }

    impl ScriptedStatus {
        fn new(codes: &[u16]) -> Self {
            let mut codes = codes.to_vec();
            codes.reverse();
            Self {
                codes: Mutex::new(codes),
                tokens: Mutex::new(Vec::new()),
            }
        }

        fn next(&self) -> u16 {
            self.codes.lock().unwrap().pop().unwrap_or(200)
        }
    }

    #[async_trait]
    impl RemoteAnalysisService for ScriptedStatus {
        async fn create_bundle(
            &self,
            _token: &str,
            _files: &BundleFiles,
        ) -> Result<ApiResponse<BundleResponse>> {
            Err(Error::network("connection refused"))
        }

        async fn extend_bundle(
            &self,
            _token: &str,
            _parent_id: &str,
            _request: &ExtendBundleRequest,
        ) -> Result<ApiResponse<BundleResponse>> {
            Ok(ApiResponse::failure(500, "Internal Server Error"))
        }

        async fn check_bundle(
            &self,
            token: &str,
            bundle_id: &str,
        ) -> Result<ApiResponse<BundleResponse>> {
            self.tokens.lock().unwrap().push(token.to_string());
            match self.next() {
                200 => Ok(ApiResponse::ok(BundleResponse {
                    bundle_id: bundle_id.to_string(),
                    missing_files: Vec::new(),
                })),
                code => Ok(ApiResponse::failure(code, "scripted")),
            }
        }

        async fn upload_files(
            &self,
            _token: &str,
            _bundle_id: &str,
            _files: &[UploadEntry],
        ) -> Result<ApiResponse<()>> {
            Ok(ApiResponse::ok(()))
        }

        async fn get_analysis(
            &self,
            _token: &str,
            _bundle_id: &str,
            _options: &AnalysisOptions,
        ) -> Result<ApiResponse<AnalysisResponse>> {
            Ok(ApiResponse::ok(AnalysisResponse::default()))
        }
    }

    fn client(codes: &[u16]) -> (ApiClient, Arc<CountingAuth>, Arc<ScriptedStatus>) {
        let auth = Arc::new(CountingAuth::default());
        let service = Arc::new(ScriptedStatus::new(codes));
        let config = ClientConfig {
            token: "t0k3n".to_string(),
            ..Default::default()
        };
        (
            ApiClient::new(service.clone(), auth.clone(), config),
            auth,
            service,
        )
    }

    #[tokio::test]
    async fn test_unauthorized_streak_signals_once() {
        let (client, auth, _) = client(&[401, 401, 401]);
        let project = ProjectId::new("p");

        for _ in 0..3 {
            let result = client.check_bundle(&project, "b").await;
            assert_eq!(result.unwrap_err(), Error::Unauthorized);
        }

        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
        assert!(client.login_requested());
    }

    #[tokio::test]
    async fn test_success_resets_login_flag() {
        let (client, auth, _) = client(&[401, 200, 401]);
        let project = ProjectId::new("p");

        assert_err!(client.check_bundle(&project, "b").await);
        assert_ok!(client.check_bundle(&project, "b").await);
        assert!(!client.login_requested());
        assert_err!(client.check_bundle(&project, "b").await);

        assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_failures_do_not_signal_login() {
        let (client, auth, _) = client(&[]);
        let project = ProjectId::new("p");

        let extend = client
            .extend_bundle(&project, "parent", &ExtendBundleRequest::default())
            .await;
        assert!(matches!(extend, Err(Error::Network { .. })));

        let create = client
            .create_bundle(&project, &BundleFiles::Hashes(Default::default()))
            .await;
        assert!(matches!(create, Err(Error::Network { .. })));

        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_is_forwarded() {
        let (client, _, service) = client(&[]);
        assert_ok!(client.check_bundle(&ProjectId::new("p"), "b").await);
        assert_eq!(service.tokens.lock().unwrap().as_slice(), ["t0k3n"]);
    }
}
