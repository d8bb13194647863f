//! Remote analysis service interface

use crate::protocol::{
    AnalysisOptions, AnalysisResponse, ApiResponse, BundleFiles, BundleResponse,
    ExtendBundleRequest, UploadEntry,
};
use async_trait::async_trait;
use codesight_types::Result;

/// The five RPCs of the remote analysis service.
///
/// Implementations return `Err` only when no response arrived at all; any
/// answer from the service, successful or not, is an `Ok(ApiResponse)`.
#[async_trait]
pub trait RemoteAnalysisService: Send + Sync {
    /// Create a new bundle from scratch
    async fn create_bundle(
        &self,
        token: &str,
        files: &BundleFiles,
    ) -> Result<ApiResponse<BundleResponse>>;

    /// Derive a new bundle from `parent_id` by adding and removing paths
    async fn extend_bundle(
        &self,
        token: &str,
        parent_id: &str,
        request: &ExtendBundleRequest,
    ) -> Result<ApiResponse<BundleResponse>>;

    /// Ask which files of a bundle still lack content
    async fn check_bundle(&self, token: &str, bundle_id: &str)
        -> Result<ApiResponse<BundleResponse>>;

    /// Upload file contents into a bundle
    async fn upload_files(
        &self,
        token: &str,
        bundle_id: &str,
        files: &[UploadEntry],
    ) -> Result<ApiResponse<()>>;

    /// Fetch the analysis state and, once final, its results
    async fn get_analysis(
        &self,
        token: &str,
        bundle_id: &str,
        options: &AnalysisOptions,
    ) -> Result<ApiResponse<AnalysisResponse>>;
}
