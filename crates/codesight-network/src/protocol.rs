//! Logical request and response shapes of the remote analysis service
//!
//! Field names follow the service's camelCase JSON. The transport that actually
//! moves these over HTTP lives with the host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// HTTP-style status returned with every response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    /// Status code, 200 on success
    pub code: u16,
    /// Human readable description
    pub description: String,
}

impl ApiStatus {
    /// Success code
    pub const OK: u16 = 200;
    /// Rejected token
    pub const UNAUTHORIZED: u16 = 401;

    /// Create a new status
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Successful status
    pub fn ok() -> Self {
        Self::new(Self::OK, "OK")
    }

    /// Rejected token status
    pub fn unauthorized() -> Self {
        Self::new(Self::UNAUTHORIZED, "Unauthorized")
    }

    /// Check for success
    pub fn is_ok(&self) -> bool {
        self.code == Self::OK
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.description)
    }
}

/// Status plus decoded body; the body is defaulted on failure
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    /// Response status
    pub status: ApiStatus,
    /// Decoded body
    pub body: T,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `body`
    pub fn ok(body: T) -> Self {
        Self {
            status: ApiStatus::ok(),
            body,
        }
    }
}

impl<T: Default> ApiResponse<T> {
    /// Failed response with an empty body
    pub fn failure(code: u16, description: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::new(code, description),
            body: T::default(),
        }
    }
}

/// Content of one file sent inline or uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// SHA-256 hex digest of `content`
    pub hash: String,
    /// File text
    pub content: String,
}

/// Files of a new bundle: either path→hash or path→inline content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleFiles {
    /// Content is uploaded separately for the paths reported missing
    Hashes(BTreeMap<String, String>),
    /// Content travels with the request, nothing is reported missing
    Contents(BTreeMap<String, FileContent>),
}

impl BundleFiles {
    /// Number of files
    pub fn len(&self) -> usize {
        match self {
            Self::Hashes(files) => files.len(),
            Self::Contents(files) => files.len(),
        }
    }

    /// Check if there are no files
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Incremental change to a parent bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendBundleRequest {
    /// Added or changed files, path→hash
    pub files: BTreeMap<String, String>,
    /// Paths to drop from the parent
    pub removed_files: Vec<String>,
}

/// Answer to create, extend and check bundle calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleResponse {
    /// Id of the resulting bundle
    #[serde(default)]
    pub bundle_id: String,
    /// Paths whose content the service has not received yet
    #[serde(default)]
    pub missing_files: Vec<String>,
}

/// One uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEntry {
    /// SHA-256 hex digest of the content
    pub file_hash: String,
    /// File text
    pub file_content: String,
}

/// Options forwarded to get-analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    /// Lowest severity to report
    pub severity: u8,
    /// Run linters as well
    pub linters: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            severity: 1,
            linters: false,
        }
    }
}

/// Server side analysis state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    /// Files are being fetched
    Fetching,
    /// Files are being parsed
    Parsing,
    /// Analysis is running
    Analyzing,
    /// Core analysis finished, post-processing running
    DcDone,
    /// Results are final
    Done,
    /// Analysis failed; the cached state is inconsistent
    Failed,
    /// No usable status received yet
    #[default]
    #[serde(other)]
    Pending,
}

impl AnalysisStatus {
    /// Check for a final status
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "FETCHING",
            Self::Parsing => "PARSING",
            Self::Analyzing => "ANALYZING",
            Self::DcDone => "DC_DONE",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Pending => "PENDING",
        };
        f.write_str(name)
    }
}

/// Answer to get-analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// Server side state
    #[serde(default)]
    pub status: AnalysisStatus,
    /// Completion fraction reported by the service
    #[serde(default)]
    pub progress: f64,
    /// Link to the analysis in the service's web UI
    #[serde(default)]
    pub analysis_url: String,
    /// Findings, present once the status is final
    #[serde(default)]
    pub analysis_results: Option<AnalysisResults>,
}

/// Findings of one analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResults {
    /// path → suggestion index → ranges
    #[serde(default)]
    pub files: BTreeMap<String, BTreeMap<String, Vec<MarkerRange>>>,
    /// suggestion index → definition
    #[serde(default)]
    pub suggestions: Option<BTreeMap<String, SuggestionDefinition>>,
}

/// Range of one finding, 1-based rows and columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRange {
    /// Start and end row
    pub rows: [usize; 2],
    /// Start column (inclusive) and end column (exclusive)
    pub cols: [usize; 2],
}

impl MarkerRange {
    /// Create a new range
    pub const fn new(rows: [usize; 2], cols: [usize; 2]) -> Self {
        Self { rows, cols }
    }
}

/// Shared definition referenced by suggestion index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionDefinition {
    /// Stable rule identifier
    pub id: String,
    /// Human readable message
    pub message: String,
    /// Numeric severity, 1..=3
    pub severity: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_response_from_json() {
        let json = r#"{
            "status": "DONE",
            "progress": 1.0,
            "analysisUrl": "https://example.test/app/1",
            "analysisResults": {
                "files": { "/a.py": { "0": [ { "rows": [1, 1], "cols": [5, 9] } ] } },
                "suggestions": { "0": { "id": "py/unused", "message": "Unused", "severity": 2 } }
            }
        }"#;

        let response: AnalysisResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, AnalysisStatus::Done);
        assert_eq!(response.analysis_url, "https://example.test/app/1");

        let results = response.analysis_results.unwrap();
        let ranges = &results.files["/a.py"]["0"];
        assert_eq!(ranges[0], MarkerRange::new([1, 1], [5, 9]));
        assert_eq!(results.suggestions.unwrap()["0"].severity, 2);
    }

    #[test]
    fn test_unknown_status_is_pending() {
        let response: AnalysisResponse =
            serde_json::from_str(r#"{ "status": "QUEUED", "progress": 0.0 }"#).unwrap();
        assert_eq!(response.status, AnalysisStatus::Pending);
        assert!(!response.status.is_terminal());
        assert!(response.analysis_results.is_none());
    }

    #[test]
    fn test_bundle_response_defaults_missing_fields() {
        let response: BundleResponse = serde_json::from_str(r#"{ "bundleId": "b1" }"#).unwrap();
        assert_eq!(response.bundle_id, "b1");
        assert!(response.missing_files.is_empty());
    }

    #[test]
    fn test_failure_response_has_default_body() {
        let response: ApiResponse<BundleResponse> = ApiResponse::failure(500, "boom");
        assert!(!response.status.is_ok());
        assert_eq!(response.body, BundleResponse::default());
        assert_eq!(response.status.to_string(), "500 boom");
    }
}
