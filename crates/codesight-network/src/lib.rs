//! Remote analysis service protocol for codesight
//!
//! This crate describes the service the sync engine talks to, without owning a
//! transport:
//!
//! - **Protocol shapes**: bundle, upload and analysis request/response types
//! - **Service trait**: the five RPCs a host transport has to provide
//! - **Client**: token injection and the single success check every call goes
//!   through, including re-login signalling on rejected tokens
//!
//! # Examples
//!
//! ```rust,no_run
//! use codesight_network::{ApiClient, ClientConfig, RemoteAnalysisService};
//! use codesight_types::{AuthSignal, ProjectId};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     service: Arc<dyn RemoteAnalysisService>,
//! #     auth: Arc<dyn AuthSignal>,
//! # ) -> codesight_types::Result<()> {
//! let client = ApiClient::new(service, auth, ClientConfig::default());
//! let state = client.check_bundle(&ProjectId::new("demo"), "bundle-1").await?;
//! println!("{} files still missing", state.missing_files.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod protocol;
pub mod service;

pub use client::{ApiClient, ClientConfig};
pub use protocol::{
    AnalysisOptions, AnalysisResponse, AnalysisResults, AnalysisStatus, ApiResponse, ApiStatus,
    BundleFiles, BundleResponse, ExtendBundleRequest, FileContent, MarkerRange,
    SuggestionDefinition, UploadEntry,
};
pub use service::RemoteAnalysisService;
