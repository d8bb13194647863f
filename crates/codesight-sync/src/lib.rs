//! Bundle synchronization and analysis cache engine for codesight
//!
//! This crate keeps a local cache of analysis findings in step with what the
//! remote analysis service has processed:
//!
//! - **Content hashing**: Per-file content and SHA-256 digests, with change detection
//! - **Ignore rules**: `.dcignore` files compiled into path patterns
//! - **Bundle protocol**: Create or extend bundles in size-bounded batches, upload
//!   missing contents with bounded retries, poll the analysis
//! - **Response translation**: Row/column ranges mapped to character offsets
//! - **Analysis cache**: One process-wide lock for mutation, lock-free lookups,
//!   a fast path for single files with keyed background reconciliation
//!
//! # Examples
//!
//! ```rust,no_run
//! use codesight_config::Config;
//! use codesight_network::RemoteAnalysisService;
//! use codesight_sync::{AnalysisCache, HostServices};
//! use codesight_types::{FileHandle, ProjectId};
//! use std::sync::Arc;
//!
//! # async fn example(service: Arc<dyn RemoteAnalysisService>, host: HostServices) {
//! let cache = AnalysisCache::new(service, host, &Config::default());
//! let project = ProjectId::new("demo");
//! let files = vec![FileHandle::new(project.clone(), "src/app.py")];
//!
//! cache.update_cached_results_for_files(&project, &files, &[]).await;
//! for (file, findings) in cache.get_analysis(&files) {
//!     println!("{}: {} findings", file, findings.len());
//! }
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod bundle;
pub mod cache;
pub mod content;
pub mod ignore;
pub mod progress;
pub mod projects;
pub mod tasks;
pub mod translate;

pub use bundle::{BundleSyncClient, SyncOptions, SyncOutcome};
pub use cache::{AnalysisCache, HostServices};
pub use content::{ContentHashStore, ContentRecord};
pub use ignore::{CompiledPattern, IgnorePatternEngine};
pub use progress::{ProgressReporter, SyncPhase, SyncProgress};
pub use projects::{ProjectRegistry, ProjectSyncState};
pub use tasks::BackgroundTasks;
pub use translate::ResponseTranslator;
