//! Core type system and error handling for codesight
//!
//! This crate provides the foundational types, error handling, and shared data structures
//! used throughout the codesight workspace. It includes:
//!
//! - **Error handling**: Error taxonomy with severity levels and retry hints
//! - **Core types**: Projects, file handles, suggestions and source ranges
//! - **Traits**: Collaborator interfaces implemented by the host environment
//! - **Configuration**: Validated limits for the bundle protocol
//!
//! # Features
//!
//! - `std` (default): Enable standard library features
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use codesight_types::{FileHandle, ProjectId, Severity, Suggestion, TextRange};
//!
//! let file = FileHandle::new(ProjectId::new("demo"), "src/app.py");
//! assert_eq!(file.path(), "/src/app.py");
//!
//! let finding = Suggestion::new("py/unused", "Unused import", Severity::Warning, vec![TextRange::new(0, 6)]);
//! assert_eq!(finding.severity.level(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{AttemptLimit, PayloadLimit, PollSchedule};
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use traits::*;
pub use types::*;
