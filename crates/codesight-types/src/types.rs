//! Core data types for codesight
//!
//! This module provides the identities and findings shared by every crate in the
//! workspace: projects, file handles, suggestions and their source ranges.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Findings keyed by the file they belong to
pub type SuggestionMap = HashMap<FileHandle, Vec<Suggestion>>;

/// Name of the per-directory ignore file
pub const DCIGNORE_FILE_NAME: &str = ".dcignore";

/// Name of the git ignore file, treated as an always-ignored marker
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Opaque project identity supplied by the host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectId(Arc<str>);

impl ProjectId {
    /// Create a new project identity
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Get the project name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identity of one source file inside a project.
///
/// The path is normalized to a `/`-rooted, `/`-separated form and doubles as the
/// key the remote service uses inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileHandle {
    project: ProjectId,
    path: Arc<str>,
}

impl FileHandle {
    /// Create a new file handle, normalizing the path
    pub fn new(project: ProjectId, path: impl AsRef<str>) -> Self {
        Self {
            project,
            path: Arc::from(normalize_path(path.as_ref())),
        }
    }

    /// Project this file belongs to
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Normalized absolute path, used as the bundle path key
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Directory containing this file, without a trailing separator.
    ///
    /// A file directly under the root yields an empty string.
    pub fn parent_dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(index) => &self.path[..index],
            None => "",
        }
    }

    /// Whether this is a `.dcignore` file
    pub fn is_dcignore(&self) -> bool {
        self.file_name() == DCIGNORE_FILE_NAME
    }

    /// Whether this is a `.gitignore` file
    pub fn is_gitignore(&self) -> bool {
        self.file_name() == GITIGNORE_FILE_NAME
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.path)
    }
}

/// Normalize a host path into the `/`-rooted bundle form
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    if unified.starts_with('/') {
        unified
    } else {
        format!("/{}", unified)
    }
}

/// Severity of a finding, as numbered by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    /// Informational finding (1)
    Info,
    /// Warning (2)
    Warning,
    /// Error (3)
    Error,
}

impl Severity {
    /// Convert the service's numeric level
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Info),
            2 => Some(Self::Warning),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    /// Numeric level used on the wire
    pub fn level(self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Absolute character range inside a file, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TextRange {
    /// Start offset
    pub start: usize,
    /// End offset
    pub end: usize,
}

impl TextRange {
    /// Create a new range
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Length of the range, zero when inverted
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Check if the range is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One analysis finding for one file
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Suggestion {
    /// Stable rule identifier
    pub id: String,
    /// Human readable message
    pub message: String,
    /// Finding severity
    pub severity: Severity,
    /// Source ranges the finding applies to
    pub ranges: Vec<TextRange>,
}

impl Suggestion {
    /// Create a new suggestion
    pub fn new(
        id: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        ranges: Vec<TextRange>,
    ) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            severity,
            ranges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("src/main.py", "/src/main.py")]
    #[case("/src/main.py", "/src/main.py")]
    #[case("C:\\work\\app.js", "/C:/work/app.js")]
    fn test_path_normalization(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }

    #[test]
    fn test_file_handle_parts() {
        let file = FileHandle::new(ProjectId::new("demo"), "/proj/pkg/.dcignore");
        assert_eq!(file.file_name(), ".dcignore");
        assert_eq!(file.parent_dir(), "/proj/pkg");
        assert!(file.is_dcignore());
        assert!(!file.is_gitignore());

        let root_file = FileHandle::new(ProjectId::new("demo"), "/a.py");
        assert_eq!(root_file.parent_dir(), "");
    }

    #[test]
    fn test_handles_are_scoped_by_project() {
        let a = FileHandle::new(ProjectId::new("a"), "/x.py");
        let b = FileHandle::new(ProjectId::new("b"), "/x.py");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "a:/x.py");
    }

    #[test]
    fn test_severity_levels() {
        for level in 1..=3 {
            let severity = Severity::from_level(level).unwrap();
            assert_eq!(severity.level(), level);
        }
        assert_eq!(Severity::from_level(0), None);
        assert_eq!(Severity::from_level(4), None);
        assert!(Severity::Info < Severity::Error);
    }

    #[test]
    fn test_text_range() {
        let range = TextRange::new(4, 10);
        assert_eq!(range.len(), 6);
        assert!(!range.is_empty());
        assert!(TextRange::new(5, 5).is_empty());
    }
}
