//! `.dcignore` pattern compilation and matching
//!
//! The accepted syntax is a gitignore subset. Each non-blank, non-comment line
//! becomes one anchored regular expression over the full bundle path:
//!
//! - a line without an inner `/`, or whose only inner `/` introduces a trailing
//!   `/*` or `/**`, matches at any depth below the ignore file's directory;
//!   any other line is anchored at that directory
//! - a trailing `/` requires something below the match (directory semantics)
//! - `*` and `?` stay within one path segment, `**` crosses segments
//! - `!` has no special meaning and is matched literally

use codesight_types::{FileHandle, ProjectId};
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// One compiled ignore line
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    line: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Ignore-file line this pattern was built from
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Regular expression source, without the full-match anchors
    pub fn source(&self) -> &str {
        let anchored = self.regex.as_str();
        anchored
            .strip_prefix("^(?:")
            .and_then(|rest| rest.strip_suffix(")$"))
            .unwrap_or(anchored)
    }

    /// Check a bundle path against this pattern
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Translate one ignore line into a regular expression source.
///
/// `base_dir` is the ignore file's directory without a trailing separator.
/// Returns `None` for blank lines and comments.
pub fn pattern_source(base_dir: &str, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut prefix = format!("{}/", regex::escape(base_dir));

    let without_last = &line[..line.len() - line.chars().last().map_or(0, char::len_utf8)];
    match without_last.find('/') {
        None => prefix.push_str(".*"),
        Some(first) => {
            let trailing_glob = line.ends_with("/*") || line.ends_with("/**");
            if trailing_glob && line.rfind('/') == Some(first) {
                prefix.push_str(".*");
            }
        }
    }

    let postfix = if line.ends_with('/') { ".+" } else { ".*" };

    // The prefix already ends with the separator an anchored line starts with.
    let body = if prefix.ends_with('/') {
        line.strip_prefix('/').unwrap_or(line)
    } else {
        line
    };
    let body = body
        .replace('.', "\\.")
        .replace('*', "[^/]*")
        .replace('?', "[^/]?")
        .replace("[^/]*[^/]*", ".*");

    Some(format!("{}{}{}", prefix, body, postfix))
}

/// Compile the text of an ignore file.
///
/// Lines whose translation is not a valid regular expression are logged and
/// skipped. Duplicate lines compile once.
pub fn compile(ignore_file: &FileHandle, text: &str) -> Vec<CompiledPattern> {
    let base_dir = ignore_file.parent_dir();
    let mut seen = HashSet::new();
    let mut patterns = Vec::new();

    for line in text.lines() {
        let Some(source) = pattern_source(base_dir, line) else {
            continue;
        };
        if !seen.insert(source.clone()) {
            continue;
        }
        match Regex::new(&format!("^(?:{})$", source)) {
            Ok(regex) => patterns.push(CompiledPattern {
                line: line.trim().to_string(),
                regex,
            }),
            Err(e) => warn!(file = %ignore_file, line = line.trim(), error = %e, "Skipping ignore pattern"),
        }
    }

    patterns
}

/// Compiled rules of every tracked ignore file
#[derive(Debug, Default)]
pub struct IgnorePatternEngine {
    rules: DashMap<FileHandle, Vec<CompiledPattern>>,
}

impl IgnorePatternEngine {
    /// Create an engine with no ignore files
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a file is an ignore file rather than a source file
    pub fn is_ignore_file(file: &FileHandle) -> bool {
        file.is_dcignore() || file.is_gitignore()
    }

    /// Compile an ignore file and replace its previous rules
    pub fn load_ignore_file(&self, ignore_file: &FileHandle, text: &str) -> usize {
        let patterns = compile(ignore_file, text);
        let count = patterns.len();
        debug!(file = %ignore_file, patterns = count, "Loaded ignore file");
        self.rules.insert(ignore_file.clone(), patterns);
        count
    }

    /// Forget the rules of one ignore file
    pub fn remove_ignore_file(&self, ignore_file: &FileHandle) -> bool {
        self.rules.remove(ignore_file).is_some()
    }

    /// Forget the rules of every ignore file in a project
    pub fn remove_project(&self, project: &ProjectId) {
        self.rules.retain(|file, _| file.project() != project);
    }

    /// Whether any tracked ignore file whose directory contains `file` matches it.
    ///
    /// A file named `.gitignore` is always ignored.
    pub fn is_ignored(&self, file: &FileHandle) -> bool {
        if file.is_gitignore() {
            return true;
        }

        self.rules.iter().any(|entry| {
            let ignore_file = entry.key();
            in_scope(ignore_file, file) && entry.value().iter().any(|p| p.is_match(file.path()))
        })
    }

    /// Compiled patterns of one ignore file
    pub fn patterns(&self, ignore_file: &FileHandle) -> Vec<CompiledPattern> {
        self.rules
            .get(ignore_file)
            .map(|patterns| patterns.clone())
            .unwrap_or_default()
    }

    /// Number of tracked ignore files
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no ignore file is tracked
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn in_scope(ignore_file: &FileHandle, file: &FileHandle) -> bool {
    if ignore_file.project() != file.project() {
        return false;
    }
    let base = ignore_file.parent_dir();
    file.path()
        .strip_prefix(base)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn handle(path: &str) -> FileHandle {
        FileHandle::new(ProjectId::new("p"), path)
    }

    fn engine_with(ignore_path: &str, text: &str) -> IgnorePatternEngine {
        let engine = IgnorePatternEngine::new();
        engine.load_ignore_file(&handle(ignore_path), text);
        engine
    }

    #[rstest]
    #[case("build/", "/proj/.*build/.+")]
    #[case("*.md", "/proj/.*[^/]*\\.md.*")]
    #[case("docs/*", "/proj/.*docs/[^/]*.*")]
    #[case("docs/**", "/proj/.*docs/.*.*")]
    #[case("src/gen/*", "/proj/src/gen/[^/]*.*")]
    #[case("/target", "/proj/target.*")]
    #[case("a?c", "/proj/.*a[^/]?c.*")]
    fn test_pattern_source(#[case] line: &str, #[case] expected: &str) {
        assert_eq!(pattern_source("/proj", line).as_deref(), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("# comment")]
    fn test_blank_and_comment_lines_are_skipped(#[case] line: &str) {
        assert_eq!(pattern_source("/proj", line), None);
    }

    #[rstest]
    #[case("build/", "/build/out.o", true)]
    #[case("build/", "/src/build/out.o", true)]
    #[case("build/", "/build", false)]
    #[case("*.md", "/README.md", true)]
    #[case("*.md", "/docs/guide.md", true)]
    #[case("*.md", "/main.py", false)]
    #[case("!skip.txt", "/!skip.txt", true)]
    #[case("!skip.txt", "/skip.txt", false)]
    #[case("src/gen/*", "/src/gen/a.py", true)]
    #[case("src/gen/*", "/lib/src/gen/a.py", false)]
    #[case("**/fixtures", "/a/b/fixtures/x.json", true)]
    fn test_is_ignored(#[case] pattern: &str, #[case] path: &str, #[case] ignored: bool) {
        let engine = engine_with("/.dcignore", pattern);
        assert_eq!(engine.is_ignored(&handle(path)), ignored, "{pattern} vs {path}");
    }

    #[test]
    fn test_rules_apply_only_below_their_directory() {
        let engine = engine_with("/sub/.dcignore", "*.log");
        assert!(engine.is_ignored(&handle("/sub/deep/app.log")));
        assert!(!engine.is_ignored(&handle("/other/app.log")));
        assert!(!engine.is_ignored(&handle("/subway/app.log")));

        let other_project = FileHandle::new(ProjectId::new("q"), "/sub/app.log");
        assert!(!engine.is_ignored(&other_project));
    }

    #[test]
    fn test_gitignore_is_always_ignored() {
        let engine = IgnorePatternEngine::new();
        assert!(engine.is_ignored(&handle("/src/.gitignore")));
        assert!(IgnorePatternEngine::is_ignore_file(&handle("/.dcignore")));
        assert!(!IgnorePatternEngine::is_ignore_file(&handle("/main.py")));
    }

    #[test]
    fn test_invalid_lines_are_skipped() {
        let engine = IgnorePatternEngine::new();
        let file = handle("/.dcignore");
        assert_eq!(engine.load_ignore_file(&file, "bad(\n*.tmp\n*.tmp\n"), 1);
        assert_eq!(engine.patterns(&file)[0].line(), "*.tmp");
        assert_eq!(engine.patterns(&file)[0].source(), "/.*[^/]*\\.tmp.*");
    }

    #[test]
    fn test_reload_and_removal() {
        let engine = engine_with("/.dcignore", "*.log");
        let log = handle("/app.log");
        assert!(engine.is_ignored(&log));

        engine.load_ignore_file(&handle("/.dcignore"), "*.tmp");
        assert!(!engine.is_ignored(&log));

        engine.remove_project(&ProjectId::new("p"));
        assert!(engine.is_empty());
    }
}
