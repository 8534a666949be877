//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the capture crates:
//! - No sleep() calls in production code (wait on I/O or notifications instead)
//! - No blocking I/O inside async functions
//! - No unwrap()/expect()/panic!() outside tests
//!
//! The scanning helpers shared by those tests live here. They work line by line
//! on source text, which keeps them cheap and dependency-free at the cost of
//! being heuristics.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["capture/core/src", "capture/probe/src"];

/// Workspace root, resolved from this package's manifest
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

// =============================================================================
// Source files
// =============================================================================

/// A Rust source file split into lines
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// File content, one entry per line
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Build from in-memory text
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Lines before the trailing `#[cfg(test)]` module
    #[must_use]
    pub fn production_lines(&self) -> &[String] {
        let end = self
            .lines
            .iter()
            .position(|l| l.trim() == "#[cfg(test)]")
            .unwrap_or(self.lines.len());
        &self.lines[..end]
    }
}

/// Read every `.rs` file under the production roots
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut sources = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(text) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_path_buf();
            sources.push(SourceFile::from_text(relative, &text));
        }
    }

    sources
}

// =============================================================================
// Line analysis
// =============================================================================

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line declares
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `fn`
    Sync,
    /// `async fn`
    Async,
}

/// The function kind declared on `line`, if it declares one
#[must_use]
pub fn fn_declaration(line: &str) -> Option<FnKind> {
    let mut rest = line.trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    rest = rest.strip_prefix("const ").unwrap_or(rest);

    if rest.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if rest.starts_with("fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Kind of the nearest function declared at or above `idx`
#[must_use]
pub fn enclosing_fn(lines: &[String], idx: usize) -> Option<FnKind> {
    lines[..=idx].iter().rev().find_map(|l| fn_declaration(l))
}

/// Whether the function enclosing `idx` carries a test attribute
#[must_use]
pub fn is_in_test_function(lines: &[String], idx: usize) -> bool {
    let Some(decl) = (0..=idx).rev().find(|&i| fn_declaration(&lines[i]).is_some()) else {
        return false;
    };

    lines[..decl]
        .iter()
        .rev()
        .map(|l| l.trim())
        .take_while(|l| l.starts_with("#[") || l.starts_with("///"))
        .any(|l| l.starts_with("#[test]") || l.starts_with("#[tokio::test"))
}

// =============================================================================
// Violations
// =============================================================================

/// One offending line
#[derive(Debug)]
pub struct Violation {
    /// File, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule was broken
    pub reason: &'static str,
    /// The offending source line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.reason,
            self.text
        )
    }
}

/// Run `check` over every production line of every production file
pub fn scan_production<F>(mut check: F) -> Vec<Violation>
where
    F: FnMut(&[String], usize, &str) -> Option<&'static str>,
{
    let mut violations = Vec::new();
    for source in production_sources() {
        let lines = source.production_lines();
        for (idx, line) in lines.iter().enumerate() {
            if let Some(reason) = check(lines, idx, code_part(line)) {
                violations.push(Violation {
                    path: source.path.clone(),
                    line: idx + 1,
                    reason,
                    text: line.trim().to_string(),
                });
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(code: &[&str]) -> Vec<String> {
        code.iter().map(|l| (*l).to_string()).collect()
    }

    #[test]
    fn test_fn_declaration_kinds() {
        assert_eq!(fn_declaration("fn main() {"), Some(FnKind::Sync));
        assert_eq!(fn_declaration("    pub fn load() -> Result<()> {"), Some(FnKind::Sync));
        assert_eq!(fn_declaration("pub(crate) async fn run(&self) {"), Some(FnKind::Async));
        assert_eq!(fn_declaration("    async fn dispatch("), Some(FnKind::Async));
        assert_eq!(fn_declaration("let f = |x| x + 1;"), None);
        assert_eq!(fn_declaration("impl Drop for Guard {"), None);
    }

    #[test]
    fn test_enclosing_fn() {
        let code = lines(&[
            "pub fn load() {",
            "    let contents = std::fs::read_to_string(\"capture.toml\");",
            "}",
            "pub async fn fetch() {",
            "    let contents = std::fs::read_to_string(\"body.bin\");",
            "}",
        ]);

        assert_eq!(enclosing_fn(&code, 1), Some(FnKind::Sync));
        assert_eq!(enclosing_fn(&code, 4), Some(FnKind::Async));
    }

    #[test]
    fn test_test_function_detection() {
        let code = lines(&[
            "#[tokio::test]",
            "async fn test_something() {",
            "    tokio::time::sleep(Duration::from_millis(1)).await;",
            "}",
            "async fn helper() {",
            "    tokio::time::sleep(Duration::from_millis(1)).await;",
            "}",
        ]);

        assert!(is_in_test_function(&code, 2));
        assert!(!is_in_test_function(&code, 5));
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = SourceFile::from_text(
            "x.rs",
            "fn a() {}\n\n#[cfg(test)]\nmod tests {\n    fn b() { x.unwrap(); }\n}\n",
        );
        assert_eq!(source.production_lines().len(), 2);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // .unwrap()"), "let x = 1; ");
        assert_eq!(code_part("/// Calls .unwrap()"), "");
    }
}
