//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code (timers wait on deadlines)
//! - No blocking I/O inside async code
//! - No panicking shortcuts in production code
//!
//! These tests are designed to catch violations early in the development cycle.
//! This library holds the shared source scanner; the rules live in `tests/`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["conductor/core/src", "conductor/daemon/src"];

/// One offending line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// A production line as seen by the rules
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// Code with any trailing comment removed
    pub code: String,
    /// Inside an `async fn` or `async` block
    pub in_async: bool,
}

/// Workspace root, found from this crate's manifest
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every `.rs` file under `dir`
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Drop a trailing `//` comment, leaving URLs like `tcp://` alone
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'/' && bytes[i + 1] == b'/' && (i == 0 || bytes[i - 1] != b':') {
            return &line[..i];
        }
        i += 1;
    }
    line
}

fn opens_async(code: &str) -> bool {
    code.contains("async fn ") || code.contains("async move {") || code.contains("async {")
}

/// Production lines of a source file
///
/// Everything from the first `#[cfg(test)]` on is test code and skipped.
pub fn production_lines(content: &str) -> Vec<CodeLine> {
    let mut lines = Vec::new();
    let mut depth: i64 = 0;
    // Depths at which enclosing async bodies were opened
    let mut async_depths: Vec<i64> = Vec::new();
    let mut pending_async = false;

    for (idx, raw) in content.lines().enumerate() {
        if raw.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = strip_comment(raw);
        if opens_async(code) {
            pending_async = true;
        }
        let in_async = pending_async || !async_depths.is_empty();

        for ch in code.chars() {
            match ch {
                '{' => {
                    if pending_async {
                        async_depths.push(depth);
                        pending_async = false;
                    }
                    depth += 1;
                }
                '}' => {
                    depth -= 1;
                    if async_depths.last() == Some(&depth) {
                        async_depths.pop();
                    }
                }
                // Bodiless trait method
                ';' if pending_async && !code.contains('{') => pending_async = false,
                _ => {}
            }
        }

        lines.push(CodeLine {
            number: idx + 1,
            code: code.to_string(),
            in_async,
        });
    }
    lines
}

/// Production lines matching `rule`, across every production directory
///
/// Files whose workspace-relative path ends with an entry of `allowed_files`
/// are skipped.
pub fn scan<F>(rule: F, allowed_files: &[&str]) -> Vec<Violation>
where
    F: Fn(&CodeLine) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(&root.join(dir)) {
            if allowed_files.iter().any(|allowed| path.ends_with(allowed)) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for line in production_lines(&content) {
                if rule(&line) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: line.number,
                        text: line.code.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

/// Panic with a readable report if anything was found
pub fn assert_clean(rule_name: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ CRITICAL: {rule_name} violations found in production code!\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} {rule_name} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comment_keeps_urls() {
        assert_eq!(strip_comment("let a = 1; // note"), "let a = 1; ");
        assert_eq!(
            strip_comment("format!(\"tcp://{addr}\")"),
            "format!(\"tcp://{addr}\")"
        );
        assert_eq!(strip_comment("/// doc"), "");
    }

    #[test]
    fn test_test_module_is_skipped() {
        let source = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        let lines = production_lines(source);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].code, "fn a() {}");
    }

    #[test]
    fn test_async_regions_are_tracked() {
        let source = "\
fn sync_fn() {
    std::fs::read(\"x\");
}
async fn run() {
    if x {
        work();
    }
    done();
}
fn after() {
    let task = tokio::spawn(async move {
        inner();
    });
}
";
        let lines = production_lines(source);
        let in_async: Vec<usize> = lines
            .iter()
            .filter(|l| l.in_async)
            .map(|l| l.number)
            .collect();
        assert_eq!(in_async, vec![4, 5, 6, 7, 8, 9, 11, 12, 13]);
    }

    #[test]
    fn test_bodiless_async_trait_method() {
        let source = "\
trait T {
    async fn accept(&mut self) -> u8;
    fn name(&self) -> String;
}
";
        let lines = production_lines(source);
        assert!(!lines[2].in_async);
    }

    #[test]
    fn test_violation_display() {
        let violation = Violation {
            path: PathBuf::from("src/a.rs"),
            line: 3,
            text: "x()".to_string(),
        };
        assert_eq!(violation.to_string(), "src/a.rs:3 - x()");
    }

    #[test]
    fn test_workspace_root_has_production_dirs() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).exists(), "missing {dir}");
        }
    }
}
