//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the shell's production code:
//! - No sleep() calls: wait on channels, watches and timeouts instead
//! - No blocking I/O inside async functions
//! - No unwrap()/expect(): errors are propagated or handled
//!
//! The scanner here is line based. It knows enough about Rust to skip
//! comments, `#[cfg(test)]` modules and test functions, which is all the
//! policies need.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Source directories holding production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["shell/core/src", "shell/daemon/src"];

/// Root of the workspace this crate lives in
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files below `dir`, sorted
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Every production source file of the workspace
///
/// Panics if a production directory is missing so a moved crate cannot make
/// the checks silently pass.
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut sources = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "production directory missing: {}", path.display());
        for file in rust_files(&path) {
            match SourceFile::load(&file) {
                Ok(source) => sources.push(source),
                Err(e) => panic!("cannot read {}: {e}", file.display()),
            }
        }
    }
    sources
}

/// One rule breach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule was broken
    pub kind: &'static str,
    /// The offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.kind,
            self.text
        )
    }
}

/// Print violations and fail the test if there are any
pub fn report(title: &str, violations: &[Violation], advice: &[&str]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in advice {
        eprintln!("  {line}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

/// A source file split into lines, with test regions marked
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Where it was read from
    pub path: PathBuf,
    lines: Vec<String>,
    in_test: Vec<bool>,
}

impl SourceFile {
    /// Read and analyse a file
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(path, &content))
    }

    /// Analyse in-memory source
    #[must_use]
    pub fn parse(path: &Path, content: &str) -> Self {
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let in_test = mark_test_regions(&lines);
        Self {
            path: path.to_path_buf(),
            lines,
            in_test,
        }
    }

    /// Raw lines
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the 0-based line is inside a test function or test module
    #[must_use]
    pub fn is_test(&self, idx: usize) -> bool {
        self.in_test.get(idx).copied().unwrap_or(false)
    }

    /// `(index, code)` for every non-test line, comments stripped
    pub fn production_code(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.is_test(*idx))
            .map(|(idx, line)| (idx, code_part(line)))
            .filter(|(_, code)| !code.trim().is_empty())
    }

    /// Whether the 0-based line sits in an `async fn`
    #[must_use]
    pub fn is_in_async_fn(&self, idx: usize) -> bool {
        self.lines[..=idx.min(self.lines.len().saturating_sub(1))]
            .iter()
            .rev()
            .find_map(|line| fn_signature(line))
            .unwrap_or(false)
    }

    /// Build a violation for the 0-based line
    #[must_use]
    pub fn violation(&self, idx: usize, kind: &'static str) -> Violation {
        Violation {
            path: self.path.clone(),
            line: idx + 1,
            kind,
            text: self.lines[idx].trim().to_string(),
        }
    }
}

/// Code before any line comment; doc and plain comments yield ""
#[must_use]
pub fn code_part(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") {
        return "";
    }
    // Keep URLs in string literals intact.
    let mut search_from = 0;
    while let Some(pos) = line[search_from..].find("//") {
        let at = search_from + pos;
        if at > 0 && line.as_bytes()[at - 1] == b':' {
            search_from = at + 2;
            continue;
        }
        return &line[..at];
    }
    line
}

/// `Some(is_async)` when the line starts a function signature
#[must_use]
pub fn fn_signature(line: &str) -> Option<bool> {
    let mut rest = code_part(line).trim_start();
    let mut is_async = false;
    loop {
        let word_end = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
        let word = &rest[..word_end];
        match word {
            "fn" => return Some(is_async),
            "async" => is_async = true,
            "pub" | "const" | "unsafe" | "extern" => {}
            _ if word.starts_with("pub(") => {}
            _ => return None,
        }
        rest = rest[word_end..].trim_start();
    }
}

fn is_test_attribute(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("#[test]")
        || line.starts_with("#[tokio::test")
        || line.starts_with("#[cfg(test)]")
}

/// Net brace depth change of a line, ignoring braces in strings and chars
fn brace_delta(line: &str) -> i32 {
    let code = code_part(line);
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' if !escaped => {
                    escaped = true;
                    continue;
                }
                '"' if !escaped => in_string = false,
                _ => {}
            }
            escaped = false;
            continue;
        }
        match c {
            '"' => in_string = true,
            '\'' => {
                // Char literal like '{' or '\''; lifetimes have no closing quote nearby.
                let literal: String = chars.clone().take(3).collect();
                if literal.chars().nth(1) == Some('\'') {
                    chars.nth(1);
                } else if literal.starts_with('\\') && literal.chars().nth(2) == Some('\'') {
                    chars.nth(2);
                }
            }
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Mark lines covered by `#[test]` functions and `#[cfg(test)]` items
fn mark_test_regions(lines: &[String]) -> Vec<bool> {
    let mut marks = vec![false; lines.len()];
    let mut idx = 0;
    while idx < lines.len() {
        if !is_test_attribute(&lines[idx]) {
            idx += 1;
            continue;
        }

        // The attribute covers the next item: through its closing brace, or
        // a `;` for brace-less items.
        let start = idx;
        let mut depth = 0;
        let mut opened = false;
        let mut end = idx;
        for (offset, line) in lines[start..].iter().enumerate() {
            end = start + offset;
            depth += brace_delta(line);
            if depth > 0 {
                opened = true;
            }
            if opened && depth <= 0 {
                break;
            }
            if !opened && offset > 0 && code_part(line).trim_end().ends_with(';') {
                break;
            }
        }
        for mark in &mut marks[start..=end] {
            *mark = true;
        }
        idx = end + 1;
    }
    marks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> SourceFile {
        SourceFile::parse(Path::new("mem.rs"), src)
    }

    #[test]
    fn test_cfg_test_module_is_skipped() {
        let source = parse(
            "fn real() {\n\
             \x20   work();\n\
             }\n\
             \n\
             #[cfg(test)]\n\
             mod tests {\n\
             \x20   fn helper() { value.unwrap(); }\n\
             \x20   #[test]\n\
             \x20   fn case() {\n\
             \x20       let s = \"}\";\n\
             \x20       thing.unwrap();\n\
             \x20   }\n\
             }\n\
             fn after() {}\n",
        );
        assert!(!source.is_test(1));
        assert!(source.is_test(6));
        assert!(source.is_test(10));
        assert!(!source.is_test(13));
    }

    #[test]
    fn test_test_function_outside_module_is_skipped() {
        let source = parse(
            "#[tokio::test]\n\
             async fn case() {\n\
             \x20   tokio::time::sleep(d).await;\n\
             }\n\
             async fn real() {\n\
             \x20   tokio::time::sleep(d).await;\n\
             }\n",
        );
        assert!(source.is_test(2));
        assert!(!source.is_test(5));
        let lines: Vec<usize> = source.production_code().map(|(idx, _)| idx).collect();
        assert_eq!(lines, vec![4, 5, 6]);
    }

    #[test]
    fn test_cfg_test_use_is_skipped() {
        let source = parse("#[cfg(test)]\nuse std::fs;\nuse std::fmt;\n");
        assert!(source.is_test(1));
        assert!(!source.is_test(2));
    }

    #[test]
    fn test_code_part_strips_comments_not_urls() {
        assert_eq!(code_part("let x = 1; // note"), "let x = 1; ");
        assert_eq!(code_part("/// docs .unwrap()"), "");
        assert_eq!(code_part("load(\"https://a.test\")"), "load(\"https://a.test\")");
    }

    #[test]
    fn test_fn_signature() {
        assert_eq!(fn_signature("    pub async fn run(&self) {"), Some(true));
        assert_eq!(fn_signature("pub(crate) fn helper() {"), Some(false));
        assert_eq!(fn_signature("fn main() {"), Some(false));
        assert_eq!(fn_signature("let f = fn_ptr;"), None);
    }

    #[test]
    fn test_async_detection() {
        let source = parse(
            "pub async fn load() {\n\
             \x20   read();\n\
             }\n\
             pub fn sync_load() {\n\
             \x20   read();\n\
             }\n",
        );
        assert!(source.is_in_async_fn(1));
        assert!(!source.is_in_async_fn(4));
    }

    #[test]
    fn test_brace_delta_ignores_literals() {
        assert_eq!(brace_delta("let s = \"{{\";"), 0);
        assert_eq!(brace_delta("match c { '{' => 1,"), 1);
        assert_eq!(brace_delta("fn f<'a>(x: &'a str) {"), 1);
        assert_eq!(brace_delta("}"), -1);
    }
}
