//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions in the shell crates MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::io`, not `std::fs`, `std::net`, `std::io::stdin()`
//!
//! Blocking calls in plain functions are fine: configuration is loaded before
//! the runtime does any work.

use architectural_enforcement::{production_sources, report, SourceFile, Violation};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations: Vec<Violation> = production_sources()
        .iter()
        .flat_map(find_blocking_io_violations)
        .collect();

    report(
        "CRITICAL: Blocking I/O calls found in async code!",
        &violations,
        &[
            "❌ FORBIDDEN in async fn: std::fs::*, std::net::*, std::io::stdin(), std::process::Command",
            "✅ REQUIRED: tokio::fs::read_to_string().await, tokio::io::stdin()",
            "✅ ACCEPTABLE: blocking I/O in non-async functions and tests",
        ],
    );
}

const BLOCKING: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
];

fn find_blocking_io_violations(source: &SourceFile) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (idx, code) in source.production_code() {
        if !source.is_in_async_fn(idx) {
            continue;
        }
        for (pattern, kind) in BLOCKING {
            if code.contains(pattern) {
                violations.push(source.violation(idx, kind));
            }
        }
    }
    violations
}

#[test]
fn test_blocking_io_detection() {
    let source = SourceFile::parse(
        std::path::Path::new("mem.rs"),
        "pub fn load_config() {\n\
         \x20   let text = std::fs::read_to_string(path)?;\n\
         }\n\
         pub async fn load_script() {\n\
         \x20   let text = std::fs::read_to_string(path)?;\n\
         \x20   let ok = tokio::fs::read_to_string(path).await?;\n\
         }\n",
    );

    let violations = find_blocking_io_violations(&source);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, 5);
    assert_eq!(violations[0].kind, "Blocking file I/O");
}
