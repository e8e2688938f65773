//! Integration Test: Unwrap Prohibition
//!
//! **Policy**: Production code propagates errors with `?` or handles them.
//! `unwrap()` and `expect()` are for tests only. A lost peer or a dead
//! surface must never take the owner process down.

use architectural_enforcement::{production_sources, report, SourceFile, Violation};

/// Test that production code does not unwrap
#[test]
fn test_no_unwrap_in_production_code() {
    let violations: Vec<Violation> = production_sources()
        .iter()
        .flat_map(find_unwrap_violations)
        .collect();

    report(
        "CRITICAL: unwrap()/expect() found in production code!",
        &violations,
        &[
            "Propagate with `?`, map into a thiserror variant, or log and return None / false",
            "unwrap_or, unwrap_or_else and unwrap_or_default are fine",
        ],
    );
}

fn find_unwrap_violations(source: &SourceFile) -> Vec<Violation> {
    source
        .production_code()
        .filter(|(_, code)| code.contains(".unwrap()") || code.contains(".expect("))
        .map(|(idx, _)| source.violation(idx, "Panicking unwrap"))
        .collect()
}

#[test]
fn test_unwrap_detection() {
    let source = SourceFile::parse(
        std::path::Path::new("mem.rs"),
        "fn a() -> u32 {\n\
         \x20   value.unwrap_or(0)\n\
         }\n\
         fn b() -> u32 {\n\
         \x20   value.unwrap()\n\
         }\n\
         fn c() -> u32 {\n\
         \x20   value.expect(\"set\")\n\
         }\n\
         #[test]\n\
         fn d() {\n\
         \x20   value.unwrap();\n\
         }\n",
    );

    let lines: Vec<usize> = find_unwrap_violations(&source)
        .iter()
        .map(|violation| violation.line)
        .collect();
    assert_eq!(lines, vec![5, 8]);
}
