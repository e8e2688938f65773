//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the shell crates MUST NOT call sleep methods.
//! Pending requests wait on their reply, the peer's destroyed signal and a
//! timeout; nothing polls.
//!
//! **Exceptions**: test code (`#[test]`, `#[tokio::test]`, `#[cfg(test)]`)

use architectural_enforcement::{production_sources, report, SourceFile, Violation};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<Violation> = production_sources()
        .iter()
        .flat_map(find_sleep_violations)
        .collect();

    report(
        "CRITICAL: Sleep calls found in production code!",
        &violations,
        &[
            "✅ ACCEPTABLE: sleeping in tests on a paused clock",
            "❌ FORBIDDEN: sleep in polling loops or as synchronization",
            "   Use tokio::time::timeout, watch channels or oneshot replies instead",
        ],
    );
}

fn find_sleep_violations(source: &SourceFile) -> Vec<Violation> {
    source
        .production_code()
        .filter(|(_, code)| is_sleep_call(code))
        .map(|(idx, _)| source.violation(idx, "Sleep call"))
        .collect()
}

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

#[test]
fn test_sleep_detection() {
    let source = SourceFile::parse(
        std::path::Path::new("mem.rs"),
        "async fn poll() {\n\
         \x20   tokio::time::sleep(Duration::from_millis(10)).await;\n\
         }\n\
         // std::thread::sleep(d) in a comment\n\
         #[cfg(test)]\n\
         mod tests {\n\
         \x20   #[tokio::test(start_paused = true)]\n\
         \x20   async fn waits() {\n\
         \x20       tokio::time::sleep(Duration::from_secs(40)).await;\n\
         \x20   }\n\
         }\n",
    );

    let violations = find_sleep_violations(&source);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, 2);
}
