//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the capture crates MUST NOT call sleep methods.
//! Waiting happens on I/O, channels, or notifications (`Notify`, `watch`).
//! **Exceptions**: test code, periodic tasks driven by `tokio::time::interval`

use architectural_enforcement::{is_in_test_function, production_sources, scan_production};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_production(|lines, idx, code| {
        let sleeps = code.contains("::sleep(") || code.contains(".sleep(");
        if !sleeps || is_in_test_function(lines, idx) || is_interval_pattern(lines, idx) {
            return None;
        }
        Some("Sleep call")
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops (wait on a channel or Notify)");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to simulate latency in test doubles (gate on a watch channel)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Guard against the scan silently finding nothing
#[test]
fn test_production_sources_are_found() {
    let sources = production_sources();
    assert!(
        sources
            .iter()
            .any(|s| s.path.ends_with("capture/core/src/lib.rs")),
        "capture-core sources not found; workspace layout changed?"
    );
    assert!(sources
        .iter()
        .any(|s| s.path.ends_with("capture/probe/src/main.rs")));
}

/// Check if this is tokio::time::interval pattern (acceptable for periodic tasks)
fn is_interval_pattern(lines: &[String], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(20);
    let end = std::cmp::min(current_idx + 5, lines.len());

    lines[start..end]
        .iter()
        .any(|line| line.contains("interval.tick()") || line.contains("tokio::time::interval"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_detection() {
        let code: Vec<String> = [
            "async fn refresh() {",
            "    let mut interval = tokio::time::interval(Duration::from_secs(1));",
            "    loop {",
            "        interval.tick().await;",
            "    }",
            "}",
        ]
        .iter()
        .map(|l| (*l).to_string())
        .collect();

        assert!(is_interval_pattern(&code, 3));
    }
}
