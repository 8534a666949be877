//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the capture crates MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::net`, `tokio::process`, not `std::fs`, `std::net`, `std::process`
//!
//! Blocking calls are acceptable in non-async functions, such as configuration
//! loading before the transport is built.

use architectural_enforcement::{enclosing_fn, is_in_test_function, scan_production, FnKind};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan_production(|lines, idx, code| {
        if is_in_test_function(lines, idx) {
            return None;
        }

        // Always wrong, regardless of context
        if code.contains("reqwest::blocking") {
            return Some("Blocking HTTP client");
        }

        if enclosing_fn(lines, idx) != Some(FnKind::Async) {
            return None;
        }

        if code.contains("std::fs::") {
            Some("Blocking file I/O")
        } else if code.contains("std::net::") {
            Some("Blocking network I/O")
        } else if code.contains("std::process::Command") {
            Some("Blocking process I/O")
        } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
            Some("Blocking stdin/stdout in async")
        } else {
            None
        }
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN in async functions:");
        eprintln!("  - std::fs::read(), std::fs::write(), std::fs::File");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::process::Command::output()");
        eprintln!("  - reqwest::blocking::* (anywhere)");
        eprintln!("\n✅ ACCEPTABLE blocking I/O:");
        eprintln!("  - Non-async functions (config loading before the runtime needs it)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s).\nFix these before merging!",
            violations.len()
        );
    }
}
