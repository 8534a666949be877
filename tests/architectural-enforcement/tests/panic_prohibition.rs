//! Integration Test: Panic Prohibition
//!
//! **Policy**: Capture is an observability feature; it must never take the
//! host process down. Production code propagates errors with `?` or degrades
//! silently, and never calls `unwrap()`, `expect()` or `panic!()`.
//! **Exceptions**: test code (`#[cfg(test)]` modules and `tests/`)

use architectural_enforcement::scan_production;

const FORBIDDEN: &[(&str, &str)] = &[
    (".unwrap()", "unwrap() in production code"),
    (".expect(", "expect() in production code"),
    ("panic!(", "panic!() in production code"),
    ("todo!(", "todo!() in production code"),
    ("unimplemented!(", "unimplemented!() in production code"),
];

#[test]
fn test_no_panics_in_production_code() {
    let violations = scan_production(|_, _, code| {
        FORBIDDEN
            .iter()
            .find(|(pattern, _)| code.contains(pattern))
            .map(|(_, reason)| *reason)
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Panicking calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ Use instead:");
        eprintln!("  - `?` with a thiserror variant (library) or anyhow context (binary)");
        eprintln!("  - unwrap_or / unwrap_or_else / unwrap_or_default for real fallbacks");

        panic!(
            "\nFound {} panic violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
