//! Integration Test: No Panicking Shortcuts
//!
//! **Policy**: Production code propagates errors with `?` or logs and carries
//! on. `unwrap()`, `expect()` and `panic!` belong in tests only, because a
//! panic in the session task would freeze the face.

use architectural_enforcement::{assert_clean, scan, CodeLine};

fn is_panicking(line: &CodeLine) -> bool {
    let code = &line.code;
    code.contains(".unwrap()")
        || code.contains(".expect(")
        || code.contains("panic!(")
        || code.contains("unreachable!(")
        || code.contains("todo!(")
        || code.contains("unimplemented!(")
}

#[test]
fn test_no_unwrap_in_production_code() {
    assert_clean("panic", &scan(is_panicking, &[]));
}

#[test]
fn test_panic_detector_matches() {
    let line = |code: &str| CodeLine {
        number: 1,
        code: code.to_string(),
        in_async: false,
    };
    assert!(is_panicking(&line("let x = y.unwrap();")));
    assert!(is_panicking(&line("let x = y.expect(\"y\");")));
    assert!(!is_panicking(&line("let x = y.unwrap_or_default();")));
    assert!(!is_panicking(&line("let x = y.unwrap_or_else(f);")));
}
