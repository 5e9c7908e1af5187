//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. Timers wait on their next
//! deadline (`sleep_until` on the earliest armed timer); nothing polls.
//! **Exceptions**: the `face-send` test client, which paces its output on
//! purpose, and test code.

use architectural_enforcement::{assert_clean, scan, CodeLine};

/// Files allowed to call `tokio::time::sleep`
const PACING_CLIENTS: &[&str] = &["src/bin/face-send.rs"];

fn is_thread_sleep(line: &CodeLine) -> bool {
    line.code.contains("thread::sleep(")
}

fn is_async_sleep(line: &CodeLine) -> bool {
    let code = &line.code;
    code.contains("time::sleep(") || code.contains(" sleep(") || code.contains(".sleep(")
}

#[test]
fn test_no_thread_sleep_anywhere() {
    assert_clean("thread::sleep", &scan(is_thread_sleep, &[]));
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(is_async_sleep, PACING_CLIENTS);
    if !violations.is_empty() {
        eprintln!("\n✅ ACCEPTABLE waits:");
        eprintln!("  - sleep_until(next_deadline) in the session task");
        eprintln!("  - Test code (#[cfg(test)] modules and tests/)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
    }
    assert_clean("sleep", &violations);
}

#[test]
fn test_sleep_detector_matches() {
    let line = |code: &str| CodeLine {
        number: 1,
        code: code.to_string(),
        in_async: true,
    };
    assert!(is_async_sleep(&line("    tokio::time::sleep(d).await;")));
    assert!(is_thread_sleep(&line("std::thread::sleep(d);")));
    assert!(!is_async_sleep(&line("Some(deadline) => sleep_until(deadline).await,")));
}
