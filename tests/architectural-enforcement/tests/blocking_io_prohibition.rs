//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Code running on the runtime MUST NOT block. Inside `async fn`
//! bodies and `async` blocks use `tokio::fs`, `tokio::net` and `tokio::io`.
//! **Acceptable**: blocking calls in plain functions (config loading, PID
//! file handling, socket file cleanup) and test code.

use architectural_enforcement::{assert_clean, scan, CodeLine};

const BLOCKING_PATTERNS: &[&str] = &[
    "std::fs::",
    "std::net::",
    "std::io::stdin()",
    "std::io::stdout()",
    "std::process::Command",
    "block_on(",
    "blocking_recv(",
    "blocking_send(",
];

fn is_blocking_in_async(line: &CodeLine) -> bool {
    line.in_async
        && BLOCKING_PATTERNS
            .iter()
            .any(|pattern| line.code.contains(pattern))
}

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(is_blocking_in_async, &[]);
    if !violations.is_empty() {
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs, tokio::net::TcpStream, tokio::io::AsyncRead");
        eprintln!("  - Move blocking setup into a plain fn called before or outside the loop");
    }
    assert_clean("blocking I/O", &violations);
}

#[test]
fn test_blocking_detector_respects_context() {
    let line = |code: &str, in_async| CodeLine {
        number: 1,
        code: code.to_string(),
        in_async,
    };
    assert!(is_blocking_in_async(&line("std::fs::read_to_string(p)?;", true)));
    assert!(!is_blocking_in_async(&line("std::fs::read_to_string(p)?;", false)));
    assert!(!is_blocking_in_async(&line("tokio::fs::read(p).await?;", true)));
}
