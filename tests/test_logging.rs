//! Tests for logging configuration and for what the supervisor reports
//!
//! Supervisor output is captured with a scoped `tracing` subscriber writing
//! into a shared buffer.

mod test_helpers;

use linkkeeper::observability::logging::LogFormat;
use std::io::Write;
use std::sync::{Arc, Mutex};
use test_helpers::Harness;
use tracing::Level;

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run `body` with INFO-level output captured
fn capture<F: FnOnce()>(body: F) -> String {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, body);
    logs.contents()
}

#[test]
fn test_log_format_parse() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("Compact"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_whitespace() {
    assert!(matches!(LogFormat::parse("  json  "), LogFormat::Json));
    assert!(matches!(LogFormat::parse("pretty\n"), LogFormat::Pretty));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    assert!(matches!(LogFormat::parse("xml"), LogFormat::Compact));
    assert!(matches!(LogFormat::parse(""), LogFormat::Compact));
}

#[test]
fn test_link_events_suppressed_without_debug_messages() {
    let output = capture(|| {
        let mut harness = Harness::new();
        harness.connect();
        harness.link.subscribe("a/b", |_| {}).unwrap();
    });

    assert!(!output.contains("Subscribed to [a/b]"), "unexpected output: {output}");
    assert!(!output.contains("Session established"));
}

#[test]
fn test_link_events_reported_with_debug_messages() {
    let output = capture(|| {
        let mut harness = Harness::new();
        harness.link.enable_debugging_messages(true);
        harness.connect();
        harness.link.subscribe("a/b", |_| {}).unwrap();
        harness.session.push_message("a/b", "hello");
        harness.link.tick();
        harness.link.publish("a/c", "world", false).unwrap();
    });

    assert!(output.contains("Network connected"), "missing output: {output}");
    assert!(output.contains("Session: connecting as \"test-device\""));
    assert!(output.contains("Subscribed to [a/b]"));
    assert!(output.contains(">> [a/b] hello"));
    assert!(output.contains("<< [a/c] world"));
}

#[test]
fn test_failures_reported_regardless_of_debug_switch() {
    let output = capture(|| {
        let mut harness = Harness::new();
        harness.connect();
        harness.link.subscribe("a/b", |_| {}).unwrap();
        let _ = harness.link.subscribe("a/b", |_| {});
        let _ = harness.link.unsubscribe("x/y");
        harness.session.set_active(false);
        harness.link.tick();
    });

    assert!(output.contains("WARN"), "missing output: {output}");
    assert!(output.contains("Subscribed to [a/b] already, ignored"));
    assert!(output.contains("Topic [x/y] cannot be found to unsubscribe, ignored"));
    assert!(output.contains("Session lost"));
}

#[test]
fn test_failed_session_attempt_reports_reason_and_retry_delay() {
    let output = capture(|| {
        let mut harness = Harness::new();
        harness.session.set_accept_connect(false);
        harness
            .session
            .set_error_code(linkkeeper::SessionErrorCode::BadCredentials);
        harness.network.set_associated(true);
        harness.link.tick();
        harness.link.tick();
    });

    assert!(output.contains("MQTT_CONNECT_BAD_CREDENTIALS"), "missing output: {output}");
    assert!(output.contains("retrying in 30 seconds"));
}
