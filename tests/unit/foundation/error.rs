use std::time::Duration;

use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        HeadlessError::config("x")
            .to_string()
            .contains("config error:")
    );
    assert!(
        HeadlessError::browser_launch("x")
            .to_string()
            .contains("browser launch error:")
    );
    assert!(
        HeadlessError::server_start("x")
            .to_string()
            .contains("server start error:")
    );
    assert!(
        HeadlessError::page_crash("x")
            .to_string()
            .contains("page crash error:")
    );
    assert!(
        HeadlessError::timeout("readiness", Duration::from_millis(250))
            .to_string()
            .contains("timeout error: readiness did not complete within 250ms")
    );
    assert!(
        HeadlessError::invalid_composition("intro", "width must be positive")
            .to_string()
            .contains("composition 'intro'")
    );
}

#[test]
fn script_error_carries_frame_context() {
    let err = HeadlessError::script("boom").at_frame(Some(12));
    assert_eq!(err.to_string(), "script error at frame 12: boom");

    let no_frame = HeadlessError::script("boom").at_frame(None);
    assert_eq!(no_frame.to_string(), "script error: boom");
}

#[test]
fn at_frame_leaves_other_variants_untouched() {
    let err = HeadlessError::page_crash("gone").at_frame(Some(3));
    assert!(matches!(err, HeadlessError::PageCrash(_)));
}

#[test]
fn crashes_and_bad_config_are_not_retried() {
    assert!(!HeadlessError::page_crash("x").is_retryable_injection());
    assert!(!HeadlessError::config("x").is_retryable_injection());
    assert!(HeadlessError::script("x").is_retryable_injection());
    assert!(
        HeadlessError::timeout("navigation", Duration::from_secs(1)).is_retryable_injection()
    );
}

#[test]
fn cleanup_keeps_root_cause() {
    let err = HeadlessError::Cleanup {
        primary: Some(Box::new(HeadlessError::timeout(
            "readiness",
            Duration::from_millis(10),
        ))),
        failures: vec![HeadlessError::page_crash("close failed")],
    };
    assert!(matches!(err.root_cause(), HeadlessError::Timeout { .. }));
    let msg = err.to_string();
    assert!(msg.contains("readiness"));
    assert!(msg.contains("close failed"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = HeadlessError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
