//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{redact_if_sensitive, strip_path, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.redact_secrets);
    assert!(config.filter.is_none());
    assert!(config.logger_sink.is_none());

    #[cfg(debug_assertions)]
    assert_eq!(config.format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(config.format, LogFormat::Json);
}

#[test]
fn test_secret_fields_are_redacted() {
    assert_eq!(redact_if_sensitive("api_key", "AIzaSy-123"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("client_secret", "s3cr3t"), "[REDACTED]");
}

#[test]
fn test_api_key_query_parameter_is_masked() {
    let url = "https://firestore.googleapis.com/v1/projects/p/databases/(default)/documents/stories?pageSize=300&key=AIzaSy-123";
    let redacted = redact_if_sensitive("url", url);

    assert!(!redacted.contains("AIzaSy-123"));
    assert!(redacted.ends_with("pageSize=300&key=[REDACTED]"));
}

#[test]
fn test_content_fields_pass_through() {
    assert_eq!(redact_if_sensitive("document_id", "story-42"), "story-42");
    assert_eq!(redact_if_sensitive("kind", "track"), "track");
    assert_eq!(
        redact_if_sensitive("asset_path", "stories/moon.mp3"),
        "stories/moon.mp3"
    );
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/data/nightlight/downloads/story-1.mp3"), "story-1.mp3");
    assert_eq!(strip_path("C:\\Users\\Ann\\nightlight\\track-7.mp3"), "track-7.mp3");
    assert_eq!(strip_path("track-7.mp3"), "track-7.mp3");
    assert_eq!(strip_path("/var/log/"), "");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_secret_redaction(false)
        .with_filter("core_sync=trace")
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_secrets);
    assert_eq!(config.filter.as_deref(), Some("core_sync=trace"));
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
