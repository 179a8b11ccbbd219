//! Config module tests

use std::time::Duration;

use crate::config::{Config, QueueConfig};

#[test]
fn test_config_default() {
    let config = Config::default();

    // Queue defaults
    assert_eq!(config.queue.max_concurrent, 1);
    assert_eq!(config.queue.max_attempts, 10);
    assert_eq!(config.queue.base_backoff_ms, 5_000);
    assert_eq!(config.queue.max_backoff_ms, 60_000);
    assert_eq!(config.queue.max_jitter_ms, 2_000);
    assert_eq!(config.queue.start_stagger_ms, 300);

    // Provider defaults
    assert_eq!(config.gemini.image_model, "gemini-2.5-flash-image");
    assert_eq!(config.gemini.high_quality_model, "gemini-3-pro-image-preview");
    assert_eq!(config.gemini.video_model, "veo-3.1-fast-generate-preview");
    assert_eq!(config.seedream.base_url, "https://api.kie.ai/api/v1");
    assert_eq!(config.seedream.max_polls, 20);
    assert_eq!(config.photoroom.endpoint, "https://sdk.photoroom.com/v1/segment");

    assert_eq!(config.export.archive_prefix, "NC-Tool-Export");
    assert!(config.validate().is_ok());
}

#[test]
fn test_retry_policy_from_queue_config() {
    let policy = QueueConfig::default().retry_policy();
    assert_eq!(policy.max_attempts, 10);
    assert_eq!(policy.base_delay, Duration::from_secs(5));
    assert_eq!(policy.max_delay, Duration::from_secs(60));
    assert_eq!(policy.max_jitter, Duration::from_secs(2));
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config: Config = toml::from_str(
        r#"
        [queue]
        max_concurrent = 3

        [seedream]
        base_url = "https://proxy.example.com/api/v1"
        "#,
    )
    .unwrap();

    assert_eq!(config.queue.max_concurrent, 3);
    assert_eq!(config.queue.max_attempts, 10);
    assert_eq!(config.seedream.base_url, "https://proxy.example.com/api/v1");
    assert_eq!(config.seedream.quality, "basic");
    assert_eq!(config.gemini.timeout_secs, 120);
}

#[test]
fn test_toml_roundtrip_keeps_changes() {
    let mut config = Config::default();
    config.set("queue.max_concurrent", "4").unwrap();
    config.set("export.archive_prefix", "Batch").unwrap();

    let serialized = toml::to_string_pretty(&config).unwrap();
    let parsed: Config = toml::from_str(&serialized).unwrap();
    assert_eq!(parsed.queue.max_concurrent, 4);
    assert_eq!(parsed.export.archive_prefix, "Batch");
}

#[test]
fn test_get_known_keys() {
    let config = Config::default();
    assert_eq!(config.get("queue.max_attempts").unwrap(), "10");
    assert_eq!(
        config.get("gemini.base_url").unwrap(),
        "https://generativelanguage.googleapis.com/v1beta"
    );
}

#[test]
fn test_get_unknown_key() {
    let config = Config::default();
    let err = config.get("queue.nope").unwrap_err();
    assert!(err.to_string().contains("Unknown configuration key"));
}

#[test]
fn test_set_rejects_api_keys() {
    let mut config = Config::default();
    let err = config.set("gemini.api_keys", "abc").unwrap_err();
    assert!(err.to_string().contains("MEDIAQUEUE_GEMINI_API_KEYS"));
    let err = config.set("photoroom.api_key", "abc").unwrap_err();
    assert!(err.to_string().contains("cannot be stored"));
}

#[test]
fn test_set_validates_values() {
    let mut config = Config::default();
    assert!(config.set("queue.max_concurrent", "0").is_err());
    assert!(config.set("queue.max_attempts", "ten").is_err());
    assert!(config.set("photoroom.endpoint", "ftp://example.com").is_err());
    assert!(config.set("export.archive_prefix", "  ").is_err());

    // base above max is rejected by validation
    assert!(config.set("queue.base_backoff_ms", "120000").is_err());
}

#[test]
fn test_zero_request_timeouts_rejected() {
    for key in ["gemini.timeout_secs", "seedream.timeout_secs", "photoroom.timeout_secs"] {
        let mut config = Config::default();
        let err = config.set(key, "0").unwrap_err();
        assert!(err.to_string().contains(key));
        assert!(config.set(key, "30").is_ok());
    }

    let mut config = Config::default();
    config.photoroom.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_set_url_trims_trailing_slash() {
    let mut config = Config::default();
    config.set("seedream.base_url", "https://api.kie.ai/api/v1/").unwrap();
    assert_eq!(config.seedream.base_url, "https://api.kie.ai/api/v1");
}

#[test]
fn test_list_contains_every_key() {
    let config = Config::default();
    let entries = config.list().unwrap();
    assert_eq!(entries.len(), 22);
    assert_eq!(entries[0], ("queue.max_concurrent".to_string(), "1".to_string()));
    assert!(entries.iter().all(|(key, _)| config.get(key).is_ok()));
    assert!(!entries.iter().any(|(key, _)| key.contains("api_key")));
}
