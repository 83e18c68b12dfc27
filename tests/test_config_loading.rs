//! Tests for configuration loading
//!
//! Covers reading TOML files from disk, section defaults, and the values
//! handed to the channel and adapter.

use moodfeed::config::{ConfigError, FeedConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_full_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[endpoint]
api_origin = "https://api.example.com"
secure = true

[session]
subject_id = "user-42"

[connection]
connect_timeout_secs = 5

[heartbeat]
probe_interval_secs = 20
check_interval_secs = 5
stale_after_secs = 30

[reconnect]
base_interval_ms = 1000
growth_factor = 2.0
max_delay_ms = 8000
max_attempts = 3

[adapter]
retry_delay_ms = 1500
"#
    )
    .unwrap();

    let config = FeedConfig::load_from_file(file.path()).unwrap();

    let channel = config.channel_config();
    assert_eq!(channel.connect_timeout, Duration::from_secs(5));
    assert_eq!(channel.heartbeat.stale_after, Duration::from_secs(30));
    assert_eq!(channel.reconnect.max_attempts, Some(3));
    assert_eq!(
        channel.reconnect.calculate_backoff_delay(3),
        Duration::from_millis(8000)
    );
    assert_eq!(config.retry_delay(), Duration::from_millis(1500));

    let identity = config.endpoint_config().identity_for("user-42").unwrap();
    assert_eq!(identity.as_str(), "wss://api.example.com/ws/user-42");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[endpoint]\npage_host = \"localhost:8000\"").unwrap();

    let config = FeedConfig::load_from_file(file.path()).unwrap();
    let channel = config.channel_config();

    assert_eq!(channel.connect_timeout, Duration::from_secs(10));
    assert_eq!(channel.heartbeat.probe_interval, Duration::from_secs(30));
    assert_eq!(channel.heartbeat.check_interval, Duration::from_secs(10));
    assert_eq!(channel.heartbeat.stale_after, Duration::from_secs(45));
    assert_eq!(channel.reconnect.base_interval, Duration::from_millis(3000));
    assert_eq!(channel.reconnect.max_delay, Duration::from_millis(30000));
    assert_eq!(channel.reconnect.max_attempts, Some(5));
    assert_eq!(config.retry_delay(), Duration::from_millis(3000));
}

#[test]
fn test_retry_forever_removes_cap() {
    let config = FeedConfig::parse(
        r#"
[endpoint]
page_host = "localhost:8000"

[reconnect]
retry_forever = true
"#,
    )
    .unwrap();

    assert_eq!(config.reconnect_config().max_attempts, None);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_endpoint_section_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[session]\nsubject_id = \"user-42\"").unwrap();

    let result = FeedConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        "[endpoint]\n[heartbeat]\ncheck_interval_secs = 60",
        "[endpoint]\n[heartbeat]\nprobe_interval_secs = 60\nstale_after_secs = 45",
        "[endpoint]\n[reconnect]\ngrowth_factor = 0.5",
        "[endpoint]\n[reconnect]\nmax_attempts = 0",
        "[endpoint]\n[connection]\nconnect_timeout_secs = 0",
        "[endpoint]\n[adapter]\nretry_delay_ms = 0",
    ];

    for toml in cases {
        let config = FeedConfig::parse(toml).unwrap();
        assert!(
            matches!(config.validate(), Err(ConfigError::InvalidConfig(_))),
            "expected rejection for {toml:?}"
        );
    }
}

#[test]
fn test_bad_subject_id_is_rejected() {
    let config = FeedConfig::parse(
        r#"
[endpoint]
page_host = "localhost:8000"

[session]
subject_id = "../admin"
"#,
    )
    .unwrap();

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidSubjectId(_))
    ));
}

#[test]
fn test_env_override_replaces_subject() {
    let mut config = FeedConfig::for_host("localhost:8000", false);
    config.apply_env_overrides(|name| match name {
        "MOODFEED_SUBJECT_ID" => Some(" user-7 ".to_string()),
        _ => None,
    });

    assert_eq!(config.session.subject_id.as_deref(), Some("user-7"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_read_error() {
    let result = FeedConfig::load_from_file(std::path::Path::new("/nonexistent/moodfeed.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_probe_slower_than_stale_deadline_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[endpoint]
page_host = "localhost:8000"

[heartbeat]
probe_interval_secs = 60
check_interval_secs = 10
stale_after_secs = 45
"#
    )
    .unwrap();

    let result = FeedConfig::load_from_file(file.path());
    assert!(matches!(
        result,
        Err(ConfigError::InvalidConfig(message)) if message.contains("probe_interval")
    ));
}
