//! Configuration loading tests against explicit environment maps.

use config::{Environment, Map};
use finbert_collector::config::CollectorConfig;
use finbert_collector::error::CollectorError;

fn env_from(pairs: &[(&str, &str)]) -> Environment {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert((*key).to_string(), (*value).to_string());
    }
    Environment::default().source(Some(map))
}

#[test]
fn test_full_environment_mapping() {
    let config = CollectorConfig::from_source(env_from(&[
        ("REDDIT_CLIENT_ID", "client"),
        ("REDDIT_CLIENT_SECRET", "secret"),
        ("REDDIT_USER_AGENT", "custom-agent/2.0"),
        ("SUBREDDITS", "stocks,investing"),
        ("FETCH_LIMIT", "25"),
        ("OUTPUT_PATH", "/tmp/out.csv"),
        ("RUN_ID", "manual_run"),
        ("DEDUP_DB_PATH", "/tmp/dupes.db"),
        ("DEDUP_CAPACITY", "5000"),
        ("ENABLE_SENTIMENT", "false"),
        ("FINBERT_MODEL", "other/model"),
        ("SENTIMENT_BATCH_SIZE", "16"),
        ("ENABLE_METRICS", "false"),
        ("METRICS_PORT", "9100"),
        ("DEADLINE", "120"),
        ("SOURCE_TIMEOUT_SECS", "10"),
        ("REQUEST_DELAY_MS", "250"),
        ("RATE_LIMIT_MAX_SLEEP_SECS", "30"),
        ("SENTIMENT_MAX_CHARS", "200"),
    ]))
    .expect("load config");

    assert_eq!(config.reddit_user_agent, "custom-agent/2.0");
    assert_eq!(config.communities(), vec!["stocks", "investing"]);
    assert_eq!(config.fetch_limit, 25);
    assert_eq!(config.output_path.to_str(), Some("/tmp/out.csv"));
    assert_eq!(config.run_id, "manual_run");
    assert_eq!(config.dedup_capacity, 5000);
    assert!(!config.enable_sentiment);
    assert_eq!(config.finbert_model, "other/model");
    assert_eq!(config.sentiment_batch_size, 16);
    assert!(!config.enable_metrics);
    assert_eq!(config.metrics_port, 9100);
    assert_eq!(config.run_deadline().as_secs(), 120);
    assert_eq!(config.source_timeout().as_secs(), 10);
    assert_eq!(config.request_delay().as_millis(), 250);
    assert_eq!(config.rate_limit_max_sleep().as_secs(), 30);
    assert_eq!(config.sentiment_max_chars, 200);
}

#[test]
fn test_unrecognized_keys_are_ignored() {
    let config = CollectorConfig::from_source(env_from(&[
        ("REDDIT_CLIENT_ID", "client"),
        ("REDDIT_CLIENT_SECRET", "secret"),
        ("SOME_UNRELATED_KEY", "whatever"),
        ("PATH", "/usr/bin"),
    ]))
    .expect("load config");
    assert_eq!(config.fetch_limit, 100);
}

#[test]
fn test_missing_client_secret_is_exit_code_2() {
    let err =
        CollectorConfig::from_source(env_from(&[("REDDIT_CLIENT_ID", "client")])).unwrap_err();
    assert!(matches!(err, CollectorError::Config(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_empty_community_list_rejected() {
    let err = CollectorConfig::from_source(env_from(&[
        ("REDDIT_CLIENT_ID", "client"),
        ("REDDIT_CLIENT_SECRET", "secret"),
        ("SUBREDDITS", " , ,"),
    ]))
    .unwrap_err();
    assert!(matches!(err, CollectorError::Config(_)));
}

#[test]
fn test_zero_batch_size_rejected() {
    let err = CollectorConfig::from_source(env_from(&[
        ("REDDIT_CLIENT_ID", "client"),
        ("REDDIT_CLIENT_SECRET", "secret"),
        ("SENTIMENT_BATCH_SIZE", "0"),
    ]))
    .unwrap_err();
    assert!(matches!(err, CollectorError::Config(_)));
}
