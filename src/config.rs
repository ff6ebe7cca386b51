use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::{CollectorError, Result};

/// Tier A false-positive rate. Tier B confirms every maybe-hit, so this
/// only trades memory against confirmation lookups.
pub const DEDUP_FALSE_POSITIVE_RATE: f64 = 0.001;

/// Immutable run configuration, read once from the process environment.
///
/// Field names map one-to-one to the environment keys (`REDDIT_CLIENT_ID`
/// becomes `reddit_client_id`, and so on). Unrecognized keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    /// Comma-separated community list
    pub subreddits: String,
    pub fetch_limit: u32,
    pub output_path: PathBuf,
    /// Empty string means generate one per run
    pub run_id: String,
    pub dedup_db_path: PathBuf,
    pub dedup_capacity: usize,
    pub enable_sentiment: bool,
    pub finbert_model: String,
    pub sentiment_batch_size: usize,
    pub sentiment_max_chars: usize,
    pub enable_metrics: bool,
    pub metrics_port: u16,
    /// Top-level run deadline in seconds
    pub deadline: u64,
    pub source_timeout_secs: u64,
    pub request_delay_ms: u64,
    pub rate_limit_max_sleep_secs: u64,
}

impl CollectorConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_source(Environment::default())
    }

    /// Load configuration from an explicit environment source. Exposed so
    /// tests can supply a key/value map instead of mutating process env.
    pub fn from_source(env: Environment) -> Result<Self> {
        let config = Self::builder()
            .add_source(env)
            .build()
            .map_err(|e| CollectorError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| CollectorError::Config(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        // Defaults for everything except the required credentials; a
        // missing credential surfaces as a deserialization error.
        Config::builder()
            .set_default("reddit_user_agent", "finbert-ci/0.1")
            .and_then(|b| b.set_default("subreddits", "CryptoCurrency,Bitcoin,ethereum"))
            .and_then(|b| b.set_default("fetch_limit", 100))
            .and_then(|b| b.set_default("output_path", "/data/reddit_sentiment.csv"))
            .and_then(|b| b.set_default("run_id", ""))
            .and_then(|b| b.set_default("dedup_db_path", "/data/dupes.db"))
            .and_then(|b| b.set_default("dedup_capacity", 100_000))
            .and_then(|b| b.set_default("enable_sentiment", true))
            .and_then(|b| b.set_default("finbert_model", "ProsusAI/finbert"))
            .and_then(|b| b.set_default("sentiment_batch_size", 8))
            .and_then(|b| b.set_default("sentiment_max_chars", 400))
            .and_then(|b| b.set_default("enable_metrics", true))
            .and_then(|b| b.set_default("metrics_port", 8000))
            .and_then(|b| b.set_default("deadline", 3600))
            .and_then(|b| b.set_default("source_timeout_secs", 30))
            .and_then(|b| b.set_default("request_delay_ms", 0))
            .and_then(|b| b.set_default("rate_limit_max_sleep_secs", 60))
            .expect("static defaults are valid")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.reddit_client_id.trim().is_empty() {
            return Err(CollectorError::config("REDDIT_CLIENT_ID must not be empty"));
        }
        if self.reddit_client_secret.trim().is_empty() {
            return Err(CollectorError::config(
                "REDDIT_CLIENT_SECRET must not be empty",
            ));
        }
        if self.communities().is_empty() {
            return Err(CollectorError::config(
                "SUBREDDITS must name at least one community",
            ));
        }
        if self.fetch_limit == 0 {
            return Err(CollectorError::config("FETCH_LIMIT must be greater than 0"));
        }
        if self.dedup_capacity == 0 {
            return Err(CollectorError::config(
                "DEDUP_CAPACITY must be greater than 0",
            ));
        }
        if self.sentiment_batch_size == 0 {
            return Err(CollectorError::config(
                "SENTIMENT_BATCH_SIZE must be greater than 0",
            ));
        }
        if self.sentiment_max_chars == 0 {
            return Err(CollectorError::config(
                "SENTIMENT_MAX_CHARS must be greater than 0",
            ));
        }
        if self.deadline == 0 {
            return Err(CollectorError::config("DEADLINE must be greater than 0"));
        }

        Ok(())
    }

    /// Communities to fetch, in configured order.
    #[must_use]
    pub fn communities(&self) -> Vec<String> {
        self.subreddits
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    #[must_use]
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.deadline)
    }

    #[must_use]
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    #[must_use]
    pub fn rate_limit_max_sleep(&self) -> Duration {
        Duration::from_secs(self.rate_limit_max_sleep_secs)
    }
}
