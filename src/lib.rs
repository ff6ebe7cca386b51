pub mod collector;
pub mod config;
pub mod dedup;
pub mod error;
pub mod finbert;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod sentiment;
pub mod server;
pub mod sink;
pub mod source;

// Re-export key components for easier access
pub use collector::Collector;
pub use config::CollectorConfig;
pub use dedup::SeenStore;
pub use error::{CollectorError, Result};
pub use models::{EnrichedRecord, SentimentLabel, SentimentResult, Submission};
pub use sentiment::SentimentAnalyzer;
