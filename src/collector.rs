//! Single-shot pipeline orchestrator.
//!
//! One `run` fetches every configured community, filters already-seen ids,
//! classifies the survivors in batches, and commits records one at a time:
//! sink row first, seen-id second, counters last. Recurrence belongs to the
//! external invoker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::dedup::SeenStore;
use crate::error::{CollectorError, Result};
use crate::logging::OperationTimer;
use crate::metrics::METRICS;
use crate::models::{RunSummary, Submission};
use crate::sentiment::SentimentAnalyzer;
use crate::sink::{CsvSink, RecordSink};
use crate::source::{RedditClient, SubmissionSource};

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Timestamp-based run identifier, strictly increasing within a process.
fn generate_run_id() -> String {
    let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    if seq == 0 {
        stamp.to_string()
    } else {
        format!("{stamp}_{seq}")
    }
}

/// One pipeline invocation. Durable state lives only in the dedup store
/// and the sink; the collector itself is stateless across runs.
pub struct Collector<S, K> {
    config: CollectorConfig,
    run_id: String,
    source: S,
    dedup: SeenStore,
    analyzer: SentimentAnalyzer,
    sink: K,
}

impl Collector<RedditClient, CsvSink> {
    /// Wire up the production pipeline in the startup order the exit codes
    /// are defined over: dedup store, classifier, source, sink.
    pub async fn init(config: CollectorConfig) -> Result<Self> {
        let run_id = if config.run_id.is_empty() {
            generate_run_id()
        } else {
            config.run_id.clone()
        };
        info!(run_id = %run_id, communities = ?config.communities(), "initializing pipeline");

        let dedup = SeenStore::open(&config.dedup_db_path, config.dedup_capacity)?;
        let analyzer = SentimentAnalyzer::from_config(&config)?;
        let source = RedditClient::connect(&config).await?;
        let sink = CsvSink::open(&config.output_path)?;

        Ok(Self::assemble(config, run_id, source, dedup, analyzer, sink))
    }
}

impl<S: SubmissionSource + Send, K: RecordSink> Collector<S, K> {
    /// Assemble a collector from explicit parts.
    pub fn assemble(
        config: CollectorConfig,
        run_id: String,
        source: S,
        dedup: SeenStore,
        analyzer: SentimentAnalyzer,
        sink: K,
    ) -> Self {
        Self {
            config,
            run_id,
            source,
            dedup,
            analyzer,
            sink,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Execute one run to completion.
    pub async fn run(mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let deadline = self.config.run_deadline();
        let limit = self.config.fetch_limit;

        METRICS.record_memory_usage();

        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            ..RunSummary::default()
        };
        let mut pending: Vec<Submission> = Vec::new();
        let mut deadline_hit = false;

        let fetch_timer = OperationTimer::new("fetch_and_filter");
        for community in self.config.communities() {
            let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                deadline_hit = true;
                break;
            };

            let max_sleep = self.config.rate_limit_max_sleep();
            let fetched = match timeout(
                remaining,
                fetch_with_retry(&mut self.source, &community, limit, max_sleep),
            )
            .await
            {
                Err(_) => {
                    warn!(community = %community, "run deadline reached during fetch");
                    deadline_hit = true;
                    break;
                }
                Ok(Ok(submissions)) => submissions,
                Ok(Err(e)) => {
                    METRICS.record_error(&e);
                    summary.errors += 1;
                    if matches!(e, CollectorError::SourceAuth(_)) {
                        return self.abort(e, started);
                    }
                    warn!(community = %community, error = %e, "community skipped");
                    continue;
                }
            };

            METRICS.record_posts_fetched(&community, fetched.len() as u64);
            summary.fetched += fetched.len() as u64;
            info!(community = %community, count = fetched.len(), "fetched submissions");

            for submission in fetched {
                match self.dedup.seen(&submission.id) {
                    Ok(true) => {
                        METRICS.record_post_deduplicated();
                        summary.deduplicated += 1;
                    }
                    Ok(false) => pending.push(submission),
                    // A read failure risks emitting duplicates; abort.
                    Err(e) => {
                        METRICS.record_error(&e);
                        return self.abort(e, started);
                    }
                }
            }
        }
        fetch_timer.finish();

        let classify_timer = OperationTimer::new("classify");
        let texts: Vec<String> = pending.iter().map(Submission::sentiment_text).collect();
        let sentiments = self.analyzer.analyze(&texts);
        classify_timer.finish();

        // Commit order per record: sink row, then seen-id, then counters.
        // A failed sink write leaves the id unmarked so a later run can
        // retry the submission.
        let first_seen = Utc::now().timestamp();
        for (submission, sentiment) in pending.into_iter().zip(sentiments) {
            let record = submission.enrich(&sentiment, &self.run_id);
            if let Err(e) = self.sink.append(&record) {
                warn!(post_id = %record.post_id, error = %e, "record dropped, sink write failed");
                METRICS.record_error(&e);
                summary.errors += 1;
                continue;
            }
            if let Err(e) = self.dedup.mark_seen(&record.post_id, first_seen) {
                warn!(
                    post_id = %record.post_id,
                    error = %e,
                    "seen-id not recorded, row may repeat in a future run"
                );
                METRICS.record_error(&e);
                summary.errors += 1;
                continue;
            }
            METRICS.record_post_processed(record.sentiment_label);
            summary.processed += 1;
        }

        METRICS.record_memory_usage();
        let elapsed = started.elapsed();

        if let Err(e) = self.dedup.close() {
            warn!(error = %e, "dedup store close failed");
            METRICS.record_error(&e);
        }
        if let Err(e) = self.source.close().await {
            warn!(error = %e, "source close failed");
            METRICS.record_error(&e);
        }

        info!(
            run_id = %summary.run_id,
            fetched = summary.fetched,
            deduplicated = summary.deduplicated,
            processed = summary.processed,
            errors = summary.errors,
            duration_secs = elapsed.as_secs_f64(),
            deadline_hit,
            "run finished"
        );

        if deadline_hit {
            METRICS.record_error(&CollectorError::DeadlineExceeded);
            METRICS.mark_unhealthy();
            METRICS.record_run_duration(elapsed.as_secs_f64());
            return Err(CollectorError::DeadlineExceeded);
        }

        METRICS.record_successful_run(elapsed.as_secs_f64());
        Ok(summary)
    }

    /// Tear down after a fatal mid-run error.
    fn abort(self, error: CollectorError, started: Instant) -> Result<RunSummary> {
        METRICS.mark_unhealthy();
        METRICS.record_run_duration(started.elapsed().as_secs_f64());
        if let Err(e) = self.dedup.close() {
            warn!(error = %e, "dedup store close failed");
        }
        Err(error)
    }
}

/// Fetch one community, retrying exactly once after a rate-limit signal.
async fn fetch_with_retry<S: SubmissionSource>(
    source: &mut S,
    community: &str,
    limit: u32,
    max_sleep: Duration,
) -> Result<Vec<Submission>> {
    match source.fetch(community, limit).await {
        Err(e @ CollectorError::SourceRateLimit { .. }) => {
            METRICS.record_error(&e);
            let suggested = match &e {
                CollectorError::SourceRateLimit { retry_after, .. } => *retry_after,
                _ => None,
            };
            let wait = suggested.unwrap_or(max_sleep).min(max_sleep);
            warn!(
                community,
                wait_secs = wait.as_secs_f64(),
                "rate limited, retrying once"
            );
            tokio::time::sleep(wait).await;
            source.fetch(community, limit).await
        }
        other => other,
    }
}
