//! Batched sentiment analysis over submission texts.
//!
//! The analyzer owns preprocessing, batching, softmax/labelling, and the
//! failure semantics; the underlying model is anything implementing
//! [`SentimentModel`]. The default realisation is the FinBERT wrapper in
//! [`crate::finbert`]; a disabled analyzer never touches a model.

use std::time::Instant;

use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::error::Result;
use crate::finbert::FinBertModel;
use crate::metrics::METRICS;
use crate::models::SentimentResult;

/// Tokenized text ready for a forward pass.
#[derive(Debug, Clone, Default)]
pub struct EncodedInput {
    pub ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub type_ids: Vec<u32>,
}

/// Capability set required of a classification model: tokenize one text,
/// run a batch forward pass producing per-example logits in the fixed
/// order [positive, negative, neutral], and report the input-length budget.
pub trait SentimentModel: Send {
    fn encode(&self, text: &str) -> Result<EncodedInput>;
    fn forward(&self, batch: &[EncodedInput]) -> Result<Vec<[f32; 3]>>;
    fn max_input_tokens(&self) -> usize;
}

enum Engine {
    Model(Box<dyn SentimentModel>),
    Disabled,
}

/// Order- and length-preserving batch classifier.
pub struct SentimentAnalyzer {
    engine: Engine,
    batch_size: usize,
    max_chars: usize,
}

impl SentimentAnalyzer {
    /// Construct per configuration: a loaded FinBERT model when sentiment
    /// is enabled, a no-op engine otherwise. Model load failures propagate.
    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        if !config.enable_sentiment {
            info!("sentiment analysis disabled, all records will be neutral");
            return Ok(Self::disabled());
        }

        let started = Instant::now();
        let model = FinBertModel::load(&config.finbert_model)?;
        let elapsed = started.elapsed();
        METRICS.record_model_load(elapsed.as_secs_f64());
        info!(
            model = %config.finbert_model,
            max_input_tokens = model.max_input_tokens(),
            load_secs = elapsed.as_secs_f64(),
            "sentiment model loaded"
        );

        Ok(Self::with_model(
            Box::new(model),
            config.sentiment_batch_size,
            config.sentiment_max_chars,
        ))
    }

    /// Analyzer that returns neutral for every input without a model.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            engine: Engine::Disabled,
            batch_size: 1,
            max_chars: usize::MAX,
        }
    }

    /// Analyzer over an explicit model. Used by `from_config` and by tests
    /// that substitute deterministic models.
    #[must_use]
    pub fn with_model(model: Box<dyn SentimentModel>, batch_size: usize, max_chars: usize) -> Self {
        Self {
            engine: Engine::Model(model),
            batch_size: batch_size.max(1),
            max_chars,
        }
    }

    /// Classify every text, preserving order and length. Inputs that are
    /// empty after trimming short-circuit to neutral without touching the
    /// model; a failed batch degrades to neutral for that batch only.
    pub fn analyze(&self, texts: &[String]) -> Vec<SentimentResult> {
        let model = match &self.engine {
            Engine::Disabled => {
                return texts.iter().map(|_| SentimentResult::neutral()).collect();
            }
            Engine::Model(model) => model,
        };

        let mut out: Vec<Option<SentimentResult>> = vec![None; texts.len()];

        // Empty texts resolve immediately; the rest are batched.
        let mut pending: Vec<(usize, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let prepared = prepare_text(text, self.max_chars);
            if prepared.is_empty() {
                out[i] = Some(SentimentResult::neutral());
            } else {
                pending.push((i, prepared));
            }
        }

        for chunk in pending.chunks(self.batch_size) {
            let started = Instant::now();

            let mut encoded = Vec::with_capacity(chunk.len());
            let mut slots = Vec::with_capacity(chunk.len());
            for (i, text) in chunk {
                match model.encode(text) {
                    Ok(input) => {
                        encoded.push(input);
                        slots.push(*i);
                    }
                    Err(e) => {
                        warn!(error = %e, "tokenization failed, input degraded to neutral");
                        METRICS.record_sentiment_error("tokenization");
                        out[*i] = Some(SentimentResult::neutral());
                    }
                }
            }

            if !encoded.is_empty() {
                match model.forward(&encoded) {
                    Ok(logits) if logits.len() == slots.len() => {
                        for (slot, example) in slots.iter().zip(logits) {
                            out[*slot] = Some(SentimentResult::from_logits(example));
                        }
                    }
                    Ok(logits) => {
                        warn!(
                            expected = slots.len(),
                            got = logits.len(),
                            "model returned wrong batch size, batch degraded to neutral"
                        );
                        METRICS.record_sentiment_error("batch_shape");
                        let err = crate::error::CollectorError::classifier_runtime(
                            "forward pass returned mismatched batch size",
                        );
                        METRICS.record_error(&err);
                        for (i, _) in chunk {
                            out[*i] = Some(SentimentResult::neutral());
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, batch = chunk.len(), "forward pass failed, batch degraded to neutral");
                        METRICS.record_sentiment_error(e.kind());
                        METRICS.record_error(&e);
                        for (i, _) in chunk {
                            out[*i] = Some(SentimentResult::neutral());
                        }
                    }
                }
            }

            METRICS.record_sentiment_batch(started.elapsed().as_secs_f64(), chunk.len());
        }

        out.into_iter()
            .map(|r| r.unwrap_or_else(SentimentResult::neutral))
            .collect()
    }

    /// Classify a single text.
    pub fn analyze_one(&self, text: &str) -> SentimentResult {
        self.analyze(std::slice::from_ref(&text.to_string()))
            .remove(0)
    }

    /// True when a model is loaded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self.engine, Engine::Model(_))
    }
}

/// Trim, then enforce the character ceiling. The model's own token budget
/// is enforced separately at encode time.
fn prepare_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect::<String>().trim_end().to_string()
}
