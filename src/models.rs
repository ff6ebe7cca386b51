use serde::{Deserialize, Serialize};

/// A submission as returned by the source client, before enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    pub content: String,
    pub score: i64,
    pub num_comments: u32,
    pub created_utc: i64,
    pub url: String,
}

impl Submission {
    /// Text handed to the sentiment engine: title and body joined by a
    /// single space, outer whitespace trimmed.
    #[must_use]
    pub fn sentiment_text(&self) -> String {
        format!("{} {}", self.title, self.content).trim().to_string()
    }

    /// Combine the submission with its sentiment result into a sink row.
    #[must_use]
    pub fn enrich(self, sentiment: &SentimentResult, run_id: &str) -> EnrichedRecord {
        EnrichedRecord {
            post_id: self.id,
            title: self.title,
            content: self.content,
            score: self.score,
            created_utc: self.created_utc,
            subreddit: self.subreddit,
            url: self.url,
            num_comments: self.num_comments,
            sentiment_label: sentiment.label,
            sentiment_confidence: sentiment.confidence,
            sentiment_positive: sentiment.positive,
            sentiment_negative: sentiment.negative,
            sentiment_neutral: sentiment.neutral,
            sentiment_score: sentiment.score(),
            run_id: run_id.to_string(),
        }
    }
}

/// Sentiment class emitted by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-text classifier output: dominant label, its probability, and the
/// full three-class distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub confidence: f32,
    pub positive: f32,
    pub negative: f32,
    pub neutral: f32,
}

impl SentimentResult {
    /// Result used for empty inputs, disabled mode, and failed batches.
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            confidence: 1.0,
            positive: 0.0,
            negative: 0.0,
            neutral: 1.0,
        }
    }

    /// Softmax raw logits (fixed order [positive, negative, neutral]) into
    /// a probability distribution and pick the dominant label.
    #[must_use]
    pub fn from_logits(logits: [f32; 3]) -> Self {
        let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exps = logits.map(|l| (l - max).exp());
        let sum: f32 = exps.iter().sum();
        let [positive, negative, neutral] = exps.map(|e| e / sum);
        Self::from_probabilities(positive, negative, neutral)
    }

    /// Pick the argmax label; ties resolve neutral over positive over
    /// negative.
    #[must_use]
    pub fn from_probabilities(positive: f32, negative: f32, neutral: f32) -> Self {
        let mut label = SentimentLabel::Neutral;
        let mut confidence = neutral;
        if positive > confidence {
            label = SentimentLabel::Positive;
            confidence = positive;
        }
        if negative > confidence {
            label = SentimentLabel::Negative;
            confidence = negative;
        }
        Self {
            label,
            confidence,
            positive,
            negative,
            neutral,
        }
    }

    /// Legacy signed score in [-1, 1].
    #[must_use]
    pub fn score(&self) -> f32 {
        self.positive - self.negative
    }
}

/// One output row of the sink. Field order here defines the CSV header and
/// column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub post_id: String,
    pub title: String,
    pub content: String,
    pub score: i64,
    pub created_utc: i64,
    pub subreddit: String,
    pub url: String,
    pub num_comments: u32,
    pub sentiment_label: SentimentLabel,
    pub sentiment_confidence: f32,
    pub sentiment_positive: f32,
    pub sentiment_negative: f32,
    pub sentiment_neutral: f32,
    pub sentiment_score: f32,
    pub run_id: String,
}

/// Aggregate statistics over the persistent dedup store.
#[derive(Debug, Clone, Serialize)]
pub struct DedupStats {
    pub total_ids: u64,
    pub oldest_first_seen: Option<i64>,
    pub newest_first_seen: Option<i64>,
    pub filter_capacity: usize,
}

/// Outcome counters for one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub fetched: u64,
    pub deduplicated: u64,
    pub processed: u64,
    pub errors: u64,
}
