//! Analyzer behavior against deterministic stand-in models: ordering,
//! the empty-text shortcut, truncation, and failure degradation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use finbert_collector::error::{CollectorError, Result};
use finbert_collector::models::{SentimentLabel, SentimentResult};
use finbert_collector::sentiment::{EncodedInput, SentimentAnalyzer, SentimentModel};

/// Model that scores "good"/"bad" deterministically and uniform otherwise.
/// Logits are ln(p) so the analyzer's softmax reproduces the intended
/// probabilities exactly.
struct StubModel {
    forward_calls: Arc<AtomicUsize>,
    encoded_lengths: Arc<Mutex<Vec<usize>>>,
    fail_forward: bool,
}

impl StubModel {
    fn new() -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<usize>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let lengths = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                forward_calls: Arc::clone(&calls),
                encoded_lengths: Arc::clone(&lengths),
                fail_forward: false,
            },
            calls,
            lengths,
        )
    }

    fn failing() -> (Self, Arc<AtomicUsize>) {
        let (mut model, calls, _) = Self::new();
        model.fail_forward = true;
        (model, calls)
    }
}

impl SentimentModel for StubModel {
    fn encode(&self, text: &str) -> Result<EncodedInput> {
        let ids: Vec<u32> = text.chars().map(|c| c as u32).collect();
        self.encoded_lengths.lock().unwrap().push(ids.len());
        let len = ids.len();
        Ok(EncodedInput {
            ids,
            attention_mask: vec![1; len],
            type_ids: vec![0; len],
        })
    }

    fn forward(&self, batch: &[EncodedInput]) -> Result<Vec<[f32; 3]>> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_forward {
            return Err(CollectorError::classifier_runtime("injected failure"));
        }
        Ok(batch
            .iter()
            .map(|example| {
                let text: String = example
                    .ids
                    .iter()
                    .filter_map(|&c| char::from_u32(c))
                    .collect();
                match text.as_str() {
                    "good" => [0.9f32.ln(), 0.05f32.ln(), 0.05f32.ln()],
                    "bad" => [0.05f32.ln(), 0.9f32.ln(), 0.05f32.ln()],
                    _ => [0.0, 0.0, 0.0],
                }
            })
            .collect())
    }

    fn max_input_tokens(&self) -> usize {
        512
    }
}

fn analyzer(model: StubModel, batch_size: usize, max_chars: usize) -> SentimentAnalyzer {
    SentimentAnalyzer::with_model(Box::new(model), batch_size, max_chars)
}

#[test]
fn test_deterministic_mapping() {
    let (model, _, _) = StubModel::new();
    let analyzer = analyzer(model, 8, 400);

    let results = analyzer.analyze(&["good".to_string(), "bad".to_string()]);
    assert_eq!(results.len(), 2);

    assert_eq!(results[0].label, SentimentLabel::Positive);
    assert!((results[0].confidence - 0.9).abs() < 1e-5);
    assert!((results[0].score() - 0.85).abs() < 1e-5);

    assert_eq!(results[1].label, SentimentLabel::Negative);
    assert!((results[1].confidence - 0.9).abs() < 1e-5);
    assert!((results[1].score() + 0.85).abs() < 1e-5);
}

#[test]
fn test_output_is_length_and_order_preserving() {
    let (model, _, _) = StubModel::new();
    let analyzer = analyzer(model, 2, 400);

    let texts: Vec<String> = ["bad", "good", "meh", "good", "bad"]
        .iter()
        .map(ToString::to_string)
        .collect();
    let results = analyzer.analyze(&texts);

    assert_eq!(results.len(), texts.len());
    assert_eq!(results[0].label, SentimentLabel::Negative);
    assert_eq!(results[1].label, SentimentLabel::Positive);
    assert_eq!(results[2].label, SentimentLabel::Neutral);
    assert_eq!(results[3].label, SentimentLabel::Positive);
    assert_eq!(results[4].label, SentimentLabel::Negative);
}

#[test]
fn test_empty_text_shortcut_skips_model() {
    let (model, calls, _) = StubModel::new();
    let analyzer = analyzer(model, 8, 400);

    let results = analyzer.analyze(&["   ".to_string()]);
    assert_eq!(results[0], SentimentResult::neutral());
    assert_eq!(results[0].label, SentimentLabel::Neutral);
    assert!((results[0].confidence - 1.0).abs() < f32::EPSILON);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_uniform_logits_resolve_neutral() {
    let (model, _, _) = StubModel::new();
    let analyzer = analyzer(model, 8, 400);

    let results = analyzer.analyze(&["meh".to_string()]);
    assert_eq!(results[0].label, SentimentLabel::Neutral);
    assert!((results[0].positive + results[0].negative + results[0].neutral - 1.0).abs() < 1e-3);
}

#[test]
fn test_forward_failure_degrades_batch_to_neutral() {
    let (model, calls) = StubModel::failing();
    let analyzer = analyzer(model, 8, 400);

    let results = analyzer.analyze(&["good".to_string(), "bad".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result, &SentimentResult::neutral());
    }
}

#[test]
fn test_character_ceiling_applied_before_encode() {
    let (model, _, lengths) = StubModel::new();
    let analyzer = analyzer(model, 8, 10);

    analyzer.analyze(&["a".repeat(500), "short".to_string()]);
    let lengths = lengths.lock().unwrap();
    assert_eq!(lengths.len(), 2);
    assert!(lengths.iter().all(|&len| len <= 10));
}

#[test]
fn test_batch_partitioning() {
    let (model, calls, _) = StubModel::new();
    let analyzer = analyzer(model, 2, 400);

    let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
    analyzer.analyze(&texts);
    // Five texts in batches of two: three forward passes.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_analyze_empty_input() {
    let (model, calls, _) = StubModel::new();
    let analyzer = analyzer(model, 8, 400);
    assert!(analyzer.analyze(&[]).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_analyze_one_matches_batch() {
    let (model, _, _) = StubModel::new();
    let analyzer = analyzer(model, 8, 400);
    let single = analyzer.analyze_one("good");
    assert_eq!(single.label, SentimentLabel::Positive);
}
