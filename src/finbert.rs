//! FinBERT realisation of the sentiment model contract.
//!
//! Downloads the configured Hugging Face checkpoint, tokenizes with the
//! repository tokenizer (or a WordPiece rebuild from `vocab.txt` for older
//! checkpoints), and runs the BERT sequence-classification forward pass on
//! the best available device.

use std::collections::HashMap;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::template::TemplateProcessing;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use crate::error::{CollectorError, Result};
use crate::sentiment::{EncodedInput, SentimentModel};

const NUM_CLASSES: usize = 3;

/// BERT sequence classifier over the three financial sentiment classes.
pub struct FinBertModel {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    /// Logit indices of [positive, negative, neutral] in the checkpoint.
    label_order: [usize; 3],
    max_input_tokens: usize,
}

impl FinBertModel {
    /// Fetch and load the model named by `model_id`.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = select_device();
        info!(model = model_id, device = ?device, "loading sentiment model");

        let api = Api::new().map_err(load_error)?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo.get("config.json").map_err(load_error)?;
        let raw_config = std::fs::read_to_string(&config_path)
            .map_err(|e| CollectorError::ClassifierLoad(format!("read config.json: {e}")))?;
        let config: BertConfig = serde_json::from_str(&raw_config)
            .map_err(|e| CollectorError::ClassifierLoad(format!("parse config.json: {e}")))?;
        let label_order = label_order(&raw_config);
        let max_input_tokens = config.max_position_embeddings;

        let tokenizer = load_tokenizer(&repo, max_input_tokens)?;

        let vb = load_weights(&repo, &device)?;
        let model = BertModel::load(vb.pp("bert"), &config).map_err(load_error)?;
        let pooler = candle_nn::linear(
            config.hidden_size,
            config.hidden_size,
            vb.pp("bert").pp("pooler").pp("dense"),
        )
        .map_err(load_error)?;
        let classifier =
            candle_nn::linear(config.hidden_size, NUM_CLASSES, vb.pp("classifier"))
                .map_err(load_error)?;

        Ok(Self {
            model,
            pooler,
            classifier,
            tokenizer,
            device,
            label_order,
            max_input_tokens,
        })
    }
}

impl SentimentModel for FinBertModel {
    fn encode(&self, text: &str) -> Result<EncodedInput> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| CollectorError::classifier_runtime(format!("tokenize: {e}")))?;
        Ok(EncodedInput {
            ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            type_ids: encoding.get_type_ids().to_vec(),
        })
    }

    fn forward(&self, batch: &[EncodedInput]) -> Result<Vec<[f32; 3]>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let rows = batch.len();
        let width = batch.iter().map(|e| e.ids.len()).max().unwrap_or(1).max(1);

        // Right-pad every example to the widest one in the batch.
        let mut ids = vec![0u32; rows * width];
        let mut mask = vec![0u32; rows * width];
        let mut type_ids = vec![0u32; rows * width];
        for (row, example) in batch.iter().enumerate() {
            let offset = row * width;
            ids[offset..offset + example.ids.len()].copy_from_slice(&example.ids);
            mask[offset..offset + example.attention_mask.len()]
                .copy_from_slice(&example.attention_mask);
            type_ids[offset..offset + example.type_ids.len()].copy_from_slice(&example.type_ids);
        }

        let input_ids =
            Tensor::from_vec(ids, (rows, width), &self.device).map_err(runtime_error)?;
        let attention_mask =
            Tensor::from_vec(mask, (rows, width), &self.device).map_err(runtime_error)?;
        let token_type_ids =
            Tensor::from_vec(type_ids, (rows, width), &self.device).map_err(runtime_error)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(runtime_error)?;

        // Classification head: pooled [CLS] state through tanh, then the
        // three-way linear layer.
        let cls = hidden.i((.., 0)).map_err(runtime_error)?;
        let pooled = self
            .pooler
            .forward(&cls)
            .and_then(|t| t.tanh())
            .map_err(runtime_error)?;
        let logits = self
            .classifier
            .forward(&pooled)
            .and_then(|t| t.to_dtype(DType::F32))
            .map_err(runtime_error)?;
        let logits = logits.to_vec2::<f32>().map_err(runtime_error)?;

        let [pos, neg, neu] = self.label_order;
        logits
            .into_iter()
            .map(|row| {
                if row.len() < NUM_CLASSES {
                    return Err(CollectorError::classifier_runtime(format!(
                        "expected {NUM_CLASSES} logits per example, got {}",
                        row.len()
                    )));
                }
                Ok([row[pos], row[neg], row[neu]])
            })
            .collect()
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }
}

/// Prefer CUDA, then Metal, then CPU.
fn select_device() -> Device {
    match Device::cuda_if_available(0) {
        Ok(device) if !matches!(device, Device::Cpu) => device,
        _ => Device::new_metal(0).unwrap_or(Device::Cpu),
    }
}

fn load_weights(repo: &ApiRepo, device: &Device) -> Result<VarBuilder<'static>> {
    if let Ok(path) = repo.get("model.safetensors") {
        return unsafe { VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device) }
            .map_err(load_error);
    }
    let path = repo.get("pytorch_model.bin").map_err(load_error)?;
    VarBuilder::from_pth(&path, DTYPE, device).map_err(load_error)
}

fn load_tokenizer(repo: &ApiRepo, max_input_tokens: usize) -> Result<Tokenizer> {
    let mut tokenizer = match repo.get("tokenizer.json") {
        Ok(path) => Tokenizer::from_file(path)
            .map_err(|e| CollectorError::ClassifierLoad(format!("tokenizer.json: {e}")))?,
        Err(_) => wordpiece_tokenizer(repo)?,
    };

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_input_tokens,
            ..Default::default()
        }))
        .map_err(|e| CollectorError::ClassifierLoad(format!("truncation: {e}")))?;

    Ok(tokenizer)
}

/// Rebuild a BERT WordPiece tokenizer for checkpoints that only ship
/// `vocab.txt`.
fn wordpiece_tokenizer(repo: &ApiRepo) -> Result<Tokenizer> {
    let vocab_path = repo.get("vocab.txt").map_err(load_error)?;
    let vocab = vocab_path
        .to_str()
        .ok_or_else(|| CollectorError::ClassifierLoad("non-utf8 vocab path".to_string()))?;

    let wordpiece = WordPiece::from_file(vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| CollectorError::ClassifierLoad(format!("vocab.txt: {e}")))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(BertNormalizer::new(true, true, None, true));
    tokenizer.with_pre_tokenizer(BertPreTokenizer);

    let cls = tokenizer
        .token_to_id("[CLS]")
        .ok_or_else(|| CollectorError::ClassifierLoad("vocab missing [CLS]".to_string()))?;
    let sep = tokenizer
        .token_to_id("[SEP]")
        .ok_or_else(|| CollectorError::ClassifierLoad("vocab missing [SEP]".to_string()))?;

    let post_processor = TemplateProcessing::builder()
        .try_single("[CLS] $A [SEP]")
        .map_err(|e| CollectorError::ClassifierLoad(format!("template: {e}")))?
        .try_pair("[CLS] $A [SEP] $B:1 [SEP]:1")
        .map_err(|e| CollectorError::ClassifierLoad(format!("template: {e}")))?
        .special_tokens(vec![("[CLS]".to_string(), cls), ("[SEP]".to_string(), sep)])
        .build()
        .map_err(|e| CollectorError::ClassifierLoad(format!("template: {e}")))?;
    tokenizer.with_post_processor(post_processor);

    Ok(tokenizer)
}

/// Logit indices of [positive, negative, neutral] per the checkpoint's
/// `id2label` table; FinBERT's native order when the table is absent.
fn label_order(raw_config: &str) -> [usize; 3] {
    let mut order = [0, 1, 2];
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw_config) else {
        return order;
    };
    let Some(map) = value.get("id2label").and_then(|v| v.as_object()) else {
        return order;
    };

    let by_label: HashMap<String, usize> = map
        .iter()
        .filter_map(|(idx, label)| {
            let idx = idx.parse::<usize>().ok()?;
            let label = label.as_str()?.to_lowercase();
            (idx < NUM_CLASSES).then_some((label, idx))
        })
        .collect();

    if let (Some(&p), Some(&n), Some(&u)) = (
        by_label.get("positive"),
        by_label.get("negative"),
        by_label.get("neutral"),
    ) {
        order = [p, n, u];
    }
    order
}

fn load_error(e: impl std::fmt::Display) -> CollectorError {
    CollectorError::ClassifierLoad(e.to_string())
}

fn runtime_error(e: impl std::fmt::Display) -> CollectorError {
    CollectorError::ClassifierRuntime(e.to_string())
}
