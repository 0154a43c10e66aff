use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use candle_core::{safetensors, DType, Device, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::info;

use crate::detectors::ner::{NerTagger, TaggedSpan};

/// Model used when no external tagger is supplied.
pub const DEFAULT_NER_MODEL: &str = "dbmdz/bert-large-cased-finetuned-conll03-english";

/// BERT token-classification tagger running on Candle.
///
/// Weights, tokenizer, and label mapping come from the HuggingFace hub.
/// The forward pass produces per-token label logits through the
/// `classifier` head; BIO tags are decoded into byte-offset spans using
/// the tokenizer's offset mapping.
pub struct CandleTagger {
    model: BertModel,
    classifier: Linear,
    tokenizer: Tokenizer,
    id_to_label: Vec<String>,
    device: Device,
}

impl CandleTagger {
    pub fn from_hub(model_id: &str) -> Result<Self> {
        Self::new(model_id, "main", Device::Cpu)
    }

    pub fn new(model_id: &str, revision: &str, device: Device) -> Result<Self> {
        info!(model = model_id, revision, "initializing Candle NER model");
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let config_filename = repo.get("config.json")?;
        let tokenizer_filename = repo.get("tokenizer.json")?;
        let model_filename = repo.get("model.safetensors")?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("failed to load tokenizer: {e:?}"))?;

        let raw_config = std::fs::read_to_string(config_filename)?;
        let config: BertConfig =
            serde_json::from_str(&raw_config).context("unreadable model config")?;
        let id_to_label = parse_id_to_label(&raw_config);

        let model_weights = safetensors::load(&model_filename, &device)?;
        let vb = VarBuilder::from_tensors(model_weights, DType::F32, &device);
        // Checkpoints exported from transformers prefix the encoder tensors
        // with "bert."; plain exports do not.
        let model = BertModel::load(vb.pp("bert"), &config)
            .or_else(|_| BertModel::load(vb.clone(), &config))?;
        let classifier = candle_nn::linear(
            config.hidden_size,
            id_to_label.len(),
            vb.pp("classifier"),
        )?;

        info!(labels = id_to_label.len(), "Candle NER model initialized");
        Ok(Self {
            model,
            classifier,
            tokenizer,
            id_to_label,
            device,
        })
    }

    fn predict(&self, text: &str) -> Result<Vec<TaggedSpan>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("failed to encode text: {e:?}"))?;

        let tokens = encoding.get_ids().to_vec();
        let offsets = encoding.get_offsets().to_vec();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let token_ids = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = token_ids.zeros_like()?;
        let attention_mask_vec = vec![1u32; tokens.len()];
        let attention_mask = Tensor::new(attention_mask_vec.as_slice(), &self.device)?.unsqueeze(0)?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;
        let logits = self.classifier.forward(&hidden)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?
            .squeeze(0)?
            .to_vec2::<f32>()?;

        let mut spans = Vec::new();
        let mut current: Option<(String, usize, usize, f32)> = None;

        for (i, row) in probs.iter().enumerate() {
            let (token_start, token_end) = offsets[i];
            if token_start == token_end {
                // Special tokens ([CLS], [SEP], padding) carry no text.
                continue;
            }

            let (label_id, score) = row
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(id, s)| (id, *s))
                .unwrap_or((0, 0.0));
            let label = self
                .id_to_label
                .get(label_id)
                .map(String::as_str)
                .unwrap_or("O");

            if let Some(tag) = label.strip_prefix("B-") {
                flush(&mut current, text, &mut spans);
                current = Some((tag.to_string(), token_start, token_end, score));
            } else if let Some(tag) = label.strip_prefix("I-") {
                let extended = match current.as_mut() {
                    Some((cur_tag, _, end, max_score)) if cur_tag.as_str() == tag => {
                        *end = token_end;
                        *max_score = max_score.max(score);
                        true
                    }
                    _ => false,
                };
                if !extended {
                    flush(&mut current, text, &mut spans);
                }
            } else {
                flush(&mut current, text, &mut spans);
            }
        }
        flush(&mut current, text, &mut spans);

        Ok(spans)
    }
}

fn flush(current: &mut Option<(String, usize, usize, f32)>, text: &str, spans: &mut Vec<TaggedSpan>) {
    if let Some((label, start, end, score)) = current.take() {
        if let Some(slice) = text.get(start..end) {
            spans.push(TaggedSpan {
                label,
                text: slice.to_string(),
                start,
                end,
                score,
            });
        }
    }
}

/// Read the `id2label` table from the raw model config, falling back to
/// the CoNLL-03 BIO set the default model was trained on.
fn parse_id_to_label(raw_config: &str) -> Vec<String> {
    let parsed: Option<HashMap<usize, String>> = serde_json::from_str::<serde_json::Value>(raw_config)
        .ok()
        .and_then(|v| v.get("id2label").cloned())
        .and_then(|m| m.as_object().cloned())
        .map(|m| {
            m.into_iter()
                .filter_map(|(k, v)| {
                    Some((k.parse::<usize>().ok()?, v.as_str()?.to_string()))
                })
                .collect()
        });

    match parsed {
        Some(map) if !map.is_empty() => {
            let len = map.keys().max().map(|m| m + 1).unwrap_or(0);
            let mut labels = vec!["O".to_string(); len];
            for (id, label) in map {
                labels[id] = label;
            }
            labels
        }
        _ => [
            "O", "B-MISC", "I-MISC", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

impl NerTagger for CandleTagger {
    fn tag(&self, text: &str) -> Result<Vec<TaggedSpan>> {
        self.predict(text)
    }
}
