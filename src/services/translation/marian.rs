// Local per-language-pair translation: MarianMT encoder/decoder ONNX pair + tokenizer.json

use super::TranslationBackend;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::services::onnx_builder::build_session;
use anyhow::{anyhow, Context, Result};
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

pub struct MarianModel {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    pad_id: i64,
    eos_id: i64,
    max_tokens: usize,
}

impl MarianModel {
    /// Load `encoder_model.onnx`, `decoder_model.onnx` and `tokenizer.json` from `dir`
    pub fn load(dir: &Path, max_tokens: usize, inference_backend: Option<&str>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(dir.join("tokenizer.json"))
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", dir.display(), e))?;

        let pad_id = tokenizer
            .token_to_id("<pad>")
            .context("tokenizer has no <pad> token")? as i64;
        let eos_id = tokenizer
            .token_to_id("</s>")
            .context("tokenizer has no </s> token")? as i64;

        let (_, encoder) = build_session(&dir.join("encoder_model.onnx"), "translation encoder", inference_backend)?;
        let (device_type, decoder) =
            build_session(&dir.join("decoder_model.onnx"), "translation decoder", inference_backend)?;

        debug!("Loaded translation model {} on {}", dir.display(), device_type);

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            pad_id,
            eos_id,
            max_tokens,
        })
    }

    /// Greedy decoding, starting from the pad token, until `</s>` or `max_tokens`
    pub fn translate(&self, text: &str) -> Result<String> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let seq_len = input_ids.len();
        let attention_mask = vec![1i64; seq_len];

        let (hidden_shape, hidden_states) = {
            let mut encoder = self.encoder.lock();
            let outputs = encoder.run(ort::inputs![
                "input_ids" => Value::from_array(([1usize, seq_len], input_ids))?,
                "attention_mask" => Value::from_array(([1usize, seq_len], attention_mask.clone()))?
            ])?;
            let (shape, data) = outputs["last_hidden_state"].try_extract_tensor::<f32>()?;
            let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            (shape, data.to_vec())
        };

        let [_, hidden_len, hidden_dim] = hidden_shape[..] else {
            anyhow::bail!("Unexpected encoder output shape: {:?}", hidden_shape);
        };

        let mut generated = vec![self.pad_id];
        for _ in 0..self.max_tokens {
            let step_len = generated.len();
            let next = {
                let mut decoder = self.decoder.lock();
                let outputs = decoder.run(ort::inputs![
                    "input_ids" => Value::from_array(([1usize, step_len], generated.clone()))?,
                    "encoder_hidden_states" => Value::from_array(([1usize, hidden_len, hidden_dim], hidden_states.clone()))?,
                    "encoder_attention_mask" => Value::from_array(([1usize, seq_len], attention_mask.clone()))?
                ])?;
                let (shape, logits) = outputs["logits"].try_extract_tensor::<f32>()?;
                let vocab_size = *shape.last().context("logits have no dimensions")? as usize;
                let last = &logits[logits.len() - vocab_size..];
                argmax(last) as i64
            };

            if next == self.eos_id {
                break;
            }
            generated.push(next);
        }

        let ids: Vec<u32> = generated[1..].iter().map(|&id| id as u32).collect();
        self.tokenizer
            .decode(&ids, true)
            .map_err(|e| anyhow!("Detokenization failed: {}", e))
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

/// One model per source language, all translating into the configured target
pub struct LocalModelsBackend {
    models: HashMap<String, MarianModel>,
    target_lang: String,
}

impl LocalModelsBackend {
    /// Load `<models>/translation/opus-mt-<src>-<target>` for every supported source.
    /// Missing or broken pairs are logged and skipped.
    pub fn load(
        models_dir: &Path,
        source_langs: &[String],
        target_lang: &str,
        max_tokens: usize,
        inference_backend: Option<&str>,
    ) -> Self {
        let mut models = HashMap::new();

        for source in source_langs.iter().filter(|l| l.as_str() != target_lang) {
            let dir = models_dir
                .join("translation")
                .join(format!("opus-mt-{}-{}", source, target_lang));
            match MarianModel::load(&dir, max_tokens, inference_backend) {
                Ok(model) => {
                    info!("✓ Local translation model {} → {}", source, target_lang);
                    models.insert(source.clone(), model);
                }
                Err(e) => warn!("No local translation model for {} → {}: {:#}", source, target_lang, e),
            }
        }

        Self {
            models,
            target_lang: target_lang.to_string(),
        }
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.models.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }
}

impl TranslationBackend for LocalModelsBackend {
    fn name(&self) -> &'static str {
        "transformers"
    }

    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> TranslationResult<String> {
        if target_lang != self.target_lang {
            return Err(TranslationError::NoModelForLanguage(format!(
                "{}-{}",
                source_lang, target_lang
            )));
        }
        let model = self
            .models
            .get(source_lang)
            .ok_or_else(|| TranslationError::NoModelForLanguage(source_lang.to_string()))?;
        model.translate(text).map_err(TranslationError::ModelFailed)
    }
}
