// Manga-domain recognizer: CTC ONNX model over a CJK vocabulary

use super::TextRecognizer;
use crate::core::errors::{RecognitionError, RecognitionResult};
use crate::services::onnx_builder::build_session;
use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::Array4;
use ort::{session::Session, value::Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Model input dimensions
const TARGET_HEIGHT: u32 = 60;
const MIN_WIDTH: u32 = 10;

/// CTC text-line model loaded from `<models>/ocr/{ocr.onnx, cjk_vocab.txt}`
pub struct CtcOcrModel {
    session: Mutex<Session>,
    vocab: HashMap<usize, String>,
    blank_index: usize,
}

impl CtcOcrModel {
    pub fn new(models_dir: &Path, inference_backend: Option<&str>) -> Result<Self> {
        let model_path = models_dir.join("ocr").join("ocr.onnx");
        let vocab_path = models_dir.join("ocr").join("cjk_vocab.txt");

        if !vocab_path.exists() {
            anyhow::bail!("OCR vocabulary not found at: {}", vocab_path.display());
        }

        let (device_type, session) = build_session(&model_path, "OCR", inference_backend)?;

        let content = std::fs::read_to_string(&vocab_path)
            .context("Failed to read vocabulary file")?;
        let vocab = parse_vocabulary(&content);
        let blank_index = vocab.len().saturating_sub(1);

        info!(
            "✓ Manga OCR: {} (vocab_size={}, blank_index={})",
            device_type,
            vocab.len(),
            blank_index
        );

        Ok(Self {
            session: Mutex::new(session),
            vocab,
            blank_index,
        })
    }

    /// Resize to 60px height keeping aspect, normalize to [0, 1], lay out as [1, 3, H, W]
    fn preprocess_image(image: &RgbImage) -> (Array4<f32>, i32) {
        let (w, h) = image.dimensions();

        let scale = TARGET_HEIGHT as f32 / h.max(1) as f32;
        let new_w = ((w as f32 * scale) as u32).max(MIN_WIDTH);

        let resized = image::imageops::resize(
            image,
            new_w,
            TARGET_HEIGHT,
            image::imageops::FilterType::Lanczos3,
        );

        let mut tensor = Array4::<f32>::zeros((1, 3, TARGET_HEIGHT as usize, new_w as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        // seq_length = width / 4 (LSTM stride)
        (tensor, (new_w / 4) as i32)
    }

    /// Returns (recognized_text, mean confidence)
    pub fn recognize(&self, image: &RgbImage) -> Result<(String, f32)> {
        let (tensor, seq_length) = Self::preprocess_image(image);

        let shape = tensor.shape().to_vec();
        let shape_arr: [usize; 4] = [shape[0], shape[1], shape[2], shape[3]];
        let (data_flat, _offset) = tensor.into_raw_vec_and_offset();

        let data_value = Value::from_array((shape_arr, data_flat))?;
        let seq_lengths_value = Value::from_array(([1usize], vec![seq_length]))?;

        let (dims, logits) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                "data" => data_value,
                "seq_lengths" => seq_lengths_value
            ])?;

            let (shape, logits_data) = if let Some(output) = outputs.get("output") {
                output.try_extract_tensor::<f32>()?
            } else {
                let first_key = outputs.keys().next().context("No outputs from OCR model")?;
                outputs[first_key].try_extract_tensor::<f32>()?
            };

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, logits_data.to_vec())
        };

        let (seq_len, vocab_size) = logits_layout(&dims)?;
        let (text, confidence) = ctc_decode(&logits, seq_len, vocab_size, self.blank_index, &self.vocab);

        debug!("CTC result: '{}' (confidence: {:.2})", text, confidence);
        Ok((text, confidence))
    }
}

/// (sequence length, vocab size) for [S, 1, V], [1, S, V] or [S, V] logits
fn logits_layout(dims: &[usize]) -> Result<(usize, usize)> {
    match dims {
        [s, 1, v] => Ok((*s, *v)),
        [1, s, v] => Ok((*s, *v)),
        [s, v] => Ok((*s, *v)),
        _ => anyhow::bail!("Unexpected logits shape: {:?}", dims),
    }
}

/// Vocabulary file format: `index\tchar`, with `<space>` and `<blank>` tokens.
/// Printable ASCII maps to its own code point unless the file overrides it.
pub fn parse_vocabulary(content: &str) -> HashMap<usize, String> {
    let mut vocab = HashMap::new();

    vocab.insert(0, " ".to_string());
    for i in 32..127usize {
        vocab.insert(i, (i as u8 as char).to_string());
    }

    for line in content.lines() {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some((idx_str, char_str)) = line.split_once('\t') else {
            continue;
        };
        let Ok(idx) = idx_str.trim().parse::<usize>() else {
            continue;
        };
        match char_str {
            "<space>" => {
                vocab.insert(idx, " ".to_string());
            }
            "<blank>" | "" => {}
            other => {
                vocab.insert(idx, other.to_string());
            }
        }
    }

    debug!("Loaded {} vocabulary entries", vocab.len());
    vocab
}

/// Greedy CTC decode: best class per step, collapse repeats, drop blanks
pub fn ctc_decode(
    logits: &[f32],
    seq_len: usize,
    vocab_size: usize,
    blank_index: usize,
    vocab: &HashMap<usize, String>,
) -> (String, f32) {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut prev_idx: Option<usize> = None;

    for step in logits.chunks(vocab_size.max(1)).take(seq_len) {
        let (best_idx, best_val) = step
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        if best_idx != blank_index && Some(best_idx) != prev_idx {
            text.push_str(vocab.get(&best_idx).map(String::as_str).unwrap_or("?"));
            // log prob -> probability
            confidences.push(best_val.exp().min(1.0));
        }
        prev_idx = Some(best_idx);
    }

    let avg_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };

    (text, avg_confidence)
}

/// Variant A: takes the crop as-is, no confidence filtering
pub struct MangaOcrRecognizer {
    model: CtcOcrModel,
}

impl MangaOcrRecognizer {
    pub fn new(model: CtcOcrModel) -> Self {
        Self { model }
    }
}

impl TextRecognizer for MangaOcrRecognizer {
    fn try_recognize(&self, crop: &RgbImage) -> RecognitionResult<String> {
        let (text, _confidence) = self
            .model
            .recognize(crop)
            .map_err(RecognitionError::EngineFailed)?;
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "manga"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_parsing() {
        let vocab = parse_vocabulary("0\t<space>\n33\t!\n97\ta\n12345\t漢\n12346\t<blank>\nbroken line\n");
        assert_eq!(vocab.get(&0).map(String::as_str), Some(" "));
        assert_eq!(vocab.get(&65).map(String::as_str), Some("A"));
        assert_eq!(vocab.get(&12345).map(String::as_str), Some("漢"));
        assert!(!vocab.contains_key(&12346));
    }

    #[test]
    fn test_ctc_decode_collapses_repeats_and_blanks() {
        let vocab: HashMap<usize, String> =
            [(0, "a".to_string()), (1, "b".to_string())].into_iter().collect();
        let blank = 2;
        // steps: a a blank a b b
        let hot = |i: usize| {
            let mut v = vec![-5.0f32; 3];
            v[i] = 0.0;
            v
        };
        let logits: Vec<f32> = [0, 0, 2, 0, 1, 1].iter().flat_map(|&i| hot(i)).collect();

        let (text, confidence) = ctc_decode(&logits, 6, 3, blank, &vocab);
        assert_eq!(text, "aab");
        assert!((confidence - 1.0).abs() < 1e-6);

        let (empty, zero) = ctc_decode(&hot(2), 1, 3, blank, &vocab);
        assert_eq!(empty, "");
        assert_eq!(zero, 0.0);
    }

    #[test]
    fn test_logits_layout() {
        assert_eq!(logits_layout(&[40, 1, 100]).unwrap(), (40, 100));
        assert_eq!(logits_layout(&[1, 40, 100]).unwrap(), (40, 100));
        assert_eq!(logits_layout(&[40, 100]).unwrap(), (40, 100));
        assert!(logits_layout(&[2, 3, 4, 5]).is_err());
    }

    #[test]
    fn test_missing_model_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CtcOcrModel::new(tmp.path(), None).is_err());
    }
}
