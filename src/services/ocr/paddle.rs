// Pipeline OCR through a PaddleOCR serving endpoint

use super::TextRecognizer;
use crate::core::errors::{RecognitionError, RecognitionResult};
use crate::utils::image_ops::encode_png;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine};
use image::RgbImage;
use serde_json::{json, Value};
use tracing::debug;

/// Backend that returns one structured prediction record per detected page/region
pub trait PredictionEngine {
    fn predict(&self, crop: &RgbImage) -> Result<Vec<Value>>;
}

/// Blocking client for `POST {"file": <base64>, "fileType": 1}`
pub struct PaddleServingClient {
    url: String,
    lang: String,
    http_client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl PaddleServingClient {
    pub fn new(url: impl Into<String>, lang: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create runtime for OCR requests")?;

        Ok(Self {
            url: url.into(),
            lang: lang.to_string(),
            http_client,
            runtime,
        })
    }
}

impl PredictionEngine for PaddleServingClient {
    fn predict(&self, crop: &RgbImage) -> Result<Vec<Value>> {
        let payload = json!({
            "file": general_purpose::STANDARD.encode(encode_png(crop)?),
            "fileType": 1,
            "lang": self.lang,
        });

        let response: Value = self.runtime.block_on(async {
            self.http_client
                .post(&self.url)
                .json(&payload)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
        })?;

        extract_pruned_results(&response)
    }
}

/// `result.ocrResults[*].prunedResult` of a serving response
pub fn extract_pruned_results(response: &Value) -> Result<Vec<Value>> {
    if let Some(code) = response.get("errorCode").and_then(Value::as_i64) {
        if code != 0 {
            let msg = response
                .get("errorMsg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(anyhow!("OCR service error {}: {}", code, msg));
        }
    }

    let results = response
        .pointer("/result/ocrResults")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Response has no result.ocrResults array"))?;

    Ok(results
        .iter()
        .map(|r| r.get("prunedResult").cloned().unwrap_or_else(|| r.clone()))
        .collect())
}

/// Variant D: `rec_texts` of the first structured record, space-joined and lower-cased
pub struct PipelineRecognizer<E> {
    engine: E,
}

impl<E: PredictionEngine> PipelineRecognizer<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: PredictionEngine> TextRecognizer for PipelineRecognizer<E> {
    fn try_recognize(&self, crop: &RgbImage) -> RecognitionResult<String> {
        let records = self.engine.predict(crop).map_err(RecognitionError::EngineFailed)?;

        let Some(first) = records.first() else {
            return Ok(String::new());
        };
        let Some(rec_texts) = first.get("rec_texts") else {
            debug!("First prediction record has no rec_texts");
            return Ok(String::new());
        };
        let texts = rec_texts
            .as_array()
            .ok_or_else(|| RecognitionError::InvalidOutput("rec_texts is not an array".to_string()))?;

        Ok(texts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase())
    }

    fn name(&self) -> &'static str {
        "paddle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Vec<Value>);

    impl PredictionEngine for Canned {
        fn predict(&self, _crop: &RgbImage) -> Result<Vec<Value>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_first_record_rec_texts() {
        let engine = Canned(vec![
            json!({"rec_texts": ["Hello", "WORLD"], "rec_scores": [0.9, 0.8]}),
            json!({"rec_texts": ["ignored"]}),
        ]);
        let recognizer = PipelineRecognizer::new(engine);
        assert_eq!(recognizer.recognize(&RgbImage::new(2, 2)), "hello world");
    }

    #[test]
    fn test_missing_field_or_records_is_empty() {
        let crop = RgbImage::new(2, 2);
        assert_eq!(PipelineRecognizer::new(Canned(vec![])).recognize(&crop), "");
        assert_eq!(
            PipelineRecognizer::new(Canned(vec![json!({"boxes": []})])).recognize(&crop),
            ""
        );
        assert_eq!(
            PipelineRecognizer::new(Canned(vec![json!({"rec_texts": "oops"})])).recognize(&crop),
            ""
        );
    }

    #[test]
    fn test_extract_pruned_results() {
        let response = json!({
            "errorCode": 0,
            "result": {"ocrResults": [{"prunedResult": {"rec_texts": ["a"]}}]}
        });
        let records = extract_pruned_results(&response).unwrap();
        assert_eq!(records, vec![json!({"rec_texts": ["a"]})]);

        let failed = json!({"errorCode": 500, "errorMsg": "boom"});
        assert!(extract_pruned_results(&failed).is_err());
    }
}
