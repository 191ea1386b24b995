use super::TranslationBackend;
use crate::core::errors::{TranslationError, TranslationResult};
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_API_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Remote translation over the public `translate_a/single` endpoint.
///
/// The request is async; it is driven to completion on a private current-thread runtime
/// so callers stay synchronous. Without a configured timeout a hung request blocks.
pub struct GoogleTranslateBackend {
    api_url: String,
    http_client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl GoogleTranslateBackend {
    pub fn new(api_url: Option<&str>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().pool_idle_timeout(Duration::from_secs(90));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().context("Failed to create HTTP client")?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create runtime for translation requests")?;

        Ok(Self {
            api_url: api_url.unwrap_or(DEFAULT_API_URL).to_string(),
            http_client,
            runtime,
        })
    }
}

impl TranslationBackend for GoogleTranslateBackend {
    fn name(&self) -> &'static str {
        "google"
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> TranslationResult<String> {
        let request = self.http_client.get(&self.api_url).query(&[
            ("client", "gtx"),
            ("sl", source_lang),
            ("tl", target_lang),
            ("dt", "t"),
            ("q", text),
        ]);

        let body: Value = self.runtime.block_on(async {
            request
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
        })?;

        let translated = parse_response(&body)?;
        debug!("Remote translation: '{}' → '{}'", text, translated);
        Ok(translated)
    }
}

/// Concatenate the translated segments: `[[["seg", "orig", ...], ...], ...]`
pub fn parse_response(body: &Value) -> TranslationResult<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::InvalidResponse("missing segment list".to_string()))?;

    let translated = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect::<String>();

    if translated.is_empty() {
        return Err(TranslationError::InvalidResponse(
            "no translated segments".to_string(),
        ));
    }
    Ok(translated)
}
