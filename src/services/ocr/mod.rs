// Text recognition: one capability, four interchangeable backends chosen at construction

pub mod manga;
pub mod paddle;
pub mod tesseract;

use crate::core::config::Config;
use crate::core::errors::{ConfigError, ConfigResult, RecognitionError, RecognitionResult};
use crate::core::types::OcrKind;
use image::RgbImage;
use tracing::{debug, info, warn};

pub use manga::{CtcOcrModel, MangaOcrRecognizer};
pub use paddle::{PaddleServingClient, PipelineRecognizer, PredictionEngine};
pub use tesseract::{LayoutEngine, OcrPage, TesseractEngine};

/// Best-effort recognizer.
///
/// Backends implement `try_recognize`; callers use `recognize`, which never fails and
/// returns an empty string when nothing useful was read.
pub trait TextRecognizer {
    fn try_recognize(&self, crop: &RgbImage) -> RecognitionResult<String>;

    fn name(&self) -> &'static str;

    fn recognize(&self, crop: &RgbImage) -> String {
        match self.try_recognize(crop) {
            Ok(text) => {
                debug!("{} recognized: '{}'", self.name(), text);
                text
            }
            Err(e) => {
                warn!("{} OCR failed, treating bubble as empty: {}", self.name(), e);
                String::new()
            }
        }
    }
}

/// Structured document OCR: every word of every block and line, lower-cased and space-joined
pub struct DocumentRecognizer<E> {
    engine: E,
}

impl<E: LayoutEngine> DocumentRecognizer<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: LayoutEngine> TextRecognizer for DocumentRecognizer<E> {
    fn try_recognize(&self, crop: &RgbImage) -> RecognitionResult<String> {
        let page = self.engine.read(crop).map_err(RecognitionError::EngineFailed)?;
        let text = page
            .words()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text.trim().to_lowercase())
    }

    fn name(&self) -> &'static str {
        "doctr"
    }
}

/// General-purpose OCR: paragraph texts concatenated, with an optional confidence filter
pub struct GeneralRecognizer<E> {
    engine: E,
    /// When set, `try_recognize` keeps only lines at or above this confidence
    confidence_threshold: Option<f32>,
}

impl<E: LayoutEngine> GeneralRecognizer<E> {
    pub fn new(engine: E, confidence_threshold: Option<f32>) -> Self {
        Self {
            engine,
            confidence_threshold,
        }
    }

    /// Line-level results with confidence >= `threshold`, space-joined
    pub fn recognize_with_confidence(&self, crop: &RgbImage, threshold: f32) -> String {
        match self.engine.read(crop) {
            Ok(page) => page
                .lines()
                .filter(|line| line.confidence() >= threshold)
                .map(|line| line.text())
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string(),
            Err(e) => {
                warn!("OCR with confidence failed: {}", e);
                String::new()
            }
        }
    }
}

impl<E: LayoutEngine> TextRecognizer for GeneralRecognizer<E> {
    fn try_recognize(&self, crop: &RgbImage) -> RecognitionResult<String> {
        if let Some(threshold) = self.confidence_threshold {
            return Ok(self.recognize_with_confidence(crop, threshold));
        }

        let page = self.engine.read(crop).map_err(RecognitionError::EngineFailed)?;
        let text = page
            .paragraphs()
            .map(|p| p.text())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "easy"
    }
}

/// Build the recognizer for `kind`. `languages` are the OCR languages (ISO-639-1).
pub fn create_recognizer(
    kind: OcrKind,
    config: &Config,
    languages: &[String],
) -> ConfigResult<Box<dyn TextRecognizer>> {
    let ocr = &config.recognition;
    info!("Initializing {} OCR for languages {:?}", kind, languages);

    let recognizer: Box<dyn TextRecognizer> = match kind {
        OcrKind::Manga => {
            let backend = if ocr.use_gpu { Some("CUDA") } else { Some("CPU") };
            let model = CtcOcrModel::new(config.model_dir(), backend).map_err(|source| {
                ConfigError::BackendInit {
                    component: "manga OCR",
                    source,
                }
            })?;
            Box::new(MangaOcrRecognizer::new(model))
        }
        OcrKind::Doctr => Box::new(DocumentRecognizer::new(TesseractEngine::new(
            &ocr.tesseract_cmd,
            languages,
        ))),
        OcrKind::Easy => Box::new(GeneralRecognizer::new(
            TesseractEngine::new(&ocr.tesseract_cmd, languages),
            ocr.confidence_aware.then_some(ocr.confidence_threshold),
        )),
        OcrKind::Paddle => {
            let lang = languages.first().map(String::as_str).unwrap_or("en");
            let client = PaddleServingClient::new(&ocr.paddle_url, lang).map_err(|source| {
                ConfigError::BackendInit {
                    component: "paddle OCR",
                    source,
                }
            })?;
            Box::new(PipelineRecognizer::new(client))
        }
    };

    Ok(recognizer)
}

#[cfg(test)]
mod tests {
    use super::tesseract::{parse_tsv, OcrPage};
    use super::*;
    use anyhow::Result;

    struct FixedPage(String);

    impl LayoutEngine for FixedPage {
        fn read(&self, _crop: &RgbImage) -> Result<OcrPage> {
            Ok(parse_tsv(&self.0))
        }
    }

    struct BrokenEngine;

    impl LayoutEngine for BrokenEngine {
        fn read(&self, _crop: &RgbImage) -> Result<OcrPage> {
            anyhow::bail!("engine crashed")
        }
    }

    fn page() -> FixedPage {
        FixedPage(
            [
                "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext",
                "5\t1\t1\t1\t1\t1\t0\t0\t5\t5\t95\tHello",
                "5\t1\t1\t1\t1\t2\t0\t0\t5\t5\t90\tWorld",
                "5\t1\t1\t1\t2\t1\t0\t0\t5\t5\t20\tsmudge",
                "5\t1\t2\t1\t1\t1\t0\t0\t5\t5\t85\tBye",
            ]
            .join("\n"),
        )
    }

    #[test]
    fn test_document_recognizer_flattens_and_lowercases() {
        let recognizer = DocumentRecognizer::new(page());
        assert_eq!(recognizer.recognize(&RgbImage::new(4, 4)), "hello world smudge bye");
    }

    #[test]
    fn test_general_recognizer_paragraphs_and_confidence() {
        let crop = RgbImage::new(4, 4);

        let plain = GeneralRecognizer::new(page(), None);
        assert_eq!(plain.recognize(&crop), "Hello World smudge Bye");

        let filtered = GeneralRecognizer::new(page(), Some(0.5));
        assert_eq!(filtered.recognize(&crop), "Hello World Bye");
        assert_eq!(filtered.recognize_with_confidence(&crop, 0.9), "Hello World");
    }

    #[test]
    fn test_engine_failure_yields_empty_text() {
        let crop = RgbImage::new(4, 4);
        assert_eq!(DocumentRecognizer::new(BrokenEngine).recognize(&crop), "");
        assert_eq!(GeneralRecognizer::new(BrokenEngine, None).recognize(&crop), "");
        assert_eq!(
            GeneralRecognizer::new(BrokenEngine, Some(0.5)).recognize(&crop),
            ""
        );
    }
}
