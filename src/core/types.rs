// Shared data model for the bubble / image / batch pipelines

use image::{GenericImageView, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::ConfigError;

/// Raw detector output in original image coordinates (before padding/clamping)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub label: i64,
    pub confidence: f32,
}

/// Padded and clamped bubble box.
///
/// Left/top inclusive, right/bottom exclusive. Always satisfies
/// `0 <= x1 < x2 <= width` and `0 <= y1 < y2 <= height` for the image it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    /// Pad a raw detector box outward by `padding` pixels and clamp it to the image.
    ///
    /// Returns `None` when nothing of the box is left inside the image.
    pub fn padded(bbox: [f32; 4], padding: u32, width: u32, height: u32) -> Option<Self> {
        let pad = i64::from(padding);
        // Detector coordinates are truncated toward zero before padding
        let clamp = |v: i64, max: u32| v.clamp(0, i64::from(max)) as u32;

        let x1 = clamp(bbox[0] as i64 - pad, width);
        let y1 = clamp(bbox[1] as i64 - pad, height);
        let x2 = clamp(bbox[2] as i64 + pad, width);
        let y2 = clamp(bbox[3] as i64 + pad, height);

        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// A detected bubble paired with its cropped pixels
#[derive(Debug, Clone)]
pub struct TextRegion {
    pub bbox: BoundingBox,
    pub crop: RgbImage,
}

impl TextRegion {
    /// Copy the pixels under `bbox` out of `image`
    pub fn crop_from(image: &RgbImage, bbox: BoundingBox) -> Self {
        let crop = image
            .view(bbox.x1, bbox.y1, bbox.width(), bbox.height())
            .to_image();
        Self { bbox, crop }
    }
}

/// Aggregate outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub failed_files: Vec<String>,
}

impl BatchResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, file_name: &str, success: bool) {
        if success {
            self.success += 1;
        } else {
            self.failed += 1;
            self.failed_files.push(file_name.to_string());
        }
    }
}

/// OCR backend family, fixed for the lifetime of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrKind {
    /// Manga-domain CTC recognizer
    Manga,
    /// Structured document OCR (blocks → lines → words)
    Doctr,
    /// General-purpose paragraph OCR with optional confidence filtering
    Easy,
    /// Pipeline OCR returning structured prediction records
    Paddle,
}

impl OcrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrKind::Manga => "manga",
            OcrKind::Doctr => "doctr",
            OcrKind::Easy => "easy",
            OcrKind::Paddle => "paddle",
        }
    }
}

impl FromStr for OcrKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manga" => Ok(OcrKind::Manga),
            "doctr" => Ok(OcrKind::Doctr),
            "easy" => Ok(OcrKind::Easy),
            "paddle" => Ok(OcrKind::Paddle),
            other => Err(ConfigError::UnknownOcrKind(other.to_string())),
        }
    }
}

impl fmt::Display for OcrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translation backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorKind {
    /// Remote translation API
    Google,
    /// Local per-language-pair models
    Transformers,
}

impl TranslatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslatorKind::Google => "google",
            TranslatorKind::Transformers => "transformers",
        }
    }
}

impl FromStr for TranslatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(TranslatorKind::Google),
            "transformers" | "local" => Ok(TranslatorKind::Transformers),
            other => Err(ConfigError::UnknownTranslatorKind(other.to_string())),
        }
    }
}

impl fmt::Display for TranslatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run choices (the interactive page's sidebar, or CLI flags)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// `None` means auto-detect per bubble
    pub source_lang: Option<String>,
    pub ocr_kind: OcrKind,
    pub translator_kind: TranslatorKind,
    /// Font file stem; `None` picks the first available font
    pub font_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_is_clamped_to_image() {
        let bbox = BoundingBox::padded([2.0, 3.0, 98.7, 49.2], 5, 100, 50).unwrap();
        assert_eq!(bbox, BoundingBox { x1: 0, y1: 0, x2: 100, y2: 50 });

        let bbox = BoundingBox::padded([20.0, 10.0, 40.0, 30.0], 5, 100, 50).unwrap();
        assert_eq!(bbox, BoundingBox { x1: 15, y1: 5, x2: 45, y2: 35 });
        assert_eq!(bbox.width(), 30);
        assert_eq!(bbox.height(), 30);
    }

    #[test]
    fn test_box_outside_image_is_dropped() {
        assert!(BoundingBox::padded([200.0, 10.0, 260.0, 30.0], 5, 100, 50).is_none());
        assert!(BoundingBox::padded([-40.0, -40.0, -20.0, -10.0], 5, 100, 50).is_none());
    }

    #[test]
    fn test_padded_boxes_hold_invariant() {
        let (w, h) = (64u32, 48u32);
        let raw = [
            [0.0, 0.0, 64.0, 48.0],
            [-10.0, -3.0, 5.0, 2.0],
            [60.0, 40.0, 90.0, 70.0],
            [30.5, 20.9, 31.1, 21.2],
            [10.0, 10.0, 10.0, 10.0],
        ];
        for r in raw {
            if let Some(b) = BoundingBox::padded(r, 5, w, h) {
                assert!(b.x1 < b.x2 && b.x2 <= w, "{b}");
                assert!(b.y1 < b.y2 && b.y2 <= h, "{b}");
            }
        }
    }

    #[test]
    fn test_batch_result_accounting() {
        let mut result = BatchResult::new(3);
        result.record("a.jpg", true);
        result.record("b.jpg", false);
        result.record("c.jpg", true);
        assert_eq!(result.success + result.failed, result.total);
        assert_eq!(result.failed_files, vec!["b.jpg".to_string()]);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Manga".parse::<OcrKind>().unwrap(), OcrKind::Manga);
        assert_eq!(" paddle ".parse::<OcrKind>().unwrap(), OcrKind::Paddle);
        assert!(matches!(
            "tesseract".parse::<OcrKind>(),
            Err(ConfigError::UnknownOcrKind(_))
        ));
        assert_eq!(
            "transformers".parse::<TranslatorKind>().unwrap(),
            TranslatorKind::Transformers
        );
        assert!(matches!(
            "deepl".parse::<TranslatorKind>(),
            Err(ConfigError::UnknownTranslatorKind(_))
        ));
    }
}
