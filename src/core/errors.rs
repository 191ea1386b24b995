// Error types for the translation pipeline
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation (file path, bubble index)
// - Type-safe error matching
// - Source error chaining

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors (fatal at construction time)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown OCR kind '{0}' (expected one of: manga, doctr, easy, paddle)")]
    UnknownOcrKind(String),

    #[error("Unknown translator kind '{0}' (expected one of: google, transformers)")]
    UnknownTranslatorKind(String),

    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    #[error("{0} must not be empty")]
    EmptyDirectory(PathBuf),

    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No usable fonts found in {0}")]
    NoFonts(PathBuf),

    #[error("Font '{name}' not found (available: {available:?})")]
    FontNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("Invalid font size range: min={min}, max={max}")]
    InvalidFontSizeRange { min: u32, max: u32 },

    #[error("Source language '{lang}' is not in the supported set {supported:?}")]
    UnsupportedLanguage {
        lang: String,
        supported: Vec<String>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to initialize {component}: {source}")]
    BackendInit {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Region detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Detector inference failed: {0}")]
    InferenceFailed(#[source] anyhow::Error),
}

/// Text recognition errors (kept inside the recognizer boundary)
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("OCR engine failed: {0}")]
    EngineFailed(#[source] anyhow::Error),

    #[error("Unexpected OCR output: {0}")]
    InvalidOutput(String),
}

/// Translation errors (kept inside the translator boundary)
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No translation model for source language '{0}'")]
    NoModelForLanguage(String),

    #[error("Local model inference failed: {0}")]
    ModelFailed(#[source] anyhow::Error),
}

/// Text erasure / rendering errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("No bright region found in a {width}x{height} crop")]
    NoTextMask { width: u32, height: u32 },

    #[error("No font available for rendering")]
    NoFont,
}

/// Pipeline orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("Rendering failed for bubble {bubble_index}: {source}")]
    RenderingFailed {
        bubble_index: usize,
        #[source]
        source: RenderingError,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to read input directory {path}: {source}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type RecognitionResult<T> = Result<T, RecognitionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Attach bubble context to rendering failures
pub trait ErrorContext<T> {
    fn with_bubble_context(self, bubble_index: usize) -> PipelineResult<T>;
}

impl<T> ErrorContext<T> for RenderingResult<T> {
    fn with_bubble_context(self, bubble_index: usize) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::RenderingFailed {
            bubble_index,
            source,
        })
    }
}
