// Library exports for the comic bubble translation workflow

pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{ConfigError, DetectionError, PipelineError, RecognitionError, RenderingError, TranslationError},
    types::{BatchResult, BoundingBox, OcrKind, PipelineOptions, TextRegion, TranslatorKind},
};

pub use orchestration::MangaTranslatorPipeline;

pub use services::{
    FontLibrary, MultiLanguageTranslator, RegionDetector, TextInpainter, TextRecognizer, Translator,
};
