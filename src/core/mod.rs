pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ConfigError, DetectionError, PipelineError, RecognitionError, RenderingError,
    TranslationError,
};
pub use types::{
    BatchResult, BoundingBox, OcrKind, PipelineOptions, RawDetection, TextRegion,
    TranslatorKind,
};
