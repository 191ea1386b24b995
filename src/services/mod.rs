pub mod detection;
pub mod font_manager;
pub mod ocr;
pub mod onnx_builder;
pub mod rendering;
pub mod translation;

// Re-export commonly used services
pub use detection::{BubbleDetector, DetectionModel, OnnxDetectionModel, RegionDetector};
pub use font_manager::{FontEntry, FontLibrary};
pub use ocr::{create_recognizer, TextRecognizer};
pub use rendering::{FontLayout, TextInpainter, TextMask};
pub use translation::{MultiLanguageTranslator, TranslationBackend, Translator};
