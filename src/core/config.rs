use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::types::{OcrKind, PipelineOptions, TranslatorKind};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, Level};

/// Working directory layout
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub base_dir: PathBuf,
    pub model_dir: PathBuf,
    pub data_dir: PathBuf,
    pub font_dir: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub box_padding: u32,
    pub target_size: u32,
    /// Detector class ids that count as speech bubbles
    pub labels: Vec<i64>,
    pub inference_backend: Option<String>,
}

/// Recognition configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub kind: OcrKind,
    pub confidence_aware: bool,
    pub confidence_threshold: f32,
    pub tesseract_cmd: String,
    pub paddle_url: String,
    pub use_gpu: bool,
}

/// Translation configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub kind: TranslatorKind,
    /// `None` means auto-detect per bubble
    pub source_lang: Option<String>,
    pub target_lang: String,
    pub supported_languages: Vec<String>,
    pub api_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_tokens: usize,
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    pub font_name: Option<String>,
    pub max_font_size: u32,
    pub min_font_size: u32,
}

/// Input file constraints
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Lower-case extensions without the dot, in enumeration order
    pub supported_extensions: Vec<String>,
    pub max_file_size_mb: u64,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub dirs: DirectoryConfig,
    pub detection: DetectionConfig,
    pub recognition: RecognitionConfig,
    pub translation: TranslationConfig,
    pub rendering: RenderingConfig,
    pub files: FileConfig,
    pub log_level: Level,
}

impl Config {
    pub fn new() -> ConfigResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        config.ensure_directories()?;
        Ok(config)
    }

    /// Defaults rooted at `base_dir`, without reading the environment
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let model_dir = base_dir.join("models");
        let data_dir = base_dir.join("data");

        Self {
            dirs: DirectoryConfig {
                font_dir: data_dir.join("fonts"),
                input_dir: data_dir.join("in"),
                output_dir: data_dir.join("out"),
                model_dir: model_dir.clone(),
                data_dir,
                base_dir,
            },
            detection: DetectionConfig {
                model_path: model_dir.join("detector.onnx"),
                confidence_threshold: 0.25,
                box_padding: 5,
                target_size: 640,
                labels: vec![0],
                inference_backend: None,
            },
            recognition: RecognitionConfig {
                kind: OcrKind::Manga,
                confidence_aware: false,
                confidence_threshold: 0.5,
                tesseract_cmd: "tesseract".to_string(),
                paddle_url: "http://127.0.0.1:8080/ocr".to_string(),
                use_gpu: false,
            },
            translation: TranslationConfig {
                kind: TranslatorKind::Google,
                source_lang: None,
                target_lang: "ru".to_string(),
                supported_languages: vec!["ja".to_string(), "en".to_string()],
                api_url: None,
                timeout: None,
                max_tokens: 256,
            },
            rendering: RenderingConfig {
                font_name: None,
                max_font_size: 36,
                min_font_size: 7,
            },
            files: FileConfig {
                supported_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
                max_file_size_mb: 5,
            },
            log_level: Level::INFO,
        }
    }

    fn load_from_env() -> ConfigResult<Self> {
        let base_dir = env::var("BASE_DIR").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::with_base_dir(base_dir);

        // Directory overrides cascade: DATA_DIR moves fonts/in/out unless they are set too
        if let Ok(dir) = env::var("MODEL_DIR") {
            config.dirs.model_dir = PathBuf::from(dir);
            config.detection.model_path = config.dirs.model_dir.join("detector.onnx");
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            config.dirs.data_dir = PathBuf::from(dir);
            config.dirs.font_dir = config.dirs.data_dir.join("fonts");
            config.dirs.input_dir = config.dirs.data_dir.join("in");
            config.dirs.output_dir = config.dirs.data_dir.join("out");
        }
        if let Ok(dir) = env::var("FONT_DIR") {
            config.dirs.font_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("INPUT_DIR") {
            config.dirs.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("OUTPUT_DIR") {
            config.dirs.output_dir = PathBuf::from(dir);
        }

        // Detection
        if let Ok(path) = env::var("DETECTOR_MODEL_PATH") {
            config.detection.model_path = PathBuf::from(path);
        }
        config.detection.confidence_threshold =
            parse_env("CONFIDENCE_THRESHOLD", config.detection.confidence_threshold);
        config.detection.box_padding = parse_env("BOX_PADDING", config.detection.box_padding);
        config.detection.target_size = parse_env("TARGET_SIZE", config.detection.target_size);
        if let Ok(labels) = env::var("DETECTOR_LABELS") {
            config.detection.labels = split_list(&labels)
                .iter()
                .map(|l| {
                    l.parse::<i64>()
                        .map_err(|_| ConfigError::Invalid(format!("DETECTOR_LABELS: '{}' is not an integer", l)))
                })
                .collect::<ConfigResult<Vec<_>>>()?;
        }
        config.detection.inference_backend = env::var("INFERENCE_BACKEND")
            .ok()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty());

        // Recognition
        if let Ok(kind) = env::var("OCR_KIND") {
            config.recognition.kind = kind.parse()?;
        }
        config.recognition.confidence_aware =
            parse_env("OCR_CONFIDENCE_AWARE", config.recognition.confidence_aware);
        config.recognition.confidence_threshold = parse_env(
            "OCR_CONFIDENCE_THRESHOLD",
            config.recognition.confidence_threshold,
        );
        if let Ok(cmd) = env::var("TESSERACT_CMD") {
            config.recognition.tesseract_cmd = cmd;
        }
        if let Ok(url) = env::var("PADDLE_OCR_URL") {
            config.recognition.paddle_url = url;
        }
        config.recognition.use_gpu = parse_env("OCR_GPU", config.recognition.use_gpu);

        // Translation
        if let Ok(kind) = env::var("TRANSLATOR_KIND") {
            config.translation.kind = kind.parse()?;
        }
        config.translation.source_lang = env::var("SOURCE_LANG").ok().and_then(|s| normalize_lang(&s));
        if let Ok(lang) = env::var("TARGET_LANG") {
            config.translation.target_lang = lang.trim().to_lowercase();
        }
        if let Ok(langs) = env::var("SUPPORTED_LANGUAGES") {
            config.translation.supported_languages =
                split_list(&langs).iter().map(|l| l.to_lowercase()).collect();
        }
        config.translation.api_url = env::var("TRANSLATE_API_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        config.translation.timeout = env::var("TRANSLATE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);
        config.translation.max_tokens =
            parse_env("TRANSLATION_MAX_TOKENS", config.translation.max_tokens);

        // Rendering
        config.rendering.font_name = env::var("FONT_NAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        config.rendering.max_font_size = parse_env("MAX_FONT_SIZE", config.rendering.max_font_size);
        config.rendering.min_font_size = parse_env("MIN_FONT_SIZE", config.rendering.min_font_size);

        // Files
        if let Ok(exts) = env::var("SUPPORTED_EXTENSIONS") {
            config.files.supported_extensions = split_list(&exts)
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect();
        }
        config.files.max_file_size_mb = parse_env("MAX_FILE_SIZE_MB", config.files.max_file_size_mb);

        config.log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| parse_level(&s))
            .unwrap_or(Level::INFO);

        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.detection.confidence_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.recognition.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.recognition.confidence_threshold,
            ));
        }

        if self.detection.target_size == 0 {
            return Err(ConfigError::Invalid("TARGET_SIZE must be positive".to_string()));
        }

        let (min, max) = (self.rendering.min_font_size, self.rendering.max_font_size);
        if min == 0 || min > max {
            return Err(ConfigError::InvalidFontSizeRange { min, max });
        }

        if self.files.supported_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "SUPPORTED_EXTENSIONS must name at least one extension".to_string(),
            ));
        }

        if self.translation.supported_languages.is_empty() {
            return Err(ConfigError::Invalid(
                "SUPPORTED_LANGUAGES must name at least one language".to_string(),
            ));
        }

        if let Some(lang) = &self.translation.source_lang {
            self.check_source_lang(lang)?;
        }

        Ok(())
    }

    /// Reject a source language outside the OCR-supported set
    pub fn check_source_lang(&self, lang: &str) -> ConfigResult<()> {
        if self.translation.supported_languages.iter().any(|l| l == lang) {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedLanguage {
                lang: lang.to_string(),
                supported: self.translation.supported_languages.clone(),
            })
        }
    }

    /// Create missing directories and check the ones that must be populated
    pub fn ensure_directories(&self) -> ConfigResult<()> {
        let dirs = &self.dirs;
        for dir in [
            &dirs.model_dir,
            &dirs.data_dir,
            &dirs.font_dir,
            &dirs.input_dir,
            &dirs.output_dir,
        ] {
            ensure_dir(dir)?;
        }

        for dir in [&dirs.model_dir, &dirs.data_dir, &dirs.font_dir] {
            let mut entries = fs::read_dir(dir).map_err(|source| {
                ConfigError::DirectoryCreationFailed {
                    path: dir.clone(),
                    source,
                }
            })?;
            if entries.next().is_none() {
                return Err(ConfigError::EmptyDirectory(dir.clone()));
            }
        }

        Ok(())
    }

    /// Per-run choices as configured, before any CLI override
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            source_lang: self.translation.source_lang.clone(),
            ocr_kind: self.recognition.kind,
            translator_kind: self.translation.kind,
            font_name: self.rendering.font_name.clone(),
        }
    }

    /// Languages handed to the OCR engines: the fixed source, or every supported one
    pub fn ocr_languages(&self, source_lang: Option<&str>) -> Vec<String> {
        match source_lang {
            Some(lang) => vec![lang.to_string()],
            None => self.translation.supported_languages.clone(),
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.files.max_file_size_mb * 1024 * 1024
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.detection.confidence_threshold
    }

    pub fn target_size(&self) -> u32 {
        self.detection.target_size
    }

    pub fn target_lang(&self) -> &str {
        &self.translation.target_lang
    }

    pub fn font_dir(&self) -> &Path {
        &self.dirs.font_dir
    }

    pub fn model_dir(&self) -> &Path {
        &self.dirs.model_dir
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }
}

fn ensure_dir(dir: &Path) -> ConfigResult<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.to_path_buf()));
        }
        return Ok(());
    }

    debug!("Creating directory {}", dir.display());
    fs::create_dir_all(dir).map_err(|source| ConfigError::DirectoryCreationFailed {
        path: dir.to_path_buf(),
        source,
    })
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `auto` and empty mean "detect per bubble"
pub fn normalize_lang(value: &str) -> Option<String> {
    let lang = value.trim().to_lowercase();
    if lang.is_empty() || lang == "auto" {
        None
    } else {
        Some(lang)
    }
}

pub fn parse_level(value: &str) -> Option<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}
