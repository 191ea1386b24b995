// Translation with language auto-detection and a never-fail fallback to the input text

pub mod google;
pub mod marian;

use crate::core::config::Config;
use crate::core::errors::{ConfigError, ConfigResult, TranslationResult};
use crate::core::types::TranslatorKind;
use tracing::{debug, error, info, warn};

pub use google::GoogleTranslateBackend;
pub use marian::{LocalModelsBackend, MarianModel};

/// What the bubble pipeline calls. Never fails: on any problem the input comes back unchanged.
pub trait Translator {
    fn translate(&self, text: &str, source_lang: Option<&str>, target_lang: &str) -> String;
}

/// A concrete translation service for a known language pair
pub trait TranslationBackend {
    fn name(&self) -> &'static str;

    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> TranslationResult<String>;
}

pub struct MultiLanguageTranslator {
    backend: Box<dyn TranslationBackend>,
    supported_languages: Vec<String>,
}

impl MultiLanguageTranslator {
    pub fn new(backend: Box<dyn TranslationBackend>, supported_languages: Vec<String>) -> Self {
        Self {
            backend,
            supported_languages,
        }
    }

    pub fn from_config(kind: TranslatorKind, config: &Config) -> ConfigResult<Self> {
        let tr = &config.translation;
        let backend: Box<dyn TranslationBackend> = match kind {
            TranslatorKind::Google => Box::new(
                GoogleTranslateBackend::new(tr.api_url.as_deref(), tr.timeout).map_err(|source| {
                    ConfigError::BackendInit {
                        component: "translator",
                        source,
                    }
                })?,
            ),
            TranslatorKind::Transformers => Box::new(LocalModelsBackend::load(
                config.model_dir(),
                &tr.supported_languages,
                &tr.target_lang,
                tr.max_tokens,
                config.detection.inference_backend.as_deref(),
            )),
        };

        info!("Translator initialized ({})", backend.name());
        Ok(Self::new(backend, tr.supported_languages.clone()))
    }

    /// Detected language if it is one of the supported ones
    pub fn detect_language(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        let code = iso639_1(info.lang().code())?;
        debug!(
            "Detected language {} (confidence {:.2})",
            code,
            info.confidence()
        );
        self.supported_languages
            .iter()
            .any(|l| l == code)
            .then(|| code.to_string())
    }
}

impl Translator for MultiLanguageTranslator {
    fn translate(&self, text: &str, source_lang: Option<&str>, target_lang: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let source_lang = match source_lang {
            Some(lang) => lang.to_string(),
            None => match self.detect_language(text) {
                Some(lang) => lang,
                None => {
                    warn!("Could not determine language of '{}', leaving it untranslated", text);
                    return text.to_string();
                }
            },
        };

        if source_lang == target_lang {
            return text.to_string();
        }

        info!("Translating {} → {}: '{}'", source_lang, target_lang, text);
        match self.backend.translate(text, &source_lang, target_lang) {
            Ok(translated) => translated,
            Err(e) => {
                error!("Translation failed ({}): {}", self.backend.name(), e);
                text.to_string()
            }
        }
    }
}

/// whatlang ISO-639-3 code → ISO-639-1
fn iso639_1(code: &str) -> Option<&'static str> {
    Some(match code {
        "jpn" => "ja",
        "eng" => "en",
        "rus" => "ru",
        "cmn" => "zh",
        "kor" => "ko",
        "deu" => "de",
        "fra" => "fr",
        "spa" => "es",
        "ita" => "it",
        "por" => "pt",
        "ukr" => "uk",
        _ => return None,
    })
}
