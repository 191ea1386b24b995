// Bubble / image / batch pipeline: detect → crop → OCR → translate → erase → re-render

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{ConfigError, ConfigResult, ErrorContext, PipelineError, PipelineResult};
use crate::core::types::{BatchResult, BoundingBox, PipelineOptions, TextRegion};
use crate::services::detection::{BubbleDetector, RegionDetector};
use crate::services::ocr::{create_recognizer, TextRecognizer};
use crate::services::rendering::TextInpainter;
use crate::services::translation::{MultiLanguageTranslator, Translator};
use crate::utils::image_ops::paste;

/// Owns every model and font handle for the session. One image is processed at a time;
/// its buffer is threaded through the bubbles in detection order, so overlapping boxes
/// see each other's edits.
pub struct MangaTranslatorPipeline {
    detector: Box<dyn RegionDetector>,
    recognizer: Option<Box<dyn TextRecognizer>>,
    translator: Box<dyn Translator>,
    inpainter: TextInpainter,
    source_lang: Option<String>,
    target_lang: String,
    extensions: Vec<String>,
}

impl MangaTranslatorPipeline {
    /// Load the detector, the OCR backend, the translator and the font for `options`
    #[instrument(skip(config))]
    pub fn new(config: &Config, options: PipelineOptions) -> ConfigResult<Self> {
        info!("Initializing pipeline...");

        if let Some(lang) = options.source_lang.as_deref() {
            config.check_source_lang(lang)?;
        }

        let detector = BubbleDetector::from_config(&config.detection).map_err(|source| {
            ConfigError::BackendInit {
                component: "detector",
                source,
            }
        })?;

        let languages = config.ocr_languages(options.source_lang.as_deref());
        let recognizer = create_recognizer(options.ocr_kind, config, &languages)?;
        let translator = MultiLanguageTranslator::from_config(options.translator_kind, config)?;
        let inpainter = TextInpainter::from_config(config, options.font_name.as_deref())?;

        info!(
            "✓ Ready (ocr: {}, translator: {}, {} → {})",
            options.ocr_kind,
            options.translator_kind,
            options.source_lang.as_deref().unwrap_or("auto"),
            config.target_lang()
        );

        Ok(Self::from_parts(
            Box::new(detector),
            Some(recognizer),
            Box::new(translator),
            inpainter,
            config.target_lang(),
        )
        .with_source_lang(options.source_lang)
        .with_extensions(config.files.supported_extensions.clone()))
    }

    /// Assemble a pipeline from already-built components. No recognizer means every bubble is skipped.
    pub fn from_parts(
        detector: Box<dyn RegionDetector>,
        recognizer: Option<Box<dyn TextRecognizer>>,
        translator: Box<dyn Translator>,
        inpainter: TextInpainter,
        target_lang: &str,
    ) -> Self {
        Self {
            detector,
            recognizer,
            translator,
            inpainter,
            source_lang: None,
            target_lang: target_lang.to_string(),
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }

    /// Fixed source language; `None` auto-detects per bubble
    pub fn with_source_lang(mut self, source_lang: Option<String>) -> Self {
        self.source_lang = source_lang;
        self
    }

    /// File extensions picked up by [`Self::process_batch`], without the dot
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    /// Translate one bubble of `image` in place.
    ///
    /// Empty or whitespace-only OCR output leaves the region untouched.
    pub fn process_single_bubble(
        &self,
        image: &mut RgbImage,
        bbox: BoundingBox,
        bubble_index: usize,
    ) -> PipelineResult<()> {
        let Some(recognizer) = self.recognizer.as_ref() else {
            warn!("No OCR backend configured, skipping bubble {}", bubble_index);
            return Ok(());
        };

        let region = TextRegion::crop_from(image, bbox);
        let recognized = recognizer.recognize(&region.crop);
        let text = recognized.trim();
        if text.is_empty() {
            debug!("Bubble {} {}: no text", bubble_index, bbox);
            return Ok(());
        }

        let translated = self
            .translator
            .translate(text, self.source_lang.as_deref(), &self.target_lang);
        debug!("Bubble {} {}: '{}' → '{}'", bubble_index, bbox, text, translated);

        let (cleaned, mask) = self
            .inpainter
            .remove_text(&region.crop)
            .with_bubble_context(bubble_index)?;
        let rendered = self
            .inpainter
            .draw_text(&cleaned, &mask, &translated)
            .with_bubble_context(bubble_index)?;

        paste(image, &rendered, region.bbox.x1, region.bbox.y1);
        Ok(())
    }

    /// Translate every bubble of one image and write the result.
    ///
    /// Returns `false` (after logging the cause) on any failure; never panics into the caller.
    #[instrument(skip(self), fields(file = %input.display()))]
    pub fn process_image(&self, input: &Path, output: &Path) -> bool {
        let start = Instant::now();
        match self.try_process_image(input, output) {
            Ok(bubbles) => {
                info!(
                    "✓ {} bubbles → {} ({:.0}ms)",
                    bubbles,
                    output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
                true
            }
            Err(e) => {
                error!("Failed to process {}: {}", input.display(), e);
                false
            }
        }
    }

    fn try_process_image(&self, input: &Path, output: &Path) -> PipelineResult<usize> {
        let (mut image, boxes) = self.detector.detect_path(input)?;

        if boxes.is_empty() {
            info!("No bubbles detected, copying image unchanged");
        }

        for (index, bbox) in boxes.iter().enumerate() {
            self.process_single_bubble(&mut image, *bbox, index)?;
        }

        image.save(output).map_err(|source| PipelineError::WriteFailed {
            path: output.to_path_buf(),
            source,
        })?;
        Ok(boxes.len())
    }

    /// Run [`Self::process_image`] over every supported file of `input_dir`.
    ///
    /// A failing file is counted and named in the result; the rest still run.
    #[instrument(skip(self), fields(input = %input_dir.display(), output = %output_dir.display()))]
    pub fn process_batch(&self, input_dir: &Path, output_dir: &Path) -> BatchResult {
        let files = match self.collect_inputs(input_dir) {
            Ok(files) => files,
            Err(e) => {
                error!("{}", e);
                return BatchResult::new(0);
            }
        };

        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Cannot create output directory {}: {}", output_dir.display(), e);
        }

        let total = files.len();
        info!("Processing {} images", total);

        let mut result = BatchResult::new(total);
        for (i, path) in files.iter().enumerate() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("[{}/{}] {}", i + 1, total, name);

            let success = self.process_image(path, &output_dir.join(&name));
            result.record(&name, success);
        }

        info!(
            "Batch done: {}/{} succeeded, {} failed",
            result.success, result.total, result.failed
        );
        result
    }

    /// Files directly under `dir`, grouped by extension in configured order, sorted by name
    pub fn collect_inputs(&self, dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let read_dir_failed = |source| PipelineError::ReadDirFailed {
            path: dir.to_path_buf(),
            source,
        };

        let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(read_dir_failed)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        candidates.sort();

        let mut files = Vec::with_capacity(candidates.len());
        for ext in &self.extensions {
            files.extend(
                candidates
                    .iter()
                    .filter(|path| {
                        path.extension()
                            .and_then(|e| e.to_str())
                            .map(|e| e.eq_ignore_ascii_case(ext))
                            .unwrap_or(false)
                    })
                    .cloned(),
            );
        }
        files.dedup();
        Ok(files)
    }
}
