// Command-line entry point: single image, batch directory, font listing and preview

use manga_translator::{
    core::{config::normalize_lang, Config, OcrKind, PipelineOptions, TranslatorKind},
    orchestration::MangaTranslatorPipeline,
    services::{FontLibrary, TextInpainter},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about = "Translate the speech bubbles of comic pages", long_about = None)]
struct Cli {
    /// Source language (ja, en, ...) or "auto" to detect per bubble
    #[arg(long, global = true, value_name = "LANG")]
    source_lang: Option<String>,

    /// OCR backend: manga, doctr, easy or paddle
    #[arg(long, global = true, value_name = "KIND")]
    ocr: Option<OcrKind>,

    /// Translation backend: google or transformers
    #[arg(long, global = true, value_name = "KIND")]
    translator: Option<TranslatorKind>,

    /// Font file name (without extension) from the font directory
    #[arg(long, global = true, value_name = "NAME")]
    font: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a single image
    Translate { input: PathBuf, output: PathBuf },

    /// Translate every supported image of a directory
    Batch {
        /// Defaults to the configured input directory
        input_dir: Option<PathBuf>,
        /// Defaults to the configured output directory
        output_dir: Option<PathBuf>,
        /// Print the aggregate result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the usable fonts
    Fonts,

    /// Render a sample word with a font
    PreviewFont {
        name: String,
        #[arg(long, default_value_t = 24)]
        size: u32,
        #[arg(long, default_value = "preview.png")]
        out: PathBuf,
    },
}

impl Cli {
    /// Configured options with the command-line overrides applied
    fn pipeline_options(&self, config: &Config) -> PipelineOptions {
        let mut options = config.pipeline_options();
        if let Some(lang) = self.source_lang.as_deref() {
            options.source_lang = normalize_lang(lang);
        }
        if let Some(kind) = self.ocr {
            options.ocr_kind = kind;
        }
        if let Some(kind) = self.translator {
            options.translator_kind = kind;
        }
        if let Some(font) = &self.font {
            options.font_name = Some(font.clone());
        }
        options
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::new().context("Failed to load configuration")?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_translator={},ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Command::Translate { input, output } => {
            let size = std::fs::metadata(input)
                .with_context(|| format!("Cannot read {}", input.display()))?
                .len();
            if size > config.max_file_size_bytes() {
                anyhow::bail!(
                    "{} is {:.1} MB, larger than the {} MB limit",
                    input.display(),
                    size as f64 / (1024.0 * 1024.0),
                    config.files.max_file_size_mb
                );
            }

            let pipeline = MangaTranslatorPipeline::new(&config, cli.pipeline_options(&config))?;
            if pipeline.process_image(input, output) {
                println!("✓ Saved {}", output.display());
            } else {
                anyhow::bail!("Failed to translate {} (see log for details)", input.display());
            }
        }

        Command::Batch {
            input_dir,
            output_dir,
            json,
        } => {
            let input_dir = input_dir.clone().unwrap_or_else(|| config.dirs.input_dir.clone());
            let output_dir = output_dir.clone().unwrap_or_else(|| config.dirs.output_dir.clone());

            let pipeline = MangaTranslatorPipeline::new(&config, cli.pipeline_options(&config))?;
            let result = pipeline.process_batch(&input_dir, &output_dir);

            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "Processed {} images: {} succeeded, {} failed",
                    result.total, result.success, result.failed
                );
                for name in &result.failed_files {
                    println!("  ✗ {}", name);
                }
            }
            if result.failed > 0 {
                error!("{} of {} images failed", result.failed, result.total);
            }
        }

        Command::Fonts => {
            let library = FontLibrary::load_dir(config.font_dir())?;
            for font in library.fonts() {
                println!("{}\t{}", font.name, font.families.join(", "));
            }
        }

        Command::PreviewFont { name, size, out } => {
            let library = FontLibrary::load_dir(config.font_dir())?;
            let font = library.select(Some(name))?;
            TextInpainter::preview_font(font, *size)
                .save(out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!("Preview of {} at {}px", font.name, size);
            println!("✓ Saved {}", out.display());
        }
    }

    Ok(())
}
