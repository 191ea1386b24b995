// Tesseract subprocess engine: TSV output parsed into a block/paragraph/line/word tree

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};
use std::collections::BTreeMap;
use std::process::Command;
use tracing::{debug, trace};

/// A recognized word with confidence in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrLine {
    pub words: Vec<OcrWord>,
}

impl OcrLine {
    pub fn text(&self) -> String {
        join_words(self.words.iter())
    }

    /// Mean word confidence, 0 for an empty line
    pub fn confidence(&self) -> f32 {
        if self.words.is_empty() {
            return 0.0;
        }
        self.words.iter().map(|w| w.confidence).sum::<f32>() / self.words.len() as f32
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrParagraph {
    pub lines: Vec<OcrLine>,
}

impl OcrParagraph {
    pub fn text(&self) -> String {
        join_words(self.lines.iter().flat_map(|l| l.words.iter()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrBlock {
    pub paragraphs: Vec<OcrParagraph>,
}

/// Layout tree for one crop, in reading order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrPage {
    pub blocks: Vec<OcrBlock>,
}

impl OcrPage {
    pub fn paragraphs(&self) -> impl Iterator<Item = &OcrParagraph> {
        self.blocks.iter().flat_map(|b| b.paragraphs.iter())
    }

    pub fn lines(&self) -> impl Iterator<Item = &OcrLine> {
        self.paragraphs().flat_map(|p| p.lines.iter())
    }

    pub fn words(&self) -> impl Iterator<Item = &OcrWord> {
        self.lines().flat_map(|l| l.words.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.words().next().is_none()
    }
}

fn join_words<'a>(words: impl Iterator<Item = &'a OcrWord>) -> String {
    words.map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
}

/// An OCR engine that returns a layout tree for a crop
pub trait LayoutEngine {
    fn read(&self, crop: &RgbImage) -> Result<OcrPage>;
}

/// Runs the `tesseract` binary on a temporary PNG
pub struct TesseractEngine {
    command: String,
    languages: String,
    psm: u32,
}

impl TesseractEngine {
    /// `languages` are ISO-639-1 codes; they are mapped to tesseract traineddata names
    pub fn new(command: impl Into<String>, languages: &[String]) -> Self {
        let languages = languages
            .iter()
            .map(|l| tesseract_language(l))
            .collect::<Vec<_>>()
            .join("+");

        Self {
            command: command.into(),
            languages,
            // Single uniform block: bubble crops are one text area
            psm: 6,
        }
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    fn run_tsv(&self, path: &std::path::Path) -> Result<String> {
        let output = Command::new(&self.command)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()
            .with_context(|| format!("failed to run {} (is it installed?)", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("tesseract failed: {}", stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl LayoutEngine for TesseractEngine {
    fn read(&self, crop: &RgbImage) -> Result<OcrPage> {
        let file = tempfile::Builder::new()
            .prefix("bubble-")
            .suffix(".png")
            .tempfile()
            .context("Failed to create temporary crop file")?;
        crop.save_with_format(file.path(), ImageFormat::Png)
            .context("Failed to write temporary crop file")?;

        let tsv = self.run_tsv(file.path())?;
        let page = parse_tsv(&tsv);
        debug!(
            "Tesseract ({}) read {} words",
            self.languages,
            page.words().count()
        );
        Ok(page)
    }
}

/// ISO-639-1 → tesseract traineddata name
pub fn tesseract_language(lang: &str) -> String {
    match lang {
        "ja" => "jpn",
        "en" => "eng",
        "ru" => "rus",
        "zh" => "chi_sim",
        "ko" => "kor",
        "de" => "deu",
        "fr" => "fra",
        "es" => "spa",
        other => other,
    }
    .to_string()
}

/// Build the layout tree from `tesseract ... tsv` output.
///
/// Only word rows (level 5) with a non-negative confidence and non-empty text are kept.
pub fn parse_tsv(tsv: &str) -> OcrPage {
    // block -> paragraph -> line -> words, keyed by tesseract's reading-order numbers
    let mut tree: BTreeMap<i32, BTreeMap<i32, BTreeMap<i32, Vec<OcrWord>>>> = BTreeMap::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let block_num: i32 = cols[2].parse().unwrap_or(0);
        let par_num: i32 = cols[3].parse().unwrap_or(0);
        let line_num: i32 = cols[4].parse().unwrap_or(0);
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        trace!("word b{} p{} l{}: '{}' ({:.1})", block_num, par_num, line_num, text, conf);
        tree.entry(block_num)
            .or_default()
            .entry(par_num)
            .or_default()
            .entry(line_num)
            .or_default()
            .push(OcrWord {
                text: text.to_string(),
                confidence: (conf / 100.0).clamp(0.0, 1.0),
            });
    }

    OcrPage {
        blocks: tree
            .into_values()
            .map(|paragraphs| OcrBlock {
                paragraphs: paragraphs
                    .into_values()
                    .map(|lines| OcrParagraph {
                        lines: lines.into_values().map(|words| OcrLine { words }).collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        std::iter::once(HEADER)
            .chain(rows.iter().copied())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_parse_tsv_builds_hierarchy() {
        let input = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t50\t-1\t",
            "4\t1\t1\t1\t1\t0\t2\t2\t60\t10\t-1\t",
            "5\t1\t1\t1\t1\t1\t2\t2\t20\t10\t96.5\tHELLO",
            "5\t1\t1\t1\t1\t2\t30\t2\t20\t10\t91.0\tthere",
            "5\t1\t1\t1\t2\t1\t2\t14\t20\t10\t40.0\tGeneral",
            "5\t1\t1\t2\t1\t1\t2\t30\t20\t10\t88.0\tKenobi",
            "5\t1\t2\t1\t1\t1\t2\t40\t20\t10\t75.0\t!",
        ]);

        let page = parse_tsv(&input);
        assert_eq!(page.blocks.len(), 2);
        assert_eq!(page.blocks[0].paragraphs.len(), 2);
        assert_eq!(page.blocks[0].paragraphs[0].lines.len(), 2);
        assert_eq!(page.blocks[0].paragraphs[0].text(), "HELLO there General");
        assert_eq!(page.lines().count(), 4);
        assert_eq!(page.words().count(), 5);

        let first_line = &page.blocks[0].paragraphs[0].lines[0];
        assert!((first_line.confidence() - 0.9375).abs() < 1e-4);
    }

    #[test]
    fn test_parse_tsv_skips_empty_and_unconfident_rows() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t5\t5\t-1\tghost",
            "5\t1\t1\t1\t1\t2\t0\t0\t5\t5\t80\t   ",
            "5\t1\t1\t1\t1\t3\t0\t0\t5\t5\tbad",
        ]);
        assert!(parse_tsv(&input).is_empty());
        assert!(parse_tsv("").is_empty());
    }

    #[test]
    fn test_language_mapping() {
        let engine = TesseractEngine::new("tesseract", &["ja".to_string(), "en".to_string()]);
        assert_eq!(engine.languages(), "jpn+eng");
        assert_eq!(tesseract_language("xx"), "xx");
    }
}
