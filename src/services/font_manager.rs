// Font library - the usable fonts of the font directory

use crate::core::errors::{ConfigError, ConfigResult};
use cosmic_text::fontdb;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FONT_EXTENSIONS: [&str; 3] = ["ttf", "otf", "ttc"];

/// One font file that parsed into at least one face
#[derive(Debug, Clone)]
pub struct FontEntry {
    /// File stem, the name users select fonts by
    pub name: String,
    pub path: PathBuf,
    pub families: Vec<String>,
    pub data: Vec<u8>,
}

impl FontEntry {
    /// Family name to request from a font system holding this font
    pub fn primary_family(&self) -> &str {
        self.families.first().map(String::as_str).unwrap_or(&self.name)
    }
}

#[derive(Debug, Default)]
pub struct FontLibrary {
    fonts: Vec<FontEntry>,
}

impl FontLibrary {
    /// Scan `dir` (non-recursive) for font files. Files that fail to parse are skipped.
    pub fn load_dir(dir: &Path) -> ConfigResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|_| ConfigError::NoFonts(dir.to_path_buf()))?;

        let mut fonts = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !has_font_extension(&path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let data = match std::fs::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    warn!("⚠ Cannot read font {}: {}", path.display(), e);
                    continue;
                }
            };

            match FontEntry::parse(name.to_string(), path.clone(), data) {
                Some(font) => {
                    debug!("✓ Font: {} ({:?})", font.name, font.families);
                    fonts.push(font);
                }
                None => warn!("⚠ Skipping unusable font file {}", path.display()),
            }
        }

        if fonts.is_empty() {
            return Err(ConfigError::NoFonts(dir.to_path_buf()));
        }

        fonts.sort_by(|a, b| a.name.cmp(&b.name));
        info!("Loaded {} fonts from {}", fonts.len(), dir.display());
        Ok(Self { fonts })
    }

    /// Library over in-memory font data; unparsable entries are dropped
    pub fn from_bytes(fonts: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        let mut fonts: Vec<FontEntry> = fonts
            .into_iter()
            .filter_map(|(name, data)| {
                let path = PathBuf::from(&name);
                FontEntry::parse(name, path, data)
            })
            .collect();
        fonts.sort_by(|a, b| a.name.cmp(&b.name));
        Self { fonts }
    }

    pub fn names(&self) -> Vec<&str> {
        self.fonts.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn fonts(&self) -> &[FontEntry] {
        &self.fonts
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FontEntry> {
        self.fonts.iter().find(|f| f.name == name)
    }

    /// Named font, or the first one alphabetically when no name is given
    pub fn select(&self, name: Option<&str>) -> ConfigResult<&FontEntry> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| ConfigError::FontNotFound {
                name: name.to_string(),
                available: self.names().into_iter().map(str::to_string).collect(),
            }),
            None => self.fonts.first().ok_or(ConfigError::FontNotFound {
                name: String::new(),
                available: Vec::new(),
            }),
        }
    }
}

impl FontEntry {
    fn parse(name: String, path: PathBuf, data: Vec<u8>) -> Option<Self> {
        let mut db = fontdb::Database::new();
        db.load_font_data(data.clone());

        if db.is_empty() {
            return None;
        }

        let mut families: Vec<String> = db
            .faces()
            .flat_map(|face| face.families.iter().map(|(family, _)| family.clone()))
            .collect();
        families.dedup();

        Some(Self {
            name,
            path,
            families,
            data,
        })
    }
}

fn has_font_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FONT_EXTENSIONS.iter().any(|f| e.eq_ignore_ascii_case(f)))
        .unwrap_or(false)
}
