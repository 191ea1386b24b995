// Text erasure and re-rendering inside a bubble crop

use crate::core::config::Config;
use crate::core::errors::{ConfigResult, RenderingError, RenderingResult};
use crate::services::font_manager::{FontEntry, FontLibrary};
use cosmic_text::{
    fontdb, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache,
    Wrap,
};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

/// Gray level above which a pixel counts as bubble background
const BRIGHT_THRESHOLD: u8 = 240;
const LINE_SPACING: f32 = 1.2;
const AVG_CHAR_WIDTH: f32 = 0.9;
const HEIGHT_FILL: f32 = 0.9;
const FALLBACK_WRAP_WIDTH: usize = 20;

const PREVIEW_TEXT: &str = "Привет";
const PREVIEW_SIZE: (u32, u32) = (300, 60);

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// 8-neighbourhood offsets for the outline pass
const OUTLINE_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Outer contour of the largest bright blob of a crop
#[derive(Debug, Clone, PartialEq)]
pub struct TextMask {
    pub points: Vec<Point<i32>>,
}

impl TextMask {
    /// Shoelace area of the contour polygon
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Upright bounding rectangle `(x, y, width, height)`, edges inclusive
    pub fn bounding_rect(&self) -> (i32, i32, u32, u32) {
        let min_x = self.points.iter().map(|p| p.x).min().unwrap_or(0);
        let max_x = self.points.iter().map(|p| p.x).max().unwrap_or(0);
        let min_y = self.points.iter().map(|p| p.y).min().unwrap_or(0);
        let max_y = self.points.iter().map(|p| p.y).max().unwrap_or(0);
        (
            min_x,
            min_y,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }
}

/// Chosen font size and the text wrapped for it
#[derive(Debug, Clone, PartialEq)]
pub struct FontLayout {
    pub size: u32,
    pub lines: Vec<String>,
}

struct LoadedFont {
    family: String,
    font_system: Mutex<FontSystem>,
    swash_cache: Mutex<SwashCache>,
}

impl LoadedFont {
    fn new(font: &FontEntry) -> Self {
        let mut db = fontdb::Database::new();
        db.load_font_data(font.data.clone());

        Self {
            family: font.primary_family().to_string(),
            font_system: Mutex::new(FontSystem::new_with_locale_and_db("en-US".to_string(), db)),
            swash_cache: Mutex::new(SwashCache::new()),
        }
    }

    /// Shape one unwrapped line; returns the buffer and its advance width
    fn shape_line(&self, text: &str, font_size: f32) -> (Buffer, f32) {
        let mut font_system = self.font_system.lock();

        let metrics = Metrics::new(font_size, font_size * LINE_SPACING);
        let mut buffer = Buffer::new(&mut font_system, metrics);
        buffer.set_wrap(&mut font_system, Wrap::None);

        let attrs = Attrs::new().family(Family::Name(&self.family));
        buffer.set_text(&mut font_system, text, &attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut font_system, false);

        let width = buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0f32, f32::max);
        (buffer, width)
    }

    /// Alpha-blend the shaped buffer into `img` with its top-left corner at (x, y)
    fn draw(&self, img: &mut RgbImage, buffer: &Buffer, color: Rgb<u8>, x: i32, y: i32) {
        let mut font_system = self.font_system.lock();
        let mut swash_cache = self.swash_cache.lock();
        let cosmic_color = CosmicColor::rgb(color[0], color[1], color[2]);
        let (width, height) = (img.width() as i32, img.height() as i32);

        buffer.draw(&mut font_system, &mut swash_cache, cosmic_color, |px_x, px_y, _w, _h, pixel_color| {
            let img_x = x + px_x;
            let img_y = y + px_y;
            if img_x < 0 || img_x >= width || img_y < 0 || img_y >= height {
                return;
            }

            let existing = img.get_pixel(img_x as u32, img_y as u32);
            let alpha = pixel_color.a() as f32 / 255.0;
            let inv_alpha = 1.0 - alpha;

            let blended = Rgb([
                ((pixel_color.r() as f32 * alpha) + (existing[0] as f32 * inv_alpha)) as u8,
                ((pixel_color.g() as f32 * alpha) + (existing[1] as f32 * inv_alpha)) as u8,
                ((pixel_color.b() as f32 * alpha) + (existing[2] as f32 * inv_alpha)) as u8,
            ]);
            img.put_pixel(img_x as u32, img_y as u32, blended);
        });
    }
}

/// Erases the original glyphs of a bubble and draws replacement text in their place.
///
/// Erasure floods the dominant bright blob white instead of reconstructing texture,
/// so text is always drawn black over a white outline to stay legible.
pub struct TextInpainter {
    font: Option<LoadedFont>,
    max_font_size: u32,
    min_font_size: u32,
}

impl TextInpainter {
    /// `font = None` yields an inpainter that can erase but not draw
    pub fn new(font: Option<&FontEntry>, max_font_size: u32, min_font_size: u32) -> Self {
        if let Some(font) = font {
            info!("✓ Renderer font: {} ({})", font.name, font.primary_family());
        }
        Self {
            font: font.map(LoadedFont::new),
            max_font_size,
            min_font_size,
        }
    }

    /// Font from the configured font directory; `font_name = None` takes the first one
    pub fn from_config(config: &Config, font_name: Option<&str>) -> ConfigResult<Self> {
        let library = FontLibrary::load_dir(config.font_dir())?;
        let font = library.select(font_name)?;
        Ok(Self::new(
            Some(font),
            config.rendering.max_font_size,
            config.rendering.min_font_size,
        ))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Flood the largest near-white external contour of `crop` white.
    /// Returns the cleaned crop and that contour.
    pub fn remove_text(&self, crop: &RgbImage) -> RenderingResult<(RgbImage, TextMask)> {
        let mask = bright_region_mask(crop).ok_or(RenderingError::NoTextMask {
            width: crop.width(),
            height: crop.height(),
        })?;
        trace!(
            "Text mask: {} points, area {:.1}",
            mask.points.len(),
            mask.area()
        );

        let mut cleaned = crop.clone();
        fill_contour(&mut cleaned, &mask.points, WHITE);
        Ok((cleaned, mask))
    }

    /// Largest size in `[min, max]` whose wrapped block fits 90% of the box height.
    /// Falls back to `min` wrapped at 20 characters when nothing fits.
    pub fn calculate_font_size(text: &str, (width, height): (u32, u32), max: u32, min: u32) -> FontLayout {
        for size in (min..=max).rev() {
            let avg_char_width = size as f32 * AVG_CHAR_WIDTH;
            let max_chars = (width as f32 / avg_char_width) as usize;
            if max_chars == 0 {
                continue;
            }

            let lines = wrap_lines(text, max_chars);
            let block_height = lines.len() as f32 * size as f32 * LINE_SPACING;
            if block_height < height as f32 * HEIGHT_FILL {
                return FontLayout { size, lines };
            }
        }

        debug!("No font size in [{}, {}] fits {}x{}, using fallback", min, max, width, height);
        FontLayout {
            size: min,
            lines: wrap_lines(text, FALLBACK_WRAP_WIDTH),
        }
    }

    /// Center `text` inside the bounding rectangle of `mask`, white outline under black fill
    pub fn draw_text(&self, crop: &RgbImage, mask: &TextMask, text: &str) -> RenderingResult<RgbImage> {
        let font = self.font.as_ref().ok_or(RenderingError::NoFont)?;
        let (x, y, w, h) = mask.bounding_rect();

        let layout = Self::calculate_font_size(text, (w, h), self.max_font_size, self.min_font_size);
        let size = layout.size as f32;
        let line_height = size * LINE_SPACING;
        let total_height = layout.lines.len() as f32 * line_height;

        debug!(
            "Drawing {} lines at {}px in {}x{} at ({}, {})",
            layout.lines.len(),
            layout.size,
            w,
            h,
            x,
            y
        );

        let mut result = crop.clone();
        let mut y_offset = y as f32 + (h as f32 - total_height) / 2.0;

        for line in &layout.lines {
            let (buffer, line_width) = font.shape_line(line, size);
            let x_offset = (x as f32 + (w as f32 - line_width) / 2.0) as i32;
            let y_line = y_offset as i32;

            for (dx, dy) in OUTLINE_OFFSETS {
                font.draw(&mut result, &buffer, WHITE, x_offset + dx, y_line + dy);
            }
            font.draw(&mut result, &buffer, BLACK, x_offset, y_line);

            y_offset += line_height;
        }

        Ok(result)
    }

    /// Sample word in black on a white 300x60 canvas
    pub fn preview_font(font: &FontEntry, size: u32) -> RgbImage {
        let loaded = LoadedFont::new(font);
        let mut canvas = RgbImage::from_pixel(PREVIEW_SIZE.0, PREVIEW_SIZE.1, WHITE);
        let (buffer, _) = loaded.shape_line(PREVIEW_TEXT, size as f32);
        loaded.draw(&mut canvas, &buffer, BLACK, 10, 10);
        canvas
    }
}

/// Grayscale, threshold, and pick the external contour with the largest area
fn bright_region_mask(crop: &RgbImage) -> Option<TextMask> {
    let gray = image::imageops::grayscale(crop);
    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > BRIGHT_THRESHOLD {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    find_contours::<i32>(&binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none() && !c.points.is_empty())
        .map(|c| TextMask { points: c.points })
        .fold(None, |best: Option<TextMask>, mask| match best {
            Some(b) if b.area() >= mask.area() => Some(b),
            _ => Some(mask),
        })
}

fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice as f64 / 2.0).abs()
}

/// Fill the polygon and its boundary pixels
fn fill_contour(img: &mut RgbImage, points: &[Point<i32>], color: Rgb<u8>) {
    let mut polygon = points.to_vec();
    polygon.dedup();
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }

    if polygon.len() >= 3 {
        draw_polygon_mut(img, &polygon, color);
    }
    for p in points {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < img.width() && (p.y as u32) < img.height() {
            img.put_pixel(p.x as u32, p.y as u32, color);
        }
    }
}

fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let options = textwrap::Options::new(width.max(1)).break_words(true);
    textwrap::wrap(text, options)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    fn system_font() -> Option<FontEntry> {
        let data = std::fs::read(SYSTEM_FONT).ok()?;
        FontLibrary::from_bytes([("DejaVuSans".to_string(), data)])
            .fonts()
            .first()
            .cloned()
    }

    /// Gray page with a white bubble and a dark "glyph" inside it
    fn bubble_crop() -> RgbImage {
        let mut img = RgbImage::from_pixel(100, 80, Rgb([120, 120, 120]));
        for y in 10..70 {
            for x in 10..90 {
                img.put_pixel(x, y, WHITE);
            }
        }
        for y in 35..45 {
            for x in 40..60 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        img
    }

    #[test]
    fn test_remove_text_floods_dominant_blob() {
        let inpainter = TextInpainter::new(None, 36, 7);
        let crop = bubble_crop();

        let (cleaned, mask) = inpainter.remove_text(&crop).unwrap();
        assert_eq!(mask.bounding_rect(), (10, 10, 80, 60));
        assert_eq!(cleaned.get_pixel(50, 40), &WHITE);
        // outside the blob nothing changes
        assert_eq!(cleaned.get_pixel(2, 2), crop.get_pixel(2, 2));
        assert_eq!(cleaned.get_pixel(95, 75), crop.get_pixel(95, 75));
    }

    #[test]
    fn test_remove_text_picks_largest_blob() {
        let mut crop = RgbImage::from_pixel(60, 60, BLACK);
        for y in 2..6 {
            for x in 2..6 {
                crop.put_pixel(x, y, WHITE);
            }
        }
        for y in 20..50 {
            for x in 20..55 {
                crop.put_pixel(x, y, WHITE);
            }
        }
        let (_, mask) = TextInpainter::new(None, 36, 7).remove_text(&crop).unwrap();
        assert_eq!(mask.bounding_rect(), (20, 20, 35, 30));
    }

    #[test]
    fn test_remove_text_without_bright_region() {
        let crop = RgbImage::from_pixel(30, 20, Rgb([100, 100, 100]));
        let err = TextInpainter::new(None, 36, 7).remove_text(&crop).unwrap_err();
        assert!(matches!(err, RenderingError::NoTextMask { width: 30, height: 20 }));
    }

    #[test]
    fn test_font_size_stays_in_range() {
        let texts = ["hello", "a much longer sentence that has to wrap over several lines", "x"];
        let boxes = [(200, 100), (40, 30), (5, 5), (1000, 1000)];
        for text in texts {
            for dims in boxes {
                let layout = TextInpainter::calculate_font_size(text, dims, 36, 7);
                assert!((7..=36).contains(&layout.size), "{:?} {:?}", dims, layout);
                assert!(!layout.lines.is_empty());
            }
        }
    }

    #[test]
    fn test_font_size_prefers_largest_fit() {
        let layout = TextInpainter::calculate_font_size("hello", (1000, 1000), 36, 7);
        assert_eq!(layout.size, 36);
        assert_eq!(layout.lines, vec!["hello"]);

        // 22px: 90 / 19.8 = 4 chars per line, 2 lines * 26.4 < 54
        let layout = TextInpainter::calculate_font_size("hello", (90, 60), 36, 7);
        assert_eq!(layout.size, 22);
        assert_eq!(layout.lines, vec!["hell", "o"]);
    }

    #[test]
    fn test_font_size_fallback() {
        let text = "this text cannot possibly fit into such a tiny box";
        let layout = TextInpainter::calculate_font_size(text, (10, 8), 36, 7);
        assert_eq!(layout.size, 7);
        assert!(layout.lines.iter().all(|l| l.chars().count() <= FALLBACK_WRAP_WIDTH));
    }

    #[test]
    fn test_draw_text_requires_font() {
        let inpainter = TextInpainter::new(None, 36, 7);
        let (cleaned, mask) = inpainter.remove_text(&bubble_crop()).unwrap();
        assert!(matches!(
            inpainter.draw_text(&cleaned, &mask, "hello"),
            Err(RenderingError::NoFont)
        ));
    }

    #[test]
    fn test_draw_text_stays_inside_crop_and_inks_the_mask() {
        let Some(font) = system_font() else {
            eprintln!("skipping: {} not installed", SYSTEM_FONT);
            return;
        };
        let inpainter = TextInpainter::new(Some(&font), 36, 7);
        let (cleaned, mask) = inpainter.remove_text(&bubble_crop()).unwrap();
        let drawn = inpainter.draw_text(&cleaned, &mask, "hello").unwrap();

        assert_eq!(drawn.dimensions(), cleaned.dimensions());
        let dark = (10..90)
            .flat_map(|x| (10..70).map(move |y| (x, y)))
            .filter(|&(x, y)| drawn.get_pixel(x, y)[0] < 100)
            .count();
        assert!(dark > 0, "no glyph pixels drawn");
    }

    #[test]
    fn test_preview_font_canvas() {
        let Some(font) = system_font() else {
            eprintln!("skipping: {} not installed", SYSTEM_FONT);
            return;
        };
        let preview = TextInpainter::preview_font(&font, 24);
        assert_eq!(preview.dimensions(), PREVIEW_SIZE);
        assert!(preview.pixels().any(|p| p[0] < 100));
    }
}
