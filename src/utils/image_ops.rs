use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, ImageResult, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Decode any supported image file into an 8-bit RGB buffer
pub fn load_rgb(path: &Path) -> ImageResult<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Encode an RGB buffer to PNG bytes (for engines that take a file payload)
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .context("Failed to encode image as PNG")?;
    Ok(png_bytes)
}

/// Write `patch` back into `base` with its top-left corner at (x, y)
pub fn paste(base: &mut RgbImage, patch: &RgbImage, x: u32, y: u32) {
    image::imageops::replace(base, patch, i64::from(x), i64::from(y));
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_encode_png_round_trips_pixels() {
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_paste_only_touches_target_area() {
        let mut base = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let patch = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        paste(&mut base, &patch, 4, 5);

        for (x, y, p) in base.enumerate_pixels() {
            let inside = (4..7).contains(&x) && (5..7).contains(&y);
            assert_eq!(p[0] == 0, inside, "pixel ({x}, {y})");
        }
    }
}
