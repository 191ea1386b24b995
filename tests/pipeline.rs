// End-to-end pipeline runs with stub detector, recognizer and translator

use image::{Rgb, RgbImage};
use manga_translator::core::errors::{DetectionResult, RecognitionError, RecognitionResult};
use manga_translator::core::RawDetection;
use manga_translator::services::detection::{BubbleDetector, DetectionModel};
use manga_translator::{
    BatchResult, BoundingBox, FontLibrary, MangaTranslatorPipeline, RegionDetector, TextInpainter,
    TextRecognizer, Translator,
};
use std::path::Path;

const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

struct FixedBoxes(Vec<BoundingBox>);

impl RegionDetector for FixedBoxes {
    fn detect(&self, _image: &RgbImage) -> DetectionResult<Vec<BoundingBox>> {
        Ok(self.0.clone())
    }
}

struct Says(&'static str);

impl TextRecognizer for Says {
    fn try_recognize(&self, _crop: &RgbImage) -> RecognitionResult<String> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct Crashes;

impl TextRecognizer for Crashes {
    fn try_recognize(&self, _crop: &RgbImage) -> RecognitionResult<String> {
        Err(RecognitionError::InvalidOutput("engine exploded".to_string()))
    }

    fn name(&self) -> &'static str {
        "crashes"
    }
}

struct Identity;

impl Translator for Identity {
    fn translate(&self, text: &str, _source_lang: Option<&str>, _target_lang: &str) -> String {
        text.to_string()
    }
}

fn pipeline_with(
    boxes: Vec<BoundingBox>,
    recognizer: Box<dyn TextRecognizer>,
    inpainter: TextInpainter,
) -> MangaTranslatorPipeline {
    MangaTranslatorPipeline::from_parts(
        Box::new(FixedBoxes(boxes)),
        Some(recognizer),
        Box::new(Identity),
        inpainter,
        "ru",
    )
}

fn fontless() -> TextInpainter {
    TextInpainter::new(None, 36, 7)
}

fn noisy_page(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn load(path: &Path) -> RgbImage {
    image::open(path).unwrap().to_rgb8()
}

/// White page with a black-bordered bubble holding a gray "word"
fn bubble_page() -> (RgbImage, BoundingBox) {
    let bbox = BoundingBox { x1: 200, y1: 150, x2: 600, y2: 450 };
    let mut page = RgbImage::from_pixel(800, 600, Rgb([255, 255, 255]));
    for y in bbox.y1..bbox.y2 {
        for x in bbox.x1..bbox.x2 {
            let border = x < bbox.x1 + 3 || x >= bbox.x2 - 3 || y < bbox.y1 + 3 || y >= bbox.y2 - 3;
            if border {
                page.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
    for y in 285..315 {
        for x in 340..460 {
            page.put_pixel(x, y, Rgb([128, 128, 128]));
        }
    }
    (page, bbox)
}

#[test]
fn zero_bubbles_pass_through() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("page.png");
    let output = tmp.path().join("out.png");
    let page = noisy_page(64, 48);
    page.save(&input).unwrap();

    let pipeline = pipeline_with(Vec::new(), Box::new(Says("hello")), fontless());
    assert!(pipeline.process_image(&input, &output));
    assert_eq!(load(&output), page);
}

#[test]
fn whitespace_only_text_leaves_bubble_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("page.png");
    let output = tmp.path().join("out.png");
    let page = noisy_page(80, 60);
    page.save(&input).unwrap();

    let bbox = BoundingBox { x1: 10, y1: 10, x2: 50, y2: 40 };
    let pipeline = pipeline_with(vec![bbox], Box::new(Says("   ")), fontless());
    assert!(pipeline.process_image(&input, &output));
    assert_eq!(load(&output), page);
}

#[test]
fn recognizer_failure_counts_as_no_text() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("page.png");
    let output = tmp.path().join("out.png");
    let (page, bbox) = bubble_page();
    page.save(&input).unwrap();

    let pipeline = pipeline_with(vec![bbox], Box::new(Crashes), fontless());
    assert!(pipeline.process_image(&input, &output));
    assert_eq!(load(&output), page);
}

#[test]
fn erasure_failure_fails_only_that_image() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("dark.png");
    let output = tmp.path().join("out.png");
    RgbImage::from_pixel(40, 40, Rgb([10, 10, 10])).save(&input).unwrap();

    let bbox = BoundingBox { x1: 0, y1: 0, x2: 40, y2: 40 };
    let pipeline = pipeline_with(vec![bbox], Box::new(Says("hello")), fontless());
    assert!(!pipeline.process_image(&input, &output));
    assert!(!output.exists());
}

#[test]
fn batch_with_corrupt_file() {
    let tmp = tempfile::tempdir().unwrap();
    let input_dir = tmp.path().join("in");
    let output_dir = tmp.path().join("out");
    std::fs::create_dir(&input_dir).unwrap();

    noisy_page(32, 32).save(input_dir.join("page1.png")).unwrap();
    std::fs::write(input_dir.join("page2.png"), b"definitely not a png").unwrap();
    noisy_page(16, 24).save(input_dir.join("page3.png")).unwrap();
    std::fs::write(input_dir.join("notes.txt"), b"ignored").unwrap();

    let pipeline = pipeline_with(Vec::new(), Box::new(Says("hello")), fontless());
    let result = pipeline.process_batch(&input_dir, &output_dir);

    assert_eq!(
        result,
        BatchResult {
            total: 3,
            success: 2,
            failed: 1,
            failed_files: vec!["page2.png".to_string()],
        }
    );
    assert!(output_dir.join("page1.png").exists());
    assert!(output_dir.join("page3.png").exists());
    assert!(!output_dir.join("page2.png").exists());
}

#[test]
fn batch_over_empty_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(Vec::new(), Box::new(Says("hello")), fontless());
    let result = pipeline.process_batch(tmp.path(), &tmp.path().join("out"));
    assert_eq!(result, BatchResult::new(0));
    assert_eq!(result.success + result.failed, result.total);
}

#[test]
fn translated_bubble_changes_only_its_box() {
    let Ok(data) = std::fs::read(SYSTEM_FONT) else {
        eprintln!("skipping: {} not installed", SYSTEM_FONT);
        return;
    };
    let library = FontLibrary::from_bytes([("DejaVuSans".to_string(), data)]);
    let font = library.select(None).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("page.png");
    let output = tmp.path().join("out.png");
    let (page, bbox) = bubble_page();
    page.save(&input).unwrap();

    let pipeline = pipeline_with(
        vec![bbox],
        Box::new(Says("hello")),
        TextInpainter::new(Some(font), 36, 7),
    );
    assert!(pipeline.process_image(&input, &output));

    let result = load(&output);
    let mut changed_inside = 0;
    for (x, y, pixel) in result.enumerate_pixels() {
        if pixel != page.get_pixel(x, y) {
            assert!(bbox.contains(x, y), "pixel ({}, {}) outside {} changed", x, y, bbox);
            changed_inside += 1;
        }
    }
    assert!(changed_inside > 0);
}

struct Scattered;

impl DetectionModel for Scattered {
    fn predict(&self, _image: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
        Ok(vec![
            RawDetection { bbox: [-20.0, -20.0, 30.0, 30.0], label: 0, confidence: 0.9 },
            RawDetection { bbox: [90.0, 50.0, 130.0, 90.0], label: 0, confidence: 0.8 },
            RawDetection { bbox: [10.0, 10.0, 20.0, 20.0], label: 0, confidence: 0.1 },
            RawDetection { bbox: [200.0, 200.0, 250.0, 250.0], label: 0, confidence: 0.9 },
        ])
    }
}

#[test]
fn detector_boxes_stay_inside_the_image() {
    let detector = BubbleDetector::new(Scattered, 0.25, 5);
    let image = RgbImage::new(100, 80);
    let boxes = detector.detect(&image).unwrap();

    assert_eq!(boxes.len(), 2);
    for b in boxes {
        assert!(b.x1 < b.x2 && b.x2 <= 100, "{}", b);
        assert!(b.y1 < b.y2 && b.y2 <= 80, "{}", b);
    }
}
