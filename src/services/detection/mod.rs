use crate::core::config::DetectionConfig;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::{BoundingBox, RawDetection};
use crate::services::onnx_builder::build_session;
use crate::utils::image_ops::load_rgb;
use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Anything that can predict boxes over a whole image
pub trait DetectionModel {
    /// Raw boxes in original image coordinates, in model output order
    fn predict(&self, image: &RgbImage) -> Result<Vec<RawDetection>>;
}

/// Region detector contract used by the image pipeline
pub trait RegionDetector {
    /// Padded, clamped boxes for every confident detection, in detector output order
    fn detect(&self, image: &RgbImage) -> DetectionResult<Vec<BoundingBox>>;

    /// Decode `path` and detect over it. The decoded image is handed back untouched.
    fn detect_path(&self, path: &Path) -> DetectionResult<(RgbImage, Vec<BoundingBox>)> {
        let image = load_rgb(path).map_err(|source| DetectionError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let boxes = self.detect(&image)?;
        Ok((image, boxes))
    }
}

/// ONNX bubble detector (inputs `images` + `orig_target_sizes`, outputs `labels`/`boxes`/`scores`)
pub struct OnnxDetectionModel {
    session: Mutex<Session>,
    target_size: u32,
    labels: Vec<i64>,
    device_type: String,
}

impl OnnxDetectionModel {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let (device_type, session) = build_session(
            &config.model_path,
            "detection",
            config.inference_backend.as_deref(),
        )?;

        info!("✓ Detection: {} ({})", device_type, config.model_path.display());

        Ok(Self {
            session: Mutex::new(session),
            target_size: config.target_size,
            labels: config.labels.clone(),
            device_type,
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    fn preprocess_image(&self, img: &RgbImage) -> Result<(Array4<f32>, Array2<i64>)> {
        let target_size = self.target_size;
        trace!(
            "Preprocessing image: {}x{} → {}x{}",
            img.width(),
            img.height(),
            target_size,
            target_size
        );

        let original_size =
            Array2::from_shape_vec((1, 2), vec![img.width() as i64, img.height() as i64])
                .context("Failed to build orig_target_sizes tensor")?;

        let resized = image::imageops::resize(
            img,
            target_size,
            target_size,
            image::imageops::FilterType::Triangle,
        );

        let target = target_size as usize;
        let mut array = Array4::<f32>::zeros((1, 3, target, target));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        Ok((array, original_size))
    }
}

impl DetectionModel for OnnxDetectionModel {
    fn predict(&self, image: &RgbImage) -> Result<Vec<RawDetection>> {
        let inference_start = std::time::Instant::now();
        let (preprocessed, original_size) = self.preprocess_image(image)?;

        let images_value = Value::from_array(preprocessed)?;
        let sizes_value = Value::from_array(original_size)?;

        let (labels_data, boxes_data, scores_data) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                "images" => images_value,
                "orig_target_sizes" => sizes_value
            ])?;

            let (_labels_shape, labels_data) = outputs["labels"].try_extract_tensor::<i64>()?;
            let (_boxes_shape, boxes_data) = outputs["boxes"].try_extract_tensor::<f32>()?;
            let (_scores_shape, scores_data) = outputs["scores"].try_extract_tensor::<f32>()?;

            (labels_data.to_vec(), boxes_data.to_vec(), scores_data.to_vec())
        };

        debug!(
            "✓ Detector inference on {} took {:.2}ms",
            self.device_type,
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        let num_detections = labels_data.len().min(scores_data.len()).min(boxes_data.len() / 4);
        let detections = (0..num_detections)
            .filter(|&i| self.labels.contains(&labels_data[i]))
            .map(|i| RawDetection {
                bbox: [
                    boxes_data[i * 4],
                    boxes_data[i * 4 + 1],
                    boxes_data[i * 4 + 2],
                    boxes_data[i * 4 + 3],
                ],
                label: labels_data[i],
                confidence: scores_data[i],
            })
            .collect::<Vec<_>>();

        trace!("Raw detections: {} of {} with bubble labels", detections.len(), num_detections);
        Ok(detections)
    }
}

/// Confidence filter + pad + clamp over any detection model
pub struct BubbleDetector<M> {
    model: M,
    confidence_threshold: f32,
    padding: u32,
}

impl<M: DetectionModel> BubbleDetector<M> {
    pub fn new(model: M, confidence_threshold: f32, padding: u32) -> Self {
        Self {
            model,
            confidence_threshold,
            padding,
        }
    }

    /// Detect over several files. Files that fail to load or detect are logged and skipped.
    pub fn detect_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, RgbImage, Vec<BoundingBox>)> {
        paths
            .iter()
            .filter_map(|path| match self.detect_path(path) {
                Ok((image, boxes)) => Some((path.clone(), image, boxes)),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }
}

impl BubbleDetector<OnnxDetectionModel> {
    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        let model = OnnxDetectionModel::new(config)?;
        Ok(Self::new(model, config.confidence_threshold, config.box_padding))
    }
}

impl<M: DetectionModel> RegionDetector for BubbleDetector<M> {
    fn detect(&self, image: &RgbImage) -> DetectionResult<Vec<BoundingBox>> {
        let (width, height) = image.dimensions();
        let raw = self
            .model
            .predict(image)
            .map_err(DetectionError::InferenceFailed)?;

        let boxes = raw
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .filter_map(|d| {
                let bbox = BoundingBox::padded(d.bbox, self.padding, width, height);
                if bbox.is_none() {
                    trace!("Dropping detection {:?} outside {}x{}", d.bbox, width, height);
                }
                bbox
            })
            .collect::<Vec<_>>();

        debug!(
            "Detected {} bubbles ({} raw, threshold {:.2})",
            boxes.len(),
            raw.len(),
            self.confidence_threshold
        );
        Ok(boxes)
    }
}
