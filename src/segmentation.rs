use std::path::PathBuf;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Per-pixel person/background labels, row-major and aligned with the photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    labels: Vec<u8>,
}

impl SegmentationMask {
    pub const BACKGROUND: u8 = 0;
    pub const PERSON: u8 = 1;

    pub fn from_labels(width: u32, height: u32, labels: Vec<u8>) -> Result<Self> {
        let pixels = width as usize * height as usize;
        if labels.len() != pixels {
            return Err(Error::MaskLength {
                mask: labels.len(),
                pixels,
            });
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    /// A mask of `width`x`height` with every pixel set to `label`.
    pub fn filled(width: u32, height: u32, label: u8) -> Self {
        Self {
            width,
            height,
            labels: vec![label; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn is_person(&self, x: u32, y: u32) -> bool {
        self.labels[(y * self.width + x) as usize] != Self::BACKGROUND
    }

    /// Fraction of pixels labelled as person.
    pub fn coverage(&self) -> f32 {
        if self.labels.is_empty() {
            return 0.0;
        }
        let person = self
            .labels
            .iter()
            .filter(|&&label| label != Self::BACKGROUND)
            .count();
        person as f32 / self.labels.len() as f32
    }
}

/// Raw model output: person probability per cell, at model resolution.
#[derive(Debug, Clone)]
pub struct ProbabilityMap {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl ProbabilityMap {
    /// Thresholds and nearest-neighbour scales the map to `width`x`height`.
    pub fn to_mask(&self, width: u32, height: u32, threshold: f32) -> Result<SegmentationMask> {
        if self.values.len() != self.width as usize * self.height as usize {
            return Err(Error::Segmentation(format!(
                "model produced {} values for a {}x{} map",
                self.values.len(),
                self.width,
                self.height
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Ok(SegmentationMask::filled(width, height, SegmentationMask::BACKGROUND));
        }

        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        let mut labels = Vec::with_capacity(width as usize * height as usize);

        for y in 0..height {
            let src_y = (((y as f32 + 0.5) * sy) as u32).min(self.height - 1);
            for x in 0..width {
                let src_x = (((x as f32 + 0.5) * sx) as u32).min(self.width - 1);
                let p = self.values[(src_y * self.width + src_x) as usize];
                labels.push(if p >= threshold {
                    SegmentationMask::PERSON
                } else {
                    SegmentationMask::BACKGROUND
                });
            }
        }

        SegmentationMask::from_labels(width, height, labels)
    }
}

pub trait Segmenter: Send {
    fn segment_person(&mut self, image: &RgbaImage) -> Result<SegmentationMask>;
}

/// Treats every pixel as part of the person.
#[derive(Debug, Default)]
pub struct PassthroughSegmenter;

impl Segmenter for PassthroughSegmenter {
    fn segment_person(&mut self, image: &RgbaImage) -> Result<SegmentationMask> {
        Ok(SegmentationMask::filled(
            image.width(),
            image.height(),
            SegmentationMask::PERSON,
        ))
    }
}

/// Memory order of the model's input tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// ONNX person-segmentation model. `None` keeps the full frame.
    pub model: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub layout: TensorLayout,
    /// Minimum person probability for a pixel to count as foreground.
    pub threshold: f32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model: None,
            input_width: 256,
            input_height: 256,
            layout: TensorLayout::Nhwc,
            threshold: 0.7,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(Error::Config("model input size must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "segmentation threshold must lie in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Opens the configured segmenter.
    pub fn open(&self) -> Result<Box<dyn Segmenter>> {
        match &self.model {
            #[cfg(feature = "onnx")]
            Some(_) => Ok(Box::new(onnx::OnnxSegmenter::new(self)?)),
            #[cfg(not(feature = "onnx"))]
            Some(path) => Err(Error::Config(format!(
                "cannot load {}: built without the `onnx` feature",
                path.display()
            ))),
            None => {
                tracing::warn!("no segmentation model configured, backgrounds will be kept");
                Ok(Box::new(PassthroughSegmenter))
            }
        }
    }
}

#[cfg(feature = "onnx")]
pub mod onnx {
    use image::{imageops::FilterType, RgbaImage};
    use ndarray::Array4;
    use ort::{session::Session, value::Value};

    use super::{ProbabilityMap, SegmentationConfig, SegmentationMask, Segmenter, TensorLayout};
    use crate::{Error, Result};

    fn ort_error(context: &str, e: impl std::fmt::Display) -> Error {
        Error::Segmentation(format!("{context}: {e}"))
    }

    /// Person segmentation through ONNX Runtime.
    ///
    /// The model takes one RGB tensor scaled to `[0, 1]` and yields one person
    /// probability per input cell.
    pub struct OnnxSegmenter {
        session: Session,
        input_name: String,
        width: u32,
        height: u32,
        layout: TensorLayout,
        threshold: f32,
    }

    impl OnnxSegmenter {
        pub fn new(config: &SegmentationConfig) -> Result<Self> {
            let path = config
                .model
                .as_deref()
                .ok_or_else(|| Error::Config("no segmentation model configured".into()))?;
            if !path.exists() {
                return Err(Error::Segmentation(format!(
                    "model not found: {}",
                    path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e| ort_error("failed to create session builder", e))?
                .commit_from_file(path)
                .map_err(|e| ort_error("failed to load segmentation model", e))?;
            let input_name = session
                .inputs
                .first()
                .map(|i| i.name.clone())
                .unwrap_or_else(|| "input".into());

            tracing::info!("loaded segmentation model from {}", path.display());

            Ok(Self {
                session,
                input_name,
                width: config.input_width,
                height: config.input_height,
                layout: config.layout,
                threshold: config.threshold,
            })
        }
    }

    /// Packs an image into a `[0, 1]` RGB tensor with batch size one.
    pub fn fill_input_tensor(image: &RgbaImage, layout: TensorLayout) -> Array4<f32> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let mut input = match layout {
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        };

        for (x, y, pixel) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = pixel.0[c] as f32 / 255.0;
                match layout {
                    TensorLayout::Nhwc => input[[0, y, x, c]] = value,
                    TensorLayout::Nchw => input[[0, c, y, x]] = value,
                }
            }
        }

        input
    }

    impl Segmenter for OnnxSegmenter {
        fn segment_person(&mut self, image: &RgbaImage) -> Result<SegmentationMask> {
            let resized =
                image::imageops::resize(image, self.width, self.height, FilterType::Triangle);
            let input = Value::from_array(fill_input_tensor(&resized, self.layout))
                .map_err(|e| ort_error("failed to create input tensor", e))?;
            let outputs = self
                .session
                .run(ort::inputs![self.input_name.clone() => input])
                .map_err(|e| ort_error("inference failed", e))?;
            let output = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| ort_error("failed to extract output", e))?;

            let values: Vec<f32> = output.iter().map(|&v| v.clamp(0.0, 1.0)).collect();
            let map = ProbabilityMap {
                width: self.width,
                height: self.height,
                values,
            };
            let mask = map.to_mask(image.width(), image.height(), self.threshold)?;
            tracing::debug!("person coverage {:.1}%", mask.coverage() * 100.0);
            Ok(mask)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use image::Rgba;

        fn two_pixels() -> RgbaImage {
            let mut image = RgbaImage::new(2, 1);
            image.put_pixel(0, 0, Rgba([255, 0, 51, 255]));
            image.put_pixel(1, 0, Rgba([0, 102, 255, 0]));
            image
        }

        #[test]
        fn nhwc_keeps_channels_last() {
            let input = fill_input_tensor(&two_pixels(), TensorLayout::Nhwc);
            assert_eq!(input.shape(), &[1, 1, 2, 3]);
            assert_eq!(input[[0, 0, 0, 0]], 1.0);
            assert_eq!(input[[0, 0, 0, 1]], 0.0);
            assert_eq!(input[[0, 0, 0, 2]], 0.2);
            assert_eq!(input[[0, 0, 1, 1]], 0.4);
            assert_eq!(input[[0, 0, 1, 2]], 1.0);
        }

        #[test]
        fn nchw_keeps_channels_first() {
            let input = fill_input_tensor(&two_pixels(), TensorLayout::Nchw);
            assert_eq!(input.shape(), &[1, 3, 1, 2]);
            assert_eq!(input[[0, 0, 0, 0]], 1.0);
            assert_eq!(input[[0, 2, 0, 0]], 0.2);
            assert_eq!(input[[0, 0, 0, 1]], 0.0);
            assert_eq!(input[[0, 1, 0, 1]], 0.4);
            assert_eq!(input[[0, 2, 0, 1]], 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_length_must_match_pixel_count() {
        assert!(SegmentationMask::from_labels(2, 2, vec![0, 1, 1, 0]).is_ok());
        match SegmentationMask::from_labels(2, 2, vec![0, 1, 1]) {
            Err(Error::MaskLength { mask, pixels }) => {
                assert_eq!(mask, 3);
                assert_eq!(pixels, 4);
            }
            other => panic!("expected a mask length error, got {other:?}"),
        }
    }

    #[test]
    fn passthrough_keeps_every_pixel() {
        let image = RgbaImage::new(4, 3);
        let mask = PassthroughSegmenter.segment_person(&image).unwrap();
        assert_eq!(mask.dimensions(), (4, 3));
        assert!(mask.labels().iter().all(|&l| l == SegmentationMask::PERSON));
        assert_eq!(mask.coverage(), 1.0);
    }

    #[test]
    fn probabilities_are_thresholded_and_upscaled() {
        // left column is the person
        let map = ProbabilityMap {
            width: 2,
            height: 1,
            values: vec![0.9, 0.2],
        };
        let mask = map.to_mask(4, 2, 0.7).unwrap();
        assert_eq!(mask.labels(), &[1, 1, 0, 0, 1, 1, 0, 0]);
        assert!(mask.is_person(1, 1));
        assert!(!mask.is_person(2, 0));
        assert_eq!(mask.coverage(), 0.5);
    }

    #[test]
    fn threshold_is_inclusive() {
        let map = ProbabilityMap {
            width: 1,
            height: 1,
            values: vec![0.7],
        };
        let mask = map.to_mask(1, 1, 0.7).unwrap();
        assert_eq!(mask.labels(), &[SegmentationMask::PERSON]);
    }

    #[test]
    fn short_model_output_is_an_error() {
        let map = ProbabilityMap {
            width: 2,
            height: 2,
            values: vec![1.0; 3],
        };
        assert!(matches!(map.to_mask(2, 2, 0.5), Err(Error::Segmentation(_))));
    }

    #[test]
    fn config_rejects_out_of_range_threshold() {
        let config = SegmentationConfig {
            threshold: 1.5,
            ..SegmentationConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn no_model_opens_the_passthrough_segmenter() {
        let mut segmenter = SegmentationConfig::default().open().unwrap();
        let mask = segmenter.segment_person(&RgbaImage::new(2, 2)).unwrap();
        assert_eq!(mask.coverage(), 1.0);
    }
}
