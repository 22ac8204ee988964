use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    pixel_field::{FieldParams, Sampling},
    segmentation::SegmentationConfig,
    Error, Result,
};

pub const USAGE: &str = "\
Usage: pixel_cloud [options]

  --config FILE           read settings from a JSON file
  --images FIRST SECOND   use two image files instead of the webcam
  --camera N              webcam index (default 0)
  --model FILE            ONNX person-segmentation model
  --block-size N          sampling stride in pixels (default 3)
  --spacing F             extra gap between neighbouring cubes (default 0)
  --average               average each block instead of reading its first pixel
  --cull                  skip cells transparent in both photos
  --export FILE           write the point field as JSON
  --headless              build and export without opening a window
  --help                  print this message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub field: FieldParams,
    pub scene: SceneConfig,
    pub segmentation: SegmentationConfig,
    pub camera_index: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            field: FieldParams::default(),
            scene: SceneConfig::default(),
            segmentation: SegmentationConfig::default(),
            camera_index: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Edge length of every cube, in world units.
    pub cube_size: f32,
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Initial distance between the camera and the origin along +Z.
    pub camera_distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub clear_color: [f64; 3],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            cube_size: 5.0,
            fov_y_degrees: 75.0,
            z_near: 0.1,
            z_far: 1000.0,
            camera_distance: 500.0,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            clear_color: [0.0, 0.0, 0.0],
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Builds the effective configuration: file first, flags on top.
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, args: &Args) {
        if let Some(index) = args.camera {
            self.camera_index = index;
        }
        if let Some(model) = &args.model {
            self.segmentation.model = Some(model.clone());
        }
        if let Some(block_size) = args.block_size {
            self.field.block_size = block_size;
        }
        if let Some(spacing) = args.spacing {
            self.field.spacing = spacing;
        }
        if args.average {
            self.field.sampling = Sampling::Average;
        }
        if args.cull {
            self.field.cull_transparent = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.field.block_size == 0 {
            return Err(Error::Config("block size must be at least 1".into()));
        }
        if self.field.depth_min == self.field.depth_max {
            return Err(Error::Config("depth range must not be empty".into()));
        }
        if self.scene.cube_size <= 0.0 {
            return Err(Error::Config("cube size must be positive".into()));
        }
        if !(self.scene.z_near > 0.0 && self.scene.z_near < self.scene.z_far) {
            return Err(Error::Config(format!(
                "clip planes must satisfy 0 < near < far, got {} and {}",
                self.scene.z_near, self.scene.z_far
            )));
        }
        self.segmentation.validate()
    }
}

/// Command line flags.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub images: Option<(PathBuf, PathBuf)>,
    pub camera: Option<u32>,
    pub model: Option<PathBuf>,
    pub block_size: Option<u32>,
    pub spacing: Option<f32>,
    pub average: bool,
    pub cull: bool,
    pub export: Option<PathBuf>,
    pub headless: bool,
    pub help: bool,
}

impl Args {
    /// Parses flags, not including the program name.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = Some(value(&mut args, &arg)?.into()),
                "--images" => {
                    let first = value(&mut args, &arg)?;
                    let second = value(&mut args, &arg)?;
                    parsed.images = Some((first.into(), second.into()));
                }
                "--camera" => parsed.camera = Some(number(&mut args, &arg)?),
                "--model" => parsed.model = Some(value(&mut args, &arg)?.into()),
                "--block-size" => parsed.block_size = Some(number(&mut args, &arg)?),
                "--spacing" => parsed.spacing = Some(number(&mut args, &arg)?),
                "--average" => parsed.average = true,
                "--cull" => parsed.cull = true,
                "--export" => parsed.export = Some(value(&mut args, &arg)?.into()),
                "--headless" => parsed.headless = true,
                "--help" | "-h" => parsed.help = true,
                other => return Err(Error::Config(format!("unknown argument `{other}`"))),
            }
        }

        if parsed.headless && parsed.images.is_none() {
            return Err(Error::Config("--headless requires --images".into()));
        }

        Ok(parsed)
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| Error::Config(format!("`{flag}` expects a value")))
}

fn number<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T> {
    let raw = value(args, flag)?;
    raw.parse()
        .map_err(|_| Error::Config(format!("`{flag}` expects a number, got `{raw}`")))
}
