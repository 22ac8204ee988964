pub mod application;
pub mod background;
pub mod camera;
pub mod capture;
pub mod color;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pixel_field;
pub mod renderer;
pub mod scene;
pub mod segmentation;
pub mod source;
pub mod texture;
pub mod util;

pub use error::{Error, Result};
