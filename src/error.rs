use crate::{capture::CaptureState, pipeline::Stage};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("both photos must be captured before processing")]
    MissingCapture,

    #[error(
        "image dimensions differ: first is {}x{}, second is {}x{}",
        .first.0, .first.1, .second.0, .second.1
    )]
    DimensionMismatch {
        first: (u32, u32),
        second: (u32, u32),
    },

    #[error("mask has {mask} labels but the image has {pixels} pixels")]
    MaskLength { mask: usize, pixels: usize },

    #[error("segmentation failed: {0}")]
    Segmentation(String),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("`{action}` is not available while {state}")]
    UnexpectedAction {
        action: &'static str,
        state: CaptureState,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("graphics setup failed: {0}")]
    Graphics(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn in_stage(self, stage: Stage) -> Self {
        Error::Stage {
            stage,
            source: Box::new(self),
        }
    }
}
