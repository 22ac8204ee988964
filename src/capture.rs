use std::{fmt, sync::Arc};

use image::RgbaImage;

use crate::{pixel_field::PointField, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    AwaitingPermission,
    Ready,
    CapturedFirst,
    CapturedSecond,
    Processing,
    Rendering,
    Failed,
}

impl CaptureState {
    /// Text shown to the user while in this state.
    pub fn prompt(self) -> &'static str {
        match self {
            CaptureState::AwaitingPermission => "Waiting for the camera...",
            CaptureState::Ready => "Press Space to take the first photo",
            CaptureState::CapturedFirst => "First photo taken - press Space to take the second",
            CaptureState::CapturedSecond => "Second photo taken",
            CaptureState::Processing => "Removing backgrounds...",
            CaptureState::Rendering => "Drag to orbit, scroll to zoom",
            CaptureState::Failed => "Processing failed, see the log",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::AwaitingPermission => "awaiting permission",
            CaptureState::Ready => "ready",
            CaptureState::CapturedFirst => "captured first",
            CaptureState::CapturedSecond => "captured second",
            CaptureState::Processing => "processing",
            CaptureState::Rendering => "rendering",
            CaptureState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What one run of the demo has produced so far.
#[derive(Debug, Default)]
pub struct Session {
    pub first: Option<RgbaImage>,
    pub second: Option<RgbaImage>,
    pub point_field: Option<Arc<PointField>>,
}

#[derive(Debug)]
pub struct CaptureFlow {
    state: CaptureState,
    session: Session,
}

impl Default for CaptureFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureFlow {
    pub fn new() -> Self {
        Self {
            state: CaptureState::AwaitingPermission,
            session: Session::default(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn require(&self, action: &'static str, state: CaptureState) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(Error::UnexpectedAction {
                action,
                state: self.state,
            })
        }
    }

    pub fn source_ready(&mut self) -> Result<()> {
        self.require("source ready", CaptureState::AwaitingPermission)?;
        self.state = CaptureState::Ready;
        tracing::info!("camera ready");
        Ok(())
    }

    /// The flow never leaves `AwaitingPermission` after this.
    pub fn source_failed(&mut self, error: &Error) {
        tracing::error!("camera access failed: {}", error);
    }

    pub fn capture_first(&mut self, frame: RgbaImage) -> Result<()> {
        self.require("capture first photo", CaptureState::Ready)?;
        tracing::info!("captured first photo ({}x{})", frame.width(), frame.height());
        self.session.first = Some(frame);
        self.state = CaptureState::CapturedFirst;
        Ok(())
    }

    pub fn capture_second(&mut self, frame: RgbaImage) -> Result<()> {
        self.require("capture second photo", CaptureState::CapturedFirst)?;
        tracing::info!("captured second photo ({}x{})", frame.width(), frame.height());
        self.session.second = Some(frame);
        self.state = CaptureState::CapturedSecond;
        Ok(())
    }

    /// Hands both photos over to processing.
    pub fn begin_processing(&mut self) -> Result<(RgbaImage, RgbaImage)> {
        self.require("begin processing", CaptureState::CapturedSecond)?;
        let (Some(first), Some(second)) = (&self.session.first, &self.session.second) else {
            tracing::error!("{}", Error::MissingCapture);
            return Err(Error::MissingCapture);
        };
        let photos = (first.clone(), second.clone());
        self.state = CaptureState::Processing;
        Ok(photos)
    }

    pub fn finish_processing(&mut self, field: PointField) -> Result<Arc<PointField>> {
        self.require("finish processing", CaptureState::Processing)?;
        tracing::info!("point field ready with {} points", field.len());
        let field = Arc::new(field);
        self.session.point_field = Some(field.clone());
        self.state = CaptureState::Rendering;
        Ok(field)
    }

    pub fn fail_processing(&mut self, error: &Error) {
        tracing::error!("processing failed: {}", error);
        self.state = CaptureState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo() -> RgbaImage {
        RgbaImage::new(6, 6)
    }

    #[test]
    fn walks_the_full_flow() {
        let mut flow = CaptureFlow::new();
        assert_eq!(flow.state(), CaptureState::AwaitingPermission);

        flow.source_ready().unwrap();
        assert_eq!(flow.state(), CaptureState::Ready);

        flow.capture_first(photo()).unwrap();
        assert_eq!(flow.state(), CaptureState::CapturedFirst);

        flow.capture_second(photo()).unwrap();
        assert_eq!(flow.state(), CaptureState::CapturedSecond);

        let (first, second) = flow.begin_processing().unwrap();
        assert_eq!(first.dimensions(), second.dimensions());
        assert_eq!(flow.state(), CaptureState::Processing);

        let field = flow.finish_processing(PointField::default()).unwrap();
        assert_eq!(flow.state(), CaptureState::Rendering);
        assert!(Arc::ptr_eq(
            &field,
            flow.session().point_field.as_ref().unwrap()
        ));
    }

    #[test]
    fn triggers_are_one_shot() {
        let mut flow = CaptureFlow::new();
        flow.source_ready().unwrap();
        flow.capture_first(photo()).unwrap();

        let err = flow.capture_first(photo()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedAction {
                state: CaptureState::CapturedFirst,
                ..
            }
        ));

        flow.capture_second(photo()).unwrap();
        assert!(flow.capture_second(photo()).is_err());
        assert_eq!(flow.state(), CaptureState::CapturedSecond);
    }

    #[test]
    fn nothing_happens_before_the_camera_is_ready() {
        let mut flow = CaptureFlow::new();
        assert!(flow.capture_first(photo()).is_err());
        flow.source_failed(&Error::CameraUnavailable("permission denied".into()));
        assert_eq!(flow.state(), CaptureState::AwaitingPermission);
        assert!(flow.capture_first(photo()).is_err());
        assert!(flow.session().first.is_none());
    }

    #[test]
    fn processing_requires_both_photos() {
        let mut flow = CaptureFlow::new();
        flow.source_ready().unwrap();
        flow.capture_first(photo()).unwrap();
        assert!(matches!(
            flow.begin_processing(),
            Err(Error::UnexpectedAction { .. })
        ));

        flow.capture_second(photo()).unwrap();
        flow.session.first = None;
        assert!(matches!(flow.begin_processing(), Err(Error::MissingCapture)));
        assert_eq!(flow.state(), CaptureState::CapturedSecond);
    }

    #[test]
    fn processing_starts_once() {
        let mut flow = CaptureFlow::new();
        flow.source_ready().unwrap();
        flow.capture_first(photo()).unwrap();
        flow.capture_second(photo()).unwrap();
        flow.begin_processing().unwrap();

        assert!(matches!(
            flow.begin_processing(),
            Err(Error::UnexpectedAction {
                state: CaptureState::Processing,
                ..
            })
        ));
        assert_eq!(flow.state(), CaptureState::Processing);

        // an oversized field is rejected by the GPU after processing
        flow.fail_processing(&Error::Graphics("instance buffer too large".into()));
        assert_eq!(flow.state(), CaptureState::Failed);
    }

    #[test]
    fn failed_processing_is_terminal() {
        let mut flow = CaptureFlow::new();
        flow.source_ready().unwrap();
        flow.capture_first(photo()).unwrap();
        flow.capture_second(photo()).unwrap();
        flow.begin_processing().unwrap();

        flow.fail_processing(&Error::Segmentation("no model".into()));
        assert_eq!(flow.state(), CaptureState::Failed);
        assert!(flow.finish_processing(PointField::default()).is_err());
    }
}
