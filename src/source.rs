use std::{path::Path, sync::Arc};

use image::RgbaImage;

use crate::Result;

/// One decoded frame. `sequence` grows by one for every new frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    pub sequence: u64,
}

/// Called once with the frame size, or with the reason no frames will come.
pub type ReadyCallback = Box<dyn FnOnce(Result<(u32, u32)>) + Send>;

pub trait FrameSource {
    fn start(&mut self, on_ready: ReadyCallback);

    fn latest_frame(&self) -> Option<Frame>;

    /// Told after a frame has been kept as a photo.
    fn frame_captured(&mut self) {}
}

/// Serves two still images, one per photo.
///
/// The first image is shown until it has been captured, then the second.
pub struct StillImageSource {
    images: [Arc<RgbaImage>; 2],
    current: usize,
    sequence: u64,
    started: bool,
}

impl StillImageSource {
    pub fn new(first: RgbaImage, second: RgbaImage) -> Self {
        Self {
            images: [Arc::new(first), Arc::new(second)],
            current: 0,
            sequence: 0,
            started: false,
        }
    }

    pub fn open(first: &Path, second: &Path) -> Result<Self> {
        let first_image = image::open(first)?.to_rgba8();
        let second_image = image::open(second)?.to_rgba8();
        tracing::info!(
            "loaded {} ({}x{}) and {} ({}x{})",
            first.display(),
            first_image.width(),
            first_image.height(),
            second.display(),
            second_image.width(),
            second_image.height()
        );
        Ok(Self::new(first_image, second_image))
    }

    /// Both images, consuming the source.
    pub fn into_images(self) -> (RgbaImage, RgbaImage) {
        let [first, second] = self.images;
        let owned =
            |image: Arc<RgbaImage>| Arc::try_unwrap(image).unwrap_or_else(|shared| (*shared).clone());
        (owned(first), owned(second))
    }
}

impl FrameSource for StillImageSource {
    fn start(&mut self, on_ready: ReadyCallback) {
        self.started = true;
        on_ready(Ok(self.images[self.current].dimensions()));
    }

    fn latest_frame(&self) -> Option<Frame> {
        if !self.started {
            return None;
        }
        Some(Frame {
            image: self.images[self.current].clone(),
            sequence: self.sequence,
        })
    }

    fn frame_captured(&mut self) {
        if self.current + 1 < self.images.len() {
            self.current += 1;
            self.sequence += 1;
        }
    }
}

#[cfg(feature = "webcam")]
pub use webcam::WebcamSource;

#[cfg(feature = "webcam")]
mod webcam {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread::JoinHandle,
        time::Duration,
    };

    use image::RgbaImage;
    use nokhwa::{
        pixel_format::RgbAFormat,
        utils::{CameraIndex, RequestedFormat, RequestedFormatType},
        Camera,
    };
    use parking_lot::Mutex;

    use super::{Frame, FrameSource, ReadyCallback};
    use crate::Error;

    /// Streams frames from a webcam on a background thread.
    pub struct WebcamSource {
        index: u32,
        latest: Arc<Mutex<Option<Frame>>>,
        running: Arc<AtomicBool>,
        thread_handle: Option<JoinHandle<()>>,
    }

    impl WebcamSource {
        pub fn new(index: u32) -> Self {
            Self {
                index,
                latest: Arc::new(Mutex::new(None)),
                running: Arc::new(AtomicBool::new(false)),
                thread_handle: None,
            }
        }

        fn open_camera(index: u32) -> Result<Camera, Error> {
            let requested =
                RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
            let mut camera = Camera::new(CameraIndex::Index(index), requested)
                .map_err(|e| Error::CameraUnavailable(e.to_string()))?;
            camera
                .open_stream()
                .map_err(|e| Error::CameraUnavailable(e.to_string()))?;
            Ok(camera)
        }

        fn capture_loop(
            mut camera: Camera,
            latest: Arc<Mutex<Option<Frame>>>,
            running: Arc<AtomicBool>,
        ) {
            let mut sequence = 0;
            while running.load(Ordering::Acquire) {
                let frame = match camera.frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("failed to capture frame: {}", e);
                        std::thread::sleep(Duration::from_millis(10));
                        continue;
                    }
                };
                let (width, height) = (frame.resolution().width(), frame.resolution().height());
                let data = match frame.decode_image::<RgbAFormat>() {
                    Ok(decoded) => decoded.into_raw(),
                    Err(e) => {
                        tracing::warn!("failed to decode frame: {}", e);
                        continue;
                    }
                };
                let Some(image) = RgbaImage::from_raw(width, height, data) else {
                    tracing::warn!("dropping short {}x{} frame", width, height);
                    continue;
                };

                sequence += 1;
                *latest.lock() = Some(Frame {
                    image: Arc::new(image),
                    sequence,
                });
            }
            tracing::info!("camera capture thread stopped");
        }
    }

    impl FrameSource for WebcamSource {
        fn start(&mut self, on_ready: ReadyCallback) {
            let index = self.index;
            let latest = self.latest.clone();
            let running = self.running.clone();
            running.store(true, Ordering::Release);

            let spawned = std::thread::Builder::new()
                .name("camera-capture".to_string())
                .spawn(move || {
                    let camera = match Self::open_camera(index) {
                        Ok(camera) => camera,
                        Err(e) => {
                            running.store(false, Ordering::Release);
                            on_ready(Err(e));
                            return;
                        }
                    };
                    let resolution = camera.resolution();
                    tracing::info!(
                        "camera {} opened: {} ({}x{})",
                        index,
                        camera.info().human_name(),
                        resolution.width(),
                        resolution.height()
                    );
                    on_ready(Ok((resolution.width(), resolution.height())));
                    Self::capture_loop(camera, latest, running);
                });

            match spawned {
                Ok(handle) => self.thread_handle = Some(handle),
                Err(e) => tracing::error!("failed to spawn capture thread: {}", e),
            }
        }

        fn latest_frame(&self) -> Option<Frame> {
            self.latest.lock().clone()
        }
    }

    impl Drop for WebcamSource {
        fn drop(&mut self) {
            self.running.store(false, Ordering::Release);
            if let Some(handle) = self.thread_handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::mpsc;

    fn source() -> StillImageSource {
        StillImageSource::new(
            RgbaImage::from_pixel(4, 2, Rgba([1, 1, 1, 255])),
            RgbaImage::from_pixel(4, 2, Rgba([2, 2, 2, 255])),
        )
    }

    #[test]
    fn no_frames_before_start() {
        assert!(source().latest_frame().is_none());
    }

    #[test]
    fn reports_ready_with_the_frame_size() {
        let mut source = source();
        let (tx, rx) = mpsc::channel();
        source.start(Box::new(move |ready| tx.send(ready).unwrap()));

        assert_eq!(rx.recv().unwrap().unwrap(), (4, 2));
        let frame = source.latest_frame().unwrap();
        assert_eq!(frame.image.get_pixel(0, 0), &Rgba([1, 1, 1, 255]));
    }

    #[test]
    fn capture_moves_to_the_second_image() {
        let mut source = source();
        source.start(Box::new(|_| {}));
        let before = source.latest_frame().unwrap().sequence;

        source.frame_captured();
        let frame = source.latest_frame().unwrap();
        assert_eq!(frame.sequence, before + 1);
        assert_eq!(frame.image.get_pixel(0, 0), &Rgba([2, 2, 2, 255]));

        // stays on the last image
        source.frame_captured();
        assert_eq!(source.latest_frame().unwrap().sequence, before + 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let missing = Path::new("does/not/exist.png");
        assert!(StillImageSource::open(missing, missing).is_err());
    }

    #[test]
    fn into_images_returns_both() {
        let (first, second) = source().into_images();
        assert_eq!(first.get_pixel(3, 1), &Rgba([1, 1, 1, 255]));
        assert_eq!(second.get_pixel(3, 1), &Rgba([2, 2, 2, 255]));
    }
}
