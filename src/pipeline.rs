use std::{fmt, thread::JoinHandle, time::Instant};

use image::RgbaImage;

use crate::{
    background::strip_background,
    pixel_field::{self, FieldParams, PointField},
    segmentation::Segmenter,
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SegmentFirst,
    SegmentSecond,
    StripBackground,
    BuildField,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SegmentFirst => "segmenting the first photo",
            Stage::SegmentSecond => "segmenting the second photo",
            Stage::StripBackground => "stripping backgrounds",
            Stage::BuildField => "building the point field",
        };
        f.write_str(name)
    }
}

fn run_stage<T>(stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let _span = tracing::info_span!("stage", %stage).entered();
    let started = Instant::now();
    let result = f().map_err(|e| e.in_stage(stage));
    match &result {
        Ok(_) => tracing::info!("{} done in {:.1?}", stage, started.elapsed()),
        Err(e) => tracing::error!("{}", e),
    }
    result
}

pub struct Pipeline {
    segmenter: Box<dyn Segmenter>,
    params: FieldParams,
}

impl Pipeline {
    pub fn new(segmenter: Box<dyn Segmenter>, params: FieldParams) -> Self {
        Self { segmenter, params }
    }

    pub fn run(&mut self, mut first: RgbaImage, mut second: RgbaImage) -> Result<PointField> {
        // Checked before inference so a bad pair costs nothing.
        if first.dimensions() != second.dimensions() {
            return Err(Error::DimensionMismatch {
                first: first.dimensions(),
                second: second.dimensions(),
            });
        }

        let segmenter = &mut self.segmenter;
        let first_mask = run_stage(Stage::SegmentFirst, || segmenter.segment_person(&first))?;
        let second_mask = run_stage(Stage::SegmentSecond, || segmenter.segment_person(&second))?;

        run_stage(Stage::StripBackground, || {
            strip_background(&mut first, &first_mask)?;
            strip_background(&mut second, &second_mask)
        })?;

        let params = &self.params;
        run_stage(Stage::BuildField, || pixel_field::build(&first, &second, params))
    }

    /// Runs the pipeline on a worker thread and hands the outcome to `on_done`.
    pub fn spawn<F>(mut self, first: RgbaImage, second: RgbaImage, on_done: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(Result<PointField>) + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name("pipeline".to_string())
            .spawn(move || on_done(self.run(first, second)))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::{PassthroughSegmenter, SegmentationMask};
    use image::Rgba;

    /// Keeps the left half of every photo.
    struct LeftHalf;

    impl Segmenter for LeftHalf {
        fn segment_person(&mut self, image: &RgbaImage) -> Result<SegmentationMask> {
            let (w, h) = image.dimensions();
            let labels = (0..h)
                .flat_map(|_| (0..w).map(move |x| u8::from(x < w / 2)))
                .collect();
            SegmentationMask::from_labels(w, h, labels)
        }
    }

    struct Broken;

    impl Segmenter for Broken {
        fn segment_person(&mut self, _image: &RgbaImage) -> Result<SegmentationMask> {
            Err(Error::Segmentation("model exploded".into()))
        }
    }

    fn photo(pixel: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(6, 6, Rgba(pixel))
    }

    #[test]
    fn runs_every_stage_in_order() {
        let mut pipeline = Pipeline::new(Box::new(LeftHalf), FieldParams::default());
        let field = pipeline
            .run(photo([10, 20, 30, 255]), photo([40, 50, 60, 255]))
            .unwrap();

        assert_eq!(field.len(), 4);
        // x = 0 lies in the kept half, x = 3 was stripped
        assert_eq!(field.points()[0].color_a.r, 10);
        assert_eq!(field.points()[0].color_b.r, 40);
        assert_eq!(field.points()[2].color_a, crate::color::Color::WHITE);
        assert_eq!(field.points()[2].color_b, crate::color::Color::WHITE);
    }

    #[test]
    fn segmentation_failure_names_its_stage() {
        let mut pipeline = Pipeline::new(Box::new(Broken), FieldParams::default());
        let err = pipeline
            .run(photo([0, 0, 0, 255]), photo([0, 0, 0, 255]))
            .unwrap_err();
        match err {
            Error::Stage { stage, source } => {
                assert_eq!(stage, Stage::SegmentFirst);
                assert!(matches!(*source, Error::Segmentation(_)));
            }
            other => panic!("expected a stage error, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_photos_skip_segmentation() {
        let mut pipeline = Pipeline::new(Box::new(LeftHalf), FieldParams::default());
        let err = pipeline
            .run(RgbaImage::new(4, 4), RgbaImage::new(4, 3))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn spawned_run_reports_back() {
        let pipeline = Pipeline::new(Box::new(PassthroughSegmenter), FieldParams::default());
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = pipeline
            .spawn(photo([1, 2, 3, 255]), photo([4, 5, 6, 255]), move |result| {
                tx.send(result).unwrap();
            })
            .unwrap();
        handle.join().unwrap();

        let field = rx.recv().unwrap().unwrap();
        assert_eq!(field.len(), 4);
    }
}
