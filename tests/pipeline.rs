//! Drives a whole capture session through the public API, without a window.

use std::f32::consts::PI;

use image::{Rgba, RgbaImage};
use pixel_cloud::{
    camera::{Camera, OrbitController},
    capture::{CaptureFlow, CaptureState},
    color::Color,
    config::{Args, Config},
    pipeline::Pipeline,
    pixel_field::PointField,
    scene::{ColorSlot, Scene},
    segmentation::{SegmentationMask, Segmenter},
    source::{FrameSource, StillImageSource},
    Result,
};

/// Treats every pixel brighter than mid-grey as the person.
struct BrightIsPerson;

impl Segmenter for BrightIsPerson {
    fn segment_person(&mut self, image: &RgbaImage) -> Result<SegmentationMask> {
        let labels = image
            .pixels()
            .map(|p| u8::from(p[0] > 127))
            .collect();
        SegmentationMask::from_labels(image.width(), image.height(), labels)
    }
}

/// Bright person on the left two columns, dark background elsewhere.
fn photo(person: [u8; 4]) -> RgbaImage {
    RgbaImage::from_fn(6, 6, |x, _| if x < 3 { Rgba(person) } else { Rgba([10, 10, 10, 255]) })
}

#[test]
fn capture_session_ends_in_a_swappable_scene() {
    let config = Config::resolve(&Args::default()).unwrap();
    let mut source = StillImageSource::new(photo([200, 0, 0, 255]), photo([255, 255, 0, 255]));
    let mut flow = CaptureFlow::new();

    let (tx, rx) = std::sync::mpsc::channel();
    source.start(Box::new(move |ready| tx.send(ready).unwrap()));
    assert_eq!(rx.recv().unwrap().unwrap(), (6, 6));
    flow.source_ready().unwrap();

    flow.capture_first((*source.latest_frame().unwrap().image).clone())
        .unwrap();
    source.frame_captured();
    flow.capture_second((*source.latest_frame().unwrap().image).clone())
        .unwrap();
    assert_eq!(flow.state(), CaptureState::CapturedSecond);

    let (first, second) = flow.begin_processing().unwrap();
    let mut pipeline = Pipeline::new(Box::new(BrightIsPerson), config.field.clone());
    let field = flow.finish_processing(pipeline.run(first, second).unwrap()).unwrap();
    assert_eq!(flow.state(), CaptureState::Rendering);
    assert_eq!(field.len(), 4);

    // left column keeps the person, right column was stripped to white
    let points = field.points();
    assert_eq!(points[0].color_a, Color::from_rgb(200, 0, 0));
    assert_eq!(points[0].color_b, Color::from_rgb(255, 255, 0));
    assert_eq!(points[2].color_a, Color::WHITE);
    assert_eq!(points[3].color_b, Color::WHITE);

    let mut scene = Scene::from_point_field(&field, config.scene.cube_size);
    let mut camera = Camera::new(&config.scene, 800, 600);
    let mut orbit = OrbitController::new(&camera, 1.0, 1.0, 600);

    assert_eq!(scene.update_colors(camera.yaw()), ColorSlot::First);
    assert_eq!(scene.cubes[0].displayed, Color::from_rgb(200, 0, 0));

    orbit.rotate(&mut camera, PI * 0.75, 0.0);
    assert_eq!(scene.update_colors(camera.yaw()), ColorSlot::Second);
    assert_eq!(scene.cubes[0].displayed, Color::from_rgb(255, 255, 0));

    orbit.rotate(&mut camera, PI, 0.0);
    assert_eq!(scene.update_colors(camera.yaw()), ColorSlot::First);
}

#[test]
fn exported_field_reads_back() {
    let first = photo([200, 0, 0, 255]);
    let second = photo([0, 0, 0, 255]);
    let mut pipeline = Pipeline::new(Box::new(BrightIsPerson), Config::default().field);
    let field = pipeline.run(first, second).unwrap();

    let path = std::env::temp_dir().join(format!("pixel_cloud_export_{}.json", std::process::id()));
    field.export(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let back: PointField = serde_json::from_str(&text).unwrap();
    assert_eq!(back, field);
    assert_eq!(back.dimensions(), (6, 6));
}
