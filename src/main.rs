use std::path::{Path, PathBuf};

use pixel_cloud::{
    application::{AppState, Application, Layer, Screen},
    camera::{Camera, OrbitController},
    capture::{CaptureFlow, CaptureState},
    config::{Args, Config, USAGE},
    pipeline::Pipeline,
    pixel_field::PointField,
    renderer::{CubePass, PreviewPass},
    scene::{ColorSlot, Scene},
    source::{FrameSource, StillImageSource},
    Error, Result,
};
use tracing_subscriber::EnvFilter;
use wgpu::{CommandEncoderDescriptor, RenderPassColorAttachment, RenderPassDescriptor, TextureViewDescriptor};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::EventLoopProxy,
};

const TITLE: &str = "pixel cloud";

enum AppEvent {
    SourceReady(Result<(u32, u32)>),
    PipelineFinished(Result<PointField>),
}

struct ViewerOptions {
    config: Config,
    source: Box<dyn FrameSource>,
    pipeline: Pipeline,
    export: Option<PathBuf>,
}

struct Viewer {
    config: Config,
    flow: CaptureFlow,
    source: Box<dyn FrameSource>,
    pipeline: Option<Pipeline>,
    export: Option<PathBuf>,
    proxy: EventLoopProxy<AppEvent>,
    preview: PreviewPass,
    last_sequence: Option<u64>,
    camera: Camera,
    orbit: OrbitController,
    scene: Scene,
    cubes: Option<CubePass>,
    slot: ColorSlot,
}

impl Viewer {
    fn show_prompt(&self, screen: &Screen) {
        let state = self.flow.state();
        screen
            .window()
            .set_title(&format!("{} - {}", TITLE, state.prompt()));
    }

    /// Space or Enter: first photo, then second photo and processing.
    fn trigger(&mut self, screen: &Screen) {
        let state = self.flow.state();
        if !matches!(state, CaptureState::Ready | CaptureState::CapturedFirst) {
            tracing::debug!("capture trigger ignored while {}", state);
            return;
        }
        let Some(frame) = self.source.latest_frame() else {
            tracing::warn!("no frame available yet");
            return;
        };
        let photo = (*frame.image).clone();

        let captured = match state {
            CaptureState::Ready => self.flow.capture_first(photo),
            _ => self.flow.capture_second(photo),
        };
        if let Err(e) = captured {
            tracing::warn!("{}", e);
            return;
        }
        self.source.frame_captured();

        if self.flow.state() == CaptureState::CapturedSecond {
            self.start_processing();
        }
        self.show_prompt(screen);
    }

    fn start_processing(&mut self) {
        let Some(pipeline) = self.pipeline.take() else {
            tracing::debug!("processing already started");
            return;
        };
        let (first, second) = match self.flow.begin_processing() {
            Ok(photos) => photos,
            Err(e) => {
                tracing::error!("{}", e);
                self.pipeline = Some(pipeline);
                return;
            }
        };

        let proxy = self.proxy.clone();
        let spawned = pipeline.spawn(first, second, move |result| {
            if proxy.send_event(AppEvent::PipelineFinished(result)).is_err() {
                tracing::warn!("event loop closed before processing finished");
            }
        });
        if let Err(e) = spawned {
            self.flow.fail_processing(&e);
        }
    }

    fn processing_finished(&mut self, result: Result<PointField>, screen: &Screen) {
        let field = match result {
            Ok(field) => field,
            Err(e) => {
                self.flow.fail_processing(&e);
                return;
            }
        };
        if let Some(path) = &self.export {
            if let Err(e) = field.export(path) {
                tracing::error!("export to {} failed: {}", path.display(), e);
            }
        }

        let scene = Scene::from_point_field(&field, self.config.scene.cube_size);
        let cubes = match CubePass::new(&screen.device, &screen.config, &self.camera, &scene) {
            Ok(cubes) => cubes,
            Err(e) => {
                self.flow.fail_processing(&e);
                return;
            }
        };
        if let Err(e) = self.flow.finish_processing(field) {
            tracing::error!("{}", e);
            return;
        }
        self.scene = scene;
        self.slot = ColorSlot::First;
        self.cubes = Some(cubes);
    }
}

impl Layer for Viewer {
    type Event = AppEvent;
    type Options = ViewerOptions;

    fn start(
        options: ViewerOptions,
        screen: &mut Screen,
        _app: &AppState,
        proxy: EventLoopProxy<AppEvent>,
    ) -> Result<Self> {
        let ViewerOptions {
            config,
            mut source,
            pipeline,
            export,
        } = options;

        let preview = PreviewPass::new(&screen.device, screen.config.format);
        let camera = Camera::new(&config.scene, screen.config.width, screen.config.height);
        let orbit = OrbitController::new(
            &camera,
            config.scene.rotate_speed,
            config.scene.zoom_speed,
            screen.config.height,
        );

        let ready_proxy = proxy.clone();
        source.start(Box::new(move |ready| {
            if ready_proxy.send_event(AppEvent::SourceReady(ready)).is_err() {
                tracing::warn!("event loop closed before the source was ready");
            }
        }));

        let viewer = Self {
            config,
            flow: CaptureFlow::new(),
            source,
            pipeline: Some(pipeline),
            export,
            proxy,
            preview,
            last_sequence: None,
            camera,
            orbit,
            scene: Scene::default(),
            cubes: None,
            slot: ColorSlot::First,
        };
        viewer.show_prompt(screen);
        Ok(viewer)
    }

    fn process_event(&mut self, event: &Event<AppEvent>, screen: &mut Screen) {
        let Event::WindowEvent { event, .. } = event else {
            return;
        };

        if self.flow.state() == CaptureState::Rendering {
            self.orbit.process_events(&mut self.camera, event);
        }

        if let WindowEvent::KeyboardInput {
            input:
                KeyboardInput {
                    state: ElementState::Pressed,
                    virtual_keycode: Some(keycode),
                    ..
                },
            ..
        } = event
        {
            match keycode {
                VirtualKeyCode::Space | VirtualKeyCode::Return => self.trigger(screen),
                VirtualKeyCode::Escape => screen.close(),
                _ => {}
            }
        }
    }

    fn user_event(&mut self, event: AppEvent, _app: &AppState, screen: &mut Screen) {
        match event {
            AppEvent::SourceReady(Ok((width, height))) => {
                tracing::info!("frame source ready at {}x{}", width, height);
                if let Err(e) = self.flow.source_ready() {
                    tracing::warn!("{}", e);
                }
            }
            AppEvent::SourceReady(Err(e)) => self.flow.source_failed(&e),
            AppEvent::PipelineFinished(result) => self.processing_finished(result, screen),
        }
        self.show_prompt(screen);
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _app: &AppState, screen: &mut Screen) {
        self.camera.set_viewport(new_size.width, new_size.height);
        self.orbit.resize(new_size.height);
        if let Some(cubes) = self.cubes.as_mut() {
            cubes.resize(&screen.device, &screen.config);
        }
    }

    fn update(&mut self, app: &AppState, screen: &mut Screen) {
        if let Some(cubes) = self.cubes.as_mut() {
            let slot = self.scene.update_colors(self.camera.yaw());
            if slot != self.slot {
                tracing::debug!("showing {:?} photo colors", slot);
                self.slot = slot;
            }
            cubes.update(&screen.queue, &self.camera, &self.scene);
            return;
        }

        let Some(frame) = self.source.latest_frame() else {
            return;
        };
        if self.last_sequence != Some(frame.sequence) {
            tracing::trace!("preview frame {} after {:.3}s", frame.sequence, app.elapsed_time());
            self.preview
                .upload(&screen.device, &screen.queue, &frame.image);
            self.last_sequence = Some(frame.sequence);
        }
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> std::result::Result<(), wgpu::SurfaceError> {
        let output = screen.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());
        let mut encoder = screen
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let [r, g, b] = self.config.scene.clear_color;
        {
            let depth_stencil_attachment =
                self.cubes
                    .as_ref()
                    .map(|cubes| wgpu::RenderPassDepthStencilAttachment {
                        view: cubes.depth_view(),
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: true,
                        }),
                        stencil_ops: None,
                    });

            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a: 1.0 }),
                        store: true,
                    },
                })],
                depth_stencil_attachment,
            });

            match &self.cubes {
                Some(cubes) => cubes.draw(&mut render_pass),
                None => self.preview.draw(&mut render_pass),
            }
        }

        screen.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<()> {
        tracing::info!("exiting in state {}", self.flow.state());
        Ok(())
    }
}

fn open_source(args: &Args, config: &Config) -> Result<Box<dyn FrameSource>> {
    if let Some((first, second)) = &args.images {
        return Ok(Box::new(StillImageSource::open(first, second)?));
    }

    #[cfg(feature = "webcam")]
    {
        Ok(Box::new(pixel_cloud::source::WebcamSource::new(
            config.camera_index,
        )))
    }
    #[cfg(not(feature = "webcam"))]
    {
        let _ = config;
        Err(Error::CameraUnavailable(
            "built without the `webcam` feature, pass --images FIRST SECOND".into(),
        ))
    }
}

/// Processes two image files and exports the result without a window.
fn headless(
    mut pipeline: Pipeline,
    first: &Path,
    second: &Path,
    export: Option<&Path>,
) -> Result<()> {
    let (first, second) = StillImageSource::open(first, second)?.into_images();
    let field = pipeline.run(first, second)?;

    match export {
        Some(path) => field.export(path)?,
        None => tracing::info!("built {} points, nothing exported", field.len()),
    }
    Ok(())
}

fn run() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = Config::resolve(&args)?;
    let pipeline = Pipeline::new(config.segmentation.open()?, config.field.clone());

    if let (true, Some((first, second))) = (args.headless, &args.images) {
        return headless(pipeline, first, second, args.export.as_deref());
    }

    let source = open_source(&args, &config)?;
    let options = ViewerOptions {
        config,
        source,
        pipeline,
        export: args.export.clone(),
    };
    pollster::block_on(Application::<Viewer>::init(TITLE, options))
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
