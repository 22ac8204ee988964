use std::time::Instant;

use wgpu::SurfaceError;
use winit::{
    dpi::PhysicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget},
    window::{Window, WindowBuilder},
};

use crate::{Error, Result};

#[derive(Debug)]
pub struct AppState {
    previous_time: Instant,
    elapsed_time: f32,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            previous_time: Instant::now(),
            elapsed_time: 0.0,
        }
    }

    pub fn update(&mut self) {
        let current_time = Instant::now();
        self.elapsed_time = current_time
            .duration_since(self.previous_time)
            .as_secs_f32();
        self.previous_time = current_time;
    }

    /// Seconds between the last two updates.
    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }
}

pub struct Application<L: Layer + 'static> {
    layer: Option<L>,
    options: Option<L::Options>,
    proxy: EventLoopProxy<L::Event>,
    screen: Screen,
    state: AppState,
}

impl<L: Layer + 'static> Application<L> {
    pub fn new(screen: Screen, options: L::Options, proxy: EventLoopProxy<L::Event>) -> Self {
        Self {
            screen,
            layer: None,
            options: Some(options),
            proxy,
            state: AppState::new(),
        }
    }

    fn shutdown(&mut self, control_flow: &mut ControlFlow) {
        control_flow.set_exit_with_code(0);
        if let Some(layer) = self.layer.as_mut() {
            if let Err(e) = layer.shutdown(&self.state, &mut self.screen) {
                tracing::error!("shutdown failed: {}", e);
                control_flow.set_exit_with_code(1);
            }
        }
    }

    fn run(
        &mut self,
        event: Event<L::Event>,
        _event_loop: &EventLoopWindowTarget<L::Event>,
        control_flow: &mut ControlFlow,
    ) {
        control_flow.set_wait();

        let event = match event {
            Event::UserEvent(user_event) => {
                if let Some(layer) = self.layer.as_mut() {
                    layer.user_event(user_event, &self.state, &mut self.screen);
                }
                return;
            }
            event => event,
        };

        if let Some(layer) = self.layer.as_mut() {
            layer.process_event(&event, &mut self.screen);
        }

        match event {
            Event::NewEvents(StartCause::Init) => {
                let Some(options) = self.options.take() else {
                    return;
                };
                match L::start(options, &mut self.screen, &self.state, self.proxy.clone()) {
                    Ok(layer) => self.layer = Some(layer),
                    Err(e) => {
                        tracing::error!("failed to start: {}", e);
                        control_flow.set_exit_with_code(1);
                    }
                }
            }
            Event::WindowEvent {
                window_id,
                ref event,
            } if self.screen.window().id() == window_id => match event {
                WindowEvent::CloseRequested => self.shutdown(control_flow),
                WindowEvent::Resized(physical_size) => {
                    self.screen.resize(*physical_size);
                    if let Some(layer) = self.layer.as_mut() {
                        layer.resize(*physical_size, &self.state, &mut self.screen);
                    }
                }
                WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                    self.screen.resize(**new_inner_size);
                    if let Some(layer) = self.layer.as_mut() {
                        layer.resize(**new_inner_size, &self.state, &mut self.screen);
                    }
                }
                _ => {}
            },
            Event::MainEventsCleared => {
                self.state.update();
                self.screen.window().request_redraw();
            }
            Event::RedrawRequested(window_id) if self.screen.window().id() == window_id => {
                let Some(layer) = self.layer.as_mut() else {
                    return;
                };
                layer.update(&self.state, &mut self.screen);

                match layer.render(&self.state, &mut self.screen) {
                    Ok(_) => {}
                    Err(SurfaceError::Lost) => self.screen.resize_to_current(),
                    Err(SurfaceError::OutOfMemory) => control_flow.set_exit_with_code(137),
                    Err(e) => tracing::error!("{:?}", e),
                }
            }
            _ => {}
        }

        if self.screen.close_requested() {
            self.screen.close_requested = false;
            self.shutdown(control_flow);
        }
    }

    pub async fn init(title: &str, options: L::Options) -> Result<()> {
        let event_loop = EventLoopBuilder::<L::Event>::with_user_event().build();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let screen = Screen::new::<L::Event>(&event_loop, &instance, title).await?;
        let proxy = event_loop.create_proxy();
        let mut application = Self::new(screen, options, proxy);
        event_loop.run(move |event, event_loop, control_flow| {
            application.run(event, event_loop, control_flow);
        });
    }
}

pub struct Screen {
    pub surface: wgpu::Surface,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    window: Window,
    close_requested: bool,
}

impl Screen {
    pub async fn new<T>(
        event_loop: &EventLoopWindowTarget<T>,
        instance: &wgpu::Instance,
        title: &str,
    ) -> Result<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .build(event_loop)
            .map_err(|e| Error::Graphics(e.to_string()))?;

        // SAFETY:
        // The surface needs to live as long as the window that created it.
        // Screen owns the window so this should be safe.
        let surface = unsafe { instance.create_surface(&window) }
            .map_err(|e| Error::Graphics(e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Graphics("no compatible graphics adapter".into()))?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                    label: None,
                },
                None,
            )
            .await
            .map_err(|e| Error::Graphics(e.to_string()))?;
        let size = window.inner_size();
        let config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| Error::Graphics("surface is not supported by the adapter".into()))?;
        surface.configure(&device, &config);
        tracing::info!(
            "using {} ({:?}), surface {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            config.format
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            close_requested: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Asks the application to shut down after the current event.
    pub fn close(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Resize the screen to new window size.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Resize the screen to current window inner size.
    pub fn resize_to_current(&mut self) {
        self.resize(self.window.inner_size());
    }
}

pub trait Layer: Sized {
    /// Sent from worker threads through the event loop.
    type Event: Send + 'static;
    type Options;

    fn start(
        options: Self::Options,
        screen: &mut Screen,
        app: &AppState,
        proxy: EventLoopProxy<Self::Event>,
    ) -> Result<Self>;
    fn process_event(&mut self, event: &Event<Self::Event>, screen: &mut Screen);
    fn user_event(&mut self, event: Self::Event, app: &AppState, screen: &mut Screen);
    fn resize(&mut self, new_size: PhysicalSize<u32>, app: &AppState, screen: &mut Screen);
    fn update(&mut self, app: &AppState, screen: &mut Screen);
    fn render(&mut self, app: &AppState, screen: &mut Screen) -> std::result::Result<(), SurfaceError>;
    fn shutdown(&mut self, app: &AppState, screen: &mut Screen) -> Result<()>;
}
