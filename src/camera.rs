use std::f32::consts::{PI, TAU};

use winit::{
    dpi::PhysicalPosition,
    event::{
        ElementState, KeyboardInput, MouseButton, MouseScrollDelta, VirtualKeyCode, WindowEvent,
    },
};

use crate::{config::SceneConfig, util::math::degree_to_radian};

pub struct Camera {
    pub eye: glam::Vec3,
    pub target: glam::Vec3,
    pub up: glam::Vec3,
    pub aspect: f32,
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    #[rustfmt::skip]
    pub const OPENGL_TO_WGPU_MATRIX: glam::Mat4 = glam::Mat4::from_cols_array(&[
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.0,
        0.0, 0.0, 0.5, 1.0,
    ]);

    /// Camera on +Z at `camera_distance`, looking at the origin.
    pub fn new(config: &SceneConfig, width: u32, height: u32) -> Self {
        let mut camera = Self {
            eye: glam::Vec3::new(0.0, 0.0, config.camera_distance),
            target: glam::Vec3::ZERO,
            up: glam::Vec3::Y,
            aspect: 1.0,
            fov_y: degree_to_radian(config.fov_y_degrees),
            z_near: config.z_near,
            z_far: config.z_far,
        };
        camera.set_viewport(width, height);
        camera
    }

    pub fn view_projection_matrix(&self) -> glam::Mat4 {
        let view = glam::Mat4::look_at_rh(self.eye, self.target, self.up);
        let proj = glam::Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far);
        Self::OPENGL_TO_WGPU_MATRIX * proj * view
    }

    /// Only the aspect ratio follows the viewport; fov and clip planes stay.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Rotation about the vertical axis, in `(-PI, PI]`.
    ///
    /// Zero when the camera sits on +Z of its target, `PI` when it looks from
    /// behind.
    pub fn yaw(&self) -> f32 {
        let offset = self.eye - self.target;
        offset.x.atan2(offset.z)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_projection_matrix().to_cols_array_2d(),
        }
    }
}

const MIN_POLAR: f32 = 1e-3;
const MIN_DISTANCE: f32 = 1.0;
const ZOOM_STEP: f32 = 0.95;
const KEY_ROTATE_STEP: f32 = PI / 36.0;

/// Orbits the camera around its target on a sphere.
///
/// Left drag rotates, the wheel dollies, arrow keys rotate in fixed steps and
/// W/S dolly in and out.
pub struct OrbitController {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    azimuth: f32,
    polar: f32,
    radius: f32,
    max_distance: f32,
    viewport_height: f32,
    dragging: bool,
    cursor: Option<PhysicalPosition<f64>>,
}

impl OrbitController {
    pub fn new(camera: &Camera, rotate_speed: f32, zoom_speed: f32, viewport_height: u32) -> Self {
        let offset = camera.eye - camera.target;
        let radius = offset.length().max(MIN_DISTANCE);
        Self {
            rotate_speed,
            zoom_speed,
            azimuth: offset.x.atan2(offset.z),
            polar: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            radius,
            max_distance: camera.z_far,
            viewport_height: viewport_height.max(1) as f32,
            dragging: false,
            cursor: None,
        }
    }

    pub fn resize(&mut self, viewport_height: u32) {
        if viewport_height > 0 {
            self.viewport_height = viewport_height as f32;
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Rotates by the given angles, in radians, and moves the camera.
    pub fn rotate(&mut self, camera: &mut Camera, d_azimuth: f32, d_polar: f32) {
        self.azimuth = (self.azimuth + d_azimuth).rem_euclid(TAU);
        self.polar = (self.polar + d_polar).clamp(MIN_POLAR, PI - MIN_POLAR);
        self.apply(camera);
    }

    /// Scales the distance to the target by `scale`.
    pub fn dolly(&mut self, camera: &mut Camera, scale: f32) {
        self.radius = (self.radius * scale).clamp(MIN_DISTANCE, self.max_distance);
        self.apply(camera);
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// Feeds a cursor position; rotates when a drag is in progress.
    pub fn drag_to(&mut self, camera: &mut Camera, position: PhysicalPosition<f64>) -> bool {
        let previous = self.cursor.replace(position);
        let (true, Some(previous)) = (self.dragging, previous) else {
            return false;
        };

        let dx = (position.x - previous.x) as f32;
        let dy = (position.y - previous.y) as f32;
        let per_pixel = TAU / self.viewport_height * self.rotate_speed;
        self.rotate(camera, -dx * per_pixel, -dy * per_pixel);
        true
    }

    pub fn process_events(&mut self, camera: &mut Camera, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                match state {
                    ElementState::Pressed => self.begin_drag(),
                    ElementState::Released => self.end_drag(),
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => self.drag_to(camera, *position),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 50.0) as f32,
                };
                self.dolly(camera, ZOOM_STEP.powf(lines * self.zoom_speed));
                true
            }
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state: ElementState::Pressed,
                        virtual_keycode: Some(keycode),
                        ..
                    },
                ..
            } => match keycode {
                VirtualKeyCode::Left => {
                    self.rotate(camera, KEY_ROTATE_STEP * self.rotate_speed, 0.0);
                    true
                }
                VirtualKeyCode::Right => {
                    self.rotate(camera, -KEY_ROTATE_STEP * self.rotate_speed, 0.0);
                    true
                }
                VirtualKeyCode::Up => {
                    self.rotate(camera, 0.0, -KEY_ROTATE_STEP * self.rotate_speed);
                    true
                }
                VirtualKeyCode::Down => {
                    self.rotate(camera, 0.0, KEY_ROTATE_STEP * self.rotate_speed);
                    true
                }
                VirtualKeyCode::W => {
                    self.dolly(camera, ZOOM_STEP.powf(self.zoom_speed));
                    true
                }
                VirtualKeyCode::S => {
                    self.dolly(camera, ZOOM_STEP.powf(-self.zoom_speed));
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn apply(&self, camera: &mut Camera) {
        let (sin_polar, cos_polar) = self.polar.sin_cos();
        let (sin_azimuth, cos_azimuth) = self.azimuth.sin_cos();
        let offset = glam::Vec3::new(
            sin_polar * sin_azimuth,
            cos_polar,
            sin_polar * cos_azimuth,
        ) * self.radius;
        camera.eye = camera.target + offset;
    }
}
