use std::f32::consts::{FRAC_PI_2, PI};

use crate::{color::Color, pixel_field::PointField};

/// Which of the two photos a cube currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSlot {
    First,
    Second,
}

/// Chooses the photo to show for a camera yaw.
///
/// `|yaw| mod PI` above a right angle selects the second photo; everything
/// else, including a yaw of exactly `PI`, selects the first.
pub fn select_color(yaw: f32) -> ColorSlot {
    let angle = yaw.abs() % PI;
    if angle > FRAC_PI_2 {
        ColorSlot::Second
    } else {
        ColorSlot::First
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub position: glam::Vec3,
    pub color_a: Color,
    pub color_b: Color,
    pub displayed: Color,
}

impl Cube {
    pub fn show(&mut self, slot: ColorSlot) {
        self.displayed = match slot {
            ColorSlot::First => self.color_a,
            ColorSlot::Second => self.color_b,
        };
    }
}

/// Per-instance data of one cube as laid out in the instance buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CubeInstance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Default)]
pub struct Scene {
    pub cubes: Vec<Cube>,
    pub cube_size: f32,
}

impl Scene {
    /// One cube per point, showing the first photo.
    pub fn from_point_field(field: &PointField, cube_size: f32) -> Self {
        let cubes = field
            .iter()
            .map(|point| Cube {
                position: point.position,
                color_a: point.color_a,
                color_b: point.color_b,
                displayed: point.color_a,
            })
            .collect();
        Self { cubes, cube_size }
    }

    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    /// Recomputes every cube's displayed color for the camera yaw.
    pub fn update_colors(&mut self, yaw: f32) -> ColorSlot {
        let slot = select_color(yaw);
        for cube in &mut self.cubes {
            cube.show(slot);
        }
        slot
    }

    /// Rewrites `out` with the instance data of every cube.
    pub fn write_instances(&self, out: &mut Vec<CubeInstance>) {
        out.clear();
        out.extend(self.cubes.iter().map(|cube| CubeInstance {
            position: cube.position.to_array(),
            size: self.cube_size,
            color: cube.displayed.to_linear(),
        }));
    }
}
