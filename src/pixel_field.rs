use std::{fs::File, io::BufWriter, path::Path};

use glam::Vec3;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::{color::Color, util::math::map_range, Error, Result};

/// How a grid cell is read from the source photo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Only the top-left pixel of each block.
    #[default]
    FirstPixel,
    /// Mean of the block, clipped to the image bounds.
    Average,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldParams {
    /// Grid stride and block edge, in pixels.
    pub block_size: u32,
    /// Extra world-space gap inserted between neighbouring cells.
    pub spacing: f32,
    /// World units per source pixel.
    pub position_scale: f32,
    pub depth_min: f32,
    pub depth_max: f32,
    pub sampling: Sampling,
    /// Skip cells that are fully transparent in both photos.
    pub cull_transparent: bool,
}

impl Default for FieldParams {
    fn default() -> Self {
        Self {
            block_size: 3,
            spacing: 0.0,
            position_scale: 1.5,
            depth_min: -100.0,
            depth_max: 100.0,
            sampling: Sampling::FirstPixel,
            cull_transparent: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointDescriptor {
    pub position: Vec3,
    pub color_a: Color,
    pub color_b: Color,
}

/// The ordered samples of one capture session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointField {
    width: u32,
    height: u32,
    points: Vec<PointDescriptor>,
}

impl PointField {
    /// Source photo size the field was sampled from.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn points(&self) -> &[PointDescriptor] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PointDescriptor> {
        self.points.iter()
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::info!("wrote {} points to {}", self.len(), path.display());
        Ok(())
    }
}

impl<'a> IntoIterator for &'a PointField {
    type Item = &'a PointDescriptor;
    type IntoIter = std::slice::Iter<'a, PointDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Number of grid cells for a `width`x`height` image sampled every `block_size` pixels.
pub fn cell_count(width: u32, height: u32, block_size: u32) -> usize {
    (width.div_ceil(block_size) as usize) * (height.div_ceil(block_size) as usize)
}

struct Sample {
    color: Color,
    red: f32,
    opaque: bool,
}

fn sample(image: &RgbaImage, x: u32, y: u32, params: &FieldParams) -> Sample {
    match params.sampling {
        Sampling::FirstPixel => {
            let pixel = *image.get_pixel(x, y);
            Sample {
                color: pixel.into(),
                red: pixel.0[0] as f32,
                opaque: pixel.0[3] > 0,
            }
        }
        Sampling::Average => {
            let x_end = x.saturating_add(params.block_size).min(image.width());
            let y_end = y.saturating_add(params.block_size).min(image.height());
            let mut sum = [0u64; 3];
            let mut count = 0u64;
            let mut opaque = false;

            for py in y..y_end {
                for px in x..x_end {
                    let [r, g, b, a] = image.get_pixel(px, py).0;
                    sum[0] += r as u64;
                    sum[1] += g as u64;
                    sum[2] += b as u64;
                    opaque |= a > 0;
                    count += 1;
                }
            }

            let mean = |channel: u64| channel as f64 / count as f64;
            Sample {
                color: Color::from_rgb(
                    mean(sum[0]).round() as u8,
                    mean(sum[1]).round() as u8,
                    mean(sum[2]).round() as u8,
                ),
                red: mean(sum[0]) as f32,
                opaque,
            }
        }
    }
}

/// Samples both photos into a point field.
///
/// Cells are visited column by column: `x` in the outer loop, `y` in the
/// inner one, both stepping by `block_size`.
pub fn build(first: &RgbaImage, second: &RgbaImage, params: &FieldParams) -> Result<PointField> {
    if first.dimensions() != second.dimensions() {
        return Err(Error::DimensionMismatch {
            first: first.dimensions(),
            second: second.dimensions(),
        });
    }
    if params.block_size == 0 {
        return Err(Error::Config("block size must be at least 1".into()));
    }

    let (width, height) = first.dimensions();
    let step = params.block_size as usize;
    let half_width = width as f32 / 2.0;
    let half_height = height as f32 / 2.0;
    let gap = params.spacing / params.block_size as f32;

    let mut points = Vec::with_capacity(cell_count(width, height, params.block_size));
    for x in (0..width).step_by(step) {
        for y in (0..height).step_by(step) {
            let a = sample(first, x, y, params);
            let b = sample(second, x, y, params);

            if params.cull_transparent && !a.opaque && !b.opaque {
                continue;
            }

            let offset_x = x as f32 - half_width;
            let offset_y = y as f32 - half_height;
            let depth = map_range(a.red, 0.0, 255.0, params.depth_min, params.depth_max);

            points.push(PointDescriptor {
                position: Vec3::new(
                    offset_x * params.position_scale + offset_x * gap,
                    -(offset_y * params.position_scale + offset_y * gap),
                    depth,
                ),
                color_a: a.color,
                color_b: b.color,
            });
        }
    }

    tracing::debug!(
        "sampled {}x{} photos into {} points (block size {})",
        width,
        height,
        points.len(),
        params.block_size
    );

    Ok(PointField {
        width,
        height,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgba;

    fn filled(width: u32, height: u32, pixel: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(pixel))
    }

    #[test]
    fn six_by_six_with_stride_three_gives_four_points() {
        let mut first = filled(6, 6, [0, 0, 0, 255]);
        let mut second = filled(6, 6, [0, 0, 0, 255]);
        for (i, (x, y)) in [(0, 0), (0, 3), (3, 0), (3, 3)].into_iter().enumerate() {
            let i = i as u8;
            first.put_pixel(x, y, Rgba([10 + i, 20 + i, 30 + i, 255]));
            second.put_pixel(x, y, Rgba([100 + i, 110 + i, 120 + i, 255]));
        }

        let field = build(&first, &second, &FieldParams::default()).unwrap();
        assert_eq!(field.len(), 4);
        assert_eq!(field.dimensions(), (6, 6));

        let expected_xy = [(-4.5, 4.5), (-4.5, 0.0), (0.0, 4.5), (0.0, 0.0)];
        for (i, (point, (ex, ey))) in field.iter().zip(expected_xy).enumerate() {
            let i = i as u8;
            assert_relative_eq!(point.position.x, ex);
            assert_relative_eq!(point.position.y, ey);
            assert_eq!(point.color_a, Color::from_rgb(10 + i, 20 + i, 30 + i));
            assert_eq!(point.color_b, Color::from_rgb(100 + i, 110 + i, 120 + i));
            assert_ne!(point.color_a, point.color_b);
        }
    }

    #[test]
    fn point_count_rounds_partial_blocks_up() {
        for (width, height, block) in [(7, 5, 3), (1, 1, 3), (10, 4, 1), (640, 480, 3), (9, 9, 4)] {
            let image = filled(width, height, [1, 2, 3, 255]);
            let params = FieldParams {
                block_size: block,
                ..FieldParams::default()
            };
            let field = build(&image, &image, &params).unwrap();
            assert_eq!(field.len(), cell_count(width, height, block));
            assert_eq!(
                field.len(),
                ((width + block - 1) / block * ((height + block - 1) / block)) as usize
            );
        }
    }

    #[test]
    fn depth_follows_first_photo_red_channel() {
        let first = filled(3, 3, [255, 0, 0, 255]);
        let second = filled(3, 3, [0, 0, 0, 255]);
        let field = build(&first, &second, &FieldParams::default()).unwrap();
        assert_relative_eq!(field.points()[0].position.z, 100.0);

        let field = build(&second, &first, &FieldParams::default()).unwrap();
        assert_relative_eq!(field.points()[0].position.z, -100.0);
    }

    #[test]
    fn stripped_background_sits_at_the_far_depth() {
        let stripped = filled(3, 3, [255, 255, 255, 0]);
        let field = build(&stripped, &stripped, &FieldParams::default()).unwrap();
        assert_eq!(field.len(), 1);
        assert_eq!(field.points()[0].color_a, Color::WHITE);
        assert_relative_eq!(field.points()[0].position.z, 100.0);
    }

    #[test]
    fn mismatched_photos_are_rejected() {
        let first = filled(6, 6, [0, 0, 0, 255]);
        let second = filled(6, 5, [0, 0, 0, 255]);
        match build(&first, &second, &FieldParams::default()) {
            Err(Error::DimensionMismatch { first, second }) => {
                assert_eq!(first, (6, 6));
                assert_eq!(second, (6, 5));
            }
            other => panic!("expected a dimension mismatch, got {other:?}"),
        }
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let image = filled(3, 3, [0, 0, 0, 255]);
        let params = FieldParams {
            block_size: 0,
            ..FieldParams::default()
        };
        assert!(matches!(build(&image, &image, &params), Err(Error::Config(_))));
    }

    #[test]
    fn empty_photos_give_an_empty_field() {
        let image = RgbaImage::new(0, 0);
        let field = build(&image, &image, &FieldParams::default()).unwrap();
        assert!(field.is_empty());
    }

    #[test]
    fn spacing_widens_the_grid() {
        let image = filled(6, 6, [0, 0, 0, 255]);
        let params = FieldParams {
            spacing: 3.0,
            ..FieldParams::default()
        };
        let field = build(&image, &image, &params).unwrap();
        // offset -3 pixels is one cell left of centre: -3 * 1.5 + -1 * 3.0
        assert_relative_eq!(field.points()[0].position.x, -7.5);
        assert_relative_eq!(field.points()[0].position.y, 7.5);
        assert_relative_eq!(field.points()[3].position.x, 0.0);
    }

    #[test]
    fn average_sampling_reads_the_whole_block() {
        let mut image = filled(2, 2, [0, 0, 0, 255]);
        image.put_pixel(1, 1, Rgba([200, 100, 40, 255]));

        let first_pixel = build(&image, &image, &FieldParams::default()).unwrap();
        assert_eq!(first_pixel.points()[0].color_a, Color::from_rgb(0, 0, 0));

        let params = FieldParams {
            sampling: Sampling::Average,
            ..FieldParams::default()
        };
        let averaged = build(&image, &image, &params).unwrap();
        assert_eq!(averaged.len(), 1);
        assert_eq!(averaged.points()[0].color_a, Color::from_rgb(50, 25, 10));
        assert_relative_eq!(
            averaged.points()[0].position.z,
            map_range(50.0, 0.0, 255.0, -100.0, 100.0)
        );
    }

    #[test]
    fn average_of_a_huge_block_does_not_overflow() {
        // 4200 * 4200 * 255 is past u32::MAX
        let image = filled(4200, 4200, [255, 255, 255, 255]);
        let params = FieldParams {
            block_size: 4200,
            sampling: Sampling::Average,
            ..FieldParams::default()
        };
        let field = build(&image, &image, &params).unwrap();
        assert_eq!(field.len(), 1);
        assert_eq!(field.points()[0].color_a, Color::WHITE);
        assert_relative_eq!(field.points()[0].position.z, 100.0);
    }

    #[test]
    fn culling_drops_cells_transparent_in_both_photos() {
        let mut first = filled(6, 3, [255, 255, 255, 0]);
        let second = filled(6, 3, [255, 255, 255, 0]);
        first.put_pixel(3, 0, Rgba([9, 9, 9, 255]));

        let params = FieldParams {
            cull_transparent: true,
            ..FieldParams::default()
        };
        let field = build(&first, &second, &params).unwrap();
        assert_eq!(field.len(), 1);
        assert_eq!(field.points()[0].color_a, Color::from_rgb(9, 9, 9));
        assert_eq!(field.points()[0].color_b, Color::WHITE);
    }

    #[test]
    fn field_survives_json_export() {
        let image = filled(3, 3, [12, 34, 56, 255]);
        let field = build(&image, &image, &FieldParams::default()).unwrap();
        let json = serde_json::to_string(&field).unwrap();
        let back: PointField = serde_json::from_str(&json).unwrap();
        assert_eq!(back, field);
    }
}
