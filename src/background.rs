use image::{Rgba, RgbaImage};

use crate::{segmentation::SegmentationMask, Error, Result};

/// What a background pixel becomes: transparent white.
pub const STRIPPED: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Replaces every pixel the mask labels as background with [`STRIPPED`].
///
/// The mask must hold exactly one label per pixel; otherwise the image is left
/// untouched and [`Error::MaskLength`] is returned.
pub fn strip_background(image: &mut RgbaImage, mask: &SegmentationMask) -> Result<()> {
    let pixels = image.width() as usize * image.height() as usize;
    let labels = mask.labels();
    if labels.len() != pixels {
        return Err(Error::MaskLength {
            mask: labels.len(),
            pixels,
        });
    }

    let mut stripped = 0usize;
    for (pixel, &label) in image.pixels_mut().zip(labels) {
        if label == SegmentationMask::BACKGROUND {
            *pixel = STRIPPED;
            stripped += 1;
        }
    }

    tracing::debug!("stripped {} of {} pixels", stripped, pixels);
    Ok(())
}
