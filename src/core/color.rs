use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb};

use crate::error::{AppError, Result};

/// Width every image is resampled to before sampling.
pub const WORKING_WIDTH: u32 = 160;
/// Lower bound on the resampled height.
pub const MIN_WORKING_HEIGHT: u32 = 40;
/// Upper bound on the resampled height; taller strips are rejected.
pub const MAX_WORKING_HEIGHT: u32 = 4096;

/// Height of the working canvas for an image of the given size.
///
/// Saturates at `u32::MAX` for extreme aspect ratios; callers compare the
/// result against [`MAX_WORKING_HEIGHT`] before allocating.
pub fn working_height(width: u32, height: u32) -> u32 {
    let scaled = (f64::from(WORKING_WIDTH) * f64::from(height) / f64::from(width)).round() as u32;
    scaled.max(MIN_WORKING_HEIGHT)
}

/// Rec. 601 luma of an RGB triple.
#[inline]
pub fn brightness(r: u8, g: u8, b: u8) -> f64 {
    0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
}

/// Whether a pixel looks brown or dark enough to count as spoiled.
#[inline]
pub fn is_spoiled_pixel(pixel: &Rgb<u8>) -> bool {
    let [r, g, b] = pixel.0;
    let luma = brightness(r, g, b);
    let (ri, gi, bi) = (i32::from(r), i32::from(g), i32::from(b));

    let brown = ri > 70 && ri > gi + 10 && gi > bi - 20 && luma < 140.0;
    let dark = luma < 60.0;
    brown || dark
}

/// Fraction of spoiled-looking pixels, in `[0, 1]`.
///
/// The image is resampled to a 160 px wide canvas (aspect preserved, at least
/// 40 px tall) and every pixel is tested; alpha is ignored. Images taller
/// than 25.6 times their width would need a canvas over
/// [`MAX_WORKING_HEIGHT`] and fail with `InvalidInput`.
pub fn color_ratio(img: &DynamicImage) -> Result<f64> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(AppError::EmptyImage);
    }

    let canvas_height = working_height(width, height);
    if canvas_height > MAX_WORKING_HEIGHT {
        return Err(AppError::InvalidInput(format!(
            "{}x{} image is too narrow for its height",
            width, height
        )));
    }

    let rgb = img.to_rgb8();
    let canvas = imageops::resize(&rgb, WORKING_WIDTH, canvas_height, FilterType::Triangle);

    let total = canvas.width() as usize * canvas.height() as usize;
    let spoiled = canvas.pixels().filter(|p| is_spoiled_pixel(p)).count();

    let ratio = spoiled as f64 / total as f64;
    log::debug!(
        "Color heuristic: {}/{} spoiled pixels on {}x{} canvas",
        spoiled,
        total,
        canvas.width(),
        canvas.height()
    );
    Ok(ratio)
}
