// ============================================================================
// IMAGING HELPERS — crop and mask-driven cutout
// ============================================================================

use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::mask::SelectionBox;

/// Copy the pixels covered by `region` into a new image.
/// `None` when the region (after clamping) is empty.
pub fn crop_region(img: &RgbaImage, region: &SelectionBox) -> Option<RgbaImage> {
    let (w, h) = img.dimensions();
    let (x0, y0, x1, y1) = region.clamped(w as f32, h as f32).pixel_bounds(w, h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image())
}

/// Replace the alpha of `img` with the red channel of `mask`.
///
/// A canonical mask (white = keep, black = drop) yields a hard cutout. The
/// mask is stretched to the image size when the dimensions differ.
pub fn apply_alpha_from_mask(img: &RgbaImage, mask: &RgbaImage) -> RgbaImage {
    let resized;
    let mask = if mask.dimensions() == img.dimensions() {
        mask
    } else {
        crate::log_info!(
            "cutout: stretching {}x{} mask to {}x{}",
            mask.width(),
            mask.height(),
            img.width(),
            img.height()
        );
        resized = imageops::resize(mask, img.width(), img.height(), FilterType::Nearest);
        &resized
    };

    let mut out = img.clone();
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_exact_mut(4)
        .zip(mask.as_raw().par_chunks_exact(4))
        .for_each(|(px, m)| px[3] = m[0]);
    out
}
