// ============================================================================
// MASK RASTER — offscreen selection buffer at image resolution
// ============================================================================

use egui::Pos2;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Opaque white: a selected pixel in the canonical export.
pub const MASK_SELECTED: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Opaque black: an unselected pixel in the canonical export.
pub const MASK_UNSELECTED: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Axis-aligned region in image-pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SelectionBox {
    /// Box spanned by two corners (any order), clamped to `[0, w] × [0, h]`.
    pub fn from_corners(a: Pos2, b: Pos2, image_w: f32, image_h: f32) -> Self {
        let x0 = a.x.min(b.x).clamp(0.0, image_w);
        let x1 = a.x.max(b.x).clamp(0.0, image_w);
        let y0 = a.y.min(b.y).clamp(0.0, image_h);
        let y1 = a.y.max(b.y).clamp(0.0, image_h);
        Self { x: x0, y: y0, width: x1 - x0, height: y1 - y0 }
    }

    /// Re-clamp an arbitrary box into the image.
    pub fn clamped(self, image_w: f32, image_h: f32) -> Self {
        Self::from_corners(
            Pos2::new(self.x, self.y),
            Pos2::new(self.x + self.width, self.y + self.height),
            image_w,
            image_h,
        )
    }

    pub fn is_degenerate(&self) -> bool {
        self.width < 1.0 || self.height < 1.0
    }

    /// Integer pixel span `[x0, x1) × [y0, y1)` covered by this box.
    pub fn pixel_bounds(&self, image_w: u32, image_h: u32) -> (u32, u32, u32, u32) {
        let x0 = (self.x.round().max(0.0) as u32).min(image_w);
        let y0 = (self.y.round().max(0.0) as u32).min(image_h);
        let x1 = ((self.x + self.width).round().max(0.0) as u32).min(image_w);
        let y1 = ((self.y + self.height).round().max(0.0) as u32).min(image_h);
        (x0, y0, x1.max(x0), y1.max(y0))
    }
}

/// Whether a brush stroke adds to or removes from the selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BrushMode {
    #[default]
    Paint,
    Erase,
}

/// Soft round brush tip. The LUT maps the squared distance ratio
/// (`dist² / radius²`, quantised to 0..=255) to coverage, so the per-pixel
/// loop needs no `sqrt`.
#[derive(Clone, Debug)]
pub struct BrushKernel {
    pub radius: f32,
    lut: [u8; 256],
}

impl BrushKernel {
    pub fn new(radius: f32, hardness: f32) -> Self {
        let mut lut = [0u8; 256];
        let radius = radius.max(0.5);
        let hardness = hardness.clamp(0.0, 1.0);
        for (i, slot) in lut.iter_mut().enumerate() {
            let dist = (i as f32 / 255.0).sqrt() * radius;
            *slot = (Self::alpha_at(dist, radius, hardness) * 255.0).round() as u8;
        }
        Self { radius, lut }
    }

    /// Solid core out to `radius * hardness`, smoothstep falloff to the rim.
    fn alpha_at(dist: f32, radius: f32, hardness: f32) -> f32 {
        let fade = (radius * (1.0 - hardness)).max(1.0).min(radius);
        let solid = radius - fade;
        if dist <= solid {
            return 1.0;
        }
        if dist >= radius {
            return 0.0;
        }
        let t = (dist - solid) / fade;
        1.0 - t * t * (3.0 - 2.0 * t)
    }

    /// Coverage for a pixel whose centre lies `dist_sq` (squared) from the stroke.
    #[inline]
    pub fn coverage(&self, dist_sq: f32) -> u8 {
        let r_sq = self.radius * self.radius;
        if dist_sq >= r_sq {
            return 0;
        }
        // Pixels right under the stroke are always fully covered, even for
        // sub-pixel radii where the LUT would fade out immediately.
        if dist_sq <= 0.25 {
            return 255;
        }
        self.lut[((dist_sq / r_sq) * 255.0) as usize]
    }
}

/// Squared distance from `p` to the segment `a`–`b`.
fn dist_sq_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let (apx, apy) = (p.0 - a.0, p.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 0.0 {
        ((apx * abx + apy * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (dx, dy) = (apx - abx * t, apy - aby * t);
    dx * dx + dy * dy
}

/// The working selection raster.
///
/// Pixels are painted with an arbitrary preview colour; only alpha carries
/// meaning. Any pixel with nonzero alpha is selected.
#[derive(Clone, Debug)]
pub struct MaskRaster {
    pixels: RgbaImage,
    paint: Rgba<u8>,
    /// Bumped on every mutation so cached previews can be rebuilt lazily.
    generation: u64,
    /// A box or stroke has been applied since the last clear, even one that
    /// left nothing selected.
    edited: bool,
}

impl MaskRaster {
    pub fn new(width: u32, height: u32, paint: [u8; 4]) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            paint: Rgba([paint[0], paint[1], paint[2], 255]),
            generation: 0,
            edited: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The interactive raster, as painted.
    pub fn working(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn is_selected(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.pixels.get_pixel(x, y)[3] > 0
    }

    /// True once a box or stroke has been applied since the last clear.
    /// An edited mask with no selected pixels means "apply nowhere".
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// True when at least one pixel is selected.
    pub fn has_coverage(&self) -> bool {
        self.pixels.as_raw().par_chunks_exact(4).any(|px| px[3] > 0)
    }

    pub fn selected_count(&self) -> usize {
        self.pixels
            .as_raw()
            .par_chunks_exact(4)
            .filter(|px| px[3] > 0)
            .count()
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut self.pixels;
        raw.fill(0);
        self.edited = false;
        self.touch();
    }

    /// Replace the whole raster with exactly one filled rectangle.
    pub fn fill_box(&mut self, sel: &SelectionBox) {
        let (w, h) = (self.width(), self.height());
        let (x0, y0, x1, y1) = sel.pixel_bounds(w, h);
        let paint = self.paint.0;
        let stride = w as usize * 4;
        self.edited = true;
        if stride == 0 {
            return;
        }
        let raw: &mut [u8] = &mut self.pixels;
        raw.par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                row.fill(0);
                if (y as u32) < y0 || (y as u32) >= y1 {
                    return;
                }
                for px in row[x0 as usize * 4..x1 as usize * 4].chunks_exact_mut(4) {
                    px.copy_from_slice(&paint);
                }
            });
        self.touch();
    }

    /// Draw a round-capped segment from `from` to `to` (image space).
    ///
    /// `Paint` raises coverage to the kernel value (max-alpha, so overlapping
    /// dabs never stack); `Erase` removes coverage proportionally.
    pub fn stroke_brush(&mut self, from: Pos2, to: Pos2, kernel: &BrushKernel, mode: BrushMode) {
        self.edited = true;
        let (w, h) = (self.width() as i64, self.height() as i64);
        if w == 0 || h == 0 {
            return;
        }
        let r = kernel.radius;
        let x0 = ((from.x.min(to.x) - r).floor() as i64).clamp(0, w);
        let x1 = ((from.x.max(to.x) + r).ceil() as i64 + 1).clamp(0, w);
        let y0 = ((from.y.min(to.y) - r).floor() as i64).clamp(0, h);
        let y1 = ((from.y.max(to.y) + r).ceil() as i64 + 1).clamp(0, h);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let paint = self.paint.0;
        let stride = w as usize * 4;
        let a = (from.x, from.y);
        let b = (to.x, to.y);
        let raw: &mut [u8] = &mut self.pixels;
        raw.par_chunks_mut(stride)
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|(y, row)| {
                let cy = y as f32 + 0.5;
                for x in x0 as usize..x1 as usize {
                    let cov = kernel.coverage(dist_sq_to_segment((x as f32 + 0.5, cy), a, b));
                    if cov == 0 {
                        continue;
                    }
                    let px = &mut row[x * 4..x * 4 + 4];
                    match mode {
                        BrushMode::Paint => {
                            if cov > px[3] {
                                px[..3].copy_from_slice(&paint[..3]);
                                px[3] = cov;
                            }
                        }
                        BrushMode::Erase => {
                            let keep = 255 - cov as u32;
                            px[3] = ((px[3] as u32 * keep + 127) / 255) as u8;
                        }
                    }
                }
            });
        self.touch();
    }

    /// Canonical binary export.
    ///
    /// Equivalent to filling white with "source-in" (keeps alpha, replaces
    /// colour) and then painting black "destination-over", with coverage
    /// thresholded so the result is bit-exact: nonzero alpha becomes
    /// `(255,255,255,255)`, everything else `(0,0,0,255)`.
    pub fn export_canonical(&self) -> RgbaImage {
        let mut out = self.pixels.clone();
        let raw: &mut [u8] = &mut out;
        raw.par_chunks_exact_mut(4).for_each(|px| {
            let v = if px[3] > 0 { MASK_SELECTED } else { MASK_UNSELECTED };
            px.copy_from_slice(&v.0);
        });
        out
    }

    /// A copy of the raster recoloured with `tint`, keeping the coverage
    /// footprint ("source-in" fill). Used for the show-mask preview so the
    /// working raster is never touched.
    pub fn tinted(&self, tint: [u8; 4]) -> RgbaImage {
        let mut out = self.pixels.clone();
        let raw: &mut [u8] = &mut out;
        raw.par_chunks_exact_mut(4).for_each(|px| {
            if px[3] > 0 {
                // Any coverage stays visible under a visible tint.
                let a = (px[3] as u32 * tint[3] as u32 + 127) / 255;
                px[..3].copy_from_slice(&tint[..3]);
                px[3] = if tint[3] > 0 { a.max(1) as u8 } else { 0 };
            } else {
                px.fill(0);
            }
        });
        out
    }
}
