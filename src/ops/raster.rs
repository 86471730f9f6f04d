// ============================================================================
// SOFTWARE SURFACE — clipped, source-over drawing into an RgbaImage
// ============================================================================

use egui::{Pos2, Rect, Vec2};
use image::RgbaImage;
use rayon::prelude::*;

use crate::settings::ZoomFilterMode;

/// Source-over blend of an unmultiplied `src` into an unmultiplied `dst`
/// pixel, with `src` alpha scaled by `opacity`.
#[inline]
pub fn blend_over(dst: &mut [u8], src: [u8; 4], opacity: f32) {
    let sa = src[3] as f32 / 255.0 * opacity;
    if sa <= 0.0 {
        return;
    }
    if sa >= 1.0 {
        dst[..4].copy_from_slice(&src);
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        dst[..4].fill(0);
        return;
    }
    for i in 0..3 {
        let c = (src[i] as f32 * sa + dst[i] as f32 * da * (1.0 - sa)) / out_a;
        dst[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Nearest-neighbour sample, `None` outside the source.
#[inline]
fn sample_nearest(src: &RgbaImage, u: f32, v: f32) -> Option<[u8; 4]> {
    if u < 0.0 || v < 0.0 {
        return None;
    }
    let (x, y) = (u as u32, v as u32);
    if x >= src.width() || y >= src.height() {
        return None;
    }
    Some(src.get_pixel(x, y).0)
}

/// Bilinear sample in premultiplied space (no dark fringes at alpha edges).
#[inline]
fn sample_bilinear(src: &RgbaImage, u: f32, v: f32) -> Option<[u8; 4]> {
    let (w, h) = (src.width(), src.height());
    if u < 0.0 || v < 0.0 || u >= w as f32 || v >= h as f32 {
        return None;
    }
    let fx = (u - 0.5).max(0.0);
    let fy = (v - 0.5).max(0.0);
    let x0 = (fx as u32).min(w - 1);
    let y0 = (fy as u32).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let mut acc = [0.0f32; 4];
    for (x, y, wgt) in [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x1, y0, tx * (1.0 - ty)),
        (x0, y1, (1.0 - tx) * ty),
        (x1, y1, tx * ty),
    ] {
        let p = src.get_pixel(x, y).0;
        let a = p[3] as f32 / 255.0;
        acc[0] += p[0] as f32 * a * wgt;
        acc[1] += p[1] as f32 * a * wgt;
        acc[2] += p[2] as f32 * a * wgt;
        acc[3] += a * wgt;
    }
    if acc[3] <= 0.0 {
        return Some([0, 0, 0, 0]);
    }
    Some([
        (acc[0] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[1] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[2] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Squared distance from `p` to the segment `a`–`b`.
#[inline]
fn seg_dist_sq(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let len_sq = ab.length_sq();
    let t = if len_sq > 0.0 { (ap.dot(ab) / len_sq).clamp(0.0, 1.0) } else { 0.0 };
    (ap - ab * t).length_sq()
}

/// An output frame plus the current clip rectangle. Nothing outside the clip
/// is ever written.
pub struct Surface {
    img: RgbaImage,
    clip: Rect,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        let img = RgbaImage::new(width, height);
        let clip = Rect::from_min_size(Pos2::ZERO, Vec2::new(width as f32, height as f32));
        Self { img, clip }
    }

    /// Wrap an existing raster (e.g. to draw on top of a full-res image copy).
    pub fn from_image(img: RgbaImage) -> Self {
        let clip = Rect::from_min_size(
            Pos2::ZERO,
            Vec2::new(img.width() as f32, img.height() as f32),
        );
        Self { img, clip }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }

    pub fn full_rect(&self) -> Rect {
        Rect::from_min_size(
            Pos2::ZERO,
            Vec2::new(self.img.width() as f32, self.img.height() as f32),
        )
    }

    pub fn set_clip(&mut self, rect: Rect) {
        self.clip = rect.intersect(self.full_rect());
    }

    pub fn reset_clip(&mut self) {
        self.clip = self.full_rect();
    }

    /// Pixels whose centres fall inside `rect ∩ clip`, as `[x0, x1) × [y0, y1)`.
    fn span(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let r = rect.intersect(self.clip);
        if !(r.min.x < r.max.x && r.min.y < r.max.y) {
            return None;
        }
        let x0 = (r.min.x - 0.5).ceil().max(0.0) as u32;
        let y0 = (r.min.y - 0.5).ceil().max(0.0) as u32;
        let x1 = ((r.max.x - 0.5).ceil().max(0.0) as u32).min(self.img.width());
        let y1 = ((r.max.y - 0.5).ceil().max(0.0) as u32).min(self.img.height());
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }

    /// Run `f(x, y, pixel)` over every pixel centre inside `bounds ∩ clip`,
    /// rows in parallel.
    fn for_each_in<F>(&mut self, bounds: Rect, f: F)
    where
        F: Fn(u32, u32, &mut [u8]) + Sync,
    {
        let Some((x0, y0, x1, y1)) = self.span(bounds) else { return };
        let stride = self.img.width() as usize * 4;
        let raw: &mut [u8] = &mut self.img;
        raw.par_chunks_mut(stride)
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|(y, row)| {
                for x in x0..x1 {
                    let i = x as usize * 4;
                    f(x, y as u32, &mut row[i..i + 4]);
                }
            });
    }

    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        self.for_each_in(rect, |_, _, px| blend_over(px, color, 1.0));
    }

    /// Dashed outline, dash pattern restarting at each corner.
    pub fn stroke_dashed_rect(&mut self, rect: Rect, color: [u8; 4], dash: f32, gap: f32) {
        let period = (dash + gap).max(1.0);
        let (min, max) = (rect.min, rect.max);
        let mut t = min.x;
        while t < max.x {
            let end = (t + dash).min(max.x);
            self.fill_rect(Rect::from_min_max(Pos2::new(t, min.y - 0.5), Pos2::new(end, min.y + 0.5)), color);
            self.fill_rect(Rect::from_min_max(Pos2::new(t, max.y - 0.5), Pos2::new(end, max.y + 0.5)), color);
            t += period;
        }
        let mut t = min.y;
        while t < max.y {
            let end = (t + dash).min(max.y);
            self.fill_rect(Rect::from_min_max(Pos2::new(min.x - 0.5, t), Pos2::new(min.x + 0.5, end)), color);
            self.fill_rect(Rect::from_min_max(Pos2::new(max.x - 0.5, t), Pos2::new(max.x + 0.5, end)), color);
            t += period;
        }
    }

    /// Straight line with round ends.
    pub fn line(&mut self, a: Pos2, b: Pos2, color: [u8; 4], width: f32) {
        let hw = (width / 2.0).max(0.5);
        let bounds = Rect::from_two_pos(a, b).expand(hw + 1.0);
        let hw_sq = hw * hw;
        self.for_each_in(bounds, |x, y, px| {
            let c = Pos2::new(x as f32 + 0.5, y as f32 + 0.5);
            if seg_dist_sq(c, a, b) <= hw_sq {
                blend_over(px, color, 1.0);
            }
        });
    }

    pub fn fill_circle(&mut self, center: Pos2, radius: f32, color: [u8; 4]) {
        let r_sq = radius * radius;
        self.for_each_in(Rect::from_center_size(center, Vec2::splat(radius * 2.0 + 2.0)), |x, y, px| {
            let d = Pos2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
            if d.length_sq() <= r_sq {
                blend_over(px, color, 1.0);
            }
        });
    }

    pub fn stroke_circle(&mut self, center: Pos2, radius: f32, color: [u8; 4], width: f32) {
        let hw = (width / 2.0).max(0.5);
        let bounds = Rect::from_center_size(center, Vec2::splat((radius + hw) * 2.0 + 2.0));
        self.for_each_in(bounds, |x, y, px| {
            let d = (Pos2::new(x as f32 + 0.5, y as f32 + 0.5) - center).length();
            if (d - radius).abs() <= hw {
                blend_over(px, color, 1.0);
            }
        });
    }

    pub fn fill_triangle(&mut self, a: Pos2, b: Pos2, c: Pos2, color: [u8; 4]) {
        let edge = |p: Pos2, q: Pos2, r: Pos2| (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
        let area = edge(a, b, c);
        if area == 0.0 {
            return;
        }
        let bounds = Rect::from_two_pos(a, b).union(Rect::from_two_pos(b, c));
        self.for_each_in(bounds, |x, y, px| {
            let p = Pos2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(b, c, p) * area.signum();
            let w1 = edge(c, a, p) * area.signum();
            let w2 = edge(a, b, p) * area.signum();
            if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                blend_over(px, color, 1.0);
            }
        });
    }

    /// Draw `src` stretched into `dst` (screen space), rotated by
    /// `rotation_deg` clockwise about the centre of `dst`, alpha-scaled by
    /// `opacity`.
    pub fn draw_image(
        &mut self,
        src: &RgbaImage,
        dst: Rect,
        rotation_deg: f32,
        opacity: f32,
        filter: ZoomFilterMode,
    ) {
        if src.width() == 0 || src.height() == 0 || dst.width() <= 0.0 || dst.height() <= 0.0 {
            return;
        }
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 {
            return;
        }
        let center = dst.center();
        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        let bounds = if rotation_deg.rem_euclid(360.0) == 0.0 {
            dst
        } else {
            let half = dst.size() / 2.0;
            let ext = Vec2::new(
                (half.x * cos).abs() + (half.y * sin).abs(),
                (half.x * sin).abs() + (half.y * cos).abs(),
            );
            Rect::from_center_size(center, ext * 2.0)
        };
        let sx = src.width() as f32 / dst.width();
        let sy = src.height() as f32 / dst.height();
        let sample: fn(&RgbaImage, f32, f32) -> Option<[u8; 4]> = match filter {
            ZoomFilterMode::Nearest => sample_nearest,
            ZoomFilterMode::Linear => sample_bilinear,
        };

        self.for_each_in(bounds, |x, y, px| {
            // Inverse-rotate the pixel centre into the unrotated dst rect.
            let d = Pos2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
            let local = Pos2::new(
                center.x + d.x * cos + d.y * sin,
                center.y - d.x * sin + d.y * cos,
            );
            let u = (local.x - dst.min.x) * sx;
            let v = (local.y - dst.min.y) * sy;
            if let Some(c) = sample(src, u, v) {
                blend_over(px, c, opacity);
            }
        });
    }

    /// Composite a single-channel coverage buffer (values 0..=1) positioned
    /// at `(off_x, off_y)` in solid `color`.
    pub fn draw_coverage(&mut self, coverage: &[f32], w: u32, h: u32, off_x: i32, off_y: i32, color: [u8; 4]) {
        if w == 0 || h == 0 || coverage.len() < (w * h) as usize {
            return;
        }
        let bounds = Rect::from_min_size(
            Pos2::new(off_x as f32, off_y as f32),
            Vec2::new(w as f32, h as f32),
        );
        self.for_each_in(bounds, |x, y, px| {
            let lx = x as i32 - off_x;
            let ly = y as i32 - off_y;
            let cov = coverage[ly as usize * w as usize + lx as usize];
            if cov > 0.001 {
                blend_over(px, color, cov.min(1.0));
            }
        });
    }
}

/// Three-pass separable box blur (≈ gaussian) of a coverage buffer.
pub fn blur_coverage(src: &[f32], w: usize, h: usize, radius: usize) -> Vec<f32> {
    let mut buf = src.to_vec();
    if radius == 0 || w == 0 || h == 0 {
        return buf;
    }
    let mut tmp = vec![0.0f32; buf.len()];
    for _ in 0..3 {
        box_pass(&buf, &mut tmp, w, h, radius, true);
        box_pass(&tmp, &mut buf, w, h, radius, false);
    }
    buf
}

fn box_pass(src: &[f32], dst: &mut [f32], w: usize, h: usize, r: usize, horizontal: bool) {
    let (lines, len) = if horizontal { (h, w) } else { (w, h) };
    let idx = move |line: usize, i: usize| if horizontal { line * w + i } else { i * w + line };
    let norm = 1.0 / (2 * r + 1) as f32;
    for line in 0..lines {
        let mut acc = 0.0f32;
        for i in 0..=r.min(len - 1) {
            acc += src[idx(line, i)];
        }
        for i in 0..len {
            dst[idx(line, i)] = acc * norm;
            let add = i + r + 1;
            if add < len {
                acc += src[idx(line, add)];
            }
            if i >= r {
                acc -= src[idx(line, i - r)];
            }
        }
    }
}
