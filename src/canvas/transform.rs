// ============================================================================
// VIEW TRANSFORM — fit-to-viewport base scale composed with user zoom + pan
// ============================================================================

use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Result of fitting an image into a viewport.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Fit `image` into `viewport`, never upscaling beyond `cap`, centred.
pub fn fit(viewport_w: f32, viewport_h: f32, image_w: f32, image_h: f32, cap: f32) -> FitMetrics {
    if image_w <= 0.0 || image_h <= 0.0 || viewport_w <= 0.0 || viewport_h <= 0.0 {
        return FitMetrics { scale: cap, offset_x: 0.0, offset_y: 0.0 };
    }
    let scale = (viewport_w / image_w).min(viewport_h / image_h).min(cap);
    FitMetrics {
        scale,
        offset_x: (viewport_w - image_w * scale) / 2.0,
        offset_y: (viewport_h - image_h * scale) / 2.0,
    }
}

/// Maps image pixels ⇄ viewport pixels.
///
/// The draw origin (screen position of the image's top-left corner) is
/// `viewport_center + pan - draw_size / 2`, where `draw_size` is the image
/// size times `base_scale * zoom_scale`. With zoom 1 and no pan this reduces
/// to the base fit offset.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub base_scale: f32,
    pub base_offset_x: f32,
    pub base_offset_y: f32,
    pub zoom_scale: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    viewport: (f32, f32),
    image: (f32, f32),
    fit_cap: f32,
    min_zoom: f32,
    max_zoom: f32,
}

impl ViewTransform {
    pub fn new(fit_cap: f32, min_zoom: f32, max_zoom: f32) -> Self {
        Self {
            base_scale: fit_cap,
            base_offset_x: 0.0,
            base_offset_y: 0.0,
            zoom_scale: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            viewport: (0.0, 0.0),
            image: (0.0, 0.0),
            fit_cap,
            min_zoom,
            max_zoom,
        }
    }

    pub fn viewport_size(&self) -> Vec2 {
        Vec2::new(self.viewport.0, self.viewport.1)
    }

    pub fn image_size(&self) -> Vec2 {
        Vec2::new(self.image.0, self.image.1)
    }

    /// Recompute base metrics for a new viewport size. Zoom and pan are kept.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport = (width.max(0.0), height.max(0.0));
        self.refit();
    }

    pub fn set_image_size(&mut self, width: f32, height: f32) {
        self.image = (width.max(0.0), height.max(0.0));
        self.refit();
    }

    fn refit(&mut self) {
        let m = fit(self.viewport.0, self.viewport.1, self.image.0, self.image.1, self.fit_cap);
        self.base_scale = m.scale;
        self.base_offset_x = m.offset_x;
        self.base_offset_y = m.offset_y;
    }

    pub fn composed_scale(&self) -> f32 {
        self.base_scale * self.zoom_scale
    }

    pub fn draw_size(&self) -> Vec2 {
        Vec2::new(self.image.0, self.image.1) * self.composed_scale()
    }

    /// Screen position of the image's top-left corner.
    pub fn draw_origin(&self) -> Pos2 {
        let center = Pos2::new(self.viewport.0 / 2.0, self.viewport.1 / 2.0);
        center + Vec2::new(self.pan_x, self.pan_y) - self.draw_size() / 2.0
    }

    /// The displayed image rectangle in screen space.
    pub fn image_rect(&self) -> Rect {
        Rect::from_min_size(self.draw_origin(), self.draw_size())
    }

    pub fn to_image_space(&self, screen: Pos2) -> Pos2 {
        let origin = self.draw_origin();
        let s = self.composed_scale();
        Pos2::new((screen.x - origin.x) / s, (screen.y - origin.y) / s)
    }

    pub fn to_screen_space(&self, image: Pos2) -> Pos2 {
        let origin = self.draw_origin();
        let s = self.composed_scale();
        Pos2::new(origin.x + image.x * s, origin.y + image.y * s)
    }

    /// Map an image-space rectangle to screen space.
    pub fn rect_to_screen(&self, rect: Rect) -> Rect {
        Rect::from_min_max(self.to_screen_space(rect.min), self.to_screen_space(rect.max))
    }

    pub fn contains_image_point(&self, p: Pos2) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x <= self.image.0 && p.y <= self.image.1
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() {
            self.zoom_scale = zoom.clamp(self.min_zoom, self.max_zoom);
        }
    }

    /// Zoom by `factor` while keeping the image point under `anchor` fixed on screen.
    pub fn zoom_at(&mut self, factor: f32, anchor: Pos2) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let pinned = self.to_image_space(anchor);
        self.set_zoom(self.zoom_scale * factor);
        // anchor = center + pan - draw_size/2 + pinned * scale, solved for pan.
        let s = self.composed_scale();
        let center = Pos2::new(self.viewport.0 / 2.0, self.viewport.1 / 2.0);
        let half = self.draw_size() / 2.0;
        self.pan_x = anchor.x - center.x + half.x - pinned.x * s;
        self.pan_y = anchor.y - center.y + half.y - pinned.y * s;
    }

    /// Pan by a screen-space delta.
    pub fn pan_by(&mut self, delta: Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.pan_x += delta.x;
            self.pan_y += delta.y;
        }
    }

    pub fn reset_zoom(&mut self) {
        self.zoom_scale = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Pos2, b: Pos2) {
        assert!((a - b).length() < 1e-2, "{:?} != {:?}", a, b);
    }

    #[test]
    fn fit_is_capped_and_centred() {
        let m = fit(800.0, 600.0, 1000.0, 800.0, 0.9);
        // Height-bound: 600 / 800.
        assert!((m.scale - 0.75).abs() < 1e-6);
        assert!((m.offset_x - 25.0).abs() < 1e-4);
        assert!(m.offset_y.abs() < 1e-4);

        let small = fit(2000.0, 2000.0, 100.0, 100.0, 0.9);
        assert_eq!(small.scale, 0.9);
        assert!((small.offset_x - 955.0).abs() < 1e-4);
    }

    #[test]
    fn default_origin_matches_base_offset() {
        let mut t = ViewTransform::new(0.9, 0.1, 10.0);
        t.set_image_size(1000.0, 800.0);
        t.set_viewport(800.0, 600.0);
        assert_close(t.draw_origin(), Pos2::new(t.base_offset_x, t.base_offset_y));
        let r = t.image_rect();
        assert!((r.min.x - (800.0 - r.max.x)).abs() < 1e-3);
        assert!((r.min.y - (600.0 - r.max.y)).abs() < 1e-3);
    }

    #[test]
    fn round_trip_holds_across_zoom_and_pan() {
        let mut t = ViewTransform::new(0.9, 0.1, 10.0);
        t.set_image_size(1000.0, 800.0);
        for &(vw, vh) in &[(800.0, 600.0), (320.0, 1200.0), (1920.0, 1080.0)] {
            t.set_viewport(vw, vh);
            for &zoom in &[0.1, 0.5, 1.0, 3.7, 10.0] {
                t.set_zoom(zoom);
                t.pan_x = -123.0;
                t.pan_y = 45.5;
                for &p in &[Pos2::ZERO, Pos2::new(1000.0, 800.0), Pos2::new(333.3, 17.0)] {
                    assert_close(t.to_image_space(t.to_screen_space(p)), p);
                }
            }
        }
    }

    #[test]
    fn zoom_at_keeps_the_point_under_the_cursor() {
        let mut t = ViewTransform::new(0.9, 0.1, 10.0);
        t.set_image_size(1000.0, 800.0);
        t.set_viewport(800.0, 600.0);
        let anchor = Pos2::new(610.0, 95.0);
        let before = t.to_image_space(anchor);
        t.zoom_at(2.5, anchor);
        assert_close(t.to_image_space(anchor), before);
        t.zoom_at(0.3, anchor);
        assert_close(t.to_image_space(anchor), before);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut t = ViewTransform::new(0.9, 0.1, 10.0);
        t.set_zoom(1000.0);
        assert_eq!(t.zoom_scale, 10.0);
        t.set_zoom(0.0001);
        assert_eq!(t.zoom_scale, 0.1);
        t.set_zoom(f32::NAN);
        assert_eq!(t.zoom_scale, 0.1);
    }

    #[test]
    fn resize_keeps_zoom_and_pan() {
        let mut t = ViewTransform::new(0.9, 0.1, 10.0);
        t.set_image_size(400.0, 300.0);
        t.set_viewport(800.0, 600.0);
        t.set_zoom(2.0);
        t.pan_by(Vec2::new(10.0, -4.0));
        t.set_viewport(1024.0, 768.0);
        assert_eq!(t.zoom_scale, 2.0);
        assert_eq!((t.pan_x, t.pan_y), (10.0, -4.0));
    }
}
