// ============================================================================
// COMPOSITOR — state → frame, in fixed layer order
// ============================================================================
//
//   1. surface sized to the viewport
//   2. compare image + clipped current image (split view) or current image
//   3. reference subjects, ascending z
//   4. inspector overlay (grid / exposure)
//   5. mask preview (translucent working raster or red "show mask" tint)
//   6. selection box
//   7. text overlay (+ dashed bounds while editing text)
//
// Steps 3–7 run inside the split clip when a compare image is shown.

use std::sync::Arc;

use egui::{Pos2, Rect, Vec2};
use image::RgbaImage;

use super::mask::{MaskRaster, SelectionBox};
use super::overlay::{InspectorOverlay, OverlayRegistry, TextOverlay};
use super::tools::EditMode;
use super::transform::ViewTransform;
use crate::ops::raster::Surface;
use crate::ops::text::{TextPaint, TextRenderer};
use crate::settings::{CanvasSettings, ZoomFilterMode};

/// Opacity of the working mask raster in the standard preview.
const MASK_PREVIEW_OPACITY: f32 = 0.3;
const SELECTION_FILL_ALPHA: u8 = 26;
const GRID_COLOR: [u8; 4] = [255, 255, 255, 128];
const CROSSHAIR_COLOR: [u8; 4] = [255, 255, 255, 64];
const CROSSHAIR_HALF: f32 = 10.0;
const HANDLE_RADIUS: f32 = 5.0;
const SLIDER_KNOB_RADIUS: f32 = 15.0;
const SLIDER_ARROW: [u8; 4] = [51, 51, 51, 255];
const CHIP_FILL: [u8; 4] = [0, 0, 0, 128];
const CHIP_TEXT_SIZE: f32 = 12.0;
const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Second image revision shown through the split slider.
#[derive(Clone, Debug)]
pub struct CompareState {
    pub image: Arc<RgbaImage>,
    /// Fraction of the displayed image width showing the current revision.
    pub slider_position: f32,
}

/// Everything one frame depends on, borrowed from the engine.
pub struct Scene<'a> {
    pub image: &'a RgbaImage,
    pub transform: &'a ViewTransform,
    pub mode: EditMode,
    pub compare: Option<&'a CompareState>,
    pub mask: Option<&'a MaskRaster>,
    pub show_mask: bool,
    pub overlays: &'a OverlayRegistry,
    pub inspector: InspectorOverlay,
    pub exposure: Option<&'a RgbaImage>,
    pub selection: Option<SelectionBox>,
    pub text: Option<&'a TextOverlay>,
    pub settings: &'a CanvasSettings,
}

pub struct Compositor {
    text: TextRenderer,
    /// Red-tinted mask copy, keyed by mask generation.
    tint_cache: Option<(u64, RgbaImage)>,
}

impl Compositor {
    pub fn new(settings: &CanvasSettings) -> Self {
        Self { text: TextRenderer::new(&settings.default_font), tint_cache: None }
    }

    pub fn with_text_renderer(text: TextRenderer) -> Self {
        Self { text, tint_cache: None }
    }

    pub fn invalidate(&mut self) {
        self.tint_cache = None;
    }

    /// Render a viewport-sized frame.
    pub fn render(&mut self, scene: &Scene<'_>) -> RgbaImage {
        let vp = scene.transform.viewport_size();
        let mut surface = Surface::new(vp.x.max(0.0) as u32, vp.y.max(0.0) as u32);
        if surface.width() == 0 || surface.height() == 0 {
            return surface.into_image();
        }
        let rect = scene.transform.image_rect();
        let filter = scene.settings.zoom_filter_mode;

        match scene.compare.filter(|_| scene.mode != EditMode::ReferenceEdit) {
            Some(cmp) => {
                surface.draw_image(&cmp.image, rect, 0.0, 1.0, filter);
                self.draw_chip(&mut surface, "Before", Pos2::new(rect.min.x + 10.0, rect.min.y + 10.0));

                let split_x = rect.min.x + rect.width() * cmp.slider_position.clamp(0.0, 1.0);
                surface.set_clip(Rect::from_min_max(rect.min, Pos2::new(split_x, rect.max.y)));
                surface.draw_image(scene.image, rect, 0.0, 1.0, filter);
                self.draw_layers(&mut surface, scene, rect);
                self.draw_chip(&mut surface, "After", Pos2::new(rect.min.x + 10.0, rect.max.y - 34.0));
                surface.reset_clip();

                self.draw_slider(&mut surface, split_x, rect);
            }
            None => {
                surface.draw_image(scene.image, rect, 0.0, 1.0, filter);
                self.draw_layers(&mut surface, scene, rect);
            }
        }
        surface.into_image()
    }

    fn draw_layers(&mut self, surface: &mut Surface, scene: &Scene<'_>, rect: Rect) {
        let t = scene.transform;
        let accent = scene.settings.accent_color;

        // 3. reference subjects
        for s in scene.overlays.ordered() {
            if !s.visible {
                continue;
            }
            let dst = t.rect_to_screen(s.bounds());
            surface.draw_image(&s.pixels, dst, s.rotation, s.opacity, scene.settings.zoom_filter_mode);
        }
        if scene.mode != EditMode::ReferenceEdit {
            if let Some(s) = scene.overlays.active_subject().filter(|s| s.visible) {
                let dst = t.rect_to_screen(s.bounds());
                surface.stroke_dashed_rect(dst, accent, 5.0, 5.0);
                surface.fill_circle(dst.max, HANDLE_RADIUS, WHITE);
                surface.stroke_circle(dst.max, HANDLE_RADIUS, accent, 2.0);
            }
        }

        // 4. inspector
        match scene.inspector {
            InspectorOverlay::Grid => draw_grid(surface, rect),
            InspectorOverlay::Exposure => {
                if let Some(map) = scene.exposure {
                    surface.draw_image(map, rect, 0.0, 1.0, ZoomFilterMode::Nearest);
                }
            }
            InspectorOverlay::None => {}
        }

        // 5. mask preview
        if let Some(mask) = scene.mask {
            if scene.show_mask {
                let tint = scene.settings.mask_tint_color;
                let stale = !matches!(&self.tint_cache, Some((g, _)) if *g == mask.generation());
                if stale {
                    self.tint_cache = Some((mask.generation(), mask.tinted(tint)));
                }
                if let Some((_, tinted)) = &self.tint_cache {
                    surface.draw_image(tinted, rect, 0.0, 1.0, ZoomFilterMode::Nearest);
                }
            } else {
                surface.draw_image(mask.working(), rect, 0.0, MASK_PREVIEW_OPACITY, ZoomFilterMode::Nearest);
            }
        }

        // 6. selection box
        if let Some(sel) = scene.selection {
            let r = t.rect_to_screen(Rect::from_min_size(Pos2::new(sel.x, sel.y), Vec2::new(sel.width, sel.height)));
            surface.fill_rect(r, [accent[0], accent[1], accent[2], SELECTION_FILL_ALPHA]);
            surface.stroke_dashed_rect(r, accent, 4.0, 2.0);
        }

        // 7. text overlay
        if let Some(text) = scene.text {
            let s = t.composed_scale();
            let baseline = t.to_screen_space(Pos2::new(text.x, text.y));
            let size = text.font_size * s;
            self.text.draw(surface, &text.text, baseline, &TextPaint {
                family: &text.font_family,
                weight: text.font_weight,
                size,
                color: text.color,
                shadow_color: text.shadow_color,
                shadow_blur: text.shadow_blur * s,
            });
            if scene.mode == EditMode::Text {
                let w = self.text.measure(&text.font_family, text.font_weight, &text.text, size);
                let bounds = Rect::from_min_size(
                    Pos2::new(baseline.x - 5.0, baseline.y - size),
                    Vec2::new(w + 10.0, size + 10.0),
                );
                surface.stroke_dashed_rect(bounds, accent, 5.0, 5.0);
            }
        }
    }

    fn draw_chip(&mut self, surface: &mut Surface, label: &str, at: Pos2) {
        surface.fill_rect(Rect::from_min_size(at, Vec2::new(80.0, 24.0)), CHIP_FILL);
        self.text.draw(surface, label, Pos2::new(at.x + 10.0, at.y + 16.0), &TextPaint {
            family: "sans-serif",
            weight: 700,
            size: CHIP_TEXT_SIZE,
            color: WHITE,
            shadow_color: [0, 0, 0, 0],
            shadow_blur: 0.0,
        });
    }

    fn draw_slider(&self, surface: &mut Surface, split_x: f32, rect: Rect) {
        surface.line(Pos2::new(split_x, rect.min.y), Pos2::new(split_x, rect.max.y), WHITE, 2.0);
        let knob = Pos2::new(split_x, rect.center().y);
        surface.fill_circle(knob, SLIDER_KNOB_RADIUS, WHITE);
        surface.stroke_circle(knob, SLIDER_KNOB_RADIUS, [0, 0, 0, 51], 1.0);
        surface.fill_triangle(
            Pos2::new(knob.x - 5.0, knob.y),
            Pos2::new(knob.x - 1.0, knob.y - 4.0),
            Pos2::new(knob.x - 1.0, knob.y + 4.0),
            SLIDER_ARROW,
        );
        surface.fill_triangle(
            Pos2::new(knob.x + 5.0, knob.y),
            Pos2::new(knob.x + 1.0, knob.y - 4.0),
            Pos2::new(knob.x + 1.0, knob.y + 4.0),
            SLIDER_ARROW,
        );
    }

    /// Full-resolution copy of `image` with the text overlay baked in.
    pub fn flatten(&mut self, image: &RgbaImage, text: Option<&TextOverlay>) -> RgbaImage {
        let mut surface = Surface::from_image(image.clone());
        if let Some(text) = text {
            self.text.draw(&mut surface, &text.text, Pos2::new(text.x, text.y), &TextPaint {
                family: &text.font_family,
                weight: text.font_weight,
                size: text.font_size,
                color: text.color,
                shadow_color: text.shadow_color,
                shadow_blur: text.shadow_blur,
            });
        }
        surface.into_image()
    }
}

/// Rule-of-thirds lines plus a faint centre cross-hair.
fn draw_grid(surface: &mut Surface, rect: Rect) {
    for i in 1..3 {
        let f = i as f32 / 3.0;
        let x = rect.min.x + rect.width() * f;
        let y = rect.min.y + rect.height() * f;
        surface.line(Pos2::new(x, rect.min.y), Pos2::new(x, rect.max.y), GRID_COLOR, 1.0);
        surface.line(Pos2::new(rect.min.x, y), Pos2::new(rect.max.x, y), GRID_COLOR, 1.0);
    }
    let c = rect.center();
    surface.line(Pos2::new(c.x - CROSSHAIR_HALF, c.y), Pos2::new(c.x + CROSSHAIR_HALF, c.y), CROSSHAIR_COLOR, 1.0);
    surface.line(Pos2::new(c.x, c.y - CROSSHAIR_HALF), Pos2::new(c.x, c.y + CROSSHAIR_HALF), CROSSHAIR_COLOR, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn offline() -> Compositor {
        let mut r = TextRenderer::new("none");
        r.disable_system_fonts();
        Compositor::with_text_renderer(r)
    }

    /// 100×100 image filling a 100×100 viewport 1:1.
    fn setup() -> (RgbaImage, ViewTransform, CanvasSettings, OverlayRegistry) {
        let img = RgbaImage::from_pixel(100, 100, RED);
        let mut t = ViewTransform::new(1.0, 0.1, 10.0);
        t.set_image_size(100.0, 100.0);
        t.set_viewport(100.0, 100.0);
        let mut settings = CanvasSettings::default();
        settings.zoom_filter_mode = ZoomFilterMode::Nearest;
        (img, t, settings, OverlayRegistry::new())
    }

    fn scene<'a>(
        img: &'a RgbaImage,
        t: &'a ViewTransform,
        settings: &'a CanvasSettings,
        overlays: &'a OverlayRegistry,
    ) -> Scene<'a> {
        Scene {
            image: img,
            transform: t,
            mode: EditMode::View,
            compare: None,
            mask: None,
            show_mask: false,
            overlays,
            inspector: InspectorOverlay::None,
            exposure: None,
            selection: None,
            text: None,
            settings,
        }
    }

    #[test]
    fn frame_matches_the_viewport_and_image_is_centred() {
        let (img, mut t, settings, overlays) = setup();
        t.set_viewport(300.0, 100.0);
        let frame = offline().render(&scene(&img, &t, &settings, &overlays));
        assert_eq!(frame.dimensions(), (300, 100));
        assert_eq!(frame.get_pixel(150, 50).0, RED.0);
        assert_eq!(frame.get_pixel(10, 50)[3], 0);
    }

    #[test]
    fn split_view_shows_current_left_and_compare_right() {
        let (img, t, settings, overlays) = setup();
        let cmp = CompareState { image: Arc::new(RgbaImage::from_pixel(100, 100, BLUE)), slider_position: 0.5 };
        let mut sc = scene(&img, &t, &settings, &overlays);
        sc.compare = Some(&cmp);
        let frame = offline().render(&sc);
        // Clear of the caption chips and the slider knob.
        assert_eq!(frame.get_pixel(30, 50).0, RED.0);
        assert_eq!(frame.get_pixel(80, 50).0, BLUE.0);

        // Reference-edit mode hides the comparison.
        sc.mode = EditMode::ReferenceEdit;
        let frame = offline().render(&sc);
        assert_eq!(frame.get_pixel(80, 50).0, RED.0);
    }

    #[test]
    fn higher_z_subject_paints_on_top() {
        let (img, t, settings, mut overlays) = setup();
        let green = Arc::new(RgbaImage::from_pixel(20, 20, Rgba([0, 255, 0, 255])));
        let black = Arc::new(RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255])));
        overlays.add_subject(green, "green", 10.0, 10.0);
        overlays.add_subject(black, "black", 20.0, 20.0);
        let frame = offline().render(&scene(&img, &t, &settings, &overlays));
        assert_eq!(frame.get_pixel(15, 15).0, [0, 255, 0, 255]);
        assert_eq!(frame.get_pixel(25, 25).0, [0, 0, 0, 255]);
    }

    #[test]
    fn show_mask_tints_only_masked_pixels() {
        let (img, t, settings, overlays) = setup();
        let mut mask = MaskRaster::new(100, 100, settings.mask_paint_color);
        mask.fill_box(&SelectionBox { x: 0.0, y: 0.0, width: 50.0, height: 100.0 });
        let img = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let mut sc = scene(&img, &t, &settings, &overlays);
        sc.mask = Some(&mask);
        sc.show_mask = true;
        let frame = offline().render(&sc);
        let masked = frame.get_pixel(20, 50);
        assert!(masked[1] < 200 && masked[0] > 240);
        assert_eq!(frame.get_pixel(80, 50).0, [255, 255, 255, 255]);
        // The working raster keeps its paint colour.
        assert_eq!(mask.working().get_pixel(20, 50)[0], settings.mask_paint_color[0]);
    }

    #[test]
    fn exposure_overlay_is_drawn_over_the_image() {
        let (img, t, settings, overlays) = setup();
        let map = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 255, 255]));
        let mut sc = scene(&img, &t, &settings, &overlays);
        sc.inspector = InspectorOverlay::Exposure;
        sc.exposure = Some(&map);
        let frame = offline().render(&sc);
        assert_eq!(frame.get_pixel(50, 50).0, BLUE.0);
    }

    #[test]
    fn zero_viewport_renders_an_empty_frame() {
        let (img, mut t, settings, overlays) = setup();
        t.set_viewport(0.0, 0.0);
        let frame = offline().render(&scene(&img, &t, &settings, &overlays));
        assert_eq!(frame.dimensions(), (0, 0));
    }

    #[test]
    fn flatten_keeps_full_resolution() {
        let img = RgbaImage::from_pixel(640, 480, RED);
        let text = TextOverlay::new("caption", 10.0, 100.0);
        let out = offline().flatten(&img, Some(&text));
        assert_eq!(out.dimensions(), (640, 480));
    }
}
