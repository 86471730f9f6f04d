// ============================================================================
// CANVAS MODULE — interactive composition and masking engine
// ============================================================================
//
//   transform.rs  — fit-to-viewport base metrics, zoom/pan, screen ⇄ image
//   mask.rs       — selection raster, brush kernel, canonical export
//   overlay.rs    — reference subjects, text overlay, exposure heat-map
//   compositor.rs — state → viewport frame
//   tools.rs      — per-mode pointer handlers and host events
//
// `CanvasEngine` owns all of it. Every mutation redraws synchronously, so
// `frame()` always reflects the current state.
// ============================================================================

pub mod compositor;
pub mod mask;
pub mod overlay;
pub mod tools;
pub mod transform;

use std::sync::Arc;

use egui::{Pos2, Vec2};
use image::RgbaImage;

pub use compositor::{CompareState, Compositor};
pub use mask::{BrushKernel, BrushMode, MaskRaster, SelectionBox};
pub use overlay::{InspectorOverlay, OverlayRegistry, ReferenceSubject, SubjectId, SubjectUpdate, TextOverlay};
pub use tools::{CanvasEvent, DragState, EditMode};
pub use transform::ViewTransform;

use crate::io::{decode_image_bytes, ImageIoError};
use crate::ops::text::TextRenderer;
use crate::settings::CanvasSettings;
use compositor::Scene;
use overlay::ExposureCache;
use tools::{Pointer, ToolContext};

/// Identifies one asynchronous image load. Only the most recently issued
/// ticket may replace the image.
pub type LoadTicket = u64;

#[derive(Debug)]
pub enum LoadOutcome {
    Applied { width: u32, height: u32 },
    /// A newer load was started after this one; the result was dropped.
    Stale,
    Failed(ImageIoError),
}

type PointerHandler = fn(&mut ToolContext<'_>, &Pointer);

pub struct CanvasEngine {
    settings: CanvasSettings,
    image: Option<Arc<RgbaImage>>,
    /// Bumped on every image replacement; keys derived caches.
    image_revision: u64,
    load_seq: LoadTicket,
    transform: ViewTransform,
    mask: Option<MaskRaster>,
    selection: Option<SelectionBox>,
    overlays: OverlayRegistry,
    text: Option<TextOverlay>,
    compare: Option<CompareState>,
    inspector: InspectorOverlay,
    exposure: ExposureCache,
    show_mask: bool,
    mode: EditMode,
    brush_mode: BrushMode,
    brush_size_px: f32,
    drag: DragState,
    events: Vec<CanvasEvent>,
    compositor: Compositor,
    frame: RgbaImage,
    frame_revision: u64,
}

impl CanvasEngine {
    pub fn new(settings: CanvasSettings) -> Self {
        let compositor = Compositor::new(&settings);
        Self::with_compositor(settings, compositor)
    }

    /// Engine whose text goes through `renderer` (e.g. a fixed font, or none).
    pub fn with_text_renderer(settings: CanvasSettings, renderer: TextRenderer) -> Self {
        Self::with_compositor(settings, Compositor::with_text_renderer(renderer))
    }

    fn with_compositor(settings: CanvasSettings, compositor: Compositor) -> Self {
        Self {
            transform: ViewTransform::new(settings.fit_cap, settings.min_zoom, settings.max_zoom),
            brush_size_px: settings.brush_size_px,
            settings,
            image: None,
            image_revision: 0,
            load_seq: 0,
            mask: None,
            selection: None,
            overlays: OverlayRegistry::new(),
            text: None,
            compare: None,
            inspector: InspectorOverlay::None,
            exposure: ExposureCache::default(),
            show_mask: false,
            mode: EditMode::View,
            brush_mode: BrushMode::Paint,
            drag: DragState::Idle,
            events: Vec::new(),
            compositor,
            frame: RgbaImage::new(0, 0),
            frame_revision: 0,
        }
    }

    pub fn settings(&self) -> &CanvasSettings {
        &self.settings
    }

    // ========================================================================
    // IMAGE LOADING
    // ========================================================================

    /// Start a load. Any earlier ticket becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_seq += 1;
        self.load_seq
    }

    /// Resolve a load started with [`begin_load`](Self::begin_load).
    ///
    /// Stale tickets change nothing. Failures keep the previous image.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<RgbaImage, ImageIoError>) -> LoadOutcome {
        if ticket != self.load_seq {
            crate::log_info!("discarding stale image load #{} (current #{})", ticket, self.load_seq);
            return LoadOutcome::Stale;
        }
        let result = result.and_then(|img| {
            if img.width() == 0 || img.height() == 0 { Err(ImageIoError::Empty) } else { Ok(img) }
        });
        match result {
            Ok(img) => {
                let (width, height) = img.dimensions();
                self.apply_image(img);
                LoadOutcome::Applied { width, height }
            }
            Err(e) => {
                crate::log_err!("image load #{} failed: {}", ticket, e);
                self.events.push(CanvasEvent::ImageLoadFailed(e.to_string()));
                LoadOutcome::Failed(e)
            }
        }
    }

    /// Decode and apply `bytes` on the calling thread.
    pub fn load_image_bytes(&mut self, bytes: &[u8]) -> LoadOutcome {
        let ticket = self.begin_load();
        self.finish_load(ticket, decode_image_bytes(bytes))
    }

    /// Replace the image with an already-decoded raster.
    pub fn set_image(&mut self, img: RgbaImage) -> LoadOutcome {
        let ticket = self.begin_load();
        self.finish_load(ticket, Ok(img))
    }

    fn apply_image(&mut self, img: RgbaImage) {
        let (w, h) = img.dimensions();
        let same_size = self.image.as_ref().is_some_and(|old| old.dimensions() == (w, h));
        self.image = Some(Arc::new(img));
        self.image_revision += 1;
        self.transform.set_image_size(w as f32, h as f32);
        if !same_size {
            self.transform.reset_zoom();
        }
        self.mask = Some(MaskRaster::new(w, h, self.settings.mask_paint_color));
        self.selection = None;
        self.drag = DragState::Idle;
        self.exposure.invalidate();
        self.compositor.invalidate();
        self.events.push(CanvasEvent::SelectionChanged(None));
        self.events.push(CanvasEvent::ImageLoaded { width: w, height: h });
        crate::log_info!("image loaded: {}x{} (revision {})", w, h, self.image_revision);
        self.redraw();
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_deref()
    }

    /// Shared handle to the current image (e.g. to keep it as a compare revision).
    pub fn image_arc(&self) -> Option<Arc<RgbaImage>> {
        self.image.clone()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    // ========================================================================
    // VIEWPORT / TRANSFORM
    // ========================================================================

    pub fn transform(&self) -> &ViewTransform {
        &self.transform
    }

    /// Viewport resized. Mask and overlays are untouched.
    pub fn resize(&mut self, width: f32, height: f32) {
        let vp = self.transform.viewport_size();
        if vp.x == width && vp.y == height {
            return;
        }
        self.transform.set_viewport(width, height);
        self.redraw();
    }

    pub fn zoom_at(&mut self, anchor: Pos2, factor: f32) {
        self.transform.zoom_at(factor, anchor);
        self.redraw();
    }

    /// Zoom by `notches` scroll steps (positive zooms in) toward `anchor`.
    pub fn scroll_zoom(&mut self, anchor: Pos2, notches: f32) {
        if notches == 0.0 || !notches.is_finite() {
            return;
        }
        self.zoom_at(anchor, self.settings.zoom_step.powf(notches));
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.transform.pan_by(delta);
        self.redraw();
    }

    pub fn reset_zoom(&mut self) {
        self.transform.reset_zoom();
        self.redraw();
    }

    // ========================================================================
    // POINTER INPUT (screen coordinates, time in seconds)
    // ========================================================================

    pub fn pointer_down(&mut self, pos: Pos2, time: f64) {
        self.dispatch(pos, time, tools::pointer_down);
    }

    pub fn pointer_move(&mut self, pos: Pos2, time: f64) {
        self.dispatch(pos, time, tools::pointer_move);
    }

    pub fn pointer_up(&mut self, pos: Pos2, time: f64) {
        self.dispatch(pos, time, tools::pointer_up);
    }

    /// The pointer left the viewport; ends any press like a release.
    pub fn pointer_leave(&mut self, pos: Pos2, time: f64) {
        self.pointer_up(pos, time);
    }

    pub fn is_dragging(&self) -> bool {
        self.drag != DragState::Idle
    }

    fn dispatch(&mut self, pos: Pos2, time: f64, handler: PointerHandler) {
        if self.image.is_none() {
            return;
        }
        // Mapped with this frame's metrics, never a cached transform.
        let pointer = Pointer { screen: pos, image: self.transform.to_image_space(pos), time };
        let was_active = self.drag != DragState::Idle;
        let events_before = self.events.len();
        {
            let mut ctx = ToolContext {
                mode: self.mode,
                transform: &mut self.transform,
                mask: self.mask.as_mut(),
                selection: &mut self.selection,
                text: &mut self.text,
                overlays: &mut self.overlays,
                slider: self.compare.as_mut().map(|c| &mut c.slider_position),
                drag: &mut self.drag,
                events: &mut self.events,
                settings: &self.settings,
                brush_mode: self.brush_mode,
                brush_size_px: self.brush_size_px,
            };
            handler(&mut ctx, &pointer);
        }
        if was_active || self.drag != DragState::Idle || self.events.len() != events_before {
            self.redraw();
        }
    }

    // ========================================================================
    // MODES & TOGGLES
    // ========================================================================

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Switch tools. An in-progress drag is cancelled; the mask is kept.
    /// Leaving text mode discards an uncommitted text overlay.
    pub fn set_mode(&mut self, mode: EditMode) {
        if mode == self.mode {
            return;
        }
        if self.drag != DragState::Idle {
            crate::log_info!("mode change {:?} -> {:?} cancelled a drag", self.mode, mode);
            self.drag = DragState::Idle;
        }
        if self.mode == EditMode::Text && self.text.take().is_some() {
            crate::log_info!("uncommitted text overlay discarded");
        }
        self.mode = mode;
        self.redraw();
    }

    pub fn brush_mode(&self) -> BrushMode {
        self.brush_mode
    }

    pub fn set_brush_mode(&mut self, mode: BrushMode) {
        self.brush_mode = mode;
    }

    /// Screen-space brush diameter.
    pub fn brush_size(&self) -> f32 {
        self.brush_size_px
    }

    pub fn set_brush_size(&mut self, px: f32) {
        if px.is_finite() {
            self.brush_size_px = px.max(1.0);
        }
    }

    pub fn inspector(&self) -> InspectorOverlay {
        self.inspector
    }

    pub fn set_inspector(&mut self, inspector: InspectorOverlay) {
        if inspector == self.inspector {
            return;
        }
        if self.inspector == InspectorOverlay::Exposure {
            self.exposure.invalidate();
        }
        self.inspector = inspector;
        self.redraw();
    }

    pub fn show_mask(&self) -> bool {
        self.show_mask
    }

    pub fn set_show_mask(&mut self, show: bool) {
        if show != self.show_mask {
            self.show_mask = show;
            self.redraw();
        }
    }

    // ========================================================================
    // COMPARE
    // ========================================================================

    /// Show `image` as the "before" side of a split view, or hide it.
    pub fn set_compare_image(&mut self, image: Option<Arc<RgbaImage>>) {
        self.compare = match (image, self.compare.take()) {
            (Some(image), Some(prev)) => Some(CompareState { image, slider_position: prev.slider_position }),
            (Some(image), None) => Some(CompareState { image, slider_position: 0.5 }),
            (None, _) => None,
        };
        if self.drag == DragState::Slider {
            self.drag = DragState::Idle;
        }
        self.redraw();
    }

    pub fn has_compare(&self) -> bool {
        self.compare.is_some()
    }

    pub fn slider_position(&self) -> Option<f32> {
        self.compare.as_ref().map(|c| c.slider_position)
    }

    pub fn set_slider_position(&mut self, pos: f32) {
        if let Some(c) = self.compare.as_mut() {
            if pos.is_finite() {
                c.slider_position = pos.clamp(0.0, 1.0);
                self.redraw();
            }
        }
    }

    // ========================================================================
    // MASK
    // ========================================================================

    pub fn selection(&self) -> Option<SelectionBox> {
        self.selection
    }

    /// Programmatic box-select. Returns the clamped box, or `None` with no image.
    pub fn select_region(&mut self, region: SelectionBox) -> Option<SelectionBox> {
        let img = self.image.as_ref()?;
        let sel = region.clamped(img.width() as f32, img.height() as f32);
        if let Some(mask) = self.mask.as_mut() {
            mask.fill_box(&sel);
        }
        self.selection = Some(sel);
        self.events.push(CanvasEvent::SelectionFinalized(sel));
        self.events.push(CanvasEvent::SelectionChanged(Some(sel)));
        self.redraw();
        Some(sel)
    }

    /// Programmatic brush stroke through `points` (image space), radius in
    /// image pixels. A single point stamps a dot.
    pub fn paint_stroke(&mut self, points: &[Pos2], radius: f32, mode: BrushMode) {
        let Some(mask) = self.mask.as_mut() else { return };
        if points.is_empty() {
            return;
        }
        let kernel = BrushKernel::new(radius, self.settings.brush_hardness);
        if points.len() == 1 {
            mask.stroke_brush(points[0], points[0], &kernel, mode);
        }
        for seg in points.windows(2) {
            mask.stroke_brush(seg[0], seg[1], &kernel, mode);
        }
        self.events.push(CanvasEvent::StrokeEnded);
        self.redraw();
    }

    pub fn clear_mask(&mut self) {
        let Some(mask) = self.mask.as_mut() else { return };
        mask.clear();
        if self.selection.take().is_some() {
            self.events.push(CanvasEvent::SelectionChanged(None));
        }
        self.redraw();
    }

    pub fn mask(&self) -> Option<&MaskRaster> {
        self.mask.as_ref()
    }

    /// Binary white-on-black export, or `None` when no box or stroke has
    /// been applied (meaning "apply globally"). A selection that covers no
    /// pixels exports all black (meaning "apply nowhere").
    pub fn canonical_mask(&self) -> Option<RgbaImage> {
        let mask = self.mask.as_ref()?;
        if !mask.is_edited() {
            return None;
        }
        let out = mask.export_canonical();
        crate::log_info!(
            "mask exported: {}x{}, {} px selected",
            out.width(),
            out.height(),
            mask.selected_count()
        );
        Some(out)
    }

    // ========================================================================
    // TEXT
    // ========================================================================

    pub fn text_overlay(&self) -> Option<&TextOverlay> {
        self.text.as_ref()
    }

    pub fn set_text_overlay(&mut self, text: Option<TextOverlay>) {
        self.text = text;
        if matches!(self.drag, DragState::Text { .. }) {
            self.drag = DragState::Idle;
        }
        self.redraw();
    }

    /// Full-resolution image with the text overlay baked in.
    pub fn flattened_frame(&mut self) -> Option<RgbaImage> {
        let img = self.image.as_deref()?;
        Some(self.compositor.flatten(img, self.text.as_ref()))
    }

    /// Bake the text overlay and drop it. The caller decides whether the
    /// result becomes the next image.
    pub fn commit_text(&mut self) -> Option<RgbaImage> {
        let flat = self.flattened_frame()?;
        self.text = None;
        self.redraw();
        Some(flat)
    }

    // ========================================================================
    // REFERENCE SUBJECTS
    // ========================================================================

    pub fn overlays(&self) -> &OverlayRegistry {
        &self.overlays
    }

    pub fn add_reference_subject(&mut self, pixels: RgbaImage, label: &str, x: f32, y: f32) -> SubjectId {
        let (w, h) = pixels.dimensions();
        let id = self.overlays.add_subject(Arc::new(pixels), label, x, y);
        crate::log_info!("reference subject '{}' added ({}x{}) as {}", label, w, h, id);
        self.redraw();
        id
    }

    pub fn remove_reference_subject(&mut self, id: SubjectId) -> bool {
        let was_active = self.overlays.active() == Some(id);
        let Some(removed) = self.overlays.remove(id) else { return false };
        crate::log_info!("reference subject '{}' removed", removed.label);
        if matches!(self.drag, DragState::Subject { id: dragged, .. } if dragged == id) {
            self.drag = DragState::Idle;
        }
        if was_active {
            self.events.push(CanvasEvent::SubjectSelected(None));
        }
        self.redraw();
        true
    }

    pub fn update_reference_subject(&mut self, id: SubjectId, update: SubjectUpdate) -> bool {
        let changed = self.overlays.update(id, update);
        if changed {
            self.redraw();
        }
        changed
    }

    pub fn set_active_subject(&mut self, id: Option<SubjectId>) {
        let before = self.overlays.active();
        self.overlays.set_active(id);
        let after = self.overlays.active();
        if before != after {
            self.events.push(CanvasEvent::SubjectSelected(after));
            self.redraw();
        }
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    /// Drain pending host notifications, oldest first.
    pub fn take_events(&mut self) -> Vec<CanvasEvent> {
        std::mem::take(&mut self.events)
    }

    /// The current viewport-sized frame.
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    /// Bumped whenever [`frame`](Self::frame) is regenerated.
    pub fn frame_revision(&self) -> u64 {
        self.frame_revision
    }

    pub fn force_redraw(&mut self) {
        self.redraw();
    }

    fn redraw(&mut self) {
        self.frame_revision += 1;
        let Some(image) = self.image.as_deref() else {
            let vp = self.transform.viewport_size();
            self.frame = RgbaImage::new(vp.x.max(0.0) as u32, vp.y.max(0.0) as u32);
            return;
        };
        let exposure = (self.inspector == InspectorOverlay::Exposure).then(|| {
            self.exposure.get_or_compute(
                self.image_revision,
                image,
                self.settings.highlight_clip,
                self.settings.shadow_crush,
            )
        });
        let scene = Scene {
            image,
            transform: &self.transform,
            mode: self.mode,
            compare: self.compare.as_ref(),
            mask: self.mask.as_ref(),
            show_mask: self.show_mask,
            overlays: &self.overlays,
            inspector: self.inspector,
            exposure: exposure.as_deref(),
            selection: self.selection,
            text: self.text.as_ref(),
            settings: &self.settings,
        };
        self.frame = self.compositor.render(&scene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn engine() -> CanvasEngine {
        let mut r = TextRenderer::new("none");
        r.disable_system_fonts();
        let mut e = CanvasEngine::with_text_renderer(CanvasSettings::default(), r);
        e.resize(400.0, 300.0);
        e
    }

    fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn input_without_an_image_is_ignored() {
        let mut e = engine();
        e.set_mode(EditMode::Select);
        e.pointer_down(Pos2::new(10.0, 10.0), 0.0);
        e.pointer_up(Pos2::new(50.0, 50.0), 0.1);
        assert!(e.take_events().is_empty());
        assert!(e.canonical_mask().is_none());
        assert!(e.flattened_frame().is_none());
        assert_eq!(e.frame().dimensions(), (400, 300));
    }

    #[test]
    fn stale_loads_are_discarded() {
        let mut e = engine();
        let first = e.begin_load();
        let second = e.begin_load();
        assert!(matches!(e.finish_load(second, Ok(solid(20, 10, 50))), LoadOutcome::Applied { width: 20, height: 10 }));
        assert!(matches!(e.finish_load(first, Ok(solid(99, 99, 0))), LoadOutcome::Stale));
        assert_eq!(e.image().map(|i| i.dimensions()), Some((20, 10)));
    }

    #[test]
    fn failed_load_keeps_the_previous_image() {
        let mut e = engine();
        e.set_image(solid(30, 30, 200));
        e.take_events();
        let outcome = e.load_image_bytes(b"not an image");
        assert!(matches!(outcome, LoadOutcome::Failed(ImageIoError::Decode(_))));
        assert_eq!(e.image().map(|i| i.dimensions()), Some((30, 30)));
        assert!(matches!(e.take_events()[..], [CanvasEvent::ImageLoadFailed(_)]));
    }

    #[test]
    fn new_image_resets_mask_and_keeps_zoom_only_for_same_size() {
        let mut e = engine();
        e.set_image(solid(100, 100, 128));
        e.select_region(SelectionBox { x: 10.0, y: 10.0, width: 20.0, height: 20.0 });
        e.zoom_at(Pos2::new(200.0, 150.0), 2.0);
        e.take_events();

        e.set_image(solid(100, 100, 20));
        assert!(e.canonical_mask().is_none());
        assert_eq!(e.selection(), None);
        assert_eq!(e.transform().zoom_scale, 2.0);
        assert_eq!(
            e.take_events(),
            vec![CanvasEvent::SelectionChanged(None), CanvasEvent::ImageLoaded { width: 100, height: 100 }]
        );

        e.set_image(solid(50, 80, 20));
        assert_eq!(e.transform().zoom_scale, 1.0);
        assert_eq!(e.mask().map(|m| (m.width(), m.height())), Some((50, 80)));
    }

    #[test]
    fn resize_keeps_mask_and_overlays() {
        let mut e = engine();
        e.set_image(solid(100, 100, 128));
        e.select_region(SelectionBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 });
        e.add_reference_subject(solid(5, 5, 0), "ref", 50.0, 50.0);
        e.resize(800.0, 200.0);
        assert_eq!(e.frame().dimensions(), (800, 200));
        assert!(e.canonical_mask().is_some());
        assert_eq!(e.overlays().len(), 1);
    }

    #[test]
    fn brush_size_is_constant_on_screen() {
        let mut e = engine();
        e.set_image(solid(400, 300, 128));
        e.set_mode(EditMode::Erase);
        e.set_brush_size(20.0);
        e.zoom_at(Pos2::new(200.0, 150.0), 4.0);
        let s = e.transform().composed_scale();
        let at = e.transform().to_screen_space(Pos2::new(200.0, 150.0));
        e.pointer_down(at, 0.0);
        e.pointer_up(at, 0.1);
        let mask = e.mask().unwrap();
        // 10 screen px radius => 10 / s image px.
        let r = 10.0 / s;
        assert!(mask.is_selected(200, 150));
        assert!(!mask.is_selected((200.0 + r + 2.0) as u32, 150));
    }

    #[test]
    fn mode_change_cancels_drag_but_keeps_mask() {
        let mut e = engine();
        e.set_image(solid(400, 300, 128));
        e.set_mode(EditMode::Select);
        let a = e.transform().to_screen_space(Pos2::new(10.0, 10.0));
        let b = e.transform().to_screen_space(Pos2::new(60.0, 60.0));
        e.pointer_down(a, 0.0);
        e.pointer_move(b, 0.1);
        assert!(e.is_dragging());
        e.set_mode(EditMode::View);
        assert!(!e.is_dragging());
        assert!(e.canonical_mask().is_some());
        e.pointer_up(b, 0.2);
        assert!(!e.take_events().iter().any(|ev| matches!(ev, CanvasEvent::SelectionFinalized(_))));
    }

    #[test]
    fn leaving_text_mode_discards_the_overlay_and_commit_bakes_it() {
        let mut e = engine();
        e.set_image(solid(64, 64, 128));
        e.set_mode(EditMode::Text);
        e.set_text_overlay(Some(TextOverlay::new("hello", 4.0, 40.0)));
        let flat = e.commit_text().unwrap();
        assert_eq!(flat.dimensions(), (64, 64));
        assert!(e.text_overlay().is_none());

        e.set_text_overlay(Some(TextOverlay::new("again", 4.0, 40.0)));
        e.set_mode(EditMode::Select);
        assert!(e.text_overlay().is_none());
    }

    #[test]
    fn exposure_cache_follows_the_inspector() {
        let mut e = engine();
        e.set_image(solid(10, 10, 250));
        e.set_inspector(InspectorOverlay::Exposure);
        assert!(e.exposure.is_cached(e.image_revision));
        e.set_inspector(InspectorOverlay::Grid);
        assert!(!e.exposure.is_cached(e.image_revision));
    }

    #[test]
    fn removing_the_active_subject_reports_deselection() {
        let mut e = engine();
        e.set_image(solid(100, 100, 128));
        let id = e.add_reference_subject(solid(10, 10, 0), "a", 0.0, 0.0);
        e.set_active_subject(Some(id));
        assert!(e.remove_reference_subject(id));
        assert!(!e.remove_reference_subject(id));
        assert_eq!(
            e.take_events()[2..],
            [CanvasEvent::SubjectSelected(Some(id)), CanvasEvent::SubjectSelected(None)]
        );
    }
}
