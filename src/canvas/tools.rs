// ============================================================================
// TOOL STATE MACHINE — pointer down/drag/up per edit mode
// ============================================================================
//
// Each mode owns a handler triple; the engine picks the triple once per
// event from the active mode. Subject dragging and the compare slider are
// resolved before the mode's own handler runs.

use egui::{Pos2, Vec2};
use serde::{Deserialize, Serialize};

use super::mask::{BrushKernel, BrushMode, MaskRaster, SelectionBox};
use super::overlay::{OverlayRegistry, SubjectId, TextOverlay};
use super::transform::ViewTransform;
use crate::settings::CanvasSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EditMode {
    #[default]
    View,
    Select,
    /// Brush; paint or erase per [`BrushMode`].
    Erase,
    Text,
    /// Pan by dragging.
    Inspect,
    MagicWand,
    Caption,
    ReferenceEdit,
}

impl EditMode {
    pub const ALL: [EditMode; 8] = [
        EditMode::View,
        EditMode::Select,
        EditMode::Erase,
        EditMode::Text,
        EditMode::Inspect,
        EditMode::MagicWand,
        EditMode::Caption,
        EditMode::ReferenceEdit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EditMode::View => "View",
            EditMode::Select => "Select",
            EditMode::Erase => "Brush",
            EditMode::Text => "Text",
            EditMode::Inspect => "Pan",
            EditMode::MagicWand => "Magic Wand",
            EditMode::Caption => "Caption",
            EditMode::ReferenceEdit => "Reference Source",
        }
    }

    /// Modes where grabbing a reference subject overrides the mode itself.
    fn yields_to_subjects(self) -> bool {
        !matches!(self, EditMode::MagicWand | EditMode::Caption | EditMode::Erase)
    }

    fn handlers(self) -> ToolHandlers {
        match self {
            EditMode::View => VIEW,
            EditMode::Select => SELECT,
            EditMode::Erase => BRUSH,
            EditMode::Text => TEXT,
            EditMode::Inspect => PAN,
            EditMode::MagicWand | EditMode::Caption | EditMode::ReferenceEdit => POINT_CLICK,
        }
    }
}

/// Notifications for the host. Every coordinate is image space.
#[derive(Clone, Debug, PartialEq)]
pub enum CanvasEvent {
    SelectionChanged(Option<SelectionBox>),
    SelectionFinalized(SelectionBox),
    StrokeEnded,
    PointClicked { mode: EditMode, point: Pos2 },
    TextMoved { x: f32, y: f32 },
    SubjectSelected(Option<SubjectId>),
    SubjectMoved { id: SubjectId, x: f32, y: f32 },
    SliderMoved(f32),
    ImageLoaded { width: u32, height: u32 },
    ImageLoadFailed(String),
}

/// What the current press is doing.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Box { anchor: Pos2 },
    Brush { last: Pos2 },
    Text { last: Pos2 },
    /// Screen space.
    Pan { last: Pos2 },
    Click { started_at: f64, origin: Pos2 },
    Subject { id: SubjectId, last: Pos2 },
    Slider,
}

/// One pointer sample, already mapped through the current transform.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Pointer {
    pub screen: Pos2,
    pub image: Pos2,
    /// Seconds, any monotonic origin.
    pub time: f64,
}

/// Mutable view of engine state the handlers work on.
pub(crate) struct ToolContext<'a> {
    pub mode: EditMode,
    pub transform: &'a mut ViewTransform,
    pub mask: Option<&'a mut MaskRaster>,
    pub selection: &'a mut Option<SelectionBox>,
    pub text: &'a mut Option<TextOverlay>,
    pub overlays: &'a mut OverlayRegistry,
    /// Compare slider position, present only while the split view is shown.
    pub slider: Option<&'a mut f32>,
    pub drag: &'a mut DragState,
    pub events: &'a mut Vec<CanvasEvent>,
    pub settings: &'a CanvasSettings,
    pub brush_mode: BrushMode,
    pub brush_size_px: f32,
}

impl ToolContext<'_> {
    fn emit(&mut self, event: CanvasEvent) {
        self.events.push(event);
    }

    fn image_size(&self) -> Vec2 {
        self.transform.image_size()
    }

    fn slider_x(&self) -> Option<f32> {
        let pos = **self.slider.as_ref()?;
        let r = self.transform.image_rect();
        Some(r.min.x + r.width() * pos)
    }
}

type Handler = fn(&mut ToolContext<'_>, &Pointer);

#[derive(Clone, Copy)]
struct ToolHandlers {
    down: Handler,
    drag: Handler,
    up: Handler,
}

fn noop(_: &mut ToolContext<'_>, _: &Pointer) {}

const VIEW: ToolHandlers = ToolHandlers { down: noop, drag: noop, up: noop };
const SELECT: ToolHandlers = ToolHandlers { down: select_down, drag: select_drag, up: select_up };
const BRUSH: ToolHandlers = ToolHandlers { down: brush_down, drag: brush_drag, up: brush_up };
const TEXT: ToolHandlers = ToolHandlers { down: text_down, drag: text_drag, up: noop };
const PAN: ToolHandlers = ToolHandlers { down: pan_down, drag: pan_drag, up: noop };
const POINT_CLICK: ToolHandlers = ToolHandlers { down: click_down, drag: noop, up: click_up };

// ============================================================================
// DISPATCH
// ============================================================================

pub(crate) fn pointer_down(ctx: &mut ToolContext<'_>, p: &Pointer) {
    if ctx.mode != EditMode::ReferenceEdit {
        if let Some(split) = ctx.slider_x() {
            if (p.screen.x - split).abs() < ctx.settings.slider_grab_px {
                *ctx.drag = DragState::Slider;
                return;
            }
        }
    }

    if ctx.mode.yields_to_subjects() {
        match ctx.overlays.hit_test(p.image) {
            Some(id) => {
                if ctx.overlays.active() != Some(id) {
                    ctx.overlays.set_active(Some(id));
                    ctx.emit(CanvasEvent::SubjectSelected(Some(id)));
                }
                *ctx.drag = DragState::Subject { id, last: p.image };
                return;
            }
            None => {
                if ctx.overlays.active().is_some() {
                    ctx.overlays.set_active(None);
                    ctx.emit(CanvasEvent::SubjectSelected(None));
                }
            }
        }
    }

    (ctx.mode.handlers().down)(ctx, p);
}

pub(crate) fn pointer_move(ctx: &mut ToolContext<'_>, p: &Pointer) {
    match *ctx.drag {
        DragState::Idle => {}
        DragState::Slider => slider_drag(ctx, p),
        DragState::Subject { id, last } => {
            if let Some(pos) = ctx.overlays.translate(id, p.image - last) {
                ctx.emit(CanvasEvent::SubjectMoved { id, x: pos.x, y: pos.y });
            }
            *ctx.drag = DragState::Subject { id, last: p.image };
        }
        _ => (ctx.mode.handlers().drag)(ctx, p),
    }
}

pub(crate) fn pointer_up(ctx: &mut ToolContext<'_>, p: &Pointer) {
    match *ctx.drag {
        DragState::Idle => return,
        DragState::Slider | DragState::Subject { .. } => {}
        _ => (ctx.mode.handlers().up)(ctx, p),
    }
    *ctx.drag = DragState::Idle;
}

fn slider_drag(ctx: &mut ToolContext<'_>, p: &Pointer) {
    let r = ctx.transform.image_rect();
    if r.width() <= 0.0 {
        return;
    }
    let pos = ((p.screen.x - r.min.x) / r.width()).clamp(0.0, 1.0);
    if let Some(slider) = ctx.slider.as_deref_mut() {
        *slider = pos;
        ctx.emit(CanvasEvent::SliderMoved(pos));
    }
}

// ============================================================================
// BOX SELECT
// ============================================================================

fn select_down(ctx: &mut ToolContext<'_>, p: &Pointer) {
    let size = ctx.image_size();
    let sel = SelectionBox::from_corners(p.image, p.image, size.x, size.y);
    if let Some(mask) = ctx.mask.as_deref_mut() {
        mask.fill_box(&sel);
    }
    *ctx.selection = Some(sel);
    *ctx.drag = DragState::Box { anchor: p.image };
}

fn select_drag(ctx: &mut ToolContext<'_>, p: &Pointer) {
    let DragState::Box { anchor } = *ctx.drag else { return };
    let size = ctx.image_size();
    let sel = SelectionBox::from_corners(anchor, p.image, size.x, size.y);
    if let Some(mask) = ctx.mask.as_deref_mut() {
        mask.fill_box(&sel);
    }
    *ctx.selection = Some(sel);
}

fn select_up(ctx: &mut ToolContext<'_>, _: &Pointer) {
    if let Some(sel) = *ctx.selection {
        ctx.emit(CanvasEvent::SelectionFinalized(sel));
        ctx.emit(CanvasEvent::SelectionChanged(Some(sel)));
    }
}

// ============================================================================
// BRUSH
// ============================================================================

/// Brush radius in image pixels for the current zoom.
pub(crate) fn image_space_radius(brush_size_px: f32, transform: &ViewTransform) -> f32 {
    let s = transform.composed_scale();
    if s > 0.0 { brush_size_px / 2.0 / s } else { brush_size_px / 2.0 }
}

fn stamp(ctx: &mut ToolContext<'_>, from: Pos2, to: Pos2) {
    let radius = image_space_radius(ctx.brush_size_px, ctx.transform);
    let kernel = BrushKernel::new(radius, ctx.settings.brush_hardness);
    let mode = ctx.brush_mode;
    if let Some(mask) = ctx.mask.as_deref_mut() {
        mask.stroke_brush(from, to, &kernel, mode);
    }
}

fn brush_down(ctx: &mut ToolContext<'_>, p: &Pointer) {
    stamp(ctx, p.image, p.image);
    *ctx.drag = DragState::Brush { last: p.image };
}

fn brush_drag(ctx: &mut ToolContext<'_>, p: &Pointer) {
    let DragState::Brush { last } = *ctx.drag else { return };
    stamp(ctx, last, p.image);
    *ctx.drag = DragState::Brush { last: p.image };
}

fn brush_up(ctx: &mut ToolContext<'_>, _: &Pointer) {
    ctx.emit(CanvasEvent::StrokeEnded);
}

// ============================================================================
// TEXT / PAN
// ============================================================================

fn text_down(ctx: &mut ToolContext<'_>, p: &Pointer) {
    if ctx.text.is_some() {
        *ctx.drag = DragState::Text { last: p.image };
    }
}

fn text_drag(ctx: &mut ToolContext<'_>, p: &Pointer) {
    let DragState::Text { last } = *ctx.drag else { return };
    let Some(text) = ctx.text.as_mut() else { return };
    let d = p.image - last;
    text.x += d.x;
    text.y += d.y;
    let (x, y) = (text.x, text.y);
    *ctx.drag = DragState::Text { last: p.image };
    ctx.emit(CanvasEvent::TextMoved { x, y });
}

fn pan_down(ctx: &mut ToolContext<'_>, p: &Pointer) {
    *ctx.drag = DragState::Pan { last: p.screen };
}

fn pan_drag(ctx: &mut ToolContext<'_>, p: &Pointer) {
    let DragState::Pan { last } = *ctx.drag else { return };
    ctx.transform.pan_by(p.screen - last);
    *ctx.drag = DragState::Pan { last: p.screen };
}

// ============================================================================
// POINT CLICK (magic wand, caption, reference source)
// ============================================================================

fn click_down(ctx: &mut ToolContext<'_>, p: &Pointer) {
    *ctx.drag = DragState::Click { started_at: p.time, origin: p.screen };
}

fn click_up(ctx: &mut ToolContext<'_>, p: &Pointer) {
    let DragState::Click { started_at, origin } = *ctx.drag else { return };
    let elapsed_ms = (p.time - started_at) * 1000.0;
    let travel = (p.screen - origin).length();
    let is_tap = elapsed_ms >= 0.0
        && elapsed_ms < ctx.settings.click_threshold_ms as f64
        && travel <= ctx.settings.click_tolerance_px;
    if is_tap && ctx.transform.contains_image_point(p.image) {
        let mode = ctx.mode;
        ctx.emit(CanvasEvent::PointClicked { mode, point: p.image });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Rig {
        transform: ViewTransform,
        mask: MaskRaster,
        selection: Option<SelectionBox>,
        text: Option<TextOverlay>,
        overlays: OverlayRegistry,
        slider: Option<f32>,
        drag: DragState,
        events: Vec<CanvasEvent>,
        settings: CanvasSettings,
    }

    impl Rig {
        /// 200×100 image in a 200×100 viewport at fit cap 1, so screen == image.
        fn new() -> Self {
            let mut transform = ViewTransform::new(1.0, 0.1, 10.0);
            transform.set_image_size(200.0, 100.0);
            transform.set_viewport(200.0, 100.0);
            Self {
                transform,
                mask: MaskRaster::new(200, 100, [250, 204, 21, 255]),
                selection: None,
                text: None,
                overlays: OverlayRegistry::new(),
                slider: None,
                drag: DragState::Idle,
                events: Vec::new(),
                settings: CanvasSettings::default(),
            }
        }

        fn run(&mut self, mode: EditMode, f: fn(&mut ToolContext<'_>, &Pointer), x: f32, y: f32, t: f64) {
            let screen = Pos2::new(x, y);
            let p = Pointer { screen, image: self.transform.to_image_space(screen), time: t };
            let mut ctx = ToolContext {
                mode,
                transform: &mut self.transform,
                mask: Some(&mut self.mask),
                selection: &mut self.selection,
                text: &mut self.text,
                overlays: &mut self.overlays,
                slider: self.slider.as_mut(),
                drag: &mut self.drag,
                events: &mut self.events,
                settings: &self.settings,
                brush_mode: BrushMode::Paint,
                brush_size_px: 10.0,
            };
            f(&mut ctx, &p);
        }
    }

    #[test]
    fn box_select_reports_a_clamped_box_on_release() {
        let mut r = Rig::new();
        r.run(EditMode::Select, pointer_down, 150.0, 20.0, 0.0);
        r.run(EditMode::Select, pointer_move, 260.0, 60.0, 0.1);
        r.run(EditMode::Select, pointer_up, 260.0, 60.0, 0.2);
        let expected = SelectionBox { x: 150.0, y: 20.0, width: 50.0, height: 40.0 };
        assert_eq!(
            r.events,
            vec![CanvasEvent::SelectionFinalized(expected), CanvasEvent::SelectionChanged(Some(expected))]
        );
        assert!(r.mask.is_selected(199, 59));
        assert!(!r.mask.is_selected(149, 20));
        assert_eq!(r.drag, DragState::Idle);
    }

    #[test]
    fn brush_without_movement_leaves_a_dot_and_ends_the_stroke() {
        let mut r = Rig::new();
        r.run(EditMode::Erase, pointer_down, 50.0, 50.0, 0.0);
        r.run(EditMode::Erase, pointer_up, 50.0, 50.0, 0.5);
        assert!(r.mask.is_selected(50, 50));
        assert_eq!(r.events, vec![CanvasEvent::StrokeEnded]);
    }

    #[test]
    fn quick_tap_emits_one_point_and_slow_press_emits_none() {
        let mut r = Rig::new();
        r.run(EditMode::MagicWand, pointer_down, 40.0, 30.0, 1.0);
        r.run(EditMode::MagicWand, pointer_up, 40.0, 30.0, 1.1);
        assert_eq!(
            r.events,
            vec![CanvasEvent::PointClicked { mode: EditMode::MagicWand, point: Pos2::new(40.0, 30.0) }]
        );

        r.events.clear();
        r.run(EditMode::Caption, pointer_down, 40.0, 30.0, 2.0);
        r.run(EditMode::Caption, pointer_up, 40.0, 30.0, 2.4);
        assert!(r.events.is_empty());

        r.run(EditMode::Caption, pointer_down, 40.0, 30.0, 3.0);
        r.run(EditMode::Caption, pointer_move, 70.0, 30.0, 3.05);
        r.run(EditMode::Caption, pointer_up, 70.0, 30.0, 3.1);
        assert!(r.events.is_empty());
    }

    #[test]
    fn subject_drag_takes_priority_except_in_click_modes() {
        let mut r = Rig::new();
        let pixels = Arc::new(image::RgbaImage::new(20, 20));
        let id = r.overlays.add_subject(pixels, "s", 10.0, 10.0);

        r.run(EditMode::Select, pointer_down, 15.0, 15.0, 0.0);
        r.run(EditMode::Select, pointer_move, 25.0, 18.0, 0.1);
        r.run(EditMode::Select, pointer_up, 25.0, 18.0, 0.2);
        assert_eq!(r.overlays.get(id).map(|s| (s.x, s.y)), Some((20.0, 13.0)));
        assert_eq!(r.selection, None);
        assert_eq!(r.events[0], CanvasEvent::SubjectSelected(Some(id)));

        r.events.clear();
        r.run(EditMode::MagicWand, pointer_down, 25.0, 18.0, 1.0);
        r.run(EditMode::MagicWand, pointer_up, 25.0, 18.0, 1.05);
        assert!(matches!(r.events[..], [CanvasEvent::PointClicked { .. }]));
    }

    #[test]
    fn slider_grab_moves_the_split() {
        let mut r = Rig::new();
        r.slider = Some(0.5);
        r.run(EditMode::Select, pointer_down, 110.0, 50.0, 0.0);
        assert_eq!(r.drag, DragState::Slider);
        r.run(EditMode::Select, pointer_move, 50.0, 50.0, 0.1);
        r.run(EditMode::Select, pointer_move, -30.0, 50.0, 0.2);
        r.run(EditMode::Select, pointer_up, -30.0, 50.0, 0.3);
        assert_eq!(r.slider, Some(0.0));
        assert_eq!(r.events, vec![CanvasEvent::SliderMoved(0.25), CanvasEvent::SliderMoved(0.0)]);
        assert!(!r.mask.has_coverage());
    }

    #[test]
    fn text_moves_one_to_one_and_pan_shifts_the_view() {
        let mut r = Rig::new();
        r.text = Some(TextOverlay::new("hi", 10.0, 40.0));
        r.run(EditMode::Text, pointer_down, 10.0, 40.0, 0.0);
        r.run(EditMode::Text, pointer_move, 30.0, 35.0, 0.1);
        assert_eq!(r.events, vec![CanvasEvent::TextMoved { x: 30.0, y: 35.0 }]);

        r.run(EditMode::Inspect, pointer_down, 100.0, 50.0, 1.0);
        r.run(EditMode::Inspect, pointer_move, 120.0, 45.0, 1.1);
        assert_eq!((r.transform.pan_x, r.transform.pan_y), (20.0, -5.0));
    }
}
