use crate::canvas::{
    BrushMode, CanvasEngine, CanvasEvent, EditMode, InspectorOverlay, LoadOutcome, LoadTicket, TextOverlay,
};
use crate::io::{ImageIoError, encode_and_write, load_image_sync, pick_image_file, pick_png_save_path};
use crate::settings::CanvasSettings;
use eframe::egui;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};

/// Lines kept in the status bar history.
const STATUS_HISTORY: usize = 4;
/// Scroll points per zoom notch.
const SCROLL_NOTCH: f32 = 50.0;
const BRUSH_SIZE_PRESETS: [f32; 8] = [4.0, 8.0, 12.0, 20.0, 32.0, 48.0, 64.0, 96.0];

// ============================================================================
// ASYNC IO PIPELINE — background image loading / saving
// ============================================================================

/// Result delivered from a background IO thread.
enum IoResult {
    /// Main image decoded (or failed); applied only if `ticket` is still current.
    ImageLoaded {
        ticket: LoadTicket,
        path: PathBuf,
        result: Result<RgbaImage, ImageIoError>,
    },
    SubjectLoaded {
        path: PathBuf,
        result: Result<RgbaImage, ImageIoError>,
    },
    SaveComplete {
        path: PathBuf,
    },
    SaveFailed {
        error: String,
    },
}

/// Viewer state persisted through eframe storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct ViewerPrefs {
    mode: EditMode,
    brush_mode: BrushMode,
    brush_size: f32,
    show_mask: bool,
    inspector: InspectorOverlay,
}

impl Default for ViewerPrefs {
    fn default() -> Self {
        Self {
            mode: EditMode::View,
            brush_mode: BrushMode::Paint,
            brush_size: CanvasSettings::default().brush_size_px,
            show_mask: false,
            inspector: InspectorOverlay::None,
        }
    }
}

pub struct MaskCanvasApp {
    engine: CanvasEngine,
    texture: Option<egui::TextureHandle>,
    /// Engine frame revision last uploaded to `texture`.
    uploaded_revision: Option<u64>,
    /// Last pointer position inside the canvas, viewport coordinates.
    last_pointer: Option<egui::Pos2>,
    pointer_held: bool,
    /// The image shown before the current one; source of the "before" view.
    previous_image: Option<Arc<RgbaImage>>,
    compare_enabled: bool,
    current_path: Option<PathBuf>,
    text_draft: String,
    status: VecDeque<String>,
    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,
    pending_io_ops: usize,
}

impl MaskCanvasApp {
    pub fn new(cc: &eframe::CreationContext<'_>, settings: CanvasSettings) -> Self {
        let prefs: ViewerPrefs = cc
            .storage
            .and_then(|s| eframe::get_value(s, eframe::APP_KEY))
            .unwrap_or_default();

        let mut engine = CanvasEngine::new(settings);
        engine.set_mode(prefs.mode);
        engine.set_brush_mode(prefs.brush_mode);
        engine.set_brush_size(prefs.brush_size);
        engine.set_show_mask(prefs.show_mask);
        engine.set_inspector(prefs.inspector);

        let (io_sender, io_receiver) = mpsc::channel();

        Self {
            engine,
            texture: None,
            uploaded_revision: None,
            last_pointer: None,
            pointer_held: false,
            previous_image: None,
            compare_enabled: false,
            current_path: None,
            text_draft: String::from("Text"),
            status: VecDeque::new(),
            io_sender,
            io_receiver,
            pending_io_ops: 0,
        }
    }

    fn prefs(&self) -> ViewerPrefs {
        ViewerPrefs {
            mode: self.engine.mode(),
            brush_mode: self.engine.brush_mode(),
            brush_size: self.engine.brush_size(),
            show_mask: self.engine.show_mask(),
            inspector: self.engine.inspector(),
        }
    }

    fn push_status(&mut self, line: String) {
        if self.status.len() == STATUS_HISTORY {
            self.status.pop_front();
        }
        self.status.push_back(line);
    }

    // ========================================================================
    // FILE ACTIONS
    // ========================================================================

    fn open_image(&mut self) {
        let Some(path) = pick_image_file("Open Image") else { return };
        let ticket = self.engine.begin_load();
        let sender = self.io_sender.clone();
        self.pending_io_ops += 1;
        std::thread::spawn(move || {
            let result = load_image_sync(&path);
            let _ = sender.send(IoResult::ImageLoaded { ticket, path, result });
        });
    }

    fn add_subject(&mut self) {
        if !self.engine.has_image() {
            return;
        }
        let Some(path) = pick_image_file("Add Reference Subject") else { return };
        let sender = self.io_sender.clone();
        self.pending_io_ops += 1;
        std::thread::spawn(move || {
            let result = load_image_sync(&path);
            let _ = sender.send(IoResult::SubjectLoaded { path, result });
        });
    }

    fn export_mask(&mut self) {
        let Some(mask) = self.engine.canonical_mask() else {
            self.push_status("Nothing selected; no mask to export".to_string());
            return;
        };
        let default_name = self
            .current_path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| format!("{}_mask.png", s.to_string_lossy()))
            .unwrap_or_else(|| "mask.png".to_string());
        let Some(path) = pick_png_save_path(&default_name) else { return };
        let sender = self.io_sender.clone();
        self.pending_io_ops += 1;
        rayon::spawn(move || match encode_and_write(&mask, &path) {
            Ok(()) => {
                let _ = sender.send(IoResult::SaveComplete { path });
            }
            Err(e) => {
                let _ = sender.send(IoResult::SaveFailed { error: e.to_string() });
            }
        });
    }

    /// Bake the text overlay; the baked image becomes the current one.
    fn commit_text(&mut self) {
        let before = self.engine.image_arc();
        if let Some(flat) = self.engine.commit_text() {
            self.previous_image = before;
            self.engine.set_image(flat);
            self.sync_compare();
        }
    }

    fn place_text(&mut self) {
        let Some(img) = self.engine.image() else { return };
        let (w, h) = img.dimensions();
        let text = TextOverlay::new(&self.text_draft, w as f32 * 0.1, h as f32 * 0.5);
        self.engine.set_text_overlay(Some(text));
    }

    fn sync_compare(&mut self) {
        let compare = if self.compare_enabled { self.previous_image.clone() } else { None };
        self.engine.set_compare_image(compare);
    }

    // ========================================================================
    // ASYNC RESULTS
    // ========================================================================

    fn poll_io(&mut self, ctx: &egui::Context) {
        while let Ok(result) = self.io_receiver.try_recv() {
            self.pending_io_ops = self.pending_io_ops.saturating_sub(1);
            match result {
                IoResult::ImageLoaded { ticket, path, result } => {
                    let before = self.engine.image_arc();
                    match self.engine.finish_load(ticket, result) {
                        LoadOutcome::Applied { .. } => {
                            self.previous_image = before;
                            self.current_path = Some(path);
                            self.sync_compare();
                        }
                        LoadOutcome::Stale => {}
                        LoadOutcome::Failed(e) => {
                            crate::log_err!("could not open {}: {}", path.display(), e);
                        }
                    }
                }
                IoResult::SubjectLoaded { path, result } => match result {
                    Ok(pixels) => {
                        let label = path
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "subject".to_string());
                        let (x, y) = match self.engine.image() {
                            Some(img) => (
                                (img.width() as f32 - pixels.width() as f32) * 0.5,
                                (img.height() as f32 - pixels.height() as f32) * 0.5,
                            ),
                            None => (0.0, 0.0),
                        };
                        let id = self.engine.add_reference_subject(pixels, &label, x.max(0.0), y.max(0.0));
                        self.engine.set_active_subject(Some(id));
                    }
                    Err(e) => {
                        crate::log_err!("could not open subject {}: {}", path.display(), e);
                        self.push_status(format!("Subject load failed: {}", e));
                    }
                },
                IoResult::SaveComplete { path } => {
                    crate::log_info!("mask written to {}", path.display());
                    self.push_status(format!("Mask saved to {}", path.display()));
                }
                IoResult::SaveFailed { error } => {
                    crate::log_err!("mask export failed: {}", error);
                    self.push_status(format!("Mask export failed: {}", error));
                }
            }
            ctx.request_repaint();
        }

        for event in self.engine.take_events() {
            if let Some(line) = describe_event(&event) {
                self.push_status(line);
            }
        }
    }

    // ========================================================================
    // UI
    // ========================================================================

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            if ui.button("Open…").clicked() {
                self.open_image();
            }
            ui.separator();

            let mut mode = self.engine.mode();
            egui::ComboBox::from_id_source("edit_mode")
                .selected_text(mode.label())
                .width(120.0)
                .show_ui(ui, |ui| {
                    for m in EditMode::ALL {
                        ui.selectable_value(&mut mode, m, m.label());
                    }
                });
            if mode != self.engine.mode() {
                self.engine.set_mode(mode);
            }

            if mode == EditMode::Erase {
                let mut brush = self.engine.brush_mode();
                ui.selectable_value(&mut brush, BrushMode::Paint, "Paint");
                ui.selectable_value(&mut brush, BrushMode::Erase, "Erase");
                self.engine.set_brush_mode(brush);

                let size = self.engine.brush_size();
                egui::ComboBox::from_id_source("brush_size")
                    .selected_text(format!("{:.0}px", size))
                    .width(65.0)
                    .show_ui(ui, |ui| {
                        for &preset in BRUSH_SIZE_PRESETS.iter() {
                            if ui
                                .selectable_label((size - preset).abs() < 0.1, format!("{:.0}px", preset))
                                .clicked()
                            {
                                self.engine.set_brush_size(preset);
                            }
                        }
                    });
            }

            if mode == EditMode::Text {
                ui.add(egui::TextEdit::singleline(&mut self.text_draft).desired_width(140.0));
                if self.engine.text_overlay().is_none() {
                    if ui.button("Place").clicked() {
                        self.place_text();
                    }
                } else {
                    if let Some(current) = self.engine.text_overlay() {
                        if current.text != self.text_draft {
                            let mut updated = current.clone();
                            updated.text = self.text_draft.clone();
                            self.engine.set_text_overlay(Some(updated));
                        }
                    }
                    if ui.button("Commit").clicked() {
                        self.commit_text();
                    }
                }
            }
            ui.separator();

            let mut show_mask = self.engine.show_mask();
            if ui.checkbox(&mut show_mask, "Show mask").changed() {
                self.engine.set_show_mask(show_mask);
            }

            let mut inspector = self.engine.inspector();
            egui::ComboBox::from_id_source("inspector")
                .selected_text(inspector.label())
                .width(90.0)
                .show_ui(ui, |ui| {
                    for i in [InspectorOverlay::None, InspectorOverlay::Grid, InspectorOverlay::Exposure] {
                        ui.selectable_value(&mut inspector, i, i.label());
                    }
                });
            if inspector != self.engine.inspector() {
                self.engine.set_inspector(inspector);
            }

            let can_compare = self.previous_image.is_some();
            if ui
                .add_enabled(can_compare, egui::Checkbox::new(&mut self.compare_enabled, "Compare"))
                .changed()
            {
                self.sync_compare();
            }
            ui.separator();

            if ui.button("Reset zoom").clicked() {
                self.engine.reset_zoom();
            }
            if ui.button("Clear mask").clicked() {
                self.engine.clear_mask();
            }
            if ui.button("Export mask…").clicked() {
                self.export_mask();
            }
            ui.separator();

            if ui.button("Add subject…").clicked() {
                self.add_subject();
            }
            let active = self.engine.overlays().active();
            if ui.add_enabled(active.is_some(), egui::Button::new("Remove subject")).clicked() {
                if let Some(id) = active {
                    self.engine.remove_reference_subject(id);
                }
            }
        });
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let rect = response.rect;
        self.engine.resize(rect.width().floor(), rect.height().floor());

        // --- Pointer forwarding (viewport coordinates, seconds) ---
        let (time, hover, pressed, released, scroll) = ui.input(|i| {
            (
                i.time,
                i.pointer.hover_pos(),
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.scroll_delta.y,
            )
        });
        let local = hover.filter(|p| rect.contains(*p)).map(|p| (p - rect.min).to_pos2());

        if let Some(pos) = local {
            if pressed && !self.pointer_held {
                self.pointer_held = true;
                self.engine.pointer_down(pos, time);
            } else if self.last_pointer != Some(pos) {
                self.engine.pointer_move(pos, time);
            }
            if released && self.pointer_held {
                self.pointer_held = false;
                self.engine.pointer_up(pos, time);
            }
            if scroll != 0.0 {
                self.engine.scroll_zoom(pos, scroll / SCROLL_NOTCH);
            }
            self.last_pointer = Some(pos);
        } else if self.pointer_held {
            // Left the canvas mid-press.
            self.pointer_held = false;
            let pos = self.last_pointer.unwrap_or_default();
            self.engine.pointer_leave(pos, time);
            self.last_pointer = None;
        }

        // --- Frame upload ---
        let revision = self.engine.frame_revision();
        if self.uploaded_revision != Some(revision) {
            let frame = self.engine.frame();
            let size = [frame.width() as usize, frame.height() as usize];
            let image = egui::ColorImage::from_rgba_unmultiplied(size, frame.as_raw());
            match &mut self.texture {
                Some(tex) => tex.set(image, egui::TextureOptions::NEAREST),
                None => {
                    self.texture = Some(ui.ctx().load_texture("canvas_frame", image, egui::TextureOptions::NEAREST));
                }
            }
            self.uploaded_revision = Some(revision);
        }

        if let Some(tex) = &self.texture {
            let size = tex.size_vec2();
            painter.image(
                tex.id(),
                egui::Rect::from_min_size(rect.min, size),
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }
        if !self.engine.has_image() {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Open an image to start",
                egui::FontId::proportional(18.0),
                egui::Color32::GRAY,
            );
        }
    }
}

/// Status-bar text for an engine notification.
fn describe_event(event: &CanvasEvent) -> Option<String> {
    Some(match event {
        CanvasEvent::SelectionFinalized(b) => {
            format!("Selected {:.0}×{:.0} at ({:.0}, {:.0})", b.width, b.height, b.x, b.y)
        }
        CanvasEvent::SelectionChanged(None) => "Selection cleared".to_string(),
        CanvasEvent::SelectionChanged(Some(_)) => return None,
        CanvasEvent::StrokeEnded => "Stroke applied".to_string(),
        CanvasEvent::PointClicked { mode, point } => {
            format!("{} click at ({:.0}, {:.0})", mode.label(), point.x, point.y)
        }
        CanvasEvent::TextMoved { x, y } => format!("Text moved to ({:.0}, {:.0})", x, y),
        CanvasEvent::SubjectSelected(Some(id)) => format!("Subject {} selected", id),
        CanvasEvent::SubjectSelected(None) => "Subject deselected".to_string(),
        CanvasEvent::SubjectMoved { x, y, .. } => format!("Subject moved to ({:.0}, {:.0})", x, y),
        CanvasEvent::SliderMoved(p) => format!("Compare split at {:.0}%", p * 100.0),
        CanvasEvent::ImageLoaded { width, height } => format!("Loaded {}×{}", width, height),
        CanvasEvent::ImageLoadFailed(e) => format!("Load failed: {}", e),
    })
}

impl eframe::App for MaskCanvasApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // --- Dynamic window title: "MaskCanvas - <file>" ---
        let title = match self.current_path.as_ref().and_then(|p| p.file_name()) {
            Some(name) => format!("MaskCanvas - {}", name.to_string_lossy()),
            None => "MaskCanvas".to_string(),
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));

        self.poll_io(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.pending_io_ops > 0 {
                    ui.spinner();
                }
                if let Some(img) = self.engine.image() {
                    ui.label(format!(
                        "{}×{}  {:.0}%",
                        img.width(),
                        img.height(),
                        self.engine.transform().composed_scale() * 100.0
                    ));
                    ui.separator();
                }
                ui.label(self.status.iter().cloned().collect::<Vec<_>>().join("  ·  "));
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame { fill: egui::Color32::from_gray(32), ..Default::default() })
            .show(ctx, |ui| self.canvas(ui));

        if self.pending_io_ops > 0 {
            ctx.request_repaint();
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.prefs());
        self.engine.settings().save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::Pos2;

    #[test]
    fn prefs_default_to_settings_brush_size() {
        let prefs = ViewerPrefs::default();
        assert_eq!(prefs.brush_size, CanvasSettings::default().brush_size_px);
        assert_eq!(prefs.mode, EditMode::View);
    }

    #[test]
    fn selection_changes_with_a_box_are_not_echoed() {
        assert!(describe_event(&CanvasEvent::SelectionChanged(None)).is_some());
        let b = crate::canvas::SelectionBox::from_corners(Pos2::ZERO, Pos2::new(4.0, 4.0), 10.0, 10.0);
        assert!(describe_event(&CanvasEvent::SelectionChanged(Some(b))).is_none());
        assert_eq!(
            describe_event(&CanvasEvent::SelectionFinalized(b)).as_deref(),
            Some("Selected 4×4 at (0, 0)")
        );
    }
}
