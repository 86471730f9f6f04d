// ============================================================================
// OVERLAYS — reference subjects, text overlay, inspector heat-maps
// ============================================================================

use std::sync::Arc;

use egui::{Pos2, Rect, Vec2};
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SubjectId = Uuid;

// ============================================================================
// REFERENCE SUBJECTS
// ============================================================================

/// A positioned cut-out drawn over the image as a compositional guide.
///
/// `x`/`y` is the top-left corner in image space before rotation; rotation
/// (degrees, clockwise) turns the subject about its own centre.
#[derive(Clone, Debug)]
pub struct ReferenceSubject {
    pub id: SubjectId,
    pub pixels: Arc<RgbaImage>,
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub rotation: f32,
    pub opacity: f32,
    pub visible: bool,
    pub z_order: i32,
}

impl ReferenceSubject {
    /// Scaled size in image space.
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.pixels.width() as f32, self.pixels.height() as f32) * self.scale
    }

    /// Unrotated bounds in image space.
    pub fn bounds(&self) -> Rect {
        Rect::from_min_size(Pos2::new(self.x, self.y), self.size())
    }

    /// Axis-aligned hit-test. Rotation is not taken into account.
    pub fn contains(&self, p: Pos2) -> bool {
        let b = self.bounds();
        p.x >= b.min.x && p.x <= b.max.x && p.y >= b.min.y && p.y <= b.max.y
    }
}

/// Fields a caller may change on an existing subject. `None` leaves the
/// field as it is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectUpdate {
    pub label: Option<String>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
    pub opacity: Option<f32>,
    pub visible: Option<bool>,
    pub z_order: Option<i32>,
}

/// All reference subjects plus the single active one.
#[derive(Clone, Debug, Default)]
pub struct OverlayRegistry {
    subjects: Vec<ReferenceSubject>,
    active: Option<SubjectId>,
    next_z: i32,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subject at `(x, y)` above every existing subject. Returns its id.
    pub fn add_subject(&mut self, pixels: Arc<RgbaImage>, label: &str, x: f32, y: f32) -> SubjectId {
        let id = Uuid::new_v4();
        let z_order = self.next_z;
        self.next_z += 1;
        self.subjects.push(ReferenceSubject {
            id,
            pixels,
            label: label.to_string(),
            x,
            y,
            scale: 1.0,
            rotation: 0.0,
            opacity: 1.0,
            visible: true,
            z_order,
        });
        id
    }

    pub fn remove(&mut self, id: SubjectId) -> Option<ReferenceSubject> {
        let idx = self.subjects.iter().position(|s| s.id == id)?;
        if self.active == Some(id) {
            self.active = None;
        }
        Some(self.subjects.remove(idx))
    }

    pub fn get(&self, id: SubjectId) -> Option<&ReferenceSubject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Apply `update`, clamping scale and opacity. Returns false for unknown ids.
    pub fn update(&mut self, id: SubjectId, update: SubjectUpdate) -> bool {
        let Some(s) = self.subjects.iter_mut().find(|s| s.id == id) else { return false };
        if let Some(label) = update.label {
            s.label = label;
        }
        if let Some(x) = update.x.filter(|v| v.is_finite()) {
            s.x = x;
        }
        if let Some(y) = update.y.filter(|v| v.is_finite()) {
            s.y = y;
        }
        if let Some(scale) = update.scale.filter(|v| v.is_finite()) {
            s.scale = scale.max(0.01);
        }
        if let Some(rotation) = update.rotation.filter(|v| v.is_finite()) {
            s.rotation = rotation.rem_euclid(360.0);
        }
        if let Some(opacity) = update.opacity.filter(|v| v.is_finite()) {
            s.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(visible) = update.visible {
            s.visible = visible;
        }
        if let Some(z) = update.z_order {
            s.z_order = z;
            self.next_z = self.next_z.max(z + 1);
        }
        true
    }

    pub fn active(&self) -> Option<SubjectId> {
        self.active
    }

    pub fn active_subject(&self) -> Option<&ReferenceSubject> {
        self.active.and_then(|id| self.get(id))
    }

    /// Make `id` the active subject (or none). Unknown ids clear the selection.
    pub fn set_active(&mut self, id: Option<SubjectId>) {
        self.active = id.filter(|id| self.get(*id).is_some());
    }

    /// Topmost visible subject under `p` (image space).
    pub fn hit_test(&self, p: Pos2) -> Option<SubjectId> {
        self.subjects
            .iter()
            .filter(|s| s.visible && s.contains(p))
            .max_by_key(|s| s.z_order)
            .map(|s| s.id)
    }

    /// Move a subject by an image-space delta. No clamping to the image.
    pub fn translate(&mut self, id: SubjectId, delta: Vec2) -> Option<Pos2> {
        let s = self.subjects.iter_mut().find(|s| s.id == id)?;
        s.x += delta.x;
        s.y += delta.y;
        Some(Pos2::new(s.x, s.y))
    }

    /// Subjects in paint order (ascending z, creation order on ties).
    pub fn ordered(&self) -> Vec<&ReferenceSubject> {
        let mut v: Vec<&ReferenceSubject> = self.subjects.iter().collect();
        v.sort_by_key(|s| s.z_order);
        v
    }
}

// ============================================================================
// TEXT OVERLAY
// ============================================================================

/// A single line of text positioned in image space; `(x, y)` is the start of
/// the baseline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: [u8; 4],
    pub font_size: f32,
    pub font_family: String,
    pub font_weight: u16,
    pub shadow_color: [u8; 4],
    pub shadow_blur: f32,
}

impl TextOverlay {
    pub fn new(text: &str, x: f32, y: f32) -> Self {
        Self {
            text: text.to_string(),
            x,
            y,
            color: [255, 255, 255, 255],
            font_size: 48.0,
            font_family: "sans-serif".to_string(),
            font_weight: 400,
            shadow_color: [0, 0, 0, 0],
            shadow_blur: 0.0,
        }
    }
}

// ============================================================================
// INSPECTOR
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InspectorOverlay {
    #[default]
    None,
    Grid,
    Exposure,
}

impl InspectorOverlay {
    pub fn label(&self) -> &'static str {
        match self {
            InspectorOverlay::None => "None",
            InspectorOverlay::Grid => "Grid",
            InspectorOverlay::Exposure => "Exposure",
        }
    }
}

pub const HIGHLIGHT_COLOR: [u8; 4] = [255, 0, 0, 255];
pub const SHADOW_COLOR: [u8; 4] = [0, 0, 255, 255];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExposureClass {
    HighlightClipped,
    ShadowCrushed,
    Normal,
}

/// Luma in thousandths: `299R + 587G + 114B`, exact in integers.
#[inline]
pub fn luma_milli(r: u8, g: u8, b: u8) -> u32 {
    299 * r as u32 + 587 * g as u32 + 114 * b as u32
}

/// Classify one pixel against the highlight / shadow thresholds (0..=255 luma).
#[inline]
pub fn classify(px: [u8; 4], highlight: f32, shadow: f32) -> ExposureClass {
    let l = luma_milli(px[0], px[1], px[2]);
    let hi = (highlight * 1000.0).round() as u32;
    let lo = (shadow * 1000.0).round() as u32;
    if l > hi {
        ExposureClass::HighlightClipped
    } else if l < lo {
        ExposureClass::ShadowCrushed
    } else {
        ExposureClass::Normal
    }
}

/// Heat raster: solid red where clipped, solid blue where crushed, transparent elsewhere.
pub fn compute_exposure_map(img: &RgbaImage, highlight: f32, shadow: f32) -> RgbaImage {
    let mut out = RgbaImage::new(img.width(), img.height());
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_exact_mut(4)
        .zip(img.as_raw().par_chunks_exact(4))
        .for_each(|(dst, src)| {
            let c = match classify([src[0], src[1], src[2], src[3]], highlight, shadow) {
                ExposureClass::HighlightClipped => HIGHLIGHT_COLOR,
                ExposureClass::ShadowCrushed => SHADOW_COLOR,
                ExposureClass::Normal => [0, 0, 0, 0],
            };
            dst.copy_from_slice(&c);
        });
    out
}

/// Heat raster cached against the image revision it was computed from.
#[derive(Clone, Debug, Default)]
pub struct ExposureCache {
    entry: Option<(u64, Arc<RgbaImage>)>,
}

impl ExposureCache {
    /// The cached map for `revision`, computing it on a miss.
    pub fn get_or_compute(&mut self, revision: u64, img: &RgbaImage, highlight: f32, shadow: f32) -> Arc<RgbaImage> {
        if let Some((rev, map)) = &self.entry {
            if *rev == revision {
                return Arc::clone(map);
            }
        }
        let map = Arc::new(compute_exposure_map(img, highlight, shadow));
        self.entry = Some((revision, Arc::clone(&map)));
        map
    }

    pub fn is_cached(&self, revision: u64) -> bool {
        matches!(&self.entry, Some((rev, _)) if *rev == revision)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn subject_pixels(w: u32, h: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(w, h, Rgba([0, 255, 0, 255])))
    }

    #[test]
    fn topmost_subject_wins_the_hit_test() {
        let mut reg = OverlayRegistry::new();
        let low = reg.add_subject(subject_pixels(100, 100), "low", 0.0, 0.0);
        let high = reg.add_subject(subject_pixels(100, 100), "high", 50.0, 50.0);
        assert_eq!(reg.get(low).map(|s| s.z_order), Some(0));
        assert_eq!(reg.get(high).map(|s| s.z_order), Some(1));
        assert_eq!(reg.hit_test(Pos2::new(75.0, 75.0)), Some(high));
        assert_eq!(reg.hit_test(Pos2::new(10.0, 10.0)), Some(low));
        assert_eq!(reg.hit_test(Pos2::new(500.0, 10.0)), None);
    }

    #[test]
    fn hidden_subjects_are_not_hit() {
        let mut reg = OverlayRegistry::new();
        let id = reg.add_subject(subject_pixels(10, 10), "s", 0.0, 0.0);
        reg.update(id, SubjectUpdate { visible: Some(false), ..Default::default() });
        assert_eq!(reg.hit_test(Pos2::new(5.0, 5.0)), None);
    }

    #[test]
    fn rotation_is_ignored_when_hit_testing() {
        let mut reg = OverlayRegistry::new();
        let id = reg.add_subject(subject_pixels(100, 10), "bar", 0.0, 0.0);
        reg.update(id, SubjectUpdate { rotation: Some(90.0), ..Default::default() });
        // Still hits along the unrotated long edge.
        assert_eq!(reg.hit_test(Pos2::new(95.0, 5.0)), Some(id));
    }

    #[test]
    fn scale_extends_the_hit_area_and_updates_clamp() {
        let mut reg = OverlayRegistry::new();
        let id = reg.add_subject(subject_pixels(10, 10), "s", 5.0, 5.0);
        reg.update(id, SubjectUpdate { scale: Some(3.0), opacity: Some(4.0), ..Default::default() });
        assert_eq!(reg.hit_test(Pos2::new(34.0, 34.0)), Some(id));
        assert_eq!(reg.get(id).map(|s| s.opacity), Some(1.0));
    }

    #[test]
    fn translate_is_unclamped_and_remove_clears_active() {
        let mut reg = OverlayRegistry::new();
        let id = reg.add_subject(subject_pixels(10, 10), "s", 0.0, 0.0);
        reg.set_active(Some(id));
        assert_eq!(reg.translate(id, Vec2::new(-50.0, 2000.0)), Some(Pos2::new(-50.0, 2000.0)));
        assert!(reg.remove(id).is_some());
        assert_eq!(reg.active(), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn ordered_paints_low_to_high() {
        let mut reg = OverlayRegistry::new();
        let a = reg.add_subject(subject_pixels(1, 1), "a", 0.0, 0.0);
        let b = reg.add_subject(subject_pixels(1, 1), "b", 0.0, 0.0);
        reg.update(a, SubjectUpdate { z_order: Some(5), ..Default::default() });
        let ids: Vec<SubjectId> = reg.ordered().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a]);
        let c = reg.add_subject(subject_pixels(1, 1), "c", 0.0, 0.0);
        assert_eq!(reg.get(c).map(|s| s.z_order), Some(6));
    }

    #[test]
    fn exposure_thresholds_are_exclusive() {
        let grey = |v: u8| [v, v, v, 255];
        assert_eq!(classify(grey(246), 245.0, 10.0), ExposureClass::HighlightClipped);
        assert_eq!(classify(grey(245), 245.0, 10.0), ExposureClass::Normal);
        assert_eq!(classify(grey(128), 245.0, 10.0), ExposureClass::Normal);
        assert_eq!(classify(grey(10), 245.0, 10.0), ExposureClass::Normal);
        assert_eq!(classify(grey(9), 245.0, 10.0), ExposureClass::ShadowCrushed);
    }

    #[test]
    fn exposure_map_colours_and_cache() {
        let mut img = RgbaImage::from_pixel(3, 1, Rgba([128, 128, 128, 255]));
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        img.put_pixel(2, 0, Rgba([0, 0, 0, 255]));
        let map = compute_exposure_map(&img, 245.0, 10.0);
        assert_eq!(map.get_pixel(0, 0).0, HIGHLIGHT_COLOR);
        assert_eq!(map.get_pixel(1, 0).0, [0, 0, 0, 0]);
        assert_eq!(map.get_pixel(2, 0).0, SHADOW_COLOR);

        let mut cache = ExposureCache::default();
        let first = cache.get_or_compute(7, &img, 245.0, 10.0);
        let again = cache.get_or_compute(7, &img, 245.0, 10.0);
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!cache.is_cached(8));
        cache.invalidate();
        assert!(!cache.is_cached(7));
    }
}
