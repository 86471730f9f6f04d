use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use egui::Pos2;
use std::collections::HashMap;

use super::raster::{blur_coverage, Surface};

/// Cache for rasterized glyph pixel data. Key: (GlyphId, font_size_bits).
/// Value: (pixels as (u32, u32, f32), bounds_min_x_at_origin_zero, bounds_min_y_at_origin_zero).
pub type GlyphPixelCache = HashMap<(GlyphId, u32), (Vec<(u32, u32, f32)>, f32, f32)>;

/// Width estimate used when no font could be loaded at all.
const FALLBACK_ADVANCE: f32 = 0.6;

/// Lay out a single line of text starting at x=0 on the baseline.
/// Returns `(glyphs, total_width)`.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    (glyphs, cursor_x)
}

/// Single-channel coverage for a rasterized line, positioned in target space.
pub struct TextCoverage {
    pub buf: Vec<f32>,
    pub w: u32,
    pub h: u32,
    pub off_x: i32,
    pub off_y: i32,
}

impl TextCoverage {
    fn empty() -> Self {
        Self { buf: Vec::new(), w: 0, h: 0, off_x: 0, off_y: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Rasterize one line with its baseline starting at `origin`.
///
/// `pad` grows the buffer on every side (room for a blurred shadow).
/// Glyphs are cached at position (0,0) and replayed at the actual position.
pub fn rasterize_line(
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: Pos2,
    pad: f32,
    bold: bool,
    glyph_cache: &mut GlyphPixelCache,
) -> TextCoverage {
    if !(font_size > 0.0) {
        return TextCoverage::empty();
    }
    let (glyphs, _) = layout_line(font, text, font_size);
    if glyphs.is_empty() {
        return TextCoverage::empty();
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(gx, 0.0));
        let bounds = font.glyph_bounds(&glyph);
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if min_x >= max_x || min_y >= max_y {
        return TextCoverage::empty();
    }

    let pad = pad.max(0.0) + 2.0;
    let x0 = (origin.x + min_x - pad).floor() as i32;
    let y0 = (origin.y + min_y - pad).floor() as i32;
    let x1 = (origin.x + max_x + pad).ceil() as i32;
    let y1 = (origin.y + max_y + pad).ceil() as i32;
    let w = (x1 - x0).max(0) as u32;
    let h = (y1 - y0).max(0) as u32;
    if w == 0 || h == 0 {
        return TextCoverage::empty();
    }

    let mut buf = vec![0.0f32; w as usize * h as usize];
    let font_size_key = font_size.to_bits();
    for &(glyph_id, gx) in &glyphs {
        let cache_key = (glyph_id, font_size_key);
        let (pixels, base_bx, base_by) = glyph_cache.entry(cache_key).or_insert_with(|| {
            let base_glyph = glyph_id.with_scale_and_position(font_size, point(0.0, 0.0));
            let mut px_list = Vec::new();
            match font.outline_glyph(base_glyph) {
                Some(outlined) => {
                    let b = outlined.px_bounds();
                    outlined.draw(|px, py, cov| px_list.push((px, py, cov)));
                    (px_list, b.min.x, b.min.y)
                }
                None => (px_list, 0.0, 0.0),
            }
        });

        let bx = *base_bx + gx.round() + origin.x;
        let by = *base_by + origin.y;
        for &(px, py, cov) in pixels.iter() {
            let ix = (px as f32 + bx).round() as i32 - x0;
            let iy = (py as f32 + by).round() as i32 - y0;
            if ix >= 0 && iy >= 0 && (ix as u32) < w && (iy as u32) < h {
                let idx = iy as usize * w as usize + ix as usize;
                buf[idx] = buf[idx].max(cov);
                if bold && ((ix + 1) as u32) < w {
                    buf[idx + 1] = buf[idx + 1].max(cov);
                }
            }
        }
    }

    TextCoverage { buf, w, h, off_x: x0, off_y: y0 }
}

/// Enumerate system font families (family names only, no weight variants).
/// Returns a sorted, deduplicated list of font family names.
pub fn enumerate_system_fonts() -> Vec<String> {
    match font_kit::source::SystemSource::new().all_families() {
        Ok(mut families) => {
            families.sort();
            families.dedup();
            families
        }
        Err(_) => {
            #[cfg(target_os = "linux")]
            { vec!["Liberation Sans".to_string(), "DejaVu Sans".to_string()] }
            #[cfg(not(target_os = "linux"))]
            { vec!["Arial".to_string(), "Times New Roman".to_string()] }
        }
    }
}

/// Load a font by family name and CSS-style weight from the system.
/// Generic names ("sans-serif", "serif", "monospace") map to font-kit's
/// generic families. Returns None if nothing matches.
pub fn load_system_font(family: &str, weight: u16) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);

    let name = match family.trim().to_ascii_lowercase().as_str() {
        "sans-serif" | "sans" => FamilyName::SansSerif,
        "serif" => FamilyName::Serif,
        "monospace" => FamilyName::Monospace,
        _ => FamilyName::Title(family.trim().to_string()),
    };

    let handle = SystemSource::new().select_best_match(&[name], &props).ok()?;
    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// What to draw: colour, size and optional blurred shadow.
#[derive(Clone, Copy, Debug)]
pub struct TextPaint<'a> {
    pub family: &'a str,
    pub weight: u16,
    pub size: f32,
    pub color: [u8; 4],
    pub shadow_color: [u8; 4],
    pub shadow_blur: f32,
}

/// Font lookup plus glyph cache shared by every text draw in the compositor.
///
/// Lookups that fail fall back to the default family, then to the generic
/// sans-serif family. If no font loads at all, text is skipped and widths
/// are estimated.
pub struct TextRenderer {
    default_family: String,
    fonts: HashMap<(String, u16), Option<FontArc>>,
    fallback: Option<Option<FontArc>>,
    system_fonts: bool,
    /// Keyed like `fonts`, so a family that resolved to the fallback shares
    /// nothing with the fallback's own entry. Each face keeps at most
    /// `MAX_CACHED_SIZES` sizes, since zooming changes the draw size.
    glyph_cache: HashMap<(String, u16), HashMap<u32, GlyphPixelCache>>,
}

/// Sizes kept per face before that face's glyphs are dropped.
const MAX_CACHED_SIZES: usize = 4;

impl TextRenderer {
    pub fn new(default_family: &str) -> Self {
        Self {
            default_family: default_family.to_string(),
            fonts: HashMap::new(),
            fallback: None,
            system_fonts: true,
            glyph_cache: HashMap::new(),
        }
    }

    /// Use `font` for every lookup instead of querying the system.
    pub fn with_font(default_family: &str, font: FontArc) -> Self {
        let mut r = Self::new(default_family);
        r.system_fonts = false;
        r.fallback = Some(Some(font));
        r
    }

    /// Never query the system; text is measured by estimate and not drawn.
    pub fn disable_system_fonts(&mut self) {
        self.system_fonts = false;
        self.fallback = Some(None);
        self.fonts.clear();
    }

    fn fallback_font(&mut self) -> Option<FontArc> {
        if self.fallback.is_none() && self.system_fonts {
            let font = load_system_font(&self.default_family, 400)
                .or_else(|| load_system_font("sans-serif", 400));
            if font.is_none() {
                crate::log_warn!("no usable system font found; text overlays will not render");
            }
            self.fallback = Some(font);
        }
        self.fallback.clone().flatten()
    }

    pub fn font(&mut self, family: &str, weight: u16) -> Option<FontArc> {
        let key = (family.to_string(), weight);
        if let Some(cached) = self.fonts.get(&key) {
            return cached.clone().or_else(|| self.fallback_font());
        }
        let loaded = if self.system_fonts { load_system_font(family, weight) } else { None };
        if loaded.is_none() && self.system_fonts {
            crate::log_info!("font '{}' ({}) not found, using fallback", family, weight);
        }
        self.fonts.insert(key, loaded.clone());
        loaded.or_else(|| self.fallback_font())
    }

    /// Advance width of `text` at `size`.
    pub fn measure(&mut self, family: &str, weight: u16, text: &str, size: f32) -> f32 {
        match self.font(family, weight) {
            Some(font) => layout_line(&font, text, size).1,
            None => FALLBACK_ADVANCE * size * text.chars().count() as f32,
        }
    }

    /// Glyph cache for one face at `size`. A new size on a face that
    /// already holds `MAX_CACHED_SIZES` sizes starts that face over.
    fn glyph_cache_for(&mut self, family: &str, weight: u16, size: f32) -> &mut GlyphPixelCache {
        let sizes = self.glyph_cache.entry((family.to_string(), weight)).or_default();
        let size_key = size.to_bits();
        if !sizes.contains_key(&size_key) && sizes.len() >= MAX_CACHED_SIZES {
            sizes.clear();
        }
        sizes.entry(size_key).or_default()
    }

    /// Number of rasterized glyphs currently held across all faces.
    #[cfg(test)]
    fn cached_glyph_count(&self) -> usize {
        self.glyph_cache.values().flat_map(|sizes| sizes.values()).map(|g| g.len()).sum()
    }

    /// Draw `text` with its baseline starting at `baseline`. The shadow, if
    /// any, is drawn first beneath the glyphs.
    pub fn draw(&mut self, surface: &mut Surface, text: &str, baseline: Pos2, paint: &TextPaint<'_>) {
        if text.is_empty() {
            return;
        }
        let Some(font) = self.font(paint.family, paint.weight) else { return };
        // Fake bold only when the family has no heavier face of its own.
        let bold = paint.weight >= 600 && self.fonts.get(&(paint.family.to_string(), paint.weight)).is_none_or(|f| f.is_none());
        let blur = paint.shadow_blur.max(0.0);
        let cache = self.glyph_cache_for(paint.family, paint.weight, paint.size);
        let cov = rasterize_line(&font, text, paint.size, baseline, blur * 2.0, bold, cache);
        if cov.is_empty() {
            return;
        }
        if blur > 0.0 && paint.shadow_color[3] > 0 {
            let radius = (blur / 2.0).round().max(1.0) as usize;
            let shadow = blur_coverage(&cov.buf, cov.w as usize, cov.h as usize, radius);
            surface.draw_coverage(&shadow, cov.w, cov.h, cov.off_x, cov.off_y, paint.shadow_color);
        }
        surface.draw_coverage(&cov.buf, cov.w, cov.h, cov.off_x, cov.off_y, paint.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fonts_fall_back_to_an_estimate() {
        let mut r = TextRenderer::new("DejaVu Sans");
        r.disable_system_fonts();
        assert!((r.measure("Nope", 400, "abcd", 10.0) - 24.0).abs() < 1e-3);
        let mut s = Surface::new(20, 20);
        r.draw(&mut s, "abcd", Pos2::new(2.0, 15.0), &TextPaint {
            family: "Nope",
            weight: 400,
            size: 10.0,
            color: [255, 255, 255, 255],
            shadow_color: [0, 0, 0, 0],
            shadow_blur: 0.0,
        });
        assert!(s.into_image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn glyph_cache_stays_bounded_across_zoom_levels() {
        let mut r = TextRenderer::new("DejaVu Sans");
        r.disable_system_fonts();
        let fill = |cache: &mut GlyphPixelCache, size: f32| {
            for g in 0..5u16 {
                cache.entry((GlyphId(g), size.to_bits())).or_insert_with(|| (vec![(0, 0, 1.0)], 0.0, 0.0));
            }
        };
        for step in 0..200 {
            let size = 12.0 * (1.0 + step as f32 * 0.037);
            fill(r.glyph_cache_for("Sans", 400, size), size);
            fill(r.glyph_cache_for("Sans", 700, size), size);
            // A fixed-size label drawn every frame on the same face.
            fill(r.glyph_cache_for("Sans", 400, 11.0), 11.0);
            assert!(r.cached_glyph_count() <= 2 * MAX_CACHED_SIZES * 5);
        }
        assert_eq!(r.glyph_cache_for("Sans", 400, 11.0).len(), 5);
        assert!(r.glyph_cache_for("Sans", 400, 99.5).is_empty());
    }

    #[test]
    fn coverage_is_empty_for_empty_text() {
        let cov = TextCoverage::empty();
        assert!(cov.is_empty());
    }
}
