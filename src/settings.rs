use std::path::PathBuf;

use crate::logger::LogLevel;

/// Sampling used when the compositor scales rasters onto the viewport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ZoomFilterMode {
    #[default]
    Linear,
    Nearest,
}

impl ZoomFilterMode {
    fn as_str(self) -> &'static str {
        match self {
            ZoomFilterMode::Linear => "linear",
            ZoomFilterMode::Nearest => "nearest",
        }
    }
}

/// Tunables that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasSettings {
    /// Upper bound on the fit-to-viewport scale (leaves a visible margin).
    pub fit_cap: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Zoom factor applied per scroll notch.
    pub zoom_step: f32,
    /// A pointer press shorter than this is a tap, not a drag.
    pub click_threshold_ms: u64,
    /// Maximum pointer travel (screen px) for a press to still count as a tap.
    pub click_tolerance_px: f32,
    /// Horizontal distance (screen px) within which the compare slider is grabbed.
    pub slider_grab_px: f32,
    /// Brush diameter in screen pixels; converted to image pixels per stroke.
    pub brush_size_px: f32,
    pub brush_hardness: f32,
    /// Luma above this is highlight-clipped.
    pub highlight_clip: f32,
    /// Luma below this is shadow-crushed.
    pub shadow_crush: f32,
    pub zoom_filter_mode: ZoomFilterMode,
    /// Unmultiplied RGBA.
    pub accent_color: [u8; 4],
    pub mask_paint_color: [u8; 4],
    pub mask_tint_color: [u8; 4],
    pub default_font: String,
    pub log_level: LogLevel,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            fit_cap: 0.9,
            min_zoom: 0.1,
            max_zoom: 10.0,
            zoom_step: 1.1,
            click_threshold_ms: 300,
            click_tolerance_px: 4.0,
            slider_grab_px: 40.0,
            brush_size_px: 20.0,
            brush_hardness: 0.75,
            highlight_clip: 245.0,
            shadow_crush: 10.0,
            zoom_filter_mode: ZoomFilterMode::Linear,
            accent_color: [250, 204, 21, 255],
            mask_paint_color: [250, 204, 21, 255],
            mask_tint_color: [239, 68, 68, 128],
            default_font: "DejaVu Sans".to_string(),
            log_level: LogLevel::Info,
        }
    }
}

impl CanvasSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/maskcanvas/maskcanvas_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MaskCanvas\maskcanvas_settings.cfg
    /// On macOS:   ~/Library/Application Support/MaskCanvas/maskcanvas_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(
                PathBuf::from(appdata)
                    .join("MaskCanvas")
                    .join("maskcanvas_settings.cfg"),
            );
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("MaskCanvas")
                    .join("maskcanvas_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = match std::env::var("XDG_CONFIG_HOME") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
            };
            Some(config_dir.join("maskcanvas").join("maskcanvas_settings.cfg"))
        }
    }

    /// Serialize a colour as "r,g,b,a".
    fn color_to_str(c: [u8; 4]) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse a colour from "r,g,b,a".
    pub fn str_to_color(s: &str) -> Option<[u8; 4]> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return None;
        }
        let r = parts[0].trim().parse::<u8>().ok()?;
        let g = parts[1].trim().parse::<u8>().ok()?;
        let b = parts[2].trim().parse::<u8>().ok()?;
        let a = parts[3].trim().parse::<u8>().ok()?;
        Some([r, g, b, a])
    }

    pub fn to_config_string(&self) -> String {
        let level = match self.log_level {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        format!(
            "fit_cap={}\n\
             min_zoom={}\n\
             max_zoom={}\n\
             zoom_step={}\n\
             click_threshold_ms={}\n\
             click_tolerance_px={}\n\
             slider_grab_px={}\n\
             brush_size_px={}\n\
             brush_hardness={}\n\
             highlight_clip={}\n\
             shadow_crush={}\n\
             zoom_filter_mode={}\n\
             accent_color={}\n\
             mask_paint_color={}\n\
             mask_tint_color={}\n\
             default_font={}\n\
             log_level={level}\n",
            self.fit_cap,
            self.min_zoom,
            self.max_zoom,
            self.zoom_step,
            self.click_threshold_ms,
            self.click_tolerance_px,
            self.slider_grab_px,
            self.brush_size_px,
            self.brush_hardness,
            self.highlight_clip,
            self.shadow_crush,
            self.zoom_filter_mode.as_str(),
            Self::color_to_str(self.accent_color),
            Self::color_to_str(self.mask_paint_color),
            Self::color_to_str(self.mask_tint_color),
            self.default_font,
        )
    }

    /// Parse `key=value` lines. Unknown keys and unparsable values keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "fit_cap" => s.fit_cap = val.parse().unwrap_or(s.fit_cap),
                "min_zoom" => s.min_zoom = val.parse().unwrap_or(s.min_zoom),
                "max_zoom" => s.max_zoom = val.parse().unwrap_or(s.max_zoom),
                "zoom_step" => s.zoom_step = val.parse().unwrap_or(s.zoom_step),
                "click_threshold_ms" => {
                    s.click_threshold_ms = val.parse().unwrap_or(s.click_threshold_ms)
                }
                "click_tolerance_px" => {
                    s.click_tolerance_px = val.parse().unwrap_or(s.click_tolerance_px)
                }
                "slider_grab_px" => s.slider_grab_px = val.parse().unwrap_or(s.slider_grab_px),
                "brush_size_px" => s.brush_size_px = val.parse().unwrap_or(s.brush_size_px),
                "brush_hardness" => s.brush_hardness = val.parse().unwrap_or(s.brush_hardness),
                "highlight_clip" => s.highlight_clip = val.parse().unwrap_or(s.highlight_clip),
                "shadow_crush" => s.shadow_crush = val.parse().unwrap_or(s.shadow_crush),
                "zoom_filter_mode" => {
                    s.zoom_filter_mode = match val {
                        "nearest" => ZoomFilterMode::Nearest,
                        _ => ZoomFilterMode::Linear,
                    };
                }
                "accent_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.accent_color = c;
                    }
                }
                "mask_paint_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.mask_paint_color = c;
                    }
                }
                "mask_tint_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.mask_tint_color = c;
                    }
                }
                "default_font" => {
                    if !val.is_empty() {
                        s.default_font = val.to_string();
                    }
                }
                "log_level" => {
                    if let Some(level) = LogLevel::parse(val) {
                        s.log_level = level;
                    }
                }
                _ => {}
            }
        }
        s.sanitize();
        s
    }

    /// Pull out-of-range values back into something the engine can use.
    fn sanitize(&mut self) {
        let d = Self::default();
        if !(self.fit_cap > 0.0) {
            self.fit_cap = d.fit_cap;
        }
        if !(self.min_zoom > 0.0) || !(self.max_zoom >= self.min_zoom) {
            self.min_zoom = d.min_zoom;
            self.max_zoom = d.max_zoom;
        }
        if !(self.zoom_step > 1.0) {
            self.zoom_step = d.zoom_step;
        }
        self.brush_hardness = self.brush_hardness.clamp(0.0, 1.0);
        self.brush_size_px = self.brush_size_px.max(1.0);
    }

    /// Load settings from disk (defaults if the file is missing or unreadable).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            crate::log_warn!("could not save settings to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_string_parses_back_to_the_same_settings() {
        let mut s = CanvasSettings::default();
        s.brush_size_px = 32.0;
        s.zoom_filter_mode = ZoomFilterMode::Nearest;
        s.mask_tint_color = [0, 128, 255, 90];
        s.log_level = LogLevel::Warn;
        assert_eq!(CanvasSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn garbage_lines_keep_defaults() {
        let s = CanvasSettings::parse("fit_cap=abc\nnot a line\nclick_threshold_ms=250\n");
        assert_eq!(s.fit_cap, 0.9);
        assert_eq!(s.click_threshold_ms, 250);
    }

    #[test]
    fn inverted_zoom_limits_fall_back_to_defaults() {
        let s = CanvasSettings::parse("min_zoom=5\nmax_zoom=2\nbrush_hardness=3\n");
        assert_eq!((s.min_zoom, s.max_zoom), (0.1, 10.0));
        assert_eq!(s.brush_hardness, 1.0);
    }

    #[test]
    fn settings_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maskcanvas_settings.cfg");
        let mut s = CanvasSettings::default();
        s.default_font = "Liberation Sans".to_string();
        std::fs::write(&path, s.to_config_string()).unwrap();
        let loaded = CanvasSettings::parse(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(loaded.default_font, "Liberation Sans");
    }
}
