// ============================================================================
// MaskCanvas CLI — headless masking, cutout and inspection
// ============================================================================
//
// Usage examples:
//   maskcanvas -i photo.jpg --select 100,100,300,250 --mask --cutout
//   maskcanvas -i shots/*.png --output-dir out/ --exposure
//   maskcanvas -i a.png --stroke 10,10,200,40,220,90 --brush-radius 12 --mask
//   maskcanvas -i a.png --text "Sale" --text-pos 40,120 --text-size 64 --render 800x600
//
// No GUI is opened in CLI mode. Every input goes through the same
// CanvasEngine the viewer uses, driven by its programmatic operations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use egui::Pos2;
use image::RgbaImage;

use crate::canvas::overlay::compute_exposure_map;
use crate::canvas::{BrushMode, CanvasEngine, EditMode, LoadOutcome, SelectionBox, TextOverlay};
use crate::io::{encode_and_write, load_image_sync};
use crate::ops::imaging::{apply_alpha_from_mask, crop_region};
use crate::settings::CanvasSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MaskCanvas headless processor.
///
/// Build a selection mask from boxes and brush strokes, then export the
/// canonical mask, crops, cutouts, exposure maps and rendered views.
#[derive(Parser, Debug)]
#[command(
    name = "maskcanvas",
    about = "MaskCanvas headless mask / cutout processor",
    long_about = "Build binary edit masks from box selections and brush strokes without\n\
                  opening the GUI, and export masks, crops, cutouts, exposure heat-maps,\n\
                  rendered viewport frames and text burn-ins.\n\n\
                  Example:\n  \
                  maskcanvas -i photo.jpg --select 100,100,300,250 --mask --cutout\n  \
                  maskcanvas -i *.png --output-dir out/ --exposure"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output directory. Defaults to each input's own directory.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Box selection in image pixels: x0,y0,x1,y1.
    #[arg(long, value_name = "X0,Y0,X1,Y1")]
    pub select: Option<String>,

    /// Brush stroke through image points: x0,y0,x1,y1,... (repeatable).
    #[arg(long, value_name = "POINTS")]
    pub stroke: Vec<String>,

    /// Erasing stroke through image points: x0,y0,x1,y1,... (repeatable).
    #[arg(long, value_name = "POINTS")]
    pub erase: Vec<String>,

    /// Brush radius in image pixels.
    #[arg(long, default_value_t = 10.0, value_name = "PX")]
    pub brush_radius: f32,

    /// Write the canonical black/white mask as <stem>_mask.png.
    #[arg(long)]
    pub mask: bool,

    /// Write the selected box as <stem>_crop.png.
    #[arg(long)]
    pub crop: bool,

    /// Write the image with alpha taken from the mask as <stem>_cutout.png.
    #[arg(long)]
    pub cutout: bool,

    /// Write the exposure heat-map as <stem>_exposure.png.
    #[arg(long)]
    pub exposure: bool,

    /// Render the interactive view at this viewport size as <stem>_view.png.
    #[arg(long, value_name = "WxH")]
    pub render: Option<String>,

    /// Burn this text into the image and write <stem>_text.png.
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,

    /// Text baseline start in image pixels: x,y.
    #[arg(long, default_value = "20,60", value_name = "X,Y")]
    pub text_pos: String,

    #[arg(long, default_value_t = 48.0, value_name = "PX")]
    pub text_size: f32,

    /// Text colour: r,g,b,a.
    #[arg(long, default_value = "255,255,255,255", value_name = "R,G,B,A")]
    pub text_color: String,

    /// Font family for --text.
    #[arg(long, value_name = "FAMILY")]
    pub font: Option<String>,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

/// Parsed, validated per-run edit plan.
#[derive(Debug, Clone, PartialEq)]
struct Plan {
    select: Option<SelectionBox>,
    strokes: Vec<(Vec<Pos2>, BrushMode)>,
    render: Option<(f32, f32)>,
    text: Option<TextOverlay>,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let plan = match build_plan(&args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let settings = CanvasSettings::load();
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        match run_one(input_path, &args, &plan, &settings) {
            Ok(written) => {
                for path in &written {
                    println!("  → {}", path.display());
                }
                if args.verbose {
                    println!("  ({:.0}ms)", file_start.elapsed().as_secs_f64() * 1000.0);
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(input: &Path, args: &CliArgs, plan: &Plan, settings: &CanvasSettings) -> Result<Vec<PathBuf>, String> {
    // -- Step 1: Load ----------------------------------------------------
    let img = load_image_sync(input).map_err(|e| format!("load failed: {}", e))?;
    let mut engine = CanvasEngine::new(settings.clone());
    if let Some((w, h)) = plan.render {
        engine.resize(w, h);
    }
    if let LoadOutcome::Failed(e) = engine.set_image(img) {
        return Err(format!("load failed: {}", e));
    }

    // -- Step 2: Build the mask ------------------------------------------
    if let Some(sel) = plan.select {
        engine.select_region(sel);
    }
    for (points, mode) in &plan.strokes {
        engine.paint_stroke(points, args.brush_radius, *mode);
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| format!("cannot derive a name from '{}'", input.display()))?;
    let out_dir = args
        .output_dir
        .clone()
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let out = |suffix: &str| out_dir.join(format!("{}_{}.png", stem, suffix));
    let mut written = Vec::new();
    let mut write = |img: &RgbaImage, path: PathBuf| -> Result<(), String> {
        encode_and_write(img, &path).map_err(|e| format!("save failed for '{}': {}", path.display(), e))?;
        written.push(path);
        Ok(())
    };

    // -- Step 3: Mask-derived outputs ------------------------------------
    let mask = engine.canonical_mask();
    if (args.mask || args.cutout) && mask.is_none() {
        println!("  note: nothing selected; skipping mask outputs");
    }
    let source = engine.image_arc().ok_or_else(|| "no image after load".to_string())?;
    if let Some(mask) = &mask {
        if args.mask {
            write(mask, out("mask"))?;
        }
        if args.cutout {
            write(&apply_alpha_from_mask(&source, mask), out("cutout"))?;
        }
    }
    if args.crop {
        match engine.selection().and_then(|sel| crop_region(&source, &sel)) {
            Some(cropped) => write(&cropped, out("crop"))?,
            None => println!("  note: no box selection; skipping crop"),
        }
    }

    // -- Step 4: Inspection ----------------------------------------------
    if args.exposure {
        let map = compute_exposure_map(&source, settings.highlight_clip, settings.shadow_crush);
        write(&map, out("exposure"))?;
    }

    // -- Step 5: Text + rendered view ------------------------------------
    if let Some(text) = &plan.text {
        engine.set_mode(EditMode::Text);
        engine.set_text_overlay(Some(text.clone()));
    }
    if plan.render.is_some() {
        write(engine.frame(), out("view"))?;
    }
    if plan.text.is_some() {
        if let Some(flat) = engine.commit_text() {
            write(&flat, out("text"))?;
        }
    }

    Ok(written)
}

// ============================================================================
// Helpers
// ============================================================================

fn build_plan(args: &CliArgs) -> Result<Plan, String> {
    let select = match &args.select {
        Some(s) => {
            let v = parse_numbers(s).filter(|v| v.len() == 4).ok_or_else(|| format!("--select expects x0,y0,x1,y1, got '{}'", s))?;
            Some(SelectionBox::from_corners(
                Pos2::new(v[0], v[1]),
                Pos2::new(v[2], v[3]),
                f32::MAX,
                f32::MAX,
            ))
        }
        None => None,
    };

    let mut strokes = Vec::new();
    for (list, mode) in [(&args.stroke, BrushMode::Paint), (&args.erase, BrushMode::Erase)] {
        for s in list {
            strokes.push((parse_points(s)?, mode));
        }
    }

    let render = match &args.render {
        Some(s) => Some(parse_size(s).ok_or_else(|| format!("--render expects WxH, got '{}'", s))?),
        None => None,
    };

    let text = match &args.text {
        Some(t) => {
            let pos = parse_numbers(&args.text_pos)
                .filter(|v| v.len() == 2)
                .ok_or_else(|| format!("--text-pos expects x,y, got '{}'", args.text_pos))?;
            let color = CanvasSettings::str_to_color(&args.text_color)
                .ok_or_else(|| format!("--text-color expects r,g,b,a, got '{}'", args.text_color))?;
            let mut overlay = TextOverlay::new(t, pos[0], pos[1]);
            overlay.font_size = args.text_size.max(1.0);
            overlay.color = color;
            if let Some(font) = &args.font {
                overlay.font_family = font.clone();
            }
            Some(overlay)
        }
        None => None,
    };

    Ok(Plan { select, strokes, render, text })
}

fn parse_numbers(s: &str) -> Option<Vec<f32>> {
    s.split(',')
        .map(|p| p.trim().parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect()
}

fn parse_points(s: &str) -> Result<Vec<Pos2>, String> {
    let v = parse_numbers(s)
        .filter(|v| !v.is_empty() && v.len() % 2 == 0)
        .ok_or_else(|| format!("stroke expects x,y pairs, got '{}'", s))?;
    Ok(v.chunks_exact(2).map(|c| Pos2::new(c[0], c[1])).collect())
}

fn parse_size(s: &str) -> Option<(f32, f32)> {
    let (w, h) = s.to_ascii_lowercase().split_once('x').map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    (w > 0 && h > 0).then_some((w as f32, h as f32))
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
