// ============================================================================
// OPS — CPU raster routines used by the compositor, CLI and viewer
// ============================================================================
//
//   raster.rs  — clipped source-over Surface (rects, lines, image blits)
//   text.rs    — ab_glyph line layout/rasterization, font-kit lookup
//   imaging.rs — crop and mask-to-alpha cutout
// ============================================================================

pub mod imaging;
pub mod raster;
pub mod text;

pub use raster::Surface;
