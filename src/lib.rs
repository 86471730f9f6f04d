// ============================================================================
// MASKCANVAS — interactive photo-editing canvas core
// ============================================================================
//
//   canvas    — viewport transform, mask raster, overlays, compositor, tools
//   ops       — software raster surface, text rendering, crop/cutout helpers
//   io        — image decode / PNG encode, native file dialogs
//   settings  — persisted tunables
//   logger    — session log file + log_info!/log_warn!/log_err!
//   cli       — headless batch driver
//   app       — eframe viewer hosting the canvas
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

#[macro_use]
pub mod logger;
pub mod app;
pub mod canvas;
pub mod cli;
pub mod io;
pub mod ops;
pub mod settings;
