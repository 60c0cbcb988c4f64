//! Chart and table generation for the metrics service.
//!
//! Generators turn assembled [`epi_core::plots::PlotGenerationData`] into a
//! [`figure::Figure`]; [`output`] renders figures to SVG, PNG or JPEG, or
//! encodes them with alt text for the frontend. [`tables`] produces the
//! tabular view of the same data and [`exports`] the downloadable rows.

pub mod alt_text;
pub mod colour;
pub mod common;
pub mod dual;
pub mod error;
pub mod exports;
pub mod figure;
pub mod interactive;
pub mod optimise;
pub mod output;
pub mod payload;
pub mod raster;
pub mod settings;
pub mod simplified;
pub mod subplots;
pub mod svg;
pub mod tables;

pub use error::{Error, Result};
pub use output::{ChartOutput, ChartResult};
