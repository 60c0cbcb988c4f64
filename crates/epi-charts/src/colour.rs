//! Named colours used by chart plots and chart chrome.

use std::fmt;

use epi_core::plots::ChartType;
use strum::{AsRefStr, EnumString};

/// An RGBA colour, written out as `rgba(r, g, b, a)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: f32,
}

impl Rgba {
  pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self { Self { r, g, b, a } }

  pub const fn opaque(r: u8, g: u8, b: u8) -> Self { Self::new(r, g, b, 1.0) }

  pub fn with_alpha(self, a: f32) -> Self { Self { a, ..self } }

  pub fn stringified(self) -> String { self.to_string() }
}

impl fmt::Display for Rgba {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
  }
}

// ─── Chart chrome ────────────────────────────────────────────────────────────

pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
/// Fully transparent; paper and plot backgrounds.
pub const WHITE: Rgba = Rgba::new(0, 0, 0, 0.0);
pub const DARK_BLUE_GREY: Rgba = Rgba::opaque(107, 114, 118);
pub const LINE_LIGHT_GREY: Rgba = Rgba::opaque(248, 248, 248);
pub const LINE_DARK_GREY: Rgba = Rgba::opaque(243, 242, 241);
/// Tick labels on simplified charts.
pub const LS_DARK_GREY: Rgba = Rgba::opaque(56, 63, 67);
/// Default ribbon colour for confidence intervals.
pub const CONFIDENCE_GREY: Rgba = Rgba::new(177, 180, 182, 0.5);

// ─── Plot line colours ───────────────────────────────────────────────────────

/// Colours a plot may request by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive)]
#[allow(non_camel_case_types)]
pub enum LineColour {
  COLOUR_1_DARK_BLUE,
  COLOUR_2_TURQUOISE,
  COLOUR_3_DARK_PINK,
  COLOUR_4_ORANGE,
  COLOUR_5_DARK_GREY,
  COLOUR_6_LIGHT_PURPLE,
  COLOUR_7_BURGUNDY,
  COLOUR_8_MUSTARD,
  COLOUR_9_DEEP_PLUM,
  COLOUR_10_PINK,
  COLOUR_11_KHAKI,
  COLOUR_12_BLUE,
  // Legacy names still stored on older pages.
  RED,
  YELLOW,
  GREEN,
  BLUE,
  DARK_BLUE,
  LIGHT_BLUE,
  PURPLE,
  BLACK,
  DARK_GREY,
  MID_GREY,
  LIGHT_GREY,
  LIGHT_PURPLE,
  BRIGHT_PURPLE,
  PINK,
  LIGHT_PINK,
  ORANGE,
  BROWN,
  LIGHT_GREEN,
  TURQUOISE,
}

impl LineColour {
  pub fn rgba(self) -> Rgba {
    match self {
      Self::COLOUR_1_DARK_BLUE => Rgba::opaque(18, 67, 109),
      Self::COLOUR_2_TURQUOISE => Rgba::opaque(40, 161, 151),
      Self::COLOUR_3_DARK_PINK => Rgba::opaque(128, 22, 80),
      Self::COLOUR_4_ORANGE => Rgba::opaque(244, 106, 37),
      Self::COLOUR_5_DARK_GREY => Rgba::opaque(61, 61, 61),
      Self::COLOUR_6_LIGHT_PURPLE => Rgba::opaque(162, 133, 209),
      Self::COLOUR_7_BURGUNDY => Rgba::opaque(84, 13, 52),
      Self::COLOUR_8_MUSTARD => Rgba::opaque(194, 132, 0),
      Self::COLOUR_9_DEEP_PLUM => Rgba::opaque(51, 25, 77),
      Self::COLOUR_10_PINK => Rgba::opaque(229, 102, 183),
      Self::COLOUR_11_KHAKI => Rgba::opaque(71, 71, 0),
      Self::COLOUR_12_BLUE => Rgba::opaque(0, 157, 214),
      Self::RED => Rgba::opaque(212, 53, 28),
      Self::YELLOW => Rgba::opaque(255, 221, 0),
      Self::GREEN => Rgba::opaque(0, 112, 60),
      Self::BLUE => Rgba::opaque(29, 112, 184),
      Self::DARK_BLUE => Rgba::opaque(0, 48, 120),
      Self::LIGHT_BLUE => Rgba::opaque(86, 148, 202),
      Self::PURPLE => Rgba::opaque(76, 44, 146),
      Self::BLACK => Rgba::opaque(11, 12, 12),
      Self::DARK_GREY => Rgba::opaque(80, 90, 95),
      Self::MID_GREY => Rgba::opaque(177, 180, 182),
      Self::LIGHT_GREY => Rgba::opaque(243, 242, 241),
      Self::LIGHT_PURPLE => Rgba::opaque(111, 114, 175),
      Self::BRIGHT_PURPLE => Rgba::opaque(145, 43, 136),
      Self::PINK => Rgba::opaque(213, 56, 128),
      Self::LIGHT_PINK => Rgba::opaque(244, 153, 190),
      Self::ORANGE => Rgba::opaque(244, 119, 56),
      Self::BROWN => Rgba::opaque(181, 136, 64),
      Self::LIGHT_GREEN => Rgba::opaque(133, 153, 75),
      Self::TURQUOISE => Rgba::opaque(40, 161, 151),
    }
  }
}

/// The colour a plot is drawn in.
///
/// Unknown names fall back to `COLOUR_1_DARK_BLUE`. Plots that name no
/// colour are blue when drawn as bars and black otherwise.
pub fn plot_colour(name: Option<&str>, chart_type: ChartType) -> Rgba {
  let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
    return match chart_type {
      ChartType::Bar => LineColour::BLUE.rgba(),
      _ => LineColour::BLACK.rgba(),
    };
  };
  name.parse::<LineColour>().unwrap_or(LineColour::COLOUR_1_DARK_BLUE).rgba()
}

/// Dash styles a line plot may request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LineType {
  #[default]
  Solid,
  Dash,
  Dot,
}

impl LineType {
  pub fn from_name(name: Option<&str>) -> Self {
    name.and_then(|n| n.trim().parse().ok()).unwrap_or_default()
  }
}
