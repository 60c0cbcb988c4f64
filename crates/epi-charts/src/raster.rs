//! Rasterising rendered SVG to PNG or JPEG with resvg.

use std::sync::{Arc, OnceLock};

use epi_core::plots::FileFormat;
use image::{DynamicImage, RgbaImage, codecs::jpeg::JpegEncoder};
use resvg::{
  tiny_skia::{Color, Pixmap, Transform},
  usvg::{self, fontdb},
};

use crate::{Error, Result};

const JPEG_QUALITY: u8 = 90;

/// System fonts are loaded once per process.
fn font_database() -> Arc<fontdb::Database> {
  static FONTS: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
  FONTS
    .get_or_init(|| {
      let mut db = fontdb::Database::new();
      db.load_system_fonts();
      tracing::debug!(faces = db.len(), "loaded system fonts for rasterising");
      Arc::new(db)
    })
    .clone()
}

fn rasterise(svg: &str) -> Result<Pixmap> {
  let options = usvg::Options { fontdb: font_database(), ..Default::default() };
  let tree = usvg::Tree::from_str(svg, &options)?;
  let size = tree.size().to_int_size();
  let mut pixmap = Pixmap::new(size.width(), size.height())
    .ok_or_else(|| Error::Raster(format!("cannot allocate a {}x{} image", size.width(), size.height())))?;
  pixmap.fill(Color::WHITE);
  resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());
  Ok(pixmap)
}

pub fn to_png(svg: &str) -> Result<Vec<u8>> {
  rasterise(svg)?.encode_png().map_err(|e| Error::Raster(e.to_string()))
}

/// JPEG has no alpha channel; the white background makes every pixel
/// opaque, so the premultiplied pixmap data is plain RGBA.
pub fn to_jpeg(svg: &str) -> Result<Vec<u8>> {
  let pixmap = rasterise(svg)?;
  let image = RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.data().to_vec())
    .ok_or_else(|| Error::Raster("pixmap size does not match its dimensions".into()))?;
  let rgb = DynamicImage::ImageRgba8(image).to_rgb8();

  let mut bytes = Vec::new();
  JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&rgb)?;
  Ok(bytes)
}

/// Encode rendered SVG in the requested file format.
pub fn encode(svg: &str, format: FileFormat) -> Result<Vec<u8>> {
  match format {
    FileFormat::Svg => Ok(svg.as_bytes().to_vec()),
    FileFormat::Png => to_png(svg),
    FileFormat::Jpg | FileFormat::Jpeg => to_jpeg(svg),
  }
}

pub fn content_type(format: FileFormat) -> &'static str {
  match format {
    FileFormat::Svg => "image/svg+xml",
    FileFormat::Png => "image/png",
    FileFormat::Jpg | FileFormat::Jpeg => "image/jpeg",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SQUARE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect x="0" y="0" width="10" height="10" fill="rgb(0,0,255)"/></svg>"#;

  #[test]
  fn png_has_the_signature() {
    let png = to_png(SQUARE).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
  }

  #[test]
  fn jpeg_has_the_signature() {
    let jpeg = encode(SQUARE, FileFormat::Jpeg).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
  }

  #[test]
  fn svg_passes_through() {
    assert_eq!(encode(SQUARE, FileFormat::Svg).unwrap(), SQUARE.as_bytes());
    assert_eq!(content_type(FileFormat::Jpg), "image/jpeg");
  }
}
