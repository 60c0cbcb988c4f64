use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("Invalid file format, must be `svg`")]
  InvalidFileFormat,

  #[error("no plots to draw")]
  NoPlots,

  #[error("This number is to large to be formatted for the simplified chart.")]
  NumberTooLarge(f64),

  #[error("svg write error: {0}")]
  Io(#[from] std::io::Error),

  #[error("svg parse error: {0}")]
  Xml(#[from] quick_xml::Error),

  #[error("svg render error: {0}")]
  Render(#[from] resvg::usvg::Error),

  #[error("raster error: {0}")]
  Raster(String),

  #[error("image encode error: {0}")]
  Image(#[from] image::ImageError),

  #[error("figure serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Errors caused by the request rather than by rendering.
  pub fn is_client_error(&self) -> bool {
    matches!(self, Error::InvalidFileFormat | Error::NoPlots)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
