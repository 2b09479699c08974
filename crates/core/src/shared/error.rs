use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the card scanning core.
///
/// None of these are fatal: the frame stream simply continues with the next
/// frame after logging.
#[derive(Error, Debug)]
pub enum CardError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("no cropped image available")]
    NoImageAvailable,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CardError {
    /// True for errors that only mean "no card in this frame".
    pub fn is_missed_detection(&self) -> bool {
        matches!(self, CardError::DegenerateGeometry(_))
    }
}
