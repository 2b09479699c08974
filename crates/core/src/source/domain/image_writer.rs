use std::path::Path;

use image::RgbImage;

use crate::shared::error::CardError;

/// Persists a captured card image.
pub trait ImageWriter: Send {
    /// Writes `image` to `path`; the format follows the file extension.
    fn write(&self, path: &Path, image: &RgbImage) -> Result<(), CardError>;
}
