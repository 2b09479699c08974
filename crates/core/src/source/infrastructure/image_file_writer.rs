use std::path::Path;

use image::RgbImage;

use crate::shared::error::CardError;
use crate::source::domain::image_writer::ImageWriter;

/// Writes card images with the `image` crate, creating parent directories.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, image: &RgbImage) -> Result<(), CardError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CardError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        image.save(path)?;
        log::debug!(
            "Wrote {}x{} image to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(())
    }
}
