use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::error::CardError;
use crate::shared::frame::Frame;
use crate::source::domain::frame_source::FrameSource;

/// Plays a list of still images back as a camera stream.
///
/// Each file becomes one RGB frame; frame indices follow list order. Files
/// are decoded lazily so a directory of large photos is never held in memory
/// at once.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
}

impl ImageSequenceSource {
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// All images directly inside `dir`, sorted by file name.
    pub fn from_dir(dir: &Path) -> Result<Self, CardError> {
        let io_err = |source| CardError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && is_image_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        log::debug!("Found {} images in {}", paths.len(), dir.display());
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Plays the sequence `passes` times, decoding each file as it is
    /// reached. Indices keep increasing across passes.
    pub fn replay(&self, passes: usize) -> impl Iterator<Item = Result<Frame, CardError>> + '_ {
        (0..passes)
            .flat_map(move |_| self.paths.iter())
            .enumerate()
            .map(|(index, path)| decode_frame(path, index))
    }
}

impl FrameSource for ImageSequenceSource {
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, CardError>> + '_> {
        Box::new(
            self.paths
                .iter()
                .enumerate()
                .map(|(index, path)| decode_frame(path, index)),
        )
    }
}

/// True if the extension is one of [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn decode_frame(path: &Path, index: usize) -> Result<Frame, CardError> {
    let image = image::open(path)?;
    Ok(Frame::from_rgb_image(image.to_rgb8(), index))
}
