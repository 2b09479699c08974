use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::shared::error::CardError;

/// A single camera frame: contiguous pixel bytes in row-major order.
///
/// Supports grayscale (1), RGB (3) and RGBA (4) layouts. Format conversion
/// happens at the detection and rectification boundaries only; the rest of
/// the core treats pixel data as opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    /// Builds a frame without checking its layout. Call [`Frame::validate`]
    /// (or any conversion) before trusting the buffer.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn from_rgb_image(image: RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Same pixels under a new stream position.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }

    /// Checks dimensions, channel layout and buffer length.
    pub fn validate(&self) -> Result<(), CardError> {
        if self.width == 0 || self.height == 0 {
            return Err(CardError::InvalidFrame(format!(
                "frame {} has zero dimension ({}x{})",
                self.index, self.width, self.height
            )));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(CardError::InvalidFrame(format!(
                "frame {} has unsupported channel count {}",
                self.index, self.channels
            )));
        }
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.data.len() != expected {
            return Err(CardError::InvalidFrame(format!(
                "frame {} buffer holds {} bytes, expected {expected}",
                self.index,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Single-intensity view used by detection.
    pub fn to_gray_image(&self) -> Result<GrayImage, CardError> {
        Ok(match self.to_dynamic()? {
            DynamicImage::ImageLuma8(gray) => gray,
            other => other.to_luma8(),
        })
    }

    /// Colour view used by rectification and previews.
    pub fn to_rgb_image(&self) -> Result<RgbImage, CardError> {
        Ok(match self.to_dynamic()? {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        })
    }

    fn to_dynamic(&self) -> Result<DynamicImage, CardError> {
        self.validate()?;
        let (w, h) = (self.width, self.height);
        let data = self.data.clone();
        let image = match self.channels {
            1 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            _ => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(|| {
            CardError::InvalidFrame(format!("frame {} buffer does not fit its dimensions", self.index))
        })
    }
}
