use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::rectification::domain::image_rectifier::ImageRectifier;
use crate::shared::config::RectifierConfig;
use crate::shared::error::CardError;
use crate::shared::frame::Frame;
use crate::shared::quad::{Candidate, Quadrilateral};

const FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Perspective-corrects a card quadrilateral into an upright rectangle.
///
/// The output keeps the card's orientation (landscape quads give landscape
/// crops) and has the configured aspect ratio. Its long side follows the
/// detected card size, capped at `max_long_side`.
pub struct PerspectiveRectifier {
    config: RectifierConfig,
}

impl PerspectiveRectifier {
    /// Fails with `Config` for a zero size cap or an aspect ratio below 1.
    pub fn new(config: RectifierConfig) -> Result<Self, CardError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Output dimensions for `quad`.
    pub fn output_size(&self, quad: &Quadrilateral) -> (u32, u32) {
        let (w, h) = quad.side_lengths();
        let long = (w.max(h).round() as u32).clamp(1, self.config.max_long_side);
        let short = ((long as f32 / self.config.aspect_ratio).round() as u32).max(1);
        if quad.is_portrait() {
            (short, long)
        } else {
            (long, short)
        }
    }

    /// Transform from frame coordinates to output coordinates, together
    /// with the output size.
    pub fn projection(&self, candidate: &Candidate) -> Result<(Projection, (u32, u32)), CardError> {
        let quad = &candidate.quad;
        if quad.is_degenerate() {
            return Err(CardError::DegenerateGeometry(format!(
                "candidate from frame {} has collinear corners",
                candidate.frame_index
            )));
        }

        let (out_w, out_h) = self.output_size(quad);
        let (fw, fh) = (out_w as f32, out_h as f32);
        let to = [(0.0, 0.0), (fw, 0.0), (fw, fh), (0.0, fh)];

        let projection = Projection::from_control_points(quad.as_tuples(), to).ok_or_else(|| {
            CardError::DegenerateGeometry(format!(
                "singular transform for candidate from frame {}",
                candidate.frame_index
            ))
        })?;
        Ok((projection, (out_w, out_h)))
    }
}

impl Default for PerspectiveRectifier {
    fn default() -> Self {
        Self {
            config: RectifierConfig::default(),
        }
    }
}

impl ImageRectifier for PerspectiveRectifier {
    fn check(&self, candidate: &Candidate) -> Result<(), CardError> {
        self.projection(candidate).map(|_| ())
    }

    fn rectify(&self, frame: &Frame, candidate: &Candidate) -> Result<RgbImage, CardError> {
        let source = frame.to_rgb_image()?;
        let (projection, (out_w, out_h)) = self.projection(candidate)?;

        let mut output = RgbImage::new(out_w, out_h);
        warp_into(&source, &projection, Interpolation::Bilinear, FILL, &mut output);

        log::debug!(
            "Rectified frame {} into {out_w}x{out_h}",
            frame.index()
        );
        Ok(output)
    }
}
