use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;

use crate::detection::domain::card_detector::CardDetector;
use crate::detection::infrastructure::contour_math::approximate_quad;
use crate::shared::config::DetectorConfig;
use crate::shared::error::CardError;
use crate::shared::frame::Frame;
use crate::shared::quad::{Candidate, Quadrilateral};

/// Dilation radius used to close one- or two-pixel gaps Canny leaves at
/// corners.
const EDGE_DILATION: u8 = 2;

/// Finds card-shaped quadrilaterals via edges and border following.
///
/// Pipeline: grayscale → Gaussian blur → Canny → dilation → contours →
/// Douglas-Peucker to four vertices → convexity, area and aspect filters.
/// The largest surviving quadrilateral wins.
pub struct ContourCardDetector {
    config: DetectorConfig,
}

impl ContourCardDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn edge_map(&self, gray: &GrayImage) -> GrayImage {
        let blurred = gaussian_blur_f32(gray, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);
        dilate(&edges, Norm::LInf, EDGE_DILATION)
    }

    /// Applies the geometric filters to a quadrilateral found in `frame`.
    fn accepts(&self, quad: &Quadrilateral, frame: &Frame) -> bool {
        if !quad.is_convex() || !quad.within(frame.width(), frame.height()) {
            return false;
        }

        let area_ratio = quad.area() / frame.area();
        if area_ratio < self.config.min_area_ratio || area_ratio > self.config.max_area_ratio {
            return false;
        }

        (quad.aspect_ratio() - self.config.aspect_ratio).abs() <= self.config.aspect_tolerance
    }
}

impl Default for ContourCardDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl CardDetector for ContourCardDetector {
    fn detect(&self, frame: &Frame) -> Result<Option<Candidate>, CardError> {
        let gray = frame.to_gray_image()?;
        let edges = self.edge_map(&gray);
        let contours = find_contours::<i32>(&edges);

        let best = contours
            .iter()
            .filter_map(|contour| approximate_quad(&contour.points, self.config.approx_epsilon))
            .map(Quadrilateral::from_unordered)
            .filter(|quad| self.accepts(quad, frame))
            .max_by(|a, b| a.area().total_cmp(&b.area()));

        log::debug!(
            "Frame {}: {} contours, card {}",
            frame.index(),
            contours.len(),
            if best.is_some() { "found" } else { "not found" }
        );

        Ok(best.map(|quad| Candidate::new(quad, frame.index())))
    }
}
