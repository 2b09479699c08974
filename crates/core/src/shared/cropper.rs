use std::sync::Arc;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::shared::error::CardError;
use crate::shared::frame::Frame;
use crate::shared::quad::Candidate;

const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 220, 90]);
const CORNER_RADIUS: i32 = 3;

/// A confirmed candidate together with its source frame and, once
/// rectified, the cropped card image.
///
/// The frame is an explicit copy so the capture can outlive the camera's
/// buffer.
#[derive(Clone, Debug)]
pub struct Cropper {
    candidate: Candidate,
    original: Arc<Frame>,
    cropped: Option<RgbImage>,
}

impl Cropper {
    /// Pairs a candidate with its frame.
    ///
    /// Fails with `DegenerateGeometry` if the candidate breaks
    /// [`Cropper::check_geometry`].
    pub fn new(candidate: Candidate, original: Arc<Frame>) -> Result<Self, CardError> {
        Self::check_geometry(&candidate, original.width(), original.height())?;
        Ok(Self {
            candidate,
            original,
            cropped: None,
        })
    }

    /// A capturable candidate is a convex, non-degenerate quadrilateral lying
    /// inside a `width` x `height` frame.
    pub fn check_geometry(candidate: &Candidate, width: u32, height: u32) -> Result<(), CardError> {
        let quad = &candidate.quad;
        if !quad.is_convex() {
            return Err(CardError::DegenerateGeometry(format!(
                "candidate from frame {} is not a convex quadrilateral",
                candidate.frame_index
            )));
        }
        if !quad.within(width, height) {
            return Err(CardError::DegenerateGeometry(format!(
                "candidate from frame {} leaves the {width}x{height} frame",
                candidate.frame_index
            )));
        }
        Ok(())
    }

    pub fn with_cropped(mut self, cropped: RgbImage) -> Self {
        self.cropped = Some(cropped);
        self
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn original(&self) -> &Frame {
        &self.original
    }

    pub fn cropped(&self) -> Option<&RgbImage> {
        self.cropped.as_ref()
    }

    /// The original frame with the card outline drawn over it.
    pub fn annotated(&self) -> Result<RgbImage, CardError> {
        let mut canvas = self.original.to_rgb_image()?;
        let corners = self.candidate.quad.as_tuples();
        for i in 0..4 {
            draw_line_segment_mut(&mut canvas, corners[i], corners[(i + 1) % 4], OUTLINE_COLOR);
        }
        for (x, y) in corners {
            draw_filled_circle_mut(
                &mut canvas,
                (x.round() as i32, y.round() as i32),
                CORNER_RADIUS,
                OUTLINE_COLOR,
            );
        }
        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::quad::{Point, Quadrilateral};

    fn frame() -> Arc<Frame> {
        Arc::new(Frame::new(vec![0u8; 100 * 80 * 3], 100, 80, 3, 4))
    }

    fn candidate(corners: [Point; 4]) -> Candidate {
        Candidate::new(Quadrilateral::new(corners), 4)
    }

    fn valid() -> Candidate {
        candidate([
            Point::new(10.0, 10.0),
            Point::new(90.0, 10.0),
            Point::new(90.0, 60.0),
            Point::new(10.0, 60.0),
        ])
    }

    #[test]
    fn test_valid_candidate_is_accepted() {
        let cropper = Cropper::new(valid(), frame()).unwrap();
        assert_eq!(cropper.original().index(), 4);
        assert!(cropper.cropped().is_none());
    }

    #[test]
    fn test_collinear_candidate_is_rejected() {
        let c = candidate([
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(30.0, 30.0),
            Point::new(30.0, 30.0),
        ]);
        assert!(matches!(
            Cropper::new(c, frame()),
            Err(CardError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_candidate_is_rejected() {
        let c = candidate([
            Point::new(10.0, 10.0),
            Point::new(150.0, 10.0),
            Point::new(150.0, 60.0),
            Point::new(10.0, 60.0),
        ]);
        assert!(Cropper::new(c, frame()).is_err());
    }

    #[test]
    fn test_crossed_corners_fail_geometry_check() {
        let bowtie = candidate([
            Point::new(10.0, 10.0),
            Point::new(90.0, 60.0),
            Point::new(90.0, 10.0),
            Point::new(10.0, 60.0),
        ]);
        assert!(matches!(
            Cropper::check_geometry(&bowtie, 100, 80),
            Err(CardError::DegenerateGeometry(_))
        ));
        assert!(Cropper::check_geometry(&valid(), 100, 80).is_ok());
        assert!(Cropper::check_geometry(&valid(), 50, 50).is_err());
    }

    #[test]
    fn test_with_cropped_stores_image() {
        let cropper = Cropper::new(valid(), frame())
            .unwrap()
            .with_cropped(RgbImage::new(8, 5));
        assert_eq!(cropper.cropped().unwrap().dimensions(), (8, 5));
    }

    #[test]
    fn test_annotated_draws_outline_on_copy() {
        let original = frame();
        let cropper = Cropper::new(valid(), original.clone()).unwrap();
        let annotated = cropper.annotated().unwrap();
        assert_eq!(annotated.get_pixel(50, 10).0, OUTLINE_COLOR.0);
        assert_eq!(annotated.get_pixel(50, 35).0, [0, 0, 0]);
        assert!(original.data().iter().all(|&b| b == 0));
    }
}
