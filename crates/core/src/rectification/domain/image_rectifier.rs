use image::RgbImage;

use crate::shared::error::CardError;
use crate::shared::frame::Frame;
use crate::shared::quad::Candidate;

/// Domain interface for turning a detected card into an upright crop.
pub trait ImageRectifier: Send + Sync {
    /// Checks that `candidate` can be rectified without touching pixels.
    ///
    /// Fails with `DegenerateGeometry` exactly when [`rectify`](Self::rectify)
    /// would.
    fn check(&self, candidate: &Candidate) -> Result<(), CardError>;

    /// Deskews and crops the card out of `frame`.
    fn rectify(&self, frame: &Frame, candidate: &Candidate) -> Result<RgbImage, CardError>;
}
