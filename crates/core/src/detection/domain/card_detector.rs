use crate::shared::error::CardError;
use crate::shared::frame::Frame;
use crate::shared::quad::Candidate;

/// Domain interface for per-frame card detection.
///
/// Detection is a pure function of the frame and the detector's
/// configuration, hence `&self`. `Ok(None)` is the normal "no card" outcome;
/// only malformed frames produce an error.
pub trait CardDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Option<Candidate>, CardError>;
}
