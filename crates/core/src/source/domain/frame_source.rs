use crate::shared::error::CardError;
use crate::shared::frame::Frame;

/// Supplies frames to the scanner, typically a camera preview stream.
///
/// Frames are yielded in capture order with increasing indices. A failed
/// frame does not end the stream; callers decide whether to continue.
pub trait FrameSource: Send {
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, CardError>> + '_>;
}
