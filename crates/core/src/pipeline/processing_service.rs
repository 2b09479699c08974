use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;

use crate::accumulation::candidate_accumulator::{
    AccumulatorSignal, AccumulatorState, CandidateAccumulator,
};
use crate::detection::domain::card_detector::CardDetector;
use crate::detection::infrastructure::contour_card_detector::ContourCardDetector;
use crate::pipeline::scan_logger::{NullScanLogger, ScanLogger, Stage};
use crate::rectification::domain::image_rectifier::ImageRectifier;
use crate::rectification::infrastructure::perspective_rectifier::PerspectiveRectifier;
use crate::shared::config::ScanConfig;
use crate::shared::cropper::Cropper;
use crate::shared::error::CardError;
use crate::shared::frame::Frame;
use crate::shared::quad::Candidate;

/// Notifications published to observers of a [`ProcessingService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Running candidate count after a processed frame.
    CandidateCount(usize),
    /// A card was captured and its crop is available.
    Captured {
        frame_index: usize,
        width: u32,
        height: u32,
    },
    /// Capture state was cleared and collection re-armed.
    Cleared,
}

/// Outcome of [`ProcessingService::process_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameReport {
    /// Detection ran; `candidate` is what was offered to the accumulator.
    Processed {
        candidate: Option<Candidate>,
        count: usize,
    },
    /// This frame triggered a capture.
    Captured { candidate: Candidate, count: usize },
    /// A capture is pending; the frame was not analysed.
    Skipped,
    /// `clear()` ran while the frame was in flight; its result was dropped.
    Stale,
}

struct ServiceState {
    accumulator: CandidateAccumulator,
    capture: Option<Cropper>,
    /// Bumped by `clear()` so in-flight results can be recognised as stale.
    generation: u64,
    subscribers: Vec<Sender<ScanEvent>>,
    logger: Box<dyn ScanLogger>,
}

impl ServiceState {
    fn publish(&mut self, event: ScanEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Orchestrates detection → accumulation → rectification for a frame
/// stream.
///
/// The service is explicitly constructed and shared by `Arc`; it is `Sync`
/// so a background frame path and a UI path can call into it concurrently.
/// Detection and rectification run without holding the state lock; all
/// mutable state sits behind one mutex.
pub struct ProcessingService {
    detector: Box<dyn CardDetector>,
    rectifier: Box<dyn ImageRectifier>,
    state: Mutex<ServiceState>,
}

impl ProcessingService {
    pub fn new(
        detector: Box<dyn CardDetector>,
        rectifier: Box<dyn ImageRectifier>,
        accumulator: CandidateAccumulator,
    ) -> Self {
        Self {
            detector,
            rectifier,
            state: Mutex::new(ServiceState {
                accumulator,
                capture: None,
                generation: 0,
                subscribers: Vec::new(),
                logger: Box::new(NullScanLogger),
            }),
        }
    }

    /// Builds the default contour detector / perspective rectifier stack.
    pub fn from_config(config: &ScanConfig) -> Result<Self, CardError> {
        config.validate()?;
        Ok(Self::new(
            Box::new(ContourCardDetector::new(config.detector.clone())),
            Box::new(PerspectiveRectifier::new(config.rectifier.clone())?),
            CandidateAccumulator::from_config(&config.accumulator)?,
        ))
    }

    pub fn with_logger(self, logger: Box<dyn ScanLogger>) -> Self {
        self.lock().logger = logger;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Runs one frame through the pipeline.
    ///
    /// `InvalidFrame` is returned (and logged) for malformed frames; the
    /// caller should simply continue with the next frame.
    pub fn process_frame(&self, frame: &Frame) -> Result<FrameReport, CardError> {
        let generation = {
            let state = self.lock();
            if state.accumulator.state() == AccumulatorState::Triggered {
                return Ok(FrameReport::Skipped);
            }
            state.generation
        };

        let started = Instant::now();
        let detected = self.detector.detect(frame).map_err(|e| {
            log::warn!("Skipping frame {}: {e}", frame.index());
            e
        })?;
        let candidate = detected.filter(|c| self.is_capturable(c, frame));
        let detect_elapsed = started.elapsed();

        let mut state = self.lock();
        if state.generation != generation {
            return Ok(FrameReport::Stale);
        }
        state.logger.stage(Stage::Detect, detect_elapsed);

        let report = match state.accumulator.offer(candidate) {
            AccumulatorSignal::Pending { count } => FrameReport::Processed { candidate, count },
            AccumulatorSignal::Suppressed => return Ok(FrameReport::Skipped),
            AccumulatorSignal::Trigger { candidate, count } => {
                drop(state);
                let started = Instant::now();
                let captured = self.capture(frame, candidate);
                state = self.lock();
                state.logger.stage(Stage::Rectify, started.elapsed());
                // Checked and stored under one guard so a clear() cannot slip
                // in between.
                if state.generation != generation {
                    return Ok(FrameReport::Stale);
                }
                match captured {
                    Ok(cropper) => {
                        let (width, height) = cropper
                            .cropped()
                            .map(|img| img.dimensions())
                            .unwrap_or_default();
                        state.capture = Some(cropper);
                        state.logger.captured(frame.index(), width, height);
                        state.publish(ScanEvent::Captured {
                            frame_index: frame.index(),
                            width,
                            height,
                        });
                        FrameReport::Captured { candidate, count }
                    }
                    Err(e) => {
                        log::warn!("Capture from frame {} failed: {e}", frame.index());
                        state.accumulator.retract_trigger();
                        let count = state.accumulator.count();
                        if !e.is_missed_detection() {
                            state.publish(ScanEvent::CandidateCount(count));
                            return Err(e);
                        }
                        FrameReport::Processed {
                            candidate: None,
                            count,
                        }
                    }
                }
            }
        };

        let count = state.accumulator.count();
        state.logger.frame(frame.index(), count);
        state.publish(ScanEvent::CandidateCount(count));
        Ok(report)
    }

    /// Whether `candidate` may be offered: it must satisfy the capture
    /// geometry and admit a rectifying transform. Anything else is a miss.
    fn is_capturable(&self, candidate: &Candidate, frame: &Frame) -> bool {
        let checked = Cropper::check_geometry(candidate, frame.width(), frame.height())
            .and_then(|()| self.rectifier.check(candidate));
        match checked {
            Ok(()) => true,
            Err(e) if e.is_missed_detection() => {
                log::debug!("Frame {}: treating candidate as a miss: {e}", frame.index());
                false
            }
            Err(e) => {
                log::warn!("Frame {}: candidate rejected: {e}", frame.index());
                false
            }
        }
    }

    fn capture(&self, frame: &Frame, candidate: Candidate) -> Result<Cropper, CardError> {
        let cropped = self.rectifier.rectify(frame, &candidate)?;
        Ok(Cropper::new(candidate, Arc::new(frame.clone()))?.with_cropped(cropped))
    }

    /// The most recent crop, if one was captured since the last clear.
    pub fn get_cropped_image(&self) -> Result<RgbImage, CardError> {
        self.lock()
            .capture
            .as_ref()
            .and_then(|c| c.cropped())
            .cloned()
            .ok_or(CardError::NoImageAvailable)
    }

    /// The full capture (candidate, original frame and crop).
    pub fn last_capture(&self) -> Option<Cropper> {
        self.lock().capture.clone()
    }

    /// Drops any capture and re-arms collection.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.accumulator.reset();
        state.capture = None;
        state.generation += 1;
        state.logger.cleared();
        state.publish(ScanEvent::Cleared);
    }

    pub fn set_capture_available(&self, available: bool) {
        self.lock().accumulator.set_capture_available(available);
    }

    pub fn candidate_count(&self) -> usize {
        self.lock().accumulator.count()
    }

    /// True while a capture is pending and frames are being skipped.
    pub fn is_triggered(&self) -> bool {
        self.lock().accumulator.state() == AccumulatorState::Triggered
    }

    /// Registers an observer. Events are delivered at least once per
    /// processed frame; dropped receivers are pruned on the next publish.
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Forwards to the logger's end-of-stream summary.
    pub fn summary(&self) {
        self.lock().logger.summary();
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::quad::{Point, Quadrilateral};
    use rstest::rstest;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    // --- Stubs ---

    /// Returns a fixed candidate for frame indices in `hits`.
    struct StubDetector {
        hits: HashMap<usize, Quadrilateral>,
        calls: Arc<AtomicUsize>,
    }

    impl StubDetector {
        fn new(hits: impl IntoIterator<Item = (usize, Quadrilateral)>) -> Self {
            Self {
                hits: hits.into_iter().collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CardDetector for StubDetector {
        fn detect(&self, frame: &Frame) -> Result<Option<Candidate>, CardError> {
            frame.validate()?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .hits
                .get(&frame.index())
                .map(|q| Candidate::new(*q, frame.index())))
        }
    }

    /// Parks inside `detect` until released.
    struct GatedDetector {
        inner: StubDetector,
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl CardDetector for GatedDetector {
        fn detect(&self, frame: &Frame) -> Result<Option<Candidate>, CardError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            self.inner.detect(frame)
        }
    }

    /// Parks inside `rectify` until released.
    struct GatedRectifier {
        inner: PerspectiveRectifier,
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl ImageRectifier for GatedRectifier {
        fn check(&self, candidate: &Candidate) -> Result<(), CardError> {
            self.inner.check(candidate)
        }

        fn rectify(&self, frame: &Frame, candidate: &Candidate) -> Result<RgbImage, CardError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            self.inner.rectify(frame, candidate)
        }
    }

    /// Accepts every candidate up front, then fails the warp.
    struct FailingRectifier(fn() -> CardError);

    impl ImageRectifier for FailingRectifier {
        fn check(&self, _candidate: &Candidate) -> Result<(), CardError> {
            Ok(())
        }

        fn rectify(&self, _frame: &Frame, _candidate: &Candidate) -> Result<RgbImage, CardError> {
            Err((self.0)())
        }
    }

    fn gate() -> (Sender<()>, Receiver<()>) {
        crossbeam_channel::bounded(1)
    }

    fn card_quad() -> Quadrilateral {
        Quadrilateral::new([
            Point::new(10.0, 10.0),
            Point::new(90.0, 10.0),
            Point::new(90.0, 60.0),
            Point::new(10.0, 60.0),
        ])
    }

    fn collinear_quad() -> Quadrilateral {
        Quadrilateral::new([
            Point::new(10.0, 10.0),
            Point::new(40.0, 40.0),
            Point::new(70.0, 70.0),
            Point::new(70.0, 70.0),
        ])
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![128u8; 100 * 80 * 3], 100, 80, 3, index)
    }

    fn service(detector: StubDetector) -> ProcessingService {
        ProcessingService::new(
            Box::new(detector),
            Box::new(PerspectiveRectifier::default()),
            CandidateAccumulator::default(),
        )
    }

    fn hits(range: std::ops::Range<usize>) -> Vec<(usize, Quadrilateral)> {
        range.map(|i| (i, card_quad())).collect()
    }

    #[test]
    fn test_no_image_before_capture() {
        let svc = service(StubDetector::new([]));
        assert!(matches!(
            svc.get_cropped_image(),
            Err(CardError::NoImageAvailable)
        ));
        assert!(svc.last_capture().is_none());
    }

    #[test]
    fn test_capture_on_eleventh_hit() {
        let svc = service(StubDetector::new(hits(0..20)));
        for i in 0..10 {
            let report = svc.process_frame(&frame(i)).unwrap();
            assert!(matches!(report, FrameReport::Processed { count, .. } if count == i + 1));
        }
        let report = svc.process_frame(&frame(10)).unwrap();
        assert!(matches!(report, FrameReport::Captured { count: 11, .. }));

        let image = svc.get_cropped_image().unwrap();
        assert_eq!(image.dimensions(), (80, 50));
        assert_eq!(svc.last_capture().unwrap().original().index(), 10);
        assert!(svc.is_triggered());
    }

    #[test]
    fn test_frames_after_capture_are_skipped_without_detection() {
        let detector = StubDetector::new(hits(0..20));
        let calls = detector.calls.clone();
        let svc = service(detector);
        for i in 0..11 {
            svc.process_frame(&frame(i)).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 11);

        for i in 11..15 {
            assert_eq!(svc.process_frame(&frame(i)).unwrap(), FrameReport::Skipped);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_clear_rearms_and_drops_image() {
        let svc = service(StubDetector::new(hits(0..30)));
        for i in 0..11 {
            svc.process_frame(&frame(i)).unwrap();
        }
        svc.clear();

        assert!(matches!(
            svc.get_cropped_image(),
            Err(CardError::NoImageAvailable)
        ));
        assert_eq!(svc.candidate_count(), 0);
        assert!(!svc.is_triggered());
        assert!(matches!(
            svc.process_frame(&frame(11)).unwrap(),
            FrameReport::Processed { count: 1, .. }
        ));
    }

    #[test]
    fn test_degenerate_candidate_does_not_increment() {
        let detector = StubDetector::new([(0, card_quad()), (1, collinear_quad()), (2, card_quad())]);
        let svc = service(detector);

        svc.process_frame(&frame(0)).unwrap();
        let report = svc.process_frame(&frame(1)).unwrap();
        assert_eq!(
            report,
            FrameReport::Processed {
                candidate: None,
                count: 1
            }
        );
        svc.process_frame(&frame(2)).unwrap();
        assert_eq!(svc.candidate_count(), 2);
    }

    #[test]
    fn test_invalid_frame_is_reported_and_stream_continues() {
        let svc = service(StubDetector::new(hits(0..5)));
        let bad = Frame::new(vec![0u8; 3], 100, 80, 3, 0);
        assert!(matches!(
            svc.process_frame(&bad),
            Err(CardError::InvalidFrame(_))
        ));
        assert!(matches!(
            svc.process_frame(&frame(1)).unwrap(),
            FrameReport::Processed { count: 1, .. }
        ));
    }

    #[test]
    fn test_capture_unavailable_blocks_trigger() {
        let svc = service(StubDetector::new(hits(0..30)));
        svc.set_capture_available(false);
        for i in 0..15 {
            assert!(matches!(
                svc.process_frame(&frame(i)).unwrap(),
                FrameReport::Processed { .. }
            ));
        }
        svc.set_capture_available(true);
        assert!(matches!(
            svc.process_frame(&frame(15)).unwrap(),
            FrameReport::Captured { .. }
        ));
    }

    #[test]
    fn test_subscribers_see_counts_capture_and_clear() {
        let svc = service(StubDetector::new(hits(2..20)));
        let rx = svc.subscribe();

        for i in 0..13 {
            svc.process_frame(&frame(i)).unwrap();
        }
        svc.process_frame(&frame(13)).unwrap(); // skipped, no event
        svc.clear();

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        let counts: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::CandidateCount(c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(
            events.iter().filter(|e| matches!(e, ScanEvent::Captured { .. })).count(),
            1
        );
        assert!(matches!(
            events[events.len() - 3],
            ScanEvent::Captured { frame_index: 12, width: 80, height: 50 }
        ));
        assert_eq!(events.last(), Some(&ScanEvent::Cleared));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let svc = service(StubDetector::new([]));
        drop(svc.subscribe());
        let rx = svc.subscribe();
        svc.process_frame(&frame(0)).unwrap();
        assert_eq!(svc.lock().subscribers.len(), 1);
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::CandidateCount(0));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = ScanConfig::default();
        config.accumulator.capacity = 2;
        assert!(matches!(
            ProcessingService::from_config(&config),
            Err(CardError::Config(_))
        ));
        assert!(ProcessingService::from_config(&ScanConfig::default()).is_ok());
    }

    #[test]
    fn test_service_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProcessingService>();
    }

    #[test]
    fn test_clear_during_detection_makes_frame_stale() {
        let (entered_tx, entered_rx) = gate();
        let (release_tx, release_rx) = gate();
        let svc = Arc::new(ProcessingService::new(
            Box::new(GatedDetector {
                inner: StubDetector::new(hits(0..5)),
                entered: entered_tx,
                release: release_rx,
            }),
            Box::new(PerspectiveRectifier::default()),
            CandidateAccumulator::default(),
        ));
        let rx = svc.subscribe();

        let handle = thread::spawn({
            let svc = svc.clone();
            move || svc.process_frame(&frame(0))
        });
        entered_rx.recv().unwrap();
        svc.clear();
        release_tx.send(()).unwrap();

        assert_eq!(handle.join().unwrap().unwrap(), FrameReport::Stale);
        assert_eq!(svc.candidate_count(), 0);
        let events: Vec<ScanEvent> = rx.try_iter().collect();
        assert_eq!(events, vec![ScanEvent::Cleared]);
    }

    #[test]
    fn test_clear_during_rectification_discards_capture() {
        let (entered_tx, entered_rx) = gate();
        let (release_tx, release_rx) = gate();
        let svc = Arc::new(ProcessingService::new(
            Box::new(StubDetector::new(hits(0..5))),
            Box::new(GatedRectifier {
                inner: PerspectiveRectifier::default(),
                entered: entered_tx,
                release: release_rx,
            }),
            CandidateAccumulator::new(0, 4).unwrap(),
        ));

        let handle = thread::spawn({
            let svc = svc.clone();
            move || svc.process_frame(&frame(0))
        });
        entered_rx.recv().unwrap();
        svc.clear();
        release_tx.send(()).unwrap();

        assert_eq!(handle.join().unwrap().unwrap(), FrameReport::Stale);
        assert!(matches!(
            svc.get_cropped_image(),
            Err(CardError::NoImageAvailable)
        ));
        assert!(svc.last_capture().is_none());
        assert!(!svc.is_triggered());
        assert_eq!(svc.candidate_count(), 0);
    }

    #[rstest]
    #[case::leaves_frame(Quadrilateral::new([
        Point::new(10.0, 10.0),
        Point::new(170.0, 10.0),
        Point::new(170.0, 110.0),
        Point::new(10.0, 110.0),
    ]))]
    #[case::crossed(Quadrilateral::new([
        Point::new(10.0, 10.0),
        Point::new(90.0, 60.0),
        Point::new(90.0, 10.0),
        Point::new(10.0, 60.0),
    ]))]
    fn test_uncapturable_candidates_count_as_misses(#[case] quad: Quadrilateral) {
        let svc = service(StubDetector::new((0..15).map(|i| (i, quad))));
        for i in 0..15 {
            assert_eq!(
                svc.process_frame(&frame(i)).unwrap(),
                FrameReport::Processed {
                    candidate: None,
                    count: 0
                },
                "frame {i}"
            );
        }
        assert!(svc.last_capture().is_none());
    }

    #[test]
    fn test_failed_warp_after_trigger_keeps_earlier_candidates() {
        let svc = ProcessingService::new(
            Box::new(StubDetector::new(hits(0..20))),
            Box::new(FailingRectifier(|| {
                CardError::DegenerateGeometry("singular transform".into())
            })),
            CandidateAccumulator::default(),
        );
        for i in 0..10 {
            svc.process_frame(&frame(i)).unwrap();
        }

        for i in 10..13 {
            assert_eq!(
                svc.process_frame(&frame(i)).unwrap(),
                FrameReport::Processed {
                    candidate: None,
                    count: 10
                }
            );
            assert!(!svc.is_triggered());
        }
        assert!(svc.last_capture().is_none());
    }

    #[test]
    fn test_hard_warp_error_is_returned_and_collection_resumes() {
        let svc = ProcessingService::new(
            Box::new(StubDetector::new(hits(0..20))),
            Box::new(FailingRectifier(|| CardError::InvalidFrame("truncated".into()))),
            CandidateAccumulator::default(),
        );
        let rx = svc.subscribe();
        for i in 0..10 {
            svc.process_frame(&frame(i)).unwrap();
        }

        assert!(matches!(
            svc.process_frame(&frame(10)),
            Err(CardError::InvalidFrame(_))
        ));
        assert_eq!(svc.candidate_count(), 10);
        assert!(!svc.is_triggered());
        assert_eq!(rx.try_iter().last(), Some(ScanEvent::CandidateCount(10)));
    }
}
