use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::pipeline::processing_service::{FrameReport, ProcessingService};
use crate::shared::frame::Frame;

/// One in flight plus one waiting. Anything beyond that is stale by the time
/// the worker would reach it.
const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Result of handing a frame to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The queue was full; the frame was discarded.
    Dropped,
    /// The worker has stopped.
    Closed,
}

/// Counters reported when the worker shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub captured: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dropped: usize,
}

/// Runs [`ProcessingService::process_frame`] on a dedicated thread.
///
/// Layout: `camera callback → bounded queue → worker → service`
///
/// The camera side never blocks: when the worker is busy and the queue is
/// full, newer frames are dropped instead of piling up.
pub struct FrameWorker {
    frame_tx: Option<Sender<Frame>>,
    handle: Option<JoinHandle<WorkerStats>>,
    cancelled: Arc<AtomicBool>,
    dropped: AtomicUsize,
}

impl FrameWorker {
    pub fn spawn(service: Arc<ProcessingService>) -> Self {
        Self::with_capacity(service, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(service: Arc<ProcessingService>, capacity: usize) -> Self {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Frame>(capacity.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = spawn_worker(service, frame_rx, cancelled.clone());
        Self {
            frame_tx: Some(frame_tx),
            handle: Some(handle),
            cancelled,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Hands a frame to the worker without blocking.
    pub fn submit(&self, frame: Frame) -> Submission {
        let Some(tx) = &self.frame_tx else {
            return Submission::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => Submission::Queued,
            Err(TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("Worker busy, dropping frame {}", frame.index());
                Submission::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Submission::Closed,
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops accepting frames, lets the worker drain its queue and joins it.
    pub fn shutdown(mut self) -> WorkerStats {
        self.join()
    }

    fn join(&mut self) -> WorkerStats {
        drop(self.frame_tx.take());
        let mut stats = match self.handle.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                log::error!("Frame worker thread panicked");
                WorkerStats::default()
            }
            None => WorkerStats::default(),
        };
        stats.dropped = self.dropped();
        stats
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancelled.store(true, Ordering::Relaxed);
            self.join();
        }
    }
}

fn spawn_worker(
    service: Arc<ProcessingService>,
    frame_rx: Receiver<Frame>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<WorkerStats> {
    std::thread::spawn(move || {
        let mut stats = WorkerStats::default();
        for frame in frame_rx {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            match service.process_frame(&frame) {
                Ok(FrameReport::Captured { .. }) => {
                    stats.processed += 1;
                    stats.captured += 1;
                }
                Ok(FrameReport::Processed { .. }) => stats.processed += 1,
                Ok(FrameReport::Skipped | FrameReport::Stale) => stats.skipped += 1,
                Err(e) => {
                    log::warn!("Frame {} failed: {e}", frame.index());
                    stats.failed += 1;
                }
            }
        }
        stats
    })
}
