use std::time::{Duration, Instant};

/// Timed stages of a scanned frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detect,
    Rectify,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Detect => "detect",
            Stage::Rectify => "rectify",
        }
    }
}

/// Observer for scanning telemetry.
///
/// The service reports every analysed frame, every stage timing and the
/// capture/clear lifecycle. Implementations must keep bounded state: a camera
/// stream has no end.
pub trait ScanLogger: Send {
    fn stage(&mut self, stage: Stage, elapsed: Duration);

    /// A frame went through the accumulator; `candidates` is the running count.
    fn frame(&mut self, frame_index: usize, candidates: usize);

    fn captured(&mut self, frame_index: usize, width: u32, height: u32);

    fn cleared(&mut self);

    /// End-of-stream report. Default: nothing.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullScanLogger;

impl ScanLogger for NullScanLogger {
    fn stage(&mut self, _stage: Stage, _elapsed: Duration) {}
    fn frame(&mut self, _frame_index: usize, _candidates: usize) {}
    fn captured(&mut self, _frame_index: usize, _width: u32, _height: u32) {}
    fn cleared(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageStats {
    pub calls: usize,
    pub total_ms: f64,
    pub max_ms: f64,
}

impl StageStats {
    fn record(&mut self, ms: f64) {
        self.calls += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
    }

    pub fn mean_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_ms / self.calls as f64
        }
    }
}

/// Logs scanning progress through the `log` facade and keeps running
/// aggregates for a summary.
///
/// A progress line is emitted every `report_every` frames and on every
/// capture or clear.
pub struct StdoutScanLogger {
    report_every: usize,
    started: Instant,
    detect: StageStats,
    rectify: StageStats,
    frames: usize,
    peak_candidates: usize,
    captures: usize,
    last_capture: Option<(usize, u32, u32)>,
    clears: usize,
}

impl StdoutScanLogger {
    pub fn new(report_every: usize) -> Self {
        Self {
            report_every: report_every.max(1),
            started: Instant::now(),
            detect: StageStats::default(),
            rectify: StageStats::default(),
            frames: 0,
            peak_candidates: 0,
            captures: 0,
            last_capture: None,
            clears: 0,
        }
    }

    pub fn stage_stats(&self, stage: Stage) -> &StageStats {
        match stage {
            Stage::Detect => &self.detect,
            Stage::Rectify => &self.rectify,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn captures(&self) -> usize {
        self.captures
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    /// The summary text, or `None` before the first frame.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 {
            return None;
        }

        let secs = self.started.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Scan summary: {} frames in {secs:.1}s, peak {} candidates",
            self.frames, self.peak_candidates
        )];
        for stage in [Stage::Detect, Stage::Rectify] {
            let stats = self.stage_stats(stage);
            if stats.calls > 0 {
                lines.push(format!(
                    "  {:8} avg {:6.1}ms  max {:6.1}ms  ({} calls)",
                    stage.name(),
                    stats.mean_ms(),
                    stats.max_ms,
                    stats.calls
                ));
            }
        }
        let last = match self.last_capture {
            Some((index, w, h)) => format!(", last from frame {index} ({w}x{h})"),
            None => String::new(),
        };
        lines.push(format!(
            "  {} captures{last}, {} clears",
            self.captures, self.clears
        ));
        if secs > 0.0 {
            lines.push(format!("  {:.1} fps", self.frames as f64 / secs));
        }
        Some(lines.join("\n"))
    }
}

impl Default for StdoutScanLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl ScanLogger for StdoutScanLogger {
    fn stage(&mut self, stage: Stage, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        match stage {
            Stage::Detect => self.detect.record(ms),
            Stage::Rectify => self.rectify.record(ms),
        }
    }

    fn frame(&mut self, frame_index: usize, candidates: usize) {
        self.frames += 1;
        self.peak_candidates = self.peak_candidates.max(candidates);
        if self.frames % self.report_every == 0 {
            log::info!("Frame {frame_index}: {candidates} candidates");
        }
    }

    fn captured(&mut self, frame_index: usize, width: u32, height: u32) {
        self.captures += 1;
        self.last_capture = Some((frame_index, width, height));
        log::info!("Captured card from frame {frame_index} ({width}x{height})");
    }

    fn cleared(&mut self) {
        self.clears += 1;
        log::info!("Capture cleared, collecting again");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}
