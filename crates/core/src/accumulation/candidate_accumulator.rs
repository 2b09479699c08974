use std::collections::VecDeque;

use crate::shared::config::AccumulatorConfig;
use crate::shared::error::CardError;
use crate::shared::quad::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Accepting candidates.
    Collecting,
    /// A trigger fired; waiting for `reset`.
    Triggered,
}

/// Result of offering one frame's detection to the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorSignal {
    /// Still collecting; `count` is the running total.
    Pending { count: usize },
    /// Enough evidence: capture the frame this candidate came from.
    Trigger { candidate: Candidate, count: usize },
    /// Already triggered; the offer was ignored.
    Suppressed,
}

/// Collects per-frame candidates until detection is stable.
///
/// A missed frame (`None`) keeps the running count so that motion blur or a
/// brief occlusion does not discard progress. Once the count is strictly
/// greater than `threshold` and capture is available, the accumulator fires a
/// single trigger and ignores further offers until [`reset`](Self::reset).
///
/// The count is the length of the retained sequence, which is bounded by
/// `capacity` (oldest candidates are evicted first).
pub struct CandidateAccumulator {
    threshold: usize,
    capacity: usize,
    candidates: VecDeque<Candidate>,
    state: AccumulatorState,
    capture_available: bool,
}

impl CandidateAccumulator {
    pub fn new(threshold: usize, capacity: usize) -> Result<Self, CardError> {
        if capacity <= threshold {
            return Err(CardError::Config(format!(
                "capacity ({capacity}) must exceed threshold ({threshold})"
            )));
        }
        Ok(Self {
            threshold,
            capacity,
            candidates: VecDeque::with_capacity(capacity),
            state: AccumulatorState::Collecting,
            capture_available: true,
        })
    }

    pub fn from_config(config: &AccumulatorConfig) -> Result<Self, CardError> {
        Self::new(config.threshold, config.capacity)
    }

    pub fn offer(&mut self, candidate: Option<Candidate>) -> AccumulatorSignal {
        if self.state == AccumulatorState::Triggered {
            return AccumulatorSignal::Suppressed;
        }

        let Some(candidate) = candidate else {
            return AccumulatorSignal::Pending {
                count: self.count(),
            };
        };

        if self.candidates.len() == self.capacity {
            self.candidates.pop_front();
        }
        self.candidates.push_back(candidate);

        let count = self.count();
        if count > self.threshold && self.capture_available {
            self.state = AccumulatorState::Triggered;
            return AccumulatorSignal::Trigger { candidate, count };
        }
        AccumulatorSignal::Pending { count }
    }

    /// Clears all evidence and re-arms collection.
    pub fn reset(&mut self) {
        self.candidates.clear();
        self.state = AccumulatorState::Collecting;
    }

    /// Undoes the last trigger: the triggering candidate is withdrawn and
    /// collection resumes with the earlier evidence intact. No-op unless
    /// Triggered.
    pub fn retract_trigger(&mut self) {
        if self.state == AccumulatorState::Triggered {
            self.candidates.pop_back();
            self.state = AccumulatorState::Collecting;
        }
    }

    pub fn set_capture_available(&mut self, available: bool) {
        self.capture_available = available;
    }

    pub fn capture_available(&self) -> bool {
        self.capture_available
    }

    pub fn count(&self) -> usize {
        self.candidates.len()
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn latest(&self) -> Option<&Candidate> {
        self.candidates.back()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }
}

impl Default for CandidateAccumulator {
    fn default() -> Self {
        let config = AccumulatorConfig::default();
        Self {
            threshold: config.threshold,
            capacity: config.capacity,
            candidates: VecDeque::with_capacity(config.capacity),
            state: AccumulatorState::Collecting,
            capture_available: true,
        }
    }
}
