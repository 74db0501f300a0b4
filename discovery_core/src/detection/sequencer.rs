use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bevy::time::{Timer, TimerMode};

use super::strategy::{DetectionContext, ResultStrategy, ScriptedResult};
use super::{DetectionCandidate, DetectionResult, DisplayCandidate, SequencerPhase};
use crate::configuration::DetectionConfiguration;
use crate::prelude::*;

/// State of a single detection cycle. Only its owning sequencer mutates it.
#[derive(Clone, Debug, Default)]
struct SequencerState {
    phase: SequencerPhase,
    step_index: usize,
    pending_candidates: Vec<DetectionCandidate>,
    result: Option<DetectionResult>,
}

impl SequencerState {
    fn enter(&mut self, phase: SequencerPhase) {
        log::debug!("Detection phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.step_index = 0;
    }

    fn clear(&mut self) {
        self.phase = SequencerPhase::Scanning;
        self.step_index = 0;
        self.pending_candidates.clear();
        self.result = None;
    }
}

/// Drives the scanning, analyzing and final stages of a detection on a
/// repeating timer, ending in one [DetectionResult].
///
/// The sequencer performs no sensing. Each camera view owns its own
/// sequencer, and it owns exactly one interval timer, so calling
/// [DetectionSequencer::start] repeatedly never creates a second tick source.
#[derive(Component)]
pub struct DetectionSequencer {
    state: SequencerState,
    running: bool,
    timer: Timer,
    scan_cycles: usize,
    scan_labels: Vec<String>,
    analysis_sequence: Vec<DetectionCandidate>,
    points_preview_base: u32,
    strategy: Box<dyn ResultStrategy>,
}

impl std::fmt::Debug for DetectionSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionSequencer")
            .field("state", &self.state)
            .field("running", &self.running)
            .field("interval", &self.timer.duration())
            .finish_non_exhaustive()
    }
}

impl DetectionSequencer {
    pub fn new(config: &DetectionConfiguration) -> Self {
        Self::with_strategy(config, Box::new(ScriptedResult))
    }

    pub fn with_strategy(
        config: &DetectionConfiguration,
        strategy: Box<dyn ResultStrategy>,
    ) -> Self {
        DetectionSequencer {
            state: SequencerState::default(),
            running: false,
            timer: Timer::new(config.tick_interval(), TimerMode::Repeating),
            scan_cycles: config.scan_cycles,
            scan_labels: config.scan_labels.clone(),
            analysis_sequence: config.analysis_sequence.clone(),
            points_preview_base: config.points_preview_base,
            strategy,
        }
    }

    pub fn start(&mut self) {
        if self.running {
            log::trace!("Detection already running, ignoring start");
            return;
        }
        log::info!("Starting detection");
        self.state.clear();
        self.timer.reset();
        self.running = true;
        self.tick();
    }

    /// Does nothing unless running, so a sequencer that was never started stays idle.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        log::info!("Stopping detection");
        self.running = false;
        self.timer.reset();
        self.state.clear();
    }

    /// Starts a new capture cycle without touching the timer. Does nothing
    /// unless running.
    pub fn reset(&mut self) {
        if !self.running {
            return;
        }
        log::debug!("Resetting detection cycle");
        self.state.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advances the interval timer, ticking once per interval that elapsed.
    ///
    /// Returns how many of those ticks changed observable state.
    pub fn advance(&mut self, delta: Duration) -> u32 {
        if !self.running {
            return 0;
        }
        let fired = self.timer.tick(delta).times_finished_this_tick();
        (0..fired).filter(|_| self.tick()).count() as u32
    }

    /// Advances the state machine by exactly one step.
    ///
    /// Returns false if nothing observable changed, which is the case when the
    /// sequencer is not running or has already reached [SequencerPhase::Final].
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        match self.state.phase {
            SequencerPhase::Idle => {
                self.state.enter(SequencerPhase::Scanning);
                true
            },
            SequencerPhase::Scanning => {
                if self.state.step_index < self.scan_cycles {
                    if let Some(label) = self.scan_label(self.state.step_index) {
                        log::trace!("Scan status: {label}");
                    }
                    self.state.step_index += 1;
                }
                if self.state.step_index >= self.scan_cycles {
                    self.state.enter(SequencerPhase::Analyzing);
                    self.state.pending_candidates = self.analysis_sequence.clone();
                }
                true
            },
            SequencerPhase::Analyzing => {
                if self.state.step_index < self.state.pending_candidates.len() {
                    log::trace!(
                        "Candidate: {:?}",
                        self.state.pending_candidates[self.state.step_index]
                    );
                    self.state.step_index += 1;
                } else {
                    let context = DetectionContext::new(
                        &self.state.pending_candidates,
                        epoch_millis_now(),
                    );
                    let result = self.strategy.produce_result(&context);
                    log::info!(
                        "Detected {} ({}% confidence)",
                        result.species_name(),
                        result.confidence_percent()
                    );
                    self.state.enter(SequencerPhase::Final);
                    self.state.result = Some(result);
                }
                true
            },
            SequencerPhase::Final => false,
        }
    }

    pub fn current_phase(&self) -> SequencerPhase {
        self.state.phase
    }

    pub fn current_result(&self) -> Option<&DetectionResult> {
        if self.state.phase == SequencerPhase::Final {
            self.state.result.as_ref()
        } else {
            None
        }
    }

    pub fn step_index(&self) -> usize {
        self.state.step_index
    }

    pub fn pending_candidates(&self) -> &[DetectionCandidate] {
        &self.state.pending_candidates
    }

    pub fn current_display_candidate(&self) -> Option<DisplayCandidate> {
        match self.state.phase {
            SequencerPhase::Idle => None,
            SequencerPhase::Scanning => self
                .scan_label(self.state.step_index.saturating_sub(1))
                .map(|label| DisplayCandidate::new(label, 0, 0)),
            SequencerPhase::Analyzing => match self.state.step_index.checked_sub(1) {
                Some(shown) => self.state.pending_candidates.get(shown).map(|candidate| {
                    DisplayCandidate::new(
                        candidate.label().as_str(),
                        candidate.confidence_score(),
                        self.points_preview(candidate.confidence_score()),
                    )
                }),
                None => self
                    .scan_label(self.scan_cycles.saturating_sub(1))
                    .map(|label| DisplayCandidate::new(label, 0, 0)),
            },
            SequencerPhase::Final => self.state.result.as_ref().map(|result| {
                DisplayCandidate::new(
                    result.species_name().as_str(),
                    result.confidence_percent(),
                    result.adjusted_points(),
                )
            }),
        }
    }

    fn points_preview(&self, confidence: u8) -> u32 {
        let preview = self.points_preview_base as u64 * confidence as u64 / 100;
        preview.min(u32::MAX as u64) as u32
    }

    fn scan_label(&self, step: usize) -> Option<&str> {
        if self.scan_labels.is_empty() {
            return None;
        }
        self.scan_labels
            .get(step % self.scan_labels.len())
            .map(String::as_str)
    }
}

fn epoch_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_millis() as u64)
        .unwrap_or_default()
}
