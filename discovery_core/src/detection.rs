mod sequencer;
mod strategy;

use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sequencer::DetectionSequencer;
pub use strategy::{CatalogResult, DetectionContext, ResultStrategy, ScriptedResult, SpeciesEntry};

use crate::camera::CameraDevice;
use crate::op::{Op, OpResult, OpSubtype};
use crate::prelude::*;
use crate::DiscoverySet;

#[derive(Debug)]
pub struct DetectionPlugin;

impl Plugin for DetectionPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<Op<SequencerOp>>()
            .add_event::<OpResult<SequencerOp>>()
            .add_event::<SequencerUpdated>()
            .add_systems(
                Update,
                (
                    sys_advance_sequencers.in_set(DiscoverySet::Advance),
                    (sys_auto_start, sys_sequencer_ops)
                        .chain()
                        .in_set(DiscoverySet::ProcessOps),
                ),
            );
    }
}

/// The kind of thing that was found, used by scoring downstream.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Insect,
    Flower,
    Plant,
    Bird,
    Mammal,
    Fungus,
    Human,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RarityTier {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl RarityTier {
    /// Percentage applied to base points when a discovery is scored.
    pub fn multiplier_percent(&self) -> u32 {
        match self {
            Self::Common => 100,
            Self::Uncommon => 125,
            Self::Rare => 150,
            Self::Epic => 200,
            Self::Legendary => 300,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum SequencerPhase {
    /// Only observable before the sequencer has ever been started
    #[default]
    Idle,
    Scanning,
    Analyzing,
    Final,
}

/// A transient (label, confidence) pair shown while a detection is in progress.
#[derive(Clone, Debug, Deserialize, Eq, Getters, CopyGetters, PartialEq, Serialize)]
pub struct DetectionCandidate {
    #[getset(get = "pub")]
    label: String,
    #[getset(get_copy = "pub")]
    confidence_score: u8,
}

impl DetectionCandidate {
    pub fn new<S: Into<String>>(label: S, confidence_score: u8) -> Self {
        DetectionCandidate {
            label: label.into(),
            confidence_score: confidence_score.min(100),
        }
    }
}

/// The terminal value of one completed detection cycle.
#[derive(Clone, Debug, Deserialize, Eq, Getters, CopyGetters, PartialEq, Serialize)]
pub struct DetectionResult {
    #[getset(get = "pub")]
    species_name: String,
    #[getset(get_copy = "pub")]
    category: Category,
    #[getset(get_copy = "pub")]
    base_points: u32,
    #[getset(get_copy = "pub")]
    adjusted_points: u32,
    #[getset(get_copy = "pub")]
    confidence_percent: u8,
    #[getset(get_copy = "pub")]
    rarity_tier: RarityTier,
    #[getset(get_copy = "pub")]
    captured_at_epoch_millis: u64,
    #[getset(get_copy = "pub")]
    is_special_result: bool,
}

impl DetectionResult {
    /// Adjusted points start equal to base points; only collaborators change them.
    pub fn new<S: Into<String>>(
        species_name: S,
        category: Category,
        base_points: u32,
        confidence_percent: u8,
        rarity_tier: RarityTier,
        captured_at_epoch_millis: u64,
        is_special_result: bool,
    ) -> Self {
        DetectionResult {
            species_name: species_name.into(),
            category,
            base_points,
            adjusted_points: base_points,
            confidence_percent: confidence_percent.min(100),
            rarity_tier,
            captured_at_epoch_millis,
            is_special_result,
        }
    }

    pub fn with_adjusted_points(&self, adjusted_points: u32) -> Self {
        DetectionResult {
            adjusted_points,
            ..self.clone()
        }
    }
}

/// What a presentation layer should currently show for a sequencer.
#[derive(Clone, Debug, Eq, Getters, CopyGetters, PartialEq)]
pub struct DisplayCandidate {
    #[getset(get = "pub")]
    label: String,
    #[getset(get_copy = "pub")]
    confidence_percent: u8,
    #[getset(get_copy = "pub")]
    points_preview: u32,
}

impl DisplayCandidate {
    pub fn new<S: Into<String>>(label: S, confidence_percent: u8, points_preview: u32) -> Self {
        DisplayCandidate {
            label: label.into(),
            confidence_percent,
            points_preview,
        }
    }
}

/// Sent whenever a sequencer's observable state changes.
#[derive(Clone, Debug, Event)]
pub struct SequencerUpdated {
    pub view: Entity,
    pub phase: SequencerPhase,
    pub running: bool,
    pub display: Option<DisplayCandidate>,
}

impl SequencerUpdated {
    pub(crate) fn of(view: Entity, sequencer: &DetectionSequencer) -> Self {
        SequencerUpdated {
            view,
            phase: sequencer.current_phase(),
            running: sequencer.is_running(),
            display: sequencer.current_display_candidate(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequencerOp {
    Start,
    Stop,
    Reset,
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SequencerOpError {
    #[error("camera is not ready to capture")]
    CameraNotReady,
    #[error("entity {0:?} is not a camera view")]
    MissingView(Entity),
}

impl OpSubtype for SequencerOp {
    type Error = SequencerOpError;
}

/// Views with this marker start detecting the first frame their camera is ready.
#[derive(Component, Debug, Default)]
pub struct AutoStart;

pub fn sys_advance_sequencers(
    time: Res<Time>,
    mut q_sequencer: Query<(Entity, &mut DetectionSequencer)>,
    mut evw_updated: EventWriter<SequencerUpdated>,
) {
    for (view, mut sequencer) in q_sequencer.iter_mut() {
        if !sequencer.is_running() {
            continue;
        }
        if sequencer.advance(time.delta()) > 0 {
            evw_updated.send(SequencerUpdated::of(view, &sequencer));
        }
    }
}

pub fn sys_auto_start(
    mut commands: Commands,
    q_view: Query<(Entity, &CameraDevice, &DetectionSequencer), With<AutoStart>>,
    mut evw_op: EventWriter<Op<SequencerOp>>,
) {
    for (view, camera, sequencer) in q_view.iter() {
        if camera.is_ready() && !sequencer.is_running() {
            log::debug!("Camera for view {view:?} is ready, starting detection");
            evw_op.send(SequencerOp::Start.for_view(view));
            commands.entity(view).remove::<AutoStart>();
        }
    }
}

pub fn sys_sequencer_ops(
    mut evr_op: EventReader<Op<SequencerOp>>,
    mut q_view: Query<(&mut DetectionSequencer, Option<&CameraDevice>)>,
    mut evw_result: EventWriter<OpResult<SequencerOp>>,
    mut evw_updated: EventWriter<SequencerUpdated>,
) {
    for op in evr_op.read() {
        let result = q_view
            .get_mut(op.view())
            .map_err(|_| SequencerOpError::MissingView(op.view()))
            .and_then(|(mut sequencer, camera)| {
                match op.op() {
                    SequencerOp::Start => {
                        // Readiness is the caller's concern, the sequencer never checks it
                        if !camera.map(CameraDevice::is_ready).unwrap_or(false) {
                            return Err(SequencerOpError::CameraNotReady);
                        }
                        sequencer.start();
                    },
                    SequencerOp::Stop => sequencer.stop(),
                    SequencerOp::Reset => sequencer.reset(),
                }
                evw_updated.send(SequencerUpdated::of(op.view(), &sequencer));
                Ok(())
            });
        if let Err(ref e) = result {
            log::warn!("Refused {:?} for view {:?}: {e}", op.op(), op.view());
        }
        evw_result.send(OpResult::new(op, result));
    }
}
