use thiserror::Error;

use crate::camera::{CameraDevice, CameraError};
use crate::detection::{DetectionSequencer, SequencerUpdated};
use crate::journal::{Discovery, Journal};
use crate::op::{Op, OpResult, OpSubtype};
use crate::prelude::*;
use crate::scoring::PointModifiers;
use crate::DiscoverySet;

#[derive(Debug)]
pub struct CapturePlugin;

impl Plugin for CapturePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Journal>()
            .init_resource::<PointModifiers>()
            .add_event::<Op<CaptureOp>>()
            .add_event::<OpResult<CaptureOp>>()
            .add_event::<DiscoveryRecorded>()
            .add_systems(Update, sys_capture.in_set(DiscoverySet::Capture));
    }
}

/// Turn the view's current result into a discovery.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CaptureOp;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CaptureError {
    #[error("nothing has been detected yet")]
    NoResult,
    #[error("entity {0:?} is not a camera view")]
    MissingView(Entity),
    #[error(transparent)]
    Camera(#[from] CameraError),
}

impl OpSubtype for CaptureOp {
    type Error = CaptureError;
}

#[derive(Clone, Debug, Event)]
pub struct DiscoveryRecorded {
    pub view: Entity,
    pub discovery: Discovery,
}

pub fn sys_capture(
    mut evr_capture: EventReader<Op<CaptureOp>>,
    mut q_view: Query<(&mut DetectionSequencer, &mut CameraDevice)>,
    res_modifiers: Res<PointModifiers>,
    mut res_journal: ResMut<Journal>,
    mut evw_result: EventWriter<OpResult<CaptureOp>>,
    mut evw_recorded: EventWriter<DiscoveryRecorded>,
    mut evw_updated: EventWriter<SequencerUpdated>,
) {
    for op in evr_capture.read() {
        let result = q_view
            .get_mut(op.view())
            .map_err(|_| CaptureError::MissingView(op.view()))
            .and_then(|(mut sequencer, mut camera)| {
                let detection = sequencer
                    .current_result()
                    .cloned()
                    .ok_or(CaptureError::NoResult)?;
                let photo = camera.capture_photo()?;
                let scored = res_modifiers.adjust(&detection);
                let discovery = res_journal
                    .record(&scored, res_modifiers.weather, &photo)
                    .clone();
                sequencer.reset();
                evw_updated.send(SequencerUpdated::of(op.view(), &sequencer));
                evw_recorded.send(DiscoveryRecorded {
                    view: op.view(),
                    discovery,
                });
                Ok(())
            });
        if let Err(ref e) = result {
            log::warn!("Capture for view {:?} failed: {e}", op.view());
        }
        evw_result.send(OpResult::new(op, result));
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use bevy::time::{TimePlugin, TimeUpdateStrategy};
    use test_log::test;

    use super::*;
    use crate::camera::{Camera, Photo};
    use crate::configuration::DetectionConfiguration;
    use crate::detection::{DetectionPlugin, SequencerPhase};
    use crate::journal::JournalPlugin;
    use crate::scoring::Weather;

    #[derive(Debug)]
    struct JammedCamera {
        ready: bool,
        jammed: bool,
    }

    impl Camera for JammedCamera {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn capture_photo(&mut self) -> Result<Photo, CameraError> {
            if self.jammed {
                Err(CameraError::CaptureFailed("shutter jammed".to_string()))
            } else {
                Ok(Photo::new("image/png", vec![7]))
            }
        }
    }

    fn test_app(weather: Weather) -> App {
        let mut app = App::new();
        app.add_plugins(TimePlugin)
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::ZERO))
            .configure_sets(
                Update,
                (
                    DiscoverySet::Advance,
                    DiscoverySet::ProcessOps,
                    DiscoverySet::Capture,
                    DiscoverySet::Persist,
                )
                    .chain(),
            )
            .add_plugins((DetectionPlugin, CapturePlugin, JournalPlugin))
            .insert_resource(PointModifiers::new(weather));
        app
    }

    fn spawn_final_view(app: &mut App, jammed: bool) -> Entity {
        let mut sequencer = DetectionSequencer::new(&DetectionConfiguration::default());
        sequencer.start();
        while sequencer.current_phase() != SequencerPhase::Final {
            sequencer.tick();
        }
        app.world_mut()
            .spawn((
                sequencer,
                CameraDevice::new(JammedCamera {
                    ready: true,
                    jammed,
                }),
            ))
            .id()
    }

    fn capture_results(app: &mut App) -> Vec<OpResult<CaptureOp>> {
        app.world_mut()
            .resource_mut::<Events<OpResult<CaptureOp>>>()
            .drain()
            .collect()
    }

    #[test]
    fn capture_records_discovery_and_restarts_cycle() {
        let mut app = test_app(Weather::Cloudy);
        let view = spawn_final_view(&mut app, false);
        app.world_mut().send_event(CaptureOp.for_view(view));
        app.update();

        assert!(capture_results(&mut app)[0].is_ok());
        let journal = app.world().resource::<Journal>();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.discoveries()[0].species_name(), "Beautiful People");
        assert_eq!(journal.discoveries()[0].points(), 110);
        assert_eq!(journal.total_points(), 110);

        let sequencer = app.world().get::<DetectionSequencer>(view).unwrap();
        assert!(sequencer.is_running());
        assert_eq!(sequencer.current_phase(), SequencerPhase::Scanning);
        assert_eq!(sequencer.current_result(), None);

        let recorded: Vec<_> = app
            .world_mut()
            .resource_mut::<Events<DiscoveryRecorded>>()
            .drain()
            .collect();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].view, view);
    }

    #[test]
    fn capture_before_final_is_refused() {
        let mut app = test_app(Weather::Clear);
        let mut sequencer = DetectionSequencer::new(&DetectionConfiguration::default());
        sequencer.start();
        let view = app
            .world_mut()
            .spawn((
                sequencer,
                CameraDevice::new(JammedCamera {
                    ready: true,
                    jammed: false,
                }),
            ))
            .id();
        app.world_mut().send_event(CaptureOp.for_view(view));
        app.update();

        assert_eq!(
            capture_results(&mut app)[0].result(),
            &Err(CaptureError::NoResult)
        );
        assert!(app.world().resource::<Journal>().is_empty());
    }

    #[test]
    fn camera_failure_keeps_the_result() {
        let mut app = test_app(Weather::Clear);
        let view = spawn_final_view(&mut app, true);
        app.world_mut().send_event(CaptureOp.for_view(view));
        app.update();

        assert_eq!(
            capture_results(&mut app)[0].result(),
            &Err(CaptureError::Camera(CameraError::CaptureFailed(
                "shutter jammed".to_string()
            )))
        );
        assert!(app.world().resource::<Journal>().is_empty());
        let sequencer = app.world().get::<DetectionSequencer>(view).unwrap();
        assert_eq!(sequencer.current_phase(), SequencerPhase::Final);
    }
}
