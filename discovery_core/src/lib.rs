//! Detection core for a nature discovery game.
//!
//! A [detection::DetectionSequencer] plays out a scanning, analyzing and
//! final stage on a timer and settles on one [detection::DetectionResult].
//! Around it sit the collaborators that turn results into stored
//! discoveries: a [camera::Camera] capability, point [scoring], the
//! [capture] hand-off and the discovery [journal].

pub mod camera;
pub mod capture;
pub mod configuration;
pub mod detection;
pub mod journal;
pub mod op;
pub mod prelude;
pub mod scoring;

use self::prelude::*;

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum DiscoverySet {
    /// Sequencers tick as their timers elapse
    Advance,
    /// Start, stop and reset requests
    ProcessOps,
    Capture,
    Persist,
}

/// Registers detection, capture and the journal.
///
/// Expects a `Time` resource, as provided by `MinimalPlugins` or `TimePlugin`.
#[derive(Debug)]
pub struct DiscoveryCorePlugin;

impl Plugin for DiscoveryCorePlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            Update,
            (
                DiscoverySet::Advance,
                DiscoverySet::ProcessOps,
                DiscoverySet::Capture,
                DiscoverySet::Persist,
            )
                .chain(),
        )
        .add_plugins((
            detection::DetectionPlugin,
            capture::CapturePlugin,
            journal::JournalPlugin,
        ));
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use bevy::time::{TimePlugin, TimeUpdateStrategy};
    use test_log::test;

    use super::*;
    use crate::camera::{Camera, CameraDevice, CameraError, Photo};
    use crate::capture::CaptureOp;
    use crate::configuration::DetectionConfiguration;
    use crate::detection::{AutoStart, DetectionSequencer, SequencerPhase};
    use crate::journal::Journal;

    #[derive(Debug)]
    struct TrailCamera;

    impl Camera for TrailCamera {
        fn is_ready(&self) -> bool {
            true
        }

        fn capture_photo(&mut self) -> Result<Photo, CameraError> {
            Ok(Photo::new("image/jpeg", vec![0xFF, 0xD8]))
        }
    }

    #[test]
    fn two_views_detect_independently() {
        let mut app = App::new();
        app.add_plugins((TimePlugin, DiscoveryCorePlugin))
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(
                100,
            )));
        let config = DetectionConfiguration::default();
        let busy = app
            .world_mut()
            .spawn((
                config.build_sequencer(),
                CameraDevice::new(TrailCamera),
                AutoStart,
            ))
            .id();
        let quiet = app
            .world_mut()
            .spawn((config.build_sequencer(), CameraDevice::new(TrailCamera)))
            .id();

        for _ in 0..12 {
            app.update();
        }
        let phase = |app: &App, view| {
            app.world()
                .get::<DetectionSequencer>(view)
                .map(DetectionSequencer::current_phase)
        };
        assert_eq!(phase(&app, busy), Some(SequencerPhase::Final));
        assert_eq!(phase(&app, quiet), Some(SequencerPhase::Idle));

        app.world_mut().send_event(CaptureOp.for_view(busy));
        app.update();
        assert_eq!(app.world().resource::<Journal>().len(), 1);
        assert_eq!(app.world().resource::<Journal>().total_points(), 100);
        assert_ne!(phase(&app, busy), Some(SequencerPhase::Final));
    }
}
