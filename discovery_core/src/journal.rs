use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use getset::{CopyGetters, Getters};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use typed_key::Key;

use crate::camera::Photo;
use crate::capture::DiscoveryRecorded;
use crate::detection::{Category, DetectionResult, RarityTier};
use crate::prelude::*;
use crate::scoring::Weather;
use crate::DiscoverySet;

mod key {
    use typed_key::{typed_key, Key};

    pub const DISCOVERIES: Key<Vec<super::Discovery>> = typed_key!("discoveries");
    pub const TOTAL_POINTS: Key<u64> = typed_key!("total_points");
    pub const NEXT_ID: Key<u64> = typed_key!("next_id");
}

#[derive(Debug)]
pub struct JournalPlugin;

impl Plugin for JournalPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Journal>()
            .add_systems(Startup, sys_load_journal)
            .add_systems(Update, sys_persist_journal.in_set(DiscoverySet::Persist));
    }
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A detection that made it into the journal, photo and all.
#[derive(Clone, Debug, Deserialize, Eq, Getters, CopyGetters, PartialEq, Serialize)]
pub struct Discovery {
    #[getset(get_copy = "pub")]
    id: u64,
    #[getset(get = "pub")]
    species_name: String,
    #[getset(get_copy = "pub")]
    category: Category,
    #[getset(get_copy = "pub")]
    rarity_tier: RarityTier,
    #[getset(get_copy = "pub")]
    confidence_percent: u8,
    #[getset(get_copy = "pub")]
    points: u32,
    #[getset(get_copy = "pub")]
    weather: Weather,
    #[getset(get_copy = "pub")]
    captured_at_epoch_millis: u64,
    #[getset(get = "pub")]
    photo_data_url: String,
}

/// Keyed JSON blob the journal is stored as. Keys this version does not know
/// about are carried through untouched.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
struct JournalBlob(BTreeMap<String, Value>);

impl JournalBlob {
    fn get_or_default<T: DeserializeOwned + Default>(
        &self,
        key: Key<T>,
    ) -> Result<T, serde_json::Error> {
        match self.0.get(key.name()) {
            Some(value) => T::deserialize(value),
            None => Ok(T::default()),
        }
    }

    fn put<T: Serialize>(&mut self, key: Key<T>, value: &T) -> Result<(), serde_json::Error> {
        self.0
            .insert(key.name().to_string(), serde_json::to_value(value)?);
        Ok(())
    }
}

#[derive(Debug, Default, Resource)]
pub struct Journal {
    discoveries: Vec<Discovery>,
    total_points: u64,
    next_id: u64,
    blob: JournalBlob,
}

impl Journal {
    pub fn discoveries(&self) -> &[Discovery] {
        &self.discoveries
    }

    pub fn total_points(&self) -> u64 {
        self.total_points
    }

    pub fn len(&self) -> usize {
        self.discoveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discoveries.is_empty()
    }

    pub fn count_by_category(&self) -> HashMap<Category, usize> {
        self.discoveries
            .iter()
            .fold(HashMap::new(), |mut counts, discovery| {
                *counts.entry(discovery.category).or_default() += 1;
                counts
            })
    }

    /// Stores an already point-adjusted result.
    pub fn record(
        &mut self,
        result: &DetectionResult,
        weather: Weather,
        photo: &Photo,
    ) -> &Discovery {
        self.next_id += 1;
        let discovery = Discovery {
            id: self.next_id,
            species_name: result.species_name().clone(),
            category: result.category(),
            rarity_tier: result.rarity_tier(),
            confidence_percent: result.confidence_percent(),
            points: result.adjusted_points(),
            weather,
            captured_at_epoch_millis: result.captured_at_epoch_millis(),
            photo_data_url: photo.to_data_url(),
        };
        self.total_points += discovery.points as u64;
        log::info!(
            "Recorded discovery #{} {} for {} points ({} total)",
            discovery.id,
            discovery.species_name,
            discovery.points,
            self.total_points
        );
        self.discoveries.push(discovery);
        &self.discoveries[self.discoveries.len() - 1]
    }

    pub fn from_json(text: &str) -> Result<Self, JournalError> {
        let blob: JournalBlob = serde_json::from_str(text)?;
        let discoveries = blob.get_or_default(key::DISCOVERIES)?;
        let total_points = blob.get_or_default(key::TOTAL_POINTS)?;
        let next_id = blob.get_or_default(key::NEXT_ID)?;
        Ok(Journal {
            discoveries,
            total_points,
            next_id,
            blob,
        })
    }

    pub fn to_json(&self) -> Result<String, JournalError> {
        let mut blob = self.blob.clone();
        blob.put(key::DISCOVERIES, &self.discoveries)?;
        blob.put(key::TOTAL_POINTS, &self.total_points)?;
        blob.put(key::NEXT_ID, &self.next_id)?;
        Ok(serde_json::to_string_pretty(&blob)?)
    }

    /// Loads the journal, starting over if the file is missing or unreadable as a journal.
    pub fn load(path: &Path) -> Result<Self, JournalError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No journal at {path:?}, starting a new one");
                return Ok(Journal::default());
            },
            Err(e) => return Err(e.into()),
        };
        match Self::from_json(&text) {
            Ok(journal) => {
                log::info!(
                    "Loaded journal with {} discoveries from {path:?}",
                    journal.len()
                );
                Ok(journal)
            },
            Err(e) => {
                log::warn!("Journal at {path:?} could not be read ({e}), starting a new one");
                Ok(Journal::default())
            },
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                log::info!("Creating journal directory {parent:?}");
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        log::debug!("Saved journal to {path:?}");
        Ok(())
    }
}

/// Where the journal lives on disk. Without this resource the journal is
/// kept in memory only.
#[derive(Clone, Debug, Resource)]
pub struct JournalFile(Cow<'static, Path>);

impl Default for JournalFile {
    fn default() -> Self {
        Self(Cow::Borrowed(Path::new("journal.json")))
    }
}

impl JournalFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self(Cow::Owned(path.into()))
    }

    /// Bare file names resolve into the platform data directory.
    pub fn get_path(&self) -> std::io::Result<Cow<'static, Path>> {
        if self.0.parent() == Some(Path::new("")) {
            let mut path_buf = Self::data_directory()?;
            path_buf.push(self.0.as_ref());
            Ok(Cow::Owned(path_buf))
        } else {
            Ok(self.0.clone())
        }
    }

    fn data_directory() -> std::io::Result<PathBuf> {
        let mut path = match std::env::var("XDG_DATA_HOME") {
            Ok(data_home) => PathBuf::from(data_home),
            Err(_) => {
                let mut path_buf = homedir::get_my_home()
                    .map_err(|e| {
                        std::io::Error::new(std::io::ErrorKind::Other, format!("{e:?}"))
                    })?
                    .ok_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "No home directory")
                    })?;
                path_buf.push(".local");
                path_buf.push("share");
                path_buf
            },
        };
        path.push("nature_quest");
        Ok(path)
    }
}

pub fn sys_load_journal(mut commands: Commands, res_journal_file: Option<Res<JournalFile>>) {
    let Some(journal_file) = res_journal_file else {
        return;
    };
    let loaded = journal_file
        .get_path()
        .map_err(JournalError::from)
        .and_then(|path| Journal::load(&path));
    match loaded {
        Ok(journal) => commands.insert_resource(journal),
        Err(e) => log::error!("Unable to load journal, keeping an empty one: {e}"),
    }
}

pub fn sys_persist_journal(
    mut evr_recorded: EventReader<DiscoveryRecorded>,
    res_journal: Res<Journal>,
    res_journal_file: Option<Res<JournalFile>>,
) {
    if evr_recorded.read().count() == 0 {
        return;
    }
    let Some(journal_file) = res_journal_file else {
        return;
    };
    let saved = journal_file
        .get_path()
        .map_err(JournalError::from)
        .and_then(|path| res_journal.save(&path));
    if let Err(e) = saved {
        log::error!("Unable to save journal: {e}");
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use bevy::time::{TimePlugin, TimeUpdateStrategy};
    use test_log::test;

    use super::*;
    use crate::camera::{Camera, CameraDevice, CameraError};
    use crate::capture::{CaptureOp, CapturePlugin};
    use crate::configuration::DetectionConfiguration;
    use crate::detection::{DetectionPlugin, DetectionSequencer, SequencerPhase};

    fn scripted_result() -> DetectionResult {
        DetectionResult::new(
            "Beautiful People",
            Category::Human,
            100,
            100,
            RarityTier::Legendary,
            1_700_000_000_000,
            true,
        )
    }

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nature_quest_test_{}_{name}", std::process::id()));
        path
    }

    #[test]
    fn recording_assigns_ids_and_totals() {
        let mut journal = Journal::default();
        let photo = Photo::new("image/png", vec![1, 2, 3]);
        let first_id = journal.record(&scripted_result(), Weather::Clear, &photo).id();
        let second = journal
            .record(&scripted_result().with_adjusted_points(150), Weather::Stormy, &photo)
            .clone();

        assert_eq!(first_id, 1);
        assert_eq!(second.id(), 2);
        assert_eq!(second.points(), 150);
        assert_eq!(second.weather(), Weather::Stormy);
        assert_eq!(second.photo_data_url(), "data:image/png;base64,AQID");
        assert_eq!(journal.total_points(), 250);
        assert_eq!(journal.count_by_category().get(&Category::Human), Some(&2));
    }

    #[test]
    fn journal_survives_a_round_trip_with_unknown_keys() {
        let mut journal = Journal::from_json(r#"{"favourite_spot": "the pond"}"#)
            .expect("blob with unknown keys should load");
        journal.record(
            &scripted_result(),
            Weather::Clear,
            &Photo::new("image/png", vec![0]),
        );
        let text = journal.to_json().expect("journal should serialize");

        let reloaded = Journal::from_json(&text).expect("saved journal should load");
        assert_eq!(reloaded.discoveries(), journal.discoveries());
        assert_eq!(reloaded.total_points(), 100);
        assert!(text.contains("the pond"));
    }

    #[test]
    fn unreadable_journal_is_reinitialized() {
        let path = temp_path("garbled.json");
        std::fs::write(&path, "{ not json").unwrap();
        let journal = Journal::load(&path).expect("garbled journal should reinitialize");
        assert!(journal.is_empty());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_journal_starts_empty_and_saves() {
        let dir = temp_path("dir");
        let path = dir.join("journal.json");
        let mut journal = Journal::load(&path).expect("missing journal should start empty");
        assert!(journal.is_empty());

        journal.record(
            &scripted_result(),
            Weather::Clear,
            &Photo::new("image/png", vec![9]),
        );
        journal.save(&path).expect("journal should save");
        let reloaded = Journal::load(&path).expect("saved journal should load");
        assert_eq!(reloaded.len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn explicit_journal_paths_are_kept() {
        let file = JournalFile::new("/tmp/somewhere/journal.json");
        assert_eq!(
            file.get_path().unwrap().as_ref(),
            Path::new("/tmp/somewhere/journal.json")
        );
    }

    #[derive(Debug)]
    struct ReadyCamera;

    impl Camera for ReadyCamera {
        fn is_ready(&self) -> bool {
            true
        }

        fn capture_photo(&mut self) -> Result<Photo, CameraError> {
            Ok(Photo::new("image/png", vec![4, 2]))
        }
    }

    #[test]
    fn journal_file_is_loaded_at_startup_and_saved_after_capture() {
        let dir = temp_path("app");
        let path = dir.join("journal.json");
        let mut seeded = Journal::default();
        seeded.record(
            &scripted_result(),
            Weather::Snowy,
            &Photo::new("image/png", vec![1]),
        );
        seeded.save(&path).expect("seed journal should save");

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
            .insert_resource(JournalFile::new(path.clone()));
        app.update();

        let journal = app.world().resource::<Journal>();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.discoveries()[0].weather(), Weather::Snowy);
        assert_eq!(journal.total_points(), 100);

        let mut sequencer = DetectionSequencer::new(&DetectionConfiguration::default());
        sequencer.start();
        while sequencer.current_phase() != SequencerPhase::Final {
            sequencer.tick();
        }
        let view = app
            .world_mut()
            .spawn((sequencer, CameraDevice::new(ReadyCamera)))
            .id();
        app.world_mut().send_event(CaptureOp.for_view(view));
        app.update();

        let on_disk = Journal::load(&path).expect("saved journal should load");
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk.discoveries()[1].id(), 2);
        assert_eq!(on_disk.discoveries()[1].photo_data_url(), "data:image/png;base64,BAI=");
        assert_eq!(on_disk.total_points(), 200);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
