use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::{
    CatalogResult, Category, DetectionCandidate, DetectionSequencer, RarityTier, ResultStrategy,
    ScriptedResult, SpeciesEntry,
};
use crate::scoring::Weather;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("could not read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration is not valid toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfiguration {
    pub detection: DetectionConfiguration,
    pub weather: Weather,
    /// Bare file names are placed in the platform data directory
    pub journal_file: Option<PathBuf>,
    pub auto_start: bool,
}

impl Default for GameConfiguration {
    fn default() -> Self {
        GameConfiguration {
            detection: DetectionConfiguration::default(),
            weather: Weather::Clear,
            journal_file: None,
            auto_start: true,
        }
    }
}

impl GameConfiguration {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        log::info!("Loaded configuration from {path:?}");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigurationError> {
        let config: GameConfiguration = toml::from_str(text)?;
        config.detection.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStrategyKind {
    #[default]
    Scripted,
    Catalog,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DetectionConfiguration {
    pub tick_interval_ms: u64,
    pub scan_cycles: usize,
    pub scan_labels: Vec<String>,
    pub analysis_sequence: Vec<DetectionCandidate>,
    /// Points a fully confident candidate previews while analyzing
    pub points_preview_base: u32,
    pub result_strategy: ResultStrategyKind,
    pub species_catalog: Vec<SpeciesEntry>,
}

impl Default for DetectionConfiguration {
    fn default() -> Self {
        DetectionConfiguration {
            tick_interval_ms: 100,
            scan_cycles: 2,
            scan_labels: vec![
                "Scanning surroundings...".to_string(),
                "Looking for signs of life...".to_string(),
                "Adjusting focus...".to_string(),
            ],
            analysis_sequence: vec![
                DetectionCandidate::new("Movement detected...", 45),
                DetectionCandidate::new("Rose", 65),
                DetectionCandidate::new("Analyzing features...", 85),
                DetectionCandidate::new("Classification complete", 95),
            ],
            points_preview_base: 100,
            result_strategy: ResultStrategyKind::Scripted,
            species_catalog: vec![
                SpeciesEntry::new("Rose", Category::Flower, RarityTier::Common, 10),
                SpeciesEntry::new("Dandelion", Category::Flower, RarityTier::Common, 5),
                SpeciesEntry::new("Oak", Category::Plant, RarityTier::Common, 8),
                SpeciesEntry::new("Ladybug", Category::Insect, RarityTier::Uncommon, 20),
                SpeciesEntry::new("Monarch Butterfly", Category::Insect, RarityTier::Rare, 50),
                SpeciesEntry::new("Robin", Category::Bird, RarityTier::Uncommon, 25),
                SpeciesEntry::new("Fly Agaric", Category::Fungus, RarityTier::Epic, 80),
            ],
        }
    }
}

impl DetectionConfiguration {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigurationError::Invalid(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.scan_labels.is_empty() {
            return Err(ConfigurationError::Invalid(
                "scan_labels must contain at least one label".to_string(),
            ));
        }
        if let Some(candidate) = self
            .analysis_sequence
            .iter()
            .find(|candidate| candidate.confidence_score() > 100)
        {
            return Err(ConfigurationError::Invalid(format!(
                "candidate [{}] has confidence above 100",
                candidate.label()
            )));
        }
        if self
            .species_catalog
            .iter()
            .any(|entry| entry.name().trim().is_empty())
        {
            return Err(ConfigurationError::Invalid(
                "species in the catalog must have a name".to_string(),
            ));
        }
        let confidences: Vec<u8> = self
            .analysis_sequence
            .iter()
            .map(DetectionCandidate::confidence_score)
            .collect();
        if confidences.windows(2).any(|pair| pair[0] > pair[1]) {
            log::warn!("Analysis confidence decreases during the sequence: {confidences:?}");
        }
        Ok(())
    }

    pub fn result_strategy(&self) -> Box<dyn ResultStrategy> {
        match self.result_strategy {
            ResultStrategyKind::Scripted => Box::new(ScriptedResult),
            ResultStrategyKind::Catalog => {
                Box::new(CatalogResult::new(self.species_catalog.clone()))
            },
        }
    }

    pub fn build_sequencer(&self) -> DetectionSequencer {
        DetectionSequencer::with_strategy(self, self.result_strategy())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = GameConfiguration::from_toml("").expect("empty config should be valid");
        assert_eq!(config.detection, DetectionConfiguration::default());
        assert_eq!(config.weather, Weather::Clear);
        assert!(config.auto_start);
        assert_eq!(config.journal_file, None);
    }

    #[test]
    fn partial_detection_table_keeps_other_defaults() {
        let config = GameConfiguration::from_toml(
            r#"
            weather = "rainy"
            auto_start = false

            [detection]
            tick_interval_ms = 250
            scan_cycles = 3
            result_strategy = "catalog"
            "#,
        )
        .expect("config should parse");
        assert_eq!(config.weather, Weather::Rainy);
        assert!(!config.auto_start);
        assert_eq!(config.detection.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.detection.scan_cycles, 3);
        assert_eq!(config.detection.result_strategy, ResultStrategyKind::Catalog);
        assert_eq!(config.detection.analysis_sequence.len(), 4);
    }

    #[test]
    fn analysis_sequence_can_be_replaced() {
        let config = GameConfiguration::from_toml(
            r#"
            [[detection.analysis_sequence]]
            label = "Wings spotted..."
            confidence_score = 40

            [[detection.analysis_sequence]]
            label = "Ladybug"
            confidence_score = 90
            "#,
        )
        .expect("config should parse");
        assert_eq!(
            config.detection.analysis_sequence,
            vec![
                DetectionCandidate::new("Wings spotted...", 40),
                DetectionCandidate::new("Ladybug", 90),
            ]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_interval = GameConfiguration::from_toml("[detection]\ntick_interval_ms = 0");
        assert!(matches!(zero_interval, Err(ConfigurationError::Invalid(_))));

        let no_labels = GameConfiguration::from_toml("[detection]\nscan_labels = []");
        assert!(matches!(no_labels, Err(ConfigurationError::Invalid(_))));

        let overconfident = GameConfiguration::from_toml(
            "[[detection.analysis_sequence]]\nlabel = \"Sure\"\nconfidence_score = 120",
        );
        assert!(matches!(overconfident, Err(ConfigurationError::Invalid(_))));

        let not_toml = GameConfiguration::from_toml("[detection");
        assert!(matches!(not_toml, Err(ConfigurationError::Toml(_))));
    }
}
