use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

use super::{Category, DetectionCandidate, DetectionResult, RarityTier};

/// Everything a [ResultStrategy] gets to look at when a cycle completes.
#[derive(Clone, Copy, Debug)]
pub struct DetectionContext<'a> {
    candidates: &'a [DetectionCandidate],
    captured_at_epoch_millis: u64,
}

impl<'a> DetectionContext<'a> {
    pub fn new(candidates: &'a [DetectionCandidate], captured_at_epoch_millis: u64) -> Self {
        DetectionContext {
            candidates,
            captured_at_epoch_millis,
        }
    }

    /// The analysed candidates, in the order they were shown
    pub fn candidates(&self) -> &'a [DetectionCandidate] {
        self.candidates
    }

    pub fn captured_at_epoch_millis(&self) -> u64 {
        self.captured_at_epoch_millis
    }
}

/// Builds the terminal result of a detection cycle.
///
/// This is the seam where a real classifier would plug in; the state machine
/// only decides *when* a result is produced, never *what* it is.
pub trait ResultStrategy: Send + Sync {
    fn produce_result(&self, context: &DetectionContext) -> DetectionResult;
}

/// The guaranteed payoff: every cycle finds "Beautiful People".
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptedResult;

impl ScriptedResult {
    pub const SPECIES_NAME: &'static str = "Beautiful People";
    pub const BASE_POINTS: u32 = 100;
}

impl ResultStrategy for ScriptedResult {
    fn produce_result(&self, context: &DetectionContext) -> DetectionResult {
        DetectionResult::new(
            Self::SPECIES_NAME,
            Category::Human,
            Self::BASE_POINTS,
            100,
            RarityTier::Legendary,
            context.captured_at_epoch_millis(),
            true,
        )
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Getters, CopyGetters, PartialEq, Serialize)]
pub struct SpeciesEntry {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    category: Category,
    #[getset(get_copy = "pub")]
    rarity_tier: RarityTier,
    #[getset(get_copy = "pub")]
    base_points: u32,
}

impl SpeciesEntry {
    pub fn new<S: Into<String>>(
        name: S,
        category: Category,
        rarity_tier: RarityTier,
        base_points: u32,
    ) -> Self {
        SpeciesEntry {
            name: name.into(),
            category,
            rarity_tier,
            base_points,
        }
    }
}

/// Picks the most confident analysed candidate that names a known species.
///
/// Falls back to [ScriptedResult] when no candidate matches the catalog.
#[derive(Clone, Debug, Default)]
pub struct CatalogResult {
    catalog: Vec<SpeciesEntry>,
}

impl CatalogResult {
    pub fn new(catalog: Vec<SpeciesEntry>) -> Self {
        CatalogResult { catalog }
    }

    fn lookup(&self, label: &str) -> Option<&SpeciesEntry> {
        self.catalog
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(label))
    }
}

impl ResultStrategy for CatalogResult {
    fn produce_result(&self, context: &DetectionContext) -> DetectionResult {
        context
            .candidates()
            .iter()
            .filter_map(|candidate| {
                self.lookup(candidate.label())
                    .map(|entry| (entry, candidate.confidence_score()))
            })
            .max_by_key(|(_, confidence)| *confidence)
            .map(|(entry, confidence)| {
                DetectionResult::new(
                    entry.name.as_str(),
                    entry.category,
                    entry.base_points,
                    confidence,
                    entry.rarity_tier,
                    context.captured_at_epoch_millis(),
                    false,
                )
            })
            .unwrap_or_else(|| {
                log::debug!("No catalog species among candidates, using scripted result");
                ScriptedResult.produce_result(context)
            })
    }
}
