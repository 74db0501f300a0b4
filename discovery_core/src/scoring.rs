use serde::{Deserialize, Serialize};

use crate::detection::DetectionResult;
use crate::prelude::*;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Clear,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
}

impl Weather {
    /// Extra points, in percent, for going out in this weather
    pub fn bonus_percent(&self) -> u32 {
        match self {
            Self::Clear => 0,
            Self::Cloudy => 10,
            Self::Rainy => 25,
            Self::Stormy => 50,
            Self::Snowy => 30,
        }
    }
}

impl std::str::FromStr for Weather {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clear" => Ok(Self::Clear),
            "cloudy" => Ok(Self::Cloudy),
            "rainy" => Ok(Self::Rainy),
            "stormy" => Ok(Self::Stormy),
            "snowy" => Ok(Self::Snowy),
            _ => Err(format!("unknown weather [{s}]")),
        }
    }
}

/// Everything outside the detection itself that changes how much a result is worth.
#[derive(Clone, Copy, Debug, Default, Resource)]
pub struct PointModifiers {
    pub weather: Weather,
}

impl PointModifiers {
    pub fn new(weather: Weather) -> Self {
        PointModifiers { weather }
    }

    /// Scripted results are already worth their face value, so rarity only
    /// scales the rest. Weather applies to everything.
    pub fn adjust(&self, result: &DetectionResult) -> DetectionResult {
        let mut points = result.base_points() as u64;
        if !result.is_special_result() {
            points = points * result.rarity_tier().multiplier_percent() as u64 / 100;
        }
        points = points * (100 + self.weather.bonus_percent()) as u64 / 100;
        result.with_adjusted_points(points.min(u32::MAX as u64) as u32)
    }
}
