use std::fmt;

use serde::Serialize;

use crate::config::ConfidenceBands;
use crate::preprocess::Preset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceBand {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceBand::VeryLow => "very_low",
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
            ConfidenceBand::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies scores into bands and picks a remedial preset for weak reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceThresholdManager {
    bands: ConfidenceBands,
}

impl ConfidenceThresholdManager {
    pub fn new(bands: ConfidenceBands) -> Self {
        ConfidenceThresholdManager { bands }
    }

    pub fn bands(&self) -> &ConfidenceBands {
        &self.bands
    }

    /// Each cutoff is exclusive for the band below it: with the default
    /// bands 59.9 is `Low` and 60.0 is `Medium`.
    pub fn threshold_level(&self, score: f64) -> ConfidenceBand {
        let b = &self.bands;
        if score >= b.very_high {
            ConfidenceBand::VeryHigh
        } else if score >= b.high {
            ConfidenceBand::High
        } else if score >= b.medium {
            ConfidenceBand::Medium
        } else if score >= b.low {
            ConfidenceBand::Low
        } else {
            ConfidenceBand::VeryLow
        }
    }

    pub fn should_retry(&self, score: f64) -> bool {
        score < self.bands.medium
    }

    pub fn preprocessing_suggestion(&self, score: f64) -> Option<Preset> {
        let b = &self.bands;
        if score < b.very_low {
            Some(Preset::LowQuality)
        } else if score < b.low {
            Some(Preset::TextEnhancement)
        } else if score < b.medium {
            Some(Preset::DocumentScan)
        } else {
            None
        }
    }

    /// Preset name for [`preprocessing_suggestion`](Self::preprocessing_suggestion), or `"none"`.
    pub fn suggestion_name(&self, score: f64) -> &'static str {
        self.preprocessing_suggestion(score).map_or("none", Preset::name)
    }
}
