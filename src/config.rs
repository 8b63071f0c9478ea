use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::lang;
use crate::ocr::EngineKind;

/// Top-level configuration for an [`OcrProcessor`](crate::processor::OcrProcessor).
///
/// Every section has defaults, so `{}` is a valid configuration and older
/// JSON missing newer sections still parses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    /// Interface language tag ("pt", "en", …). Mapped to an engine code for
    /// recognition and to a table set for validation.
    pub language: String,
    pub default_engine: EngineKind,
    pub engines: EngineSettings,
    pub validator: ValidatorConfig,
    pub thresholds: ConfidenceBands,
    pub retry: RetryPolicy,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            language: "pt".to_string(),
            default_engine: EngineKind::Tesseract,
            engines: EngineSettings::default(),
            validator: ValidatorConfig::default(),
            thresholds: ConfidenceBands::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl OcrConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, OcrError> {
        let cfg: OcrConfig =
            serde_json::from_str(text).map_err(|e| OcrError::Config(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), OcrError> {
        self.thresholds.validate()?;
        if !(0.0..=100.0).contains(&self.validator.min_score) {
            return Err(OcrError::Config(format!(
                "validator.min_score must be within 0..=100, got {}",
                self.validator.min_score
            )));
        }
        if self.retry.enabled && self.retry.max_retries == 0 {
            return Err(OcrError::Config(
                "retry.max_retries must be at least 1 when retry is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Engine-native code for `language` ("pt" → "por").
    pub fn engine_language(&self) -> &'static str {
        lang::engine_code(&self.language)
    }

    pub fn validator_language(&self) -> &'static str {
        lang::validator_language(&self.language)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineSettings {
    /// Tesseract data path; `None` uses the library default.
    pub tessdata_dir: Option<String>,
    pub neural: NeuralSettings,
    pub cloud: CloudSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NeuralSettings {
    /// ONNX recognition model, e.g. `pp-ocrv5_mobile_rec.onnx`.
    pub rec_model: Option<String>,
    /// Character dictionary matching the model, e.g. `ppocrv5_dict.txt`.
    pub dict: Option<String>,
    /// Engine-native codes the model was trained on.
    pub languages: Vec<String>,
}

impl Default for NeuralSettings {
    fn default() -> Self {
        NeuralSettings {
            rec_model: None,
            dict: None,
            languages: ["eng", "chi_sim", "chi_tra", "jpn"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CloudSettings {
    pub endpoint: String,
    /// Takes precedence over `api_key_env`. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSettings {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            api_key: None,
            api_key_env: "GOOGLE_VISION_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Cut-offs the text validator uses to call a result valid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Minimum composite score (0–100).
    pub min_score: f64,
    /// Minimum character count of the trimmed text.
    pub min_chars: usize,
    /// Minimum whitespace-delimited word count.
    pub min_words: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            min_score: 30.0,
            min_chars: 3,
            min_words: 1,
        }
    }
}

/// Cutoffs of the five confidence bands. A score sits in the highest band
/// whose cutoff it reaches; anything below `low` is `very_low`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceBands {
    pub very_low: f64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub very_high: f64,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        ConfidenceBands {
            very_low: 20.0,
            low: 40.0,
            medium: 60.0,
            high: 80.0,
            very_high: 95.0,
        }
    }
}

impl ConfidenceBands {
    /// Bands must be strictly ascending and lie within 0..=100.
    pub fn validate(&self) -> Result<(), OcrError> {
        let cuts = [self.very_low, self.low, self.medium, self.high, self.very_high];
        let in_range = cuts.iter().all(|c| (0.0..=100.0).contains(c));
        let ascending = cuts.windows(2).all(|w| w[0] < w[1]);
        if in_range && ascending {
            Ok(())
        } else {
            Err(OcrError::Config(format!(
                "confidence bands must be ascending within 0..=100, got {cuts:?}"
            )))
        }
    }
}

/// Whether a low-scoring read is retried with a suggested preset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub enabled: bool,
    /// Extra attempts after the first one.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            enabled: true,
            max_retries: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg = OcrConfig::from_json("{}").unwrap();
        assert_eq!(cfg, OcrConfig::default());
        assert_eq!(cfg.engine_language(), "por");
        assert_eq!(cfg.validator_language(), "pt");
        assert_eq!(cfg.validator.min_score, 30.0);
        assert_eq!(cfg.thresholds.medium, 60.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = OcrConfig::from_json(
            r#"{"language":"en","default_engine":"cloud_vision",
                "engines":{"cloud":{"timeout_secs":5}},
                "validator":{"min_chars":5}}"#,
        )
        .unwrap();
        assert_eq!(cfg.default_engine, EngineKind::CloudVision);
        assert_eq!(cfg.engines.cloud.timeout_secs, 5);
        assert_eq!(cfg.engines.cloud.api_key_env, "GOOGLE_VISION_API_KEY");
        assert_eq!(cfg.validator.min_chars, 5);
        assert_eq!(cfg.validator.min_words, 1);
        assert_eq!(cfg.engine_language(), "eng");
    }

    #[test]
    fn rejects_unordered_bands() {
        let err = OcrConfig::from_json(r#"{"thresholds":{"low":70}}"#).unwrap_err();
        assert!(matches!(err, OcrError::Config(_)));
    }

    #[test]
    fn rejects_retry_without_budget() {
        assert!(OcrConfig::from_json(r#"{"retry":{"enabled":true,"max_retries":0}}"#).is_err());
        assert!(OcrConfig::from_json(r#"{"retry":{"enabled":false,"max_retries":0}}"#).is_ok());
    }

    #[test]
    fn rejects_bad_json_and_engine_names() {
        assert!(OcrConfig::from_json("{").is_err());
        assert!(OcrConfig::from_json(r#"{"default_engine":"abbyy"}"#).is_err());
    }

    #[test]
    fn api_key_is_not_serialized() {
        let mut cfg = OcrConfig::default();
        cfg.engines.cloud.api_key = Some("secret".into());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }
}
