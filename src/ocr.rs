pub mod cloud;
pub mod oar;
pub mod tesseract;

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::config::EngineSettings;
use crate::error::OcrError;

// ── Public types ─────────────────────────────────────────────────────────────

/// The fixed set of recognition backends the manager knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Tesseract,
    Neural,
    CloudVision,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Tesseract, EngineKind::Neural, EngineKind::CloudVision];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Tesseract => "tesseract",
            EngineKind::Neural => "neural",
            EngineKind::CloudVision => "cloud_vision",
        }
    }
}

impl Default for EngineKind {
    fn default() -> Self {
        RecognitionManager::BASELINE
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(EngineKind::Tesseract),
            "neural" | "easyocr" | "oar-ocr" | "oar" => Ok(EngineKind::Neural),
            "cloud_vision" | "google_cloud" | "cloud" => Ok(EngineKind::CloudVision),
            other => Err(OcrError::Config(format!("unknown OCR engine `{other}`"))),
        }
    }
}

/// The native unit an engine reports its confidences in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceScale {
    /// 0 – 100.
    Percent,
    /// 0.0 – 1.0.
    Fraction,
}

/// Map one native confidence onto 0 – 100. Returns `None` for values the
/// engine uses as "not reported" (negative or non-finite).
pub fn normalize_confidence(value: f64, scale: ConfidenceScale) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let pct = match scale {
        ConfidenceScale::Percent => value,
        ConfidenceScale::Fraction => value * 100.0,
    };
    Some(pct.clamp(0.0, 100.0))
}

/// What an engine hands back before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecognition {
    pub text: String,
    /// Per-token (word, line or block) confidences in the engine's own unit.
    pub confidences: Vec<f64>,
    pub scale: ConfidenceScale,
}

/// Engine output in the shape every caller sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub text: String,
    pub word_count: usize,
    pub char_count: usize,
    /// Always on a 0 – 100 scale.
    pub avg_confidence: f64,
    pub language_used: String,
    pub has_text: bool,
    pub engine_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecognitionResult {
    pub fn from_raw(engine: &str, language: &str, raw: RawRecognition) -> Self {
        let text = raw.text.trim().to_string();
        let normalized: Vec<f64> = raw
            .confidences
            .iter()
            .filter_map(|&c| normalize_confidence(c, raw.scale))
            .collect();
        let avg = if normalized.is_empty() {
            0.0
        } else {
            normalized.iter().sum::<f64>() / normalized.len() as f64
        };

        RecognitionResult {
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
            avg_confidence: round2(avg),
            language_used: language.to_string(),
            has_text: !text.is_empty(),
            engine_name: engine.to_string(),
            success: true,
            error: None,
            text,
        }
    }

    pub fn failure(engine: &str, language: &str, error: impl Into<String>) -> Self {
        RecognitionResult {
            text: String::new(),
            word_count: 0,
            char_count: 0,
            avg_confidence: 0.0,
            language_used: language.to_string(),
            has_text: false,
            engine_name: engine.to_string(),
            success: false,
            error: Some(error.into()),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Every OCR backend implements this.
///
/// Availability is decided when the engine is constructed; `is_available`
/// only reports the cached answer. `recognize` may block (native call,
/// network round-trip) but must not keep state between calls.
pub trait EngineCapability: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn is_available(&self) -> bool;

    /// Engine-native language codes this backend can read.
    fn supported_languages(&self) -> Vec<String>;

    fn recognize(&self, image: &DynamicImage, language: &str) -> anyhow::Result<RawRecognition>;

    /// Run recognition and fold any error into a failed result.
    fn extract_text(&self, image: &DynamicImage, language: &str) -> RecognitionResult {
        match self.recognize(image, language) {
            Ok(raw) => RecognitionResult::from_raw(self.name(), language, raw),
            Err(e) => {
                let err = OcrError::EngineExtraction {
                    engine: self.name().to_string(),
                    reason: format!("{e:#}"),
                };
                log::error!("[ocr] {err}");
                RecognitionResult::failure(self.name(), language, err.to_string())
            }
        }
    }
}

// ── Manager ──────────────────────────────────────────────────────────────────

struct RegisteredEngine {
    engine: Box<dyn EngineCapability>,
    available: bool,
    languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    pub available: bool,
    pub supported_languages: Vec<String>,
}

/// Registry of OCR engines with default selection and baseline fallback.
///
/// Read-only after construction, so one manager can serve many threads.
pub struct RecognitionManager {
    engines: BTreeMap<EngineKind, RegisteredEngine>,
    default_engine: EngineKind,
}

impl RecognitionManager {
    /// Engine used when the requested one is not usable.
    pub const BASELINE: EngineKind = EngineKind::Tesseract;

    /// Instantiate every known backend from `settings`.
    pub fn new(settings: &EngineSettings, default_engine: EngineKind) -> Self {
        let engines: Vec<Box<dyn EngineCapability>> = vec![
            Box::new(tesseract::TesseractEngine::new(settings.tessdata_dir.clone())),
            Box::new(oar::NeuralEngine::new(&settings.neural)),
            Box::new(cloud::CloudVisionEngine::new(&settings.cloud)),
        ];
        Self::with_engines(engines, default_engine)
    }

    pub fn with_engines(
        engines: impl IntoIterator<Item = Box<dyn EngineCapability>>,
        default_engine: EngineKind,
    ) -> Self {
        let mut manager = RecognitionManager {
            engines: BTreeMap::new(),
            default_engine,
        };
        for engine in engines {
            manager.register(engine);
        }
        manager
    }

    /// Add an engine, replacing any engine of the same kind. Availability
    /// and languages are read once here.
    pub fn register(&mut self, engine: Box<dyn EngineCapability>) {
        let kind = engine.kind();
        let available =
            panic::catch_unwind(AssertUnwindSafe(|| engine.is_available())).unwrap_or(false);
        let languages = if available {
            panic::catch_unwind(AssertUnwindSafe(|| engine.supported_languages()))
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        log::info!(
            "[ocr] registered {} ({})",
            engine.name(),
            if available { "available" } else { "unavailable" }
        );
        self.engines.insert(
            kind,
            RegisteredEngine {
                engine,
                available,
                languages,
            },
        );
    }

    pub fn default_engine(&self) -> EngineKind {
        self.default_engine
    }

    pub fn is_available(&self, kind: EngineKind) -> bool {
        self.engines.get(&kind).map_or(false, |e| e.available)
    }

    pub fn available_engines(&self) -> Vec<EngineKind> {
        self.engines
            .iter()
            .filter(|(_, e)| e.available)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Pick the engine that will actually run for `requested`.
    ///
    /// Order: requested (or default) → baseline → any other available engine.
    pub fn resolve(&self, requested: Option<EngineKind>) -> Result<EngineKind, OcrError> {
        let wanted = requested.unwrap_or(self.default_engine);
        if self.is_available(wanted) {
            return Ok(wanted);
        }

        let fallback = if self.is_available(Self::BASELINE) {
            Some(Self::BASELINE)
        } else {
            self.available_engines().into_iter().next()
        };

        match fallback {
            Some(kind) => {
                log::warn!(
                    "[ocr] {} fallback: {wanted} → {kind}",
                    OcrError::EngineUnavailable(wanted)
                );
                Ok(kind)
            }
            None => Err(OcrError::NoEngineAvailable),
        }
    }

    /// Extract text with the requested (or default) engine. Never panics;
    /// every failure comes back as `success == false` with `error` set.
    pub fn extract_text(
        &self,
        image: &DynamicImage,
        language: &str,
        engine: Option<EngineKind>,
    ) -> RecognitionResult {
        let requested = engine.unwrap_or(self.default_engine);
        let kind = match self.resolve(engine) {
            Ok(k) => k,
            Err(e) => {
                log::error!("[ocr] {e} (requested {requested})");
                return RecognitionResult::failure(requested.as_str(), language, e.to_string());
            }
        };
        let Some(entry) = self.engines.get(&kind) else {
            return RecognitionResult::failure(
                kind.as_str(),
                language,
                OcrError::EngineUnavailable(kind).to_string(),
            );
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            entry.engine.extract_text(image, language)
        }))
        .unwrap_or_else(|_| {
            let err = OcrError::EngineExtraction {
                engine: entry.engine.name().to_string(),
                reason: "engine panicked".into(),
            };
            log::error!("[ocr] {err}");
            RecognitionResult::failure(entry.engine.name(), language, err.to_string())
        });

        log::debug!(
            "[ocr] {} lang={language} chars={} conf={:.2} success={}",
            result.engine_name,
            result.char_count,
            result.avg_confidence,
            result.success
        );
        result
    }

    /// Availability and languages of every registered engine.
    pub fn engine_info(&self) -> BTreeMap<String, EngineInfo> {
        self.engines
            .iter()
            .map(|(kind, e)| {
                (
                    kind.as_str().to_string(),
                    EngineInfo {
                        available: e.available,
                        supported_languages: e.languages.clone(),
                    },
                )
            })
            .collect()
    }
}
