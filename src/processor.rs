use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::lang;
use crate::ocr::{EngineKind, RecognitionManager, RecognitionResult};
use crate::preprocess::Preset;
use crate::validation::{ConfidenceBand, ConfidenceThresholdManager, TextValidator, ValidationResult};

/// Presets tried on retry when the suggested one has already run, mildest first.
const RETRY_ORDER: [Preset; 3] = [
    Preset::DocumentScan,
    Preset::TextEnhancement,
    Preset::LowQuality,
];

/// Shared cancellation flag for batches. Checked before each image starts;
/// an image already being read runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(pub Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-call overrides. Unset fields fall back to the processor's config.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    /// Preset for the first attempt; `None` reads the image as given.
    pub preset: Option<Preset>,
    pub engine: Option<EngineKind>,
    /// Interface language tag, e.g. `"en"`.
    pub language: Option<String>,
    /// Overrides `retry.enabled`.
    pub retry: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptSummary {
    pub preset: Option<Preset>,
    pub engine: String,
    pub success: bool,
    pub avg_confidence: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub recognition: RecognitionResult,
    pub validation: ValidationResult,
    pub band: ConfidenceBand,
    /// Preset of the winning attempt.
    pub preset_used: Option<Preset>,
    /// Every attempt in the order it ran.
    pub attempts: Vec<AttemptSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub id: String,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProcessOutcome>,
}

struct Attempt {
    preset: Option<Preset>,
    recognition: RecognitionResult,
    validation: ValidationResult,
}

impl Attempt {
    fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            preset: self.preset,
            engine: self.recognition.engine_name.clone(),
            success: self.recognition.success,
            avg_confidence: self.recognition.avg_confidence,
            final_score: self.validation.final_score,
        }
    }
}

/// Preprocess → recognise → validate, with preset retries for weak reads.
pub struct OcrProcessor {
    config: OcrConfig,
    manager: RecognitionManager,
    validator: TextValidator,
    thresholds: ConfidenceThresholdManager,
}

impl OcrProcessor {
    /// Validate `config` and build every engine it describes.
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        config.validate()?;
        let manager = RecognitionManager::new(&config.engines, config.default_engine);
        Ok(Self::with_manager(config, manager))
    }

    /// Use an already-populated manager, e.g. with custom engines.
    pub fn with_manager(config: OcrConfig, manager: RecognitionManager) -> Self {
        let validator = TextValidator::with_config(config.validator_language(), config.validator);
        let thresholds = ConfidenceThresholdManager::new(config.thresholds);
        OcrProcessor {
            config,
            manager,
            validator,
            thresholds,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn manager(&self) -> &RecognitionManager {
        &self.manager
    }

    pub fn validator(&self) -> &TextValidator {
        &self.validator
    }

    pub fn thresholds(&self) -> &ConfidenceThresholdManager {
        &self.thresholds
    }

    pub fn process(&self, image: &DynamicImage, options: &ProcessOptions) -> ProcessOutcome {
        let tag = options.language.as_deref().unwrap_or(&self.config.language);
        let language = lang::engine_code(tag);

        let local_validator;
        let validator = if lang::validator_language(tag) == self.validator.language() {
            &self.validator
        } else {
            local_validator =
                TextValidator::with_config(lang::validator_language(tag), self.config.validator);
            &local_validator
        };

        let retry = options.retry.unwrap_or(self.config.retry.enabled);
        let budget = if retry { self.config.retry.max_retries } else { 0 };

        let first = self.attempt(image, options.preset, options.engine, language, validator);
        let mut attempts = vec![first.summary()];
        let mut tried = vec![options.preset];
        let mut last_score = first.validation.final_score;
        let mut best = first;

        for _ in 0..budget {
            if !best.recognition.success {
                log::warn!("[processor] recognition failed, not retrying");
                break;
            }
            if !self.thresholds.should_retry(best.validation.final_score) {
                break;
            }
            let Some(preset) = self.next_preset(last_score, &tried) else {
                log::debug!("[processor] no untried preset left");
                break;
            };
            log::info!(
                "[processor] score {:.1} below {}, retrying with {preset}",
                best.validation.final_score,
                self.thresholds.bands().medium
            );

            let next = self.attempt(image, Some(preset), options.engine, language, validator);
            attempts.push(next.summary());
            tried.push(Some(preset));
            last_score = next.validation.final_score;
            if next.validation.final_score > best.validation.final_score {
                best = next;
            }
        }

        let band = self.thresholds.threshold_level(best.validation.final_score);
        log::info!(
            "[processor] {} via {} → score {:.1} ({band}) after {} attempt(s)",
            best.preset.map_or("no preset", Preset::name),
            best.recognition.engine_name,
            best.validation.final_score,
            attempts.len()
        );

        ProcessOutcome {
            recognition: best.recognition,
            validation: best.validation,
            band,
            preset_used: best.preset,
            attempts,
        }
    }

    /// Process `(id, image)` pairs on the rayon pool. Output order matches
    /// input order; images not yet started when `cancel` is set are skipped.
    pub fn process_batch(
        &self,
        items: &[(String, DynamicImage)],
        options: &ProcessOptions,
        cancel: &CancelFlag,
    ) -> Vec<BatchItem> {
        log::info!("[processor] batch of {} image(s)", items.len());

        let results: Vec<BatchItem> = items
            .par_iter()
            .map(|(id, image)| {
                if cancel.is_cancelled() {
                    return BatchItem {
                        id: id.clone(),
                        cancelled: true,
                        outcome: None,
                    };
                }
                BatchItem {
                    id: id.clone(),
                    cancelled: false,
                    outcome: Some(self.process(image, options)),
                }
            })
            .collect();

        let skipped = results.iter().filter(|r| r.cancelled).count();
        if skipped > 0 {
            log::info!("[processor] batch cancelled, {skipped} image(s) skipped");
        }
        results
    }

    fn attempt(
        &self,
        image: &DynamicImage,
        preset: Option<Preset>,
        engine: Option<EngineKind>,
        language: &str,
        validator: &TextValidator,
    ) -> Attempt {
        let prepared = preset.map(|p| p.pipeline().apply(image));
        let input = prepared.as_ref().unwrap_or(image);

        let recognition = self.manager.extract_text(input, language, engine);
        let validation = validator.validate_text(&recognition.text, recognition.avg_confidence);
        Attempt {
            preset,
            recognition,
            validation,
        }
    }

    /// The suggested preset for `score`, or the mildest one not yet tried.
    fn next_preset(&self, score: f64, tried: &[Option<Preset>]) -> Option<Preset> {
        let untried = |p: &Preset| !tried.contains(&Some(*p));
        self.thresholds
            .preprocessing_suggestion(score)
            .filter(untried)
            .or_else(|| RETRY_ORDER.into_iter().find(untried))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::ocr::{ConfidenceScale, EngineCapability, RawRecognition};

    /// Reads clean text only from binarised (single-plane) input.
    struct PrefersBinary {
        calls: Arc<AtomicUsize>,
    }

    impl EngineCapability for PrefersBinary {
        fn kind(&self) -> EngineKind {
            EngineKind::Tesseract
        }
        fn is_available(&self) -> bool {
            true
        }
        fn supported_languages(&self) -> Vec<String> {
            vec!["eng".into(), "por".into()]
        }
        fn recognize(&self, image: &DynamicImage, _: &str) -> anyhow::Result<RawRecognition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (text, conf) = match image {
                DynamicImage::ImageLuma8(_) => ("The total is 42 dollars and 10 cents", 92.0),
                _ => ("xx%%", 12.0),
            };
            Ok(RawRecognition {
                text: text.into(),
                confidences: vec![conf],
                scale: ConfidenceScale::Percent,
            })
        }
    }

    fn processor(retry: bool) -> (OcrProcessor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine: Box<dyn EngineCapability> = Box::new(PrefersBinary {
            calls: calls.clone(),
        });
        let mut config = OcrConfig::default();
        config.language = "en".into();
        config.retry.enabled = retry;
        let manager = RecognitionManager::with_engines(vec![engine], EngineKind::Tesseract);
        (OcrProcessor::with_manager(config, manager), calls)
    }

    fn color_image() -> DynamicImage {
        DynamicImage::new_rgb8(32, 16)
    }

    #[test]
    fn weak_read_is_retried_with_suggested_preset() {
        let (p, calls) = processor(true);
        let out = p.process(&color_image(), &ProcessOptions::default());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(out.attempts.len(), 2);
        assert_eq!(out.attempts[0].preset, None);
        // The colour read scores 49.8, which suggests the document-scan preset.
        assert_eq!(out.preset_used, Some(Preset::DocumentScan));
        assert_eq!(out.recognition.text, "The total is 42 dollars and 10 cents");
        assert!(out.validation.is_valid);
        assert!(out.band >= ConfidenceBand::High);
    }

    #[test]
    fn retry_can_be_disabled_per_call() {
        let (p, calls) = processor(true);
        let out = p.process(
            &color_image(),
            &ProcessOptions {
                retry: Some(false),
                ..ProcessOptions::default()
            },
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.preset_used, None);
        assert_eq!(out.band, ConfidenceBand::Low);
    }

    #[test]
    fn good_first_read_is_not_retried() {
        let (p, calls) = processor(true);
        let out = p.process(
            &color_image(),
            &ProcessOptions {
                preset: Some(Preset::DocumentScan),
                ..ProcessOptions::default()
            },
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.preset_used, Some(Preset::DocumentScan));
        assert_eq!(out.attempts.len(), 1);
    }

    #[test]
    fn no_engine_means_failed_recognition_without_retries() {
        let manager = RecognitionManager::with_engines(Vec::new(), EngineKind::Tesseract);
        let p = OcrProcessor::with_manager(OcrConfig::default(), manager);
        let out = p.process(&color_image(), &ProcessOptions::default());
        assert!(!out.recognition.success);
        assert!(out.recognition.error.is_some());
        assert_eq!(out.attempts.len(), 1);
        assert!(!out.validation.is_valid);
        assert_eq!(out.validation.final_score, 0.0);
    }

    #[test]
    fn next_preset_skips_tried_ones() {
        let (p, _) = processor(true);
        assert_eq!(p.next_preset(10.0, &[None]), Some(Preset::LowQuality));
        assert_eq!(
            p.next_preset(10.0, &[None, Some(Preset::LowQuality)]),
            Some(Preset::DocumentScan)
        );
        let all = [
            None,
            Some(Preset::LowQuality),
            Some(Preset::DocumentScan),
            Some(Preset::TextEnhancement),
        ];
        assert_eq!(p.next_preset(10.0, &all), None);
    }

    #[test]
    fn batch_keeps_order_and_honours_cancel() {
        let (p, _) = processor(false);
        let items: Vec<(String, DynamicImage)> = (0..4)
            .map(|i| (format!("img-{i}"), color_image()))
            .collect();

        let done = p.process_batch(&items, &ProcessOptions::default(), &CancelFlag::default());
        let ids: Vec<&str> = done.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["img-0", "img-1", "img-2", "img-3"]);
        assert!(done.iter().all(|b| !b.cancelled && b.outcome.is_some()));

        let cancel = CancelFlag::default();
        cancel.cancel();
        let skipped = p.process_batch(&items, &ProcessOptions::default(), &cancel);
        assert!(skipped.iter().all(|b| b.cancelled && b.outcome.is_none()));

        cancel.reset();
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = OcrConfig::default();
        config.thresholds.medium = 10.0;
        assert!(matches!(OcrProcessor::new(config), Err(OcrError::Config(_))));
    }
}
