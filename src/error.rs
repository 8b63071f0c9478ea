use thiserror::Error;

use crate::ocr::EngineKind;

/// Every failure the pipeline can observe.
///
/// Only configuration parsing hands these back to callers as `Err`. The
/// preprocessing and recognition paths recover from them locally (skip the
/// step, return the original image, fall back to the baseline engine) and
/// surface them through logs or `RecognitionResult::error`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OcrError {
    /// One preprocessing step could not run; the pipeline skips it.
    #[error("preprocessing step `{step}` failed: {reason}")]
    StepFailure { step: String, reason: String },

    /// The pipeline as a whole failed; the caller gets the original image back.
    #[error("preprocessing pipeline failed: {0}")]
    PipelineFailure(String),

    #[error("OCR engine `{0}` is not available")]
    EngineUnavailable(EngineKind),

    /// The engine ran but could not produce text.
    #[error("{engine} extraction failed: {reason}")]
    EngineExtraction { engine: String, reason: String },

    #[error("no OCR engine available")]
    NoEngineAvailable,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OcrError {
    pub(crate) fn step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        OcrError::StepFailure {
            step: step.into(),
            reason: reason.into(),
        }
    }
}
