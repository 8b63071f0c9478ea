//! OCR quality pipeline: image preprocessing, multi-engine recognition with
//! fallback, and heuristic validation of the recognised text.
//!
//! ```no_run
//! use grabtext_lib::{OcrConfig, OcrProcessor, ProcessOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let processor = OcrProcessor::new(OcrConfig::from_json(r#"{"language":"en"}"#)?)?;
//! let image = image::open("capture.png")?;
//! let outcome = processor.process(&image, &ProcessOptions::default());
//! println!("{} ({:.1}, {})", outcome.recognition.text, outcome.validation.final_score, outcome.band);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lang;
pub mod ocr;
pub mod preprocess;
pub mod processor;
pub mod validation;

pub use config::OcrConfig;
pub use error::OcrError;
pub use ocr::{EngineCapability, EngineKind, RecognitionManager, RecognitionResult};
pub use preprocess::{PreprocessingPipeline, Preset, Step, ThresholdMethod};
pub use processor::{BatchItem, CancelFlag, OcrProcessor, ProcessOptions, ProcessOutcome};
pub use validation::{
    ConfidenceBand, ConfidenceThresholdManager, TextValidator, ValidationResult,
};
