//! Image preprocessing applied before recognition.
//!
//! A [`PreprocessingPipeline`] is an ordered list of [`Step`]s built with
//! chained calls. Applying it never fails from the caller's point of view:
//! a broken step is logged and skipped, and if the run as a whole goes wrong
//! the caller gets the untouched input back.

mod ops;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// How a threshold step binarizes its input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMethod {
    /// Gaussian-weighted local threshold over an odd `block_size` window.
    Adaptive { block_size: u32, c: i32 },
    /// Global Otsu level.
    Otsu,
    /// Global level of 127.
    Fixed,
}

/// One image transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Grayscale,
    Blur { kernel_size: u32 },
    Denoise,
    ContrastEnhance { factor: f32 },
    Sharpen,
    Resize { scale_factor: f32 },
    Threshold { method: ThresholdMethod },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Grayscale => "grayscale",
            Step::Blur { .. } => "blur",
            Step::Denoise => "denoise",
            Step::ContrastEnhance { .. } => "contrast",
            Step::Sharpen => "sharpen",
            Step::Resize { .. } => "resize",
            Step::Threshold { .. } => "threshold",
        }
    }

    /// Run this step on a normalized (Luma8 or Rgb8) image.
    fn run(&self, img: &DynamicImage) -> Result<DynamicImage, OcrError> {
        match *self {
            Step::Grayscale => Ok(ops::grayscale(img)),
            Step::Blur { kernel_size } => ops::blur(img, kernel_size),
            Step::Denoise => Ok(ops::denoise(img)),
            Step::ContrastEnhance { factor } => ops::contrast(img, factor),
            Step::Sharpen => Ok(ops::sharpen(img)),
            Step::Resize { scale_factor } => ops::resize(img, scale_factor),
            Step::Threshold { method } => match method {
                ThresholdMethod::Adaptive { block_size, c } => {
                    ops::threshold_adaptive(img, block_size, c)
                }
                ThresholdMethod::Otsu => Ok(ops::threshold_otsu(img)),
                ThresholdMethod::Fixed => Ok(ops::threshold_fixed(img)),
            },
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Blur { kernel_size } => write!(f, "blur({kernel_size})"),
            Step::ContrastEnhance { factor } => write!(f, "contrast({factor})"),
            Step::Resize { scale_factor } => write!(f, "resize({scale_factor})"),
            Step::Threshold { method: ThresholdMethod::Adaptive { block_size, c } } => {
                write!(f, "threshold(adaptive, block={block_size}, c={c})")
            }
            Step::Threshold { method: ThresholdMethod::Otsu } => write!(f, "threshold(otsu)"),
            Step::Threshold { method: ThresholdMethod::Fixed } => write!(f, "threshold(fixed)"),
            other => f.write_str(other.name()),
        }
    }
}

/// Ordered list of transforms. Holds no per-image state, so one pipeline
/// can be cloned or shared across threads freely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessingPipeline {
    steps: Vec<Step>,
}

impl PreprocessingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn grayscale(self) -> Self {
        self.add_step(Step::Grayscale)
    }

    pub fn blur(self, kernel_size: u32) -> Self {
        self.add_step(Step::Blur { kernel_size })
    }

    pub fn denoise(self) -> Self {
        self.add_step(Step::Denoise)
    }

    pub fn contrast(self, factor: f32) -> Self {
        self.add_step(Step::ContrastEnhance { factor })
    }

    pub fn sharpen(self) -> Self {
        self.add_step(Step::Sharpen)
    }

    pub fn resize(self, scale_factor: f32) -> Self {
        self.add_step(Step::Resize { scale_factor })
    }

    pub fn threshold(self, method: ThresholdMethod) -> Self {
        self.add_step(Step::Threshold { method })
    }

    pub fn clear(mut self) -> Self {
        self.steps.clear();
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply every step in order and return the result.
    ///
    /// The input is never modified. On an unrecoverable failure the
    /// original image is returned unchanged.
    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        match self.try_apply(image) {
            Ok(out) => out,
            Err(e) => {
                log::error!("[preprocess] {e}; returning original image");
                image.clone()
            }
        }
    }

    fn try_apply(&self, image: &DynamicImage) -> Result<DynamicImage, OcrError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(OcrError::PipelineFailure(format!("input image is {w}x{h}")));
        }

        let mut current = panic::catch_unwind(AssertUnwindSafe(|| ops::normalize(image)))
            .map_err(|_| OcrError::PipelineFailure("could not convert input image".into()))?;

        for step in &self.steps {
            // A panic inside an image routine counts as that step failing.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.run(&current)))
                .unwrap_or_else(|_| Err(OcrError::step(step.name(), "panicked")));
            match outcome {
                Ok(next) => {
                    log::debug!(
                        "[preprocess] applied {step} → {}×{}",
                        next.width(),
                        next.height()
                    );
                    current = next;
                }
                Err(e) => log::warn!("[preprocess] {e}; step skipped"),
            }
        }
        Ok(current)
    }
}

// ── Presets ──────────────────────────────────────────────────────────────────

/// Named step sequences tuned for common capture situations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    TextEnhancement,
    LowQuality,
    Handwriting,
    DocumentScan,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::TextEnhancement,
        Preset::LowQuality,
        Preset::Handwriting,
        Preset::DocumentScan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::TextEnhancement => "text_enhancement",
            Preset::LowQuality => "low_quality",
            Preset::Handwriting => "handwriting",
            Preset::DocumentScan => "document_scan",
        }
    }

    pub fn pipeline(self) -> PreprocessingPipeline {
        let p = PreprocessingPipeline::new();
        match self {
            Preset::TextEnhancement => p
                .grayscale()
                .blur(3)
                .contrast(1.5)
                .sharpen()
                .threshold(ThresholdMethod::Adaptive { block_size: 11, c: 2 }),
            Preset::LowQuality => p
                .grayscale()
                .denoise()
                .contrast(2.0)
                .resize(2.0)
                .threshold(ThresholdMethod::Otsu),
            Preset::Handwriting => p
                .grayscale()
                .blur(5)
                .contrast(1.8)
                .sharpen()
                .threshold(ThresholdMethod::Adaptive { block_size: 15, c: 3 }),
            Preset::DocumentScan => p
                .grayscale()
                .denoise()
                .contrast(1.3)
                .threshold(ThresholdMethod::Otsu),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s.trim())
            .ok_or_else(|| OcrError::Config(format!("unknown preprocessing preset `{s}`")))
    }
}
