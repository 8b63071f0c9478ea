use std::path::Path;

use image::DynamicImage;

#[cfg(feature = "neural")]
use super::ConfidenceScale;
use super::{EngineCapability, EngineKind, RawRecognition};
use crate::config::NeuralSettings;

/// Minimum height fed to PaddleOCR v5 mobile (normalises inputs to 48 px internally).
const MIN_HEIGHT: u32 = 48;

/// PaddleOCR text-line recognition through oar-ocr / ONNX Runtime.
///
/// The model reads one text line per call, so it suits pre-cropped regions
/// better than whole screenshots.
pub struct NeuralEngine {
    languages: Vec<String>,
    #[cfg(feature = "neural")]
    pipeline: Option<native::OarPipeline>,
}

impl NeuralEngine {
    pub fn new(settings: &NeuralSettings) -> Self {
        NeuralEngine {
            languages: settings.languages.clone(),
            #[cfg(feature = "neural")]
            pipeline: native::load(settings),
        }
    }

    fn loaded(&self) -> bool {
        #[cfg(feature = "neural")]
        {
            self.pipeline.is_some()
        }
        #[cfg(not(feature = "neural"))]
        {
            false
        }
    }
}

impl EngineCapability for NeuralEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Neural
    }

    fn is_available(&self) -> bool {
        self.loaded()
    }

    fn supported_languages(&self) -> Vec<String> {
        self.languages.clone()
    }

    fn recognize(&self, image: &DynamicImage, language: &str) -> anyhow::Result<RawRecognition> {
        if !self.languages.iter().any(|l| l == language) {
            log::debug!("[oar] language `{language}` not in model list, recognising anyway");
        }
        let input = upscale_to_min_height(image);

        #[cfg(feature = "neural")]
        {
            let pipeline = self
                .pipeline
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("recognition model not loaded"))?;
            pipeline.predict(input)
        }
        #[cfg(not(feature = "neural"))]
        {
            let _ = input;
            anyhow::bail!("neural OCR support not compiled in")
        }
    }
}

/// Upscale so the height is at least `MIN_HEIGHT`, keeping aspect ratio.
/// The model is fed RGB regardless of the input layout.
fn upscale_to_min_height(image: &DynamicImage) -> image::RgbImage {
    let img = image.to_rgb8();
    let (w, h) = (img.width(), img.height());
    if h == 0 || h >= MIN_HEIGHT {
        return img;
    }
    let scale = (MIN_HEIGHT + h - 1) / h; // ceiling division
    DynamicImage::ImageRgb8(img)
        .resize(w * scale, h * scale, image::imageops::FilterType::Lanczos3)
        .to_rgb8()
}

/// Both files must exist before we try to build a session.
#[cfg_attr(not(feature = "neural"), allow(dead_code))]
fn model_files_present(settings: &NeuralSettings) -> bool {
    match (&settings.rec_model, &settings.dict) {
        (Some(model), Some(dict)) => Path::new(model).is_file() && Path::new(dict).is_file(),
        _ => false,
    }
}

#[cfg(feature = "neural")]
mod native {
    use image::RgbImage;
    use oar_ocr::predictors::TextRecognitionPredictor;

    use super::{model_files_present, ConfidenceScale, RawRecognition};
    use crate::config::NeuralSettings;

    pub(super) struct OarPipeline {
        rec: TextRecognitionPredictor,
    }

    // SAFETY: the recognition predictor holds no per-call state; the ORT
    // session behind it is only read during `predict`.
    unsafe impl Send for OarPipeline {}
    unsafe impl Sync for OarPipeline {}

    pub(super) fn load(settings: &NeuralSettings) -> Option<OarPipeline> {
        if !model_files_present(settings) {
            log::info!("[oar] recognition model or dictionary not found, neural engine disabled");
            return None;
        }
        let model = settings.rec_model.as_deref()?;
        let dict = settings.dict.as_deref()?;
        match TextRecognitionPredictor::builder()
            .dict_path(dict)
            .score_threshold(0.0)
            .build(model)
        {
            Ok(rec) => {
                log::info!("[oar] pipeline ready (model: {model})");
                Some(OarPipeline { rec })
            }
            Err(e) => {
                log::warn!("[oar] init failed: {e}");
                None
            }
        }
    }

    impl OarPipeline {
        pub(super) fn predict(&self, img: RgbImage) -> anyhow::Result<RawRecognition> {
            log::debug!("[oar] input {}×{}", img.width(), img.height());
            let result = self
                .rec
                .predict(vec![img])
                .map_err(|e| anyhow::anyhow!("predict error: {e}"))?;

            let text = result.texts.into_iter().next().unwrap_or_default();
            let score = result.scores.into_iter().next().unwrap_or(0.0);
            log::debug!("[oar] result: {:?} conf={score:.3}", text);

            Ok(RawRecognition {
                text: text.to_string(),
                confidences: vec![score as f64],
                scale: ConfidenceScale::Fraction,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(model: Option<&str>, dict: Option<&str>) -> NeuralSettings {
        NeuralSettings {
            rec_model: model.map(str::to_string),
            dict: dict.map(str::to_string),
            ..NeuralSettings::default()
        }
    }

    #[test]
    fn short_crops_are_upscaled() {
        let out = upscale_to_min_height(&DynamicImage::new_luma8(30, 16));
        assert_eq!(out.dimensions(), (90, 48));
        let tall = upscale_to_min_height(&DynamicImage::new_rgb8(30, 60));
        assert_eq!(tall.dimensions(), (30, 60));
    }

    #[test]
    fn missing_model_files_mean_unavailable() {
        assert!(!model_files_present(&settings(None, None)));
        assert!(!model_files_present(&settings(Some("/nope.onnx"), Some("/nope.txt"))));
        let engine = NeuralEngine::new(&settings(Some("/nope.onnx"), Some("/nope.txt")));
        assert!(!engine.is_available());
        assert!(!engine.extract_text(&DynamicImage::new_rgb8(8, 8), "eng").success);
    }

    #[test]
    fn reports_configured_languages() {
        let engine = NeuralEngine::new(&NeuralSettings {
            languages: vec!["eng".into(), "chi_sim".into()],
            ..NeuralSettings::default()
        });
        assert_eq!(engine.supported_languages(), vec!["eng", "chi_sim"]);
    }
}
