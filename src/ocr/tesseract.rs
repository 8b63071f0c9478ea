use std::path::{Path, PathBuf};

use image::DynamicImage;

use super::{EngineCapability, EngineKind, RawRecognition};

/// Reported when no tessdata directory can be listed.
const FALLBACK_LANGUAGES: &[&str] = &["eng", "por"];

/// Native libtesseract backend. This is the baseline engine the manager
/// falls back to.
pub struct TesseractEngine {
    /// Passed to `Tesseract::new` as the data path; `None` = system default.
    tessdata_dir: Option<String>,
    available: bool,
}

impl TesseractEngine {
    pub fn new(tessdata_dir: Option<String>) -> Self {
        let available = probe(tessdata_dir.as_deref());
        TesseractEngine {
            tessdata_dir,
            available,
        }
    }
}

impl EngineCapability for TesseractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Tesseract
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn supported_languages(&self) -> Vec<String> {
        let listed = self
            .tessdata_dir
            .as_deref()
            .map(list_traineddata)
            .unwrap_or_default();
        if listed.is_empty() {
            FALLBACK_LANGUAGES.iter().map(|l| l.to_string()).collect()
        } else {
            listed
        }
    }

    fn recognize(&self, image: &DynamicImage, language: &str) -> anyhow::Result<RawRecognition> {
        native::recognize(self.tessdata_dir.as_deref(), image, language)
    }
}

/// Language models in `<dir>/tessdata/` or `<dir>/` itself.
fn list_traineddata(dir: &str) -> Vec<String> {
    let root = Path::new(dir);
    let mut langs: Vec<String> = [root.join("tessdata"), PathBuf::from(root)]
        .iter()
        .filter_map(|d| std::fs::read_dir(d).ok())
        .flat_map(|entries| entries.flatten())
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension()? != "traineddata" {
                return None;
            }
            path.file_stem()?.to_str().map(str::to_string)
        })
        .filter(|l| l != "osd")
        .collect();
    langs.sort();
    langs.dedup();
    langs
}

#[cfg(feature = "tesseract")]
fn probe(tessdata_dir: Option<&str>) -> bool {
    match tesseract::Tesseract::new(tessdata_dir, Some(crate::lang::DEFAULT_ENGINE_CODE)) {
        Ok(_) => true,
        Err(e) => {
            log::warn!("[ocr] tesseract not available: {e}");
            false
        }
    }
}

#[cfg(not(feature = "tesseract"))]
fn probe(_tessdata_dir: Option<&str>) -> bool {
    log::info!("[ocr] tesseract support not compiled in (enable the `tesseract` feature)");
    false
}

#[cfg(feature = "tesseract")]
mod native {
    use anyhow::Context;
    use image::{DynamicImage, GenericImageView};
    use rayon::prelude::*;
    use tesseract::{PageSegMode, Tesseract};

    use crate::ocr::{ConfidenceScale, RawRecognition};

    /// Layouts tried for every image; the most confident read wins.
    const PSMS: &[PageSegMode] = &[
        PageSegMode::PsmAuto,
        PageSegMode::PsmSingleBlock,
        PageSegMode::PsmSingleLine,
    ];

    pub(super) fn recognize(
        tessdata_dir: Option<&str>,
        image: &DynamicImage,
        language: &str,
    ) -> anyhow::Result<RawRecognition> {
        let (w, h) = image.dimensions();
        let rgb;
        let (bytes, bpp): (&[u8], i32) = match image {
            DynamicImage::ImageLuma8(g) => (g.as_raw(), 1),
            other => {
                rgb = other.to_rgb8();
                (rgb.as_raw(), 3)
            }
        };

        let mut errors = Vec::new();
        let best = PSMS
            .par_iter()
            .map(|&psm| try_ocr(tessdata_dir, bytes, w, h, bpp, language, psm))
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|r| r.map_err(|e| errors.push(format!("{e:#}"))).ok())
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((text, conf)) => Ok(RawRecognition {
                text,
                confidences: vec![conf],
                scale: ConfidenceScale::Percent,
            }),
            None => anyhow::bail!("all page segmentation modes failed: {}", errors.join("; ")),
        }
    }

    /// One Tesseract pass. `bpp` = bytes per pixel: 1 for luma, 3 for RGB.
    fn try_ocr(
        tessdata_dir: Option<&str>,
        bytes: &[u8],
        w: u32,
        h: u32,
        bpp: i32,
        language: &str,
        psm: PageSegMode,
    ) -> anyhow::Result<(String, f64)> {
        let mut tess = Tesseract::new(tessdata_dir, Some(language))
            .with_context(|| format!("loading language `{language}`"))?
            .set_frame(bytes, w as i32, h as i32, bpp, w as i32 * bpp)
            .context("handing frame to tesseract")?;
        tess.set_page_seg_mode(psm);
        let mut tess = tess.recognize().context("recognition")?;

        let text = tess.get_text().context("reading text")?;
        // -1 when no words were found; normalization drops it.
        let conf = tess.mean_text_conf() as f64;
        Ok((text.trim().to_string(), conf))
    }
}

#[cfg(not(feature = "tesseract"))]
mod native {
    use image::DynamicImage;

    use super::RawRecognition;

    pub(super) fn recognize(
        _tessdata_dir: Option<&str>,
        _image: &DynamicImage,
        _language: &str,
    ) -> anyhow::Result<RawRecognition> {
        anyhow::bail!("tesseract support not compiled in")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_traineddata_files() {
        let dir = std::env::temp_dir().join(format!("grabtext-tessdata-{}", std::process::id()));
        let nested = dir.join("tessdata");
        std::fs::create_dir_all(&nested).unwrap();
        for f in ["por.traineddata", "osd.traineddata", "notes.txt"] {
            std::fs::write(nested.join(f), b"").unwrap();
        }
        std::fs::write(dir.join("eng.traineddata"), b"").unwrap();

        let langs = list_traineddata(dir.to_str().unwrap());
        assert_eq!(langs, vec!["eng".to_string(), "por".to_string()]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn falls_back_to_default_language_list() {
        let engine = TesseractEngine {
            tessdata_dir: Some("/definitely/not/here".into()),
            available: false,
        };
        assert_eq!(engine.supported_languages(), vec!["eng", "por"]);
    }

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn unavailable_without_feature() {
        let engine = TesseractEngine::new(None);
        assert!(!engine.is_available());
        let r = engine.extract_text(&DynamicImage::new_luma8(4, 4), "eng");
        assert!(!r.success);
        assert!(r.error.is_some());
    }
}
