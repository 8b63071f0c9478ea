//! Google Cloud Vision `images:annotate` (TEXT_DETECTION) over blocking HTTPS.
//!
//! The API key comes from configuration or from the environment variable the
//! configuration names. Without one the engine registers as unavailable.

use std::io::Cursor;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;

use super::{ConfidenceScale, EngineCapability, EngineKind, RawRecognition};
use crate::config::CloudSettings;
use crate::lang;

/// Used when the service returns text without any page or block confidence.
const UNREPORTED_CONFIDENCE: f64 = 0.95;

const SUPPORTED_LANGUAGES: &[&str] = &[
    "eng", "por", "spa", "fra", "deu", "ita", "rus", "chi_sim", "chi_tra", "kor", "jpn", "ara",
    "hin", "tha", "vie",
];

pub struct CloudVisionEngine {
    endpoint: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl CloudVisionEngine {
    pub fn new(settings: &CloudSettings) -> Self {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&settings.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            });
        if api_key.is_none() {
            log::info!(
                "[cloud] no API key (set {} or cloud.api_key), cloud engine disabled",
                settings.api_key_env
            );
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build();
        CloudVisionEngine {
            endpoint: settings.endpoint.clone(),
            api_key,
            agent,
        }
    }
}

impl EngineCapability for CloudVisionEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::CloudVision
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn supported_languages(&self) -> Vec<String> {
        SUPPORTED_LANGUAGES.iter().map(|l| l.to_string()).collect()
    }

    fn recognize(&self, image: &DynamicImage, language: &str) -> anyhow::Result<RawRecognition> {
        let key = self.api_key.as_deref().context("no API key configured")?;

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("encoding PNG")?;

        let body = build_request(&png, language);
        log::debug!("[cloud] POST {} ({} bytes PNG)", self.endpoint, png.len());

        let resp = match self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", key)
            .send_string(&body.to_string())
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let raw = resp.into_string().unwrap_or_default();
                return Err(match service_status(&raw) {
                    Some(status) => anyhow::anyhow!("HTTP {code}: {}", status.message),
                    None => anyhow::anyhow!("HTTP {code}"),
                });
            }
            Err(ureq::Error::Transport(t)) => anyhow::bail!("request failed: {t}"),
        };
        let raw = resp.into_string().context("reading response body")?;
        parse_response(&raw)
    }
}

fn build_request(png: &[u8], language: &str) -> serde_json::Value {
    let hint = lang::short_code(language).unwrap_or("en");
    serde_json::json!({
        "requests": [{
            "image": { "content": base64::engine::general_purpose::STANDARD.encode(png) },
            "features": [{ "type": "TEXT_DETECTION" }],
            "imageContext": { "languageHints": [hint] },
        }]
    })
}

// ── Response ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
    /// Request-level failure, as sent with non-2xx statuses.
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    full_text_annotation: Option<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    confidence: Option<f64>,
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Block confidences when present, else page confidences. Text without
/// either gets [`UNREPORTED_CONFIDENCE`].
fn parse_response(raw: &str) -> anyhow::Result<RawRecognition> {
    let parsed: AnnotateResponse = serde_json::from_str(raw).context("decoding response JSON")?;
    if let Some(status) = parsed.error {
        anyhow::bail!("service error {}: {}", status.code, status.message);
    }
    let Some(first) = parsed.responses.into_iter().next() else {
        return Ok(empty());
    };
    if let Some(status) = first.error {
        anyhow::bail!("service error {}: {}", status.code, status.message);
    }

    let (text, mut confidences) = match first.full_text_annotation {
        Some(full) => {
            let blocks: Vec<f64> = full
                .pages
                .iter()
                .flat_map(|p| p.blocks.iter().filter_map(|b| b.confidence))
                .collect();
            let confidences = if blocks.is_empty() {
                full.pages.iter().filter_map(|p| p.confidence).collect()
            } else {
                blocks
            };
            (full.text, confidences)
        }
        None => (
            first
                .text_annotations
                .into_iter()
                .next()
                .map(|a| a.description)
                .unwrap_or_default(),
            Vec::new(),
        ),
    };

    if confidences.is_empty() && !text.trim().is_empty() {
        confidences.push(UNREPORTED_CONFIDENCE);
    }
    Ok(RawRecognition {
        text,
        confidences,
        scale: ConfidenceScale::Fraction,
    })
}

/// The service's own explanation in an error body, if it sent one.
fn service_status(raw: &str) -> Option<Status> {
    let parsed: AnnotateResponse = serde_json::from_str(raw).ok()?;
    parsed
        .error
        .or_else(|| parsed.responses.into_iter().find_map(|r| r.error))
}

fn empty() -> RawRecognition {
    RawRecognition {
        text: String::new(),
        confidences: Vec::new(),
        scale: ConfidenceScale::Fraction,
    }
}
