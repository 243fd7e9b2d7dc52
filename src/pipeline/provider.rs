//! External image provider: prompt in, RGB raster out.
//!
//! The orchestrator only sees the [`ImageProvider`] trait, so tests (and
//! alternative backends) can plug in without HTTP. The bundled
//! [`OpenAiImageProvider`] talks to any OpenAI-compatible
//! `/images/generations` endpoint and asks for a base64 JSON payload so the
//! image arrives in the same response, with no second download.
//!
//! ## Retry Strategy
//!
//! Retries are off by default. When enabled, the wait before attempt `n` is
//! `retry_backoff_ms * 2^(n-1)`. All attempts share the caller's acquisition
//! timeout, so a slow provider is cut off by the deadline, not by retries.

use crate::config::GeneratorConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Something that can turn a prompt into an image.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Short name for logs, e.g. `"openai"`.
    fn name(&self) -> &str;

    /// Generate one image for `prompt`. Returned images are RGB.
    async fn generate(&self, prompt: &str) -> Result<DynamicImage, ProviderError>;
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    response_format: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
}

/// Provider backed by an OpenAI-compatible image API.
#[derive(Debug, Clone)]
pub struct OpenAiImageProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    size: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl OpenAiImageProvider {
    /// Build from config; `None` when no usable credential is configured.
    pub fn from_config(config: &GeneratorConfig) -> Option<Self> {
        let key = config.provider_key()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_key: key.to_string(),
            model: config.openai_model.clone(),
            base_url: config.openai_base_url.clone(),
            size: config.provider_image_size.clone(),
            max_retries: config.provider_max_retries,
            retry_backoff_ms: config.provider_retry_backoff_ms,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    async fn generate_once(&self, prompt: &str) -> Result<DynamicImage, ProviderError> {
        let body = GenerationBody {
            model: &self.model,
            prompt,
            size: &self.size,
            response_format: "b64_json",
            n: 1,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: truncate(&text, 300),
            });
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let b64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or_else(|| ProviderError::MalformedResponse("no b64_json in data[0]".into()))?;

        decode_image(&b64)
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<DynamicImage, ProviderError> {
        let start = Instant::now();
        let mut last_err = ProviderError::NotConfigured;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Provider: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.generate_once(prompt).await {
                Ok(image) => {
                    info!(
                        "Provider {}: {}x{} image in {:?}",
                        self.model,
                        image.width(),
                        image.height(),
                        start.elapsed()
                    );
                    return Ok(image);
                }
                Err(e) => {
                    warn!("Provider: attempt {} failed: {}", attempt + 1, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

/// Decode a base64 image payload into an RGB raster.
pub fn decode_image(b64: &str) -> Result<DynamicImage, ProviderError> {
    let bytes = STANDARD
        .decode(b64.trim())
        .map_err(|e| ProviderError::Decode(format!("base64: {e}")))?;
    let image = image::load_from_memory(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;
    debug!("Decoded provider image: {} bytes", bytes.len());
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::encode_png;
    use image::{Rgba, RgbaImage};

    #[test]
    fn decode_round_trips_png_and_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128])));
        let png = encode_png(&img).unwrap();
        let decoded = decode_image(&STANDARD.encode(png)).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_image("%%%"), Err(ProviderError::Decode(_))));
        let not_image = STANDARD.encode(b"definitely not a png");
        assert!(matches!(decode_image(&not_image), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn from_config_requires_key() {
        assert!(OpenAiImageProvider::from_config(&GeneratorConfig::default()).is_none());
        let config = GeneratorConfig::builder()
            .openai_api_key("sk-test")
            .openai_base_url("http://127.0.0.1:1/v1/")
            .build()
            .unwrap();
        let p = OpenAiImageProvider::from_config(&config).unwrap();
        assert_eq!(p.endpoint(), "http://127.0.0.1:1/v1/images/generations");
        assert_eq!(p.size, "1024x1024");
    }

    #[test]
    fn request_body_shape() {
        let body = GenerationBody {
            model: "dall-e-3",
            prompt: "p",
            size: "1024x1024",
            response_format: "b64_json",
            n: 1,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"], "b64_json");
        assert_eq!(json["size"], "1024x1024");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("hi", 5), "hi");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let config = GeneratorConfig::builder()
            .openai_api_key("sk-test")
            .openai_base_url("http://127.0.0.1:1")
            .build()
            .unwrap();
        let p = OpenAiImageProvider::from_config(&config).unwrap();
        let err = p.generate("prompt").await.unwrap_err();
        assert!(matches!(err, ProviderError::Http(_)), "got {err:?}");
    }
}
