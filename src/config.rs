//! Configuration types for coloring-page generation.
//!
//! All generation behaviour is controlled through [`GeneratorConfig`], built
//! via its [`GeneratorConfigBuilder`] or read from the environment with
//! [`GeneratorConfig::from_env`]. One struct holds every knob so the server,
//! the CLI and the tests configure the pipeline the same way.

use crate::error::ColoringError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Themes accepted when no allow-list is configured.
pub const DEFAULT_THEMES: &[&str] = &["animals", "vehicles", "fantasy", "alphabet"];

/// Age groups accepted when no allow-list is configured.
pub const DEFAULT_AGE_GROUPS: &[&str] = &["3-4", "5-6", "7-8"];

/// Configuration for the coloring-page pipeline.
///
/// # Example
/// ```rust
/// use coloring_pages::GeneratorConfig;
///
/// let config = GeneratorConfig::builder()
///     .line_thickness(3)
///     .throttle(10, 60)
///     .build()
///     .unwrap();
/// assert_eq!(config.line_thickness, 3);
/// ```
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Credential for the OpenAI-compatible image API. `None` or empty
    /// disables the provider and every request uses the placeholder.
    pub openai_api_key: Option<String>,

    /// Image model requested from the provider. Default: `dall-e-3`.
    pub openai_model: String,

    /// Base URL of the provider API, without trailing slash.
    /// Default: `https://api.openai.com/v1`.
    pub openai_base_url: String,

    /// Resolution requested from the provider. Default: `1024x1024`.
    pub provider_image_size: String,

    /// Extra provider attempts after the first failure. Default: 0.
    ///
    /// Every attempt shares the acquisition timeout, so retries only help
    /// when the provider fails fast.
    pub provider_max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub provider_retry_backoff_ms: u64,

    /// Budget for image acquisition, provider call and fallback included. Default: 20 s.
    pub acquisition_timeout: Duration,

    /// Budget for the line-art transformation. Default: 20 s.
    pub processing_timeout: Duration,

    /// Requests admitted per throttle window. Default: 30.
    pub throttle_max_requests: usize,

    /// Length of the sliding throttle window. Default: 60 s.
    pub throttle_window: Duration,

    /// Whether the throttle counts all callers together or per client key.
    pub throttle_scope: ThrottleScope,

    /// Key per-client throttling on the first `X-Forwarded-For` hop instead
    /// of the peer address. Only enable behind a proxy that overwrites the
    /// header. Default: false.
    pub trust_forwarded_for: bool,

    /// Accepted theme values.
    pub allowed_themes: Vec<String>,

    /// Accepted age-group values.
    pub allowed_age_groups: Vec<String>,

    /// Placeholder canvas width in pixels. Default: 2480 (A4 at 300 DPI).
    pub canvas_width: u32,

    /// Placeholder canvas height in pixels. Default: 3508 (A4 at 300 DPI).
    pub canvas_height: u32,

    /// Side of the square dilation kernel that thickens outlines. Default: 2.
    pub line_thickness: u32,

    /// Raster resolution of the embedded PDF page image. Default: 300.
    pub pdf_dpi: u32,

    /// Directory generated PDFs are written to. Default: `./output`.
    pub output_dir: PathBuf,

    /// URL prefix under which `output_dir` is served. Default: `/files`.
    pub files_url_prefix: String,

    /// Embed the PDF as base64 in the response. Default: true.
    pub include_pdf_base64: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "dall-e-3".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            provider_image_size: "1024x1024".to_string(),
            provider_max_retries: 0,
            provider_retry_backoff_ms: 500,
            acquisition_timeout: Duration::from_secs(20),
            processing_timeout: Duration::from_secs(20),
            throttle_max_requests: 30,
            throttle_window: Duration::from_secs(60),
            throttle_scope: ThrottleScope::default(),
            trust_forwarded_for: false,
            allowed_themes: DEFAULT_THEMES.iter().map(|s| s.to_string()).collect(),
            allowed_age_groups: DEFAULT_AGE_GROUPS.iter().map(|s| s.to_string()).collect(),
            canvas_width: 2480,
            canvas_height: 3508,
            line_thickness: 2,
            pdf_dpi: 300,
            output_dir: PathBuf::from("output"),
            files_url_prefix: "/files".to_string(),
            include_pdf_base64: true,
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("provider_image_size", &self.provider_image_size)
            .field("provider_max_retries", &self.provider_max_retries)
            .field("acquisition_timeout", &self.acquisition_timeout)
            .field("processing_timeout", &self.processing_timeout)
            .field("throttle_max_requests", &self.throttle_max_requests)
            .field("throttle_window", &self.throttle_window)
            .field("throttle_scope", &self.throttle_scope)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("allowed_themes", &self.allowed_themes)
            .field("allowed_age_groups", &self.allowed_age_groups)
            .field("canvas", &(self.canvas_width, self.canvas_height))
            .field("line_thickness", &self.line_thickness)
            .field("pdf_dpi", &self.pdf_dpi)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl GeneratorConfig {
    /// Create a new builder for `GeneratorConfig`.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read configuration from `OPENAI_*` and `COLORING_*` environment variables.
    ///
    /// Unset variables keep their defaults; set-but-unparseable numbers are
    /// rejected rather than silently ignored.
    pub fn from_env() -> Result<Self, ColoringError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ColoringError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut b = Self::builder();

        if let Some(key) = lookup("OPENAI_API_KEY") {
            b = b.openai_api_key(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|s| !s.is_empty()) {
            b = b.openai_model(model);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|s| !s.is_empty()) {
            b = b.openai_base_url(url);
        }
        if let Some(dir) = lookup("COLORING_OUTPUT_DIR").filter(|s| !s.is_empty()) {
            b = b.output_dir(dir);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "COLORING_ACQUISITION_TIMEOUT_SECS")? {
            b = b.acquisition_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "COLORING_PROCESSING_TIMEOUT_SECS")? {
            b = b.processing_timeout(Duration::from_secs(secs));
        }
        let limit = parse_var::<usize>(&lookup, "COLORING_RATE_LIMIT")?;
        let window = parse_var::<u64>(&lookup, "COLORING_RATE_WINDOW_SECS")?;
        if limit.is_some() || window.is_some() {
            let defaults = GeneratorConfig::default();
            b = b.throttle(
                limit.unwrap_or(defaults.throttle_max_requests),
                window.unwrap_or(defaults.throttle_window.as_secs()),
            );
        }
        if let Some(raw) = lookup("COLORING_TRUST_FORWARDED_FOR") {
            b = b.trust_forwarded_for(matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            ));
        }
        if let Some(themes) = lookup("COLORING_ALLOWED_THEMES") {
            b = b.allowed_themes(split_list(&themes));
        }
        if let Some(groups) = lookup("COLORING_ALLOWED_AGE_GROUPS") {
            b = b.allowed_age_groups(split_list(&groups));
        }

        b.build()
    }

    /// The provider credential, if one is actually usable.
    pub fn provider_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ColoringError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ColoringError::InvalidConfig(format!("{key} is not a number: {raw:?}"))),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Builder for [`GeneratorConfig`].
#[derive(Debug)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openai_api_key = Some(key.into());
        self
    }

    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.config.openai_model = model.into();
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.openai_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn provider_image_size(mut self, size: impl Into<String>) -> Self {
        self.config.provider_image_size = size.into();
        self
    }

    pub fn provider_max_retries(mut self, n: u32) -> Self {
        self.config.provider_max_retries = n;
        self
    }

    pub fn provider_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.provider_retry_backoff_ms = ms;
        self
    }

    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = timeout;
        self
    }

    pub fn processing_timeout(mut self, timeout: Duration) -> Self {
        self.config.processing_timeout = timeout;
        self
    }

    /// Admit at most `max_requests` per `window_secs`.
    pub fn throttle(mut self, max_requests: usize, window_secs: u64) -> Self {
        self.config.throttle_max_requests = max_requests;
        self.config.throttle_window = Duration::from_secs(window_secs);
        self
    }

    pub fn throttle_window(mut self, window: Duration) -> Self {
        self.config.throttle_window = window;
        self
    }

    pub fn throttle_scope(mut self, scope: ThrottleScope) -> Self {
        self.config.throttle_scope = scope;
        self
    }

    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.config.trust_forwarded_for = trust;
        self
    }

    pub fn allowed_themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_themes = themes.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_age_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_age_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn canvas_size(mut self, width: u32, height: u32) -> Self {
        self.config.canvas_width = width.max(16);
        self.config.canvas_height = height.max(16);
        self
    }

    pub fn line_thickness(mut self, px: u32) -> Self {
        self.config.line_thickness = px.max(1);
        self
    }

    pub fn pdf_dpi(mut self, dpi: u32) -> Self {
        self.config.pdf_dpi = dpi.clamp(10, 600);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn files_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.files_url_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn include_pdf_base64(mut self, v: bool) -> Self {
        self.config.include_pdf_base64 = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GeneratorConfig, ColoringError> {
        let c = &self.config;
        if c.throttle_max_requests == 0 {
            return Err(ColoringError::InvalidConfig(
                "Throttle limit must be ≥ 1".into(),
            ));
        }
        if c.throttle_window.is_zero() {
            return Err(ColoringError::InvalidConfig(
                "Throttle window must be non-zero".into(),
            ));
        }
        if c.allowed_themes.is_empty() || c.allowed_age_groups.is_empty() {
            return Err(ColoringError::InvalidConfig(
                "Theme and age-group allow-lists must not be empty".into(),
            ));
        }
        if !c.files_url_prefix.starts_with('/') {
            return Err(ColoringError::InvalidConfig(format!(
                "Files URL prefix must start with '/', got {:?}",
                c.files_url_prefix
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Granularity of the request throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThrottleScope {
    /// One window shared by every caller (default).
    #[default]
    Global,
    /// One window per client key (peer address, or the forwarded client
    /// when `trust_forwarded_for` is set).
    PerClient,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_service_contract() {
        let c = GeneratorConfig::default();
        assert_eq!(c.acquisition_timeout, Duration::from_secs(20));
        assert_eq!(c.processing_timeout, Duration::from_secs(20));
        assert_eq!(c.throttle_max_requests, 30);
        assert_eq!(c.throttle_window, Duration::from_secs(60));
        assert_eq!(c.line_thickness, 2);
        assert_eq!(c.pdf_dpi, 300);
        assert_eq!((c.canvas_width, c.canvas_height), (2480, 3508));
        assert!(c.allowed_themes.iter().any(|t| t == "animals"));
        assert!(!c.allowed_themes.iter().any(|t| t == "space"));
        assert!(c.provider_key().is_none());
        assert!(!c.trust_forwarded_for);
    }

    #[test]
    fn empty_key_is_no_provider() {
        let c = GeneratorConfig::builder()
            .openai_api_key("  ")
            .build()
            .unwrap();
        assert!(c.provider_key().is_none());
    }

    #[test]
    fn zero_throttle_rejected() {
        let err = GeneratorConfig::builder().throttle(0, 60).build();
        assert!(matches!(err, Err(ColoringError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_key() {
        let c = GeneratorConfig::builder()
            .openai_api_key("sk-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let c = GeneratorConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("COLORING_RATE_LIMIT", "5"),
            ("COLORING_ALLOWED_THEMES", "animals, space ,"),
            ("COLORING_PROCESSING_TIMEOUT_SECS", "7"),
            ("COLORING_TRUST_FORWARDED_FOR", "true"),
        ]))
        .unwrap();
        assert!(c.trust_forwarded_for);
        assert_eq!(c.provider_key(), Some("sk-test"));
        assert_eq!(c.throttle_max_requests, 5);
        assert_eq!(c.throttle_window, Duration::from_secs(60));
        assert_eq!(c.allowed_themes, vec!["animals", "space"]);
        assert_eq!(c.processing_timeout, Duration::from_secs(7));
    }

    #[test]
    fn from_lookup_rejects_garbage_numbers() {
        let err = GeneratorConfig::from_lookup(lookup_from(&[("COLORING_RATE_LIMIT", "lots")]));
        assert!(matches!(err, Err(ColoringError::InvalidConfig(m)) if m.contains("COLORING_RATE_LIMIT")));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = GeneratorConfig::builder()
            .openai_base_url("http://localhost:9000/v1/")
            .build()
            .unwrap();
        assert_eq!(c.openai_base_url, "http://localhost:9000/v1");
    }
}
