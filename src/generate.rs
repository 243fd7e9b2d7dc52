//! Request orchestration: one validated request in, one coloring page out.
//!
//! [`Generator`] owns every stage and runs them in a fixed order:
//!
//! ```text
//! validate ─▶ throttle ─▶ acquire ─▶ line art ─▶ PDF + preview ─▶ store
//!   400         429        504         504          500            500
//! ```
//!
//! Nothing is counted against the throttle for a request that fails
//! validation, and nothing is written to disk for a request that fails
//! before the store step.

use crate::config::GeneratorConfig;
use crate::error::ColoringError;
use crate::output::{GenerateResponse, GeneratedArtifact, GenerationRequest, GenerationStats};
use crate::pipeline::acquire::acquire_with_timeout;
use crate::pipeline::encode::{encode_png, to_base64};
use crate::pipeline::lineart::LineArtTransformer;
use crate::pipeline::pdf::PdfPackager;
use crate::pipeline::placeholder::PlaceholderSynthesizer;
use crate::pipeline::provider::{ImageProvider, OpenAiImageProvider};
use crate::storage::StorageService;
use crate::throttle::RequestThrottle;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Message attached to every successful [`GenerateResponse`].
pub const SUCCESS_MESSAGE: &str = "Coloring page generated successfully";

/// The coloring-page pipeline with its shared state.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Generator {
    config: GeneratorConfig,
    provider: Option<Arc<dyn ImageProvider>>,
    throttle: Arc<RequestThrottle>,
    storage: StorageService,
    transformer: LineArtTransformer,
    packager: PdfPackager,
    synthesizer: PlaceholderSynthesizer,
}

impl Generator {
    /// Build a generator from `config`. The OpenAI provider is enabled when
    /// the config carries a non-empty API key.
    pub fn new(config: GeneratorConfig) -> Self {
        let provider = OpenAiImageProvider::from_config(&config)
            .map(|p| Arc::new(p) as Arc<dyn ImageProvider>);
        match &provider {
            Some(p) => info!("Image provider: {} ({})", p.name(), config.openai_model),
            None => info!("No image provider key configured; using placeholder images"),
        }

        Self {
            throttle: Arc::new(RequestThrottle::new(
                config.throttle_max_requests,
                config.throttle_window,
                config.throttle_scope,
            )),
            storage: StorageService::new(config.output_dir.clone()),
            transformer: LineArtTransformer::new(config.line_thickness),
            packager: PdfPackager::new(config.pdf_dpi),
            synthesizer: PlaceholderSynthesizer::new(config.canvas_width, config.canvas_height),
            provider,
            config,
        }
    }

    /// Replace the image provider.
    pub fn with_provider(mut self, provider: Arc<dyn ImageProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Always use the placeholder, even when a key is configured.
    pub fn without_provider(mut self) -> Self {
        self.provider = None;
        self
    }

    /// Replace the request throttle, e.g. to share one across generators or
    /// to drive it from a manual clock.
    pub fn with_throttle(mut self, throttle: Arc<RequestThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn throttle(&self) -> &RequestThrottle {
        &self.throttle
    }

    pub fn storage(&self) -> &StorageService {
        &self.storage
    }

    /// Check `request` against the configured allow-lists. Theme is checked
    /// first.
    pub fn validate(&self, request: &GenerationRequest) -> Result<(), ColoringError> {
        if !self.config.allowed_themes.iter().any(|t| *t == request.theme) {
            return Err(ColoringError::UnsupportedTheme {
                theme: request.theme.clone(),
            });
        }
        if !self
            .config
            .allowed_age_groups
            .iter()
            .any(|a| *a == request.age_group)
        {
            return Err(ColoringError::UnsupportedAgeGroup {
                age_group: request.age_group.clone(),
            });
        }
        Ok(())
    }

    /// Run the pipeline for one request without touching the disk.
    ///
    /// `client_key` identifies the caller for per-client throttling and is
    /// ignored under the global scope.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        client_key: Option<&str>,
    ) -> Result<GeneratedArtifact, ColoringError> {
        let total_start = Instant::now();

        // ── Step 1: Validate ─────────────────────────────────────────────
        self.validate(request).map_err(|e| {
            debug!("Rejected request {:?}: {}", request, e);
            e
        })?;

        // ── Step 2: Throttle ─────────────────────────────────────────────
        if !self.throttle.admit(client_key) {
            return Err(ColoringError::Throttled);
        }

        info!(
            "Generating coloring page: theme={}, age_group={}",
            request.theme, request.age_group
        );

        // ── Step 3: Acquire ──────────────────────────────────────────────
        let acquire_start = Instant::now();
        let acquired = acquire_with_timeout(
            self.provider.as_deref(),
            self.synthesizer,
            &request.theme,
            &request.age_group,
            self.config.acquisition_timeout,
        )
        .await?;
        let acquisition_ms = acquire_start.elapsed().as_millis() as u64;

        // ── Step 4: Line art ─────────────────────────────────────────────
        let process_start = Instant::now();
        let line_art = self.transform(acquired.image).await?;
        let processing_ms = process_start.elapsed().as_millis() as u64;

        // ── Step 5: PDF + preview ────────────────────────────────────────
        let package_start = Instant::now();
        let filename = StorageService::build_filename(&request.theme);
        let packager = self.packager;
        let name = filename.clone();
        let (pdf_bytes, preview_bytes) = tokio::task::spawn_blocking(move || {
            let (_, pdf) = packager.build_pdf(&line_art, &name)?;
            let preview = encode_png(&line_art)?;
            Ok::<_, ColoringError>((pdf, preview))
        })
        .await
        .map_err(|e| ColoringError::Internal(format!("packaging task failed: {e}")))??;
        let packaging_ms = package_start.elapsed().as_millis() as u64;

        let stats = GenerationStats {
            acquisition_ms,
            processing_ms,
            packaging_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Generated {} from {:?} in {}ms (acquire {}ms, line art {}ms, pdf {}ms)",
            filename,
            acquired.source,
            stats.total_ms,
            acquisition_ms,
            processing_ms,
            packaging_ms
        );

        Ok(GeneratedArtifact {
            prompt: acquired.prompt,
            pdf_bytes,
            preview_bytes,
            filename,
            source: acquired.source,
            stats,
        })
    }

    /// Run the pipeline, save the PDF under the output directory and build
    /// the JSON response body.
    pub async fn generate_and_store(
        &self,
        request: &GenerationRequest,
        client_key: Option<&str>,
    ) -> Result<GenerateResponse, ColoringError> {
        let artifact = self.generate(request, client_key).await?;

        let pdf_base64 = self
            .config
            .include_pdf_base64
            .then(|| to_base64(&artifact.pdf_bytes));
        let preview_base64 = to_base64(&artifact.preview_bytes);

        self.storage
            .save_pdf(&artifact.filename, artifact.pdf_bytes)
            .await?;

        Ok(GenerateResponse {
            status: "ok".to_string(),
            prompt: artifact.prompt,
            pdf_url: Some(StorageService::pdf_url(
                &self.config.files_url_prefix,
                &artifact.filename,
            )),
            pdf_base64,
            preview_base64,
            filename: artifact.filename,
            message: Some(SUCCESS_MESSAGE.to_string()),
        })
    }

    /// Line-art transform on the blocking pool, bounded by the processing
    /// timeout. On expiry the blocking task keeps running but its result is
    /// dropped.
    async fn transform(&self, image: DynamicImage) -> Result<DynamicImage, ColoringError> {
        let transformer = self.transformer;
        let budget = self.config.processing_timeout;
        let start = Instant::now();
        let task = tokio::task::spawn_blocking(move || transformer.to_line_art(image));

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(image)) => Ok(image),
            Ok(Err(e)) => Err(ColoringError::Internal(format!("line-art task failed: {e}"))),
            Err(_) => {
                warn!("Line-art transform exceeded {:?}", budget);
                Err(ColoringError::ProcessingTimeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.config)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}
