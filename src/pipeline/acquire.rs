//! Image acquisition: provider first, placeholder on any provider failure.
//!
//! ```text
//! build_prompt ──▶ provider? ──ok──▶ AcquiredImage { source: Provider }
//!                     │
//!                  none / err
//!                     ▼
//!               placeholder ───────▶ AcquiredImage { source: Placeholder }
//! ```
//!
//! Provider errors never escape this stage. Only the overall deadline
//! ([`acquire_with_timeout`]) can fail it, and a deadline miss does not fall
//! back: the budget is already spent.

use crate::error::ColoringError;
use crate::output::ImageSource;
use crate::pipeline::placeholder::PlaceholderSynthesizer;
use crate::pipeline::provider::ImageProvider;
use crate::prompts::build_prompt;
use image::DynamicImage;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A source raster plus how it was obtained.
#[derive(Debug, Clone)]
pub struct AcquiredImage {
    pub prompt: String,
    pub image: DynamicImage,
    pub source: ImageSource,
}

/// Obtain a raster for `theme`/`age_group`.
///
/// With a provider, its result is used when it succeeds; otherwise the
/// failure is logged and the placeholder is drawn instead. Without a
/// provider the placeholder is drawn directly.
pub async fn acquire_image(
    provider: Option<&dyn ImageProvider>,
    synthesizer: PlaceholderSynthesizer,
    theme: &str,
    age_group: &str,
) -> Result<AcquiredImage, ColoringError> {
    let prompt = build_prompt(theme, age_group);

    if let Some(provider) = provider {
        match provider.generate(&prompt).await {
            Ok(image) => {
                info!(
                    "Acquired {}x{} image from provider '{}'",
                    image.width(),
                    image.height(),
                    provider.name()
                );
                return Ok(AcquiredImage {
                    prompt,
                    image,
                    source: ImageSource::Provider,
                });
            }
            Err(e) => {
                warn!(
                    "Provider '{}' failed, using placeholder: {}",
                    provider.name(),
                    e
                );
            }
        }
    } else {
        debug!("No image provider configured, using placeholder");
    }

    let image = synthesize_placeholder(synthesizer, theme, age_group).await?;
    Ok(AcquiredImage {
        prompt,
        image,
        source: ImageSource::Placeholder,
    })
}

/// [`acquire_image`] bounded by `budget`. On expiry the pending work is
/// abandoned and [`ColoringError::AcquisitionTimeout`] is returned.
pub async fn acquire_with_timeout(
    provider: Option<&dyn ImageProvider>,
    synthesizer: PlaceholderSynthesizer,
    theme: &str,
    age_group: &str,
    budget: Duration,
) -> Result<AcquiredImage, ColoringError> {
    let start = Instant::now();
    match tokio::time::timeout(budget, acquire_image(provider, synthesizer, theme, age_group)).await
    {
        Ok(result) => result,
        Err(_) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            warn!(
                "Image acquisition exceeded {:?} (theme={}, age_group={})",
                budget, theme, age_group
            );
            Err(ColoringError::AcquisitionTimeout { elapsed_ms })
        }
    }
}

/// Drawing is CPU-bound; run it off the async worker threads.
async fn synthesize_placeholder(
    synthesizer: PlaceholderSynthesizer,
    theme: &str,
    age_group: &str,
) -> Result<DynamicImage, ColoringError> {
    let theme = theme.to_string();
    let age_group = age_group.to_string();
    tokio::task::spawn_blocking(move || synthesizer.synthesize(&theme, &age_group))
        .await
        .map_err(|e| ColoringError::Internal(format!("placeholder task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        result: Result<(), ProviderError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn ok() -> Self {
            Self {
                result: Ok(()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                result: Err(ProviderError::Http("connection refused".into())),
                ..Self::ok()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self { delay, ..Self::ok() }
        }
    }

    #[async_trait]
    impl ImageProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, prompt: &str) -> Result<DynamicImage, ProviderError> {
            assert!(prompt.contains("Subject:"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result.clone()?;
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 9, Rgb([1, 2, 3]))))
        }
    }

    fn synth() -> PlaceholderSynthesizer {
        PlaceholderSynthesizer::new(60, 80)
    }

    #[tokio::test]
    async fn no_provider_uses_placeholder() {
        let got = acquire_image(None, synth(), "animals", "3-4").await.unwrap();
        assert_eq!(got.source, ImageSource::Placeholder);
        assert_eq!((got.image.width(), got.image.height()), (60, 80));
        assert_eq!(got.prompt, build_prompt("animals", "3-4"));
    }

    #[tokio::test]
    async fn provider_success_is_used() {
        let provider = FixedProvider::ok();
        let got = acquire_image(Some(&provider), synth(), "vehicles", "5-6")
            .await
            .unwrap();
        assert_eq!(got.source, ImageSource::Provider);
        assert_eq!((got.image.width(), got.image.height()), (7, 9));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_falls_back() {
        let provider = FixedProvider::failing();
        let got = acquire_image(Some(&provider), synth(), "fantasy", "7-8")
            .await
            .unwrap();
        assert_eq!(got.source, ImageSource::Placeholder);
        assert_eq!(got.image.width(), 60);
    }

    #[tokio::test]
    async fn slow_provider_times_out_without_fallback() {
        let provider = FixedProvider::slow(Duration::from_secs(5));
        let err = acquire_with_timeout(
            Some(&provider),
            synth(),
            "animals",
            "3-4",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ColoringError::AcquisitionTimeout { .. }));
        assert_eq!(err.status_code(), 504);
    }

    #[tokio::test]
    async fn every_allowed_pair_yields_an_image() {
        use crate::config::{DEFAULT_AGE_GROUPS, DEFAULT_THEMES};

        for theme in DEFAULT_THEMES {
            for age_group in DEFAULT_AGE_GROUPS {
                let got = acquire_image(None, PlaceholderSynthesizer::new(40, 56), theme, age_group)
                    .await
                    .unwrap();
                assert_eq!(got.source, ImageSource::Placeholder);
                assert!(
                    got.image.width() > 0 && got.image.height() > 0,
                    "{theme}/{age_group}"
                );
                assert!(got.prompt.contains(theme) && got.prompt.contains(age_group));
            }
        }
    }

    #[tokio::test]
    async fn within_budget_returns_image() {
        let got = acquire_with_timeout(None, synth(), "alphabet", "3-4", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(got.source, ImageSource::Placeholder);
    }
}
