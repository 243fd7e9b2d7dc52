//! Error types for the coloring-pages library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ColoringError`]: **Fatal**: the request cannot produce a coloring page
//!   (unknown theme, throttled, a stage timed out, the PDF could not be
//!   written). Returned as `Err(ColoringError)` from [`crate::Generator`].
//!
//! * [`ProviderError`]: **Recovered**: the external image provider failed
//!   (network error, bad response, undecodable image). The orchestrator always
//!   falls back to the placeholder synthesizer, so this never reaches callers.
//!
//! Timeouts are fatal even though provider failures are not: once the
//! acquisition deadline has passed there is no budget left for a fallback.

use std::path::PathBuf;
use thiserror::Error;

/// Message returned to HTTP callers for every 500-class failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Failed to generate coloring page";

/// All fatal errors returned by the coloring-pages library.
#[derive(Debug, Error)]
pub enum ColoringError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Theme is not in the configured allow-list.
    #[error("Unsupported theme")]
    UnsupportedTheme { theme: String },

    /// Age group is not in the configured allow-list.
    #[error("Unsupported age group")]
    UnsupportedAgeGroup { age_group: String },

    // ── Admission errors ──────────────────────────────────────────────────
    /// The request throttle has no capacity left in the current window.
    #[error("Too many requests, please slow down")]
    Throttled,

    // ── Timeout errors ────────────────────────────────────────────────────
    /// Image acquisition (provider call or placeholder) exceeded its budget.
    #[error("Image generation timed out")]
    AcquisitionTimeout { elapsed_ms: u64 },

    /// Line-art transformation exceeded its budget.
    #[error("Image processing timed out")]
    ProcessingTimeout { elapsed_ms: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The PDF document could not be assembled or serialised.
    #[error("PDF packaging failed: {detail}")]
    PackagingFailed { detail: String },

    /// The preview image could not be PNG-encoded.
    #[error("Preview encoding failed: {0}")]
    EncodingFailed(#[from] image::ImageError),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked worker task etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ColoringError {
    /// HTTP status class for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ColoringError::UnsupportedTheme { .. } | ColoringError::UnsupportedAgeGroup { .. } => {
                400
            }
            ColoringError::Throttled => 429,
            ColoringError::AcquisitionTimeout { .. } | ColoringError::ProcessingTimeout { .. } => {
                504
            }
            _ => 500,
        }
    }

    /// Message that is safe to show to a remote caller.
    ///
    /// Client-class errors carry their own message; everything else collapses
    /// to [`INTERNAL_ERROR_MESSAGE`].
    pub fn public_message(&self) -> String {
        if self.status_code() == 500 {
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// A recoverable failure of the external image provider.
///
/// Produced by [`crate::pipeline::provider::ImageProvider`] implementations and
/// consumed by the acquisition orchestrator, which logs it and falls back to
/// the placeholder synthesizer.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No credential configured.
    #[error("image provider is not configured")]
    NotConfigured,

    /// Transport-level failure (DNS, TLS, connection reset, client timeout).
    #[error("provider request failed: {0}")]
    Http(String),

    /// Provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Response JSON did not contain an image payload.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Payload was present but not a decodable image.
    #[error("could not decode provider image: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors() {
        let e = ColoringError::UnsupportedTheme {
            theme: "space".into(),
        };
        assert_eq!(e.status_code(), 400);
        assert_eq!(e.public_message(), "Unsupported theme");

        let e = ColoringError::UnsupportedAgeGroup {
            age_group: "9-10".into(),
        };
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn throttled_maps_to_429() {
        assert_eq!(ColoringError::Throttled.status_code(), 429);
    }

    #[test]
    fn timeouts_map_to_504_with_distinct_messages() {
        let acq = ColoringError::AcquisitionTimeout { elapsed_ms: 20_000 };
        let proc = ColoringError::ProcessingTimeout { elapsed_ms: 20_000 };
        assert_eq!(acq.status_code(), 504);
        assert_eq!(proc.status_code(), 504);
        assert_ne!(acq.to_string(), proc.to_string());
    }

    #[test]
    fn internal_detail_is_not_public() {
        let e = ColoringError::PackagingFailed {
            detail: "xref table exploded".into(),
        };
        assert_eq!(e.status_code(), 500);
        assert!(e.to_string().contains("xref"));
        assert_eq!(e.public_message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn provider_api_error_display() {
        let e = ProviderError::Api {
            status: 503,
            body: "overloaded".into(),
        };
        assert!(e.to_string().contains("503"));
        assert!(e.to_string().contains("overloaded"));
    }
}
