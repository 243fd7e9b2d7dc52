//! Request and result types that cross the library boundary.

use serde::{Deserialize, Serialize};

/// A caller's request for one coloring page.
///
/// Both fields are checked against the configured allow-lists before any
/// work is done; see [`crate::Generator::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Coloring page theme, e.g. `"animals"`.
    pub theme: String,
    /// Target age group, e.g. `"3-4"`.
    pub age_group: String,
}

impl GenerationRequest {
    pub fn new(theme: impl Into<String>, age_group: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            age_group: age_group.into(),
        }
    }
}

/// Where the source raster came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// The external image-generation provider.
    Provider,
    /// The local placeholder synthesizer.
    Placeholder,
}

/// The finished product of one successful request. Immutable once built.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    /// Prompt that was (or would have been) sent to the provider.
    pub prompt: String,
    /// Single-page A4 PDF.
    pub pdf_bytes: Vec<u8>,
    /// PNG encoding of the processed line art.
    pub preview_bytes: Vec<u8>,
    /// Output file name, `coloring_<theme>.pdf`.
    pub filename: String,
    /// Which acquisition path produced the source image.
    pub source: ImageSource,
    /// Per-stage timings.
    pub stats: GenerationStats,
}

/// Wall-clock timings for one request, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    pub acquisition_ms: u64,
    pub processing_ms: u64,
    pub packaging_ms: u64,
    pub total_ms: u64,
}

/// JSON body returned by `POST /generate` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub status: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
    pub preview_base64: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deserializes_from_wire_names() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"theme":"animals","age_group":"3-4"}"#).unwrap();
        assert_eq!(req, GenerationRequest::new("animals", "3-4"));
    }

    #[test]
    fn response_omits_absent_optionals() {
        let resp = GenerateResponse {
            status: "ok".into(),
            prompt: "p".into(),
            pdf_url: None,
            pdf_base64: Some("JVBERi0=".into()),
            preview_base64: "iVBORw==".into(),
            filename: "coloring_animals.pdf".into(),
            message: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("pdf_url").is_none());
        assert!(json.get("message").is_none());
        assert_eq!(json["status"], "ok");
        assert_eq!(json["pdf_base64"], "JVBERi0=");
    }

    #[test]
    fn image_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ImageSource::Placeholder).unwrap(),
            "\"placeholder\""
        );
    }
}
