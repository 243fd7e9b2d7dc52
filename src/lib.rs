//! # coloring-pages
//!
//! Generate printable children's coloring pages from a theme and an age
//! group.
//!
//! ## Pipeline Overview
//!
//! ```text
//! {theme, age_group}
//!  │
//!  ├─ 1. Validate  allow-listed theme and age group (400)
//!  ├─ 2. Throttle  sliding window, 30 requests / 60 s by default (429)
//!  ├─ 3. Acquire   OpenAI image API, placeholder shapes on failure (504)
//!  ├─ 4. Line art  adaptive threshold → dilate → Otsu (504)
//!  ├─ 5. Package   one stretched A4 page at 300 DPI + PNG preview
//!  └─ 6. Store     output/coloring_<theme>.pdf, served under /files
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coloring_pages::{GenerationRequest, Generator, GeneratorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider enabled when OPENAI_API_KEY is set; placeholder art otherwise.
//!     let generator = Generator::new(GeneratorConfig::from_env()?);
//!     let request = GenerationRequest::new("animals", "3-4");
//!     let page = generator.generate(&request, None).await?;
//!     std::fs::write(&page.filename, &page.pdf_bytes)?;
//!     eprintln!("{} from {:?} in {}ms", page.filename, page.source, page.stats.total_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `coloring-pages` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! coloring-pages = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod storage;
pub mod throttle;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GeneratorConfig, GeneratorConfigBuilder, ThrottleScope};
pub use error::{ColoringError, ProviderError};
pub use generate::Generator;
pub use output::{GenerateResponse, GeneratedArtifact, GenerationRequest, GenerationStats, ImageSource};
pub use pipeline::provider::{ImageProvider, OpenAiImageProvider};
pub use server::{router, serve};
pub use storage::StorageService;
pub use throttle::{Clock, ManualClock, RequestThrottle, SystemClock};
