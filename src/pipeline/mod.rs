//! Pipeline stages for coloring-page generation.
//!
//! Each submodule implements exactly one step and can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! acquire ──▶ lineart ──▶ pdf ──▶ encode
//! (provider    (threshold  (A4     (PNG preview,
//!  or shapes)   + dilate)   page)   base64)
//! ```
//!
//! 1. [`acquire`]: build the prompt and get a raster from the
//!    [`provider`], or from the [`placeholder`] synthesizer when the provider
//!    is absent or fails
//! 2. [`lineart`]: deterministic grayscale → binary outline transform;
//!    CPU-bound, run in `spawn_blocking`
//! 3. [`pdf`]: stretch the line art over one A4 page
//! 4. [`encode`]: PNG preview and base64 wrapping for the JSON response
//!
//! [`glyphs`] is the bitmap font the placeholder uses for its label.

pub mod acquire;
pub mod encode;
pub mod glyphs;
pub mod lineart;
pub mod pdf;
pub mod placeholder;
pub mod provider;
