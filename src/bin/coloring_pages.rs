//! CLI binary for coloring-pages.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GeneratorConfig` and either serves HTTP or generates one page.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use coloring_pages::{
    serve, ColoringError, GenerationRequest, Generator, GeneratorConfig, StorageService,
    ThrottleScope,
};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the HTTP API on port 8000
  coloring-pages serve --bind 0.0.0.0:8000

  # One page into ./output/coloring_animals.pdf
  coloring-pages generate --theme animals --age-group 3-4

  # One page to an explicit path, thicker lines
  coloring-pages generate --theme vehicles --age-group 5-6 --line-thickness 4 --out car.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY                      Image provider key (unset → placeholder art)
  OPENAI_MODEL                        Image model (default dall-e-3)
  OPENAI_BASE_URL                     OpenAI-compatible API base URL
  COLORING_OUTPUT_DIR                 Where PDFs are written (default ./output)
  COLORING_ACQUISITION_TIMEOUT_SECS   Image acquisition budget (default 20)
  COLORING_PROCESSING_TIMEOUT_SECS    Line-art budget (default 20)
  COLORING_RATE_LIMIT                 Requests per window (default 30)
  COLORING_RATE_WINDOW_SECS           Throttle window (default 60)
  COLORING_ALLOWED_THEMES             Comma-separated theme allow-list
  COLORING_ALLOWED_AGE_GROUPS         Comma-separated age-group allow-list
  RUST_LOG                            Log filter, overrides --verbose/--quiet
"#;

/// Generate printable coloring pages for children.
#[derive(Parser, Debug)]
#[command(
    name = "coloring-pages",
    version,
    about = "Generate printable line-art coloring pages (A4 PDF) from a theme and age group",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "COLORING_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "COLORING_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (POST /generate, GET /health, /files).
    Serve {
        /// Socket address to bind.
        #[arg(long, env = "COLORING_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },

    /// Generate one page and write the PDF to disk.
    Generate {
        /// Theme from the allow-list, e.g. animals.
        #[arg(long)]
        theme: String,

        /// Age group from the allow-list, e.g. 3-4.
        #[arg(long)]
        age_group: String,

        /// Write the PDF here instead of <output-dir>/coloring_<theme>.pdf.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the JSON response body instead of a summary line.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct Settings {
    /// OpenAI API key; leave unset to always use placeholder art.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Image model ID.
    #[arg(long, global = true, env = "OPENAI_MODEL", default_value = "dall-e-3")]
    model: String,

    /// OpenAI-compatible API base URL.
    #[arg(
        long,
        global = true,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    base_url: String,

    /// Extra provider attempts after a failure.
    #[arg(long, global = true, env = "COLORING_PROVIDER_RETRIES", default_value_t = 0)]
    provider_retries: u32,

    /// Directory generated PDFs are written to (and served from).
    #[arg(long, global = true, env = "COLORING_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Image acquisition budget in seconds.
    #[arg(long, global = true, env = "COLORING_ACQUISITION_TIMEOUT_SECS", default_value_t = 20)]
    acquisition_timeout: u64,

    /// Line-art processing budget in seconds.
    #[arg(long, global = true, env = "COLORING_PROCESSING_TIMEOUT_SECS", default_value_t = 20)]
    processing_timeout: u64,

    /// Requests admitted per throttle window.
    #[arg(long, global = true, env = "COLORING_RATE_LIMIT", default_value_t = 30)]
    rate_limit: usize,

    /// Throttle window in seconds.
    #[arg(long, global = true, env = "COLORING_RATE_WINDOW_SECS", default_value_t = 60)]
    rate_window: u64,

    /// Count requests per client address instead of globally.
    #[arg(long, global = true, env = "COLORING_PER_CLIENT_THROTTLE")]
    per_client: bool,

    /// Key per-client throttling on X-Forwarded-For (only behind a trusted proxy).
    #[arg(long, global = true, env = "COLORING_TRUST_FORWARDED_FOR")]
    trust_forwarded_for: bool,

    /// Comma-separated theme allow-list.
    #[arg(long, global = true, env = "COLORING_ALLOWED_THEMES", value_delimiter = ',')]
    themes: Vec<String>,

    /// Comma-separated age-group allow-list.
    #[arg(long, global = true, env = "COLORING_ALLOWED_AGE_GROUPS", value_delimiter = ',')]
    age_groups: Vec<String>,

    /// Dilation kernel size for outline thickness (1–15).
    #[arg(long, global = true, env = "COLORING_LINE_THICKNESS", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..=15))]
    line_thickness: u32,

    /// Resolution of the embedded PDF page image (72–600).
    #[arg(long, global = true, env = "COLORING_PDF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Leave the PDF out of the JSON response (pdf_url only).
    #[arg(long, global = true, env = "COLORING_NO_PDF_BASE64")]
    no_pdf_base64: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.settings).context("Invalid configuration")?;
    let generator = Generator::new(config);

    match cli.command {
        Command::Serve { bind } => {
            serve(bind, Arc::new(generator))
                .await
                .with_context(|| format!("Server on {bind} failed"))?;
        }
        Command::Generate {
            theme,
            age_group,
            out,
            json,
        } => {
            let request = GenerationRequest::new(theme, age_group);
            match out {
                Some(path) => generate_to_path(&generator, &request, &path, cli.quiet).await?,
                None => {
                    let response = generator
                        .generate_and_store(&request, None)
                        .await
                        .context("Generation failed")?;
                    if json {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&response)
                                .context("Failed to serialise response")?
                        );
                    } else if !cli.quiet {
                        let path = generator.storage().root().join(&response.filename);
                        eprintln!("✔  {}", path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

/// One-shot generation to an explicit file path.
async fn generate_to_path(
    generator: &Generator,
    request: &GenerationRequest,
    path: &Path,
    quiet: bool,
) -> Result<()> {
    let artifact = generator
        .generate(request, None)
        .await
        .context("Generation failed")?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;

    let written = StorageService::new(dir)
        .save_pdf(name, artifact.pdf_bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if !quiet {
        eprintln!(
            "✔  {}  ({:?} image, {}ms)",
            written.display(),
            artifact.source,
            artifact.stats.total_ms
        );
    }
    Ok(())
}

/// Map CLI args to `GeneratorConfig`.
fn build_config(s: &Settings) -> Result<GeneratorConfig, ColoringError> {
    let mut b = GeneratorConfig::builder()
        .openai_model(&s.model)
        .openai_base_url(&s.base_url)
        .provider_max_retries(s.provider_retries)
        .output_dir(&s.output_dir)
        .acquisition_timeout(Duration::from_secs(s.acquisition_timeout))
        .processing_timeout(Duration::from_secs(s.processing_timeout))
        .throttle(s.rate_limit, s.rate_window)
        .line_thickness(s.line_thickness)
        .pdf_dpi(s.dpi)
        .include_pdf_base64(!s.no_pdf_base64)
        .trust_forwarded_for(s.trust_forwarded_for);

    if let Some(ref key) = s.api_key {
        b = b.openai_api_key(key);
    }
    if s.per_client {
        b = b.throttle_scope(ThrottleScope::PerClient);
    }
    if !s.themes.is_empty() {
        b = b.allowed_themes(s.themes.iter().map(|t| t.trim().to_string()));
    }
    if !s.age_groups.is_empty() {
        b = b.allowed_age_groups(s.age_groups.iter().map(|a| a.trim().to_string()));
    }

    b.build()
}
