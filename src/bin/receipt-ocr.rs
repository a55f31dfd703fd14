//! CLI binary for receipt-ocr.
//!
//! `serve` runs the HTTP service; `extract` runs the same pipeline on a
//! local PDF and prints the JSON, which is handy for prompt iteration.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use receipt_ocr::{create_router, AppState, ReceiptExtractor, ServiceConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the service on :8000, requiring an API key
  SERVICE_API_KEY=s3cret OPENAI_API_KEY=sk-... receipt-ocr serve

  # Call it
  curl -s localhost:8000/process \
    -H 'X-API-Key: s3cret' -H 'Content-Type: application/json' \
    -d "{\"fileBase64\": \"$(base64 -w0 receipt.pdf)\", \"filename\": \"receipt.pdf\"}"

  # Extract a local file without the server
  receipt-ocr extract receipt.pdf --pages 2 --stats

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (required for the openai provider)
  SERVICE_API_KEY         Shared secret expected in X-API-Key (unset = open)
  PDFIUM_LIB_PATH         pdfium shared library, or the directory holding it
  RUST_LOG                Overrides the log filter (e.g. receipt_ocr=debug)
"#;

/// Extract structured fields from PDF receipts using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt-ocr",
    version,
    about = "Extract structured fields from PDF receipts using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Extract one local PDF and print the JSON to stdout.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "RECEIPT_OCR_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Shared secret required in the X-API-Key header.
    #[arg(long, env = "SERVICE_API_KEY", hide_env_values = true)]
    service_api_key: Option<String>,

    /// Largest accepted request body in bytes.
    #[arg(long, env = "RECEIPT_OCR_MAX_BODY_BYTES", default_value_t = 25 * 1024 * 1024)]
    max_body_bytes: usize,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local PDF file.
    input: PathBuf,

    /// Pages to render for this file (clamped to --page-limit).
    #[arg(long)]
    pages: Option<u32>,

    /// Print timing and token stats alongside the receipt.
    #[arg(long)]
    stats: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// LLM model ID.
    #[arg(long, env = "RECEIPT_OCR_MODEL", default_value = receipt_ocr::config::DEFAULT_MODEL)]
    model: String,

    /// LLM provider: openai, anthropic, gemini, azure, ollama.
    #[arg(long, env = "RECEIPT_OCR_PROVIDER", default_value = receipt_ocr::config::DEFAULT_PROVIDER)]
    provider: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "RECEIPT_OCR_DPI", default_value_t = 220,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Maximum pages rendered per receipt; also the default per request.
    #[arg(long = "page-limit", env = "RECEIPT_OCR_MAX_PAGES", default_value_t = 4,
          value_parser = clap::value_parser!(u64).range(1..=64))]
    page_limit: u64,

    /// Max LLM output tokens.
    #[arg(long, env = "RECEIPT_OCR_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RECEIPT_OCR_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries on LLM failure.
    #[arg(long, env = "RECEIPT_OCR_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-attempt LLM call timeout in seconds.
    #[arg(long, env = "RECEIPT_OCR_API_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RECEIPT_OCR_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Path to a text file containing a custom user prompt.
    #[arg(long, env = "RECEIPT_OCR_USER_PROMPT")]
    user_prompt: Option<PathBuf>,

    /// pdfium shared library, or the directory holding it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPT_OCR_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Serve(a) => a.common.verbose,
        Command::Extract(a) => a.common.verbose,
    };
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Extract(args) => extract(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut builder = base_config(&args.common)
        .await?
        .bind_addr(args.bind)
        .max_body_bytes(args.max_body_bytes);
    if let Some(ref key) = args.service_api_key {
        builder = builder.service_api_key(key.as_str());
    }
    let config = builder.build().context("Invalid configuration")?;

    if config.service_api_key.is_none() {
        warn!("SERVICE_API_KEY is not set; /process accepts unauthenticated requests");
    }
    info!("Configuration: {:?}", config);

    let addr = config.bind_addr;
    let extractor = tokio::task::block_in_place(|| ReceiptExtractor::from_config(config))
        .context("Failed to initialise extractor")?;
    let app = create_router(AppState::new(extractor));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn extract(args: ExtractArgs) -> Result<()> {
    let config = base_config(&args.common)
        .await?
        .build()
        .context("Invalid configuration")?;

    let pdf = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "receipt.pdf".to_string());

    let extractor = tokio::task::block_in_place(|| ReceiptExtractor::from_config(config))
        .context("Failed to initialise extractor")?;
    let output = extractor
        .extract_pdf(pdf, &filename, args.pages)
        .await
        .context("Extraction failed")?;

    let json = if args.stats {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string_pretty(&output.receipt)
    }
    .context("Failed to serialise output")?;
    println!("{json}");

    Ok(())
}

/// Map the shared CLI args onto a config builder.
async fn base_config(args: &CommonArgs) -> Result<receipt_ocr::ServiceConfigBuilder> {
    let mut builder = ServiceConfig::builder()
        .model(args.model.as_str())
        .provider_name(args.provider.as_str())
        .dpi(args.dpi)
        .max_pages(args.page_limit as usize)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref path) = args.system_prompt {
        builder = builder.system_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = args.user_prompt {
        builder = builder.user_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = args.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path.clone());
    }

    Ok(builder)
}

async fn read_prompt(path: &PathBuf) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}
