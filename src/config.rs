//! Configuration for the receipt extraction service.
//!
//! Every knob lives in [`ServiceConfig`], built via [`ServiceConfigBuilder`].
//! The binary maps CLI flags and environment variables onto the builder;
//! library users and tests set only what they care about.

use crate::error::ReceiptOcrError;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default vision model. Cheap, fast, and reads receipt tables reliably.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default LLM provider name passed to `edgequake_llm::ProviderFactory`.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Configuration for the receipt extraction service.
///
/// # Example
/// ```rust
/// use receipt_ocr::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .dpi(200)
///     .max_pages(2)
///     .service_api_key("s3cret")
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_max_pages(Some(10)), 2);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds. Default: `0.0.0.0:8000`.
    pub bind_addr: SocketAddr,

    /// Shared secret expected in the `X-API-Key` header.
    ///
    /// `None` leaves `/process` open; the binary warns at startup.
    pub service_api_key: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic"). Default: "openai".
    pub provider_name: String,

    /// LLM model identifier. Default: "gpt-4o-mini".
    pub model: String,

    /// Rendering DPI. Range: 72–400. Default: 220.
    ///
    /// Receipt tables use small print; 220 DPI keeps quantities and cents
    /// legible without pushing a letter page past ~2 500 px.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 2600.
    pub max_rendered_pixels: u32,

    /// Maximum pages rendered per request, and the default when the request
    /// omits `max_pages`. Default: 4.
    pub max_pages: usize,

    /// Sampling temperature. Default: 0.0 (deterministic extraction).
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts after the first failed model call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt model call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Largest accepted request body in bytes. Default: 25 MiB.
    ///
    /// Base64 inflates a PDF by a third, so this admits scans up to ~18 MiB.
    pub max_body_bytes: usize,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Custom user prompt. If None, uses [`crate::prompts::DEFAULT_USER_PROMPT`].
    pub user_prompt: Option<String>,

    /// Path to the pdfium shared library, or a directory containing it.
    /// If None, pdfium is loaded from the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            service_api_key: None,
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dpi: 220,
            max_rendered_pixels: 2600,
            max_pages: 4,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 90,
            max_body_bytes: 25 * 1024 * 1024,
            system_prompt: None,
            user_prompt: None,
            pdfium_lib_path: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field(
                "service_api_key",
                &self.service_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_pages", &self.max_pages)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Number of pages to render for a request asking for `requested`.
    ///
    /// Missing or zero means the configured limit; anything larger is
    /// clamped down to it.
    pub fn effective_max_pages(&self, requested: Option<u32>) -> usize {
        match requested {
            None | Some(0) => self.max_pages,
            Some(n) => (n as usize).min(self.max_pages),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the shared secret. An empty string leaves the endpoint open.
    pub fn service_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.service_api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Retries after the first attempt, capped at 10.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_body_bytes(mut self, n: usize) -> Self {
        self.config.max_body_bytes = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.user_prompt = Some(prompt.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ReceiptOcrError> {
        let c = &self.config;
        if c.max_pages == 0 {
            return Err(ReceiptOcrError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ReceiptOcrError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.model.trim().is_empty() || c.provider_name.trim().is_empty() {
            return Err(ReceiptOcrError::InvalidConfig(
                "provider and model must be non-empty".into(),
            ));
        }
        if c.max_body_bytes < 1024 {
            return Err(ReceiptOcrError::InvalidConfig(format!(
                "max_body_bytes must be ≥ 1024, got {}",
                c.max_body_bytes
            )));
        }
        Ok(self.config)
    }
}
