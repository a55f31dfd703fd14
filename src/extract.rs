//! End-to-end receipt extraction.
//!
//! [`ReceiptExtractor`] owns the configuration plus the two external
//! capabilities (a [`PageRenderer`] and a [`VisionChat`]) and runs the
//! pipeline for one request: decode → render → encode → VLM → parse →
//! normalise. It holds no per-request state, so one instance behind an
//! `Arc` serves every request.

use crate::config::ServiceConfig;
use crate::error::ReceiptOcrError;
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::llm::{ProviderChat, VisionChat};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::{decode, encode, llm, postprocess, render};
use crate::receipt::Receipt;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs the extraction pipeline for one receipt at a time.
pub struct ReceiptExtractor {
    config: ServiceConfig,
    renderer: Arc<dyn PageRenderer>,
    model: Arc<dyn VisionChat>,
}

impl ReceiptExtractor {
    /// Assemble an extractor from explicit parts.
    pub fn new(
        config: ServiceConfig,
        renderer: Arc<dyn PageRenderer>,
        model: Arc<dyn VisionChat>,
    ) -> Self {
        Self {
            config,
            renderer,
            model,
        }
    }

    /// Build the production extractor: pdfium renderer + configured provider.
    ///
    /// Fails fast when pdfium cannot be bound or the provider has no API key,
    /// so a misconfigured container never reports healthy.
    pub fn from_config(config: ServiceConfig) -> Result<Self, ReceiptOcrError> {
        let renderer = PdfiumRenderer::new(&config);
        renderer.check_binding()?;

        let provider = resolve_provider(&config)?;
        info!(
            "Using provider '{}' with model '{}'",
            config.provider_name, config.model
        );

        Ok(Self::new(
            config,
            Arc::new(renderer),
            Arc::new(ProviderChat::new(provider)),
        ))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Extract receipt fields from the base64 `fileBase64` request field.
    ///
    /// `max_pages` is the caller's requested limit; see
    /// [`ServiceConfig::effective_max_pages`].
    pub async fn extract_base64(
        &self,
        file_base64: &str,
        filename: &str,
        max_pages: Option<u32>,
    ) -> Result<ExtractionOutput, ReceiptOcrError> {
        let pdf = decode::decode_pdf_base64(file_base64)?;
        self.extract_pdf(pdf, filename, max_pages).await
    }

    /// Extract receipt fields from raw PDF bytes.
    pub async fn extract_pdf(
        &self,
        pdf: Vec<u8>,
        filename: &str,
        max_pages: Option<u32>,
    ) -> Result<ExtractionOutput, ReceiptOcrError> {
        let total_start = Instant::now();
        decode::ensure_pdf(&pdf)?;

        let max_pages = self.config.effective_max_pages(max_pages);
        let pdf_bytes = pdf.len();
        info!(
            "Extracting '{}' ({} bytes, up to {} pages)",
            filename, pdf_bytes, max_pages
        );

        // ── Step 1: Rasterise pages ──────────────────────────────────────
        let render_start = Instant::now();
        let pages = render::render_pages(Arc::clone(&self.renderer), pdf, max_pages).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        let pages_rendered = pages.len();
        debug!(
            "Rendered {} pages in {}ms",
            pages_rendered, render_duration_ms
        );

        // ── Step 2: Encode images to base64 PNG ──────────────────────────
        let images = tokio::task::spawn_blocking(move || encode::encode_pages(&pages))
            .await
            .map_err(|e| ReceiptOcrError::Internal(format!("Encode task panicked: {}", e)))??;

        // ── Step 3: One VLM call for the whole receipt ───────────────────
        let result = llm::extract_fields(self.model.as_ref(), images, &self.config).await?;

        // ── Step 4: Parse and normalise ──────────────────────────────────
        let value = postprocess::parse_model_json(&result.reply.content)?;
        let receipt = Receipt::from_value(value)
            .map_err(|e| ReceiptOcrError::InvalidModelOutput {
                detail: e.to_string(),
            })?
            .normalise();

        let stats = ExtractionStats {
            pdf_bytes,
            max_pages,
            pages_rendered,
            input_tokens: result.reply.input_tokens,
            output_tokens: result.reply.output_tokens,
            retries: result.retries,
            render_duration_ms,
            llm_duration_ms: result.duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Extracted '{}': {} pages, {} patients, {} in / {} out tokens, {}ms",
            filename,
            pages_rendered,
            receipt.patients.len(),
            stats.input_tokens,
            stats.output_tokens,
            stats.total_duration_ms
        );

        Ok(ExtractionOutput { receipt, stats })
    }
}

/// Create the configured LLM provider.
///
/// For the default `openai` provider a missing `OPENAI_API_KEY` is reported
/// explicitly; other providers surface whatever the factory reports.
pub fn resolve_provider(config: &ServiceConfig) -> Result<Arc<dyn LLMProvider>, ReceiptOcrError> {
    if config.provider_name == "openai" {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if key.trim().is_empty() {
            return Err(ReceiptOcrError::ProviderNotConfigured {
                provider: "openai".to_string(),
                hint: "OPENAI_API_KEY not set".to_string(),
            });
        }
    }

    ProviderFactory::create_llm_provider(&config.provider_name, &config.model).map_err(|e| {
        ReceiptOcrError::ProviderNotConfigured {
            provider: config.provider_name.clone(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::ChatReply;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use edgequake_llm::{ChatMessage, CompletionOptions};
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pages {
        available: usize,
        last_limit: AtomicUsize,
    }

    impl PageRenderer for Pages {
        fn render(&self, _pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, ReceiptOcrError> {
            self.last_limit.store(max_pages, Ordering::SeqCst);
            Ok((0..self.available.min(max_pages))
                .map(|_| DynamicImage::ImageRgb8(RgbImage::new(8, 8)))
                .collect())
        }
    }

    struct Canned(&'static str);

    #[async_trait]
    impl VisionChat for Canned {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<ChatReply, ReceiptOcrError> {
            Ok(ChatReply {
                content: self.0.to_string(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn extractor(available: usize, reply: &'static str) -> (ReceiptExtractor, Arc<Pages>) {
        let pages = Arc::new(Pages {
            available,
            last_limit: AtomicUsize::new(0),
        });
        let ex = ReceiptExtractor::new(
            ServiceConfig::default(),
            pages.clone(),
            Arc::new(Canned(reply)),
        );
        (ex, pages)
    }

    const PDF: &[u8] = b"%PDF-1.7\n";

    #[tokio::test]
    async fn extracts_and_normalises() {
        let (ex, pages) = extractor(
            2,
            r#"```json
{"Client": {"ZipCode": "14208", "AmountPaid": "30"},
 "Patients": [{"Name": "Rex", "Items": [{"Total": "10"}, {"Total": "20"}]}]}
```"#,
        );
        let out = ex
            .extract_base64(&STANDARD.encode(PDF), "receipt.pdf", Some(9))
            .await
            .unwrap();

        assert_eq!(pages.last_limit.load(Ordering::SeqCst), 4);
        assert_eq!(out.stats.pages_rendered, 2);
        assert_eq!(out.stats.max_pages, 4);
        assert_eq!(out.stats.input_tokens, 10);
        assert_eq!(out.receipt.client.grant_eligibility, "Incubator");
        assert_eq!(out.receipt.client.amount_paid, "$30.00");
        assert_eq!(out.receipt.patients[0].patient_total, "$30.00");
    }

    #[tokio::test]
    async fn rejects_non_pdf_bytes_before_rendering() {
        let (ex, pages) = extractor(1, "{}");
        let err = ex
            .extract_pdf(b"GIF89a".to_vec(), "x.gif", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiptOcrError::NotAPdf { .. }), "got: {err:?}");
        assert_eq!(pages.last_limit.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_prose_is_invalid_output() {
        let (ex, _) = extractor(1, "Sorry, I can't help with that.");
        let err = ex.extract_pdf(PDF.to_vec(), "r.pdf", None).await.unwrap_err();
        assert!(matches!(err, ReceiptOcrError::InvalidModelOutput { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn wrong_shape_is_invalid_output() {
        let (ex, _) = extractor(1, r#"{"Patients": "none"}"#);
        let err = ex.extract_pdf(PDF.to_vec(), "r.pdf", None).await.unwrap_err();
        assert!(matches!(err, ReceiptOcrError::InvalidModelOutput { .. }), "got: {err:?}");
    }
}
