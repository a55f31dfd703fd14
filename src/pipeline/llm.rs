//! VLM interaction: build the extraction request and call the provider.
//!
//! Prompt text lives in [`crate::prompts`]; this module only assembles the
//! messages and drives the call with timeout, retry and backoff.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) with the defaults waits 500 ms then
//! 1 s before giving up, keeping the worst case well inside a typical
//! client timeout.

use crate::config::ServiceConfig;
use crate::error::ReceiptOcrError;
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// A single completed model turn.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The one capability the pipeline needs from an LLM: a chat completion.
///
/// Implemented by [`ProviderChat`] for any `edgequake_llm` provider; tests
/// implement it directly to return canned replies.
#[async_trait]
pub trait VisionChat: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatReply, ReceiptOcrError>;
}

/// [`VisionChat`] backed by an `edgequake_llm` provider.
pub struct ProviderChat {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderChat {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl VisionChat for ProviderChat {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatReply, ReceiptOcrError> {
        let response = self
            .provider
            .chat(messages, Some(options))
            .await
            .map_err(|e| ReceiptOcrError::ModelCallFailed {
                attempts: 1,
                detail: format!("{}", e),
            })?;

        Ok(ChatReply {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Model output for one receipt, before JSON parsing.
#[derive(Debug, Clone)]
pub struct ModelResult {
    pub reply: ChatReply,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Send every page image to the model in a single extraction request.
///
/// ## Message Layout
///
/// 1. **System message**: receipt layout and JSON-only rules
/// 2. **User message**: the field list and output skeleton, followed by one
///    image per page in page order, so multi-page receipts are read as one
///    document
pub async fn extract_fields(
    model: &dyn VisionChat,
    images: Vec<ImageData>,
    config: &ServiceConfig,
) -> Result<ModelResult, ReceiptOcrError> {
    let start = Instant::now();
    let messages = build_messages(images, config);
    let options = build_options(config);
    let per_call = Duration::from_secs(config.api_timeout_secs);

    let mut last_err = String::from("Unknown error");

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Model call: retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(per_call, model.chat(&messages, &options)).await {
            Ok(Ok(reply)) => {
                let duration = start.elapsed();
                debug!(
                    "Model call: {} input tokens, {} output tokens, {:?}",
                    reply.input_tokens, reply.output_tokens, duration
                );
                return Ok(ModelResult {
                    reply,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                let detail = match e {
                    ReceiptOcrError::ModelCallFailed { detail, .. } => detail,
                    other => other.to_string(),
                };
                warn!("Model call: attempt {} failed: {}", attempt + 1, detail);
                last_err = detail;
            }
            Err(_) => {
                warn!(
                    "Model call: attempt {} timed out after {}s",
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = format!("timed out after {}s", config.api_timeout_secs);
            }
        }
    }

    Err(ReceiptOcrError::ModelCallFailed {
        attempts: config.max_retries + 1,
        detail: last_err,
    })
}

fn build_messages(images: Vec<ImageData>, config: &ServiceConfig) -> Vec<ChatMessage> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let user_prompt = config.user_prompt.as_deref().unwrap_or(DEFAULT_USER_PROMPT);

    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(user_prompt, images),
    ]
}

/// Build `CompletionOptions` from the service config.
fn build_options(config: &ServiceConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then answers with `reply`.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        reply: &'static str,
    }

    #[async_trait]
    impl VisionChat for Flaky {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<ChatReply, ReceiptOcrError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ReceiptOcrError::ModelCallFailed {
                    attempts: 1,
                    detail: format!("503 overloaded ({n})"),
                });
            }
            Ok(ChatReply {
                content: self.reply.to_string(),
                input_tokens: 1200,
                output_tokens: 300,
            })
        }
    }

    struct Hangs;

    #[async_trait]
    impl VisionChat for Hangs {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<ChatReply, ReceiptOcrError> {
            sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn fast_config(max_retries: u32) -> ServiceConfig {
        ServiceConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ServiceConfig::default());
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn one_system_and_one_user_message() {
        let msgs = build_messages(Vec::new(), &ServiceConfig::default());
        assert_eq!(msgs.len(), 2);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let model = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
            reply: "{}",
        };
        let result = extract_fields(&model, Vec::new(), &fast_config(2))
            .await
            .unwrap();
        assert_eq!(result.retries, 2);
        assert_eq!(result.reply.input_tokens, 1200);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let model = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            reply: "{}",
        };
        let err = extract_fields(&model, Vec::new(), &fast_config(1))
            .await
            .unwrap_err();
        match err {
            ReceiptOcrError::ModelCallFailed { attempts, detail } => {
                assert_eq!(attempts, 2);
                assert!(detail.contains("503"), "got: {detail}");
            }
            other => panic!("expected ModelCallFailed, got {other:?}"),
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn per_call_timeout_counts_as_failure() {
        let err = extract_fields(&Hangs, Vec::new(), &fast_config(0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }
}
