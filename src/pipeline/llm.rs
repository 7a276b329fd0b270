//! Text service: provider-agnostic transcription, translation and formatting.
//!
//! [`TextBackend`] is the seam between the pipeline and a model provider. The
//! production implementation, [`LlmBackend`], wraps two `edgequake-llm`
//! providers (a primary and a lite model); tests plug in scripted backends.
//!
//! [`TextService`] layers the behaviour every operation shares on top of a
//! backend:
//!
//! ## Retry Strategy
//!
//! Transient failures (rate limits, 5xx, network errors) are retried up to
//! `max_attempts` total attempts with a fixed delay between them. Journal
//! collections are processed overnight against rate-limited accounts, where a
//! flat 10 s pause recovers as reliably as exponential backoff and keeps the
//! worst-case stall per page predictable. Permanent failures (bad key, invalid
//! request) are returned after one attempt.
//!
//! ## Lite Fallback
//!
//! Some pages make the primary model stop early: a content-filter refusal
//! triggered by period vocabulary, or a length cutoff on dense pages. Such a
//! completion is retried once, immediately, on the lite model. This does not
//! consume a retry attempt. If the lite model also stops early the attempt
//! fails with [`BackendError::AbnormalStop`], which the retry loop treats as
//! transient.

use crate::config::{BackendKind, PipelineConfig};
use crate::error::{BackendError, DigitiseError, Operation, TextServiceError};
use crate::pipeline::encode::image_attachment;
use crate::pipeline::payload::{extract_payload, Payload, PayloadFormat, PayloadStrictness};
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Which of a backend's two models serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Primary,
    Lite,
}

/// A single model request.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub operation: Operation,
    pub system: String,
    pub prompt: String,
    /// JPEG bytes for vision requests.
    pub image: Option<Vec<u8>>,
}

/// Why a model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Complete,
    Refused,
    Truncated,
    Other(String),
}

impl StopReason {
    /// Map a provider finish reason; a missing reason counts as complete.
    pub fn from_finish_reason(reason: Option<&str>) -> Self {
        match reason.map(|r| r.to_ascii_lowercase()) {
            None => StopReason::Complete,
            Some(r) => match r.as_str() {
                "" | "stop" | "end_turn" | "stop_sequence" | "completed" => StopReason::Complete,
                "length" | "max_tokens" => StopReason::Truncated,
                "content_filter" | "refusal" | "safety" => StopReason::Refused,
                _ => StopReason::Other(r),
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StopReason::Complete)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Complete => f.write_str("complete"),
            StopReason::Refused => f.write_str("refused"),
            StopReason::Truncated => f.write_str("truncated"),
            StopReason::Other(r) => write!(f, "stopped: {r}"),
        }
    }
}

/// A model's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub stop: StopReason,
}

impl Completion {
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stop: StopReason::Complete,
        }
    }
}

/// A model provider able to answer [`TextRequest`]s.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// How this backend's answers are delimited.
    fn payload_format(&self) -> PayloadFormat;

    async fn complete(
        &self,
        tier: ModelTier,
        request: &TextRequest,
    ) -> Result<Completion, BackendError>;
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// [`TextBackend`] over a pair of `edgequake-llm` providers.
pub struct LlmBackend {
    name: String,
    format: PayloadFormat,
    primary: Arc<dyn LLMProvider>,
    lite: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmBackend {
    /// Wrap pre-built providers.
    pub fn new(
        kind: BackendKind,
        primary: Arc<dyn LLMProvider>,
        lite: Arc<dyn LLMProvider>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            name: kind.provider_name().to_string(),
            format: kind.payload_format(),
            primary,
            lite,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Build both providers through [`ProviderFactory`], which reads the
    /// provider's API key (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`) from the
    /// environment.
    pub fn from_kind(
        kind: BackendKind,
        model: Option<&str>,
        lite_model: Option<&str>,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<Self, DigitiseError> {
        let model = model.unwrap_or(kind.default_model());
        let lite_model = lite_model.unwrap_or(kind.default_lite_model());
        debug!(
            "Creating {} backend: primary={}, lite={}",
            kind.provider_name(),
            model,
            lite_model
        );
        let primary = create_provider(kind, model)?;
        let lite = create_provider(kind, lite_model)?;
        Ok(Self::new(kind, primary, lite, temperature, max_tokens))
    }

    fn messages(&self, request: &TextRequest) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(&request.system)];
        match &request.image {
            Some(jpeg) => messages.push(ChatMessage::user_with_images(
                &request.prompt,
                vec![image_attachment(jpeg)],
            )),
            None => messages.push(ChatMessage::user(&request.prompt)),
        }
        // Tagged backends start their answer inside the reasoning block.
        if self.format == PayloadFormat::Tagged {
            messages.push(ChatMessage::assistant("<thinking>"));
        }
        messages
    }
}

fn create_provider(kind: BackendKind, model: &str) -> Result<Arc<dyn LLMProvider>, DigitiseError> {
    ProviderFactory::create_llm_provider(kind.provider_name(), model).map_err(|e| {
        DigitiseError::ProviderNotConfigured {
            provider: kind.provider_name().to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Turn a provider error into either a refused completion or a [`BackendError`].
///
/// OpenAI reports `finish_reason=content_filter` as an `ApiError` rather than
/// a completion, so it is mapped back to [`StopReason::Refused`] to reach the
/// lite fallback. Errors not known to be permanent are retried.
pub fn classify_llm_error(error: LlmError) -> Result<Completion, BackendError> {
    match error {
        LlmError::ApiError(ref message) if is_content_filter(message) => Ok(Completion {
            content: String::new(),
            stop: StopReason::Refused,
        }),
        e @ (LlmError::AuthError { .. }
        | LlmError::InvalidRequest { .. }
        | LlmError::ModelNotFound { .. }) => Err(BackendError::Permanent(e.to_string())),
        e => Err(BackendError::Transient(e.to_string())),
    }
}

fn is_content_filter(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("content_filter") || lower.contains("content filter")
}

#[async_trait]
impl TextBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn payload_format(&self) -> PayloadFormat {
        self.format
    }

    async fn complete(
        &self,
        tier: ModelTier,
        request: &TextRequest,
    ) -> Result<Completion, BackendError> {
        let provider = match tier {
            ModelTier::Primary => &self.primary,
            ModelTier::Lite => &self.lite,
        };
        let messages = self.messages(request);
        let start = Instant::now();
        let response = match provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => response,
            Err(e) => {
                debug!("{} ({:?}): provider error: {}", request.operation, tier, e);
                return classify_llm_error(e);
            }
        };
        debug!(
            "{} ({:?}): {} input tokens, {} output tokens, {:?}",
            request.operation,
            tier,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(Completion {
            stop: StopReason::from_finish_reason(response.finish_reason.as_deref()),
            content: response.content,
        })
    }
}

/// Pick the backend for a run: the injected one, else one built from
/// `backend`, `model` and `lite_model`.
pub fn resolve_backend(config: &PipelineConfig) -> Result<Arc<dyn TextBackend>, DigitiseError> {
    if let Some(ref backend) = config.text_backend {
        return Ok(Arc::clone(backend));
    }
    let backend = LlmBackend::from_kind(
        config.backend,
        config.model.as_deref(),
        config.lite_model.as_deref(),
        config.temperature,
        config.max_tokens,
    )?;
    Ok(Arc::new(backend))
}

// ── Text service ─────────────────────────────────────────────────────────

/// Retrying, payload-extracting front end to a [`TextBackend`].
#[derive(Clone)]
pub struct TextService {
    backend: Arc<dyn TextBackend>,
    max_attempts: u32,
    retry_delay: Duration,
    strictness: PayloadStrictness,
}

impl TextService {
    pub fn new(
        backend: Arc<dyn TextBackend>,
        max_attempts: u32,
        retry_delay: Duration,
        strictness: PayloadStrictness,
    ) -> Self {
        Self {
            backend,
            max_attempts: max_attempts.max(1),
            retry_delay,
            strictness,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, DigitiseError> {
        Ok(Self::new(
            resolve_backend(config)?,
            config.max_attempts,
            config.retry_delay(),
            config.payload_strictness,
        ))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Transcribe the French text on a processed page image.
    pub async fn transcribe(&self, jpeg: &[u8]) -> Result<String, TextServiceError> {
        if jpeg.is_empty() {
            return Err(TextServiceError::Encode {
                operation: Operation::Transcribe,
                detail: "page image is empty".into(),
            });
        }
        self.call(Operation::Transcribe, "", Some(jpeg.to_vec())).await
    }

    /// Translate French text into English. Empty input returns `""` without a call.
    pub async fn translate(&self, french: &str) -> Result<String, TextServiceError> {
        self.text_call(Operation::Translate, french).await
    }

    /// Convert plain text into LaTeX markup. Empty input returns `""` without a call.
    pub async fn format(&self, text: &str) -> Result<String, TextServiceError> {
        self.text_call(Operation::Format, text).await
    }

    /// Summarise a whole journal as LaTeX. Empty input returns `""` without a call.
    pub async fn analyse(&self, journal: &str) -> Result<String, TextServiceError> {
        self.text_call(Operation::Analyse, journal).await
    }

    async fn text_call(&self, op: Operation, input: &str) -> Result<String, TextServiceError> {
        if input.trim().is_empty() {
            debug!("{}: empty input, skipping model call", op);
            return Ok(String::new());
        }
        self.call(op, input, None).await
    }

    async fn call(
        &self,
        op: Operation,
        input: &str,
        image: Option<Vec<u8>>,
    ) -> Result<String, TextServiceError> {
        let format = self.backend.payload_format();
        let request = TextRequest {
            operation: op,
            system: prompts::system_prompt(op).to_string(),
            prompt: prompts::user_prompt(op, format, input),
            image,
        };

        let mut last = BackendError::Transient("no attempt made".into());
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                warn!(
                    "{}: retry {}/{} after {:?}",
                    op,
                    attempt - 1,
                    self.max_attempts - 1,
                    self.retry_delay
                );
                sleep(self.retry_delay).await;
            }

            match self.attempt(&request).await {
                Ok(completion) => return Ok(self.payload(op, format, &completion.content)),
                Err(e) if !e.is_transient() => {
                    return Err(TextServiceError::Permanent {
                        operation: op,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("{}: attempt {} failed — {}", op, attempt, e);
                    last = e;
                }
            }
        }

        Err(TextServiceError::RetriesExhausted {
            operation: op,
            attempts: self.max_attempts,
            last,
        })
    }

    /// One attempt: the primary model, then the lite model once if the
    /// primary stopped early.
    async fn attempt(&self, request: &TextRequest) -> Result<Completion, BackendError> {
        let primary = self.backend.complete(ModelTier::Primary, request).await?;
        if primary.stop.is_complete() {
            return Ok(primary);
        }

        warn!(
            "{}: primary model {} on {}, falling back to lite model",
            request.operation,
            primary.stop,
            self.backend.name()
        );
        let lite = self.backend.complete(ModelTier::Lite, request).await?;
        if lite.stop.is_complete() {
            Ok(lite)
        } else {
            Err(BackendError::AbnormalStop {
                reason: lite.stop.to_string(),
            })
        }
    }

    fn payload(&self, op: Operation, format: PayloadFormat, content: &str) -> String {
        debug!("{}: raw completion ({} chars):\n{}", op, content.len(), content);
        match extract_payload(content, format, self.strictness) {
            Payload::Unparseable => {
                warn!(
                    "{}: could not find the answer in a {}-char completion; using empty text. Starts with: {:?}",
                    op,
                    content.len(),
                    preview(content)
                );
                String::new()
            }
            payload => payload.into_text(),
        }
    }
}

/// First 200 characters of a completion, for log lines.
fn preview(content: &str) -> &str {
    match content.char_indices().nth(200) {
        Some((end, _)) => &content[..end],
        None => content,
    }
}
