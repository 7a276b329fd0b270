//! Configuration types for a digitisation run.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Every knob lives in one struct so two runs
//! can be compared field by field when their outputs differ.

use crate::error::DigitiseError;
use crate::pipeline::llm::TextBackend;
use crate::pipeline::payload::{PayloadFormat, PayloadStrictness};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File name of the cache database inside the output root.
pub const DEFAULT_CACHE_FILE: &str = "cache.sqlite3";

/// Configuration for a digitisation run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use baroque::{BackendKind, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .input_root("input_data")
///     .output_root("raw-output")
///     .backend(BackendKind::Claude)
///     .max_long_side(1200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory holding one sub-folder per notebook. Default: `input_data`.
    pub input_root: PathBuf,

    /// Directory receiving per-folder text and image files. Default: `raw-output`.
    pub output_root: PathBuf,

    /// SQLite cache location. Default: `<output_root>/cache.sqlite3`.
    pub cache_path: Option<PathBuf>,

    /// Longest side of a processed page image, in pixels. Default: 800.
    ///
    /// Journal scans are often 4000+ px tall; 800 px keeps handwriting
    /// legible to the model while keeping request bodies small. Pages already
    /// smaller than this are never upscaled.
    pub max_long_side: u32,

    /// Which provider family to build when `text_backend` is not set. Default: Claude.
    pub backend: BackendKind,

    /// Primary model ID. If None, uses the backend default.
    pub model: Option<String>,

    /// Fallback model used once when the primary refuses or is cut off.
    /// If None, uses the backend default.
    pub lite_model: Option<String>,

    /// Pre-constructed backend. Takes precedence over `backend`/`model`.
    pub text_backend: Option<Arc<dyn TextBackend>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 16000.
    ///
    /// The prompts ask the model to think before answering; a dense page
    /// plus its reasoning can exceed 8 000 tokens.
    pub max_tokens: usize,

    /// Total attempts per text-service call on transient errors. Default: 10.
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds. Default: 10 000.
    pub retry_delay_ms: u64,

    /// How strictly the `<output>` payload must be delimited. Default: lenient.
    pub payload_strictness: PayloadStrictness,

    /// Run the LaTeX formatting step after translation. Default: false.
    pub format_markup: bool,

    /// Recompute pages even when the cache or output tree already has them. Default: false.
    pub overwrite: bool,

    /// What a failed page does to the run. Default: [`ErrorPolicy::Abort`].
    pub error_policy: ErrorPolicy,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("input_data"),
            output_root: PathBuf::from("raw-output"),
            cache_path: None,
            max_long_side: 800,
            backend: BackendKind::default(),
            model: None,
            lite_model: None,
            text_backend: None,
            temperature: 0.1,
            max_tokens: 16_000,
            max_attempts: 10,
            retry_delay_ms: 10_000,
            payload_strictness: PayloadStrictness::default(),
            format_markup: false,
            overwrite: false,
            error_policy: ErrorPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_root", &self.input_root)
            .field("output_root", &self.output_root)
            .field("cache_path", &self.cache_path())
            .field("max_long_side", &self.max_long_side)
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("lite_model", &self.lite_model)
            .field(
                "text_backend",
                &self.text_backend.as_ref().map(|_| "<dyn TextBackend>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("payload_strictness", &self.payload_strictness)
            .field("format_markup", &self.format_markup)
            .field("overwrite", &self.overwrite)
            .field("error_policy", &self.error_policy)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolved cache location.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.output_root.join(DEFAULT_CACHE_FILE))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_root(mut self, path: impl AsRef<Path>) -> Self {
        self.config.input_root = path.as_ref().to_path_buf();
        self
    }

    pub fn output_root(mut self, path: impl AsRef<Path>) -> Self {
        self.config.output_root = path.as_ref().to_path_buf();
        self
    }

    pub fn cache_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.cache_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn max_long_side(mut self, px: u32) -> Self {
        self.config.max_long_side = px.max(32);
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn lite_model(mut self, model: impl Into<String>) -> Self {
        self.config.lite_model = Some(model.into());
        self
    }

    pub fn text_backend(mut self, backend: Arc<dyn TextBackend>) -> Self {
        self.config.text_backend = Some(backend);
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

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn payload_strictness(mut self, strictness: PayloadStrictness) -> Self {
        self.config.payload_strictness = strictness;
        self
    }

    pub fn format_markup(mut self, v: bool) -> Self {
        self.config.format_markup = v;
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.config.overwrite = v;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DigitiseError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(DigitiseError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DigitiseError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.input_root == c.output_root {
            return Err(DigitiseError::InvalidConfig(format!(
                "input and output roots must differ (both '{}')",
                c.input_root.display()
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Provider family used for transcription and translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Anthropic models; answers in `<output>` tags after an assistant prefill.
    #[default]
    Claude,
    /// OpenAI models; answers in a `{"output": …}` JSON envelope.
    OpenAi,
}

impl BackendKind {
    /// Provider name understood by `edgequake_llm::ProviderFactory`.
    pub fn provider_name(self) -> &'static str {
        match self {
            BackendKind::Claude => "anthropic",
            BackendKind::OpenAi => "openai",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            BackendKind::Claude => "claude-sonnet-4-5",
            BackendKind::OpenAi => "gpt-4.1-mini",
        }
    }

    pub fn default_lite_model(self) -> &'static str {
        match self {
            BackendKind::Claude => "claude-haiku-4-5",
            BackendKind::OpenAi => "gpt-4.1-nano",
        }
    }

    pub fn payload_format(self) -> PayloadFormat {
        match self {
            BackendKind::Claude => PayloadFormat::Tagged,
            BackendKind::OpenAi => PayloadFormat::Json,
        }
    }
}

/// What happens to the run when a page exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Stop at the first failed page (default). Completed pages stay persisted.
    #[default]
    Abort,
    /// Record the failure in the run report and move on to the next page.
    Skip,
}
