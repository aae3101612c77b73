use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::{
    adapter::{
        parse,
        payload::{self, DEFAULT_SEED, GenerationOptions},
        types::{
            GenerationRequest, PromptInput, RequestMode, ResponseBatch, ResponseMode, ScoredResult,
        },
    },
    config::AppConfig,
    error::AdapterError,
};

/// Effective batch size. The completions protocol has no batching, so anything
/// above one is coerced down at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(usize);

impl BatchSize {
    pub const ONE: BatchSize = BatchSize(1);

    pub fn coerce(requested: usize) -> (BatchSize, Option<ConfigWarning>) {
        if requested > 1 {
            let warning = ConfigWarning::BatchSizeCoerced {
                requested,
                effective: 1,
            };
            (BatchSize::ONE, Some(warning))
        } else {
            (BatchSize::ONE, None)
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Non-fatal diagnostics produced while validating adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigWarning {
    BatchSizeCoerced { requested: usize, effective: usize },
    ChatTemplateRequired,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::BatchSizeCoerced { requested, effective } => write!(
                f,
                "completions endpoint does not support batching; batch size {requested} reduced to {effective}"
            ),
            ConfigWarning::ChatTemplateRequired => {
                f.write_str("chat endpoint requires the harness to apply a chat template")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub model: String,
    pub response_mode: ResponseMode,
    pub batch_size: usize,
    pub max_gen_tokens: u64,
    pub seed: u64,
}

impl AdapterSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response_mode: ResponseMode::default(),
            batch_size: 1,
            max_gen_tokens: 256,
            seed: DEFAULT_SEED,
        }
    }
}

impl From<&AppConfig> for AdapterSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.model_id.clone(),
            response_mode: config.response_mode,
            batch_size: config.batch_size,
            max_gen_tokens: config.max_gen_tokens,
            seed: config.seed,
        }
    }
}

/// Translates harness requests into completions payloads and server responses
/// back into harness results. Holds no mutable state after construction.
#[derive(Debug, Clone)]
pub struct CompletionsAdapter {
    model: String,
    response_mode: ResponseMode,
    batch_size: BatchSize,
    max_gen_tokens: u64,
    seed: u64,
    warnings: Vec<ConfigWarning>,
}

impl CompletionsAdapter {
    pub fn new(settings: AdapterSettings) -> Result<Self, AdapterError> {
        if settings.model.trim().is_empty() {
            return Err(AdapterError::MissingOption("model".into()));
        }

        let mut warnings = Vec::new();
        if settings.response_mode == ResponseMode::Chat {
            warnings.push(ConfigWarning::ChatTemplateRequired);
        }
        let (batch_size, coerced) = BatchSize::coerce(settings.batch_size);
        warnings.extend(coerced);

        for warning in &warnings {
            warn!(model = %settings.model, "{warning}");
        }

        Ok(Self {
            model: settings.model,
            response_mode: settings.response_mode,
            batch_size,
            max_gen_tokens: settings.max_gen_tokens,
            seed: settings.seed,
            warnings,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AdapterError> {
        Self::new(AdapterSettings::from(config))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.response_mode
    }

    pub fn batch_size(&self) -> BatchSize {
        self.batch_size
    }

    pub fn default_seed(&self) -> u64 {
        self.seed
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Builds the outgoing payload. Scoring ignores `options` entirely; a
    /// missing `seed` falls back to the configured one.
    pub fn build_request(
        &self,
        input: impl Into<PromptInput>,
        mode: RequestMode,
        options: GenerationOptions,
        seed: Option<u64>,
    ) -> Result<GenerationRequest, AdapterError> {
        let seed = seed.unwrap_or(self.seed);
        match mode {
            RequestMode::Generate => payload::generate_payload(
                &self.model,
                input.into(),
                options,
                seed,
                self.max_gen_tokens,
            ),
            RequestMode::Score => Ok(payload::score_payload(&self.model, input.into(), seed)),
        }
    }

    pub fn parse_scores(
        &self,
        outputs: &ResponseBatch,
        context_lengths: &[i64],
    ) -> Result<Vec<ScoredResult>, AdapterError> {
        parse::parse_scores(outputs, context_lengths)
    }

    pub fn parse_generations(&self, outputs: &ResponseBatch) -> Vec<String> {
        parse::parse_generations(outputs)
    }

    /// The inference server tokenizes on its own; inputs are returned untouched.
    pub fn tokenize<T>(&self, input: T) -> T {
        input
    }

    pub fn loglikelihood<T>(&self, _requests: &[T]) -> Result<Vec<ScoredResult>, AdapterError> {
        Err(AdapterError::Unsupported(
            "loglikelihood is not supported for chat completions; use the completions scoring \
             path (build_request in score mode and parse_scores) instead"
                .into(),
        ))
    }
}
