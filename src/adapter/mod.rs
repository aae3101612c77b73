mod completions;
mod parse;
mod payload;
mod types;

pub use completions::{AdapterSettings, BatchSize, CompletionsAdapter, ConfigWarning};
pub use parse::{parse_generations, parse_scores};
pub use payload::{DEFAULT_SEED, DEFAULT_STOP, GenerationOptions, generate_payload, score_payload};
pub use types::{
    ChatMessage, Choice, CompletionsResponse, GenerationRequest, Logprobs, PromptInput,
    RequestMode, ResponseBatch, ResponseMode, ScoredResult,
};
