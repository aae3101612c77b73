use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Anything the harness may place in the `prompt` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Text(String),
    Tokens(Vec<u32>),
    Messages(Vec<ChatMessage>),
    Batch(Vec<PromptInput>),
}

impl From<&str> for PromptInput {
    fn from(value: &str) -> Self {
        PromptInput::Text(value.to_string())
    }
}

impl From<String> for PromptInput {
    fn from(value: String) -> Self {
        PromptInput::Text(value)
    }
}

impl From<Vec<u32>> for PromptInput {
    fn from(value: Vec<u32>) -> Self {
        PromptInput::Tokens(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Outgoing completions payload.
///
/// `logprobs` and `echo` are only set for scoring requests; `extra` carries
/// pass-through extension fields at the top level of the JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: PromptInput,
    pub max_tokens: u64,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    Generate,
    Score,
}

/// Which endpoint flavour the inference server is driven through. Chosen once
/// when the model is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Chat,
    #[default]
    Completion,
}

impl ResponseMode {
    pub fn endpoint_path(self) -> &'static str {
        match self {
            ResponseMode::Chat => "/v1/chat/completions",
            ResponseMode::Completion => "/v1/completions",
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(ResponseMode::Chat),
            "completion" | "completions" => Ok(ResponseMode::Completion),
            other => Err(format!("unknown response mode '{other}'")),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Chat => f.write_str("chat"),
            ResponseMode::Completion => f.write_str("completion"),
        }
    }
}

/// Per-position log-probabilities for the echoed prompt plus generated tokens.
///
/// Servers report `null` for positions they cannot score (typically the first
/// echoed token), hence the `Option` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Logprobs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub token_logprobs: Vec<Option<f64>>,
    #[serde(default)]
    pub top_logprobs: Vec<Option<HashMap<String, f64>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub logprobs: Option<Logprobs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionsResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// A single response object or an ordered sequence of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBatch {
    Many(Vec<CompletionsResponse>),
    One(CompletionsResponse),
}

impl ResponseBatch {
    pub fn responses(&self) -> &[CompletionsResponse] {
        match self {
            ResponseBatch::Many(items) => items,
            ResponseBatch::One(item) => std::slice::from_ref(item),
        }
    }

    pub fn choice_count(&self) -> usize {
        self.responses().iter().map(|r| r.choices.len()).sum()
    }
}

impl From<CompletionsResponse> for ResponseBatch {
    fn from(value: CompletionsResponse) -> Self {
        ResponseBatch::One(value)
    }
}

impl From<Vec<CompletionsResponse>> for ResponseBatch {
    fn from(value: Vec<CompletionsResponse>) -> Self {
        ResponseBatch::Many(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub summed_logprob: f64,
    pub is_greedy: bool,
}
