use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    adapter::types::{GenerationRequest, PromptInput},
    error::AdapterError,
};

/// Stop sequence used when the harness does not supply `until`.
pub const DEFAULT_STOP: &str = "<|endoftext|>";
pub const DEFAULT_SEED: u64 = 1234;

/// Harness-supplied generation options. Building a generate payload consumes
/// the recognized keys and forwards the rest verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationOptions(Map<String, Value>);

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for GenerationOptions {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

pub fn generate_payload(
    model: &str,
    prompt: PromptInput,
    mut options: GenerationOptions,
    seed: u64,
    default_max_gen_tokens: u64,
) -> Result<GenerationRequest, AdapterError> {
    // no sampling toggle in the completions protocol
    options.take("do_sample");

    let primary = options.take("max_gen_tokens");
    let alias = options.take("max_gen_toks");
    let max_tokens = match primary.or(alias) {
        Some(value) => value.as_u64().ok_or_else(|| AdapterError::InvalidOption {
            key: "max_gen_tokens".into(),
            reason: format!("expected a non-negative integer, got {value}"),
        })?,
        None => default_max_gen_tokens,
    };

    let temperature = match options.take("temperature") {
        Some(value) => value.as_f64().ok_or_else(|| AdapterError::InvalidOption {
            key: "temperature".into(),
            reason: format!("expected a number, got {value}"),
        })?,
        None => 0.0,
    };

    let stop = match options.take("until") {
        Some(value) => parse_stop_sequences("until", value)?,
        None => vec![DEFAULT_STOP.to_string()],
    };

    let mut extra = options.into_inner();

    let mut request = GenerationRequest {
        model: model.to_string(),
        prompt,
        max_tokens,
        temperature,
        stop: Some(stop),
        seed,
        logprobs: None,
        echo: None,
        extra: Map::new(),
    };
    // leftover options named like protocol fields override the computed value
    if let Some(model) = take_override(&mut extra, "model")? {
        request.model = model;
    }
    if let Some(prompt) = take_override(&mut extra, "prompt")? {
        request.prompt = prompt;
    }
    if let Some(max_tokens) = take_override(&mut extra, "max_tokens")? {
        request.max_tokens = max_tokens;
    }
    if let Some(stop) = extra.remove("stop") {
        request.stop = Some(parse_stop_sequences("stop", stop)?);
    }
    if let Some(seed) = take_override(&mut extra, "seed")? {
        request.seed = seed;
    }
    request.logprobs = take_override(&mut extra, "logprobs")?;
    request.echo = take_override(&mut extra, "echo")?;

    if !extra.is_empty() {
        debug!(keys = ?extra.keys().collect::<Vec<_>>(), "forwarding extension options");
    }
    request.extra = extra;

    Ok(request)
}

fn take_override<T: DeserializeOwned>(
    extra: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, AdapterError> {
    extra
        .remove(key)
        .map(|value| {
            serde_json::from_value(value).map_err(|e| AdapterError::InvalidOption {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Fixed-shape scoring payload: greedy, one new token, echo the prompt with
/// the single best alternative at every position.
pub fn score_payload(model: &str, prompt: PromptInput, seed: u64) -> GenerationRequest {
    GenerationRequest {
        model: model.to_string(),
        prompt,
        max_tokens: 1,
        temperature: 0.0,
        stop: None,
        seed,
        logprobs: Some(1),
        echo: Some(true),
        extra: Map::new(),
    }
}

fn parse_stop_sequences(key: &str, value: Value) -> Result<Vec<String>, AdapterError> {
    match value {
        Value::String(single) => Ok(vec![single]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(AdapterError::InvalidOption {
                    key: key.to_string(),
                    reason: format!("stop sequences must be strings, got {other}"),
                }),
            })
            .collect(),
        other => Err(AdapterError::InvalidOption {
            key: key.to_string(),
            reason: format!("expected a string or array of strings, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn generate_payload_pulls_recognized_options() {
        let options = GenerationOptions::new()
            .with("max_gen_tokens", 50)
            .with("temperature", 0.8)
            .with("until", json!(["STOP"]))
            .with("do_sample", true);

        let request =
            generate_payload("m", "prompt".into(), options, DEFAULT_SEED, 256).unwrap();

        assert_eq!(request.max_tokens, 50);
        assert_eq!(request.temperature, 0.8);
        assert_eq!(request.stop, Some(vec!["STOP".to_string()]));
        assert_eq!(request.seed, 1234);
        assert!(request.extra.is_empty());

        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("do_sample").is_none());
        assert!(body.get("logprobs").is_none());
        assert!(body.get("echo").is_none());
    }

    #[test]
    fn generate_payload_applies_defaults() {
        let request =
            generate_payload("m", "p".into(), GenerationOptions::new(), 7, 256).unwrap();
        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.stop, Some(vec![DEFAULT_STOP.to_string()]));
        assert_eq!(request.seed, 7);
    }

    #[test]
    fn unrecognized_options_pass_through_at_top_level() {
        let options = GenerationOptions::new()
            .with("top_p", 0.9)
            .with("repeat_penalty", 1.1)
            .with("logprobs", 5)
            .with("echo", true);
        let request = generate_payload("real", "p".into(), options, 1, 16).unwrap();

        assert_eq!(request.logprobs, Some(5));
        assert_eq!(request.echo, Some(true));

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["top_p"], json!(0.9));
        assert_eq!(body["repeat_penalty"], json!(1.1));
        assert_eq!(body["logprobs"], json!(5));
        assert_eq!(body["echo"], json!(true));
        assert_eq!(body["model"], json!("real"));
    }

    #[test]
    fn leftover_protocol_fields_override_computed_values() {
        let options = GenerationOptions::new()
            .with("model", "other-model")
            .with("seed", 77)
            .with("max_tokens", 9)
            .with("stop", json!(["###"]))
            .with("until", json!(["ignored"]));
        let request = generate_payload("real", "p".into(), options, 1, 16).unwrap();

        assert_eq!(request.model, "other-model");
        assert_eq!(request.seed, 77);
        assert_eq!(request.max_tokens, 9);
        assert_eq!(request.stop, Some(vec!["###".to_string()]));
        assert!(request.extra.is_empty());

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], json!("other-model"));
        assert_eq!(body["seed"], json!(77));
    }

    #[test]
    fn mistyped_protocol_override_fails_loudly() {
        let options = GenerationOptions::new().with("echo", "yes");
        let err = generate_payload("m", "p".into(), options, 1, 16).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidOption { ref key, .. } if key == "echo"));
    }

    #[test]
    fn single_string_until_and_alias_are_accepted() {
        let options = GenerationOptions::new()
            .with("until", "\n\n")
            .with("max_gen_toks", 12);
        let request = generate_payload("m", "p".into(), options, 1, 256).unwrap();
        assert_eq!(request.stop, Some(vec!["\n\n".to_string()]));
        assert_eq!(request.max_tokens, 12);
    }

    #[test]
    fn mistyped_options_fail_loudly() {
        let options = GenerationOptions::new().with("temperature", "hot");
        let err = generate_payload("m", "p".into(), options, 1, 256).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidOption { ref key, .. } if key == "temperature"));

        let options = GenerationOptions::new().with("until", json!([1, 2]));
        let err = generate_payload("m", "p".into(), options, 1, 256).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidOption { ref key, .. } if key == "until"));

        let options = GenerationOptions::new().with("max_gen_tokens", -3);
        assert!(generate_payload("m", "p".into(), options, 1, 256).is_err());
    }

    #[test]
    fn score_payload_has_fixed_shape() {
        let request = score_payload("m", PromptInput::Tokens(vec![5, 6, 7]), 99);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["temperature"], json!(0.0));
        assert_eq!(body["max_tokens"], json!(1));
        assert_eq!(body["logprobs"], json!(1));
        assert_eq!(body["echo"], json!(true));
        assert_eq!(body["seed"], json!(99));
        assert_eq!(body["prompt"], json!([5, 6, 7]));
        assert!(body.get("stop").is_none());
    }
}
