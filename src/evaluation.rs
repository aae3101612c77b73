use std::{
    fs,
    path::Path,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    adapter::{
        CompletionsAdapter, GenerationOptions, GenerationRequest, PromptInput, RequestMode,
        ResponseBatch, ScoredResult,
    },
    config::AppConfig,
    error::AdapterError,
    transport::CompletionsTransport,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalSample {
    Generate {
        prompt: String,
        reference_substring: Option<String>,
        #[serde(skip_serializing_if = "GenerationOptions::is_empty")]
        options: GenerationOptions,
    },
    /// Likelihood of `continuation` given `context`, both already tokenized by
    /// the harness with the server's vocabulary.
    Score {
        context: Vec<u32>,
        continuation: Vec<u32>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub sample: EvalSample,
    pub completion: Option<String>,
    pub score: Option<ScoredResult>,
    pub reference_match: Option<bool>,
    pub latency_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetrics {
    pub avg_latency_ms: f64,
    pub mean_logprob: Option<f64>,
    pub greedy_rate: Option<f64>,
    pub reference_match_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub model: String,
    pub samples: Vec<SampleReport>,
    pub aggregate: AggregateMetrics,
}

pub async fn run_benchmark(
    adapter: &CompletionsAdapter,
    transport: &dyn CompletionsTransport,
    config: &AppConfig,
    samples: Vec<EvalSample>,
) -> Result<EvaluationReport, AdapterError> {
    if samples.is_empty() {
        return Err(AdapterError::BadRequest(
            "at least one evaluation sample is required".into(),
        ));
    }

    info!(
        count = samples.len(),
        batch_size = adapter.batch_size().get(),
        "running evaluation"
    );

    let mut reports = Vec::with_capacity(samples.len());

    for sample in samples {
        let start = Instant::now();
        let report = match &sample {
            EvalSample::Generate {
                prompt,
                reference_substring,
                options,
            } => {
                let request = adapter.build_request(
                    prompt.as_str(),
                    RequestMode::Generate,
                    options.clone(),
                    None,
                )?;
                let outputs = dispatch(transport, &request, config.eval_timeout).await?;
                let completion = adapter
                    .parse_generations(&outputs)
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                let reference_match = reference_substring.as_ref().map(|needle| {
                    completion
                        .to_lowercase()
                        .contains(&needle.to_lowercase())
                });

                SampleReport {
                    sample: sample.clone(),
                    completion: Some(completion),
                    score: None,
                    reference_match,
                    latency_ms: start.elapsed().as_millis(),
                }
            }
            EvalSample::Score {
                context,
                continuation,
            } => {
                let tokens: Vec<u32> = context.iter().chain(continuation).copied().collect();
                let request = adapter.build_request(
                    PromptInput::Tokens(tokens),
                    RequestMode::Score,
                    GenerationOptions::new(),
                    None,
                )?;
                let outputs = dispatch(transport, &request, config.eval_timeout).await?;
                let mut scores = adapter.parse_scores(&outputs, &[context.len() as i64])?;

                SampleReport {
                    sample: sample.clone(),
                    completion: None,
                    score: scores.pop(),
                    reference_match: None,
                    latency_ms: start.elapsed().as_millis(),
                }
            }
        };
        debug!(latency_ms = report.latency_ms as u64, "sample finished");
        reports.push(report);
    }

    let aggregate = summarize(&reports);

    Ok(EvaluationReport {
        model: adapter.model().to_string(),
        samples: reports,
        aggregate,
    })
}

async fn dispatch(
    transport: &dyn CompletionsTransport,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<ResponseBatch, AdapterError> {
    tokio::time::timeout(timeout, transport.send(request))
        .await
        .map_err(|_| AdapterError::Timeout(timeout))?
}

pub fn load_samples_from_path(path: &Path) -> Result<Vec<EvalSample>, AdapterError> {
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| AdapterError::BadRequest(format!("invalid evaluation file: {e}")))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| parse_sample(idx, item))
            .collect(),
        _ => Err(AdapterError::BadRequest(
            "evaluation file must be a JSON array".into(),
        )),
    }
}

fn parse_sample(idx: usize, item: Value) -> Result<EvalSample, AdapterError> {
    if let Some(prompt) = item.get("prompt").and_then(|v| v.as_str()) {
        let reference_substring = item
            .get("reference_substring")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let options = match item.get("options") {
            Some(Value::Object(map)) => GenerationOptions::from(map.clone()),
            Some(_) => {
                return Err(AdapterError::BadRequest(format!(
                    "evaluation item {idx} field 'options' must be an object"
                )));
            }
            None => GenerationOptions::new(),
        };
        return Ok(EvalSample::Generate {
            prompt: prompt.to_string(),
            reference_substring,
            options,
        });
    }

    let token_field = |name: &str| -> Result<Option<Vec<u32>>, AdapterError> {
        item.get(name)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|_| {
                    AdapterError::BadRequest(format!(
                        "evaluation item {idx} field '{name}' must be an array of token ids"
                    ))
                })
            })
            .transpose()
    };

    match (token_field("context")?, token_field("continuation")?) {
        (Some(context), Some(continuation)) => Ok(EvalSample::Score {
            context,
            continuation,
        }),
        _ => Err(AdapterError::BadRequest(format!(
            "evaluation item {idx} needs either 'prompt' or both 'context' and 'continuation'"
        ))),
    }
}

pub fn fallback_samples() -> Vec<EvalSample> {
    let generate = |prompt: &str, reference: &str| EvalSample::Generate {
        prompt: prompt.to_string(),
        reference_substring: Some(reference.to_string()),
        options: GenerationOptions::new().with("max_gen_tokens", 64),
    };
    vec![
        generate("Q: What is the capital of France?\nA:", "paris"),
        generate("Q: How many legs does a spider have?\nA:", "eight"),
        generate("Translate to German: good morning\n", "morgen"),
    ]
}

fn summarize(reports: &[SampleReport]) -> AggregateMetrics {
    let avg_latency_ms = mean(reports.iter().map(|r| r.latency_ms as f64));

    let logprobs: Vec<f64> = reports
        .iter()
        .filter_map(|r| r.score)
        .map(|s| s.summed_logprob)
        .collect();
    let mean_logprob = if logprobs.is_empty() {
        None
    } else {
        Some(mean(logprobs))
    };

    let greedy_rate = compute_rate(reports.iter().filter_map(|r| r.score).map(|s| s.is_greedy));
    let reference_match_rate = compute_rate(reports.iter().filter_map(|r| r.reference_match));

    AggregateMetrics {
        avg_latency_ms,
        mean_logprob,
        greedy_rate,
        reference_match_rate,
    }
}

fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0usize;
    let mut acc = 0.0;
    for value in values {
        count += 1;
        acc += value;
    }
    if count == 0 { 0.0 } else { acc / count as f64 }
}

fn compute_rate<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = bool>,
{
    let mut count = 0usize;
    let mut hits = 0usize;
    for value in values {
        count += 1;
        if value {
            hits += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(hits as f64 / count as f64)
    }
}
