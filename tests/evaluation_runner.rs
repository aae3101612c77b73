use std::{io::Write, sync::Mutex, time::Duration};

use async_trait::async_trait;
use completions_adapter::{
    AdapterError, AppConfig, CompletionsAdapter, CompletionsTransport, EvalSample,
    GenerationRequest, ResponseBatch,
    adapter::{AdapterSettings, GenerationOptions, PromptInput},
    evaluation::{load_samples_from_path, run_benchmark},
};
use serde_json::json;

/// Replies like a local completions server: scoring requests get echoed
/// log-probabilities, generation requests get a fixed `result`.
#[derive(Default)]
struct ScriptedServer {
    seen: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl CompletionsTransport for ScriptedServer {
    async fn send(&self, request: &GenerationRequest) -> Result<ResponseBatch, AdapterError> {
        self.seen.lock().unwrap().push(request.clone());

        let body = match (&request.prompt, request.echo) {
            (PromptInput::Tokens(tokens), Some(true)) => {
                // echoed prompt plus the one generated token
                let positions = tokens.len() + 1;
                let token_logprobs: Vec<f64> = (0..positions).map(|_| -0.5).collect();
                let top_logprobs: Vec<_> = (0..positions).map(|_| json!({"t": -0.5})).collect();
                json!({"choices": [{"logprobs": {
                    "token_logprobs": token_logprobs,
                    "top_logprobs": top_logprobs
                }}]})
            }
            _ => json!({"result": "The answer is Paris."}),
        };
        Ok(serde_json::from_value(body).unwrap())
    }
}

struct Stalled;

#[async_trait]
impl CompletionsTransport for Stalled {
    async fn send(&self, _request: &GenerationRequest) -> Result<ResponseBatch, AdapterError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(AdapterError::Transport("unreachable".into()))
    }
}

fn adapter() -> CompletionsAdapter {
    CompletionsAdapter::new(AdapterSettings::new("local-model")).unwrap()
}

#[tokio::test]
async fn mixed_samples_are_scored_and_generated() {
    let server = ScriptedServer::default();
    let samples = vec![
        EvalSample::Score {
            context: vec![1, 2, 3],
            continuation: vec![4, 5],
        },
        EvalSample::Generate {
            prompt: "Capital of France?".into(),
            reference_substring: Some("paris".into()),
            options: GenerationOptions::new().with("until", "\n"),
        },
        EvalSample::Generate {
            prompt: "Capital of Spain?".into(),
            reference_substring: Some("madrid".into()),
            options: GenerationOptions::new(),
        },
    ];

    let report = run_benchmark(&adapter(), &server, &AppConfig::default(), samples)
        .await
        .unwrap();

    assert_eq!(report.samples.len(), 3);
    let score = report.samples[0].score.unwrap();
    assert_eq!(score.summed_logprob, -1.0);
    assert!(score.is_greedy);
    assert_eq!(report.aggregate.mean_logprob, Some(-1.0));
    assert_eq!(report.aggregate.greedy_rate, Some(1.0));
    assert_eq!(report.aggregate.reference_match_rate, Some(0.5));

    let seen = server.seen.lock().unwrap();
    assert_eq!(seen[0].prompt, PromptInput::Tokens(vec![1, 2, 3, 4, 5]));
    assert_eq!(seen[0].echo, Some(true));
    assert_eq!(seen[1].stop, Some(vec!["\n".to_string()]));
}

#[tokio::test]
async fn empty_sample_set_is_rejected() {
    let err = run_benchmark(
        &adapter(),
        &ScriptedServer::default(),
        &AppConfig::default(),
        Vec::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AdapterError::BadRequest(_)));
}

#[tokio::test]
async fn empty_context_is_a_caller_error() {
    let samples = vec![EvalSample::Score {
        context: Vec::new(),
        continuation: vec![7],
    }];
    let err = run_benchmark(
        &adapter(),
        &ScriptedServer::default(),
        &AppConfig::default(),
        samples,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidContextLength { .. }));
}

#[tokio::test(start_paused = true)]
async fn slow_server_times_out() {
    let config = AppConfig {
        eval_timeout: Duration::from_secs(2),
        ..AppConfig::default()
    };
    let samples = vec![EvalSample::Generate {
        prompt: "hi".into(),
        reference_substring: None,
        options: GenerationOptions::new(),
    }];

    let err = run_benchmark(&adapter(), &Stalled, &config, samples)
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Timeout(d) if d == Duration::from_secs(2)));
}

#[test]
fn samples_load_from_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!([
            {"prompt": "2 + 2 =", "reference_substring": "4", "options": {"max_gen_tokens": 4}},
            {"context": [5, 6], "continuation": [7]}
        ])
    )
    .unwrap();

    let samples = load_samples_from_path(file.path()).unwrap();
    assert_eq!(samples.len(), 2);
    assert!(matches!(samples[0], EvalSample::Generate { .. }));
    assert!(matches!(samples[1], EvalSample::Score { ref continuation, .. } if continuation == &[7]));
}

#[test]
fn non_array_sample_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", json!({"prompt": "x"})).unwrap();

    let err = load_samples_from_path(file.path()).unwrap_err();
    assert!(matches!(err, AdapterError::BadRequest(_)));
}
