use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    adapter::{
        CompletionsAdapter, ConfigWarning, GenerationOptions, GenerationRequest, PromptInput,
        RequestMode, ResponseBatch, ResponseMode, ScoredResult,
    },
    config::AppConfig,
    error::AdapterError,
    evaluation::{EvaluationReport, fallback_samples, load_samples_from_path, run_benchmark},
    transport::CompletionsTransport,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub adapter: Arc<CompletionsAdapter>,
    pub transport: Arc<dyn CompletionsTransport>,
    pub evaluation: Arc<RwLock<Option<EvaluationReport>>>,
}

#[derive(Deserialize)]
struct PayloadRequest {
    input: PromptInput,
    mode: RequestMode,
    #[serde(default)]
    options: GenerationOptions,
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct ScoresRequest {
    responses: ResponseBatch,
    context_lengths: Vec<i64>,
}

#[derive(Serialize)]
struct MetadataResponse {
    model: String,
    endpoint: String,
    response_mode: ResponseMode,
    batch_size: usize,
    seed: u64,
    warnings: Vec<ConfigWarning>,
    evaluation: Option<EvaluationReport>,
}

pub fn build_router(
    config: Arc<AppConfig>,
    adapter: Arc<CompletionsAdapter>,
    transport: Arc<dyn CompletionsTransport>,
) -> Router {
    let state = AppState {
        evaluation: Arc::new(RwLock::new(None)),
        config,
        adapter,
        transport,
    };

    Router::new()
        .route("/health", get(health))
        .route("/metadata", get(metadata))
        .route("/payload", post(build_payload))
        .route("/parse/scores", post(parse_scores))
        .route("/parse/generations", post(parse_generations))
        .route("/loglikelihood", post(loglikelihood))
        .route("/evaluate", post(run_evaluation))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "ok"
}

async fn metadata(State(state): State<AppState>) -> Json<MetadataResponse> {
    let evaluation = state.evaluation.read().clone();

    Json(MetadataResponse {
        model: state.adapter.model().to_string(),
        endpoint: state.config.endpoint_url(),
        response_mode: state.adapter.response_mode(),
        batch_size: state.adapter.batch_size().get(),
        seed: state.adapter.default_seed(),
        warnings: state.adapter.warnings().to_vec(),
        evaluation,
    })
}

async fn build_payload(
    State(state): State<AppState>,
    Json(request): Json<PayloadRequest>,
) -> Result<Json<GenerationRequest>, AdapterError> {
    let payload =
        state
            .adapter
            .build_request(request.input, request.mode, request.options, request.seed)?;
    Ok(Json(payload))
}

async fn parse_scores(
    State(state): State<AppState>,
    Json(request): Json<ScoresRequest>,
) -> Result<Json<Vec<ScoredResult>>, AdapterError> {
    let scores = state
        .adapter
        .parse_scores(&request.responses, &request.context_lengths)?;
    Ok(Json(scores))
}

async fn parse_generations(
    State(state): State<AppState>,
    Json(outputs): Json<ResponseBatch>,
) -> Json<Vec<String>> {
    Json(state.adapter.parse_generations(&outputs))
}

async fn loglikelihood(
    State(state): State<AppState>,
    Json(requests): Json<Vec<Value>>,
) -> Result<Json<Vec<ScoredResult>>, AdapterError> {
    let scores = state.adapter.loglikelihood(requests.as_slice())?;
    Ok(Json(scores))
}

async fn run_evaluation(
    State(state): State<AppState>,
) -> Result<Json<EvaluationReport>, AdapterError> {
    let samples = if let Some(path) = state.config.eval_prompts_path.as_ref() {
        load_samples_from_path(path)?
    } else {
        fallback_samples()
    };

    info!(count = samples.len(), "running evaluation benchmark");

    let report = run_benchmark(
        state.adapter.as_ref(),
        state.transport.as_ref(),
        &state.config,
        samples,
    )
    .await?;
    state.evaluation.write().replace(report.clone());

    Ok(Json(report))
}
