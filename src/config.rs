use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use crate::adapter::{DEFAULT_SEED, ResponseMode};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub base_url: String,
    pub model_id: String,
    pub response_mode: ResponseMode,
    pub batch_size: usize,
    pub max_gen_tokens: u64,
    pub seed: u64,
    pub eval_prompts_path: Option<PathBuf>,
    pub eval_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            base_url: "http://127.0.0.1:8000".to_string(),
            model_id: "local-model".to_string(),
            response_mode: ResponseMode::Completion,
            batch_size: 1,
            max_gen_tokens: 256,
            seed: DEFAULT_SEED,
            eval_prompts_path: None,
            eval_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let listen_addr = env::var("SERVER_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.listen_addr);

        let base_url = env::var("COMPLETIONS_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let model_id = env::var("MODEL_ID").unwrap_or(defaults.model_id);

        let response_mode = match env::var("RESPONSE_MODE") {
            Ok(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to completion mode");
                ResponseMode::Completion
            }),
            Err(_) => defaults.response_mode,
        };

        let batch_size = env::var("BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.batch_size);
        let max_gen_tokens = env::var("MAX_GEN_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_gen_tokens);
        let seed = env::var("SEED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.seed);

        let eval_prompts_path = env::var("EVAL_PROMPTS_PATH").ok().map(PathBuf::from);
        let eval_timeout = env::var("EVAL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.eval_timeout);

        Ok(Self {
            listen_addr,
            base_url,
            model_id,
            response_mode,
            batch_size,
            max_gen_tokens,
            seed,
            eval_prompts_path,
            eval_timeout,
        })
    }

    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url, self.response_mode.endpoint_path())
    }
}
