pub mod adapter;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod server;
pub mod transport;

pub use adapter::{CompletionsAdapter, GenerationRequest, ResponseBatch, ScoredResult};
pub use config::AppConfig;
pub use error::AdapterError;
pub use evaluation::{EvalSample, EvaluationReport};
pub use server::build_router;
pub use transport::{CompletionsTransport, HttpTransport};
