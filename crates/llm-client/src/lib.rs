use crate::api::ChatRequest;
use crate::queue::{Job, Pacing};
use async_trait::async_trait;
use configuration::LlmSettings;
use core_types::{MarketSnapshot, ParsedStrategy, RoundPromptData, Signal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub mod api;
pub mod error;
pub mod extract;
pub mod prompts;
pub mod repair;

mod queue;

// Re-export the core types to provide a clean public API.
pub use api::{ChatApi, GroqApi};
pub use error::LlmError;

/// The abstract LLM interface the engine and registry run against, allowing
/// the paced client to be swapped for a scripted one in tests.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Structures a free-text strategy. Upstream failures degrade to the
    /// default parsed strategy rather than propagating.
    async fn parse_strategy(&self, text: &str) -> Result<ParsedStrategy, LlmError>;

    /// Produces a repaired BUY/SELL/HOLD signal for one symbol. Upstream
    /// failures degrade to the fallback HOLD signal.
    async fn generate_signal(
        &self,
        snapshot: &MarketSnapshot,
        parsed: &ParsedStrategy,
    ) -> Result<Signal, LlmError>;

    /// Extracts a round configuration from a natural-language request.
    async fn parse_round_prompt(&self, query: &str) -> Result<RoundPromptData, LlmError>;
}

/// The production LLM client.
///
/// Every request — strategy parses, signals, round prompts — goes through one
/// process-wide FIFO queue with a single worker, making the LLM the paced,
/// globally serialized resource it has to be. Responses pass through tolerant
/// JSON extraction and schema repair, so callers always receive values that
/// satisfy the `Signal`/`ParsedStrategy` invariants.
pub struct LlmClient {
    tx: mpsc::UnboundedSender<Job>,
}

impl LlmClient {
    /// Builds a client over an arbitrary transport. Spawns the queue worker.
    pub fn new(api: Arc<dyn ChatApi>, settings: &LlmSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        queue::spawn_worker(
            api,
            Pacing {
                min_interval: Duration::from_millis(settings.min_interval_ms),
                post_delay: Duration::from_millis(settings.post_delay_ms),
                backoff: Duration::from_millis(settings.backoff_ms),
            },
            rx,
        );
        Self { tx }
    }

    /// Builds a client over the real Groq endpoint.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new(Arc::new(GroqApi::new(settings)), settings)
    }

    async fn request(
        &self,
        system: &str,
        user: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let (respond, rx) = oneshot::channel();
        let job = Job {
            request: ChatRequest {
                system: system.to_string(),
                user,
                temperature,
                max_tokens,
            },
            respond,
        };
        self.tx.send(job).map_err(|_| LlmError::QueueClosed)?;
        rx.await.map_err(|_| LlmError::QueueClosed)?
    }
}

#[async_trait]
impl Llm for LlmClient {
    async fn parse_strategy(&self, text: &str) -> Result<ParsedStrategy, LlmError> {
        let result = self
            .request(
                prompts::PARSE_SYSTEM,
                prompts::parse_strategy_prompt(text),
                0.3,
                1_000,
            )
            .await;

        match result {
            Ok(content) => Ok(repair::repair_parsed(extract::extract_json(&content).as_ref())),
            Err(LlmError::QueueClosed) => Err(LlmError::QueueClosed),
            Err(err) => {
                tracing::warn!(error = %err, "strategy parse failed upstream, using default");
                Ok(ParsedStrategy::default())
            }
        }
    }

    async fn generate_signal(
        &self,
        snapshot: &MarketSnapshot,
        parsed: &ParsedStrategy,
    ) -> Result<Signal, LlmError> {
        let result = self
            .request(
                prompts::SIGNAL_SYSTEM,
                prompts::generate_signal_prompt(snapshot, parsed),
                0.2,
                500,
            )
            .await;

        match result {
            Ok(content) => Ok(repair::repair_signal(
                extract::extract_json(&content).as_ref(),
                snapshot,
            )),
            Err(LlmError::QueueClosed) => Err(LlmError::QueueClosed),
            Err(err) => {
                tracing::warn!(symbol = %snapshot.symbol, error = %err, "signal failed upstream, using fallback");
                Ok(repair::fallback_signal(snapshot))
            }
        }
    }

    async fn parse_round_prompt(&self, query: &str) -> Result<RoundPromptData, LlmError> {
        let result = self
            .request(
                prompts::ROUND_SYSTEM,
                prompts::parse_round_prompt(query),
                0.3,
                800,
            )
            .await;

        match result {
            Ok(content) => Ok(repair::repair_round_prompt(
                extract::extract_json(&content).as_ref(),
            )),
            Err(LlmError::QueueClosed) => Err(LlmError::QueueClosed),
            Err(err) => {
                tracing::warn!(error = %err, "round prompt parse failed upstream, using defaults");
                Ok(RoundPromptData::default())
            }
        }
    }
}
